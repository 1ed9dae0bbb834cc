//! Demonstration of the analytics engine on a synthetic telemetry stream.
//!
//! This example shows how to:
//! 1. Decode wire-format records
//! 2. Drive the engine record by record
//! 3. React to KPI snapshots, insights, and gap events
//!
//! Run with: cargo run --example replay_demo

use device_analytics_agent::feed::parse_record;
use device_analytics_agent::{AnalyticsEngine, Config, EngineEvent, ManualClock, VERSION};
use std::time::Duration;

fn main() {
    println!("Device Analytics Agent - Replay Demo");
    println!("====================================");
    println!("v{VERSION}");
    println!();

    let config = Config {
        window_minutes: 60,
        ..Config::default()
    };

    // A manual clock lets the demo play an hour of data instantly while the
    // throttle still sees realistic spacing.
    let clock = ManualClock::new();
    let mut engine = AnalyticsEngine::with_clock(&config, clock.clone());

    for line in synthetic_stream() {
        let record = match parse_record(&line) {
            Ok(record) => record,
            Err(e) => {
                eprintln!("dropped: {e}");
                continue;
            }
        };

        for event in engine.handle_record(record) {
            match event {
                EngineEvent::Kpis(kpis) => {
                    println!(
                        "uptime {:5.1}% | idle {:5.1}% | avg {:5.2} kW | energy {:5.2} kWh",
                        kpis.uptime_pct, kpis.idle_pct, kpis.avg_kw, kpis.energy
                    );
                }
                EngineEvent::Insights(insights) => {
                    for insight in insights {
                        println!("  -> [{}] {}", insight.kind.as_str(), insight.message);
                    }
                }
                EngineEvent::Gap { duration_ms } => {
                    println!("  !! no data for {:.1}s", duration_ms as f64 / 1000.0);
                }
                EngineEvent::GapCleared | EngineEvent::Render(_) => {}
            }
        }

        clock.advance(Duration::from_secs(3));
    }

    println!();
    println!("Done. {} records retained in history.", engine.history().len());
}

/// One synthetic hour: a morning run, a long idle stretch, then heavy load.
fn synthetic_stream() -> Vec<String> {
    let mut lines = Vec::new();
    for minute in 0..60 {
        let (state, kw, pf) = match minute {
            0..=14 => ("RUN", 6.5, 0.92),
            15..=49 => ("IDLE", 0.4, 0.70),
            _ => ("RUN", 11.0, 0.88),
        };
        let ts = chrono::DateTime::from_timestamp(1_709_280_000 + minute * 60, 0)
            .expect("valid timestamp")
            .to_rfc3339();
        lines.push(format!(
            r#"{{"ts":"{ts}","machine_id":"M-demo","state":"{state}","ir":12.1,"iy":11.8,"ib":12.4,"kw":{kw},"kwh_total":{:.2},"pf":{pf},"count_total":{}}}"#,
            1000.0 + minute as f64 * 0.1,
            5000 + minute * 3,
        ));
    }
    lines
}
