//! Device Analytics CLI
//!
//! Streaming windowed analytics for machine telemetry.

use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver};
use device_analytics_agent::core::{AnalyticsReport, KpiSnapshot, ReportBuilder};
use device_analytics_agent::export::{default_export_filename, write_csv};
use device_analytics_agent::feed::{FeedMessage, ReplayFeed};
use device_analytics_agent::{window_of, AnalyticsEngine, Config, EngineEvent, VERSION};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "device-analytics")]
#[command(version = VERSION)]
#[command(about = "Streaming windowed analytics for machine telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded JSONL stream through the analytics engine
    Replay {
        /// Newline-delimited JSON record file
        file: PathBuf,

        /// Analysis window length in minutes
        #[arg(long)]
        window: Option<u32>,

        /// Directory to export session reports into
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Consume a live SSE record stream
    #[cfg(feature = "live")]
    Live {
        /// Stream endpoint
        #[arg(long, default_value = device_analytics_agent::feed::live::DEFAULT_STREAM_URL)]
        url: String,

        /// Analysis window length in minutes
        #[arg(long)]
        window: Option<u32>,

        /// Directory to export session reports into
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Serve a recorded JSONL stream over SSE for dashboards and demos
    #[cfg(feature = "server")]
    Serve {
        /// Newline-delimited JSON record file
        file: PathBuf,

        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Export the trailing window of a recorded stream as CSV
    Export {
        /// Newline-delimited JSON record file
        file: PathBuf,

        /// Analysis window length in minutes
        #[arg(long)]
        window: Option<u32>,

        /// Output file (defaults to a timestamped name)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            file,
            window,
            export_dir,
        } => cmd_replay(&file, window, export_dir),
        #[cfg(feature = "live")]
        Commands::Live {
            url,
            window,
            export_dir,
        } => cmd_live(&url, window, export_dir),
        #[cfg(feature = "server")]
        Commands::Serve { file, port } => cmd_serve(&file, port),
        Commands::Export {
            file,
            window,
            output,
        } => cmd_export(&file, window, output),
        Commands::Config => cmd_config(),
    }
}

/// Load config, apply a window override, and validate at the boundary.
fn effective_config(window: Option<u32>) -> Config {
    let mut config = Config::load().unwrap_or_default();
    if let Some(minutes) = window {
        config.window_minutes = minutes;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    config
}

fn cmd_replay(file: &PathBuf, window: Option<u32>, export_dir: Option<PathBuf>) {
    let config = effective_config(window);

    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", file.display());
            std::process::exit(1);
        }
    };

    let (feed, dropped) = ReplayFeed::from_jsonl(&text);
    for (line, error) in &dropped {
        eprintln!("Warning: line {line} dropped: {error}");
    }
    if feed.is_empty() {
        eprintln!("No replayable records in {}", file.display());
        std::process::exit(1);
    }

    println!("Device Analytics Agent v{VERSION}");
    println!();
    println!("Replaying {} records at 1 record/second", feed.len());
    println!("  Window: {} minutes", config.window_minutes);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (sender, receiver) = bounded(1024);
    let mut handle = feed.start(sender);

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut engine = AnalyticsEngine::new(&config);
    let builder = ReportBuilder::new();
    let mut reports = Vec::new();

    run_feed_loop(&mut engine, &receiver, &running, &builder, &mut reports);

    handle.stop();
    finish_session(&reports, export_dir.as_deref());
}

#[cfg(feature = "live")]
fn cmd_live(url: &str, window: Option<u32>, export_dir: Option<PathBuf>) {
    init_tracing();
    let config = effective_config(window);

    println!("Device Analytics Agent v{VERSION}");
    println!();
    println!("Connecting to {url}");
    println!("  Window: {} minutes", config.window_minutes);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (sender, receiver) = bounded(1024);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    let stream_url = url.to_string();
    runtime.spawn(async move {
        device_analytics_agent::feed::live::stream(&stream_url, sender).await;
    });

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut engine = AnalyticsEngine::new(&config);
    let builder = ReportBuilder::new();
    let mut reports = Vec::new();

    run_feed_loop(&mut engine, &receiver, &running, &builder, &mut reports);

    // Dropping the runtime aborts the stream task; the feed is gone before
    // any state teardown happens.
    drop(runtime);
    finish_session(&reports, export_dir.as_deref());
}

#[cfg(feature = "server")]
fn cmd_serve(file: &PathBuf, port: u16) {
    init_tracing();

    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", file.display());
            std::process::exit(1);
        }
    };
    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        use device_analytics_agent::server::{run, ServerConfig};

        match run(ServerConfig::new(port, lines)).await {
            Ok((addr, shutdown)) => {
                println!("Serving {} at http://{addr}/stream", file.display());
                println!("Press Ctrl+C to stop");
                let _ = tokio::signal::ctrl_c().await;
                let _ = shutdown.send(());
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    });
}

fn cmd_export(file: &PathBuf, window: Option<u32>, output: Option<PathBuf>) {
    let config = effective_config(window);

    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", file.display());
            std::process::exit(1);
        }
    };

    let (feed, dropped) = ReplayFeed::from_jsonl(&text);
    for (line, error) in &dropped {
        eprintln!("Warning: line {line} dropped: {error}");
    }
    let records = feed.into_records();
    let window_records = window_of(&records, config.window_minutes);

    let path = output.unwrap_or_else(|| PathBuf::from(default_export_filename(Utc::now())));
    let mut out = match std::fs::File::create(&path) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error creating {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    match write_csv(&mut out, window_records) {
        Ok(count) => println!("Exported {count} records to {}", path.display()),
        Err(e) => {
            eprintln!("Error exporting CSV: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", Config::config_path().display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Drive the engine from a feed channel until the feed ends or Ctrl+C.
fn run_feed_loop(
    engine: &mut AnalyticsEngine,
    receiver: &Receiver<FeedMessage>,
    running: &Arc<AtomicBool>,
    builder: &ReportBuilder,
    reports: &mut Vec<AnalyticsReport>,
) {
    let mut printer = EventPrinter::default();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(FeedMessage::Record(record)) => {
                let events = engine.handle_record(record);
                printer.process(engine, events, builder, reports);
            }
            Ok(FeedMessage::Malformed(reason)) => {
                eprintln!("Warning: dropped malformed record: {reason}");
            }
            Ok(FeedMessage::Lost(reason)) => {
                eprintln!("Feed lost: {reason}");
                break;
            }
            Ok(FeedMessage::Closed) => {
                println!();
                println!("Feed exhausted.");
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                let events = engine.tick();
                printer.process(engine, events, builder, reports);
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Prints engine events and collects accepted results as reports.
#[derive(Default)]
struct EventPrinter {
    in_gap: bool,
    pending_kpis: Option<KpiSnapshot>,
}

impl EventPrinter {
    fn process(
        &mut self,
        engine: &AnalyticsEngine,
        events: Vec<EngineEvent>,
        builder: &ReportBuilder,
        reports: &mut Vec<AnalyticsReport>,
    ) {
        for event in events {
            match event {
                EngineEvent::Kpis(kpis) => {
                    let stamp = engine
                        .history()
                        .last()
                        .map(|r| r.timestamp.format("%H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "[{stamp}] uptime {:.1}% | idle {:.1}% | off {:.1}% | \
                         avg {:.2} kW | energy {:.2} kWh | pf {:.3} | \
                         {:.1} units/min | imbalance {:.1}%",
                        kpis.uptime_pct,
                        kpis.idle_pct,
                        kpis.off_pct,
                        kpis.avg_kw,
                        kpis.energy,
                        kpis.avg_pf,
                        kpis.throughput,
                        kpis.phase_imbalance
                    );
                    self.pending_kpis = Some(kpis);
                }
                EngineEvent::Insights(insights) => {
                    for insight in &insights {
                        println!(
                            "  [{}] {}: {}",
                            insight.kind.as_str(),
                            insight.title,
                            insight.message
                        );
                    }
                    if let Some(kpis) = self.pending_kpis.take() {
                        let window = window_of(engine.history(), engine.window_minutes());
                        reports.push(builder.build(
                            window,
                            engine.window_minutes(),
                            kpis,
                            insights,
                        ));
                    }
                }
                EngineEvent::Gap { duration_ms } => {
                    eprintln!("No data for {:.1}s", duration_ms as f64 / 1000.0);
                    self.in_gap = true;
                }
                EngineEvent::GapCleared => {
                    if self.in_gap {
                        println!("Data flow restored.");
                        self.in_gap = false;
                    }
                }
                // Chart rendering belongs to an external presentation layer.
                EngineEvent::Render(_) => {}
            }
        }
    }
}

/// Export collected reports and print the session summary.
fn finish_session(reports: &[AnalyticsReport], export_dir: Option<&std::path::Path>) {
    println!();
    if let Some(dir) = export_dir {
        if reports.is_empty() {
            println!("No reports to export.");
        } else if let Err(e) = export_reports(dir, reports) {
            eprintln!("Error exporting reports: {e}");
        }
    }
    println!("Session complete: {} reports", reports.len());
}

fn export_reports(dir: &std::path::Path, reports: &[AnalyticsReport]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "session_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_string_pretty(reports)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&path, json)?;
    println!("Exported {} reports to {}", reports.len(), path.display());
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }
}

#[cfg(any(feature = "live", feature = "server"))]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
