//! Device Analytics Agent - streaming windowed analytics for machine telemetry.
//!
//! This library ingests a live or replayed stream of machine-telemetry
//! records and continuously derives rolling-window KPIs and rule-based
//! operational insights, re-evaluated as the window slides.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Device Analytics Agent                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐    ┌──────────┐    ┌─────────┐    ┌─────────┐  │
//! │  │   Feed   │───▶│ Ingestor │───▶│ Window  │───▶│  KPIs   │  │
//! │  │ live/    │    │ (bounded │    │ extract │    │    +    │  │
//! │  │ replay   │    │ history) │    │         │    │ Insights│  │
//! │  └──────────┘    └──────────┘    └─────────┘    └─────────┘  │
//! │                       │               ▲              │       │
//! │                       ▼               │              ▼       │
//! │                 ┌───────────┐   ┌───────────┐  ┌──────────┐  │
//! │                 │ Gap check │   │ Throttle/ │  │ Reports/ │  │
//! │                 │           │   │ render    │  │ CSV      │  │
//! │                 └───────────┘   │ gates     │  └──────────┘  │
//! │                                 └───────────┘                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Arrival cadence, recompute cadence, and render cadence are three
//! different clocks: records can arrive in bursts, recomputes are throttled
//! and coalesced, and render frames go out at a coarser fixed rate. KPI
//! results only propagate when they differ perceptibly from the previous
//! snapshot.
//!
//! # Example
//!
//! ```no_run
//! use device_analytics_agent::{AnalyticsEngine, Config, EngineEvent};
//! use device_analytics_agent::feed::parse_record;
//!
//! let config = Config::default();
//! let mut engine = AnalyticsEngine::new(&config);
//!
//! let record = parse_record(
//!     r#"{"ts":"2024-03-01T08:00:00Z","machine_id":"M-01","state":"RUN","kw":7.4}"#,
//! )
//! .expect("valid record");
//!
//! for event in engine.handle_record(record) {
//!     if let EngineEvent::Kpis(kpis) = event {
//!         println!("uptime: {:.1}%", kpis.uptime_pct);
//!     }
//! }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod export;
pub mod feed;
pub mod schedule;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    detect, window_of, AnalyticsReport, GapCheck, Ingestor, Insight, InsightConfig, InsightKind,
    KpiSnapshot, KpiThresholds, ReportBuilder,
};
pub use engine::{AnalyticsEngine, EngineEvent, RenderFrame};
pub use export::{write_csv, ExportError};
pub use feed::{FeedMessage, MachineState, ReplayFeed, TelemetryRecord};
pub use schedule::{Clock, ManualClock, SystemClock};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
