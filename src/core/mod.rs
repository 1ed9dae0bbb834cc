//! Core analytics for the device analytics agent.
//!
//! This module contains:
//! - Record ingestion with bounded history and gap classification
//! - Sliding-window extraction over the retained history
//! - KPI aggregation and insight detection over one window
//! - Report assembly for export

pub mod ingest;
pub mod insights;
pub mod kpi;
pub mod report;
pub mod window;

// Re-export commonly used types
pub use ingest::{GapCheck, Ingestor, GAP_THRESHOLD_MS};
pub use insights::{detect, Insight, InsightConfig, InsightKind, MAX_INSIGHTS};
pub use kpi::{KpiSnapshot, KpiThresholds};
pub use report::{AnalyticsReport, ReportBuilder, PRODUCER_NAME, REPORT_VERSION};
pub use window::window_of;
