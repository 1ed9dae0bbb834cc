//! Export envelope for computed analytics.
//!
//! A report captures one recompute result (the window bounds, the KPI
//! snapshot, and the findings) together with producer metadata, so a
//! session's results can be exported and attributed later.

use crate::core::insights::Insight;
use crate::core::kpi::KpiSnapshot;
use crate::feed::types::TelemetryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The current report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "device-analytics-agent";

/// Producer metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    /// Name of the producing software.
    pub name: String,
    /// Version of the producing software.
    pub version: String,
    /// Unique instance identifier.
    pub instance_id: Uuid,
}

/// Bounds of the window a report was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportWindow {
    /// Timestamp of the oldest record in the window.
    pub start: DateTime<Utc>,
    /// Timestamp of the newest record in the window.
    pub end: DateTime<Utc>,
    /// Configured window length in minutes.
    pub length_minutes: u32,
    /// Number of records in the window.
    pub record_count: usize,
}

/// One exported recompute result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub version: String,
    /// When this report was assembled.
    pub computed_at: DateTime<Utc>,
    pub producer: ReportProducer,
    /// Machine the window's newest record came from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<ReportWindow>,
    pub kpis: KpiSnapshot,
    pub insights: Vec<Insight>,
}

/// Builds [`AnalyticsReport`]s with a stable per-session instance id.
pub struct ReportBuilder {
    instance_id: Uuid,
}

impl ReportBuilder {
    /// Create a builder with a fresh instance id.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }

    /// Get the instance ID.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Assemble a report from one recompute result.
    pub fn build(
        &self,
        window: &[TelemetryRecord],
        window_minutes: u32,
        kpis: KpiSnapshot,
        insights: Vec<Insight>,
    ) -> AnalyticsReport {
        let bounds = match (window.first(), window.last()) {
            (Some(first), Some(last)) => Some(ReportWindow {
                start: first.timestamp,
                end: last.timestamp,
                length_minutes: window_minutes,
                record_count: window.len(),
            }),
            _ => None,
        };

        AnalyticsReport {
            version: REPORT_VERSION.to_string(),
            computed_at: Utc::now(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id,
            },
            machine_id: window.last().map(|r| r.machine_id.clone()),
            window: bounds,
            kpis,
            insights,
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::MachineState;
    use chrono::TimeZone;

    fn record_at(secs: i64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            machine_id: "M-01".to_string(),
            state: MachineState::Run,
            mode: None,
            status: None,
            vr: None,
            vy: None,
            vb: None,
            ir: None,
            iy: None,
            ib: None,
            kw: Some(5.0),
            kwh_total: None,
            pf: None,
            count_total: None,
            temp_c: None,
            alarm_code: None,
        }
    }

    #[test]
    fn test_builder_instance_ids_differ() {
        assert_ne!(
            ReportBuilder::new().instance_id(),
            ReportBuilder::new().instance_id()
        );
    }

    #[test]
    fn test_report_carries_window_bounds() {
        let builder = ReportBuilder::new();
        let window = vec![record_at(0), record_at(60)];
        let kpis = KpiSnapshot::compute(&window, 15);

        let report = builder.build(&window, 15, kpis, Vec::new());
        assert_eq!(report.version, REPORT_VERSION);
        assert_eq!(report.machine_id.as_deref(), Some("M-01"));
        let bounds = report.window.expect("window bounds");
        assert_eq!(bounds.record_count, 2);
        assert_eq!(bounds.length_minutes, 15);
        assert!(bounds.start < bounds.end);
    }

    #[test]
    fn test_empty_window_report() {
        let builder = ReportBuilder::new();
        let report = builder.build(&[], 15, KpiSnapshot::default(), Vec::new());
        assert!(report.window.is_none());
        assert!(report.machine_id.is_none());
    }

    #[test]
    fn test_report_serializes() {
        let builder = ReportBuilder::new();
        let window = vec![record_at(0)];
        let kpis = KpiSnapshot::compute(&window, 15);
        let report = builder.build(&window, 15, kpis, Vec::new());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"kpis\""));
        assert!(json.contains("\"instance_id\""));
    }
}
