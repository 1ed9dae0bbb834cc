//! Record ingestion: bounded history and inter-arrival gap classification.
//!
//! The [`Ingestor`] exclusively owns the retained record history. Every
//! append is followed by a trim so no retained record is older than the
//! configured window relative to the newest record. Downstream components
//! only ever see read-only views of the history.

use crate::feed::types::TelemetryRecord;
use chrono::{DateTime, Duration, Utc};

/// Inter-arrival delay above which the feed is considered to have gone
/// quiet (milliseconds).
pub const GAP_THRESHOLD_MS: i64 = 10_000;

/// Classification of the inter-arrival delta for one ingested record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCheck {
    /// First record since start or reset; there is no delta to classify.
    First,
    /// Delta within the gap threshold.
    NoGap,
    /// Delta exceeded the gap threshold.
    Gap {
        /// Observed delta in milliseconds.
        duration_ms: i64,
    },
}

/// Owns the bounded, append-only record history.
///
/// Records arrive in arrival order; timestamps are not assumed monotonic
/// beyond that. The gap check runs against the previously ingested record's
/// timestamp, which updates unconditionally, even when a record arrives out
/// of chronological order.
#[derive(Debug)]
pub struct Ingestor {
    history: Vec<TelemetryRecord>,
    last_timestamp: Option<DateTime<Utc>>,
    window_minutes: u32,
    gap_threshold: Duration,
}

impl Ingestor {
    /// Create an ingestor retaining `window_minutes` of history.
    pub fn new(window_minutes: u32) -> Self {
        Self {
            history: Vec::new(),
            last_timestamp: None,
            window_minutes,
            gap_threshold: Duration::milliseconds(GAP_THRESHOLD_MS),
        }
    }

    /// Create an ingestor with a non-default gap threshold.
    pub fn with_gap_threshold(window_minutes: u32, gap_threshold_ms: i64) -> Self {
        Self {
            gap_threshold: Duration::milliseconds(gap_threshold_ms),
            ..Self::new(window_minutes)
        }
    }

    /// Ingest one record: classify the inter-arrival gap, append, and trim
    /// the history to the configured window.
    pub fn ingest(&mut self, record: TelemetryRecord) -> GapCheck {
        let check = match self.last_timestamp {
            None => GapCheck::First,
            Some(last) => {
                let gap = record.timestamp - last;
                if gap > self.gap_threshold {
                    GapCheck::Gap {
                        duration_ms: gap.num_milliseconds(),
                    }
                } else {
                    GapCheck::NoGap
                }
            }
        };

        self.last_timestamp = Some(record.timestamp);
        self.history.push(record);
        self.trim();
        check
    }

    /// Read-only view of the retained history, in arrival order.
    pub fn history(&self) -> &[TelemetryRecord] {
        &self.history
    }

    /// Retention window currently applied on append.
    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    /// Change the retention window and re-trim immediately.
    ///
    /// The caller validates the value; the engine rejects non-positive
    /// windows before they reach this point.
    pub fn set_window_minutes(&mut self, minutes: u32) {
        self.window_minutes = minutes;
        self.trim();
    }

    /// Drop all retained records and forget the last-seen timestamp.
    pub fn clear(&mut self) {
        self.history.clear();
        self.last_timestamp = None;
    }

    /// Timestamp of the most recently ingested record, if any.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Drop records older than the window relative to the newest record.
    fn trim(&mut self) {
        let Some(newest) = self.history.last().map(|r| r.timestamp) else {
            return;
        };
        let cutoff = newest - Duration::minutes(i64::from(self.window_minutes));
        self.history.retain(|r| r.timestamp >= cutoff);
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
    fn test_first_record_has_no_gap() {
        let mut ingestor = Ingestor::new(15);
        assert_eq!(ingestor.ingest(record_at(0)), GapCheck::First);
        assert_eq!(ingestor.history().len(), 1);
    }

    #[test]
    fn test_gap_classification() {
        let mut ingestor = Ingestor::new(15);
        ingestor.ingest(record_at(0));
        assert_eq!(ingestor.ingest(record_at(5)), GapCheck::NoGap);
        assert_eq!(
            ingestor.ingest(record_at(16)),
            GapCheck::Gap {
                duration_ms: 11_000
            }
        );
    }

    #[test]
    fn test_last_timestamp_updates_on_out_of_order_arrival() {
        let mut ingestor = Ingestor::new(15);
        ingestor.ingest(record_at(60));
        // A record with an earlier timestamp still becomes the reference
        // point for the next gap check.
        assert_eq!(ingestor.ingest(record_at(30)), GapCheck::NoGap);
        assert_eq!(
            ingestor.ingest(record_at(41)),
            GapCheck::Gap {
                duration_ms: 11_000
            }
        );
    }

    #[test]
    fn test_history_trimmed_to_window() {
        let mut ingestor = Ingestor::new(1);
        ingestor.ingest(record_at(0));
        ingestor.ingest(record_at(30));
        ingestor.ingest(record_at(90));
        // The record at t=0 is more than one minute behind t=90.
        assert_eq!(ingestor.history().len(), 2);
        assert_eq!(
            ingestor.history()[0].timestamp,
            Utc.timestamp_opt(1_700_000_030, 0).unwrap()
        );
    }

    #[test]
    fn test_shrinking_window_retrims() {
        let mut ingestor = Ingestor::new(15);
        ingestor.ingest(record_at(0));
        ingestor.ingest(record_at(120));
        assert_eq!(ingestor.history().len(), 2);
        ingestor.set_window_minutes(1);
        assert_eq!(ingestor.history().len(), 1);
    }

    #[test]
    fn test_clear_resets_gap_reference() {
        let mut ingestor = Ingestor::new(15);
        ingestor.ingest(record_at(0));
        ingestor.clear();
        assert!(ingestor.history().is_empty());
        assert_eq!(ingestor.ingest(record_at(600)), GapCheck::First);
    }
}
