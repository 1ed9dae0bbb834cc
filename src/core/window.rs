//! Sliding-window extraction over the retained history.

use crate::feed::types::TelemetryRecord;
use chrono::Duration;

/// Return the maximal suffix of `history` whose timestamps fall within
/// `window_minutes` of the newest record.
///
/// The cutoff is anchored to the last record's timestamp, not the wall
/// clock, so replayed data windows exactly as live data does. Pure and
/// idempotent: re-extracting from an unchanged history yields the same
/// slice.
pub fn window_of(history: &[TelemetryRecord], window_minutes: u32) -> &[TelemetryRecord] {
    let Some(last) = history.last() else {
        return &[];
    };
    let cutoff = last.timestamp - Duration::minutes(i64::from(window_minutes));

    // Walk back from the newest record; the suffix ends at the first record
    // older than the cutoff.
    let mut start = history.len();
    while start > 0 && history[start - 1].timestamp >= cutoff {
        start -= 1;
    }
    &history[start..]
}
