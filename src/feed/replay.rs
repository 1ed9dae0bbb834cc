//! Timed replay of a pre-recorded batch of records.
//!
//! Replay delivers records in array order at a fixed one-second cadence
//! until exhausted, mirroring how the live stream paces itself. Record
//! timestamps are taken from the data, so windowing behaves exactly as it
//! did when the data was recorded.

use crate::feed::types::{parse_record, ParseError, TelemetryRecord};
use crate::feed::FeedMessage;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cadence of replay delivery.
pub const REPLAY_TICK: Duration = Duration::from_secs(1);

/// How often the replay thread re-checks its stop flag while waiting out a
/// tick.
const STOP_POLL: Duration = Duration::from_millis(50);

/// A pre-loaded, ordered batch of records ready for timed delivery.
#[derive(Debug)]
pub struct ReplayFeed {
    records: Vec<TelemetryRecord>,
}

impl ReplayFeed {
    /// Wrap an already-decoded batch.
    pub fn new(records: Vec<TelemetryRecord>) -> Self {
        Self { records }
    }

    /// Decode a newline-delimited JSON batch.
    ///
    /// Malformed lines are dropped and reported alongside the feed; they do
    /// not stop the load and are never delivered.
    pub fn from_jsonl(text: &str) -> (Self, Vec<(usize, ParseError)>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_record(line) {
                Ok(record) => records.push(record),
                Err(e) => errors.push((index + 1, e)),
            }
        }
        (Self { records }, errors)
    }

    /// Number of records queued for delivery.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the decoded batch without starting delivery (offline use).
    pub fn into_records(self) -> Vec<TelemetryRecord> {
        self.records
    }

    /// Start delivering records on a background thread, one per tick.
    ///
    /// Sends [`FeedMessage::Closed`] after the last record. Delivery also
    /// ends early when the receiver hangs up or the handle is stopped.
    pub fn start(self, sender: Sender<FeedMessage>) -> ReplayHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = thread::spawn(move || {
            for record in self.records {
                if !wait_for_tick(&thread_stop) {
                    return;
                }
                if sender.send(FeedMessage::Record(record)).is_err() {
                    return;
                }
            }
            if !thread_stop.load(Ordering::SeqCst) {
                let _ = sender.send(FeedMessage::Closed);
            }
        });

        ReplayHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Sleep out one replay tick, polling the stop flag. Returns false when
/// stopped mid-wait.
fn wait_for_tick(stop: &AtomicBool) -> bool {
    let mut waited = Duration::ZERO;
    while waited < REPLAY_TICK {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(STOP_POLL);
        waited += STOP_POLL;
    }
    !stop.load(Ordering::SeqCst)
}

/// Control handle for a running replay.
#[derive(Debug)]
pub struct ReplayHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ReplayHandle {
    /// Stop delivery and wait for the feed thread to exit.
    ///
    /// After this returns, no further messages from this feed are in
    /// flight; callers can safely reset downstream state.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Whether the feed thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    const GOOD_LINE: &str = r#"{"ts":"2024-03-01T08:00:00Z","state":"RUN","kw":5.0}"#;

    #[test]
    fn test_from_jsonl_skips_malformed_lines() {
        let text = format!("{GOOD_LINE}\nnot json\n\n{GOOD_LINE}\n");
        let (feed, errors) = ReplayFeed::from_jsonl(&text);
        assert_eq!(feed.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 2);
    }

    #[test]
    fn test_empty_input_is_empty_feed() {
        let (feed, errors) = ReplayFeed::from_jsonl("");
        assert!(feed.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_stop_prevents_further_delivery() {
        let (feed, _) = ReplayFeed::from_jsonl(&format!("{GOOD_LINE}\n").repeat(100));
        let (sender, receiver) = unbounded();
        let mut handle = feed.start(sender);
        handle.stop();
        assert!(!handle.is_running());

        // Whatever was delivered before the stop is all there will be: the
        // channel is quiet now.
        let drained = receiver.try_iter().count();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(receiver.try_iter().count(), 0);
        assert!(drained <= 100);
    }

    #[test]
    fn test_exhaustion_sends_closed() {
        let (feed, _) = ReplayFeed::from_jsonl(GOOD_LINE);
        let (sender, receiver) = unbounded();
        let _handle = feed.start(sender);

        let first = receiver
            .recv_timeout(Duration::from_secs(3))
            .expect("replayed record");
        assert!(matches!(first, FeedMessage::Record(_)));

        let second = receiver
            .recv_timeout(Duration::from_secs(3))
            .expect("close notice");
        assert!(matches!(second, FeedMessage::Closed));
    }
}
