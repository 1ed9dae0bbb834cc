//! Live push feed over a server-sent-events stream.
//!
//! Consumes one JSON record per SSE message. Because this is the live path,
//! every decoded record is stamped with its arrival time: the timestamp
//! embedded in the payload describes when the sample was recorded upstream,
//! not when it reached us, and windowing must follow arrival.
//!
//! Reconnect and backoff policy stays with the caller; when the transport
//! closes or breaks this feed reports [`FeedMessage::Lost`] once and
//! returns.

use crate::feed::types::parse_record;
use crate::feed::FeedMessage;
use chrono::Utc;
use crossbeam_channel::Sender;
use futures_util::StreamExt;

/// Default stream endpoint, matching the replay server's default port.
pub const DEFAULT_STREAM_URL: &str = "http://localhost:8080/stream";

/// Connect to `url` and pump decoded records into `sender` until the
/// transport ends or the receiver hangs up.
pub async fn stream(url: &str, sender: Sender<FeedMessage>) {
    let client = reqwest::Client::new();

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = sender.send(FeedMessage::Lost(format!("connect failed: {e}")));
            return;
        }
    };
    if !response.status().is_success() {
        let _ = sender.send(FeedMessage::Lost(format!(
            "stream returned {}",
            response.status()
        )));
        return;
    }

    tracing::info!(url, "connected to live stream");

    let mut frames = String::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = sender.send(FeedMessage::Lost(format!("stream broke: {e}")));
                return;
            }
        };
        frames.push_str(&String::from_utf8_lossy(&chunk));

        // SSE frames are separated by a blank line.
        while let Some(end) = frames.find("\n\n") {
            let frame = frames[..end].to_string();
            frames.drain(..end + 2);
            let Some(payload) = data_payload(&frame) else {
                continue;
            };
            if !deliver(&payload, &sender) {
                return;
            }
        }
    }

    let _ = sender.send(FeedMessage::Lost("stream closed".to_string()));
}

/// Extract the concatenated `data:` payload of one SSE frame, if any.
fn data_payload(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Decode one payload and send it on; false when the receiver hung up.
fn deliver(payload: &str, sender: &Sender<FeedMessage>) -> bool {
    let message = match parse_record(payload) {
        Ok(mut record) => {
            record.timestamp = Utc::now();
            FeedMessage::Record(record)
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed record");
            FeedMessage::Malformed(e.to_string())
        }
    };
    sender.send(message).is_ok()
}
