// Relay loop — the line protocol between the relay and the policy pipeline.
//
// The relay writes one JSON InputMessage per line to our stdin and reads
// one JSON OutputMessage per line from our stdout, in the same order. We
// finish each verdict (and flush it) before reading the next line, so the
// pairing can never drift. Logging goes to stderr; stdout carries verdicts
// and nothing else.
//
// A line that isn't a valid InputMessage but still carries a readable
// `event.id` is rejected under that id, so the relay gets its answer. Only
// lines with no recoverable id go unanswered.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::policy::{InputMessage, OutputMessage, Pipeline};

pub const MALFORMED_REJECT_MSG: &str = "error: malformed policy request";

/// Counts reported when the input stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Lines that weren't a valid InputMessage. Those with a readable event
    /// id were also rejected (and counted in `rejected`).
    pub malformed: u64,
}

/// Read messages from `input` until EOF, writing one verdict per message to `output`.
pub async fn run<R, W>(pipeline: &Pipeline, input: R, mut output: W) -> Result<RunStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = RunStats::default();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input line")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let verdict = match serde_json::from_str::<InputMessage>(line) {
            Ok(msg) => pipeline.evaluate(&msg).await,
            Err(e) => {
                stats.malformed += 1;
                match recover_event_id(line) {
                    Some(id) => {
                        warn!(error = %e, id = %id, "Rejecting malformed input line");
                        OutputMessage::reject(id, MALFORMED_REJECT_MSG)
                    }
                    None => {
                        warn!(error = %e, "Skipping malformed input line with no event id");
                        continue;
                    }
                }
            }
        };

        if verdict.is_accept() {
            stats.accepted += 1;
        } else {
            stats.rejected += 1;
        }
        debug!(id = %verdict.id, action = %verdict.action, "Verdict");

        write_verdict(&mut output, &verdict).await?;
    }

    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        malformed = stats.malformed,
        "Input closed"
    );

    Ok(stats)
}

async fn write_verdict<W: AsyncWrite + Unpin>(output: &mut W, verdict: &OutputMessage) -> Result<()> {
    let mut encoded = serde_json::to_vec(verdict).context("Failed to encode verdict")?;
    encoded.push(b'\n');
    output
        .write_all(&encoded)
        .await
        .context("Failed to write verdict")?;
    output.flush().await.context("Failed to flush verdict")
}

/// `event.id` from a line that parsed as JSON but not as an InputMessage.
fn recover_event_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("event")?.get("id")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recover_event_id() {
        assert_eq!(
            recover_event_id(r#"{"event":{"id":"abc"},"sourceType":"Stored"}"#),
            Some("abc".to_string())
        );
        assert_eq!(recover_event_id(r#"{"event":{"id":7}}"#), None);
        assert_eq!(recover_event_id(r#"{"event":{}}"#), None);
        assert_eq!(recover_event_id("{not json"), None);
    }
}
