// Remote moderation policy — hand selected events to an HTTP moderation
// service and act on its answer.
//
// The service receives `{"input": <event>}` and answers
// `{"accept": bool, "extra_data": string | null}`. Two things stand between
// the service and the relay:
//
//   1. A hard deadline. The request races a timer; if the timer wins, the
//      request is dropped and its eventual answer is never read.
//   2. A fallback verdict. Timeouts, connection errors, non-2xx statuses and
//      unparseable bodies all become `{accept: accept_on_fail}`.
//
// Whatever comes out of that (real answer or fallback) goes through the
// verdict handler, which decides whether to reject. The default handler just
// negates `accept`; custom handlers can read scores out of `extra_data`.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::message::{Event, InputMessage, OutputMessage};
use super::traits::Policy;

pub const DEFAULT_MODERATION_URL: &str = "http://127.0.0.1:8080/moderate";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const MODERATION_REJECT_MSG: &str = "blocked: content rejected by moderation";

/// Kind 1: short text note.
pub const TEXT_NOTE_KIND: u64 = 1;

/// The moderation service's answer (or the fallback standing in for one).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModerationResult {
    pub accept: bool,
    #[serde(default)]
    pub extra_data: Option<String>,
}

impl ModerationResult {
    /// What we pretend the service said when it said nothing usable.
    pub fn fallback(accept_on_fail: bool) -> Self {
        Self {
            accept: accept_on_fail,
            extra_data: None,
        }
    }
}

/// Decides whether to reject, given the event and the service's answer.
/// Returns true to reject. A handler that panics is treated like a failed
/// service call: the event is rejected unless `accept_on_fail` is set.
pub type VerdictHandler = Arc<dyn Fn(&Event, &ModerationResult) -> bool + Send + Sync>;

/// Reject unless the service explicitly accepted.
pub fn default_handler() -> VerdictHandler {
    Arc::new(|_event: &Event, result: &ModerationResult| !result.accept)
}

/// Reject when the service declined, or when `extra_data` holds a numeric
/// score at or above `threshold`. Non-numeric `extra_data` is ignored.
pub fn score_threshold_handler(threshold: f64) -> VerdictHandler {
    Arc::new(move |_event: &Event, result: &ModerationResult| {
        if !result.accept {
            return true;
        }
        result
            .extra_data
            .as_deref()
            .and_then(|data| data.trim().parse::<f64>().ok())
            .is_some_and(|score| score >= threshold)
    })
}

/// What to do with content the handler rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectAction {
    #[default]
    Reject,
    ShadowReject,
}

#[derive(Clone)]
pub struct ModerationOptions {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when non-empty.
    pub token: String,
    /// Only events of these kinds are sent to the service.
    pub kinds: HashSet<u64>,
    pub timeout: Duration,
    pub handler: VerdictHandler,
    pub action: RejectAction,
    pub accept_on_fail: bool,
}

impl Default for ModerationOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_MODERATION_URL.to_string(),
            token: String::new(),
            kinds: HashSet::from([TEXT_NOTE_KIND]),
            timeout: DEFAULT_TIMEOUT,
            handler: default_handler(),
            action: RejectAction::Reject,
            accept_on_fail: true,
        }
    }
}

impl std::fmt::Debug for ModerationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationOptions")
            .field("url", &self.url)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("kinds", &self.kinds)
            .field("timeout", &self.timeout)
            .field("action", &self.action)
            .field("accept_on_fail", &self.accept_on_fail)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    input: &'a Event,
}

pub struct ModerationPolicy {
    client: Client,
    options: ModerationOptions,
}

impl ModerationPolicy {
    pub fn new(options: ModerationOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("strainer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, options })
    }

    /// One round trip to the moderation service, no deadline applied.
    async fn check(&self, event: &Event) -> Result<ModerationResult> {
        let mut request = self
            .client
            .post(&self.options.url)
            .json(&ModerationRequest { input: event });

        if !self.options.token.is_empty() {
            request = request.bearer_auth(&self.options.token);
        }

        let response = request
            .send()
            .await
            .context("Moderation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Moderation service returned {}: {}", status, body);
        }

        response
            .json::<ModerationResult>()
            .await
            .context("Failed to parse moderation response")
    }

    /// The service's answer, or the fallback if it missed the deadline or failed.
    async fn moderate(&self, event: &Event) -> ModerationResult {
        // `timeout` owns the timer; it is dropped as soon as either side finishes.
        match tokio::time::timeout(self.options.timeout, self.check(event)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(id = %event.id, error = %e, "Moderation check failed, using fallback");
                ModerationResult::fallback(self.options.accept_on_fail)
            }
            Err(_) => {
                warn!(
                    id = %event.id,
                    timeout_ms = self.options.timeout.as_millis() as u64,
                    "Moderation check timed out, using fallback"
                );
                ModerationResult::fallback(self.options.accept_on_fail)
            }
        }
    }
}

#[async_trait]
impl Policy for ModerationPolicy {
    fn name(&self) -> &'static str {
        "moderation"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let event = &msg.event;

        if !self.options.kinds.contains(&event.kind) {
            return OutputMessage::accept(&event.id);
        }

        let result = self.moderate(event).await;
        let handler = &self.options.handler;
        let reject = match panic::catch_unwind(AssertUnwindSafe(|| handler(event, &result))) {
            Ok(reject) => reject,
            Err(_) => {
                warn!(id = %event.id, "Verdict handler panicked, using fallback");
                !self.options.accept_on_fail
            }
        };

        debug!(
            id = %event.id,
            accept = result.accept,
            extra_data = ?result.extra_data,
            reject = reject,
            "Moderation verdict"
        );

        if !reject {
            return OutputMessage::accept(&event.id);
        }

        match self.options.action {
            RejectAction::Reject => OutputMessage::reject(&event.id, MODERATION_REJECT_MSG),
            RejectAction::ShadowReject => OutputMessage::shadow_reject(&event.id),
        }
    }
}
