// Policy trait — the contract every write policy satisfies.
//
// A policy takes one InputMessage and resolves to exactly one OutputMessage.
// There is no error path: the relay expects a verdict line for every input
// line, so a policy whose dependencies fail must fall back to a verdict of
// its own choosing instead of returning an error.

use async_trait::async_trait;

use super::message::{InputMessage, OutputMessage};

#[async_trait]
pub trait Policy: Send + Sync {
    /// Short name used in logs and configuration (e.g. "rate-limit").
    fn name(&self) -> &'static str;

    /// Decide what to do with a single event.
    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage;
}
