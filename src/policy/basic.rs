// Small stateless policies that need no configuration beyond a list or a limit.

use std::collections::HashSet;

use async_trait::async_trait;

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;

pub const READ_ONLY_MSG: &str = "blocked: the relay is read-only";
pub const BANNED_PUBKEY_MSG: &str = "blocked: pubkey is banned";
pub const HELLTHREAD_MSG: &str = "blocked: too many mentions";

pub const DEFAULT_HELLTHREAD_LIMIT: usize = 100;

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolicy;

#[async_trait]
impl Policy for NoopPolicy {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        OutputMessage::accept(&msg.event.id)
    }
}

/// Rejects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyPolicy;

#[async_trait]
impl Policy for ReadOnlyPolicy {
    fn name(&self) -> &'static str {
        "read-only"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        OutputMessage::reject(&msg.event.id, READ_ONLY_MSG)
    }
}

/// Rejects events signed by any of the listed pubkeys.
#[derive(Debug, Clone, Default)]
pub struct PubkeyBanPolicy {
    banned: HashSet<String>,
}

impl PubkeyBanPolicy {
    pub fn new(banned: impl IntoIterator<Item = String>) -> Self {
        Self {
            banned: banned.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Policy for PubkeyBanPolicy {
    fn name(&self) -> &'static str {
        "pubkey-ban"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        if self.banned.contains(&msg.event.pubkey) {
            OutputMessage::reject(&msg.event.id, BANNED_PUBKEY_MSG)
        } else {
            OutputMessage::accept(&msg.event.id)
        }
    }
}

/// Rejects text notes that mention more than `limit` pubkeys.
#[derive(Debug, Clone, Copy)]
pub struct HellthreadPolicy {
    limit: usize,
}

impl HellthreadPolicy {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for HellthreadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HELLTHREAD_LIMIT)
    }
}

#[async_trait]
impl Policy for HellthreadPolicy {
    fn name(&self) -> &'static str {
        "hellthread"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let event = &msg.event;
        if event.kind == 1 && event.tag_values("p").count() > self.limit {
            OutputMessage::reject(&event.id, HELLTHREAD_MSG)
        } else {
            OutputMessage::accept(&event.id)
        }
    }
}
