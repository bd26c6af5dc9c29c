// Anti-duplication policy — reject the same long content posted twice
// within a window, regardless of who posts it.
//
// Content is hashed and the hash is kept in the counter store with a TTL.
// Every inspected event refreshes the TTL, so a copy-paste flood keeps
// getting rejected for as long as it continues. Short content is skipped:
// "gm" is not spam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;
use crate::store::CounterStore;

pub const DUPLICATE_REJECT_MSG: &str = "blocked: duplicate content";

const KEY_PREFIX: &str = "duplicate:";

#[derive(Debug, Clone)]
pub struct DuplicateOptions {
    /// How long a hash is remembered after it was last seen.
    pub ttl: Duration,
    /// Content shorter than this many characters is never checked.
    pub min_length: usize,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(60_000),
            min_length: 50,
        }
    }
}

pub struct DuplicatePolicy {
    store: Arc<dyn CounterStore>,
    options: DuplicateOptions,
}

impl DuplicatePolicy {
    pub fn new(store: Arc<dyn CounterStore>, options: DuplicateOptions) -> Self {
        Self { store, options }
    }
}

fn content_key(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

#[async_trait]
impl Policy for DuplicatePolicy {
    fn name(&self) -> &'static str {
        "anti-duplication"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let id = &msg.event.id;
        let content = &msg.event.content;

        if content.chars().count() < self.options.min_length {
            return OutputMessage::accept(id);
        }

        let key = content_key(content);

        let seen = match self.store.get(&key).await {
            Ok(seen) => seen.is_some(),
            Err(e) => {
                warn!(error = %e, "Duplicate store read failed, accepting");
                return OutputMessage::accept(id);
            }
        };

        if let Err(e) = self.store.set(&key, 1, self.options.ttl).await {
            warn!(error = %e, "Duplicate store write failed");
        }

        if seen {
            debug!(id = %id, key = %key, "Duplicate content");
            OutputMessage::reject(id, DUPLICATE_REJECT_MSG)
        } else {
            OutputMessage::accept(id)
        }
    }
}
