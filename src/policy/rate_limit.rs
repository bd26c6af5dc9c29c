// Rate-limit policy — fixed-window counter per source IP.
//
// Each IP gets one counter in the store with a TTL equal to the interval.
// Every request reads the counter, then writes back count + 1 and resets the
// TTL. A source that keeps sending therefore keeps its window open; the
// count only drops back to zero after a full quiet interval.
//
// The read and the write are separate store calls. Two concurrent requests
// from one IP (from different relay processes) can read the same value and
// both write count + 1, so the limit is a soft bound under bursts.
//
// If the store errors, the event is accepted: an unreachable store must not
// take the relay down with it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;
use crate::store::CounterStore;

pub const RATE_LIMIT_REJECT_MSG: &str = "rate-limited: too many requests";

/// Key namespace so rate-limit counters don't collide with other store users.
const KEY_PREFIX: &str = "rate_limit:";

/// Rate-limit settings.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Length of the window (and TTL of each counter).
    pub interval: Duration,
    /// Requests allowed per window; the next one is rejected.
    pub max: i64,
    /// Source addresses that are never limited.
    pub whitelist: HashSet<String>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(60_000),
            max: 10,
            whitelist: HashSet::new(),
        }
    }
}

pub struct RateLimitPolicy {
    store: Arc<dyn CounterStore>,
    options: RateLimitOptions,
}

impl RateLimitPolicy {
    pub fn new(store: Arc<dyn CounterStore>, options: RateLimitOptions) -> Self {
        Self { store, options }
    }

    fn is_exempt(&self, msg: &InputMessage) -> bool {
        !msg.source_type.is_ip() || self.options.whitelist.contains(&msg.source_info)
    }
}

#[async_trait]
impl Policy for RateLimitPolicy {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let id = &msg.event.id;

        if self.is_exempt(msg) {
            return OutputMessage::accept(id);
        }

        let key = format!("{KEY_PREFIX}{}", msg.source_info);

        let count = match self.store.get(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!(error = %e, source = %msg.source_info, "Rate-limit store read failed, accepting");
                return OutputMessage::accept(id);
            }
        };

        // A failed write only loses this one increment; the read already
        // told us whether the source is over the limit.
        if let Err(e) = self
            .store
            .set(&key, count.saturating_add(1), self.options.interval)
            .await
        {
            warn!(error = %e, source = %msg.source_info, "Rate-limit store write failed");
        }

        if count >= self.options.max {
            debug!(
                source = %msg.source_info,
                count = count,
                max = self.options.max,
                "Rate limit exceeded"
            );
            OutputMessage::reject(id, RATE_LIMIT_REJECT_MSG)
        } else {
            OutputMessage::accept(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::message::{Event, MessageType, SourceType};
    use anyhow::Result;

    /// A store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<i64>> {
            anyhow::bail!("disk on fire")
        }
        async fn set(&self, _key: &str, _value: i64, _ttl: Duration) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
        async fn prune(&self) -> Result<u64> {
            anyhow::bail!("disk on fire")
        }
        async fn count(&self) -> Result<u64> {
            anyhow::bail!("disk on fire")
        }
    }

    /// Reads always return a fixed count; writes always fail.
    struct ReadOnlyStore(i64);

    #[async_trait]
    impl CounterStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<i64>> {
            Ok(Some(self.0))
        }
        async fn set(&self, _key: &str, _value: i64, _ttl: Duration) -> Result<()> {
            anyhow::bail!("database is locked")
        }
        async fn prune(&self) -> Result<u64> {
            Ok(0)
        }
        async fn count(&self) -> Result<u64> {
            Ok(1)
        }
    }

    fn ip_message() -> InputMessage {
        InputMessage {
            message_type: MessageType::New,
            event: Event {
                id: "e1".to_string(),
                pubkey: "pk".to_string(),
                created_at: 0,
                kind: 1,
                tags: vec![],
                content: String::new(),
                sig: String::new(),
            },
            received_at: 0,
            source_type: SourceType::Ip4,
            source_info: "198.51.100.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let policy = RateLimitPolicy::new(
            Arc::new(BrokenStore),
            RateLimitOptions {
                max: 0,
                ..Default::default()
            },
        );
        let out = policy.evaluate(&ip_message()).await;
        assert!(out.is_accept());
        assert_eq!(out.id, "e1");
    }

    #[tokio::test]
    async fn test_failed_write_still_decides_from_read() {
        let options = RateLimitOptions {
            max: 5,
            ..Default::default()
        };

        let over = RateLimitPolicy::new(Arc::new(ReadOnlyStore(5)), options.clone());
        let out = over.evaluate(&ip_message()).await;
        assert_eq!(out, OutputMessage::reject("e1", RATE_LIMIT_REJECT_MSG));

        let under = RateLimitPolicy::new(Arc::new(ReadOnlyStore(4)), options);
        assert!(under.evaluate(&ip_message()).await.is_accept());
    }

    #[test]
    fn test_non_ip_source_is_exempt() {
        let policy = RateLimitPolicy::new(
            Arc::new(crate::store::MemoryStore::new()),
            RateLimitOptions::default(),
        );
        let mut msg = ip_message();
        assert!(!policy.is_exempt(&msg));
        msg.source_type = SourceType::Stream;
        assert!(policy.is_exempt(&msg));
    }
}
