// Regex policy — like the keyword policy, but each entry is a pattern.
//
// Patterns are compiled once up front; a bad pattern is a configuration
// error, not something to discover per event.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;

pub const REGEX_REJECT_MSG: &str = "blocked: content matches a banned pattern";

#[derive(Debug, Clone, Default)]
pub struct RegexPolicy {
    patterns: Vec<Regex>,
}

impl RegexPolicy {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).with_context(|| format!("Invalid content pattern: {p}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Policy for RegexPolicy {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let content = &msg.event.content;
        match self.patterns.iter().find(|re| re.is_match(content)) {
            Some(re) => {
                debug!(id = %msg.event.id, pattern = re.as_str(), "Pattern match");
                OutputMessage::reject(&msg.event.id, REGEX_REJECT_MSG)
            }
            None => OutputMessage::accept(&msg.event.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_rejected_at_construction() {
        let err = RegexPolicy::new(&["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_empty_pattern_list_is_valid() {
        let policy = RegexPolicy::new::<&str>(&[]).unwrap();
        assert!(policy.patterns.is_empty());
    }
}
