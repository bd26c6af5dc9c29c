// Keyword policy — reject events whose content contains a banned phrase.
//
// Matching is plain substring search on the raw content: no case folding,
// no Unicode normalization, no tokenizing. "Spam" does not match "spam".

use async_trait::async_trait;
use tracing::debug;

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;

pub const KEYWORD_REJECT_MSG: &str = "blocked: contains a banned keyword";

/// Rejects content containing any of the configured words or phrases.
#[derive(Debug, Clone, Default)]
pub struct KeywordPolicy {
    words: Vec<String>,
}

impl KeywordPolicy {
    pub fn new(words: Vec<String>) -> Self {
        Self { words }
    }

    /// The first banned word found in `content`, if any.
    fn find_match<'a>(&'a self, content: &str) -> Option<&'a str> {
        self.words
            .iter()
            .map(String::as_str)
            .find(|word| content.contains(word))
    }
}

#[async_trait]
impl Policy for KeywordPolicy {
    fn name(&self) -> &'static str {
        "keywords"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        match self.find_match(&msg.event.content) {
            Some(word) => {
                debug!(id = %msg.event.id, word = word, "Keyword match");
                OutputMessage::reject(&msg.event.id, KEYWORD_REJECT_MSG)
            }
            None => OutputMessage::accept(&msg.event.id),
        }
    }
}
