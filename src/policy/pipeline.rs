// Policy pipeline — run policies in order, stop at the first objection.
//
// Precedence is purely positional: whichever policy comes first gets the
// first chance to reject. Policies never see each other's verdicts.

use tracing::{debug, warn};

use super::message::{InputMessage, OutputMessage};
use super::traits::Policy;

#[derive(Default)]
pub struct Pipeline {
    policies: Vec<Box<dyn Policy>>,
}

impl Pipeline {
    pub fn new(policies: Vec<Box<dyn Policy>>) -> Self {
        Self { policies }
    }

    /// Append a policy to the end of the chain.
    pub fn with(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policy names in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Evaluate every policy in order, returning the first non-accept verdict,
    /// or a plain accept if nobody objects.
    pub async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        let id = &msg.event.id;

        for policy in &self.policies {
            let mut out = policy.evaluate(msg).await;

            if out.id != *id {
                warn!(
                    policy = policy.name(),
                    expected = %id,
                    got = %out.id,
                    "Policy returned a verdict for the wrong event id"
                );
                out.id = id.clone();
            }

            if !out.is_accept() {
                debug!(policy = policy.name(), id = %id, action = %out.action, "Event stopped");
                return out;
            }
        }

        OutputMessage::accept(id)
    }
}
