// Write policies — each one looks at an incoming event and renders a verdict.
//
// Every policy implements the Policy trait and is chained by Pipeline.
// Policies that need memory across events take a CounterStore handle.

pub mod basic;
pub mod duplicate;
pub mod keywords;
pub mod message;
pub mod moderation;
pub mod pipeline;
pub mod rate_limit;
pub mod regex;
pub mod traits;

pub use message::{Action, Event, InputMessage, MessageType, OutputMessage, SourceType};
pub use pipeline::Pipeline;
pub use traits::Policy;
