//! External decision service integration
//!
//! The resolver talks to the decision service through [`DecisionOracle`]:
//! - `HttpOracle`: chat-completions compatible LLM endpoint
//! - `RuleOracle`: offline rule table, used for simulation runs without a key

pub mod http;
pub mod prompt;
pub mod rules;

use async_trait::async_trait;

use crate::domain::{Decision, Situation};
use crate::error::Result;

pub use http::HttpOracle;
pub use prompt::{parse_decision, render_prompt};
pub use rules::RuleOracle;

/// Source of fresh decisions for an agent's situation.
///
/// Implementations may be slow and may fail; the resolver bounds both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, agent_id: &str, situation: &Situation) -> Result<Decision>;
}
