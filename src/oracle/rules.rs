//! Offline decision oracle
//!
//! A fixed rule table standing in for the LLM when no credential is
//! configured. An optional artificial latency makes it behave like a remote
//! call so simulation runs still exercise admission and caching.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::DecisionOracle;
use crate::domain::{Action, Decision, Mood, Situation};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct RuleOracle {
    latency: Duration,
    calls: AtomicU64,
}

impl RuleOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of decisions produced so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn evaluate(situation: &Situation) -> Decision {
        let (action, why) = match situation {
            s if s.health < 30 && s.is_threatened() => (Action::Retreat, "badly hurt under threat"),
            s if s.health < 50 && !s.is_threatened() => (Action::Heal, "safe enough to recover"),
            s if s.is_outnumbered() => (Action::Retreat, "outnumbered"),
            s if s.is_threatened() && matches!(s.mood, Mood::Angry | Mood::Confident) => {
                (Action::Attack, "pressing the advantage")
            }
            s if s.is_threatened() => (Action::Defend, "holding against hostiles"),
            s if s.allies_nearby > 0 && s.mood == Mood::Calm => (Action::Socialize, "allies nearby"),
            s if s.mood == Mood::Afraid => (Action::Idle, "waiting for courage"),
            _ => (Action::Explore, "nothing pressing"),
        };
        Decision::new(action).with_reasoning(why)
    }
}

#[async_trait]
impl DecisionOracle for RuleOracle {
    async fn decide(&self, _agent_id: &str, situation: &Situation) -> Result<Decision> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Self::evaluate(situation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_table() {
        let cases = [
            (Situation::new(20, 1, 3, Mood::Confident), Action::Retreat),
            (Situation::new(40, 0, 0, Mood::Calm), Action::Heal),
            (Situation::new(90, 4, 1, Mood::Angry), Action::Retreat),
            (Situation::new(90, 2, 1, Mood::Angry), Action::Attack),
            (Situation::new(80, 2, 1, Mood::Calm), Action::Defend),
            (Situation::new(80, 0, 2, Mood::Calm), Action::Socialize),
            (Situation::new(80, 0, 0, Mood::Afraid), Action::Idle),
            (Situation::new(80, 0, 0, Mood::Alert), Action::Explore),
        ];
        for (situation, expected) in cases {
            assert_eq!(
                RuleOracle::evaluate(&situation).action,
                expected,
                "situation {situation:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_and_call_count() {
        let oracle = RuleOracle::with_latency(Duration::from_millis(300));
        let started = tokio::time::Instant::now();
        oracle
            .decide("a1", &Situation::new(80, 0, 0, Mood::Alert))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(oracle.calls(), 1);
    }
}
