#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tactician::decision::{AdmissionGate, DecisionCache, DecisionResolver};
use tactician::domain::{Action, Decision, Situation};
use tactician::error::{Result, TacticianError};
use tactician::oracle::DecisionOracle;

/// Oracle double that records how it was called
#[derive(Default)]
pub struct ScriptedOracle {
    latency: Duration,
    fail_next: AtomicBool,
    calls: AtomicUsize,
    started: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedOracle {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Completed calls (success or failure)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, agent_id: &str, _situation: &Situation) -> Result<Decision> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TacticianError::ExternalCall("503 Service Unavailable".to_string()));
        }
        Ok(Decision::new(Action::Defend)
            .with_target(agent_id.to_string())
            .with_reasoning(format!("call #{n}")))
    }
}

pub fn resolver_with(
    oracle: Arc<ScriptedOracle>,
    ttl: Duration,
    max_entries: usize,
    max_concurrent: usize,
) -> DecisionResolver {
    DecisionResolver::new(
        DecisionCache::new(ttl, max_entries),
        AdmissionGate::new(max_concurrent),
        oracle,
    )
    .with_acquire_timeout(Duration::from_secs(10))
    .with_call_timeout(Duration::from_secs(30))
}
