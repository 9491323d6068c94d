//! Decision resolver
//!
//! Orchestrates fingerprinting, the cache, the admission gate and the oracle
//! for one decision request:
//!
//! ```text
//! Pending ──hit──────────────────────────────────────────▶ Cached
//!    │
//!    └─miss─▶ AwaitingSlot ──permit──▶ Calling ──ok──────▶ Fresh (stored)
//!                  │                      └──err/timeout─▶ Fallback (not stored)
//!                  └──timeout/closed─────────────────────▶ Fallback (no call)
//! ```
//!
//! Every per-request failure is recovered into a fallback decision here; the
//! tick loop never sees an error.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::DecisionCache;
use super::fingerprint::{derive_key, Fingerprint};
use super::gate::{AdmissionGate, GateError, Permit};
use crate::config::AppConfig;
use crate::domain::{Decision, Situation};
use crate::oracle::DecisionOracle;

/// Why a request ended with the fallback decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No admission slot within the allowed wait
    AdmissionTimeout,
    /// Resolver shut down
    GateClosed,
    /// Oracle returned an error
    CallFailed(String),
    /// Oracle exceeded the call timeout
    CallTimedOut,
    /// Coalesced request whose leading call produced no decision
    LeaderFailed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::AdmissionTimeout => write!(f, "admission timeout"),
            FallbackReason::GateClosed => write!(f, "gate closed"),
            FallbackReason::CallFailed(e) => write!(f, "call failed: {}", e),
            FallbackReason::CallTimedOut => write!(f, "call timed out"),
            FallbackReason::LeaderFailed => write!(f, "shared call failed"),
        }
    }
}

/// Where a resolved decision came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Cached,
    Fresh,
    /// Produced by a concurrent request for the same fingerprint
    Shared,
    Fallback(FallbackReason),
}

impl DecisionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DecisionSource::Fallback(_))
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Cached => write!(f, "cached"),
            DecisionSource::Fresh => write!(f, "fresh"),
            DecisionSource::Shared => write!(f, "shared"),
            DecisionSource::Fallback(reason) => write!(f, "fallback ({})", reason),
        }
    }
}

/// A decision plus diagnostics about how it was obtained
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub decision: Decision,
    pub source: DecisionSource,
    pub fingerprint: Fingerprint,
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    fn new(decision: Decision, source: DecisionSource, fingerprint: Fingerprint) -> Self {
        Self {
            decision,
            source,
            fingerprint,
            resolved_at: Utc::now(),
        }
    }

    fn fallback(reason: FallbackReason, fingerprint: Fingerprint) -> Self {
        Self::new(
            Decision::fallback(),
            DecisionSource::Fallback(reason),
            fingerprint,
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    calls: AtomicU64,
    call_failures: AtomicU64,
    admission_rejections: AtomicU64,
    shared: AtomicU64,
    leader_failures: AtomicU64,
}

/// Point-in-time resolver statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// External calls started
    pub calls: u64,
    /// External calls that failed or timed out
    pub call_failures: u64,
    /// Misses that never got an admission slot
    pub admission_rejections: u64,
    /// Misses answered by another request's call
    pub shared: u64,
    /// Coalesced misses whose leading call produced nothing
    pub leader_failures: u64,
}

impl ResolverStats {
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    pub fn fallbacks(&self) -> u64 {
        self.call_failures + self.admission_rejections + self.leader_failures
    }
}

type FlightMap = DashMap<Fingerprint, broadcast::Sender<Option<Decision>>>;

/// Registration of the leading request for a fingerprint.
///
/// Dropping it without `complete` (cancellation) closes the channel, which
/// followers observe as a failed leader.
struct Flight<'a> {
    pending: &'a FlightMap,
    key: Fingerprint,
    done: bool,
}

impl Flight<'_> {
    fn complete(mut self, outcome: Option<Decision>) {
        self.done = true;
        if let Some((_, tx)) = self.pending.remove(&self.key) {
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.pending.remove(&self.key);
        }
    }
}

enum Role<'a> {
    Leader(Flight<'a>),
    Follower(broadcast::Receiver<Option<Decision>>),
}

/// Cache + admission gate in front of a decision oracle.
///
/// Constructed once at startup and shared (`Arc`) by every task that needs
/// decisions. `shutdown` ends its useful life.
pub struct DecisionResolver {
    cache: DecisionCache,
    gate: AdmissionGate,
    oracle: Arc<dyn DecisionOracle>,
    acquire_timeout: Duration,
    call_timeout: Duration,
    single_flight: bool,
    pending: FlightMap,
    counters: Counters,
}

impl DecisionResolver {
    pub fn new(cache: DecisionCache, gate: AdmissionGate, oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            cache,
            gate,
            oracle,
            acquire_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(20),
            single_flight: false,
            pending: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn from_config(config: &AppConfig, oracle: Arc<dyn DecisionOracle>) -> Self {
        Self::new(
            DecisionCache::from_config(&config.cache),
            AdmissionGate::new(config.admission.max_concurrent),
            oracle,
        )
        .with_acquire_timeout(config.admission.acquire_timeout())
        .with_call_timeout(config.oracle.timeout())
        .with_single_flight(config.admission.single_flight)
    }

    /// Maximum wait for an admission slot; zero means fail fast
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Upper bound on a single oracle call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Resolve the next decision for an agent. Never fails.
    pub async fn resolve(&self, agent_id: &str, situation: &Situation) -> Resolution {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let key = derive_key(agent_id, situation);

        if self.is_shut_down() {
            self.counters
                .admission_rejections
                .fetch_add(1, Ordering::Relaxed);
            return Resolution::fallback(FallbackReason::GateClosed, key);
        }

        if let Some(decision) = self.cache.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(agent_id, fingerprint = %key, action = %decision.action, "decision cache hit");
            return Resolution::new(decision, DecisionSource::Cached, key);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(agent_id, fingerprint = %key, "decision cache miss");

        if !self.single_flight {
            return self.call(agent_id, situation, key).await;
        }

        match self.join_or_lead(&key) {
            Role::Follower(rx) => self.follow(agent_id, rx, key).await,
            Role::Leader(flight) => {
                // A flight that just finished may have filled the cache.
                if let Some(decision) = self.cache.get(&key) {
                    self.counters.misses.fetch_sub(1, Ordering::Relaxed);
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    flight.complete(Some(decision.clone()));
                    return Resolution::new(decision, DecisionSource::Cached, key);
                }
                let resolution = self.call(agent_id, situation, key).await;
                let outcome = (!resolution.source.is_fallback()).then(|| resolution.decision.clone());
                flight.complete(outcome);
                resolution
            }
        }
    }

    /// Resolve and return only the decision
    pub async fn decide(&self, agent_id: &str, situation: &Situation) -> Decision {
        self.resolve(agent_id, situation).await.decision
    }

    fn join_or_lead(&self, key: &Fingerprint) -> Role<'_> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx);
                Role::Leader(Flight {
                    pending: &self.pending,
                    key: key.clone(),
                    done: false,
                })
            }
        }
    }

    async fn follow(
        &self,
        agent_id: &str,
        mut rx: broadcast::Receiver<Option<Decision>>,
        key: Fingerprint,
    ) -> Resolution {
        let limit = self.acquire_timeout + self.call_timeout;
        match tokio::time::timeout(limit, rx.recv()).await {
            Ok(Ok(Some(decision))) => {
                self.counters.shared.fetch_add(1, Ordering::Relaxed);
                debug!(agent_id, fingerprint = %key, "joined in-flight decision call");
                Resolution::new(decision, DecisionSource::Shared, key)
            }
            _ => {
                self.counters.leader_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent_id, fingerprint = %key, "in-flight decision call produced nothing, using fallback");
                Resolution::fallback(FallbackReason::LeaderFailed, key)
            }
        }
    }

    async fn admit(&self) -> Result<Permit, GateError> {
        if self.acquire_timeout.is_zero() {
            self.gate.try_acquire()
        } else {
            self.gate.acquire(Some(self.acquire_timeout)).await
        }
    }

    async fn call(&self, agent_id: &str, situation: &Situation, key: Fingerprint) -> Resolution {
        let permit = match self.admit().await {
            Ok(permit) => permit,
            Err(err) => {
                self.counters
                    .admission_rejections
                    .fetch_add(1, Ordering::Relaxed);
                let reason = match err {
                    GateError::Closed => FallbackReason::GateClosed,
                    GateError::Timeout { .. } | GateError::Saturated => {
                        FallbackReason::AdmissionTimeout
                    }
                };
                warn!(
                    agent_id,
                    fingerprint = %key,
                    in_flight = self.gate.in_flight(),
                    "no admission slot ({}), using fallback decision",
                    err
                );
                return Resolution::fallback(reason, key);
            }
        };

        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.call_timeout, self.oracle.decide(agent_id, situation)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let resolution = match outcome {
            Ok(Ok(decision)) => {
                if self.gate.is_closed() {
                    debug!(agent_id, fingerprint = %key, "resolver shut down, decision not cached");
                } else if let Some(kept) = self.cache.put_if_absent(key.clone(), decision.clone()) {
                    debug!(agent_id, fingerprint = %key, kept = %kept.action, elapsed_ms, "earlier decision already cached");
                } else {
                    debug!(agent_id, fingerprint = %key, action = %decision.action, elapsed_ms, "decision cached");
                }
                Resolution::new(decision, DecisionSource::Fresh, key)
            }
            Ok(Err(err)) => {
                self.counters.call_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent_id, fingerprint = %key, elapsed_ms, "decision call failed: {}", err);
                Resolution::fallback(FallbackReason::CallFailed(err.to_string()), key)
            }
            Err(_) => {
                self.counters.call_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent_id, fingerprint = %key, elapsed_ms, "decision call timed out");
                Resolution::fallback(FallbackReason::CallTimedOut, key)
            }
        };

        self.gate.release(permit);
        resolution
    }

    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        ResolverStats {
            requests: c.requests.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            calls: c.calls.load(Ordering::Relaxed),
            call_failures: c.call_failures.load(Ordering::Relaxed),
            admission_rejections: c.admission_rejections.load(Ordering::Relaxed),
            shared: c.shared.load(Ordering::Relaxed),
            leader_failures: c.leader_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting calls and drop cached decisions.
    ///
    /// Requests already waiting for a slot fall back; calls in flight finish
    /// but their results are not cached. Later requests resolve to the
    /// fallback decision.
    pub fn shutdown(&self) {
        self.gate.close();
        self.cache.clear();
        let stats = self.stats();
        info!(
            requests = stats.requests,
            hits = stats.hits,
            calls = stats.calls,
            fallbacks = stats.fallbacks(),
            "decision resolver shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.gate.is_closed()
    }
}
