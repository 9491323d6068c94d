//! Decision caching and call admission
//!
//! This module sits between an agent's "I need a decision" event and the
//! external decision service:
//! - Fingerprinting of agent situations into cache keys
//! - TTL decision cache with lazy capacity pruning
//! - Admission gate bounding concurrent external calls
//! - Resolver orchestrating the three with fallback on every failure

pub mod cache;
pub mod fingerprint;
pub mod gate;
pub mod resolver;

pub use cache::{CacheEntry, DecisionCache};
pub use fingerprint::{derive_key, Fingerprint};
pub use gate::{AdmissionGate, GateError, Permit};
pub use resolver::{DecisionResolver, DecisionSource, FallbackReason, Resolution, ResolverStats};
