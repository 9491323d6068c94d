pub mod cli;
pub mod config;
pub mod decision;
pub mod domain;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod simulation;

pub use config::AppConfig;
pub use decision::{
    derive_key, AdmissionGate, DecisionCache, DecisionResolver, DecisionSource, FallbackReason,
    Fingerprint, Resolution, ResolverStats,
};
pub use domain::{Action, Decision, Mood, Situation};
pub use error::{Result, TacticianError};
pub use oracle::{DecisionOracle, HttpOracle, RuleOracle};
