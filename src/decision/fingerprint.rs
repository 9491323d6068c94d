//! Situation fingerprinting
//!
//! A fingerprint is the cache key for a decision. It is a pure function of the
//! agent id and its (already discretized) situation: coarser buckets upstream
//! mean more situations collapse onto one key and more cache hits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Situation;

const FIELD_SEPARATOR: char = '|';

/// Deterministic cache key for an agent's situation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the cache key for `agent_id` in `situation`.
///
/// The agent id is the only free-form field, so it is length-prefixed: an id
/// containing the separator can never be confused with a different split of
/// the remaining fields. Numeric fields and mood labels never contain `|`.
pub fn derive_key(agent_id: &str, situation: &Situation) -> Fingerprint {
    let sep = FIELD_SEPARATOR;
    Fingerprint(format!(
        "{}:{agent_id}{sep}hp{}{sep}h{}{sep}a{}{sep}{}",
        agent_id.len(),
        situation.health,
        situation.hostiles_nearby,
        situation.allies_nearby,
        situation.mood.as_str(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mood;

    fn base() -> Situation {
        Situation::new(80, 2, 1, Mood::Calm)
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        assert_eq!(derive_key("a1", &base()), derive_key("a1", &base()));
        assert_eq!(derive_key("a1", &base()).as_str(), "2:a1|hp80|h2|a1|calm");
    }

    #[test]
    fn test_every_field_changes_key() {
        let key = derive_key("a1", &base());

        assert_ne!(key, derive_key("a2", &base()));
        assert_ne!(key, derive_key("a1", &Situation { health: 70, ..base() }));
        assert_ne!(key, derive_key("a1", &Situation { hostiles_nearby: 3, ..base() }));
        assert_ne!(key, derive_key("a1", &Situation { allies_nearby: 0, ..base() }));
        assert_ne!(key, derive_key("a1", &Situation { mood: Mood::Angry, ..base() }));
    }

    #[test]
    fn test_adjacent_numbers_do_not_collide() {
        // hostiles=12, allies=3 vs hostiles=1, allies=23 would collide under naive concat
        let a = derive_key("x", &Situation::new(50, 12, 3, Mood::Alert));
        let b = derive_key("x", &Situation::new(50, 1, 23, Mood::Alert));
        assert_ne!(a, b);
    }

    #[test]
    fn test_agent_id_with_separator_does_not_collide() {
        // An id that embeds what looks like a field must not alias another agent.
        let sneaky = derive_key("a1|hp80", &Situation::new(90, 2, 1, Mood::Calm));
        let plain = derive_key("a1", &Situation::new(80, 2, 1, Mood::Calm));
        assert_ne!(sneaky, plain);

        let x = derive_key("a|b", &base());
        let y = derive_key("a", &base());
        assert_ne!(x, y);
    }
}
