use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete emotional state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,
    Alert,
    Afraid,
    Angry,
    Confident,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Calm,
        Mood::Alert,
        Mood::Afraid,
        Mood::Angry,
        Mood::Confident,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Alert => "alert",
            Mood::Afraid => "afraid",
            Mood::Angry => "angry",
            Mood::Confident => "confident",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mood: {s}"))
    }
}

/// Observable state of an agent at decision time.
///
/// Every field is already discretized: two situations that should share a
/// cached decision must compare equal here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Situation {
    /// Health as a bucketed percentage (0-100)
    pub health: u8,
    /// Hostile entities within perception range
    pub hostiles_nearby: u32,
    /// Friendly entities within perception range
    pub allies_nearby: u32,
    pub mood: Mood,
}

impl Situation {
    pub fn new(health: u8, hostiles_nearby: u32, allies_nearby: u32, mood: Mood) -> Self {
        Self {
            health: health.min(100),
            hostiles_nearby,
            allies_nearby,
            mood,
        }
    }

    /// Bucket raw health into a percentage floored to a multiple of `step`.
    ///
    /// `bucket_health(73.0, 100.0, 10) == 70`. A zero or negative `max` maps
    /// to 0, a zero `step` keeps whole-percent precision.
    pub fn bucket_health(current: f32, max: f32, step: u8) -> u8 {
        if !(max > 0.0) || !current.is_finite() {
            return 0;
        }
        let pct = ((current / max) * 100.0).clamp(0.0, 100.0) as u8;
        let step = step.max(1);
        pct - pct % step
    }

    pub fn is_threatened(&self) -> bool {
        self.hostiles_nearby > 0
    }

    pub fn is_outnumbered(&self) -> bool {
        self.hostiles_nearby > self.allies_nearby + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_health() {
        assert_eq!(Situation::bucket_health(73.0, 100.0, 10), 70);
        assert_eq!(Situation::bucket_health(79.9, 100.0, 10), 70);
        assert_eq!(Situation::bucket_health(40.0, 50.0, 25), 75);
        assert_eq!(Situation::bucket_health(150.0, 100.0, 10), 100);
        assert_eq!(Situation::bucket_health(-5.0, 100.0, 10), 0);
        assert_eq!(Situation::bucket_health(10.0, 0.0, 10), 0);
        assert_eq!(Situation::bucket_health(37.0, 100.0, 0), 37);
    }

    #[test]
    fn test_mood_parse_and_display() {
        assert_eq!("calm".parse::<Mood>().unwrap(), Mood::Calm);
        assert_eq!(" ANGRY ".parse::<Mood>().unwrap(), Mood::Angry);
        assert!("sleepy".parse::<Mood>().is_err());
        assert_eq!(Mood::Confident.to_string(), "confident");
    }

    #[test]
    fn test_situation_clamps_health() {
        let s = Situation::new(250, 0, 0, Mood::Calm);
        assert_eq!(s.health, 100);
        assert!(!s.is_threatened());
    }

    #[test]
    fn test_outnumbered() {
        assert!(Situation::new(80, 3, 1, Mood::Alert).is_outnumbered());
        assert!(!Situation::new(80, 2, 1, Mood::Alert).is_outnumbered());
    }
}
