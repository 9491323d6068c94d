use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Next action an agent can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Attack,
    Defend,
    Retreat,
    Heal,
    Explore,
    Gather,
    Socialize,
    Idle,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Attack => "attack",
            Action::Defend => "defend",
            Action::Retreat => "retreat",
            Action::Heal => "heal",
            Action::Explore => "explore",
            Action::Gather => "gather",
            Action::Socialize => "socialize",
            Action::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts the canonical names plus the synonyms models tend to produce.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "attack" | "fight" | "engage" | "strike" => Ok(Action::Attack),
            "defend" | "guard" | "block" | "hold_position" => Ok(Action::Defend),
            "retreat" | "flee" | "run" | "escape" => Ok(Action::Retreat),
            "heal" | "recover" | "rest" => Ok(Action::Heal),
            "explore" | "scout" | "wander" | "move" => Ok(Action::Explore),
            "gather" | "collect" | "forage" => Ok(Action::Gather),
            "socialize" | "talk" | "greet" | "chat" => Ok(Action::Socialize),
            "idle" | "wait" | "none" | "no_action" => Ok(Action::Idle),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

const FALLBACK_REASONING: &str = "no decision available; holding position";

/// Outcome of the external decision service for one situation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Decision {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            target: None,
            reasoning: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Conservative default used whenever no fresh or cached decision exists
    pub fn fallback() -> Self {
        Self::new(Action::Idle).with_reasoning(FALLBACK_REASONING)
    }

    pub fn is_fallback(&self) -> bool {
        self.action == Action::Idle && self.reasoning.as_deref() == Some(FALLBACK_REASONING)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} -> {}", self.action, target),
            None => write!(f, "{}", self.action),
        }
    }
}
