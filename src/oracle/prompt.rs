//! Prompt rendering and response parsing for the decision service

use serde::Deserialize;
use serde_json::json;

use crate::domain::{Action, Decision, Situation};
use crate::error::{Result, TacticianError};

/// System prompt sent with every decision request
pub const SYSTEM_PROMPT: &str = r#"You control a single agent in a real-time simulation.

Each request describes the agent's current situation: health percentage, the
number of hostile and friendly entities nearby, and its mood.

Choose exactly one next action from:
attack, defend, retreat, heal, explore, gather, socialize, idle

Respond ONLY with JSON of the form:
{"action": "<one of the actions>", "target": "<optional entity or place>", "reasoning": "<one short sentence>"}"#;

/// Render the user message for one decision request
pub fn render_prompt(agent_id: &str, situation: &Situation) -> String {
    let context = json!({
        "agent_id": agent_id,
        "health_pct": situation.health,
        "hostiles_nearby": situation.hostiles_nearby,
        "allies_nearby": situation.allies_nearby,
        "mood": situation.mood.as_str(),
    });
    format!(
        "## Situation\n\n```json\n{}\n```\n\nWhat should this agent do next?",
        serde_json::to_string_pretty(&context).unwrap_or_else(|_| context.to_string())
    )
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let content = text[start + 3..start + 3 + end].trim();
            // Skip language identifier if present
            if let Some(newline) = content.find('\n') {
                return content[newline + 1..].trim();
            }
            return content;
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }

    text.trim()
}

/// Looser shape models produce when they drift from the schema
#[derive(Debug, Deserialize)]
struct FlexibleDecision {
    #[serde(alias = "type", alias = "next_action", alias = "decision")]
    action: String,
    #[serde(default)]
    target: Option<serde_json::Value>,
    #[serde(default, alias = "reason", alias = "rationale")]
    reasoning: Option<String>,
}

/// Parse a model response into a decision.
///
/// Accepts fenced or raw JSON, action synonyms and a bare action word.
/// Anything else is an invalid response and counts as a failed call.
pub fn parse_decision(text: &str) -> Result<Decision> {
    let json_str = extract_json(text);

    if let Ok(decision) = serde_json::from_str::<Decision>(json_str) {
        return Ok(decision);
    }

    if let Ok(flexible) = serde_json::from_str::<FlexibleDecision>(json_str) {
        let action: Action = flexible
            .action
            .parse()
            .map_err(TacticianError::InvalidResponse)?;
        let target = match flexible.target {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(serde_json::Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        };
        return Ok(Decision {
            action,
            target,
            reasoning: flexible.reasoning.filter(|r| !r.trim().is_empty()),
        });
    }

    let word = json_str.trim().trim_matches(|c: char| c == '"' || c == '.');
    word.parse::<Action>().map(Decision::new).map_err(|_| {
        let preview: String = text.chars().take(120).collect();
        TacticianError::InvalidResponse(format!("unparseable decision: {preview}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mood;

    #[test]
    fn test_render_prompt_contains_situation() {
        let prompt = render_prompt("a1", &Situation::new(80, 2, 1, Mood::Calm));
        assert!(prompt.contains("\"agent_id\": \"a1\""));
        assert!(prompt.contains("\"health_pct\": 80"));
        assert!(prompt.contains("\"mood\": \"calm\""));
    }

    #[test]
    fn test_parse_decision_from_code_block() {
        let text = r#"Here's my call:

```json
{"action": "retreat", "reasoning": "outnumbered"}
```
"#;
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, Action::Retreat);
        assert_eq!(decision.reasoning.as_deref(), Some("outnumbered"));
    }

    #[test]
    fn test_parse_decision_flexible_shape() {
        let decision =
            parse_decision(r#"{"type": "FIGHT", "target": 7, "reason": "weak enemy"}"#).unwrap();
        assert_eq!(decision.action, Action::Attack);
        assert_eq!(decision.target.as_deref(), Some("7"));
        assert_eq!(decision.reasoning.as_deref(), Some("weak enemy"));
    }

    #[test]
    fn test_parse_decision_bare_word() {
        assert_eq!(parse_decision("Defend.").unwrap().action, Action::Defend);
    }

    #[test]
    fn test_parse_decision_rejects_garbage() {
        let err = parse_decision("I am not sure what to do here").unwrap_err();
        assert!(matches!(err, TacticianError::InvalidResponse(_)));

        let err = parse_decision(r#"{"action": "dance"}"#).unwrap_err();
        assert!(err.is_call_failure());
    }
}
