//! Chat-completions client for the external decision service
//!
//! Works against any OpenAI-compatible endpoint. The model is checked against
//! the configured allow-list at construction, and every call is bounded by the
//! configured timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use super::prompt::{parse_decision, render_prompt, SYSTEM_PROMPT};
use super::DecisionOracle;
use crate::config::OracleConfig;
use crate::domain::{Decision, Situation};
use crate::error::{Result, TacticianError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// LLM-backed decision oracle
pub struct HttpOracle {
    config: OracleConfig,
    http: Client,
}

impl HttpOracle {
    /// Create a new oracle; fails if the credential is missing or the model
    /// is outside the allow-list
    pub fn new(config: OracleConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(TacticianError::Configuration(
                "oracle.api_key is not set (TACTICIAN_API_KEY)".to_string(),
            ));
        }
        if !config.is_model_allowed(&config.model) {
            return Err(TacticianError::ModelNotAllowed {
                model: config.model.clone(),
                allowed: config.allowed_models.join(", "),
            });
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TacticianError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, agent_id: &str, situation: &Situation) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: render_prompt(agent_id, situation),
                },
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Decision service error: {} - {}", status, body);
            return Err(TacticianError::ExternalCall(format!(
                "decision service returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| TacticianError::InvalidResponse("empty completion".to_string()))
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn decide(&self, agent_id: &str, situation: &Situation) -> Result<Decision> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("decision_call", %request_id, agent_id, model = %self.config.model);

        async {
            let request = self.build_request(agent_id, situation);
            let started = Instant::now();

            let content = tokio::time::timeout(self.config.timeout(), self.send(&request))
                .await
                .map_err(|_| TacticianError::ExternalCallTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })??;

            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = content.len(),
                "decision service responded"
            );
            parse_decision(&content)
        }
        .instrument(span)
        .await
    }
}
