//! Neural routing layer — client for the external fine-tuned classifier.
//!
//! The model is consumed as an opaque `classify(prompt) -> text` call. Its
//! output is an untrusted parser boundary: we scan for a JSON object with a
//! `target`, validate every field, and fall back to the sentinel target when
//! anything is off. A misbehaving model never becomes a crash or a 5xx.
//!
//! Symbolic resolution stays authoritative for access control; the neural
//! result is only ever used to pick among registered agents that serve the
//! same topic.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Routing suggestion extracted from classifier output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuralRoute {
    pub target: String,
    /// Clamped to [0.0, 1.0] during parsing.
    pub confidence: f64,
    pub reasoning: String,
}

impl NeuralRoute {
    /// The hard fallback used whenever the classifier misbehaves.
    pub fn fallback(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            confidence: 0.0,
            reasoning: reason.into(),
        }
    }
}

/// The opaque classifier boundary.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Return the model's raw text output for a routing prompt.
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// HTTP classifier client (OpenAI-compatible completion endpoint).
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for HttpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClassifier")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpClassifier {
    /// Create a classifier client with a bounded per-request timeout so the
    /// routing path can never stall on a hung model server.
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Route the user query to the correct internal agent. Output JSON.",
                },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": 256,
        });

        debug!("Sending classification request for prompt ({} chars)", prompt.len());
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to classifier")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Classifier request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let value: Value = response
            .json()
            .await
            .context("Failed to parse classifier response body")?;
        let text = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .context("Classifier response missing message content")?;
        Ok(text.to_string())
    }
}

/// Parse classifier output into a [`NeuralRoute`].
///
/// Scans for the first JSON object in the text (models often add preamble),
/// requires a `target`, tolerates the legacy `reason` key, and clamps
/// confidence into [0.0, 1.0].
pub fn parse_route_json(text: &str) -> Result<NeuralRoute> {
    let start = text.find('{').context("No JSON object found in response")?;
    let end = text.rfind('}').context("No closing brace found in response")?;
    if end < start {
        return Err(anyhow!("Malformed JSON object in response"));
    }
    let json_str = &text[start..=end];

    let value: Value =
        serde_json::from_str(json_str).context("Failed to parse route JSON")?;

    let target = value
        .get("target")
        .and_then(|v| v.as_str())
        .filter(|t| !t.trim().is_empty())
        .context("Route JSON has no 'target' field")?
        .to_string();

    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let reasoning = value
        .get("reasoning")
        .or_else(|| value.get("reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Ok(NeuralRoute {
        target,
        confidence,
        reasoning,
    })
}

/// Ask the classifier for a route, degrading to the fallback target on any
/// failure — timeout, transport error, or unparseable output.
pub async fn resolve_neural(
    classifier: &dyn Classifier,
    query: &str,
    fallback_target: &str,
) -> NeuralRoute {
    match classifier.classify(query).await {
        Ok(text) => parse_route_json(&text).unwrap_or_else(|e| {
            warn!("Classifier output unparseable, using fallback: {}", e);
            NeuralRoute::fallback(fallback_target, format!("parse_failure: {}", e))
        }),
        Err(e) => {
            warn!("Classifier call failed, using fallback: {}", e);
            NeuralRoute::fallback(fallback_target, format!("classifier_error: {}", e))
        }
    }
}
