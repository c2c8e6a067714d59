//! Chat completions client shared by the vision and field extractors.
//!
//! Two deployment shapes are supported. With an Azure deployment URL the request goes there verbatim
//! with an `api-key` header and no `model` field. Otherwise it goes to the OpenAI-compatible URL with
//! a bearer token and the configured model.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument};
use url::Url;

use super::ExtractionError;
use crate::config::ExtractionConfig;

#[derive(Debug, Clone)]
enum Target {
    Azure(Url),
    OpenAi { url: Url, model: String },
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends chat completion payloads and returns the first choice's content.
///
/// A semaphore bounds the number of in-flight calls across every request that shares the client.
#[derive(Debug, Clone)]
pub struct CompletionsClient {
    client: Client,
    target: Target,
    api_key: Option<String>,
    limiter: Arc<Semaphore>,
}

impl CompletionsClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let target = match &config.azure_endpoint {
            Some(url) => Target::Azure(url.clone()),
            None => Target::OpenAi {
                url: config.openai_url.clone(),
                model: config.model.clone(),
            },
        };

        Ok(Self {
            client,
            target,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
        })
    }

    /// Post `payload` and return the trimmed content of the first choice.
    ///
    /// `payload` is everything except `model`, which is added here when the target needs it.
    #[instrument(skip_all, err)]
    pub async fn complete(&self, mut payload: Value) -> Result<String, ExtractionError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractionError::NotConfigured)?;

        let request = match &self.target {
            Target::Azure(url) => self.client.post(url.clone()).header("api-key", api_key),
            Target::OpenAi { url, model } => {
                if let Value::Object(map) = &mut payload {
                    map.insert("model".to_string(), Value::String(model.clone()));
                }
                self.client.post(url.clone()).bearer_auth(api_key)
            }
        };

        let _permit = self.limiter.acquire().await.map_err(|_| ExtractionError::LimiterClosed)?;
        let response = request.json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Completion API returned an error");
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body_text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body_text).map_err(|e| ExtractionError::Malformed {
            reason: format!("error decoding response body: {e}"),
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| ExtractionError::Malformed {
            reason: "response has no choices".to_string(),
        })?;

        let content = choice.message.content.unwrap_or_default().trim().to_string();
        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}
