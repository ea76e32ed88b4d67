use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use examdesk_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for OpenAI and any server speaking the same
/// protocol (Ollama exposes it under `/v1`).
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let default_base = match config.provider {
            LlmProvider::Ollama => OLLAMA_BASE_URL,
            LlmProvider::OpenAi | LlmProvider::Rules => OPENAI_BASE_URL,
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            http,
            base_url: config.base_url.clone().unwrap_or_else(|| default_base.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": &self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        debug!(event_name = "agent.llm.request", model = %self.model, "calling language model");

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm api error {status}: {body}"));
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("llm returned no choices"))
    }
}

/// Replays canned replies in order. Errors once the script runs out.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { replies: Mutex::new(replies.into_iter().map(|reply| Ok(reply.into())).collect()) }
    }

    pub async fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted llm client has no replies left")),
        }
    }
}

/// `None` for the rule-based provider, which needs no model at all.
pub fn build_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    match config.provider {
        LlmProvider::Rules => Ok(None),
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            Ok(Some(Arc::new(OpenAiCompatibleClient::new(config)?)))
        }
    }
}

/// Pulls the JSON object out of a model reply, tolerating code fences and chatter.
pub fn parse_json_reply(reply: &str) -> Result<Value, String> {
    let start = reply.find('{').ok_or_else(|| "reply contains no JSON object".to_string())?;
    let end = reply.rfind('}').ok_or_else(|| "reply contains no JSON object".to_string())?;
    if end < start {
        return Err("reply contains no JSON object".to_string());
    }
    serde_json::from_str(&reply[start..=end]).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use examdesk_core::config::{AppConfig, LlmProvider};

    use super::{build_llm_client, parse_json_reply, LlmClient, ScriptedLlmClient};

    #[test]
    fn json_reply_survives_code_fences() {
        let reply = "```json\n{\"intent\": \"list_exams\", \"confidence\": 0.9}\n```";
        let value = parse_json_reply(reply).expect("json");
        assert_eq!(value["intent"], "list_exams");
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(parse_json_reply("I think you want exams").is_err());
        assert!(parse_json_reply("} oops {").is_err());
    }

    #[tokio::test]
    async fn scripted_client_replays_then_errors() {
        let client = ScriptedLlmClient::new(["first"]);
        client.push_error("boom").await;

        assert_eq!(client.complete("p").await.expect("first"), "first");
        assert!(client.complete("p").await.is_err());
        assert!(client.complete("p").await.is_err());
        assert_eq!(client.remaining().await, 0);
    }

    #[test]
    fn rules_provider_needs_no_client() {
        let mut config = AppConfig::default();
        assert!(build_llm_client(&config.llm).expect("rules").is_none());

        config.llm.provider = LlmProvider::Ollama;
        assert!(build_llm_client(&config.llm).expect("ollama").is_some());
    }
}
