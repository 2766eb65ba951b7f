// src/classify/reasoner.rs
//! Reasoner clients. Each returns the raw structured text for a post; parsing
//! and gating happen in `inference`.
//!
//! Env:
//! - `REASONER_PROVIDER` = "openai" (default) | "disabled"
//! - `OPENAI_API_KEY`: without it the OpenAI client yields nothing
//! - `OPENAI_MODEL`: defaults to gpt-4o-mini

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::SocialPost;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[async_trait::async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means "nothing to say" (disabled, no credentials, empty reply).
    async fn classify(&self, prompt: &str, post: &SocialPost) -> Result<Option<String>>;
}

/// Always yields nothing; used when classification is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledReasoner;

#[async_trait::async_trait]
impl Reasoner for DisabledReasoner {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn classify(&self, _prompt: &str, _post: &SocialPost) -> Result<Option<String>> {
        Ok(None)
    }
}

/// OpenAI Chat Completions client.
pub struct OpenAiReasoner {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiReasoner {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-trust-score/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(key, model)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Deserialize)]
struct ToolFunction {
    #[serde(default)]
    arguments: Option<String>,
}

/// Tool-call arguments win over message content.
fn extract_reply(resp: Resp) -> Option<String> {
    let msg = resp.choices.into_iter().next()?.message;
    let from_tool = msg
        .tool_calls
        .into_iter()
        .next()
        .and_then(|t| t.function.arguments);
    from_tool
        .or(msg.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait::async_trait]
impl Reasoner for OpenAiReasoner {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn classify(&self, prompt: &str, post: &SocialPost) -> Result<Option<String>> {
        if !self.has_credentials() {
            debug!(target: "inference", "no OPENAI_API_KEY, skipping classification");
            return Ok(None);
        }

        let payload = serde_json::to_string(post).context("serializing post")?;
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: prompt,
                },
                Msg {
                    role: "user",
                    content: &payload,
                },
            ],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("openai returned {status}");
        }
        let body: Resp = resp.json().await.context("decoding openai response")?;
        Ok(extract_reply(body))
    }
}

/// Pick a reasoner from `REASONER_PROVIDER`.
pub fn build_reasoner_from_env() -> Result<Arc<dyn Reasoner>> {
    let provider = std::env::var("REASONER_PROVIDER")
        .unwrap_or_else(|_| "openai".to_string())
        .to_ascii_lowercase();
    let reasoner: Arc<dyn Reasoner> = match provider.as_str() {
        "openai" => Arc::new(OpenAiReasoner::from_env()?),
        "disabled" | "none" | "off" => Arc::new(DisabledReasoner),
        other => bail!("unknown REASONER_PROVIDER `{other}`"),
    };
    info!(target: "inference", provider = reasoner.name(), "reasoner ready");
    Ok(reasoner)
}
