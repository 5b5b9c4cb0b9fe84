use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to every external call (mailbox, LLM, embedding).
const EXTERNAL_CALL_TIMEOUT_SECS: u64 = 30;

// --- Wire types (mailbox REST shapes) ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MimePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

/// One raw mailbox message: headers plus base64url-encoded MIME parts.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailboxPayload {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    /// Epoch milliseconds as a string, provider convention.
    #[serde(rename = "internalDate", default)]
    pub internal_date: Option<String>,
    pub payload: MimePart,
}

// --- Capabilities ---
// Injected as Arc<dyn …> everywhere; nothing in the crate instantiates a
// transport at module scope.

#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List candidate messages matching `query`, newest first, capped at `max`.
    async fn list(&self, query: &str, max: usize) -> PipelineResult<Vec<MessageRef>>;
    /// Fetch one message in full.
    async fn get(&self, id: &str) -> PipelineResult<MailboxPayload>;
    /// Send a base64url-encoded RFC 5322 message on a thread. Returns the
    /// provider id of the sent message.
    async fn send(&self, raw_b64: &str, thread_id: &str) -> PipelineResult<String>;
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, system: &str, user: &str, temperature: f64) -> PipelineResult<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>>;
    fn dim(&self) -> usize;
}

/// The full set of external capabilities the pipeline consumes.
#[derive(Clone)]
pub struct ClientSet {
    pub mailbox: Arc<dyn MailboxClient>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn Embedder>,
}

impl ClientSet {
    pub fn from_config(config: &AppConfig) -> Self {
        ClientSet {
            mailbox: Arc::new(HttpMailboxClient::new(&config.mailbox_token)),
            llm: Arc::new(HttpLlmClient::new(
                &config.llm_base_url,
                &config.llm_api_key,
                &config.llm_model,
            )),
            embedder: Arc::new(HttpEmbedder::new(
                &config.llm_base_url,
                &config.embed_api_key,
                &config.embed_model,
                config.embed_dim,
            )),
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(EXTERNAL_CALL_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

// --- Mailbox over REST ---

pub struct HttpMailboxClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpMailboxClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url("https://gmail.googleapis.com/gmail/v1/users/me", token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        HttpMailboxClient {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[async_trait]
impl MailboxClient for HttpMailboxClient {
    async fn list(&self, query: &str, max: usize) -> PipelineResult<Vec<MessageRef>> {
        let max = max.to_string();
        let resp = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("q", query), ("maxResults", max.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "mailbox list failed: HTTP {}",
                resp.status()
            )));
        }
        let body: ListResponse = resp.json().await?;
        Ok(body.messages)
    }

    async fn get(&self, id: &str) -> PipelineResult<MailboxPayload> {
        let resp = self
            .http
            .get(format!("{}/messages/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .query(&[("format", "full")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "mailbox get {id} failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    async fn send(&self, raw_b64: &str, thread_id: &str) -> PipelineResult<String> {
        let resp = self
            .http
            .post(format!("{}/messages/send", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "raw": raw_b64, "threadId": thread_id }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "mailbox send failed: HTTP {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body["id"].as_str().unwrap_or_default().to_string())
    }
}

// --- Chat-completion LLM ---

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        HttpLlmClient {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, system: &str, user: &str, temperature: f64) -> PipelineResult<String> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "temperature": temperature,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "LLM call failed: HTTP {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::Transport("LLM response missing content".to_string()))
    }
}

// --- Embedding provider ---

pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, dim: usize) -> Self {
        HttpEmbedder {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dim,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "embedding call failed: HTTP {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        let vector: Vec<f32> = body["data"][0]["embedding"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
            .unwrap_or_default();
        if vector.len() != self.dim {
            return Err(PipelineError::Transport(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(vector)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
