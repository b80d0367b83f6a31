use crate::api::wire::{
    parse_session_id, ChatMessageParams, ChatReply, CounsellingRecord, SessionCompleteParams,
    SessionStartParams,
};
use crate::chat::ChatResult;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Backend collaborator of the flow controller.
#[async_trait]
pub trait CounselApi: Send + Sync {
    async fn start_session(&self, email: Option<&str>) -> Result<String, ApiError>;

    async fn send_message(&self, params: ChatMessageParams) -> Result<ChatResult, ApiError>;

    async fn complete_session(&self, session_id: &str, summary: &str) -> Result<(), ApiError>;

    async fn save_counselling(&self, record: &CounsellingRecord) -> Result<(), ApiError>;
}

pub struct HttpCounselApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCounselApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!("-> POST {}: {}", url, serde_json::to_string(body)?);

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("<- {} from {}: {}", status, url, text);

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl CounselApi for HttpCounselApi {
    async fn start_session(&self, email: Option<&str>) -> Result<String, ApiError> {
        let params = SessionStartParams {
            email: email.map(str::to_string),
        };
        let result = self.post("/api/chat/session/start", &params).await?;
        parse_session_id(&result).ok_or(ApiError::MissingSessionId)
    }

    async fn send_message(&self, params: ChatMessageParams) -> Result<ChatResult, ApiError> {
        let result = self.post("/api/chat/message", &params).await?;
        let reply: ChatReply = serde_json::from_value(result)?;
        Ok(reply.into())
    }

    async fn complete_session(&self, session_id: &str, summary: &str) -> Result<(), ApiError> {
        let params = SessionCompleteParams {
            session_id: session_id.to_string(),
            summary: summary.to_string(),
        };
        self.post("/api/chat/session/complete", &params).await?;
        Ok(())
    }

    async fn save_counselling(&self, record: &CounsellingRecord) -> Result<(), ApiError> {
        self.post("/api/counselling/save", record).await?;
        Ok(())
    }
}
