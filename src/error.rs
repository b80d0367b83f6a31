use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Backend response carried no session id")]
    MissingSessionId,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Could not start counseling session: {0}")]
    SessionStart(#[source] ApiError),

    #[error("Counseling turn failed: {0}")]
    Counsel(#[source] ApiError),
}

impl FlowError {
    /// Text shown to the user in a notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::SessionStart(_) => "상담 세션을 시작하지 못했어요. 잠시 후 다시 시도해주세요.",
            FlowError::Counsel(_) => "상담사 응답을 받지 못했어요. 다시 시도해주세요.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
