use crate::chat::ChatResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// Request payloads

#[derive(Debug, Serialize)]
pub struct SessionStartParams {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageParams {
    pub system_prompt: String,
    pub session_id: String,
    pub user_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleteParams {
    pub session_id: String,
    pub summary: String,
}

/// Form snapshot for the save endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CounsellingRecord {
    pub email: Option<String>,
    pub summary: Option<String>,
    #[serde(flatten)]
    pub form: Map<String, Value>,
}

// Response payloads

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    #[serde(rename = "감정", default, deserialize_with = "null_as_empty")]
    pub emotion: String,
    #[serde(rename = "상담사_응답", default, deserialize_with = "null_as_empty")]
    pub counselor_reply: String,
    #[serde(rename = "요약", default, deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(rename = "세션_종료", default, deserialize_with = "lenient_bool")]
    pub session_ended: bool,
}

impl From<ChatReply> for ChatResult {
    fn from(reply: ChatReply) -> Self {
        Self {
            emotion: reply.emotion,
            counselor_reply: reply.counselor_reply,
            summary: reply.summary,
            session_ended: reply.session_ended,
        }
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Session start returns either a bare string or `{ "sessionId": "..." }`.
pub fn parse_session_id(value: &Value) -> Option<String> {
    value
        .get("sessionId")
        .and_then(|v| v.as_str())
        .or_else(|| value.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
