use crate::error::ConfigError;
use crate::profile::UserProfile;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Console,
    Telegram,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub interface: InterfaceKind,
    pub auto_start_from_profile: bool,
    /// Profile of the console user.
    pub profile: UserProfile,
    pub telegram_token: Option<String>,
    pub telegram_whitelist: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let http_timeout = match get("MINDBRIDGE_HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::Invalid {
                key: "MINDBRIDGE_HTTP_TIMEOUT_SECS",
                value: v.clone(),
            })?),
            None => Duration::from_secs(60),
        };

        let interface = match get("MINDBRIDGE_INTERFACE").as_deref() {
            None | Some("console") => InterfaceKind::Console,
            Some("telegram") => InterfaceKind::Telegram,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MINDBRIDGE_INTERFACE",
                    value: other.to_string(),
                })
            }
        };

        let auto_start_from_profile = match get("MINDBRIDGE_AUTO_START").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MINDBRIDGE_AUTO_START",
                    value: other.to_string(),
                })
            }
        };

        let age = match get("MINDBRIDGE_USER_AGE") {
            Some(v) => Some(v.parse().map_err(|_| ConfigError::Invalid {
                key: "MINDBRIDGE_USER_AGE",
                value: v.clone(),
            })?),
            None => None,
        };

        let profile = UserProfile {
            email: get("MINDBRIDGE_USER_EMAIL"),
            name: get("MINDBRIDGE_USER_NAME"),
            gender: get("MINDBRIDGE_USER_GENDER"),
            age,
            current_state: get("MINDBRIDGE_USER_STATE"),
        };

        // Parse whitelist
        let telegram_whitelist = get("TELEGRAM_WHITELIST")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            api_base_url: get("MINDBRIDGE_API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            http_timeout,
            interface,
            auto_start_from_profile,
            profile,
            telegram_token: get("TELOXIDE_TOKEN").or_else(|| get("TELEGRAM_BOT_TOKEN")),
            telegram_whitelist,
        })
    }
}
