//! Application Configuration Module
//!
//! Loads the interview service settings from the environment (and a `.env`
//! file when present) into a single struct handed to `main`.

use interview_core::identity::CurrentUser;
use secrecy::SecretString;
use std::env;
use tracing::Level;

/// Relay used when `CALL_RELAY_URL` is not set.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8787/call";

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub relay_url: String,
    pub call_token: SecretString,
    /// Only needed for question generation; checked when that call starts.
    pub question_workflow_id: Option<String>,
    pub interviewer_assistant_id: Option<String>,
    /// Base URL of the interview API. Without it progress stays in memory.
    pub store_api_url: Option<String>,
    pub user: Option<CurrentUser>,
    pub mic_device: Option<String>,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `CALL_RELAY_URL`: (Optional) WebSocket URL of the call relay.
    // *   `CALL_TOKEN`: Bearer token for the relay. Required.
    // *   `QUESTION_WORKFLOW_ID`: Workflow dialled by `generate`.
    // *   `INTERVIEWER_ASSISTANT_ID`: (Optional) Assistant dialled by `interview`.
    // *   `STORE_API_URL`: (Optional) Interview API for progress and feedback.
    // *   `INTERVIEW_USER_ID` / `INTERVIEW_USER_NAME`: The signed-in user.
    // *   `MIC_DEVICE`: (Optional) Name of the input device to use. Defaults to the host's default input.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let call_token = var("CALL_TOKEN")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("CALL_TOKEN".to_string()))?;
        let relay_url = var("CALL_RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());

        let user = var("INTERVIEW_USER_ID").map(|id| CurrentUser {
            name: var("INTERVIEW_USER_NAME").unwrap_or_else(|| id.clone()),
            id,
        });

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            relay_url,
            call_token,
            question_workflow_id: var("QUESTION_WORKFLOW_ID"),
            interviewer_assistant_id: var("INTERVIEWER_ASSISTANT_ID"),
            store_api_url: var("STORE_API_URL"),
            user,
            mic_device: var("MIC_DEVICE"),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[("CALL_RELAY_URL", "ws://relay")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "CALL_TOKEN"));
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup(&[("CALL_TOKEN", "secret")])).unwrap();

        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.call_token.expose_secret(), "secret");
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.question_workflow_id.is_none());
        assert!(config.user.is_none());
    }

    #[test]
    fn reads_the_user_and_ids() {
        let config = Config::from_lookup(lookup(&[
            ("CALL_TOKEN", "secret"),
            ("QUESTION_WORKFLOW_ID", "wf-1"),
            ("INTERVIEW_USER_ID", "u-1"),
            ("STORE_API_URL", "https://api.example.com"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.question_workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(
            config.user,
            Some(CurrentUser {
                id: "u-1".into(),
                name: "u-1".into(),
            })
        );
        assert_eq!(config.store_api_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = Config::from_lookup(lookup(&[
            ("CALL_TOKEN", "secret"),
            ("QUESTION_WORKFLOW_ID", "  "),
        ]))
        .unwrap();
        assert!(config.question_workflow_id.is_none());
    }

    #[test]
    fn rejects_unknown_log_levels() {
        let err = Config::from_lookup(lookup(&[("CALL_TOKEN", "secret"), ("RUST_LOG", "chatty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(level) if level == "chatty"));
    }
}
