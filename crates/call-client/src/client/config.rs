use crate::client::consts::{BASE_URL, CALL_RELAY_URL, CALL_TOKEN};
use secrecy::SecretString;

pub struct Config {
    base_url: String,
    token: SecretString,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.config.token = SecretString::from(token.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults come from the environment; a missing token means an
    // unauthenticated relay.
    pub fn new() -> Self {
        Self {
            base_url: std::env::var(CALL_RELAY_URL).unwrap_or_else(|_| BASE_URL.to_string()),
            token: std::env::var(CALL_TOKEN).unwrap_or_default().into(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
