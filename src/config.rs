use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_GENAI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_GENAI_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Scribe server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key passed to the generative model endpoint.
    pub genai_api_key: String,
    /// Model identifier used for extraction and text operations.
    pub genai_model: String,
    /// Base URL of the generative model API.
    pub genai_base_url: String,
    /// Request timeout applied to every model call, in seconds.
    pub genai_timeout_secs: u64,
    /// Hosted backend used for identity and account documents.
    pub backend_provider: BackendProvider,
    /// Firebase project identifier (required for the Firebase backend).
    pub firebase_project_id: Option<String>,
    /// Firebase web API key (required for the Firebase backend).
    pub firebase_api_key: Option<String>,
    /// Base URL of the Firestore REST API.
    pub firestore_base_url: String,
    /// Base URL of the Identity Toolkit REST API.
    pub identity_base_url: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Maximum accepted request body size for uploads.
    pub max_upload_bytes: usize,
    /// ID token used by the MCP binary to resolve its session.
    pub mcp_id_token: Option<String>,
}

/// Supported identity/document backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Firebase Authentication + Firestore over REST.
    Firebase,
    /// Process-local stand-in for development and tests.
    Memory,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let backend_provider = match optional("BACKEND_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("BACKEND_PROVIDER".to_string()))?,
            None => BackendProvider::Firebase,
        };

        let (firebase_project_id, firebase_api_key) = match backend_provider {
            BackendProvider::Firebase => (
                Some(required("FIREBASE_PROJECT_ID")?),
                Some(required("FIREBASE_API_KEY")?),
            ),
            BackendProvider::Memory => (
                optional("FIREBASE_PROJECT_ID"),
                optional("FIREBASE_API_KEY"),
            ),
        };

        Ok(Self {
            genai_api_key: required("GENAI_API_KEY")?,
            genai_model: optional("GENAI_MODEL").unwrap_or_else(|| DEFAULT_GENAI_MODEL.into()),
            genai_base_url: optional("GENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GENAI_BASE_URL.into()),
            genai_timeout_secs: parse_optional(optional("GENAI_TIMEOUT_SECS"), "GENAI_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_GENAI_TIMEOUT_SECS),
            backend_provider,
            firebase_project_id,
            firebase_api_key,
            firestore_base_url: optional("FIRESTORE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.into()),
            identity_base_url: optional("IDENTITY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_IDENTITY_BASE_URL.into()),
            server_port: parse_optional(optional("SERVER_PORT"), "SERVER_PORT")?,
            max_upload_bytes: parse_optional(optional("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            mcp_id_token: optional("RUSTY_SCRIBE_ID_TOKEN"),
        })
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for BackendProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firebase" => Ok(Self::Firebase),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        genai_model = %config.genai_model,
        genai_base_url = %config.genai_base_url,
        backend = ?config.backend_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn memory_backend_needs_only_model_key() {
        let config = Config::from_lookup(lookup(&[
            ("GENAI_API_KEY", "secret"),
            ("BACKEND_PROVIDER", "memory"),
        ]))
        .expect("config");

        assert_eq!(config.backend_provider, BackendProvider::Memory);
        assert_eq!(config.genai_model, DEFAULT_GENAI_MODEL);
        assert_eq!(config.genai_timeout_secs, DEFAULT_GENAI_TIMEOUT_SECS);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.server_port.is_none());
    }

    #[test]
    fn firebase_backend_requires_credentials() {
        let error = Config::from_lookup(lookup(&[("GENAI_API_KEY", "secret")]))
            .expect_err("missing project id");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "FIREBASE_PROJECT_ID"));
    }

    #[test]
    fn rejects_unparseable_port() {
        let error = Config::from_lookup(lookup(&[
            ("GENAI_API_KEY", "secret"),
            ("BACKEND_PROVIDER", "memory"),
            ("SERVER_PORT", "eighty"),
        ]))
        .expect_err("invalid port");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "SERVER_PORT"));
    }

    #[test]
    fn blank_values_are_treated_as_missing() {
        let config = Config::from_lookup(lookup(&[
            ("GENAI_API_KEY", "secret"),
            ("BACKEND_PROVIDER", "memory"),
            ("GENAI_MODEL", "   "),
        ]))
        .expect("config");
        assert_eq!(config.genai_model, DEFAULT_GENAI_MODEL);
    }
}
