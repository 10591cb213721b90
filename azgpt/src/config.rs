//! Configuration loaded from environment variables.
//!
//! [`AppConfig`] groups three sections: how to obtain bearer tokens
//! ([`TokenConfig`]), where to send chat completions ([`ChatConfig`]) and how
//! to synthesize speech ([`SpeechConfig`]). Values come from the process
//! environment; the binary loads a `.env` file into it first.
//!
//! Every problem found while loading is collected as a [`ConfigIssue`] so the
//! user sees all missing variables at once instead of one per run.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::token::{Credentials, DEFAULT_TOKEN_URL, DEFAULT_VALIDITY_MARGIN};

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Token acquisition settings.
    pub token: TokenConfig,
    /// Chat completion settings.
    pub chat: ChatConfig,
    /// Speech synthesis settings.
    pub speech: SpeechConfig,
}

/// Settings for obtaining and caching bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Token endpoint URL.
    pub endpoint: String,
    /// Credentials exchanged for a token.
    pub credentials: Credentials,
    /// Location of the token cache file.
    pub cache_path: PathBuf,
    /// How long a fetched token is reused.
    pub validity_margin: Duration,
    /// Skip TLS certificate validation toward the token endpoint.
    pub accept_invalid_certs: bool,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl TokenConfig {
    /// Creates a token configuration with default endpoint, cache path and margin.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            endpoint: DEFAULT_TOKEN_URL.to_owned(),
            credentials,
            cache_path: crate::util::token_cache_path(),
            validity_margin: DEFAULT_VALIDITY_MARGIN,
            accept_invalid_certs: false,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the token endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the cache file location.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }
}

/// Azure OpenAI chat settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Resource host, e.g. `my-resource.openai.azure.com`.
    pub endpoint: String,
    /// `api-version` query parameter.
    pub api_version: String,
    /// Deployment name.
    pub model: String,
    /// System prompt sent before the user message.
    pub system_prompt: String,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl ChatConfig {
    /// Default API version.
    pub const DEFAULT_API_VERSION: &'static str = "2023-05-15";
    /// Default deployment.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";
    /// Default system prompt.
    pub const DEFAULT_SYSTEM_PROMPT: &'static str = "You are a helpful assistant.";

    /// Creates chat settings for `endpoint` with default version and model.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: Self::DEFAULT_API_VERSION.to_owned(),
            model: Self::DEFAULT_MODEL.to_owned(),
            system_prompt: Self::DEFAULT_SYSTEM_PROMPT.to_owned(),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the deployment name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Azure Speech settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Service region.
    pub region: String,
    /// Default voice name.
    pub voice: String,
    /// Endpoint override; derived from the region when unset.
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl SpeechConfig {
    /// Default region.
    pub const DEFAULT_REGION: &'static str = "eastus";
    /// Default voice.
    pub const DEFAULT_VOICE: &'static str = "en-US-JennyNeural";

    /// Synthesis URL for the configured region or override.
    #[must_use]
    pub fn synthesis_url(&self) -> String {
        self.endpoint.as_deref().map_or_else(
            || {
                format!(
                    "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                    self.region
                )
            },
            crate::util::with_scheme,
        )
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: Self::DEFAULT_REGION.to_owned(),
            voice: Self::DEFAULT_VOICE.to_owned(),
            endpoint: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Environment variable names.
pub mod vars {
    /// Account user name.
    pub const USERNAME: &str = "USERNAME";
    /// Account password.
    pub const PASSWORD: &str = "PASSWORD";
    /// Registered client id.
    pub const CLIENT_ID: &str = "CLIENT_ID";
    /// Requested scope.
    pub const SCOPE: &str = "SCOPE";
    /// Token endpoint override.
    pub const TOKEN_URL: &str = "AZGPT_TOKEN_URL";
    /// Token cache file override.
    pub const TOKEN_CACHE: &str = "AZGPT_TOKEN_CACHE";
    /// Validity margin in seconds.
    pub const TOKEN_MARGIN_SECS: &str = "AZGPT_TOKEN_MARGIN_SECS";
    /// Disable certificate validation toward the token endpoint.
    pub const ACCEPT_INVALID_CERTS: &str = "AZGPT_ACCEPT_INVALID_CERTS";
    /// HTTP timeout in seconds.
    pub const TIMEOUT_SECS: &str = "AZGPT_TIMEOUT_SECS";
    /// Azure OpenAI resource host.
    pub const OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
    /// Azure OpenAI API version.
    pub const OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
    /// Chat deployment.
    pub const CHAT_MODEL: &str = "CHAT_MODEL";
    /// Speech region.
    pub const SPEECH_REGION: &str = "AZURE_SPEECH_REGION";
    /// Speech voice.
    pub const SPEECH_VOICE: &str = "AZURE_SPEECH_VOICE";
    /// Speech endpoint override.
    pub const SPEECH_ENDPOINT: &str = "AZURE_SPEECH_ENDPOINT";
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every error-level issue.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every error-level issue.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = EnvReader {
            lookup: |name: &str| lookup(name).filter(|v| !v.trim().is_empty()),
            issues: Vec::new(),
        };

        let username = reader.required(vars::USERNAME);
        let password = reader.required(vars::PASSWORD);
        let client_id = reader.required(vars::CLIENT_ID);
        let scope = reader.required(vars::SCOPE);
        let openai_endpoint = reader.required(vars::OPENAI_ENDPOINT);

        let margin_secs = reader.parsed::<u64>(vars::TOKEN_MARGIN_SECS);
        let timeout_secs = reader
            .parsed::<u64>(vars::TIMEOUT_SECS)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let accept_invalid_certs = reader.flag(vars::ACCEPT_INVALID_CERTS);
        let timeout_secs = (timeout_secs > 0).then_some(timeout_secs);

        let token = TokenConfig {
            endpoint: reader
                .optional(vars::TOKEN_URL)
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_owned()),
            credentials: Credentials::password(username, password, client_id, scope),
            cache_path: reader
                .optional(vars::TOKEN_CACHE)
                .map_or_else(crate::util::token_cache_path, PathBuf::from),
            validity_margin: margin_secs.map_or(DEFAULT_VALIDITY_MARGIN, Duration::from_secs),
            accept_invalid_certs,
            timeout_secs,
        };

        let chat = ChatConfig {
            endpoint: openai_endpoint,
            api_version: reader
                .optional(vars::OPENAI_API_VERSION)
                .unwrap_or_else(|| ChatConfig::DEFAULT_API_VERSION.to_owned()),
            model: reader
                .optional(vars::CHAT_MODEL)
                .unwrap_or_else(|| ChatConfig::DEFAULT_MODEL.to_owned()),
            system_prompt: ChatConfig::DEFAULT_SYSTEM_PROMPT.to_owned(),
            timeout_secs,
        };

        let speech = SpeechConfig {
            region: reader
                .optional(vars::SPEECH_REGION)
                .unwrap_or_else(|| SpeechConfig::DEFAULT_REGION.to_owned()),
            voice: reader
                .optional(vars::SPEECH_VOICE)
                .unwrap_or_else(|| SpeechConfig::DEFAULT_VOICE.to_owned()),
            endpoint: reader.optional(vars::SPEECH_ENDPOINT),
            timeout_secs,
        };

        if reader
            .issues
            .iter()
            .any(|issue| issue.level == IssueLevel::Error)
        {
            return Err(Error::config(reader.issues));
        }

        Ok(Self {
            token,
            chat,
            speech,
        })
    }

    /// Validate the configuration and return any issues found.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.token.accept_invalid_certs {
            issues.push(ConfigIssue::warning(
                vars::ACCEPT_INVALID_CERTS,
                "certificate validation toward the token endpoint is disabled",
            ));
        }

        if self.token.validity_margin.is_zero() {
            issues.push(ConfigIssue::warning(
                vars::TOKEN_MARGIN_SECS,
                "validity margin is 0, every call will fetch a new token",
            ));
        }

        if !self.token.endpoint.starts_with("https://") {
            issues.push(ConfigIssue::warning(
                vars::TOKEN_URL,
                "token endpoint does not use https",
            ));
        }

        issues
    }
}

/// Collects values and issues while reading variables.
struct EnvReader<F> {
    lookup: F,
    issues: Vec<ConfigIssue>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn required(&mut self, name: &str) -> String {
        (self.lookup)(name).unwrap_or_else(|| {
            self.issues.push(ConfigIssue::error(name, "is required"));
            String::new()
        })
    }

    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn parsed<T: std::str::FromStr>(&mut self, name: &str) -> Option<T> {
        let raw = (self.lookup)(name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.issues.push(ConfigIssue::error(
                    name,
                    format!("expected a non-negative integer, got `{raw}`"),
                ));
                None
            }
        }
    }

    fn flag(&mut self, name: &str) -> bool {
        let Some(raw) = (self.lookup)(name) else {
            return false;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.issues.push(ConfigIssue::error(
                    name,
                    format!("expected a boolean, got `{raw}`"),
                ));
                false
            }
        }
    }
}

/// Configuration validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Issue severity level.
    pub level: IssueLevel,
    /// Variable the issue is about (e.g., `USERNAME`).
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl ConfigIssue {
    /// Create an error-level issue.
    #[must_use]
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a warning-level issue.
    #[must_use]
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            IssueLevel::Error => "ERROR",
            IssueLevel::Warning => "WARN",
        };
        write!(f, "[{}] {}: {}", prefix, self.path, self.message)
    }
}

/// Severity level for configuration issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// Prevents the client from running.
    Error,
    /// Worth knowing, not fatal.
    Warning,
}
