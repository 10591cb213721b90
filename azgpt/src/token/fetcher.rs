//! Exchange of long-lived credentials for a short-lived bearer token.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://token.com/accessToken";

/// Source of fresh bearer tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Obtains a new bearer token. Does not persist anything.
    async fn fetch_token(&self) -> Result<String>;
}

/// Credentials sent to the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Resource-owner password credentials.
    Password {
        /// Account user name.
        username: String,
        /// Account password.
        password: String,
        /// Registered client id.
        client_id: String,
        /// Requested scope.
        scope: String,
    },
    /// Client id only.
    ClientId {
        /// Registered client id.
        client_id: String,
    },
}

impl Credentials {
    /// Creates password credentials.
    #[must_use]
    pub fn password(
        username: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
            client_id: client_id.into(),
            scope: scope.into(),
        }
    }

    /// Creates client-id-only credentials.
    #[must_use]
    pub fn client_id(client_id: impl Into<String>) -> Self {
        Self::ClientId {
            client_id: client_id.into(),
        }
    }

    /// Form fields for the token request, in request order.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Password {
                username,
                password,
                client_id,
                scope,
            } => vec![
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("client_id", client_id.as_str()),
                ("scope", scope.as_str()),
            ],
            Self::ClientId { client_id } => vec![("clientId", client_id.as_str())],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password {
                username,
                client_id,
                scope,
                ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("client_id", client_id)
                .field("scope", scope)
                .finish(),
            Self::ClientId { client_id } => f
                .debug_struct("ClientId")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Token fetcher performing a form-encoded POST against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    client: Client,
    url: String,
    credentials: Credentials,
}

impl HttpTokenFetcher {
    /// Creates a fetcher with a client that validates certificates.
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        Self::builder(url, credentials).build()
    }

    /// Starts building a fetcher.
    #[must_use]
    pub fn builder(url: impl Into<String>, credentials: Credentials) -> HttpTokenFetcherBuilder {
        HttpTokenFetcherBuilder {
            url: url.into(),
            credentials,
            accept_invalid_certs: false,
            timeout: None,
        }
    }

    /// Creates a fetcher around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            url: url.into(),
            credentials,
        }
    }

    /// The token endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch_token(&self) -> Result<String> {
        debug!(url = %self.url, "requesting bearer token");

        let response = self
            .client
            .post(&self.url)
            .form(&self.credentials.form_fields())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth_fetch(status));
        }

        let text = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            Error::response_format("token response JSON", format!("parse error: {e}"))
        })?;

        parsed
            .access_token
            .ok_or_else(|| Error::response_format("`access_token` field", "missing field"))
    }
}

/// Builder for [`HttpTokenFetcher`].
#[derive(Debug)]
pub struct HttpTokenFetcherBuilder {
    url: String,
    credentials: Credentials,
    accept_invalid_certs: bool,
    timeout: Option<Duration>,
}

impl HttpTokenFetcherBuilder {
    /// Disables TLS certificate validation toward the token endpoint.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the fetcher and its HTTP client.
    pub fn build(self) -> Result<HttpTokenFetcher> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if self.accept_invalid_certs {
            warn!(url = %self.url, "certificate validation disabled for token endpoint");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(HttpTokenFetcher::with_client(
            client,
            self.url,
            self.credentials,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn password_form_fields_in_order() {
        let creds = Credentials::password("alice", "s3cret&x", "client-1", "api://x/.default");
        let fields = creds.form_fields();
        let names: Vec<_> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(names, ["username", "password", "client_id", "scope"]);
        assert_eq!(fields[1].1, "s3cret&x");
    }

    #[test]
    fn client_id_form_field() {
        let creds = Credentials::client_id("234");
        assert_eq!(creds.form_fields(), vec![("clientId", "234")]);
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::password("alice", "hunter2", "client-1", "scope");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("alice"));
    }

    #[test]
    fn form_body_is_url_encoded() {
        let creds = Credentials::password("a b", "p&q=r", "c", "s/t");
        let request = Client::new()
            .post("http://localhost/token")
            .form(&creds.form_fields())
            .build()
            .unwrap();
        let body = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        assert_eq!(
            std::str::from_utf8(body).unwrap(),
            "username=a+b&password=p%26q%3Dr&client_id=c&scope=s%2Ft"
        );
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn builder_defaults_to_strict_tls() {
        let builder = HttpTokenFetcher::builder(DEFAULT_TOKEN_URL, Credentials::client_id("1"));
        assert!(!builder.accept_invalid_certs);
        let fetcher = builder.build().unwrap();
        assert_eq!(fetcher.url(), DEFAULT_TOKEN_URL);
    }
}
