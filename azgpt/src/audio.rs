//! Azure text-to-speech.
//!
//! [`SpeechClient::synthesize`] turns text into an audio file with a single
//! awaited call. Service-side rejections come back as
//! [`SpeechOutcome::Failed`]; token and transport problems are errors.
//!
//! ```rust,ignore
//! let request = SpeechRequest::new("Hello, world!").output("hello.wav");
//! match speech.synthesize(&request).await? {
//!     SpeechOutcome::Completed { path, bytes } => println!("{bytes} bytes in {}", path.display()),
//!     SpeechOutcome::Failed { reason } => eprintln!("{reason}"),
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::config::SpeechConfig;
use crate::error::{Error, Result};
use crate::token::TokenProvider;

/// Default output file.
pub const DEFAULT_OUTPUT_FILE: &str = "output.wav";

/// Audio container requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// 24 kHz 16-bit mono PCM in a RIFF/WAV container.
    #[default]
    Wav,
    /// 24 kHz 48 kbit/s mono MP3.
    Mp3,
}

impl AudioFormat {
    /// Value of the `X-Microsoft-OutputFormat` header.
    #[must_use]
    pub const fn output_format(&self) -> &'static str {
        match self {
            Self::Wav => "riff-24khz-16bit-mono-pcm",
            Self::Mp3 => "audio-24khz-48kbitrate-mono-mp3",
        }
    }

    /// Get the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    /// Picks the format from a file name; anything but `.mp3` is WAV.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => Self::Mp3,
            _ => Self::Wav,
        }
    }
}

/// What to synthesize and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Text to speak.
    pub text: String,
    /// Destination file.
    pub output: PathBuf,
    /// Voice override; the configured voice is used when `None`.
    pub voice: Option<String>,
}

impl SpeechRequest {
    /// Creates a request writing to [`DEFAULT_OUTPUT_FILE`].
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            voice: None,
        }
    }

    /// Sets the destination file.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// Sets the voice.
    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Result of a synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Audio was written to `path`.
    Completed {
        /// File holding the audio.
        path: PathBuf,
        /// Number of audio bytes written.
        bytes: usize,
    },
    /// The service refused or could not synthesize the text.
    Failed {
        /// Service-provided explanation.
        reason: String,
    },
}

impl SpeechOutcome {
    /// Whether audio was produced.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Converts a failed outcome into [`Error::Speech`].
    ///
    /// # Errors
    ///
    /// Returns the failure reason as an error.
    pub fn into_result(self) -> Result<(PathBuf, usize)> {
        match self {
            Self::Completed { path, bytes } => Ok((path, bytes)),
            Self::Failed { reason } => Err(Error::speech(reason)),
        }
    }
}

/// Builds the SSML document for `text` spoken by `voice`.
#[must_use]
pub fn build_ssml(text: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>{text}</voice></speak>",
        lang = quick_xml::escape::escape(voice_language(voice)),
        voice = quick_xml::escape::escape(voice),
        text = quick_xml::escape::escape(text),
    )
}

/// Language tag of a voice name, e.g. `en-US` for `en-US-JennyNeural`.
#[must_use]
pub fn voice_language(voice: &str) -> &str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &voice[..second],
        _ => "en-US",
    }
}

/// Client for the Azure Speech REST synthesis endpoint.
#[derive(Clone)]
pub struct SpeechClient {
    config: Arc<SpeechConfig>,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for SpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpeechClient {
    /// Creates a speech client that authenticates with tokens from `tokens`.
    pub fn new(config: SpeechConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            client,
            tokens,
        })
    }

    /// The speech configuration in use.
    #[must_use]
    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Synthesizes `request.text` into `request.output`.
    ///
    /// # Errors
    ///
    /// Fails when no token can be obtained, the endpoint cannot be reached,
    /// or the audio file cannot be written.
    pub async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechOutcome> {
        let token = self.tokens.auth_token().await?;
        let voice = request.voice.as_deref().unwrap_or(&self.config.voice);
        let format = AudioFormat::from_path(&request.output);
        let url = self.config.synthesis_url();
        debug!(url = %url, voice, format = format.extension(), "sending speech request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", format.output_format())
            .header(reqwest::header::USER_AGENT, "azgpt")
            .body(build_ssml(&request.text, voice))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", body.trim())
            };
            return Ok(SpeechOutcome::Failed { reason });
        }

        let audio = response.bytes().await?;
        tokio::fs::write(&request.output, &audio).await?;
        info!(
            path = %request.output.display(),
            bytes = audio.len(),
            "Speech synthesized successfully"
        );

        Ok(SpeechOutcome::Completed {
            path: request.output.clone(),
            bytes: audio.len(),
        })
    }
}
