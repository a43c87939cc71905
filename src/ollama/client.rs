/// Ollama HTTP client implementation.
///
/// This module provides `OllamaClient` for making synchronous HTTP requests to the
/// Ollama API, along with error types and builder patterns for configuration.
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Default delays between retries of a transient failure, in seconds.
const DEFAULT_RETRY_DELAYS: [u64; 3] = [1, 2, 4];

/// Errors that can occur when interacting with the Ollama API.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Ollama API-specific errors
    #[error("Ollama API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl OllamaError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            OllamaError::Timeout(error)
        } else {
            OllamaError::Network(error)
        }
    }
}

/// A single text-completion request.
///
/// `json_mode` asks the server to constrain the completion to a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Creates a plain-text completion request.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            json_mode: false,
        }
    }

    /// Requests structured JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": self.prompt,
            "stream": false
        });
        if self.json_mode {
            body["format"] = serde_json::Value::String("json".to_string());
        }
        body
    }
}

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use policyqa::ollama::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .timeout(Duration::from_secs(100))
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry_delays: Option<Vec<Duration>>,
}

impl OllamaClientBuilder {
    /// Creates a new `OllamaClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the Ollama API.
    ///
    /// # Arguments
    ///
    /// * `url` - The base URL (e.g., "http://localhost:11434")
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-request timeout. Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the delays slept before each retry of a transient failure.
    ///
    /// An empty slice disables client-side retries entirely, leaving the retry
    /// policy to the caller.
    pub fn retry_delays(mut self, delays: &[Duration]) -> Self {
        self.retry_delays = Some(delays.to_vec());
        self
    }

    /// Builds the `OllamaClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, this method will check the `OLLAMA_HOST`
    /// environment variable. If not set, it defaults to `http://localhost:11434`.
    ///
    /// # Errors
    ///
    /// Returns `OllamaError::InvalidUrl` if the base URL cannot be parsed.
    pub fn build(self) -> Result<OllamaClient, OllamaError> {
        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string())
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| OllamaError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(OllamaError::Network)?;

        let retry_delays = self.retry_delays.unwrap_or_else(|| {
            DEFAULT_RETRY_DELAYS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect()
        });

        Ok(OllamaClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            retry_delays,
        })
    }
}

/// Synchronous HTTP client for the Ollama API.
///
/// It should be constructed using `OllamaClientBuilder`.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout: Duration,
    retry_delays: Vec<Duration>,
}

/// Trait for the two external services the pipeline depends on.
///
/// This trait enables mocking in unit tests; every stage takes it as
/// `&dyn OllamaClientTrait`.
pub trait OllamaClientTrait: Send + Sync {
    /// Runs a text completion and returns the completion text.
    fn generate(&self, request: &CompletionRequest) -> Result<String, OllamaError>;

    /// Returns the embedding vector of `text` under `model`.
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, OllamaError>;
}

impl OllamaClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, OllamaError> {
        retry_with_backoff(&self.retry_delays, || {
            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .map_err(OllamaError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(OllamaError::Http {
                    status: status.as_u16(),
                });
            }

            let text = response.text().map_err(OllamaError::from_reqwest)?;
            serde_json::from_str(&text).map_err(OllamaError::Serialization)
        })
    }
}

impl OllamaClientTrait for OllamaClient {
    fn generate(&self, request: &CompletionRequest) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %request.model, json = request.json_mode, "completion request");
        let json = self.post_json(&url, &request.body())?;

        json.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| OllamaError::Api {
                message: "Missing 'response' field in API response".to_string(),
            })
    }

    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, OllamaError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text
        });
        let json = self.post_json(&url, &body)?;
        parse_embedding(&json)
    }
}

/// Extracts the first vector of an `/api/embed` response.
fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>, OllamaError> {
    let vector = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|v| v.as_array())
        .ok_or_else(|| OllamaError::Api {
            message: "Missing 'embeddings' field in API response".to_string(),
        })?;

    vector
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| OllamaError::Api {
                message: "Non-numeric value in embedding".to_string(),
            })
        })
        .collect()
}

/// Retries an operation with the given backoff delays.
///
/// The operation runs once, then once more after each delay, as long as the
/// error is transient (HTTP 5xx, network errors, timeouts). Client errors
/// (HTTP 4xx) and parse errors are returned immediately.
///
/// # Returns
///
/// Returns the result of the operation if it succeeds, or the last error if all retries fail.
pub fn retry_with_backoff<F, T>(delays: &[Duration], mut f: F) -> Result<T, OllamaError>
where
    F: FnMut() -> Result<T, OllamaError>,
{
    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) => {
            if !should_retry(&e) {
                return Err(e);
            }
            e
        }
    };

    for delay in delays {
        debug!(delay_ms = delay.as_millis() as u64, error = %last_error, "retrying request");
        thread::sleep(*delay);

        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Determines if an error should be retried.
///
/// Returns `true` for transient errors (HTTP 5xx, network errors, timeouts).
fn should_retry(error: &OllamaError) -> bool {
    match error {
        OllamaError::Network(_) => true,
        OllamaError::Timeout(_) => true,
        OllamaError::Http { status } => (500..600).contains(status),
        OllamaError::Serialization(_) => false,
        OllamaError::Api { .. } => false,
        OllamaError::InvalidUrl(_) => false,
    }
}
