/// Ollama HTTP client module.
///
/// This module provides a blocking HTTP client for the Ollama completion and
/// embedding endpoints, including error handling, retry logic, and timeout
/// configuration.
mod client;

pub use client::{
    CompletionRequest, OllamaClient, OllamaClientBuilder, OllamaClientTrait, OllamaError,
    retry_with_backoff,
};
