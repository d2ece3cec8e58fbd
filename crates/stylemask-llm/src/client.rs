use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ModelClientError>;

/// Incremental text fragments of one streamed completion. Finite, consumed once,
/// not restartable.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One chat-completion call: system-role instructions applied to user-role input.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub instructions: String,
    pub input: String,
    pub model: String,
    pub temperature: f32,
    pub seed: i64,
}

impl GenerationRequest {
    pub fn new(
        instructions: impl Into<String>,
        input: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        seed: i64,
    ) -> Result<Self> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ModelClientError::InvalidRequest(format!(
                "temperature {temperature} outside [0.0, 2.0]"
            )));
        }
        Ok(Self {
            instructions: instructions.into(),
            input: input.into(),
            model: model.into(),
            temperature,
            seed,
        })
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue one streaming chat completion.
    ///
    /// The returned stream yields text fragments in arrival order until the
    /// backend signals completion.
    async fn complete_stream(&self, request: &GenerationRequest) -> Result<TokenStream>;
}
