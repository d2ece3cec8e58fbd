pub mod client;
pub mod openai;

pub use client::{GenerationRequest, ModelClient, ModelClientError, Result, TokenStream};
pub use openai::OpenAiClient;
