//! Streaming response aggregation.

use futures_util::StreamExt;
use stylemask_llm::TokenStream;

use crate::error::PipelineError;

/// Consume a [`TokenStream`] to completion, concatenating fragments in arrival
/// order. Each fragment is handed to `on_fragment` before it is appended, so a
/// caller can echo output incrementally without altering the final result.
///
/// A transport error mid-stream discards the partial text and fails the step.
/// The stream is consumed exactly once; it cannot be re-read.
pub async fn collect_stream<F>(
    mut stream: TokenStream,
    mut on_fragment: F,
) -> Result<String, PipelineError>
where
    F: FnMut(&str),
{
    let mut text = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                on_fragment(&fragment);
                text.push_str(&fragment);
            }
            Err(err) => return Err(PipelineError::Stream(err.to_string())),
        }
    }

    Ok(text)
}
