use thiserror::Error;

use stylemask_llm::ModelClientError;

use crate::transform::Transformation;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid transformation code(s): {}", .invalid.iter().map(|c| format!("'{c}'")).collect::<Vec<_>>().join(", "))]
    InvalidSequence { invalid: Vec<char> },

    #[error("transformation '{}' requires a persona name", .0.label())]
    PersonaRequired(Transformation),

    #[error("model client error: {0}")]
    Client(#[from] ModelClientError),

    #[error("stream aggregation error: {0}")]
    Stream(String),

    #[error("pipeline cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sequence_lists_every_code() {
        let err = PipelineError::InvalidSequence {
            invalid: vec!['x', 'z'],
        };
        let message = err.to_string();
        assert!(message.contains("'x'"));
        assert!(message.contains("'z'"));
    }

    #[test]
    fn persona_required_names_the_step() {
        let err = PipelineError::PersonaRequired(Transformation::PersonaImitation);
        assert!(err.to_string().contains("persona imitation"));
    }
}
