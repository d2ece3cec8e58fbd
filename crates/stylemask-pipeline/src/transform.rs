//! Registry of named text transformations.
//!
//! Each transformation maps to one fixed instruction template sent as the
//! system message, plus per-kind sampling defaults. Persona imitation is the
//! only kind that takes a runtime parameter.

use crate::error::PipelineError;

/// Shared seed so identical runs request deterministic sampling from the
/// backend (best effort, the backend decides what it honors).
pub const DEFAULT_SEED: i64 = 42;

const THESAURUS_INSTRUCTIONS: &str = "\
Change the user input by replacing each word with a synonym.
Replace every word: find a word with similar meaning and use it in the original word's place.
Do not change the meaning of the text.
Only output the changed text. Do not start with an acknowledgement.";

const SIMPLIFY_INSTRUCTIONS: &str = "\
Change the user input by simplifying the language.
Replace uncommon words with common ones. Make the writing simple enough that a child would know each word.
Do not change the input's meaning and do not leave out aspects.
Only output the changed text. Do not start with an acknowledgement.";

fn persona_instructions(persona: &str) -> String {
    format!(
        "\
Change the user input by imitating the writing style of {persona}.
Use the typical words and grammar of {persona}.
Do not change the input's meaning and do not leave out aspects.
Keep the output about as long as the input.
Only output the changed text. Do not start with an acknowledgement."
    )
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub seed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transformation {
    Thesaurus,
    Simplify,
    PersonaImitation,
}

impl Transformation {
    pub const ALL: [Transformation; 3] = [
        Transformation::Thesaurus,
        Transformation::Simplify,
        Transformation::PersonaImitation,
    ];

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            't' => Some(Transformation::Thesaurus),
            's' => Some(Transformation::Simplify),
            'p' => Some(Transformation::PersonaImitation),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Transformation::Thesaurus => 't',
            Transformation::Simplify => 's',
            Transformation::PersonaImitation => 'p',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transformation::Thesaurus => "thesaurus",
            Transformation::Simplify => "simplify",
            Transformation::PersonaImitation => "persona imitation",
        }
    }

    /// Whether instantiating this kind's template needs a persona name.
    pub fn requires_persona(&self) -> bool {
        matches!(self, Transformation::PersonaImitation)
    }

    /// Per-kind sampling defaults: thesaurus runs hot to favor lexical
    /// diversity, the meaning-preserving rewrites stay conservative.
    pub fn sampling(&self) -> Sampling {
        match self {
            Transformation::Thesaurus => Sampling {
                temperature: 1.5,
                seed: DEFAULT_SEED,
            },
            Transformation::Simplify => Sampling {
                temperature: 0.3,
                seed: DEFAULT_SEED,
            },
            Transformation::PersonaImitation => Sampling {
                temperature: 0.7,
                seed: DEFAULT_SEED,
            },
        }
    }

    /// Instantiate this kind's instruction template.
    ///
    /// Fails with [`PipelineError::PersonaRequired`] when the kind needs a
    /// persona and none (or a blank one) was supplied.
    pub fn instructions(&self, persona: Option<&str>) -> Result<String, PipelineError> {
        match self {
            Transformation::Thesaurus => Ok(THESAURUS_INSTRUCTIONS.to_string()),
            Transformation::Simplify => Ok(SIMPLIFY_INSTRUCTIONS.to_string()),
            Transformation::PersonaImitation => {
                let persona = persona
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or(PipelineError::PersonaRequired(*self))?;
                Ok(persona_instructions(persona))
            }
        }
    }
}

/// Parse a compact transformation sequence like `"tsp"`.
///
/// The whole string is scanned before judgement: every unknown code is
/// collected (first occurrence order, deduplicated) and reported together, so
/// the caller sees all offenders at once. Any unknown code fails the whole
/// sequence before a single model call is issued.
pub fn parse_transformations(sequence: &str) -> Result<Vec<Transformation>, PipelineError> {
    let mut steps = Vec::new();
    let mut invalid: Vec<char> = Vec::new();

    for code in sequence.chars() {
        match Transformation::from_code(code) {
            Some(step) => steps.push(step),
            None => {
                if !invalid.contains(&code) {
                    invalid.push(code);
                }
            }
        }
    }

    if !invalid.is_empty() {
        return Err(PipelineError::InvalidSequence { invalid });
    }

    Ok(steps)
}
