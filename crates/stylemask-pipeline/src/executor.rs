//! Sequential execution of a transformation chain.
//!
//! Each step's aggregated output becomes the next step's user input, so steps
//! run strictly one at a time with a single in-flight request.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use stylemask_llm::{GenerationRequest, ModelClient};

use crate::aggregate::collect_stream;
use crate::error::PipelineError;
use crate::transform::{Sampling, Transformation};

/// One completed step: the transformation applied and its full output text.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub transformation: Transformation,
    pub output: String,
}

/// Record of one pipeline run: the original input plus every completed step.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub input: String,
    pub steps: Vec<PipelineStep>,
}

impl PipelineRun {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            steps: Vec::new(),
        }
    }

    /// The running text: the last step's output, or the original input when
    /// no step has run.
    pub fn output(&self) -> &str {
        self.steps
            .last()
            .map(|step| step.output.as_str())
            .unwrap_or(&self.input)
    }
}

/// A pipeline abort. Steps completed before the failure stay inspectable.
#[derive(Debug, Error)]
#[error("pipeline aborted at step '{}': {}", .step.label(), .source)]
pub struct PipelineAbort {
    pub completed: PipelineRun,
    pub step: Transformation,
    #[source]
    pub source: PipelineError,
}

/// Progress notifications surfaced while a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineEvent<'a> {
    StepStarted(Transformation),
    Fragment(&'a str),
}

pub struct PipelineExecutor<'a> {
    client: &'a dyn ModelClient,
    model: String,
    persona: Option<String>,
    temperature_override: Option<f32>,
    seed_override: Option<i64>,
    cancel: CancellationToken,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(client: &'a dyn ModelClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            persona: None,
            temperature_override: None,
            seed_override: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Replace every step's default temperature for this run.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature_override = Some(temperature);
        self
    }

    /// Replace every step's default seed for this run.
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed_override = Some(seed);
        self
    }

    /// Cancellation is checked at the top of each step, before the next
    /// request is issued.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn sampling_for(&self, step: Transformation) -> Sampling {
        let defaults = step.sampling();
        Sampling {
            temperature: self.temperature_override.unwrap_or(defaults.temperature),
            seed: self.seed_override.unwrap_or(defaults.seed),
        }
    }

    /// Run `steps` in order over `input`.
    ///
    /// On the first failure the remaining steps are skipped, without retry,
    /// and the returned [`PipelineAbort`] carries the steps that did complete.
    pub async fn run<F>(
        &self,
        input: &str,
        steps: &[Transformation],
        mut observer: F,
    ) -> Result<PipelineRun, PipelineAbort>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        let mut run = PipelineRun::new(input);

        for &step in steps {
            if self.cancel.is_cancelled() {
                return Err(PipelineAbort {
                    completed: run,
                    step,
                    source: PipelineError::Cancelled,
                });
            }

            let instructions = match step.instructions(self.persona.as_deref()) {
                Ok(instructions) => instructions,
                Err(source) => {
                    return Err(PipelineAbort {
                        completed: run,
                        step,
                        source,
                    })
                }
            };

            let sampling = self.sampling_for(step);
            let request = match GenerationRequest::new(
                instructions,
                run.output(),
                &self.model,
                sampling.temperature,
                sampling.seed,
            ) {
                Ok(request) => request,
                Err(err) => {
                    return Err(PipelineAbort {
                        completed: run,
                        step,
                        source: PipelineError::Client(err),
                    })
                }
            };

            log::debug!(
                "applying step '{}' (temperature={}, seed={})",
                step.label(),
                sampling.temperature,
                sampling.seed
            );
            observer(PipelineEvent::StepStarted(step));

            let stream = match self.client.complete_stream(&request).await {
                Ok(stream) => stream,
                Err(err) => {
                    return Err(PipelineAbort {
                        completed: run,
                        step,
                        source: PipelineError::Client(err),
                    })
                }
            };

            let output =
                match collect_stream(stream, |fragment| observer(PipelineEvent::Fragment(fragment)))
                    .await
                {
                    Ok(output) => output,
                    Err(source) => {
                        return Err(PipelineAbort {
                            completed: run,
                            step,
                            source,
                        })
                    }
                };

            run.steps.push(PipelineStep {
                transformation: step,
                output,
            });
        }

        Ok(run)
    }
}
