pub mod aggregate;
pub mod error;
pub mod executor;
pub mod transform;

pub use aggregate::collect_stream;
pub use error::PipelineError;
pub use executor::{PipelineAbort, PipelineEvent, PipelineExecutor, PipelineRun, PipelineStep};
pub use transform::{parse_transformations, Sampling, Transformation, DEFAULT_SEED};
