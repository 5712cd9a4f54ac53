use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/**
 * Every way an ApplyBQSR job can fail. Each variant is fatal at the point of detection,
 * the engine records the stage it happened in and stops.
 */
#[derive(Error, Debug)]
pub enum RecalError {
    /// Bad, missing or multiple inputs, unreadable model file, unusable intervals
    #[error("Input error: {message}")]
    Input { message: String },

    /// The recalibration table could not be deserialized
    #[error("Recalibration table format error: {message}")]
    ModelFormat { message: String },

    /// The recalibration table could not be handed to the workers
    #[error("Distribution error: {message}")]
    Distribution { message: String },

    /// Writing the output collection failed, output is incomplete
    #[error("Output error writing {}: {message}", path.display())]
    Output { path: PathBuf, message: String },

    /// The job was asked to stop before every partition was processed
    #[error("Job cancelled after {completed} of {total} partitions")]
    Cancelled { completed: usize, total: usize },
}

impl RecalError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn model_format(message: impl Into<String>) -> Self {
        Self::ModelFormat {
            message: message.into(),
        }
    }

    pub fn distribution(message: impl Into<String>) -> Self {
        Self::Distribution {
            message: message.into(),
        }
    }

    pub fn output(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Output {
            path: path.into(),
            message: message.into(),
        }
    }

    /**
     * Process exit status reported by the command line for this kind of failure.
     * Zero is reserved for a completed job.
     */
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Input { .. } => 2,
            Self::ModelFormat { .. } => 3,
            Self::Distribution { .. } => 4,
            Self::Output { .. } => 5,
            Self::Cancelled { .. } => 130,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/**
 * Stages of the ApplyBQSR engine. `Failed` records which stage was active when the job
 * stopped.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Validating,
    Reading,
    Distributing,
    Transforming,
    Writing,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "Validating",
            Self::Reading => "Reading",
            Self::Distributing => "Distributing",
            Self::Transforming => "Transforming",
            Self::Writing => "Writing",
        };
        write!(f, "{}", name)
    }
}

/// A `RecalError` tagged with the stage it surfaced in.
#[derive(Error, Debug)]
#[error("ApplyBQSR failed while {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: RecalError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: RecalError) -> Self {
        Self { stage, source }
    }

    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}
