use thiserror::Error;

/// Every failure a build invocation can surface. All variants are fatal to
/// the current build: nothing is retried internally and no partial image is
/// ever published.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Base image resolution failed for {reference}: {reason}")]
    BaseResolution { reference: String, reason: String },

    #[error("Copy source not found at step {step_index}: {path}")]
    SourceNotFound { step_index: usize, path: String },

    #[error("Step {step_index} failed: {reason}")]
    StepExecution { step_index: usize, reason: String },

    #[error("Step {step_index} timed out after {timeout_ms}ms")]
    StepTimeout { step_index: usize, timeout_ms: u64 },

    #[error("Invalid startup directive: {reason}")]
    InvalidStartupDirective { reason: String },

    #[error("Invalid recipe at line {line}: {reason}")]
    InvalidRecipe { line: usize, reason: String },

    #[error("Snapshot store error: {reason}")]
    Store { reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl BuildError {
    /// Stable error-kind name carried on the invocation surface, so callers
    /// can branch without matching on variant internals.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::BaseResolution { .. } => "BaseResolutionError",
            BuildError::SourceNotFound { .. } => "SourceNotFoundError",
            BuildError::StepExecution { .. } => "StepExecutionError",
            BuildError::StepTimeout { .. } => "StepExecutionError",
            BuildError::InvalidStartupDirective { .. } => "InvalidStartupDirectiveError",
            BuildError::InvalidRecipe { .. } => "InvalidRecipeError",
            BuildError::Store { .. } => "StoreError",
            BuildError::Io { .. } => "IoError",
            BuildError::Config { .. } => "ConfigError",
        }
    }

    /// Index of the step the build failed at, when the failure is tied to a
    /// specific step.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            BuildError::SourceNotFound { step_index, .. }
            | BuildError::StepExecution { step_index, .. }
            | BuildError::StepTimeout { step_index, .. } => Some(*step_index),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::Io {
            reason: e.to_string(),
        }
    }
}
