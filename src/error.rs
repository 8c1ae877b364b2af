//! Error types.
//!
//! - [`VarError`] is the typed taxonomy of the modeling core. Every failure of a
//!   fit, a calibration, a rolling step or a backtest is one of these variants.
//! - [`AppError`] is the binary-facing error: a message plus a process exit code.

use thiserror::Error;

/// Failures of the modeling core.
///
/// All variants are recoverable. Inside the rolling engine a per-step failure is
/// recorded as a missing estimate rather than aborting the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VarError {
    /// Fewer observations than the model needs.
    #[error("insufficient data: need {required} observations, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// The optimizer did not reach a usable optimum.
    #[error("convergence failure after {iterations} iterations: {reason}")]
    ConvergenceFailure { iterations: u64, reason: String },

    /// Constant, near-constant or non-finite input.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Quantile calibration needs at least two points with non-zero dispersion.
    #[error("insufficient sample for calibration: {0}")]
    InsufficientSample(String),

    /// Structurally malformed model specification.
    #[error("invalid model spec: {0}")]
    InvalidSpec(String),

    /// Probability level outside the open unit interval.
    #[error("invalid level {0}: must be in (0, 1)")]
    InvalidLevel(f64),

    /// Evaluation range or slice bounds that do not fit the data.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Series construction failed (ordering, lengths, non-finite values).
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// Too many rolling steps failed for the run to be trusted.
    #[error("degraded run: {failed} of {completed} steps failed (limit {max_fraction:.2})")]
    DegradedRun {
        failed: usize,
        completed: usize,
        max_fraction: f64,
    },

    /// The run was cancelled before any step completed.
    #[error("run cancelled before any step completed")]
    Cancelled,

    /// Worker pool could not be created.
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

impl VarError {
    /// True for failures that come from the optimizer rather than the inputs.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            VarError::ConvergenceFailure { .. } | VarError::DegradedRun { .. }
        )
    }

    /// Exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            VarError::InvalidSpec(_)
            | VarError::InvalidLevel(_)
            | VarError::InvalidRange(_)
            | VarError::InvalidSeries(_) => 2,
            VarError::InsufficientData { .. } | VarError::InsufficientSample(_) => 3,
            VarError::ConvergenceFailure { .. }
            | VarError::DegenerateInput(_)
            | VarError::DegradedRun { .. }
            | VarError::Cancelled
            | VarError::WorkerPool(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<VarError> for AppError {
    fn from(err: VarError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
