//! Error types for the pipeline engine.

use crate::layout::DimType;

/// Errors that can occur during pipeline configuration and execution.
///
/// Configuration errors (options, layout, log targets) are always fatal to
/// the `prepare` call that triggered them. Execution errors are fatal to the
/// enclosing `execute` call; nothing in this engine retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// A required option was not supplied.
    #[error("missing required option '{0}'")]
    MissingOption(String),

    /// An option value could not be parsed as the requested type.
    #[error("invalid value for option '{name}': {reason}")]
    InvalidOption {
        /// Normalized option name.
        name: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A dimension was registered after the layout was finalized.
    #[error("layout is finalized; cannot register dimension '{0}'")]
    LayoutFinalized(String),

    /// A dimension was re-registered with a conflicting storage type.
    #[error("dimension '{name}' already registered as {existing:?}, requested {requested:?}")]
    DimensionConflict {
        /// Dimension name.
        name: String,
        /// Storage type of the existing registration.
        existing: DimType,
        /// Storage type of the rejected registration.
        requested: DimType,
    },

    /// A dimension name was not found in the layout.
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    /// A point position was outside the bounds of a view or the table.
    #[error("point index {index} out of range (len {len})")]
    PointOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of points available.
        len: usize,
    },

    /// A point was appended before the layout was finalized.
    #[error("cannot add points before the layout is finalized")]
    LayoutNotFinalized,

    /// A log target could not be opened.
    #[error("cannot open log target '{target}': {reason}")]
    LogTarget {
        /// The requested target (stream name or file path).
        target: String,
        /// Description of the failure.
        reason: String,
    },

    /// A stage handle did not refer to a stage in this pipeline.
    #[error("stage handle {0} is not part of this pipeline")]
    UnknownStage(u32),

    /// A stage was executed without a successful prepare.
    #[error("stage '{0}' was executed before prepare")]
    NotPrepared(String),

    /// A stage failed while running against a view.
    #[error("stage '{stage}' failed: {reason}")]
    Execution {
        /// Driver-type name of the failing stage.
        stage: String,
        /// Description of the failure.
        reason: String,
    },
}

impl PipelineError {
    /// Convenience constructor for a stage execution failure.
    pub fn execution(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}
