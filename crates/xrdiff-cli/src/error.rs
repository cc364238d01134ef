//! CLI error types with exit code handling
//!
//! Maps engine errors onto user-facing diagnostics and exit codes. The
//! distinction matters for scripting: resolution, render and apply failures
//! get their own codes so callers can tell "your manifest is wrong" from
//! "the cluster disagreed".

use miette::Diagnostic;
use thiserror::Error;
use xrdiff_engine::{DiffError, KubeError};

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Input manifests could not be read or parsed
    #[error("Input error: {message}")]
    #[diagnostic(code(xrdiff::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The cluster could not be reached or configured
    #[error("Cluster error: {message}")]
    #[diagnostic(code(xrdiff::cli::cluster))]
    Cluster { message: String },

    /// Composition/revision/XRD/function resolution failed
    #[error("Resolution error: {message}")]
    #[diagnostic(code(xrdiff::cli::resolution))]
    Resolution { message: String },

    /// The external render pipeline failed
    #[error("Render error: {message}")]
    #[diagnostic(code(xrdiff::cli::render))]
    Render { message: String },

    /// Dry-run apply rejected by the apiserver
    #[error("Apply error: {message}")]
    #[diagnostic(code(xrdiff::cli::apply))]
    Apply { message: String },

    /// Some inputs failed; their diagnostics were printed to stderr
    #[error("{failed} of {total} composite resources failed to diff")]
    #[diagnostic(code(xrdiff::cli::partial))]
    Partial { failed: usize, total: usize },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(xrdiff::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough
    #[error("{message}")]
    #[diagnostic(code(xrdiff::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Cluster { .. } => exit_codes::ERROR,
            CliError::Resolution { .. } => exit_codes::RESOLUTION_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Apply { .. } => exit_codes::APPLY_ERROR,
            CliError::Partial { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::INPUT_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a cluster error
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<DiffError> for CliError {
    fn from(err: DiffError) -> Self {
        match &err {
            DiffError::Crossplane(_) => CliError::Resolution {
                message: err.to_string(),
            },
            DiffError::Render(_) => CliError::Render {
                message: err.to_string(),
            },
            DiffError::Kube(KubeError::Apply { .. }) => CliError::Apply {
                message: err.to_string(),
            },
            _ => CliError::Other {
                message: err.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
