//! Unified error type for the ripforge crates.
//!
//! Stage preconditions and launch failures are the only failure modes a
//! coordinator reports synchronously; a child process exiting non-zero is
//! *not* an error (it is captured in the stage result), and a parse miss
//! yields empty derived facts rather than an `Err`.

use std::path::PathBuf;

use crate::types::{Stage, Workflow};

/// Unified error type covering all failure modes in ripforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path required before a stage may launch does not exist.
    #[error("Precondition failed: {what} does not exist: {path}")]
    Precondition {
        /// What the path was expected to be (e.g. "device", "output directory").
        what: String,
        /// The path that was checked.
        path: PathBuf,
    },

    /// The external executable could not be spawned.
    #[error("Launch error [{tool}]: {message}")]
    Launch {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A stage launch was requested while another stage of the same
    /// workflow is still running.
    #[error("{workflow} workflow is busy: {stage} stage is active")]
    StageBusy {
        /// The workflow that rejected the launch.
        workflow: Workflow,
        /// The stage currently running.
        stage: Stage,
    },

    /// The collaborator declined an interactive path request.
    #[error("Path request declined")]
    PathRequestDeclined,

    /// Configuration or parameter data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Precondition`].
    pub fn precondition(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Precondition {
            what: what.into(),
            path: path.into(),
        }
    }

    /// Convenience constructor for [`Error::Launch`].
    pub fn launch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Launch {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::StageBusy`].
    pub fn busy(workflow: Workflow, stage: Stage) -> Self {
        Error::StageBusy { workflow, stage }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
