//! Placement errors.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// The result type returned by align library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible placement errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// ALIGN rejected the inputs or crashed.
    ///
    /// The captured stderr tail carries ALIGN's own failure reason. The
    /// known case: constraints referencing instance names invalidated by
    /// ALIGN's internal grouping fail its schema validation.
    #[error("ALIGN exited with {status}:\n{stderr_tail}")]
    Align {
        /// The exit status of the ALIGN process.
        status: ExitStatus,
        /// The last lines of the captured stderr stream.
        stderr_tail: String,
    },
    /// Error parsing a placement artifact.
    #[error("error parsing placement artifact")]
    ArtifactParse(#[from] serde_json::Error),
    /// A placement artifact with no modules.
    #[error("placement artifact at {0:?} contains no modules")]
    EmptyArtifact(PathBuf),
}
