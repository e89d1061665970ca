//! Structural errors of the config model.

use thiserror::Error;

/// Errors raised while parsing or regenerating the HAProxy config text.
///
/// Line numbers are 1-based.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("line {line}: managed block for backend [{backend}] is never closed")]
    MissingEndMarker { backend: String, line: usize },

    #[error("no managed block for backend [{backend}] in the config template")]
    MissingBeginMarker { backend: String },

    #[error("line {line}: end marker for backend [{backend}] without a matching begin marker")]
    UnexpectedEndMarker { backend: String, line: usize },

    #[error("line {line}: begin marker for backend [{backend}] is not inside `backend {backend}`")]
    MisplacedBlock { backend: String, line: usize },

    #[error("line {line}: tag [{tag}] found inside section [{section}]")]
    SectionMismatch {
        line: usize,
        tag: String,
        section: String,
    },

    #[error("line {line}: server [{server}] is outside its managed block")]
    ServerOutsideBlock { server: String, line: usize },

    #[error("line {line}: {reason}")]
    InvalidDirective { line: usize, reason: String },

    #[error("line {line}: unsupported tag [{tag}]")]
    UnsupportedTag { line: usize, tag: String },

    #[error("[{key}] has no tagged line in the config template")]
    NoTemplateLine { key: String },

    #[error("line {line}: [{key}] is required by the agent and cannot be removed")]
    RequiredItem { key: String, line: usize },
}
