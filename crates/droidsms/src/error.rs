use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds surfaced while recovering messages.
///
/// Only `OutputWriteFailed` ends a run; every other kind is scoped to a file,
/// a row or an attachment part and is tallied in the run summary.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("source unreadable `{path}`: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("corrupt row at byte offset {offset}: {reason}")]
    CorruptRow { offset: usize, reason: String },

    #[error("unparseable timestamp in column `{column}`: {raw:?}")]
    UnparseableTimestamp { column: String, raw: String },

    #[error("attachment part {part_index} could not be extracted: {reason}")]
    AttachmentExtractionFailed { part_index: usize, reason: String },

    #[error("output write failed `{path}`: {reason}")]
    OutputWriteFailed { path: PathBuf, reason: String },
}

impl RecoveryError {
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn output_write_failed(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::OutputWriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Reasons the normalizer refuses to turn a raw row into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("unparseable timestamp in column `{column}`: {raw:?}")]
    UnparseableTimestamp { column: String, raw: String },

    #[error("row is not a message ({reason})")]
    NotAMessage { reason: String },
}
