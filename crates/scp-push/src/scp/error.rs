//! Typed errors for SCP transfers.
//!
//! Every failure aborts the transfer in progress. Nothing here is retried:
//! the protocol has no frame boundary to resume from, so the remote side is
//! left however far the transfer got.

use crate::scp::types::{AckStatus, EntryKind};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ScpResult<T> = Result<T, ScpError>;

#[derive(Debug, Error)]
pub enum ScpError {
    /// Opening, reading or writing the session streams failed.
    #[error("SCP transport failure while {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The remote sink answered with a non-zero acknowledgement.
    ///
    /// `reason` is `None` when the reason line could not be read; the read
    /// failure is then described by `reason_error`.
    #[error("{}", remote_message(.status, .reason, .reason_error))]
    RemoteProtocol {
        status: AckStatus,
        reason: Option<String>,
        reason_error: Option<String>,
    },

    /// A local file could not be stat'ed, opened, listed or read.
    #[error("local I/O error on '{}': {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported entry type for '{}': {kind}", .path.display())]
    UnsupportedEntry { path: PathBuf, kind: EntryKind },

    /// The payload source ran dry before the declared size was sent.
    #[error("short payload for '{name}': declared {expected} bytes, source supplied {actual}")]
    MalformedTransfer {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid entry name: {0}")]
    InvalidName(String),

    #[error("invalid permission string: {0}")]
    InvalidPermissions(String),

    /// The engine was driven out of order.
    #[error("invalid SCP engine state: {0}")]
    InvalidState(String),

    #[error("invalid SCP options: {0}")]
    InvalidConfig(String),
}

fn remote_message(
    status: &AckStatus,
    reason: &Option<String>,
    reason_error: &Option<String>,
) -> String {
    match (reason, reason_error) {
        (Some(reason), _) => format!("{}: {}", status, reason),
        (None, Some(detail)) => format!("{}: [reason unavailable: {}]", status, detail),
        (None, None) => format!("{}: [reason unavailable]", status),
    }
}

impl ScpError {
    pub(crate) fn transport(context: impl Into<String>, source: io::Error) -> Self {
        ScpError::Transport {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ScpError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Re-point a `LocalIo` error at `path`. The engine only knows the wire
    /// name of the entry it streams; callers that opened the source fill in
    /// where it really lives.
    pub(crate) fn with_local_path(self, path: &Path) -> Self {
        match self {
            ScpError::LocalIo { source, .. } => ScpError::LocalIo {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }

    /// `true` if the remote sink reported the failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, ScpError::RemoteProtocol { .. })
    }

    pub fn ack_status(&self) -> Option<AckStatus> {
        match self {
            ScpError::RemoteProtocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Reason text sent by the remote, if any was received.
    pub fn remote_reason(&self) -> Option<&str> {
        match self {
            ScpError::RemoteProtocol { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}
