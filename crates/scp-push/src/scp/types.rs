// ── Types ─────────────────────────────────────────────────────────────────────

use crate::scp::error::{ScpError, ScpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_scp_path() -> String {
    "scp".into()
}
fn default_chunk_size() -> usize {
    1_048_576 // 1 MiB
}

// ── Options ──────────────────────────────────────────────────────────────────

/// Settings shared by every transfer started from one [`ScpCopier`].
///
/// Defaults are filled in when the value is built (or deserialized), never
/// lazily on first use.
///
/// [`ScpCopier`]: crate::scp::ScpCopier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpOptions {
    /// Program launched on the remote side, e.g. `scp` or `/usr/bin/scp`.
    #[serde(default = "default_scp_path")]
    pub scp_path: String,
    /// Buffer size used while streaming a file payload.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ScpOptions {
    fn default() -> Self {
        Self {
            scp_path: default_scp_path(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl ScpOptions {
    pub fn scp_path(mut self, scp_path: impl Into<String>) -> Self {
        self.scp_path = scp_path.into();
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> ScpResult<()> {
        if self.scp_path.trim().is_empty() {
            return Err(ScpError::InvalidConfig(
                "scp_path must name the remote scp program".into(),
            ));
        }
        Ok(())
    }

    /// Chunk size with `0` mapped back to the default.
    pub(crate) fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            default_chunk_size()
        } else {
            self.chunk_size
        }
    }
}

// ── Acknowledgement ──────────────────────────────────────────────────────────

/// Status byte sent by the remote sink after every control line and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AckStatus {
    Ok,
    /// `0x01`: the remote reports an error but keeps running.
    Warning,
    /// `0x02`: the remote gives up.
    Fatal,
    /// Anything else is a protocol violation.
    Unknown(u8),
}

impl AckStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => AckStatus::Ok,
            1 => AckStatus::Warning,
            2 => AckStatus::Fatal,
            other => AckStatus::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AckStatus::Ok => 0,
            AckStatus::Warning => 1,
            AckStatus::Fatal => 2,
            AckStatus::Unknown(other) => other,
        }
    }

    pub fn is_ok(self) -> bool {
        self == AckStatus::Ok
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckStatus::Ok => write!(f, "Ok (0)"),
            AckStatus::Warning => write!(f, "Error (1)"),
            AckStatus::Fatal => write!(f, "Fatal (2)"),
            AckStatus::Unknown(other) => write!(f, "UnknownError ({})", other),
        }
    }
}

// ── Engine state ─────────────────────────────────────────────────────────────

/// Lifecycle of one [`RemoteClient`]. `Done` and `Failed` are terminal.
///
/// [`RemoteClient`]: crate::scp::RemoteClient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferState {
    NotStarted,
    Started,
    Done,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Done | TransferState::Failed)
    }
}

/// Remote path plus whether the top-level entity is a directory.
/// Fixed once `start` succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTarget {
    pub remote_path: String,
    pub is_directory: bool,
}

// ── Control lines ────────────────────────────────────────────────────────────

/// One protocol record. Each variant encodes to exactly one wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    File {
        perm: String,
        size: u64,
        name: String,
    },
    DirectoryEnter {
        perm: String,
        name: String,
    },
    DirectoryExit,
}

// ── Local entries ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryKind::File => "regular file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symbolic link",
            EntryKind::Other => "special file",
        };
        f.write_str(label)
    }
}

/// Metadata of a local entry as seen by the tree walk. Links are never
/// followed, so `kind` describes the entry itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Base name, used verbatim in the control line.
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    /// Raw mode bits; only the low nine reach the wire.
    pub mode: u32,
}
