// ── scp-push / scp module ─────────────────────────────────────────────────────
//
// Legacy SCP sink-mode client:
//   • types      : options, acknowledgement status, engine state, entry metadata
//   • error      : ScpError / ScpResult
//   • session    : the ScpSession seam plus the ssh2::Channel adapter
//   • protocol   : RemoteClient: handshake, control lines, acknowledgements
//   • transfer   : ScpCopier: single-file and recursive tree push
//   • local_fs   : LocalFs seam and the OS-backed implementation
//   • diagnostics: DiagnosticSink and the bundled sinks

pub mod diagnostics;
pub mod error;
pub mod local_fs;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod types;

pub use diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticSink, LogSink, MemorySink};
pub use error::{ScpError, ScpResult};
pub use local_fs::{LocalFs, OsFs};
pub use protocol::{command_line, perm_string, RemoteClient};
pub use session::{close_channel, ScpSession};
pub use transfer::{copy, copy_file, copy_folder, ScpCopier};
pub use types::*;
