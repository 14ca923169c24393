//! SCP sink-mode protocol engine.
//!
//! Handles:
//! - Launching `scp -t [-r] <path>` on the remote side
//! - Encoding `C` / `D` / `E` control lines
//! - Streaming file payloads followed by the NUL terminator
//! - Reading the one-byte acknowledgement (and reason line) after each step
//!
//! Requests and acknowledgements strictly alternate; nothing is pipelined.

use crate::scp::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticSink};
use crate::scp::error::{ScpError, ScpResult};
use crate::scp::session::ScpSession;
use crate::scp::types::*;
use chrono::Utc;
use log::{debug, info, trace, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Directory names longer than this are clipped, matching what the
/// OpenSSH sink tolerates.
pub const MAX_DIRECTORY_NAME_LEN: usize = 1024;

/// Format the low nine permission bits of `mode` as `0ooo`.
pub fn perm_string(mode: u32) -> String {
    format!("0{:03o}", mode & 0o777)
}

/// The command that puts the remote `scp` into sink mode.
pub fn command_line(options: &ScpOptions, remote_path: &str, is_directory: bool) -> String {
    let escaped = shell_escape::unix::escape(remote_path.into());
    let mut command = String::with_capacity(options.scp_path.len() + escaped.len() + 8);
    command.push_str(&options.scp_path);
    command.push_str(" -t");
    if is_directory {
        command.push_str(" -r");
    }
    command.push(' ');
    command.push_str(&escaped);
    command
}

fn validate_name(name: &str) -> ScpResult<()> {
    if name.is_empty() {
        return Err(ScpError::InvalidName("name must not be empty".into()));
    }
    if name.contains(['/', '\n', '\0']) {
        return Err(ScpError::InvalidName(format!(
            "{:?} is not a single path component",
            name
        )));
    }
    Ok(())
}

fn validate_perm(perm: &str) -> ScpResult<()> {
    let well_formed = perm.len() == 4 && perm.bytes().all(|b| (b'0'..=b'7').contains(&b));
    if !well_formed {
        return Err(ScpError::InvalidPermissions(format!(
            "{:?} is not a 4-digit octal string",
            perm
        )));
    }
    Ok(())
}

// ── Control lines ────────────────────────────────────────────────────────────

impl ControlLine {
    /// Wire form, newline included. Directory names are clipped to
    /// [`MAX_DIRECTORY_NAME_LEN`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlLine::File { perm, size, name } => {
                let mut line = format!("C{} {} ", perm, size).into_bytes();
                line.extend_from_slice(name.as_bytes());
                line.push(b'\n');
                line
            }
            ControlLine::DirectoryEnter { perm, name } => {
                let bytes = name.as_bytes();
                let clipped = &bytes[..bytes.len().min(MAX_DIRECTORY_NAME_LEN)];
                let mut line = format!("D{} 0 ", perm).into_bytes();
                line.extend_from_slice(clipped);
                line.push(b'\n');
                line
            }
            ControlLine::DirectoryExit => b"E\n".to_vec(),
        }
    }
}

impl fmt::Display for ControlLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode();
        let body = &encoded[..encoded.len() - 1];
        f.write_str(&String::from_utf8_lossy(body))
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Drives one sink-mode transfer over a borrowed session.
///
/// Created fresh per transfer, started once, then discarded. Any I/O or
/// acknowledgement failure moves it to [`TransferState::Failed`] and every
/// later call is refused.
pub struct RemoteClient<'s, S: ScpSession> {
    session: &'s mut S,
    outbound: S::Outbound,
    inbound: BufReader<S::Inbound>,
    options: ScpOptions,
    state: TransferState,
    target: Option<TransferTarget>,
    depth: usize,
    transfer_id: Uuid,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl<'s, S: ScpSession> RemoteClient<'s, S> {
    pub fn new(session: &'s mut S) -> ScpResult<Self> {
        Self::with_options(session, ScpOptions::default())
    }

    pub fn with_options(session: &'s mut S, options: ScpOptions) -> ScpResult<Self> {
        options.validate()?;
        let outbound = session
            .open_outbound()
            .map_err(|e| ScpError::transport("opening outbound stream", e))?;
        let inbound = session
            .open_inbound()
            .map_err(|e| ScpError::transport("opening inbound stream", e))?;
        Ok(Self {
            session,
            outbound,
            inbound: BufReader::new(inbound),
            options,
            state: TransferState::NotStarted,
            target: None,
            depth: 0,
            transfer_id: Uuid::new_v4(),
            sink: None,
        })
    }

    pub fn attach_diagnostics(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.sink = Some(sink);
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Number of directories entered and not yet exited.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn target(&self) -> Option<&TransferTarget> {
        self.target.as_ref()
    }

    pub fn transfer_id(&self) -> Uuid {
        self.transfer_id
    }

    // ── Public protocol operations ───────────────────────────────────────────

    /// Launch the remote sink and wait for its first acknowledgement.
    pub fn start(&mut self, remote_path: &str, is_directory: bool) -> ScpResult<()> {
        if self.state != TransferState::NotStarted {
            return Err(ScpError::InvalidState(format!(
                "start called in {:?} state",
                self.state
            )));
        }
        let command = command_line(&self.options, remote_path, is_directory);
        self.guarded(|client| {
            info!("SCP sink starting: {}", command);
            client
                .session
                .start(&command)
                .map_err(|e| ScpError::transport("starting remote scp", e))?;
            client.emit(DiagnosticKind::CommandSent {
                command: command.clone(),
            });
            client.read_ack()?;
            client.state = TransferState::Started;
            client.target = Some(TransferTarget {
                remote_path: remote_path.to_string(),
                is_directory,
            });
            Ok(())
        })
    }

    /// Send one file: header, ack, exactly `size` payload bytes, NUL, ack.
    pub fn write_file<R: Read + ?Sized>(
        &mut self,
        perm: &str,
        size: u64,
        name: &str,
        payload: &mut R,
    ) -> ScpResult<()> {
        self.ensure_started()?;
        validate_perm(perm)?;
        validate_name(name)?;
        self.guarded(|client| {
            client.send_line(&ControlLine::File {
                perm: perm.to_string(),
                size,
                name: name.to_string(),
            })?;
            client.read_ack()?;
            client.send_payload(name, size, payload)?;
            client.send_bytes(&[0], "sending payload terminator")?;
            client.read_ack()?;
            debug!("SCP sent {} ({} bytes)", name, size);
            Ok(())
        })
    }

    /// Open a directory scope on the remote side.
    pub fn enter_directory(&mut self, perm: &str, name: &str) -> ScpResult<()> {
        self.ensure_started()?;
        validate_perm(perm)?;
        validate_name(name)?;
        self.guarded(|client| {
            client.send_line(&ControlLine::DirectoryEnter {
                perm: perm.to_string(),
                name: name.to_string(),
            })?;
            client.read_ack()?;
            client.depth += 1;
            Ok(())
        })
    }

    /// Close the innermost open directory scope.
    pub fn exit_directory(&mut self) -> ScpResult<()> {
        self.ensure_started()?;
        if self.depth == 0 {
            return Err(ScpError::InvalidState(
                "exit_directory without a matching enter_directory".into(),
            ));
        }
        self.guarded(|client| {
            client.send_line(&ControlLine::DirectoryExit)?;
            client.read_ack()?;
            client.depth -= 1;
            Ok(())
        })
    }

    /// Mark the transfer complete. Every entered directory must be exited.
    pub fn finish(&mut self) -> ScpResult<()> {
        self.ensure_started()?;
        if self.depth != 0 {
            return Err(ScpError::InvalidState(format!(
                "finish with {} directories still open",
                self.depth
            )));
        }
        self.state = TransferState::Done;
        if let Some(target) = &self.target {
            info!("SCP transfer to {} complete", target.remote_path);
        }
        self.emit(DiagnosticKind::Completed);
        Ok(())
    }

    /// Move to `Failed` because of an error raised outside the engine
    /// (for example a local file that could not be opened mid-tree).
    pub fn abort(&mut self, err: &ScpError) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TransferState::Failed;
        self.emit(DiagnosticKind::Failed {
            message: err.to_string(),
        });
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn ensure_started(&self) -> ScpResult<()> {
        match self.state {
            TransferState::Started => Ok(()),
            other => Err(ScpError::InvalidState(format!(
                "operation requires a started transfer, engine is {:?}",
                other
            ))),
        }
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> ScpResult<T>) -> ScpResult<T> {
        let result = op(self);
        if let Err(err) = &result {
            self.abort(err);
        }
        result
    }

    fn emit(&self, kind: DiagnosticKind) {
        if let Some(sink) = &self.sink {
            sink.record(&DiagnosticEvent {
                transfer_id: self.transfer_id,
                timestamp: Utc::now(),
                kind,
            });
        }
    }

    fn send_bytes(&mut self, bytes: &[u8], context: &str) -> ScpResult<()> {
        self.outbound
            .write_all(bytes)
            .and_then(|_| self.outbound.flush())
            .map_err(|e| ScpError::transport(context, e))
    }

    fn send_line(&mut self, line: &ControlLine) -> ScpResult<()> {
        let rendered = line.to_string();
        let encoded = line.encode();
        debug!("SCP control line: {}", rendered);
        trace!(">>> {:?}", String::from_utf8_lossy(&encoded));
        self.send_bytes(&encoded, "sending control line")?;
        self.emit(DiagnosticKind::ControlLine { line: rendered });
        Ok(())
    }

    fn send_payload<R: Read + ?Sized>(
        &mut self,
        name: &str,
        size: u64,
        payload: &mut R,
    ) -> ScpResult<()> {
        let chunk = self.options.effective_chunk_size();
        let mut buffer = vec![0u8; (size.min(chunk as u64) as usize).max(1)];
        let mut remaining = size;

        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let n = match payload.read(&mut buffer[..want]) {
                Ok(0) => {
                    return Err(ScpError::MalformedTransfer {
                        name: name.to_string(),
                        expected: size,
                        actual: size - remaining,
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScpError::local_io(name, e)),
            };
            self.outbound
                .write_all(&buffer[..n])
                .map_err(|e| ScpError::transport("sending payload", e))?;
            remaining -= n as u64;
        }

        self.emit(DiagnosticKind::PayloadSent { bytes: size });
        Ok(())
    }

    /// Read one acknowledgement; on a non-zero status also read the reason
    /// line that follows it.
    fn read_ack(&mut self) -> ScpResult<()> {
        let mut byte = [0u8; 1];
        self.inbound
            .read_exact(&mut byte)
            .map_err(|e| ScpError::transport("reading acknowledgement", e))?;

        let status = AckStatus::from_byte(byte[0]);
        if status.is_ok() {
            self.emit(DiagnosticKind::Acknowledged);
            return Ok(());
        }

        let mut line = Vec::new();
        let (reason, reason_error) = match self.inbound.read_until(b'\n', &mut line) {
            Ok(_) if line.ends_with(b"\n") => {
                let text = String::from_utf8_lossy(&line);
                (Some(text.trim_end_matches(['\r', '\n']).to_string()), None)
            }
            Ok(_) if line.is_empty() => (None, Some("stream closed before reason line".into())),
            Ok(_) => (
                None,
                Some(format!(
                    "stream closed mid-line after {:?}",
                    String::from_utf8_lossy(&line)
                )),
            ),
            Err(e) => (None, Some(e.to_string())),
        };

        warn!(
            "SCP remote reported {}: {}",
            status,
            reason.as_deref().unwrap_or("<no reason>")
        );
        self.emit(DiagnosticKind::RemoteError {
            status,
            reason: reason.clone(),
        });
        Err(ScpError::RemoteProtocol {
            status,
            reason,
            reason_error,
        })
    }
}
