// ── Transfer orchestrator ────────────────────────────────────────────────────

use crate::scp::diagnostics::DiagnosticSink;
use crate::scp::error::{ScpError, ScpResult};
use crate::scp::local_fs::{self, LocalFs, OsFs};
use crate::scp::protocol::{perm_string, RemoteClient};
use crate::scp::session::ScpSession;
use crate::scp::types::*;
use log::info;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Push `from` (file or directory) to `target` with default options.
pub fn copy<S: ScpSession>(session: &mut S, from: &Path, target: &str) -> ScpResult<()> {
    ScpCopier::new(ScpOptions::default()).copy(session, from, target)
}

/// Push `size` bytes of `payload` as a file named `filename`.
pub fn copy_file<S: ScpSession, R: Read + ?Sized>(
    session: &mut S,
    payload: &mut R,
    filename: &str,
    size: u64,
    mode: u32,
    target: &str,
) -> ScpResult<()> {
    ScpCopier::new(ScpOptions::default()).copy_file(session, payload, filename, size, mode, target)
}

/// Push the directory tree rooted at `from`.
pub fn copy_folder<S: ScpSession>(
    session: &mut S,
    from: &Path,
    mode: u32,
    target: &str,
) -> ScpResult<()> {
    ScpCopier::new(ScpOptions::default()).copy_folder(session, from, mode, target)
}

/// Drives a fresh [`RemoteClient`] per call to reproduce local entries on
/// the remote side. Holds the options and the optional diagnostic sink;
/// nothing is shared between transfers.
pub struct ScpCopier<F: LocalFs = OsFs> {
    options: ScpOptions,
    fs: F,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for ScpCopier<OsFs> {
    fn default() -> Self {
        Self::new(ScpOptions::default())
    }
}

impl ScpCopier<OsFs> {
    pub fn new(options: ScpOptions) -> Self {
        Self::with_fs(options, OsFs)
    }
}

impl<F: LocalFs> ScpCopier<F> {
    pub fn with_fs(options: ScpOptions, fs: F) -> Self {
        Self {
            options,
            fs,
            sink: None,
        }
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(&self) -> &ScpOptions {
        &self.options
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Push a regular file or a directory; anything else is refused.
    pub fn copy<S: ScpSession>(&self, session: &mut S, from: &Path, target: &str) -> ScpResult<()> {
        let meta = self.fs.stat(from)?;
        match meta.kind {
            EntryKind::Directory => self.push_folder(session, from, meta.mode, target),
            EntryKind::File => {
                let mut file = self.fs.open(from)?;
                self.copy_file(session, &mut file, &meta.name, meta.size, meta.mode, target)
                    .map_err(|e| e.with_local_path(from))
            }
            kind => Err(ScpError::UnsupportedEntry {
                path: from.to_path_buf(),
                kind,
            }),
        }
    }

    /// Push one file from any byte source.
    pub fn copy_file<S: ScpSession, R: Read + ?Sized>(
        &self,
        session: &mut S,
        payload: &mut R,
        filename: &str,
        size: u64,
        mode: u32,
        target: &str,
    ) -> ScpResult<()> {
        let mut client = self.client(session)?;
        client.start(target, false)?;
        client.write_file(&perm_string(mode), size, filename, payload)?;
        client.finish()?;
        info!("SCP uploaded {} ({} bytes) to {}", filename, size, target);
        Ok(())
    }

    /// Push the tree rooted at `from`; the root directory itself is
    /// recreated under its own base name with permissions `mode`. Anything
    /// but a real directory is refused before the remote side is contacted.
    pub fn copy_folder<S: ScpSession>(
        &self,
        session: &mut S,
        from: &Path,
        mode: u32,
        target: &str,
    ) -> ScpResult<()> {
        let meta = self.fs.stat(from)?;
        if meta.kind != EntryKind::Directory {
            return Err(ScpError::UnsupportedEntry {
                path: from.to_path_buf(),
                kind: meta.kind,
            });
        }
        self.push_folder(session, from, mode, target)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// `from` is known to be a directory.
    fn push_folder<S: ScpSession>(
        &self,
        session: &mut S,
        from: &Path,
        mode: u32,
        target: &str,
    ) -> ScpResult<()> {
        let name = local_fs::base_name(from)?;
        let mut client = self.client(session)?;
        client.start(target, true)?;
        if let Err(err) = self.push_tree(&mut client, from, &name, mode) {
            client.abort(&err);
            return Err(err);
        }
        client.finish()?;
        info!("SCP uploaded directory {} to {}", from.display(), target);
        Ok(())
    }

    fn client<'s, S: ScpSession>(&self, session: &'s mut S) -> ScpResult<RemoteClient<'s, S>> {
        let mut client = RemoteClient::with_options(session, self.options.clone())?;
        if let Some(sink) = &self.sink {
            client.attach_diagnostics(Arc::clone(sink));
        }
        Ok(client)
    }

    /// Depth-first walk; every directory is bracketed by its own
    /// enter/exit pair.
    fn push_tree<S: ScpSession>(
        &self,
        client: &mut RemoteClient<'_, S>,
        dir: &Path,
        name: &str,
        mode: u32,
    ) -> ScpResult<()> {
        client.enter_directory(&perm_string(mode), name)?;
        for entry in self.fs.list_dir(dir)? {
            match entry.kind {
                EntryKind::Directory => {
                    self.push_tree(client, &entry.path, &entry.name, entry.mode)?
                }
                EntryKind::File => {
                    let mut file = self.fs.open(&entry.path)?;
                    client
                        .write_file(&perm_string(entry.mode), entry.size, &entry.name, &mut file)
                        .map_err(|e| e.with_local_path(&entry.path))?;
                }
                kind => {
                    return Err(ScpError::UnsupportedEntry {
                        path: entry.path,
                        kind,
                    })
                }
            }
        }
        client.exit_directory()
    }
}
