// ── Transfer diagnostics ─────────────────────────────────────────────────────

use crate::scp::types::AckStatus;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One observable step of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub transfer_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DiagnosticKind {
    CommandSent { command: String },
    /// Control line as sent, without the trailing newline.
    ControlLine { line: String },
    PayloadSent { bytes: u64 },
    Acknowledged,
    RemoteError {
        status: AckStatus,
        reason: Option<String>,
    },
    Completed,
    Failed { message: String },
}

/// Receiver for transfer events. Attached to an [`ScpCopier`] or directly
/// to a [`RemoteClient`]; the protocol never depends on it.
///
/// [`ScpCopier`]: crate::scp::ScpCopier
/// [`RemoteClient`]: crate::scp::RemoteClient
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &DiagnosticEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Control lines in the order they were sent.
    pub fn control_lines(&self) -> Vec<String> {
        self.kinds()
            .into_iter()
            .filter_map(|k| match k {
                DiagnosticKind::ControlLine { line } => Some(line),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: &DiagnosticEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards events to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, event: &DiagnosticEvent) {
        debug!("[scp {}] {:?}", event.transfer_id, event.kind);
    }
}
