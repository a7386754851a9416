// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{ExecutionDataChannel, ExecutionReader};
use crate::command_line::CommandLine;

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where an execution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrigin {
    /// Created by an API request and later confirmed by the shell.
    Requested,
    /// Synthesized from a shell start nobody asked for (typed by the user).
    Shell,
}

/// Lifecycle of the lazily-created output stream.
#[derive(Debug)]
enum DataSlot {
    Unread,
    Open(ExecutionDataChannel),
    Released,
}

#[derive(Debug)]
struct ExecutionInner {
    id: u64,
    session: String,
    origin: ExecutionOrigin,
    cwd: Option<String>,
    command_line: Mutex<CommandLine>,
    revised: AtomicBool,
    ended: AtomicBool,
    data: Mutex<DataSlot>,
}

/// Read-only view of one command execution.
///
/// Cheap to clone; all clones observe the same execution. Only the owning
/// tracker mutates it.
#[derive(Debug, Clone)]
pub struct ShellExecution {
    inner: Arc<ExecutionInner>,
}

impl PartialEq for ShellExecution {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ShellExecution {}

/// Serializable snapshot of a [`ShellExecution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: u64,
    pub session: String,
    pub origin: ExecutionOrigin,
    pub command_line: CommandLine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub ended: bool,
}

impl ShellExecution {
    pub(crate) fn new(
        session: &str,
        origin: ExecutionOrigin,
        command_line: CommandLine,
        cwd: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutionInner {
                id: NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed),
                session: session.to_owned(),
                origin,
                cwd,
                command_line: Mutex::new(command_line),
                revised: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                data: Mutex::new(DataSlot::Unread),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn session(&self) -> &str {
        &self.inner.session
    }

    pub fn origin(&self) -> ExecutionOrigin {
        self.inner.origin
    }

    pub fn command_line(&self) -> CommandLine {
        self.inner.command_line.lock().clone()
    }

    pub fn cwd(&self) -> Option<&str> {
        self.inner.cwd.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ExecutionInfo {
        ExecutionInfo {
            id: self.id(),
            session: self.session().to_owned(),
            origin: self.origin(),
            command_line: self.command_line(),
            cwd: self.inner.cwd.clone(),
            ended: self.is_ended(),
        }
    }

    /// Attach a reader to this execution's output.
    ///
    /// The stream is created on first use. Readers must attach before the
    /// output they want is produced: nothing is replayed. Once the execution
    /// ended the reader is immediately exhausted.
    pub fn read_data(&self) -> ExecutionReader {
        let mut slot = self.inner.data.lock();
        match &*slot {
            DataSlot::Open(channel) => channel.attach_reader(),
            DataSlot::Released => ExecutionReader::exhausted(),
            DataSlot::Unread if self.is_ended() => ExecutionReader::exhausted(),
            DataSlot::Unread => {
                let channel = ExecutionDataChannel::new();
                let reader = channel.attach_reader();
                *slot = DataSlot::Open(channel);
                reader
            }
        }
    }

    /// Forward an output chunk to the attached readers, if any.
    pub(crate) fn emit(&self, chunk: &str) {
        if self.is_ended() {
            return;
        }
        if let DataSlot::Open(channel) = &*self.inner.data.lock() {
            channel.emit(chunk);
        }
    }

    /// Replace the command line with a revised one. Only the first revision
    /// that actually changes the value is applied.
    pub(crate) fn revise_command_line(&self, command_line: CommandLine) {
        if self.is_ended() {
            return;
        }
        let mut current = self.inner.command_line.lock();
        if current.value == command_line.value {
            return;
        }
        if self.inner.revised.swap(true, Ordering::AcqRel) {
            return;
        }
        *current = command_line;
    }

    /// Mark the execution ended and close its output stream. Returns false
    /// if it had already ended.
    pub(crate) fn end(&self) -> bool {
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let DataSlot::Open(channel) = &*self.inner.data.lock() {
            channel.end();
        }
        true
    }

    /// Wait for every reader to drain, then release the stream.
    pub(crate) async fn flush(&self) {
        let channel = match &*self.inner.data.lock() {
            DataSlot::Open(channel) => Some(channel.clone()),
            DataSlot::Unread | DataSlot::Released => None,
        };
        if let Some(channel) = channel {
            debug!(id = self.id(), readers = channel.outstanding_readers(), "flushing output");
            channel.flush().await;
        }
        self.release();
    }

    /// Drop the stream without waiting for readers.
    pub(crate) fn release(&self) {
        *self.inner.data.lock() = DataSlot::Released;
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
