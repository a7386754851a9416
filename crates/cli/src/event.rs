// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::command_line::Confidence;
use crate::execution::{ExecutionInfo, ShellExecution};

/// A notification decoded from the shell's integration sequences.
///
/// The session id travels next to the notification, not inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The shell is about to execute a command.
    Start {
        command_line: String,
        #[serde(default)]
        confidence: Confidence,
        #[serde(default)]
        is_trusted: bool,
        #[serde(default)]
        cwd: Option<String>,
    },
    /// The shell finished executing a command.
    End {
        command_line: String,
        #[serde(default)]
        confidence: Confidence,
        #[serde(default)]
        is_trusted: bool,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// Output produced while a command runs.
    Data { chunk: String },
    CwdChanged {
        #[serde(default)]
        cwd: Option<String>,
    },
    EnvChanged {
        keys: Vec<String>,
        values: Vec<String>,
        #[serde(default)]
        is_trusted: bool,
    },
    SessionClosed,
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::End { .. } => "end",
            Self::Data { .. } => "data",
            Self::CwdChanged { .. } => "cwd_changed",
            Self::EnvChanged { .. } => "env_changed",
            Self::SessionClosed => "session_closed",
        }
    }
}

/// Environment snapshot reported by the shell, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellEnv {
    pub vars: IndexMap<String, String>,
    pub is_trusted: bool,
}

impl ShellEnv {
    /// Pair up keys and values. Unpaired trailing entries are ignored.
    pub fn from_pairs(keys: Vec<String>, values: Vec<String>, is_trusted: bool) -> Self {
        Self { vars: keys.into_iter().zip(values).collect(), is_trusted }
    }
}

/// Which piece of session state changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    Cwd(Option<String>),
    Env(ShellEnv),
}

/// Lifecycle events published to API subscribers.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    SessionOpened { session: String },
    SessionClosed { session: String },
    /// An API request was queued; the shell has not started it yet.
    ExecutionRequested { session: String, execution: ShellExecution },
    ExecutionStarted { session: String, execution: ShellExecution },
    /// Published only after every reader drained the execution's output.
    ExecutionEnded { session: String, execution: ShellExecution, exit_code: Option<i32> },
    SessionStateChanged { session: String, change: StateChange },
}

impl ShellEvent {
    /// Return the session identifier for this event.
    pub fn session(&self) -> &str {
        match self {
            Self::SessionOpened { session }
            | Self::SessionClosed { session }
            | Self::ExecutionRequested { session, .. }
            | Self::ExecutionStarted { session, .. }
            | Self::ExecutionEnded { session, .. }
            | Self::SessionStateChanged { session, .. } => session,
        }
    }

    pub fn execution(&self) -> Option<&ShellExecution> {
        match self {
            Self::ExecutionRequested { execution, .. }
            | Self::ExecutionStarted { execution, .. }
            | Self::ExecutionEnded { execution, .. } => Some(execution),
            Self::SessionOpened { .. }
            | Self::SessionClosed { .. }
            | Self::SessionStateChanged { .. } => None,
        }
    }

    /// Snapshot this event into its serializable form.
    pub fn to_record(&self) -> EventRecord {
        match self {
            Self::SessionOpened { session } => {
                EventRecord::SessionOpened { session: session.clone() }
            }
            Self::SessionClosed { session } => {
                EventRecord::SessionClosed { session: session.clone() }
            }
            Self::ExecutionRequested { session, execution } => EventRecord::ExecutionRequested {
                session: session.clone(),
                execution: execution.snapshot(),
            },
            Self::ExecutionStarted { session, execution } => EventRecord::ExecutionStarted {
                session: session.clone(),
                execution: execution.snapshot(),
            },
            Self::ExecutionEnded { session, execution, exit_code } => {
                EventRecord::ExecutionEnded {
                    session: session.clone(),
                    execution: execution.snapshot(),
                    exit_code: *exit_code,
                }
            }
            Self::SessionStateChanged { session, change } => {
                EventRecord::SessionStateChanged { session: session.clone(), change: change.clone() }
            }
        }
    }
}

/// Wire form of [`ShellEvent`], plus output chunks captured by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    SessionOpened {
        session: String,
    },
    SessionClosed {
        session: String,
    },
    ExecutionRequested {
        session: String,
        execution: ExecutionInfo,
    },
    ExecutionStarted {
        session: String,
        execution: ExecutionInfo,
    },
    ExecutionEnded {
        session: String,
        execution: ExecutionInfo,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    SessionStateChanged {
        session: String,
        change: StateChange,
    },
    Output {
        session: String,
        execution_id: u64,
        chunk: String,
    },
}

impl EventRecord {
    /// One-line human readable rendering for `--format text`.
    pub fn to_text(&self) -> String {
        match self {
            Self::SessionOpened { session } => format!("[{session}] opened"),
            Self::SessionClosed { session } => format!("[{session}] closed"),
            Self::ExecutionRequested { session, execution } => {
                format!("[{session}] requested #{} {:?}", execution.id, execution.command_line.value)
            }
            Self::ExecutionStarted { session, execution } => {
                format!("[{session}] started #{} {:?}", execution.id, execution.command_line.value)
            }
            Self::ExecutionEnded { session, execution, exit_code } => {
                let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_owned());
                format!(
                    "[{session}] ended #{} {:?} exit={code}",
                    execution.id, execution.command_line.value
                )
            }
            Self::SessionStateChanged { session, change: StateChange::Cwd(cwd) } => {
                format!("[{session}] cwd {}", cwd.as_deref().unwrap_or("-"))
            }
            Self::SessionStateChanged { session, change: StateChange::Env(env) } => {
                format!("[{session}] env {} vars (trusted={})", env.vars.len(), env.is_trusted)
            }
            Self::Output { session, execution_id, chunk } => {
                format!("[{session}] #{execution_id} > {chunk:?}")
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
