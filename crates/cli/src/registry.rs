// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry and dispatch façade.
//!
//! [`ShellIntegration`] maps terminal-session ids to running session loops,
//! routes inbound shell notifications to the right one, and fans every
//! session's lifecycle events out on a single broadcast channel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command_line::{CommandLine, Confidence};
use crate::error::{ErrorCode, ShellError};
use crate::event::{Notification, ShellEvent};
use crate::execution::ShellExecution;
use crate::session::{Session, SessionHandle};
use crate::tracker::SessionInfo;

/// Library-side settings for a [`ShellIntegration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { event_capacity: 256 }
    }
}

/// Entry point for shell integration notifications and execution requests.
pub struct ShellIntegration {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    events: broadcast::Sender<ShellEvent>,
    shutdown: CancellationToken,
}

impl ShellIntegration {
    pub fn new(config: ServiceConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self { sessions: RwLock::new(HashMap::new()), events, shutdown: CancellationToken::new() }
    }

    /// Subscribe to lifecycle events from every session.
    ///
    /// Events are buffered per subscriber up to
    /// [`ServiceConfig::event_capacity`]. A subscriber that falls further
    /// behind loses the oldest events and its next `recv` reports
    /// `RecvError::Lagged`; start/end pairing only holds for subscribers
    /// that keep up.
    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.events.subscribe()
    }

    /// Register a terminal session and start its loop.
    pub async fn open_session(&self, session: &str) -> Result<(), ShellError> {
        let mut sessions = self.sessions.write().await;
        // Checked under the lock so a concurrent shutdown cannot miss this session.
        if self.shutdown.is_cancelled() {
            return Err(ErrorCode::SessionClosed.to_error("shell integration is shut down"));
        }
        if sessions.get(session).is_some_and(SessionHandle::is_running) {
            return Err(ShellError::session_exists(session));
        }
        let handle = Session::spawn(session, self.events.clone(), self.shutdown.child_token());
        sessions.insert(session.to_owned(), handle);
        Ok(())
    }

    /// Route one notification to its session.
    ///
    /// `SessionClosed` is idempotent and never fails; everything else
    /// requires a registered session.
    pub async fn dispatch(
        &self,
        session: &str,
        notification: Notification,
    ) -> Result<(), ShellError> {
        if matches!(notification, Notification::SessionClosed) {
            self.notify_session_closed(session).await;
            return Ok(());
        }
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session).ok_or_else(|| ShellError::session_not_found(session))?;
        handle.notify(notification)
    }

    pub async fn notify_start(
        &self,
        session: &str,
        command_line: &str,
        confidence: Confidence,
        is_trusted: bool,
        cwd: Option<String>,
    ) -> Result<(), ShellError> {
        let notification = Notification::Start {
            command_line: command_line.to_owned(),
            confidence,
            is_trusted,
            cwd,
        };
        self.dispatch(session, notification).await
    }

    pub async fn notify_end(
        &self,
        session: &str,
        command_line: &str,
        confidence: Confidence,
        is_trusted: bool,
        exit_code: Option<i32>,
    ) -> Result<(), ShellError> {
        let notification = Notification::End {
            command_line: command_line.to_owned(),
            confidence,
            is_trusted,
            exit_code,
        };
        self.dispatch(session, notification).await
    }

    pub async fn notify_data(&self, session: &str, chunk: &str) -> Result<(), ShellError> {
        self.dispatch(session, Notification::Data { chunk: chunk.to_owned() }).await
    }

    pub async fn notify_cwd_changed(
        &self,
        session: &str,
        cwd: Option<String>,
    ) -> Result<(), ShellError> {
        self.dispatch(session, Notification::CwdChanged { cwd }).await
    }

    pub async fn notify_env_changed(
        &self,
        session: &str,
        keys: Vec<String>,
        values: Vec<String>,
        is_trusted: bool,
    ) -> Result<(), ShellError> {
        self.dispatch(session, Notification::EnvChanged { keys, values, is_trusted }).await
    }

    /// Close a session, ending everything it holds.
    ///
    /// Returns `false` when the session was unknown or already closed.
    pub async fn notify_session_closed(&self, session: &str) -> bool {
        let handle = self.sessions.write().await.remove(session);
        match handle {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => {
                debug!(session = %session, "close for unknown session");
                false
            }
        }
    }

    /// Ask the shell to run `executable` with `args` in a session.
    ///
    /// The returned execution is queued until the shell reports its start.
    pub async fn request_execution(
        &self,
        session: &str,
        executable: &str,
        args: Option<&[String]>,
    ) -> Result<ShellExecution, ShellError> {
        self.request_command_line(session, CommandLine::from_request(executable, args), None).await
    }

    /// Queue a prepared command line, optionally overriding the cwd.
    pub async fn request_command_line(
        &self,
        session: &str,
        command_line: CommandLine,
        cwd: Option<String>,
    ) -> Result<ShellExecution, ShellError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session).ok_or_else(|| ShellError::session_not_found(session))?;
        handle.request(command_line, cwd).await
    }

    /// Wait until no ended execution of `session` is still draining its
    /// output, so every `ExecutionEnded` the shell reported has been published.
    pub async fn wait_flushed(&self, session: &str) -> Result<(), ShellError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session).ok_or_else(|| ShellError::session_not_found(session))?;
        handle.wait_flushed().await
    }

    pub async fn session_info(&self, session: &str) -> Result<SessionInfo, ShellError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session).ok_or_else(|| ShellError::session_not_found(session))?;
        handle.snapshot().await
    }

    /// Ids of every open session, sorted.
    pub async fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every session and refuse new ones.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            self.shutdown.cancel();
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            handle.close().await;
        }
        info!(sessions = count, "shell integration shut down");
    }
}

impl Default for ShellIntegration {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

impl std::fmt::Debug for ShellIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellIntegration")
            .field("subscribers", &self.events.receiver_count())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
