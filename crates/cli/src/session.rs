// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session loop: the single dispatch point for one terminal session.
//!
//! Every notification and API request for a session is queued on one FIFO
//! channel and applied to the session's tracker in arrival order. Flush
//! completions from the tracker's background flush tasks come back through
//! a second channel, so all tracker mutation happens on this loop.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command_line::CommandLine;
use crate::error::ShellError;
use crate::event::{Notification, ShellEvent};
use crate::execution::ShellExecution;
use crate::tracker::{CommandExecutionTracker, FlushNotice, SessionInfo};

/// Work queued for a session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Notify(Notification),
    Request {
        command_line: CommandLine,
        cwd: Option<String>,
        reply: oneshot::Sender<ShellExecution>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionInfo>,
    },
    /// Reply once no ended execution is still waiting on its output flush.
    WaitFlushed {
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session loop.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn notify(&self, notification: Notification) -> Result<(), ShellError> {
        self.send(SessionCommand::Notify(notification))
    }

    pub async fn request(
        &self,
        command_line: CommandLine,
        cwd: Option<String>,
    ) -> Result<ShellExecution, ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Request { command_line, cwd, reply })?;
        rx.await.map_err(|_| ShellError::session_closed(&self.id))
    }

    pub async fn snapshot(&self) -> Result<SessionInfo, ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply })?;
        rx.await.map_err(|_| ShellError::session_closed(&self.id))
    }

    /// Wait until every ended execution has drained and announced its end.
    ///
    /// Resolves early if the session closes in the meantime.
    pub async fn wait_flushed(&self) -> Result<(), ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::WaitFlushed { reply })?;
        let _ = rx.await;
        Ok(())
    }

    /// Close the session and wait for the loop to finish.
    pub async fn close(self) {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionCommand::Close { reply }).is_ok() {
            let _ = rx.await;
        }
        let _ = self.task.await;
    }

    fn send(&self, command: SessionCommand) -> Result<(), ShellError> {
        self.commands.send(command).map_err(|_| ShellError::session_closed(&self.id))
    }
}

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Core session that runs the select-loop over commands and flush notices.
pub struct Session {
    tracker: CommandExecutionTracker,
    events: broadcast::Sender<ShellEvent>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    flushed_rx: mpsc::UnboundedReceiver<FlushNotice>,
    shutdown: CancellationToken,
    flush_waiters: Vec<oneshot::Sender<()>>,
    closed: bool,
}

impl Session {
    /// Build a session, announce it, and spawn its loop.
    pub fn spawn(
        id: &str,
        events: broadcast::Sender<ShellEvent>,
        shutdown: CancellationToken,
    ) -> SessionHandle {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (flushed_tx, flushed_rx) = mpsc::unbounded_channel();
        let tracker = CommandExecutionTracker::new(id, events.clone(), flushed_tx);

        let _ = events.send(ShellEvent::SessionOpened { session: id.to_owned() });
        info!(session = %id, "session opened");

        let session = Self {
            tracker,
            events,
            commands_rx,
            flushed_rx,
            shutdown,
            flush_waiters: Vec::new(),
            closed: false,
        };
        let task = tokio::spawn(session.run());
        SessionHandle { id: id.to_owned(), commands, task }
    }

    /// Run until closed, every handle is dropped, or shutdown is triggered.
    ///
    /// Queued commands always win over shutdown: everything accepted before
    /// the cancellation is applied before the session closes.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.commands_rx.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command) == Flow::Stop {
                        break;
                    }
                }
                Some(notice) = self.flushed_rx.recv() => {
                    self.tracker.on_flushed(notice);
                }
                _ = self.shutdown.cancelled() => {
                    debug!(session = %self.tracker.session(), "shutdown requested");
                    self.drain_queued();
                    break;
                }
            }
            self.wake_flush_waiters();
        }
        self.finish();
    }

    /// Apply commands that were queued before shutdown.
    fn drain_queued(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            if self.handle(command) == Flow::Stop {
                return;
            }
        }
    }

    fn wake_flush_waiters(&mut self) {
        if self.flush_waiters.is_empty() || self.tracker.ending().is_some() {
            return;
        }
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn handle(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Notify(notification) => self.apply(notification),
            SessionCommand::Request { command_line, cwd, reply } => {
                let execution = self.tracker.request_new_execution(command_line, cwd);
                let _ = reply.send(execution);
                Flow::Continue
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.tracker.snapshot());
                Flow::Continue
            }
            SessionCommand::WaitFlushed { reply } => {
                self.flush_waiters.push(reply);
                Flow::Continue
            }
            SessionCommand::Close { reply } => {
                self.finish();
                let _ = reply.send(());
                Flow::Stop
            }
        }
    }

    fn apply(&mut self, notification: Notification) -> Flow {
        match notification {
            Notification::Start { command_line, confidence, is_trusted, cwd } => {
                self.tracker
                    .on_shell_start(CommandLine::new(command_line, confidence, is_trusted), cwd);
            }
            Notification::End { command_line, confidence, is_trusted, exit_code } => {
                self.tracker
                    .on_shell_end(CommandLine::new(command_line, confidence, is_trusted), exit_code);
            }
            Notification::Data { chunk } => self.tracker.on_shell_data(&chunk),
            Notification::CwdChanged { cwd } => self.tracker.on_cwd_changed(cwd),
            Notification::EnvChanged { keys, values, is_trusted } => {
                self.tracker.on_env_changed(keys, values, is_trusted);
            }
            Notification::SessionClosed => {
                self.finish();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// End everything the session holds and announce the close, once.
    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.tracker.close();
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
        let _ = self
            .events
            .send(ShellEvent::SessionClosed { session: self.tracker.session().to_owned() });
        info!(session = %self.tracker.session(), "session closed");
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
