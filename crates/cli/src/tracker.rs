// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution tracker: correlates shell-reported command starts/ends
//! with API-requested executions for one terminal session.
//!
//! Transitions on a shell start, in order:
//!
//! 1. evict the ending slot (fire its end now, the flush finishes later);
//! 2. if a compound command is running, absorb the start when it is the next
//!    sub-command, otherwise evict the current execution;
//! 3. correlate against pending requests, or synthesize a new execution;
//! 4. admit the result as current.
//!
//! A shell end moves the current execution into the ending slot. Its end
//! event is published only once [`FlushNotice`] reports that every reader
//! drained the output, so subscribers never see an end while output is still
//! in flight.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::command_line::{CommandLine, Confidence};
use crate::event::{ShellEnv, ShellEvent, StateChange};
use crate::execution::{ExecutionInfo, ExecutionOrigin, ShellExecution};
use crate::resolver::{match_sub_execution, split_command_lines, MultiLineState};

/// Sent back to the owning session loop when an execution's output drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushNotice {
    pub execution_id: u64,
}

/// An API request waiting for the shell to start it.
#[derive(Debug)]
struct PendingExecution {
    execution: ShellExecution,
    /// Split command lines, used for multi-line prefix correlation.
    lines: Vec<String>,
}

impl PendingExecution {
    fn is_multi_line(&self) -> bool {
        self.lines.len() > 1
    }
}

/// An execution whose end is waiting on its output flush.
#[derive(Debug)]
struct EndingExecution {
    execution: ShellExecution,
    exit_code: Option<i32>,
}

/// Read-only snapshot of one session's tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session: String,
    pub cwd: Option<String>,
    pub env: Option<ShellEnv>,
    pub current: Option<ExecutionInfo>,
    pub ending: Option<ExecutionInfo>,
    pub pending: Vec<ExecutionInfo>,
    pub is_multi_line: bool,
    pub unresolved_command_lines: Vec<String>,
}

/// Per-session correlation state machine.
pub struct CommandExecutionTracker {
    session: String,
    cwd: Option<String>,
    env: Option<ShellEnv>,
    pending: VecDeque<PendingExecution>,
    current: Option<ShellExecution>,
    ending: Option<EndingExecution>,
    multi_line: MultiLineState,
    events: broadcast::Sender<ShellEvent>,
    flushed_tx: mpsc::UnboundedSender<FlushNotice>,
}

impl std::fmt::Debug for CommandExecutionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutionTracker")
            .field("session", &self.session)
            .field("pending", &self.pending.len())
            .field("current", &self.current.as_ref().map(ShellExecution::id))
            .field("ending", &self.ending.as_ref().map(|e| e.execution.id()))
            .finish()
    }
}

impl CommandExecutionTracker {
    /// Create a tracker for `session`.
    ///
    /// Lifecycle events go to `events`. Flush completions are reported on
    /// `flushed_tx` and must be fed back through [`on_flushed`](Self::on_flushed)
    /// by whoever owns the tracker.
    pub fn new(
        session: impl Into<String>,
        events: broadcast::Sender<ShellEvent>,
        flushed_tx: mpsc::UnboundedSender<FlushNotice>,
    ) -> Self {
        Self {
            session: session.into(),
            cwd: None,
            env: None,
            pending: VecDeque::new(),
            current: None,
            ending: None,
            multi_line: MultiLineState::default(),
            events,
            flushed_tx,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    pub fn env(&self) -> Option<&ShellEnv> {
        self.env.as_ref()
    }

    pub fn current(&self) -> Option<&ShellExecution> {
        self.current.as_ref()
    }

    /// The execution whose end waits on its output flush, if any.
    pub fn ending(&self) -> Option<&ShellExecution> {
        self.ending.as_ref().map(|e| &e.execution)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn multi_line(&self) -> &MultiLineState {
        &self.multi_line
    }

    pub fn snapshot(&self) -> SessionInfo {
        SessionInfo {
            session: self.session.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            current: self.current.as_ref().map(ShellExecution::snapshot),
            ending: self.ending.as_ref().map(|e| e.execution.snapshot()),
            pending: self.pending.iter().map(|p| p.execution.snapshot()).collect(),
            is_multi_line: self.multi_line.is_multi_line,
            unresolved_command_lines: self.multi_line.unresolved_command_lines.clone(),
        }
    }

    /// Queue an API-requested execution.
    ///
    /// The request must reach the tracker before the shell reports the
    /// matching start, otherwise the start is treated as a new command.
    pub fn request_new_execution(
        &mut self,
        command_line: CommandLine,
        cwd: Option<String>,
    ) -> ShellExecution {
        let cwd = cwd.or_else(|| self.cwd.clone());
        let lines = split_command_lines(&command_line.value);
        let multi_line = command_line.is_multi_line();
        let execution =
            ShellExecution::new(&self.session, ExecutionOrigin::Requested, command_line, cwd);
        debug!(
            session = %self.session,
            id = execution.id(),
            multi_line,
            "execution requested"
        );
        self.pending.push_back(PendingExecution { execution: execution.clone(), lines });
        self.emit(ShellEvent::ExecutionRequested {
            session: self.session.clone(),
            execution: execution.clone(),
        });
        execution
    }

    /// The shell reported that a command started.
    pub fn on_shell_start(&mut self, command_line: CommandLine, cwd: Option<String>) {
        // A missing end must never drop an execution silently.
        if let Some(ending) = self.ending.take() {
            debug!(session = %self.session, id = ending.execution.id(), "force-firing ending execution");
            self.fire_ended(ending.execution, ending.exit_code);
        }

        if let Some(current) = self.current.take() {
            if self.multi_line.absorb(&command_line.value) {
                debug!(
                    session = %self.session,
                    id = current.id(),
                    remaining = self.multi_line.unresolved_command_lines.len(),
                    "absorbed sub-command start"
                );
                self.current = Some(current);
                return;
            }
            debug!(session = %self.session, id = current.id(), "start without end, evicting current");
            self.force_end(current);
        }
        self.multi_line = MultiLineState::default();

        let execution = match self.correlate(&command_line) {
            Some(execution) => execution,
            None => {
                let cwd = cwd.or_else(|| self.cwd.clone());
                let execution =
                    ShellExecution::new(&self.session, ExecutionOrigin::Shell, command_line, cwd);
                debug!(session = %self.session, id = execution.id(), "synthesized execution");
                execution
            }
        };

        self.current = Some(execution.clone());
        self.emit(ShellEvent::ExecutionStarted { session: self.session.clone(), execution });
    }

    /// The shell reported that a command finished.
    pub fn on_shell_end(&mut self, command_line: CommandLine, exit_code: Option<i32>) {
        if self.multi_line.has_unresolved() {
            debug!(
                session = %self.session,
                remaining = self.multi_line.unresolved_command_lines.len(),
                "suppressed end of sub-command"
            );
            return;
        }
        let Some(current) = self.current.take() else {
            debug!(session = %self.session, "end without current execution");
            return;
        };

        // A compound command keeps the line it was requested with.
        if !self.multi_line.is_multi_line {
            current.revise_command_line(command_line);
        }
        self.multi_line = MultiLineState::default();

        if let Some(previous) = self.ending.take() {
            self.fire_ended(previous.execution, previous.exit_code);
        }
        current.end();
        self.ending = Some(EndingExecution { execution: current.clone(), exit_code });
        self.spawn_flush(current);
    }

    /// The shell produced output for the current command.
    pub fn on_shell_data(&mut self, chunk: &str) {
        match &self.current {
            Some(current) if !current.is_ended() => current.emit(chunk),
            _ => {}
        }
    }

    pub fn on_cwd_changed(&mut self, cwd: Option<String>) {
        if self.cwd == cwd {
            return;
        }
        self.cwd = cwd.clone();
        self.emit(ShellEvent::SessionStateChanged {
            session: self.session.clone(),
            change: StateChange::Cwd(cwd),
        });
    }

    pub fn on_env_changed(&mut self, keys: Vec<String>, values: Vec<String>, is_trusted: bool) {
        let env = ShellEnv::from_pairs(keys, values, is_trusted);
        if self.env.as_ref() == Some(&env) {
            return;
        }
        self.env = Some(env.clone());
        self.emit(ShellEvent::SessionStateChanged {
            session: self.session.clone(),
            change: StateChange::Env(env),
        });
    }

    /// An execution's output finished draining.
    pub fn on_flushed(&mut self, notice: FlushNotice) {
        let is_ending =
            self.ending.as_ref().is_some_and(|e| e.execution.id() == notice.execution_id);
        if !is_ending {
            // Already force-fired by a later start.
            return;
        }
        if let Some(ending) = self.ending.take() {
            self.fire_ended(ending.execution, ending.exit_code);
        }
    }

    /// End everything the session holds, without waiting for readers.
    ///
    /// Safe to call repeatedly: once the slots are empty it does nothing.
    pub fn close(&mut self) {
        if let Some(ending) = self.ending.take() {
            ending.execution.release();
            self.fire_ended(ending.execution, None);
        }
        if let Some(current) = self.current.take() {
            current.end();
            current.release();
            self.fire_ended(current, None);
        }
        while let Some(pending) = self.pending.pop_front() {
            pending.execution.end();
            pending.execution.release();
            self.fire_ended(pending.execution, None);
        }
        self.multi_line = MultiLineState::default();
    }

    /// Pick the pending request that corresponds to a reported start.
    fn correlate(&mut self, command_line: &CommandLine) -> Option<ShellExecution> {
        match command_line.confidence {
            Confidence::High => self
                .take_exact(&command_line.value)
                .or_else(|| self.take_multi_line_prefix(&command_line.value)),
            Confidence::Low => {
                let pending = self.pending.pop_front()?;
                if pending.is_multi_line() {
                    if let Some(rest) = match_sub_execution(&pending.lines, &command_line.value) {
                        self.multi_line = MultiLineState::pending(rest);
                    }
                }
                Some(pending.execution)
            }
        }
    }

    fn take_exact(&mut self, value: &str) -> Option<ShellExecution> {
        let index =
            self.pending.iter().position(|p| p.execution.command_line().value == value)?;
        self.pending.remove(index).map(|p| p.execution)
    }

    fn take_multi_line_prefix(&mut self, value: &str) -> Option<ShellExecution> {
        let (index, rest) = self.pending.iter().enumerate().find_map(|(index, pending)| {
            if !pending.is_multi_line() {
                return None;
            }
            match_sub_execution(&pending.lines, value).map(|rest| (index, rest))
        })?;
        let pending = self.pending.remove(index)?;
        debug!(
            session = %self.session,
            id = pending.execution.id(),
            remaining = rest.len(),
            "matched first sub-command of compound request"
        );
        self.multi_line = MultiLineState::pending(rest);
        Some(pending.execution)
    }

    /// End an execution the shell never reported an end for.
    fn force_end(&mut self, execution: ShellExecution) {
        execution.end();
        self.spawn_flush(execution.clone());
        self.fire_ended(execution, None);
    }

    fn spawn_flush(&self, execution: ShellExecution) {
        let flushed_tx = self.flushed_tx.clone();
        tokio::spawn(async move {
            execution.flush().await;
            let _ = flushed_tx.send(FlushNotice { execution_id: execution.id() });
        });
    }

    fn fire_ended(&self, execution: ShellExecution, exit_code: Option<i32>) {
        debug!(session = %self.session, id = execution.id(), ?exit_code, "execution ended");
        self.emit(ShellEvent::ExecutionEnded {
            session: self.session.clone(),
            execution,
            exit_code,
        });
    }

    fn emit(&self, event: ShellEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
