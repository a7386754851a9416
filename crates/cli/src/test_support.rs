// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: harnesses, builders, and event helpers.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::command_line::{CommandLine, Confidence};
use crate::event::{ShellEvent, StateChange};
use crate::tracker::{CommandExecutionTracker, FlushNotice};

/// How long [`TrackerHarness::settle`] waits for another flush completion.
pub const SETTLE_TIMEOUT: Duration = Duration::from_millis(50);

/// Drives a [`CommandExecutionTracker`] directly, standing in for the
/// session loop that normally feeds flush completions back to it.
pub struct TrackerHarness {
    pub tracker: CommandExecutionTracker,
    events_rx: broadcast::Receiver<ShellEvent>,
    flushed_rx: mpsc::UnboundedReceiver<FlushNotice>,
}

impl TrackerHarness {
    pub fn new(session: &str) -> Self {
        let (events_tx, events_rx) = broadcast::channel(256);
        let (flushed_tx, flushed_rx) = mpsc::unbounded_channel();
        Self {
            tracker: CommandExecutionTracker::new(session, events_tx, flushed_tx),
            events_rx,
            flushed_rx,
        }
    }

    /// Feed back every flush completion that arrives before the stream
    /// goes quiet for [`SETTLE_TIMEOUT`].
    pub async fn settle(&mut self) {
        while let Ok(Some(notice)) =
            tokio::time::timeout(SETTLE_TIMEOUT, self.flushed_rx.recv()).await
        {
            self.tracker.on_flushed(notice);
        }
    }

    /// Take every event published so far.
    pub fn drain_events(&mut self) -> Vec<ShellEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// [`drain_events`](Self::drain_events) rendered with [`event_label`].
    pub fn drain_labels(&mut self) -> Vec<String> {
        self.drain_events().iter().map(event_label).collect()
    }

    pub fn start(&mut self, value: &str) {
        self.tracker.on_shell_start(high(value), None);
    }

    pub fn end(&mut self, value: &str, exit_code: Option<i32>) {
        self.tracker.on_shell_end(high(value), exit_code);
    }
}

/// A high-confidence, trusted command line as shell integration reports it.
pub fn high(value: &str) -> CommandLine {
    CommandLine::new(value, Confidence::High, true)
}

/// A low-confidence, untrusted command line.
pub fn low(value: &str) -> CommandLine {
    CommandLine::new(value, Confidence::Low, false)
}

/// Compact description of an event for order assertions, e.g.
/// `"started echo hi"` or `"ended echo hi exit=0"`.
pub fn event_label(event: &ShellEvent) -> String {
    match event {
        ShellEvent::SessionOpened { .. } => "opened".to_owned(),
        ShellEvent::SessionClosed { .. } => "closed".to_owned(),
        ShellEvent::ExecutionRequested { execution, .. } => {
            format!("requested {}", execution.command_line().value)
        }
        ShellEvent::ExecutionStarted { execution, .. } => {
            format!("started {}", execution.command_line().value)
        }
        ShellEvent::ExecutionEnded { execution, exit_code, .. } => match exit_code {
            Some(code) => format!("ended {} exit={code}", execution.command_line().value),
            None => format!("ended {}", execution.command_line().value),
        },
        ShellEvent::SessionStateChanged { change: StateChange::Cwd(cwd), .. } => {
            format!("cwd {}", cwd.as_deref().unwrap_or("-"))
        }
        ShellEvent::SessionStateChanged { change: StateChange::Env(env), .. } => {
            let vars: Vec<String> = env.vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("env {}", vars.join(","))
        }
    }
}

/// Receive events from a subscription until `done` returns true for one of
/// them, or `timeout` elapses. Returns everything received.
pub async fn recv_until(
    rx: &mut broadcast::Receiver<ShellEvent>,
    timeout: Duration,
    mut done: impl FnMut(&ShellEvent) -> bool,
) -> anyhow::Result<Vec<ShellEvent>> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {} events", events.len()))??;
        let finished = done(&event);
        events.push(event);
        if finished {
            return Ok(events);
        }
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
