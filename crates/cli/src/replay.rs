// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript replay: feeds recorded shell integration traffic through a
//! [`ShellIntegration`] and renders the resulting events.
//!
//! A transcript is JSON lines. Each line is either a [`Notification`]
//! (`{"type":"start","command_line":"ls",...}`) or one of the control
//! records `open` and `request`. Every line may carry a `session` field;
//! lines without one go to the default session.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::command_line::CommandLine;
use crate::config::OutputFormat;
use crate::error::{ErrorCode, ShellError};
use crate::event::{EventRecord, Notification};
use crate::execution::ShellExecution;
use crate::registry::{ServiceConfig, ShellIntegration};

/// Records that drive the façade rather than a session's shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Register the session explicitly.
    Open,
    /// Queue a programmatic execution.
    Request {
        command: String,
        #[serde(default)]
        args: Option<Vec<String>>,
        #[serde(default)]
        cwd: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Control(Control),
    Notify(Notification),
}

/// One parsed transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub session: Option<String>,
    pub action: Action,
}

impl TranscriptRecord {
    pub fn parse(line: &str) -> Result<Self, ShellError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ErrorCode::BadRequest.to_error(format!("invalid JSON: {e}")))?;
        let session = match value.get("session") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(ErrorCode::BadRequest.to_error(format!("invalid session: {other}")))
            }
        };
        let kind =
            value.get("type").and_then(serde_json::Value::as_str).unwrap_or_default().to_owned();
        let action = match kind.as_str() {
            "open" | "request" => Action::Control(
                serde_json::from_value(value)
                    .map_err(|e| ErrorCode::BadRequest.to_error(format!("invalid {kind}: {e}")))?,
            ),
            _ => Action::Notify(
                serde_json::from_value(value)
                    .map_err(|e| ErrorCode::BadRequest.to_error(format!("invalid record: {e}")))?,
            ),
        };
        Ok(Self { session, action })
    }
}

/// Settings for one replay run.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub default_session: String,
    pub format: OutputFormat,
    pub service: ServiceConfig,
}

/// Counts reported after a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: usize,
    pub events: usize,
}

/// Replay the transcript at `input`, or stdin when `None`.
pub async fn replay_input<W: Write>(
    options: &ReplayOptions,
    input: Option<&Path>,
    out: &mut W,
) -> anyhow::Result<ReplaySummary> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open transcript {}", path.display()))?;
            replay(options, BufReader::new(file), out).await
        }
        None => replay(options, BufReader::new(tokio::io::stdin()), out).await,
    }
}

/// Replay a transcript, writing one rendered record per event to `out`.
///
/// Sessions are opened on first reference. Referencing a session after the
/// transcript closed it fails with `SESSION_NOT_FOUND`.
pub async fn replay<R, W>(
    options: &ReplayOptions,
    input: R,
    out: &mut W,
) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let shell = ShellIntegration::new(options.service);
    let (records_tx, mut records_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_events(shell.subscribe(), records_tx.clone()));

    let mut replayer = Replayer {
        shell,
        default_session: options.default_session.clone(),
        opened: HashSet::new(),
        closed: HashSet::new(),
        records_tx,
    };
    let mut summary = ReplaySummary::default();
    let mut lines = input.lines();
    let mut line_no = 0usize;

    let result: anyhow::Result<()> = async {
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let at_line = |e: ShellError| e.code.to_error(format!("line {line_no}: {}", e.message));
            let record = TranscriptRecord::parse(&line).map_err(at_line)?;
            replayer.apply(record).await.map_err(at_line)?;
            summary.records += 1;
            summary.events += write_ready(&mut records_rx, options.format, out)?;
        }
        Ok(())
    }
    .await;

    // End of input is not a close: let finished executions publish their
    // ends first, then close whatever is still running.
    let Replayer { shell, records_tx, opened, .. } = replayer;
    for session in &opened {
        let _ = shell.wait_flushed(session).await;
    }
    shell.shutdown().await;
    drop(shell);
    drop(records_tx);
    let _ = forwarder.await;

    while let Some(record) = records_rx.recv().await {
        write_record(&record, options.format, out)?;
        summary.events += 1;
    }
    out.flush()?;
    result?;
    debug!(records = summary.records, events = summary.events, "replay finished");
    Ok(summary)
}

struct Replayer {
    shell: ShellIntegration,
    default_session: String,
    opened: HashSet<String>,
    closed: HashSet<String>,
    records_tx: mpsc::UnboundedSender<EventRecord>,
}

impl Replayer {
    async fn apply(&mut self, record: TranscriptRecord) -> Result<(), ShellError> {
        let session = record.session.unwrap_or_else(|| self.default_session.clone());
        match record.action {
            Action::Control(Control::Open) => {
                self.closed.remove(&session);
                self.opened.insert(session.clone());
                self.shell.open_session(&session).await
            }
            Action::Control(Control::Request { command, args, cwd }) => {
                self.ensure_open(&session).await?;
                let command_line = CommandLine::from_request(&command, args.as_deref());
                let execution =
                    self.shell.request_command_line(&session, command_line, cwd).await?;
                self.capture_output(execution);
                Ok(())
            }
            Action::Notify(Notification::SessionClosed) => {
                if self.opened.remove(&session) {
                    self.closed.insert(session.clone());
                }
                self.shell.notify_session_closed(&session).await;
                Ok(())
            }
            Action::Notify(notification) => {
                self.ensure_open(&session).await?;
                self.shell.dispatch(&session, notification).await
            }
        }
    }

    async fn ensure_open(&mut self, session: &str) -> Result<(), ShellError> {
        if self.opened.contains(session) {
            return Ok(());
        }
        if self.closed.contains(session) {
            return Err(ShellError::session_not_found(session));
        }
        self.shell.open_session(session).await?;
        self.opened.insert(session.to_owned());
        Ok(())
    }

    /// Attach a reader before the shell can report the start.
    fn capture_output(&self, execution: ShellExecution) {
        let mut reader = execution.read_data();
        let tx = self.records_tx.clone();
        tokio::spawn(async move {
            while let Some(chunk) = reader.next().await {
                let record = EventRecord::Output {
                    session: execution.session().to_owned(),
                    execution_id: execution.id(),
                    chunk,
                };
                if tx.send(record).is_err() {
                    break;
                }
            }
        });
    }
}

async fn forward_events(
    mut events: broadcast::Receiver<crate::event::ShellEvent>,
    tx: mpsc::UnboundedSender<EventRecord>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if tx.send(event.to_record()).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(dropped = n, "event stream lagged, raise --event-capacity");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn write_ready<W: Write>(
    rx: &mut mpsc::UnboundedReceiver<EventRecord>,
    format: OutputFormat,
    out: &mut W,
) -> anyhow::Result<usize> {
    let mut written = 0;
    while let Ok(record) = rx.try_recv() {
        write_record(&record, format, out)?;
        written += 1;
    }
    Ok(written)
}

fn write_record<W: Write>(
    record: &EventRecord,
    format: OutputFormat,
    out: &mut W,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(record)?)?,
        OutputFormat::Text => writeln!(out, "{}", record.to_text())?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
