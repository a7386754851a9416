// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-execution fan-out output stream.
//!
//! One writer (the tracker) and any number of readers. Each reader owns an
//! unbounded queue so emitting never waits on a slow consumer. Readers only
//! see chunks emitted after they attached; there is no replay buffer.
//!
//! `flush()` is the ordering primitive: it resolves once the stream has been
//! ended and every attached reader has either observed the end or been
//! dropped. The tracker awaits it before announcing that an execution ended.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, Copy, Default)]
struct FlushState {
    ended: bool,
    outstanding: usize,
}

impl FlushState {
    fn is_flushed(&self) -> bool {
        self.ended && self.outstanding == 0
    }
}

#[derive(Debug, Default)]
struct ChannelInner {
    readers: Vec<mpsc::UnboundedSender<String>>,
    ended: bool,
}

/// Multi-consumer, append-only output stream for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionDataChannel {
    inner: Arc<Mutex<ChannelInner>>,
    flush: Arc<watch::Sender<FlushState>>,
}

impl Default for ExecutionDataChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionDataChannel {
    pub fn new() -> Self {
        let (flush, _) = watch::channel(FlushState::default());
        Self { inner: Arc::new(Mutex::new(ChannelInner::default())), flush: Arc::new(flush) }
    }

    /// Deliver a chunk to every attached reader. No-op after [`end`](Self::end).
    pub fn emit(&self, chunk: &str) {
        let mut inner = self.inner.lock();
        if inner.ended {
            return;
        }
        // Readers that were dropped close their queue; forget them.
        inner.readers.retain(|tx| tx.send(chunk.to_owned()).is_ok());
    }

    /// Open the end gate. Readers drain what is queued and then finish.
    pub fn end(&self) {
        let mut inner = self.inner.lock();
        if inner.ended {
            return;
        }
        inner.ended = true;
        inner.readers.clear();
        drop(inner);
        self.flush.send_modify(|state| state.ended = true);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }

    /// Number of readers that have not yet drained.
    pub fn outstanding_readers(&self) -> usize {
        self.flush.borrow().outstanding
    }

    /// Attach an independent reader.
    ///
    /// The reader receives chunks emitted from now on. Attaching after the
    /// end gate opened yields an already-exhausted reader.
    pub fn attach_reader(&self) -> ExecutionReader {
        let mut inner = self.inner.lock();
        if inner.ended {
            return ExecutionReader::exhausted();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.readers.push(tx);
        self.flush.send_modify(|state| state.outstanding += 1);
        ExecutionReader {
            rx: Some(UnboundedReceiverStream::new(rx)),
            guard: Some(DrainGuard(Arc::clone(&self.flush))),
        }
    }

    /// Wait until the stream has ended and every reader has drained.
    pub async fn flush(&self) {
        let mut rx = self.flush.subscribe();
        // The sender lives as long as `self`, so this cannot observe a
        // closed channel.
        let _ = rx.wait_for(FlushState::is_flushed).await;
    }
}

/// Marks a reader as drained when it sees the end or is dropped.
#[derive(Debug)]
struct DrainGuard(Arc<watch::Sender<FlushState>>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.outstanding = state.outstanding.saturating_sub(1));
    }
}

/// One consumer cursor over an execution's output.
#[derive(Debug)]
pub struct ExecutionReader {
    rx: Option<UnboundedReceiverStream<String>>,
    guard: Option<DrainGuard>,
}

impl ExecutionReader {
    pub(crate) fn exhausted() -> Self {
        Self { rx: None, guard: None }
    }

    /// Collect every remaining chunk until the stream ends.
    pub async fn collect_all(mut self) -> Vec<String> {
        use futures_util::StreamExt;

        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk);
        }
        chunks
    }
}

impl Stream for ExecutionReader {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(rx).poll_next(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk)),
            Poll::Ready(None) => {
                self.rx = None;
                self.guard = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
