// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes surfaced to callers of the dispatch façade.
///
/// Correlation anomalies (orphan ends, data without a command, ...) are
/// resolved inside the tracker and never show up here; only session identity
/// and lifecycle violations do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    SessionExists,
    SessionNotFound,
    SessionClosed,
    BadRequest,
    Internal,
}

impl ErrorCode {
    /// Process exit status used by the CLI when a replay fails with this code.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::BadRequest => 2,
            Self::SessionExists => 3,
            Self::SessionNotFound => 4,
            Self::SessionClosed => 4,
            Self::Internal => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionExists => "SESSION_EXISTS",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error(&self, message: impl Into<String>) -> ShellError {
        ShellError { code: *self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error with machine-readable code and human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellError {
    pub code: ErrorCode,
    pub message: String,
}

impl ShellError {
    pub fn session_exists(session: &str) -> Self {
        ErrorCode::SessionExists.to_error(format!("session already registered: {session}"))
    }

    pub fn session_not_found(session: &str) -> Self {
        ErrorCode::SessionNotFound.to_error(format!("no such session: {session}"))
    }

    pub fn session_closed(session: &str) -> Self {
        ErrorCode::SessionClosed.to_error(format!("session closed: {session}"))
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ShellError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
