// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-line command resolution.
//!
//! Shells report a compound command line (a comment followed by a heredoc,
//! `a\nb\nc` pasted at once, ...) as several consecutive command starts, one
//! per sub-command they actually execute. These helpers decide whether a
//! reported start is the next piece of a compound line that is already
//! running, so the caller can fold it into one execution.

/// Split a command line into trimmed, non-empty lines.
pub fn split_command_lines(value: &str) -> Vec<String> {
    value
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Match `candidate` as the next sub-command of a compound line.
///
/// Consumes lines from the front of `unresolved` for as long as they equal
/// the candidate's lines. Returns the lines still unresolved when every line
/// of the candidate was consumed, or `None` when the candidate is not a
/// sub-command (first line differs, candidate is empty, or it runs past the
/// end of `unresolved`).
pub fn match_sub_execution(unresolved: &[String], candidate: &str) -> Option<Vec<String>> {
    let candidate = split_command_lines(candidate);
    if candidate.is_empty() || candidate.len() > unresolved.len() {
        return None;
    }

    let consumed = unresolved
        .iter()
        .zip(candidate.iter())
        .take_while(|(want, got)| want == got)
        .count();

    if consumed < candidate.len() {
        return None;
    }
    Some(unresolved[consumed..].to_vec())
}

/// Tracking state for a compound command that is currently executing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiLineState {
    pub is_multi_line: bool,
    pub unresolved_command_lines: Vec<String>,
}

impl MultiLineState {
    /// State for a compound command with `unresolved` lines still to come.
    pub fn pending(unresolved: Vec<String>) -> Self {
        Self { is_multi_line: true, unresolved_command_lines: unresolved }
    }

    /// True while reported starts may still be absorbed into the current
    /// execution and reported ends must be held back.
    pub fn has_unresolved(&self) -> bool {
        self.is_multi_line && !self.unresolved_command_lines.is_empty()
    }

    /// Try to absorb a reported start. Returns true if it was absorbed.
    pub fn absorb(&mut self, candidate: &str) -> bool {
        if !self.has_unresolved() {
            return false;
        }
        match match_sub_execution(&self.unresolved_command_lines, candidate) {
            Some(rest) => {
                self.unresolved_command_lines = rest;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
