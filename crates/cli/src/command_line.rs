// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// How much the shell trusts its own report of the command line.
///
/// `High` lines were reported explicitly by the shell integration script and
/// are correlated by exact string equality. `Low` lines were reconstructed
/// from the prompt/screen and are correlated by queue order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => anyhow::bail!("invalid confidence: {other}"),
        }
    }
}

/// The shell's best understanding of what text was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub value: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub is_trusted: bool,
}

impl CommandLine {
    pub fn new(value: impl Into<String>, confidence: Confidence, is_trusted: bool) -> Self {
        Self { value: value.into(), confidence, is_trusted }
    }

    /// A high-confidence, trusted line as produced by API requests.
    pub fn trusted(value: impl Into<String>) -> Self {
        Self::new(value, Confidence::High, true)
    }

    /// Build the line for a programmatic request.
    ///
    /// Without `args` the executable is taken as a complete command line.
    /// With `args`, every argument containing whitespace that is not already
    /// quoted is wrapped in double quotes before joining.
    pub fn from_request(executable: &str, args: Option<&[String]>) -> Self {
        let value = match args {
            None => executable.to_owned(),
            Some(args) => {
                let mut value = executable.to_owned();
                for arg in args {
                    value.push(' ');
                    if needs_quoting(arg) {
                        value.push('"');
                        value.push_str(arg);
                        value.push('"');
                    } else {
                        value.push_str(arg);
                    }
                }
                value
            }
        };
        Self::trusted(value)
    }

    /// True when the line spans more than one non-empty line.
    pub fn is_multi_line(&self) -> bool {
        crate::resolver::split_command_lines(&self.value).len() > 1
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.chars().any(char::is_whitespace) && !is_quoted(arg)
}

fn is_quoted(arg: &str) -> bool {
    let bytes = arg.as_bytes();
    bytes.len() >= 2
        && matches!(bytes[0], b'"' | b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
}

#[cfg(test)]
#[path = "command_line_tests.rs"]
mod tests;
