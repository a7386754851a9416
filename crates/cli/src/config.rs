// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::registry::ServiceConfig;

/// Output encoding for replayed events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Text => f.write_str("text"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => anyhow::bail!("invalid output format: {other}"),
        }
    }
}

/// Replay shell integration transcripts through the execution tracker.
#[derive(Debug, Parser)]
#[command(name = "shexec", version, about)]
pub struct Config {
    /// Transcript to replay (JSON lines). Reads stdin when absent.
    #[arg(long, env = "SHEXEC_INPUT")]
    pub input: Option<PathBuf>,

    /// Output format (json or text).
    #[arg(long, env = "SHEXEC_FORMAT", default_value = "json")]
    pub format: String,

    /// Session id used for records that do not name one.
    #[arg(long, env = "SHEXEC_SESSION", default_value = "default")]
    pub session: String,

    /// Capacity of the lifecycle event channel.
    #[arg(long, env = "SHEXEC_EVENT_CAPACITY", default_value = "256")]
    pub event_capacity: usize,

    /// Log format (json or text).
    #[arg(long, env = "SHEXEC_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SHEXEC_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.output_format()?;

        if self.event_capacity == 0 {
            anyhow::bail!("--event-capacity must be at least 1");
        }
        if self.session.trim().is_empty() {
            anyhow::bail!("--session must not be empty");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Parse the output format string into an enum.
    pub fn output_format(&self) -> anyhow::Result<OutputFormat> {
        self.format.parse()
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig { event_capacity: self.event_capacity }
    }

    /// Build a minimal `Config` for tests (stdin input, JSON output).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            input: None,
            format: "json".into(),
            session: "t1".into(),
            event_capacity: 64,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
