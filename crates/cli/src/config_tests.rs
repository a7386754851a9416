// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use clap::Parser;

use super::{Config, OutputFormat};

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["shexec"]);
    config.validate()?;
    assert_eq!(config.input, None);
    assert_eq!(config.output_format()?, OutputFormat::Json);
    assert_eq!(config.session, "default");
    assert_eq!(config.service_config().event_capacity, 256);
    Ok(())
}

#[test]
fn input_and_format_flags() -> anyhow::Result<()> {
    let config = parse(&["shexec", "--input", "/tmp/t.jsonl", "--format", "TEXT"]);
    config.validate()?;
    assert_eq!(config.input.as_deref(), Some(Path::new("/tmp/t.jsonl")));
    assert_eq!(config.output_format()?, OutputFormat::Text);
    Ok(())
}

#[yare::parameterized(
    bad_format     = { &["shexec", "--format", "xml"], "invalid output format" },
    zero_capacity  = { &["shexec", "--event-capacity", "0"], "at least 1" },
    blank_session  = { &["shexec", "--session", " "], "must not be empty" },
    bad_log_format = { &["shexec", "--log-format", "yaml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn test_config_is_valid() -> anyhow::Result<()> {
    Config::test().validate()?;
    Ok(())
}

#[yare::parameterized(
    json = { OutputFormat::Json, "json" },
    text = { OutputFormat::Text, "text" },
)]
fn output_format_display(format: OutputFormat, expected: &str) {
    assert_eq!(format.to_string(), expected);
}
