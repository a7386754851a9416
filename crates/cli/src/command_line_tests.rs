// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bare_executable = { "git status", None, "git status" },
    no_args = { "ls", Some(vec![]), "ls" },
    plain_args = { "git", Some(vec!["commit", "-m"]), "git commit -m" },
    spaced_arg = { "echo", Some(vec!["hello world"]), "echo \"hello world\"" },
    already_double_quoted = { "echo", Some(vec!["\"hello world\""]), "echo \"hello world\"" },
    already_single_quoted = { "echo", Some(vec!["'hello world'"]), "echo 'hello world'" },
    mismatched_quotes = { "echo", Some(vec!["\"hello world'"]), "echo \"\"hello world'\"" },
    tab_is_whitespace = { "printf", Some(vec!["a\tb"]), "printf \"a\tb\"" },
    mixed = { "cp", Some(vec!["a b", "c"]), "cp \"a b\" c" },
)]
fn request_command_line(executable: &str, args: Option<Vec<&str>>, expected: &str) {
    let args: Option<Vec<String>> = args.map(|a| a.into_iter().map(String::from).collect());
    let line = CommandLine::from_request(executable, args.as_deref());
    assert_eq!(line.value, expected);
    assert_eq!(line.confidence, Confidence::High);
    assert!(line.is_trusted);
}

#[yare::parameterized(
    single = { "echo hi", false },
    trailing_newline = { "echo hi\n", false },
    blank_lines = { "\n  \necho hi\n\n", false },
    two_lines = { "foo\nbar", true },
    crlf = { "foo\r\nbar", true },
)]
fn multi_line_detection(value: &str, expected: bool) {
    assert_eq!(CommandLine::trusted(value).is_multi_line(), expected);
}

#[test]
fn confidence_parses_case_insensitively() -> anyhow::Result<()> {
    assert_eq!("HIGH".parse::<Confidence>()?, Confidence::High);
    assert_eq!("low".parse::<Confidence>()?, Confidence::Low);
    assert!("medium".parse::<Confidence>().is_err());
    Ok(())
}

#[test]
fn deserializes_with_defaults() -> anyhow::Result<()> {
    let line: CommandLine = serde_json::from_str(r#"{"value":"ls"}"#)?;
    assert_eq!(line, CommandLine::new("ls", Confidence::Low, false));
    Ok(())
}
