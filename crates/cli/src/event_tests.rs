// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::command_line::CommandLine;
use crate::execution::ExecutionOrigin;

#[yare::parameterized(
    start = {
        r#"{"type":"start","command_line":"ls","confidence":"high","is_trusted":true,"cwd":"/tmp"}"#,
        "start"
    },
    start_defaults = { r#"{"type":"start","command_line":"ls"}"#, "start" },
    end = { r#"{"type":"end","command_line":"ls","exit_code":0}"#, "end" },
    data = { r#"{"type":"data","chunk":"hi"}"#, "data" },
    cwd = { r#"{"type":"cwd_changed","cwd":"/home"}"#, "cwd_changed" },
    env = { r#"{"type":"env_changed","keys":["A"],"values":["1"]}"#, "env_changed" },
    closed = { r#"{"type":"session_closed"}"#, "session_closed" },
)]
fn notification_parses(json: &str, kind: &str) {
    let parsed = serde_json::from_str::<Notification>(json).map(|n| n.kind());
    assert!(matches!(&parsed, Ok(k) if *k == kind), "{json} -> {parsed:?}");
}

#[test]
fn start_defaults_to_low_untrusted() -> anyhow::Result<()> {
    let notification: Notification =
        serde_json::from_str(r#"{"type":"start","command_line":"ls"}"#)?;
    assert_eq!(
        notification,
        Notification::Start {
            command_line: "ls".to_owned(),
            confidence: Confidence::Low,
            is_trusted: false,
            cwd: None,
        }
    );
    Ok(())
}

#[test]
fn env_pairs_ignore_unmatched_entries() {
    let env = ShellEnv::from_pairs(
        vec!["B".into(), "A".into(), "C".into()],
        vec!["2".into(), "1".into()],
        true,
    );
    assert_eq!(env.vars.keys().collect::<Vec<_>>(), vec!["B", "A"]);
    assert_eq!(env.vars.get("A").map(String::as_str), Some("1"));
    assert!(env.is_trusted);
}

#[test]
fn env_equality_is_by_value() {
    let a = ShellEnv::from_pairs(vec!["A".into()], vec!["1".into()], false);
    let b = ShellEnv::from_pairs(vec!["A".into()], vec!["1".into()], false);
    let c = ShellEnv::from_pairs(vec!["A".into()], vec!["1".into()], true);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn ended_record_serializes_with_exit_code() -> anyhow::Result<()> {
    let execution = ShellExecution::new(
        "t1",
        ExecutionOrigin::Requested,
        CommandLine::trusted("echo hi"),
        None,
    );
    let event = ShellEvent::ExecutionEnded {
        session: "t1".to_owned(),
        execution: execution.clone(),
        exit_code: Some(2),
    };
    assert_eq!(event.session(), "t1");
    assert_eq!(event.execution(), Some(&execution));

    let json = serde_json::to_value(event.to_record())?;
    assert_eq!(json["type"], "execution_ended");
    assert_eq!(json["exit_code"], 2);
    assert_eq!(json["execution"]["command_line"]["value"], "echo hi");
    Ok(())
}

#[test]
fn text_rendering() {
    let record = EventRecord::SessionStateChanged {
        session: "t1".to_owned(),
        change: StateChange::Cwd(None),
    };
    assert_eq!(record.to_text(), "[t1] cwd -");

    let record =
        EventRecord::Output { session: "t1".to_owned(), execution_id: 7, chunk: "a\n".to_owned() };
    assert_eq!(record.to_text(), "[t1] #7 > \"a\\n\"");
}
