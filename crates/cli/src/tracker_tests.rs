// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::test_support::{high, low, TrackerHarness};

#[tokio::test]
async fn request_start_end_produces_one_pair() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("echo hello world"), None);
    h.start("echo hello world");
    h.end("echo hello world", Some(0));
    h.settle().await;

    assert_eq!(
        h.drain_labels(),
        vec![
            "requested echo hello world",
            "started echo hello world",
            "ended echo hello world exit=0",
        ]
    );
    assert!(exec.is_ended());
    assert_eq!(exec.origin(), ExecutionOrigin::Requested);
    assert!(h.tracker.current().is_none());
    Ok(())
}

#[tokio::test]
async fn end_revises_command_line() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("echo hello world"), None);
    h.start("echo hello world");
    h.end("echo goodbye world", None);
    h.settle().await;

    let events = h.drain_events();
    let ended = events
        .iter()
        .find_map(|e| match e {
            ShellEvent::ExecutionEnded { execution, .. } => Some(execution.clone()),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("no ended event"))?;
    assert_eq!(ended, exec);
    assert_eq!(exec.command_line().value, "echo goodbye world");
    Ok(())
}

#[tokio::test]
async fn consecutive_starts_force_end_previous() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.request_new_execution(high("echo hello world"), None);
    h.start("echo hello world");
    h.tracker.request_new_execution(high("echo goodbye world"), None);
    h.start("echo goodbye world");

    // No settle: the forced end must be visible immediately.
    assert_eq!(
        h.drain_labels(),
        vec![
            "requested echo hello world",
            "started echo hello world",
            "requested echo goodbye world",
            "ended echo hello world",
            "started echo goodbye world",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn compound_command_is_one_execution() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("foo\nbar"), None);
    let reader = exec.read_data();

    h.start("foo");
    h.tracker.on_shell_data("1");
    h.tracker.on_shell_data("2");
    h.end("foo", Some(0));
    assert!(h.tracker.multi_line().has_unresolved());
    h.start("bar");
    h.tracker.on_shell_data("3");
    h.tracker.on_shell_data("4");
    h.end("bar", Some(0));

    let consumer = tokio::spawn(reader.collect_all());
    h.settle().await;

    assert_eq!(
        h.drain_labels(),
        vec!["requested foo\nbar", "started foo\nbar", "ended foo\nbar exit=0"]
    );
    assert_eq!(consumer.await?, vec!["1", "2", "3", "4"]);
    Ok(())
}

#[tokio::test]
async fn comment_heredoc_is_one_execution() -> anyhow::Result<()> {
    let command = "# comment: foo\ncat << EOT\nline1\nline2\nline3\nEOT";
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high(command), None);
    let reader = exec.read_data();

    h.start("# comment: foo");
    h.tracker.on_shell_data("a");
    h.end("# comment: foo", Some(0));
    h.start("cat << EOT\nline1\nline2\nline3\nEOT");
    h.tracker.on_shell_data("line1\n");
    h.tracker.on_shell_data("line2\nline3\n");
    h.end("cat << EOT\nline1\nline2\nline3\nEOT", Some(0));

    let consumer = tokio::spawn(reader.collect_all());
    h.settle().await;

    let labels = h.drain_labels();
    assert_eq!(labels.iter().filter(|l| l.starts_with("started")).count(), 1);
    assert_eq!(labels.iter().filter(|l| l.starts_with("ended")).count(), 1);
    assert_eq!(exec.command_line().value, command);
    assert_eq!(consumer.await?.concat(), "aline1\nline2\nline3\n");
    Ok(())
}

#[tokio::test]
async fn unrelated_start_evicts_running_compound() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let compound = h.tracker.request_new_execution(high("foo\nbar"), None);
    h.start("foo");
    h.end("foo", Some(0));
    assert!(h.tracker.multi_line().has_unresolved());

    h.start("baz");
    assert!(compound.is_ended());
    assert_eq!(h.tracker.multi_line(), &MultiLineState::default());
    h.end("baz", Some(1));
    h.settle().await;

    assert_eq!(
        h.drain_labels(),
        vec![
            "requested foo\nbar",
            "started foo\nbar",
            "ended foo\nbar",
            "started baz",
            "ended baz exit=1",
        ]
    );
    assert_eq!(h.tracker.multi_line(), &MultiLineState::default());
    assert_eq!(compound.command_line().value, "foo\nbar");
    Ok(())
}

#[tokio::test]
async fn high_confidence_prefers_exact_match_over_order() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let first = h.tracker.request_new_execution(high("ls"), None);
    let second = h.tracker.request_new_execution(high("pwd"), None);

    h.start("pwd");
    assert_eq!(h.tracker.current(), Some(&second));
    assert_eq!(h.tracker.pending_len(), 1);

    h.end("pwd", Some(0));
    h.start("ls");
    assert_eq!(h.tracker.current(), Some(&first));
    assert_eq!(h.tracker.pending_len(), 0);
    Ok(())
}

#[tokio::test]
async fn high_confidence_without_match_synthesizes() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.request_new_execution(high("ls"), None);

    h.start("whoami");
    let current = h.tracker.current().ok_or_else(|| anyhow::anyhow!("no current"))?;
    assert_eq!(current.origin(), ExecutionOrigin::Shell);
    assert_eq!(current.command_line().value, "whoami");
    assert_eq!(h.tracker.pending_len(), 1);
    Ok(())
}

#[tokio::test]
async fn low_confidence_dequeues_in_order() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let first = h.tracker.request_new_execution(high("ls"), None);
    h.tracker.request_new_execution(high("pwd"), None);

    h.tracker.on_shell_start(low("something else entirely"), None);
    assert_eq!(h.tracker.current(), Some(&first));
    assert_eq!(h.tracker.pending_len(), 1);
    Ok(())
}

#[tokio::test]
async fn low_confidence_compound_enters_multi_line() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("foo\nbar"), None);

    h.tracker.on_shell_start(low("foo"), None);
    assert_eq!(h.tracker.current(), Some(&exec));
    assert_eq!(h.tracker.multi_line().unresolved_command_lines, vec!["bar"]);
    Ok(())
}

#[tokio::test]
async fn unrequested_start_is_synthesized_with_session_cwd() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.on_cwd_changed(Some("/work".to_owned()));
    h.start("make");

    let current = h.tracker.current().ok_or_else(|| anyhow::anyhow!("no current"))?;
    assert_eq!(current.origin(), ExecutionOrigin::Shell);
    assert_eq!(current.cwd(), Some("/work"));

    h.tracker.on_shell_start(high("make test"), Some("/other".to_owned()));
    let current = h.tracker.current().ok_or_else(|| anyhow::anyhow!("no current"))?;
    assert_eq!(current.cwd(), Some("/other"));
    Ok(())
}

#[tokio::test]
async fn requested_execution_inherits_session_cwd() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.on_cwd_changed(Some("/work".to_owned()));
    let inherited = h.tracker.request_new_execution(high("ls"), None);
    let explicit = h.tracker.request_new_execution(high("ls"), Some("/tmp".to_owned()));
    assert_eq!(inherited.cwd(), Some("/work"));
    assert_eq!(explicit.cwd(), Some("/tmp"));
    Ok(())
}

#[tokio::test]
async fn data_without_current_is_dropped() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("ls"), None);
    let reader = exec.read_data();

    h.tracker.on_shell_data("before start");
    h.start("ls");
    h.tracker.on_shell_data("during");
    h.end("ls", Some(0));
    h.tracker.on_shell_data("after end");

    let consumer = tokio::spawn(reader.collect_all());
    h.settle().await;
    assert_eq!(consumer.await?, vec!["during"]);
    Ok(())
}

#[tokio::test]
async fn orphan_end_is_ignored() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.end("ls", Some(1));
    h.settle().await;
    assert!(h.drain_events().is_empty());
    Ok(())
}

#[tokio::test]
async fn ended_waits_for_reader_to_drain() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("cat big"), None);
    let mut reader = exec.read_data();

    h.start("cat big");
    h.tracker.on_shell_data("chunk");
    h.end("cat big", Some(0));
    h.settle().await;

    // Reader has not consumed anything: no end yet.
    let labels = h.drain_labels();
    assert!(!labels.iter().any(|l| l.starts_with("ended")), "{labels:?}");

    use futures_util::StreamExt;
    assert_eq!(reader.next().await.as_deref(), Some("chunk"));
    assert_eq!(reader.next().await, None);
    h.settle().await;
    assert_eq!(h.drain_labels(), vec!["ended cat big exit=0"]);
    Ok(())
}

#[tokio::test]
async fn start_force_fires_pending_ending_once() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let exec = h.tracker.request_new_execution(high("slow"), None);
    let reader = exec.read_data();

    h.start("slow");
    h.end("slow", Some(3));
    // Flush is blocked on the idle reader; the next start must not wait.
    h.start("next");
    assert_eq!(
        h.drain_labels(),
        vec!["requested slow", "started slow", "ended slow exit=3", "started next"]
    );

    // Draining later must not fire a second end for the same execution.
    drop(reader);
    h.settle().await;
    assert!(h.drain_labels().is_empty());
    Ok(())
}

#[tokio::test]
async fn ended_is_published_after_later_events_when_reader_lags() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    let a = h.tracker.request_new_execution(high("a"), None);
    let reader = a.read_data();
    h.start("a");
    h.tracker.on_shell_data("out");
    h.end("a", Some(0));
    h.tracker.on_cwd_changed(Some("/next".to_owned()));

    let consumer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        reader.collect_all().await
    });
    h.settle().await;
    assert_eq!(consumer.await?, vec!["out"]);

    assert_eq!(
        h.drain_labels(),
        vec!["requested a", "started a", "cwd /next", "ended a exit=0"]
    );
    Ok(())
}

#[tokio::test]
async fn cwd_and_env_changes_are_deduplicated() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.on_cwd_changed(Some("/a".to_owned()));
    h.tracker.on_cwd_changed(Some("/a".to_owned()));
    h.tracker.on_cwd_changed(None);
    h.tracker.on_env_changed(vec!["A".into()], vec!["1".into()], true);
    h.tracker.on_env_changed(vec!["A".into()], vec!["1".into()], true);
    h.tracker.on_env_changed(vec!["A".into()], vec!["2".into()], true);

    assert_eq!(h.drain_labels(), vec!["cwd /a", "cwd -", "env A=1", "env A=2"]);
    assert_eq!(h.tracker.cwd(), None);
    Ok(())
}

#[tokio::test]
async fn close_ends_everything_once() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.request_new_execution(high("a"), None);
    h.start("a");
    h.end("a", Some(0));
    h.tracker.request_new_execution(high("b"), None);
    h.start("b");
    let c = h.tracker.request_new_execution(high("c"), None);
    let reader = c.read_data();
    h.drain_events();

    h.tracker.close();
    h.tracker.close();

    assert_eq!(h.drain_labels(), vec!["ended b", "ended c"]);
    assert!(c.is_ended());
    assert!(reader.collect_all().await.is_empty());
    assert_eq!(h.tracker.pending_len(), 0);
    assert!(h.tracker.current().is_none());
    Ok(())
}

#[tokio::test]
async fn snapshot_reports_slots() -> anyhow::Result<()> {
    let mut h = TrackerHarness::new("t1");
    h.tracker.on_cwd_changed(Some("/w".to_owned()));
    h.tracker.request_new_execution(high("foo\nbar"), None);
    h.tracker.request_new_execution(high("ls"), None);
    h.start("foo");

    let info = h.tracker.snapshot();
    assert_eq!(info.session, "t1");
    assert_eq!(info.cwd.as_deref(), Some("/w"));
    assert_eq!(info.current.map(|c| c.command_line.value).as_deref(), Some("foo\nbar"));
    assert_eq!(info.pending.len(), 1);
    assert!(info.is_multi_line);
    assert_eq!(info.unresolved_command_lines, vec!["bar"]);
    Ok(())
}
