// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, ensure};
use cricket_runner::{
    config::{CricketConfig, DefaultConfigWarnings},
    decoder::Sentinels,
    reporter::{
        ReporterBuilder, ReporterStderr,
        events::{RunEvent, RunEventKind},
    },
    runner::{RunController, RunState, StopReason},
    test_tree::{NodeEvent, TestStatus, TestTree},
};
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use std::time::Duration;

fn sample_tree() -> Result<TestTree> {
    let mut tree = TestTree::from_paths([
        "app.Foo.test_pass",
        "app.Foo.test_fail",
        "app.Foo.test_skip",
        "app.Bar.test_off",
    ])?;
    let off = tree.find("app.Bar.test_off").expect("case exists");
    tree.set_active(off, false);
    Ok(tree)
}

fn status(tree: &TestTree, path: &str) -> Option<TestStatus> {
    tree.get(path).and_then(|node| node.status())
}

#[test]
fn run_to_terminator() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let output = ProducerOutput::new()
        .preamble("Creating test database...")
        .case("app.Foo.test_pass", "OK", 0.25, &[])
        .case(
            "app.Foo.test_fail",
            "F",
            0.5,
            &["AssertionError: boom", "  line 2"],
        )
        .case("app.Foo.test_skip", "s", 0.0, &["not ready"])
        .case("app.Foo.test_new", "OK", 0.125, &[])
        .terminator()
        .write_to(dir.path())?;

    let mut tree = sample_tree()?;
    let mut controller = ChildController::new(Sentinels::default());
    let mut events = Vec::new();
    controller.start(&replay_launcher(&output, None), &tree, |event| {
        events.push(event)
    })?;
    let state = run_to_completion(&mut controller, &mut tree, &mut events)?;

    assert_eq!(state, RunState::Finished);
    assert_eq!(
        status_messages(&events),
        vec![
            "Running...",
            "args: app.Foo",
            "Creating test database...",
            "Running app.Foo.test_pass...",
            "Running app.Foo.test_fail...",
            "Running app.Foo.test_skip...",
            "Running app.Foo.test_new...",
            "Finished.",
        ],
        "only the active group was requested"
    );

    assert_eq!(status(&tree, "app.Foo.test_pass"), Some(TestStatus::Pass));
    assert_eq!(status(&tree, "app.Foo.test_skip"), Some(TestStatus::Skip));
    assert_eq!(status(&tree, "app.Foo.test_new"), Some(TestStatus::Pass));
    assert_eq!(status(&tree, "app.Bar.test_off"), None);

    let details = tree.case_details("app.Foo.test_fail").expect("case exists");
    assert_eq!(details.status, Some(TestStatus::Fail));
    assert_eq!(details.error(), Some("AssertionError: boom\n  line 2"));
    assert_eq!(details.duration_display(), "0.50s");
    assert_eq!(
        tree.case_details("app.Foo.test_skip")
            .expect("case exists")
            .error(),
        Some("Skipped: not ready"),
    );

    let progress: Vec<_> = events
        .iter()
        .filter_map(|event| match event.kind {
            RunEventKind::Progress { completed, total } => Some((completed, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(0, 3), (1, 3), (2, 3), (3, 3), (4, 4)]);

    reap_all(&mut controller)?;
    Ok(())
}

#[test]
fn output_closed_mid_case() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let output = ProducerOutput::new()
        .case("app.Foo.test_pass", "OK", 0.25, &[])
        .open_case("app.Foo.test_fail")
        .raw_line("start: 100.0")
        .write_to(dir.path())?;

    let mut tree = sample_tree()?;
    let mut controller = ChildController::new(Sentinels::default());
    let mut events = Vec::new();
    controller.start(&replay_launcher(&output, None), &tree, |event| {
        events.push(event)
    })?;
    let state = run_to_completion(&mut controller, &mut tree, &mut events)?;

    assert_eq!(state, RunState::Stopped(StopReason::StreamClosed));
    assert_eq!(status(&tree, "app.Foo.test_pass"), Some(TestStatus::Pass));
    assert_eq!(
        status(&tree, "app.Foo.test_fail"),
        None,
        "a partial block never becomes a result"
    );
    assert_eq!(status_messages(&events).last(), Some(&"Stopped."));

    reap_all(&mut controller)?;
    Ok(())
}

#[test]
fn stop_terminates_producer() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let output = ProducerOutput::new()
        .case("app.Foo.test_pass", "OK", 0.25, &[])
        .open_case("app.Foo.test_fail")
        .write_to(dir.path())?;

    let mut tree = sample_tree()?;
    let mut controller = ChildController::new(Sentinels::default());
    let mut events = Vec::new();
    controller.start(
        &replay_launcher(&output, Some("exec sleep 60")),
        &tree,
        |event| events.push(event),
    )?;

    tick_until(&mut controller, &mut tree, &mut events, |events| {
        events.iter().any(|event| {
            matches!(
                &event.kind,
                RunEventKind::Node(NodeEvent::Running { path }) if path == "app.Foo.test_fail"
            )
        })
    })?;
    assert_eq!(controller.current_case_path(), Some("app.Foo.test_fail"));

    assert!(controller.stop(|event| events.push(event)));
    assert_eq!(
        controller.state(),
        RunState::Stopped(StopReason::Requested)
    );
    assert!(!controller.stop(|event| events.push(event)), "already stopped");
    let messages = status_messages(&events);
    assert_eq!(&messages[messages.len() - 2..], ["Stopping...", "Stopped."]);
    assert_eq!(status(&tree, "app.Foo.test_pass"), Some(TestStatus::Pass));
    assert_eq!(status(&tree, "app.Foo.test_fail"), None);

    // The producer was sleeping, so it only exits because it was terminated.
    reap_all(&mut controller)?;
    Ok(())
}

#[test]
fn rerun_replaces_results() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let mut tree = TestTree::from_paths(["app.Foo.test_flaky"])?;
    let mut controller = ChildController::new(Sentinels::default());

    for (code, expected) in [("F", TestStatus::Fail), ("OK", TestStatus::Pass)] {
        let output = ProducerOutput::new()
            .case("app.Foo.test_flaky", code, 0.5, &["details"])
            .terminator()
            .write_to(dir.path())?;

        let mut events = Vec::new();
        controller.start(&replay_launcher(&output, None), &tree, |event| {
            events.push(event)
        })?;
        let state = run_to_completion(&mut controller, &mut tree, &mut events)?;
        assert_eq!(state, RunState::Finished);
        assert_eq!(status(&tree, "app.Foo.test_flaky"), Some(expected));
    }

    let result = tree
        .get("app.Foo.test_flaky")
        .and_then(|node| node.last_result())
        .expect("case was resolved");
    assert_eq!(result.error, None);
    assert_eq!(result.duration, Duration::from_millis(500));

    reap_all(&mut controller)?;
    Ok(())
}

#[test]
fn configured_run_with_reporter() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let sentinels = Sentinels {
        section_sentinel: "#".repeat(20),
        run_terminator: "*".repeat(20),
    };
    ProducerOutput::with_sentinels(sentinels.clone())
        .case("app.Foo.test_pass", "OK", 0.25, &[])
        .case("app.Foo.test_fail", "F", 0.5, &["AssertionError: boom"])
        .terminator()
        .write_to(dir.path())?;

    std::fs::create_dir_all(dir.path().join(".config"))?;
    std::fs::write(
        dir.path().join(CricketConfig::CONFIG_PATH),
        formatdoc! {r#"
            [runner]
            command = ["sh", "-c", "cat producer-output.txt"]

            [protocol]
            section-sentinel = "{}"
            run-terminator = "{}"
        "#, sentinels.section_sentinel, sentinels.run_terminator},
    )?;

    let config = CricketConfig::from_sources(dir.path(), None, &mut DefaultConfigWarnings)?;
    assert_eq!(config.sentinels(), &sentinels);

    let mut tree = TestTree::from_paths(["app.Foo.test_pass", "app.Foo.test_fail"])?;
    let mut controller = RunController::new(config.sentinels().clone());
    let mut events: Vec<RunEvent> = Vec::new();
    controller.start(&config.launcher(), &tree, |event| events.push(event))?;
    let state = run_to_completion(&mut controller, &mut tree, &mut events)?;
    ensure!(state == RunState::Finished, "run finished (got {state})");

    let mut out = Vec::new();
    let stats = {
        let mut reporter = ReporterBuilder::default().build(ReporterStderr::Buffer(&mut out));
        for event in &events {
            reporter.report_event(event)?;
        }
        reporter.finish(&tree)?;
        reporter.stats()
    };
    assert_eq!(stats.passed, 1);
    assert_eq!(stats.failed, 1);
    assert!(stats.has_failures());

    let out = String::from_utf8(out)?;
    assert!(
        out.contains("2 tests run: 1 passed, 1 failed"),
        "summary line is present: {out}"
    );
    assert!(out.contains("        FAIL [   0.500s] app.Foo.test_fail"));
    assert!(out.contains("    AssertionError: boom"));

    reap_all(&mut controller)?;
    Ok(())
}
