// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::test_init;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use cricket_runner::{
    config::{CricketConfig, DefaultConfigWarnings},
    discover::{discover_tests, read_paths_file},
    errors::DiscoveryError,
    test_tree::NodeKind,
};
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn discover_with_configured_command() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    std::fs::write(
        dir.path().join("tests.txt"),
        indoc! {"
            app.FooTests.test_one\tChecks the first thing.
            app.FooTests.test_two
            other.tests.BarTests.test_three
        "},
    )?;
    let config_file = dir.path().join("cricket.toml");
    std::fs::write(
        &config_file,
        indoc! {r#"
            [discover]
            command = ["cat", "tests.txt"]
        "#},
    )?;

    let config =
        CricketConfig::from_sources(dir.path(), Some(&config_file), &mut DefaultConfigWarnings)?;
    let tree = discover_tests(&config.discover().command, config.project_dir())?;

    assert_eq!(tree.case_count(), 3);
    assert_eq!(tree.active_case_count(), 3);
    assert_eq!(
        tree.get("other.tests.BarTests").map(|node| node.kind()),
        Some(NodeKind::Group),
        "middle segments form the group"
    );
    assert_eq!(
        tree.case_details("app.FooTests.test_one")
            .and_then(|details| details.description),
        Some("Checks the first thing.")
    );
    assert!(tree.test_labels().is_empty(), "everything runs by default");

    // The same output read from a file builds the same tree.
    let from_file = read_paths_file(&dir.path().join("tests.txt"))?;
    assert_eq!(
        serde_json::to_value(from_file.to_summary())?,
        serde_json::to_value(tree.to_summary())?,
    );
    Ok(())
}

#[test]
fn discovery_command_not_found() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let command = vec!["cricket-this-command-does-not-exist".to_owned()];
    let error = discover_tests(&command, dir.path()).expect_err("command doesn't exist");
    assert!(
        matches!(error, DiscoveryError::Exec { .. }),
        "unexpected error: {error}"
    );
    Ok(())
}
