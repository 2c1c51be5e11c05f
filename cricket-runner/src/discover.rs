// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building the test tree from a list of case paths.
//!
//! Discovery output is line-oriented: each non-blank line is a dotted case path, optionally
//! followed by a tab and a human-readable description. Duplicate paths collapse into one case.

use crate::{
    errors::{DiscoveryError, TestPathParseError},
    helpers::plural,
    test_tree::TestTree,
};
use camino::Utf8Path;
use std::io;
use tracing::debug;

/// Runs the discovery command to completion in `cwd`, and builds a tree from its output.
pub fn discover_tests(command: &[String], cwd: &Utf8Path) -> Result<TestTree, DiscoveryError> {
    let command_str = shell_words::join(command);
    let Some((program, args)) = command.split_first() else {
        return Err(DiscoveryError::Exec {
            command: command_str,
            err: io::Error::new(io::ErrorKind::InvalidInput, "discovery command is empty"),
        });
    };

    let expression = duct::cmd(program, args).dir(cwd);
    debug!("discovering tests with `{command_str}`");
    let output = expression
        .stdout_capture()
        .unchecked()
        .run()
        .map_err(|err| DiscoveryError::Exec {
            command: command_str.clone(),
            err,
        })?;
    if !output.status.success() {
        return Err(DiscoveryError::Failed {
            command: command_str,
            exit_code: output.status.code(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_discovery_output(&stdout)?)
}

/// Reads case paths from a file, one per line, and builds a tree from them.
pub fn read_paths_file(file: &Utf8Path) -> Result<TestTree, DiscoveryError> {
    let contents = std::fs::read_to_string(file).map_err(|err| DiscoveryError::ReadPaths {
        file: file.to_owned(),
        err,
    })?;
    Ok(parse_discovery_output(&contents)?)
}

/// Builds a tree from discovery output.
pub fn parse_discovery_output(output: &str) -> Result<TestTree, TestPathParseError> {
    let mut tree = TestTree::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let (path, description) = match line.split_once('\t') {
            Some((path, description)) => (path.trim(), Some(description.trim().to_owned())),
            None => (line.trim(), None),
        };
        tree.insert_case(path, description.filter(|d| !d.is_empty()))?;
    }
    let (case_count, suite_count) = (tree.case_count(), tree.suites().count());
    debug!(
        "discovered {case_count} {} in {suite_count} {}",
        plural::tests_str(case_count),
        plural::suites_str(suite_count),
    );
    Ok(tree)
}
