// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exit codes returned by the `cricket` binary.

/// Documented exit codes for `cricket` failures.
///
/// `cricket` runs may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum CricketExitCode {}

impl CricketExitCode {
    /// No errors occurred and cricket exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up a cricket invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Discovering tests produced an error.
    pub const TEST_LIST_CREATION_FAILED: i32 = 104;

    /// The run ended before the producer reported the end of the run.
    pub const RUN_STOPPED: i32 = 107;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
