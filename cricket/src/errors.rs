// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    exit_codes::CricketExitCode,
    output::{NO_HEADING_TARGET, StderrStyles},
};
use cricket_runner::{
    errors::{ConfigParseError, DiscoveryError, RunStartError, WriteEventError},
    runner::StopReason,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that cricket knows how to report, with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("test discovery failed")]
    DiscoveryFailed {
        #[from]
        err: DiscoveryError,
    },
    #[error("failed to start run")]
    RunStartFailed {
        #[from]
        err: RunStartError,
    },
    #[error("error setting up signal handler")]
    SignalHandlerSetupError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing event")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing test list")]
    WriteListError {
        #[source]
        err: std::io::Error,
    },
    #[error("error serializing test list")]
    SerializeListError {
        #[source]
        err: serde_json::Error,
    },
    #[error("no tests to run")]
    NoTestsRun { filters: Vec<String> },
    #[error("test run failed")]
    TestRunFailed,
    #[error("test run stopped")]
    RunStopped { reason: StopReason },
}

impl ExpectedError {
    pub(crate) fn current_dir_failed(err: std::io::Error) -> Self {
        Self::CurrentDirFailed { err }
    }

    pub(crate) fn current_dir_invalid_utf8(path: impl Into<std::path::PathBuf>) -> Self {
        Self::CurrentDirInvalidUtf8 { path: path.into() }
    }

    pub(crate) fn signal_handler_setup_error(err: std::io::Error) -> Self {
        Self::SignalHandlerSetupError { err }
    }

    pub(crate) fn write_list_error(err: std::io::Error) -> Self {
        Self::WriteListError { err }
    }

    pub(crate) fn serialize_list_error(err: serde_json::Error) -> Self {
        Self::SerializeListError { err }
    }

    pub(crate) fn no_tests_run(filters: &[String]) -> Self {
        Self::NoTestsRun {
            filters: filters.to_vec(),
        }
    }

    pub(crate) fn test_run_failed() -> Self {
        Self::TestRunFailed
    }

    pub(crate) fn run_stopped(reason: StopReason) -> Self {
        Self::RunStopped { reason }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::RunStartFailed { .. }
            | Self::SignalHandlerSetupError { .. } => CricketExitCode::SETUP_ERROR,
            Self::DiscoveryFailed { .. } => CricketExitCode::TEST_LIST_CREATION_FAILED,
            Self::WriteEventError { .. }
            | Self::WriteListError { .. }
            | Self::SerializeListError { .. } => CricketExitCode::WRITE_OUTPUT_ERROR,
            Self::NoTestsRun { .. } => CricketExitCode::NO_TESTS_RUN,
            Self::TestRunFailed => CricketExitCode::TEST_RUN_FAILED,
            Self::RunStopped { .. } => CricketExitCode::RUN_STOPPED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8 (pass in --project-dir)",
                    path.display()
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse cricket config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::DiscoveryFailed { err } => {
                error!("test discovery failed");
                Some(err as &dyn Error)
            }
            Self::RunStartFailed { err } => {
                error!("failed to start test run");
                Some(err as &dyn Error)
            }
            Self::SignalHandlerSetupError { err } => {
                error!("error setting up signal handler");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::WriteListError { err } => {
                error!("failed to write test list to output");
                Some(err as &dyn Error)
            }
            Self::SerializeListError { err } => {
                error!("failed to serialize test list");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun { filters } => {
                if filters.is_empty() {
                    error!("no tests to run");
                } else {
                    error!(
                        "no tests to run: no discovered tests match {}",
                        filters
                            .iter()
                            .map(|filter| format!("`{}`", filter.style(styles.bold)))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                None
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::RunStopped { reason } => {
                match reason {
                    StopReason::Requested => error!("test run stopped"),
                    StopReason::StreamClosed => {
                        error!("test run stopped: the test runner exited before finishing")
                    }
                }
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
