// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by cricket.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, io, num::ParseFloatError};
use thiserror::Error;

/// An error that occurred while reading the config.
#[derive(Debug, Error)]
#[error("failed to parse cricket config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while reading a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A command was configured as an empty list.
    #[error("`{key}` must contain at least the program to run")]
    EmptyCommand {
        /// The key that was empty.
        key: &'static str,
    },

    /// The protocol sentinels are unusable.
    #[error("invalid protocol sentinels: {reason}")]
    InvalidSentinels {
        /// Why the sentinels were rejected.
        reason: &'static str,
    },
}

/// An error returned while parsing a dotted test case path.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid test case path `{path}`: {reason}")]
pub struct TestPathParseError {
    path: String,
    reason: &'static str,
}

impl TestPathParseError {
    pub(crate) fn new(path: impl Into<String>, reason: &'static str) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }

    /// Returns the path that failed to parse.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One of the positional lines that a result record must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLine {
    /// The start timestamp, at position 0.
    Start,

    /// The result code, at position 1.
    Result,

    /// The end timestamp, at position 2.
    End,
}

impl fmt::Display for RecordLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLine::Start => write!(f, "start timestamp"),
            RecordLine::Result => write!(f, "result code"),
            RecordLine::End => write!(f, "end timestamp"),
        }
    }
}

/// An error that occurred while decoding a result record from the producer's output.
///
/// A decode error never aborts a run: the affected case is marked as an error and the run carries
/// on with the next block.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The record ended before a required positional line.
    #[error("result record is missing its {expected} line")]
    MissingLine {
        /// The line that was expected.
        expected: RecordLine,
    },

    /// A timestamp line didn't start with the expected prefix.
    #[error("expected {expected} line starting with `{prefix}`, found `{line}`")]
    MissingPrefix {
        /// The line that was expected.
        expected: RecordLine,

        /// The expected prefix.
        prefix: &'static str,

        /// The line actually found.
        line: String,
    },

    /// A timestamp couldn't be parsed as a number.
    #[error("invalid {expected} in `{line}`")]
    InvalidTimestamp {
        /// The line that was expected.
        expected: RecordLine,

        /// The line actually found.
        line: String,

        /// The underlying parse error.
        #[source]
        err: ParseFloatError,
    },

    /// The result code wasn't one of the known literals.
    #[error("unrecognized result code `{line}`")]
    UnknownResultCode {
        /// The line actually found.
        line: String,
    },

    /// The computed duration was negative or not finite.
    #[error("invalid duration: test ended at {end} before it started at {start}")]
    InvalidDuration {
        /// The start timestamp.
        start: f64,

        /// The end timestamp.
        end: f64,
    },

    /// The case path announced by the producer couldn't be parsed.
    #[error("invalid case path announced by the producer")]
    InvalidCasePath {
        /// The underlying error.
        #[source]
        err: TestPathParseError,
    },
}

/// An error that occurred while starting a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunStartError {
    /// A run is already in progress. It must be stopped before another one can start.
    #[error("a run is already in progress")]
    AlreadyRunning,

    /// The producer process couldn't be spawned.
    #[error("failed to spawn `{command}`")]
    Spawn {
        /// The command line that was attempted.
        command: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The producer process was spawned, but its standard output could not be captured.
    #[error("failed to capture standard output of `{command}`")]
    CaptureOutput {
        /// The command line that was spawned.
        command: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

impl RunStartError {
    pub(crate) fn spawn(command: impl IntoIterator<Item = impl AsRef<str>>, err: io::Error) -> Self {
        Self::Spawn {
            command: shell_words::join(command),
            err,
        }
    }

    pub(crate) fn capture_output(
        command: impl IntoIterator<Item = impl AsRef<str>>,
        err: io::Error,
    ) -> Self {
        Self::CaptureOutput {
            command: shell_words::join(command),
            err,
        }
    }
}

/// An error that occurred while discovering tests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The discovery command couldn't be executed.
    #[error("failed to execute `{command}`")]
    Exec {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The discovery command exited unsuccessfully.
    #[error("`{command}` exited with {}", display_exit_code(.exit_code.as_ref()))]
    Failed {
        /// The command line.
        command: String,

        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// A paths file couldn't be read.
    #[error("failed to read test paths from `{file}`")]
    ReadPaths {
        /// The file that was read.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// Discovery produced a path that isn't a valid case path.
    #[error(transparent)]
    InvalidPath(#[from] TestPathParseError),
}

fn display_exit_code(exit_code: Option<&i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by a signal?)".to_owned(),
    }
}

/// An error that occurs while writing a run event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[from] io::Error),
}
