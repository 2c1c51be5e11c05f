// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::os;
use crate::{errors::RunStartError, helpers::display_exited_with};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    io::{self, Read},
    process::{Child, Command, Stdio},
};
use tracing::{debug, warn};

pub use os::ChildOutput;

/// Starts the producer for a run.
pub trait TestLauncher {
    /// The handle to the running producer.
    type Process: TestProcess;

    /// The producer's standard output. Reads must not block: when nothing is available, they
    /// return an error of kind [`io::ErrorKind::WouldBlock`].
    type Output: Read;

    /// Launches the producer, asking it to run the given labels (all tests if empty).
    fn launch(
        &self,
        labels: &[String],
    ) -> Result<Launched<Self::Process, Self::Output>, RunStartError>;
}

/// A handle to a launched producer.
pub trait TestProcess {
    /// Asks the producer to terminate. This doesn't wait for it to exit.
    fn terminate(&mut self);

    /// Returns the exit status if the producer has exited, without blocking.
    fn try_exit(&mut self) -> Option<ProcessExit>;
}

/// A launched producer and its output stream.
#[derive(Debug)]
pub struct Launched<P, O> {
    /// The process handle.
    pub process: P,

    /// The non-blocking output stream.
    pub output: O,
}

/// How a producer exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    /// The exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// Returns true if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Launches the producer as a child process.
///
/// Labels are appended to the configured command line as extra arguments.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    cwd: Option<Utf8PathBuf>,
}

impl CommandLauncher {
    /// Creates a new launcher for a program and its leading arguments.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Sets the working directory for the producer.
    pub fn current_dir(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Returns the working directory for the producer, if set.
    pub fn cwd(&self) -> Option<&Utf8Path> {
        self.cwd.as_deref()
    }

    /// Returns the full command line that would be run for these labels.
    pub fn command_line(&self, labels: &[String]) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .chain(labels.iter().cloned())
            .collect()
    }
}

impl TestLauncher for CommandLauncher {
    type Process = ChildProcess;
    type Output = ChildOutput;

    fn launch(
        &self,
        labels: &[String],
    ) -> Result<Launched<Self::Process, Self::Output>, RunStartError> {
        let command_line = self.command_line(labels);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(labels)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        os::set_process_group(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|err| RunStartError::spawn(&command_line, err))?;

        let output = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("standard output was not piped"))
            .and_then(ChildOutput::new);
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                // The child is of no use without its output.
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunStartError::capture_output(&command_line, err));
            }
        };

        debug!(
            "spawned `{}` (pid {})",
            shell_words::join(&command_line),
            child.id(),
        );
        Ok(Launched {
            process: ChildProcess {
                child,
                terminate_sent: false,
            },
            output,
        })
    }
}

/// A producer running as a child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    terminate_sent: bool,
}

impl ChildProcess {
    /// Returns the OS process ID.
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl TestProcess for ChildProcess {
    fn terminate(&mut self) {
        if self.terminate_sent {
            return;
        }
        self.terminate_sent = true;

        match self.child.try_wait() {
            Ok(Some(_)) => {
                debug!("pid {} already exited, not terminating", self.child.id());
            }
            Ok(None) | Err(_) => {
                debug!("terminating pid {}", self.child.id());
                os::terminate_child(&mut self.child);
            }
        }
    }

    fn try_exit(&mut self) -> Option<ProcessExit> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("pid {} {}", self.child.id(), display_exited_with(status));
                Some(ProcessExit {
                    code: status.code(),
                })
            }
            Ok(None) => None,
            Err(error) => {
                warn!("failed to query status of pid {}: {error}", self.child.id());
                // Treat the process as gone so it isn't polled forever.
                Some(ProcessExit { code: None })
            }
        }
    }
}
