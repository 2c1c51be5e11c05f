// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use libc::{F_GETFL, F_SETFL, O_NONBLOCK, SIGTERM};
use std::{
    io::{self, Read},
    os::unix::{io::AsRawFd, process::CommandExt},
    process::{Child, ChildStdout, Command},
};

/// Puts the producer into its own process group, so that terminating it also reaches anything it
/// spawned and a Ctrl-C in the terminal is handled by us alone.
pub(super) fn set_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

pub(super) fn terminate_child(child: &mut Child) {
    // The process group ID is the same as the child's PID.
    let pgid = child.id() as i32;
    // SAFETY: kill has no memory-safety preconditions. A stale group ID only yields ESRCH.
    unsafe {
        libc::kill(-pgid, SIGTERM);
    }
}

/// The producer's standard output, in non-blocking mode.
#[derive(Debug)]
pub struct ChildOutput {
    stdout: ChildStdout,
}

impl ChildOutput {
    pub(super) fn new(stdout: ChildStdout) -> io::Result<Self> {
        let fd = stdout.as_raw_fd();
        // SAFETY: fd is a valid, open descriptor owned by `stdout` for the duration of these
        // calls.
        unsafe {
            let flags = libc::fcntl(fd, F_GETFL);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, F_SETFL, flags | O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { stdout })
    }
}

impl Read for ChildOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // EAGAIN surfaces as io::ErrorKind::WouldBlock.
        self.stdout.read(buf)
    }
}
