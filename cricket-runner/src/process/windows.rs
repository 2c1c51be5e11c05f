// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crossbeam_channel::{Receiver, TryRecvError};
use std::{
    io::{self, Read},
    process::{Child, ChildStdout, Command},
    thread,
};
use tracing::debug;

const PUMP_CHUNK_SIZE: usize = 8192;

pub(super) fn set_process_group(_cmd: &mut Command) {}

pub(super) fn terminate_child(child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!("failed to kill pid {}: {error}", child.id());
    }
}

/// The producer's standard output.
///
/// Anonymous pipes on Windows can't be put into non-blocking mode, so a thread performs the
/// blocking reads and hands chunks over a channel.
#[derive(Debug)]
pub struct ChildOutput {
    receiver: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
}

impl ChildOutput {
    pub(super) fn new(mut stdout: ChildStdout) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        thread::Builder::new()
            .name("cricket-stdout-pump".to_owned())
            .spawn(move || {
                let mut chunk = vec![0u8; PUMP_CHUNK_SIZE];
                loop {
                    match stdout.read(&mut chunk) {
                        // Dropping the sender signals EOF.
                        Ok(0) => break,
                        Ok(n) => {
                            if sender.send(Ok(chunk[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                        Err(error) => {
                            let _ = sender.send(Err(error));
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            receiver,
            pending: Vec::new(),
        })
    }
}

impl Read for ChildOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.receiver.try_recv() {
                Ok(Ok(chunk)) => self.pending = chunk,
                Ok(Err(error)) => return Err(error),
                Err(TryRecvError::Empty) => return Err(io::ErrorKind::WouldBlock.into()),
                Err(TryRecvError::Disconnected) => return Ok(0),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
