// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test helpers shared across unit tests.

use crate::{
    errors::RunStartError,
    process::{Launched, ProcessExit, TestLauncher, TestProcess},
};
use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Read},
    rc::Rc,
};

/// One step of a [`ScriptedReader`].
#[derive(Clone, Debug)]
pub(crate) enum ReadStep {
    /// Bytes that become available to the next read(s).
    Data(Vec<u8>),

    /// A read that finds nothing available.
    WouldBlock,

    /// A read interrupted by a signal.
    Interrupted,

    /// A failed read, as if the handle had been invalidated.
    Error,

    /// End of stream.
    Eof,
}

impl ReadStep {
    pub(crate) fn data(s: impl AsRef<[u8]>) -> Self {
        Self::Data(s.as_ref().to_vec())
    }
}

/// A reader that replays a fixed script of non-blocking read outcomes.
///
/// Once the script runs out, every read returns `WouldBlock`, mirroring a live producer that
/// hasn't written anything new.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedReader {
    steps: Rc<RefCell<VecDeque<ReadStep>>>,
}

impl ScriptedReader {
    pub(crate) fn new(steps: impl IntoIterator<Item = ReadStep>) -> Self {
        Self {
            steps: Rc::new(RefCell::new(steps.into_iter().collect())),
        }
    }

    /// Appends more steps to the script. Clones share the same script, so this can be called
    /// after the reader has been handed to a framer.
    pub(crate) fn push(&self, step: ReadStep) {
        self.steps.borrow_mut().push_back(step);
    }

    /// Appends every line with a trailing newline, followed by a `WouldBlock`.
    pub(crate) fn push_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) {
        let mut data = Vec::new();
        for line in lines {
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
        }
        self.push(ReadStep::Data(data));
        self.push(ReadStep::WouldBlock);
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut steps = self.steps.borrow_mut();
        match steps.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    steps.push_front(ReadStep::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(ReadStep::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
            Some(ReadStep::Error) => Err(io::Error::other("handle invalidated")),
            Some(ReadStep::Eof) => {
                // EOF is sticky.
                steps.push_front(ReadStep::Eof);
                Ok(0)
            }
        }
    }
}

/// Shared state recorded by a [`FakeProcess`].
#[derive(Debug, Default)]
pub(crate) struct FakeProcessState {
    pub(crate) terminated: bool,
    pub(crate) exit: Option<ProcessExit>,
}

/// A process whose output is a [`ScriptedReader`].
#[derive(Debug)]
pub(crate) struct FakeProcess {
    state: Rc<RefCell<FakeProcessState>>,
}

impl TestProcess for FakeProcess {
    fn terminate(&mut self) {
        let mut state = self.state.borrow_mut();
        state.terminated = true;
        state.exit.get_or_insert(ProcessExit { code: None });
    }

    fn try_exit(&mut self) -> Option<ProcessExit> {
        self.state.borrow().exit
    }
}

/// A launcher that hands out a single scripted process.
#[derive(Debug, Default)]
pub(crate) struct FakeLauncher {
    pub(crate) reader: ScriptedReader,
    pub(crate) state: Rc<RefCell<FakeProcessState>>,
    pub(crate) launched_with: RefCell<Option<Vec<String>>>,
    pub(crate) fail: bool,
}

impl FakeLauncher {
    pub(crate) fn new(reader: ScriptedReader) -> Self {
        Self {
            reader,
            ..Default::default()
        }
    }

    pub(crate) fn terminated(&self) -> bool {
        self.state.borrow().terminated
    }
}

impl TestLauncher for FakeLauncher {
    type Process = FakeProcess;
    type Output = ScriptedReader;

    fn launch(
        &self,
        labels: &[String],
    ) -> Result<Launched<Self::Process, Self::Output>, RunStartError> {
        if self.fail {
            return Err(RunStartError::spawn(
                ["fake-producer"],
                io::ErrorKind::NotFound.into(),
            ));
        }
        *self.launched_with.borrow_mut() = Some(labels.to_vec());
        Ok(Launched {
            process: FakeProcess {
                state: self.state.clone(),
            },
            output: self.reader.clone(),
        })
    }
}
