// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    decoder::{DecoderEvent, ResultDecoder, Sentinels},
    errors::{DecodeError, RunStartError},
    framer::{DEFAULT_MAX_BYTES_PER_POLL, LineFramer},
    process::{TestLauncher, TestProcess},
    reporter::events::{RunEvent, RunEventKind},
    test_tree::{NodeEvent, NodeId, TestTree},
    time::{StopwatchStart, stopwatch},
};
use std::{fmt, io::Read};
use tracing::{debug, warn};

/// The lifecycle state of a [`RunController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// No run has been started yet.
    Idle,

    /// A run is in progress.
    Running,

    /// The last run reached the run terminator.
    Finished,

    /// The last run ended without reaching the run terminator.
    Stopped(StopReason),
}

impl RunState {
    /// Returns true if this is a terminal state: a new run may be started.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Finished => write!(f, "finished"),
            RunState::Stopped(StopReason::Requested) => write!(f, "stopped"),
            RunState::Stopped(StopReason::StreamClosed) => {
                write!(f, "stopped (producer output closed)")
            }
        }
    }
}

/// Why a run was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A stop was requested through [`RunController::stop`].
    Requested,

    /// The producer's output closed before the run terminator was seen.
    StreamClosed,
}

/// The result of a single [`RunController::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The run is still in progress: tick again after the poll interval.
    Continue,

    /// There's no run in progress. The state the controller ended up in is returned.
    Done(RunState),
}

/// Drives a single run at a time.
///
/// The controller never blocks. [`start`](Self::start) launches the producer, and every call to
/// [`tick`](Self::tick) drains whatever output is available, decodes it and applies it to the
/// test tree. Events are passed to a callback as they happen.
#[derive(Debug)]
pub struct RunController<P: TestProcess, O> {
    sentinels: Sentinels,
    max_bytes_per_poll: usize,
    state: RunState,
    active: Option<ActiveRun<P, O>>,
    // Processes from earlier runs that haven't been reaped yet.
    exited: Vec<ExitedProcess<P>>,
}

#[derive(Debug)]
struct ActiveRun<P, O> {
    process: P,
    framer: LineFramer<O>,
    decoder: ResultDecoder,
    current: Option<NodeId>,
    completed: usize,
    total: usize,
    stopwatch: StopwatchStart,
}

#[derive(Debug)]
struct ExitedProcess<P> {
    process: P,
    finished_naturally: bool,
}

impl<P: TestProcess, O: Read> RunController<P, O> {
    /// Creates a new, idle controller.
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            max_bytes_per_poll: DEFAULT_MAX_BYTES_PER_POLL,
            state: RunState::Idle,
            active: None,
            exited: Vec::new(),
        }
    }

    /// Sets the maximum number of output bytes processed in a single tick.
    pub fn with_max_bytes_per_poll(mut self, max_bytes_per_poll: usize) -> Self {
        self.max_bytes_per_poll = max_bytes_per_poll;
        self
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Returns the number of cases resolved in the current run, and the number expected.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.active.as_ref().map(|run| (run.completed, run.total))
    }

    /// Returns the path of the case currently running, if any.
    pub fn current_case_path(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|run| run.decoder.current_case_path())
    }

    /// Returns the number of producers from earlier runs that haven't exited yet.
    pub fn unreaped_count(&self) -> usize {
        self.exited.len()
    }

    /// Starts a run of the active cases in `tree`.
    ///
    /// Fails with [`RunStartError::AlreadyRunning`] if a run is in progress, or if the producer
    /// couldn't be launched. In either case, nothing about the controller changes.
    pub fn start<L, F>(
        &mut self,
        launcher: &L,
        tree: &TestTree,
        mut callback: F,
    ) -> Result<(), RunStartError>
    where
        L: TestLauncher<Process = P, Output = O>,
        F: FnMut(RunEvent),
    {
        if self.active.is_some() {
            return Err(RunStartError::AlreadyRunning);
        }
        self.reap();

        let labels = tree.test_labels();
        let total = tree.active_case_count();
        let launched = launcher.launch(&labels)?;
        debug!(
            "started run of {total} cases ({} labels)",
            if labels.is_empty() {
                "no".to_owned()
            } else {
                labels.len().to_string()
            }
        );

        let run = ActiveRun {
            process: launched.process,
            framer: LineFramer::new(launched.output)
                .with_max_bytes_per_poll(self.max_bytes_per_poll),
            decoder: ResultDecoder::new(self.sentinels.clone()),
            current: None,
            completed: 0,
            total,
            stopwatch: stopwatch(),
        };
        self.state = RunState::Running;

        run.emit(&mut callback, RunEventKind::LifecycleChanged {
            state: RunState::Running,
        });
        run.emit(&mut callback, RunEventKind::StatusMessage {
            message: "Running...".to_owned(),
        });
        run.emit(&mut callback, RunEventKind::Progress {
            completed: 0,
            total,
        });
        self.active = Some(run);
        Ok(())
    }

    /// Performs one bounded unit of work: drains available output and applies it to `tree`.
    pub fn tick<F>(&mut self, tree: &mut TestTree, mut callback: F) -> TickOutcome
    where
        F: FnMut(RunEvent),
    {
        self.reap();

        let Some(mut run) = self.active.take() else {
            return TickOutcome::Done(self.state);
        };

        let framed = run.framer.poll_lines();
        for line in &framed.lines {
            for event in run.decoder.decode_line(line) {
                if run.apply(event, tree, &mut callback) == Applied::RunFinished {
                    // Anything after the terminator is ignored.
                    self.finish(run, RunState::Finished, &mut callback);
                    return TickOutcome::Done(self.state);
                }
            }
        }

        if framed.stream_closed {
            warn!("producer output closed before the run terminator was seen");
            self.finish(
                run,
                RunState::Stopped(StopReason::StreamClosed),
                &mut callback,
            );
            return TickOutcome::Done(self.state);
        }

        self.active = Some(run);
        TickOutcome::Continue
    }

    /// Stops the run in progress.
    ///
    /// The producer is asked to terminate, but this doesn't wait for it to exit. Any output
    /// collected for the current case is discarded. Returns false if there was no run in progress.
    pub fn stop<F>(&mut self, mut callback: F) -> bool
    where
        F: FnMut(RunEvent),
    {
        let Some(run) = self.active.take() else {
            return false;
        };
        run.emit(&mut callback, RunEventKind::StatusMessage {
            message: "Stopping...".to_owned(),
        });
        self.finish(run, RunState::Stopped(StopReason::Requested), &mut callback);
        true
    }

    /// Polls producers from earlier runs, without blocking, and forgets the ones that have exited.
    pub fn reap(&mut self) {
        self.exited.retain_mut(|exited| match exited.process.try_exit() {
            Some(exit) => {
                if exited.finished_naturally && !exit.success() {
                    match exit.code {
                        Some(code) => warn!("producer exited with code {code} after finishing"),
                        None => warn!("producer was terminated by a signal after finishing"),
                    }
                }
                false
            }
            None => true,
        });
    }

    fn finish<F>(&mut self, mut run: ActiveRun<P, O>, state: RunState, callback: &mut F)
    where
        F: FnMut(RunEvent),
    {
        let finished_naturally = state == RunState::Finished;
        if !finished_naturally {
            if let Some(path) = run.decoder.discard_pending() {
                debug!("stopped while `{path}` was running, leaving its result unchanged");
            }
            run.process.terminate();
        }

        let message = if finished_naturally {
            "Finished."
        } else {
            "Stopped."
        };
        run.emit(callback, RunEventKind::StatusMessage {
            message: message.to_owned(),
        });
        self.state = state;
        run.emit(callback, RunEventKind::LifecycleChanged { state });

        self.exited.push(ExitedProcess {
            process: run.process,
            finished_naturally,
        });
        self.reap();
    }
}

impl<P: TestProcess, O> Drop for RunController<P, O> {
    fn drop(&mut self) {
        if let Some(run) = &mut self.active {
            debug!("run controller dropped with a run in progress, terminating producer");
            run.process.terminate();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Applied {
    Continue,
    RunFinished,
}

impl<P, O> ActiveRun<P, O> {
    fn emit<F>(&self, callback: &mut F, kind: RunEventKind)
    where
        F: FnMut(RunEvent),
    {
        let snapshot = self.stopwatch.snapshot();
        callback(RunEvent {
            timestamp: snapshot.end_time(),
            elapsed: snapshot.duration,
            kind,
        });
    }

    fn emit_nodes<F>(&self, callback: &mut F, events: impl IntoIterator<Item = NodeEvent>)
    where
        F: FnMut(RunEvent),
    {
        for event in events {
            self.emit(callback, RunEventKind::Node(event));
        }
    }

    fn apply<F>(&mut self, event: DecoderEvent, tree: &mut TestTree, callback: &mut F) -> Applied
    where
        F: FnMut(RunEvent),
    {
        match event {
            DecoderEvent::Preamble(message) => {
                self.emit(callback, RunEventKind::StatusMessage { message });
            }
            DecoderEvent::CaseStarted { path } => match tree.resolve_or_create(&path) {
                Ok((id, added)) => {
                    self.emit_nodes(callback, added);
                    self.emit(callback, RunEventKind::Node(tree.mark_running(id)));
                    self.emit(callback, RunEventKind::StatusMessage {
                        message: format!("Running {path}..."),
                    });
                    self.current = Some(id);
                }
                Err(err) => {
                    warn!("{err}");
                    self.current = None;
                    self.emit(callback, RunEventKind::DecodeError {
                        path,
                        error: DecodeError::InvalidCasePath { err },
                    });
                }
            },
            DecoderEvent::CaseRejected { path, error } => {
                warn!("producer announced invalid case path `{path}`");
                self.current = None;
                self.emit(callback, RunEventKind::DecodeError { path, error });
            }
            DecoderEvent::CaseFinished { path, outcome } => {
                let Some(id) = self.current.take() else {
                    debug!("ignoring result for `{path}`, which couldn't be resolved");
                    return Applied::Continue;
                };
                let result = match outcome {
                    Ok(result) => result,
                    Err(malformed) => {
                        warn!("malformed result for `{path}`: {}", malformed.error);
                        let result = malformed.to_result();
                        self.emit(callback, RunEventKind::DecodeError {
                            path,
                            error: malformed.error,
                        });
                        result
                    }
                };
                let resolved = tree.set_result(id, result);
                self.emit_nodes(callback, resolved);

                self.completed += 1;
                self.total = self.total.max(self.completed);
                self.emit(callback, RunEventKind::Progress {
                    completed: self.completed,
                    total: self.total,
                });
            }
            DecoderEvent::RunFinished => {
                self.current = None;
                return Applied::RunFinished;
            }
        }
        Applied::Continue
    }
}
