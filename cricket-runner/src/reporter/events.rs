// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted over the course of a run.

use crate::{errors::DecodeError, runner::RunState, test_tree::NodeEvent};
use chrono::{DateTime, FixedOffset};
use std::time::Duration;

/// A run event.
///
/// Events are produced by a [`RunController`](crate::runner::RunController) and consumed by a
/// [`RunReporter`](crate::reporter::RunReporter), or by any other observer.
#[derive(Clone, Debug)]
pub struct RunEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,

    /// The kind of run event this is.
    pub kind: RunEventKind,
}

/// The kind of run event this is.
///
/// Forms part of [`RunEvent`].
#[derive(Clone, Debug)]
pub enum RunEventKind {
    /// The run moved to a new lifecycle state.
    LifecycleChanged {
        /// The new state.
        state: RunState,
    },

    /// A free-text status message, as would be shown in a status bar.
    StatusMessage {
        /// The message.
        message: String,
    },

    /// A node in the test tree changed.
    Node(NodeEvent),

    /// A case resolved, moving the run forward.
    Progress {
        /// The number of cases resolved so far in this run.
        completed: usize,

        /// The number of cases this run is expected to resolve.
        total: usize,
    },

    /// A block of producer output couldn't be decoded.
    ///
    /// The run carries on. If the block belonged to a known case, that case is resolved as an
    /// error with the raw block as its text.
    DecodeError {
        /// The case path the block was announced under.
        path: String,

        /// The decode error.
        error: DecodeError,
    },
}
