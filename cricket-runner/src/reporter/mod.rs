// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the progress and results of a run.
//!
//! The main type here is [`RunReporter`], which is constructed via a [`ReporterBuilder`].

pub mod events;
mod imp;
mod progress;

pub use imp::*;
