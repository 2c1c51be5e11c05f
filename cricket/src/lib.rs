// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A terminal front-end for running a test suite and streaming its results.
//!
//! `cricket` discovers the tests in a project, launches the project's test runner as a child
//! process, and decodes its line-oriented output into per-test results as they arrive.

#![warn(missing_docs)]

mod dispatch;
mod errors;
pub mod exit_codes;
mod output;
mod signal;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
