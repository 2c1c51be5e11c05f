// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching the producer process.
//!
//! The run controller is generic over [`TestLauncher`], so it can be driven by a real child process
//! ([`CommandLauncher`]) or by anything else that yields a non-blocking reader.

mod imp;

#[cfg(unix)]
#[path = "unix.rs"]
mod os;

#[cfg(windows)]
#[path = "windows.rs"]
mod os;

pub use imp::*;
