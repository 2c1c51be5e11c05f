// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests drive the run controller against a real child process. The producer is a shell
//! script that replays a canned protocol stream, so they only run on Unix.

#![cfg(unix)]

mod discovery;
mod fixtures;
mod run;
