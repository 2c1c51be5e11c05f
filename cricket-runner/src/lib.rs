// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for cricket.
//!
//! A run works like this: a producer process is spawned with its standard output piped back to
//! us. On every tick, the [`framer`] drains whatever output is currently available without
//! blocking and splits it into lines. The [`decoder`] classifies each line against the protocol
//! sentinels and assembles result records, and the [`runner`] applies those records to the
//! [`test_tree`] and emits [`reporter::events::RunEvent`]s for observers.

pub mod config;
pub mod decoder;
pub mod discover;
pub mod errors;
pub mod framer;
pub mod helpers;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod test_tree;
#[cfg(test)]
mod test_helpers;
mod time;
