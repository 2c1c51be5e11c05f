// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for cricket.
//!
//! The main structure in this module is [`CricketConfig`].

mod imp;

pub use imp::*;
