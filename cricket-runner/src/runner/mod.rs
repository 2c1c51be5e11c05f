// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run controller.
//!
//! The main structure in this module is [`RunController`].

mod imp;

pub use imp::*;
