// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning termination signals into stop requests.

use signal_hook::{SigId, consts::TERM_SIGNALS, flag, low_level};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// Records Ctrl-C and other termination signals while a run is in progress.
///
/// The handlers are unregistered on drop, restoring the previous behavior.
#[derive(Debug)]
pub(crate) struct StopSignal {
    requested: Arc<AtomicBool>,
    ids: Vec<SigId>,
}

impl StopSignal {
    pub(crate) fn install() -> io::Result<Self> {
        let requested = Arc::new(AtomicBool::new(false));
        let mut this = Self {
            requested: requested.clone(),
            ids: Vec::with_capacity(TERM_SIGNALS.len()),
        };
        for &signal in TERM_SIGNALS {
            // On error, dropping `this` unregisters the handlers installed so far.
            this.ids.push(flag::register(signal, requested.clone())?);
        }
        Ok(this)
    }

    /// Returns true if a signal arrived since the last call.
    pub(crate) fn take_request(&self) -> bool {
        let requested = self.requested.swap(false, Ordering::SeqCst);
        if requested {
            debug!("received termination signal, stopping run");
        }
        requested
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            low_level::unregister(id);
        }
    }
}
