// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    io::{self, Write},
    time::Duration,
};

#[derive(Debug)]
pub(super) struct ProgressBarState {
    bar: ProgressBar,
}

impl ProgressBarState {
    pub(super) fn new(total: usize, prefix: String) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), Self::stderr_target());
        let total_width = total.to_string().len();
        // {{foo}} is passed through to indicatif, while {total_width} is filled in here.
        let template = format!(
            "{{prefix:>12}} [{{elapsed_precise:>9}}] {{wide_bar}} \
            {{pos:>{total_width}}}/{{len:{total_width}}}: {{msg}}     "
        );
        bar.set_style(
            ProgressStyle::default_bar()
                .progress_chars("=> ")
                .template(&template)
                .expect("template is known to be valid"),
        );
        bar.set_prefix(prefix);
        // Enable a steady tick 10 times a second.
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    pub(super) fn set_progress(&self, completed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
    }

    pub(super) fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_owned());
    }

    pub(super) fn write_buf(&self, buf: &[u8]) -> io::Result<()> {
        // ProgressBar::println doesn't print status lines if the bar is hidden. The suspend
        // method prints it in all cases.
        self.bar.suspend(|| io::stderr().write_all(buf))
    }

    pub(super) fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    fn stderr_target() -> ProgressDrawTarget {
        // The refresh rate is double the steady tick rate.
        ProgressDrawTarget::stderr_with_hz(20)
    }
}
