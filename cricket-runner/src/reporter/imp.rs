// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out and aggregates run events.
//!
//! The main structure in this module is [`RunReporter`].

use super::{
    events::{RunEvent, RunEventKind},
    progress::ProgressBarState,
};
use crate::{
    errors::WriteEventError,
    helpers::plural,
    runner::RunState,
    test_tree::{NodeEvent, StatusColor, TestResult, TestStatus, TestTree, status_color},
};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use swrite::{SWrite, swrite, swriteln};

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    ///
    /// If the terminal isn't piped, produce output to a progress bar.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Run reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    verbose: bool,
    hide_progress_bar: bool,
}

impl ReporterBuilder {
    /// Sets whether the output should be colorized.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: status messages, case starts and tree changes are printed too.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Sets visibility of the progress bar. The progress bar is also hidden if the output isn't a
    /// terminal.
    pub fn set_hide_progress_bar(&mut self, hide_progress_bar: bool) -> &mut Self {
        self.hide_progress_bar = hide_progress_bar;
        self
    }

    /// Creates a new reporter writing to the given destination.
    pub fn build<'a>(&self, output: ReporterStderr<'a>) -> RunReporter<'a> {
        let mut styles: Box<Styles> = Box::default();
        if self.should_colorize {
            styles.colorize();
        }

        let stderr = match output {
            ReporterStderr::Terminal => ReporterStderrImpl::Terminal {
                show_progress_bar: !self.hide_progress_bar && is_stderr_terminal(),
                progress_bar: None,
            },
            ReporterStderr::Buffer(buf) => ReporterStderrImpl::Buffer(buf),
        };

        RunReporter {
            styles,
            verbose: self.verbose,
            stderr,
            stats: RunStats::default(),
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

fn is_stderr_terminal() -> bool {
    use std::io::IsTerminal;

    io::stderr().is_terminal()
}

/// Statistics for a run, aggregated from its events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// The number of cases the run was expected to resolve.
    pub initial_run_count: usize,

    /// The number of cases resolved.
    pub finished_count: usize,

    /// The number of cases that passed.
    pub passed: usize,

    /// The number of cases that were skipped.
    pub skipped: usize,

    /// The number of cases that failed.
    pub failed: usize,

    /// The number of cases that failed as expected.
    pub expected_failures: usize,

    /// The number of cases that passed unexpectedly.
    pub unexpected_successes: usize,

    /// The number of cases that errored, including ones whose results couldn't be decoded.
    pub errors: usize,

    /// The number of blocks that couldn't be decoded.
    pub decode_errors: usize,

    /// The state the run ended in, if it has ended.
    pub final_state: Option<RunState>,
}

impl RunStats {
    /// Returns true if any resolved case counts as a failure.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.unexpected_successes > 0 || self.errors > 0
    }

    fn on_resolved(&mut self, status: TestStatus) {
        self.finished_count += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::ExpectedFail => self.expected_failures += 1,
            TestStatus::UnexpectedSuccess => self.unexpected_successes += 1,
            TestStatus::Error => self.errors += 1,
        }
    }
}

/// Functionality to report run events to standard error.
pub struct RunReporter<'a> {
    styles: Box<Styles>,
    verbose: bool,
    stderr: ReporterStderrImpl<'a>,
    stats: RunStats,
    // Paths of failing cases, in the order they resolved.
    failures: Vec<String>,
    elapsed: Duration,
}

impl RunReporter<'_> {
    /// Reports a run event.
    pub fn report_event(&mut self, event: &RunEvent) -> Result<(), WriteEventError> {
        self.elapsed = event.elapsed;

        let mut buf = String::new();
        match &event.kind {
            RunEventKind::LifecycleChanged { state } => {
                if state.is_terminal() {
                    self.stats.final_state = Some(*state);
                    self.stderr.finish_and_clear_bar();
                }
            }
            RunEventKind::StatusMessage { message } => {
                if let ReporterStderrImpl::Terminal {
                    progress_bar: Some(bar),
                    ..
                } = &self.stderr
                {
                    bar.set_message(message);
                }
                if self.verbose && !message.is_empty() {
                    swriteln!(buf, "{:>12} {message}", "INFO".style(self.styles.count));
                }
            }
            RunEventKind::Progress { completed, total } => {
                if *completed == 0 && self.stats.finished_count == 0 {
                    self.stats.initial_run_count = *total;
                    swriteln!(
                        buf,
                        "{:>12} {} {}",
                        "Starting".style(self.styles.pass),
                        total.style(self.styles.count),
                        plural::tests_str(*total),
                    );
                    self.stderr
                        .start_bar(*total, "Running".style(self.styles.pass).to_string());
                }
                if let ReporterStderrImpl::Terminal {
                    progress_bar: Some(bar),
                    ..
                } = &self.stderr
                {
                    bar.set_progress(*completed, *total);
                }
            }
            RunEventKind::Node(NodeEvent::Resolved { path, result }) => {
                self.stats.on_resolved(result.status);
                if result.status.is_failure() {
                    self.failures.push(path.clone());
                }
                self.write_result_line(path, result, &mut buf);
                if result.status.is_failure() {
                    write_error_text(result.error.as_deref(), &mut buf);
                }
            }
            RunEventKind::Node(NodeEvent::Running { path }) => {
                if self.verbose {
                    // No result yet for this run.
                    let style = self.styles.for_color(status_color(None));
                    swriteln!(buf, "{:>12}             {path}", "START".style(style));
                }
            }
            RunEventKind::Node(NodeEvent::Added { path, kind }) => {
                if self.verbose {
                    swriteln!(buf, "{:>12} {kind} {path}", "ADDED".style(self.styles.count));
                }
            }
            RunEventKind::Node(NodeEvent::ActivationChanged { .. }) => {}
            RunEventKind::DecodeError { path, error } => {
                self.stats.decode_errors += 1;
                swriteln!(
                    buf,
                    "{:>12} {path}: {error}",
                    "MALFORMED".style(self.styles.fail),
                );
            }
        }

        if buf.is_empty() {
            return Ok(());
        }
        self.stderr.write_buf(buf.as_bytes())
    }

    /// Writes the final summary, followed by the details of every failing case in `tree`.
    pub fn finish(&mut self, tree: &TestTree) -> Result<(), WriteEventError> {
        self.stderr.finish_and_clear_bar();

        let mut buf = String::new();
        let summary_style = match self.stats.final_state {
            _ if self.stats.has_failures() => self.styles.fail,
            Some(RunState::Stopped(_)) => self.styles.fail,
            _ if self.stats.finished_count == 0 => self.styles.skip,
            _ => self.styles.pass,
        };
        swrite!(
            buf,
            "{}\n{:>12} ",
            "-".repeat(12),
            "Summary".style(summary_style)
        );
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        swrite!(buf, "[{:>8.3}s] ", self.elapsed.as_secs_f64());

        swrite!(buf, "{}", self.stats.finished_count.style(self.styles.count));
        if self.stats.finished_count != self.stats.initial_run_count {
            swrite!(
                buf,
                "/{}",
                self.stats.initial_run_count.style(self.styles.count)
            );
        }
        let tests_str = if self.stats.initial_run_count == 1 && self.stats.finished_count == 1 {
            "test"
        } else {
            "tests"
        };
        swrite!(buf, " {tests_str} run: ");
        self.write_summary_str(&mut buf);
        if let Some(RunState::Stopped(_)) = self.stats.final_state {
            swrite!(buf, " ({})", "stopped".style(self.styles.fail));
        }
        buf.push('\n');

        for path in &self.failures {
            let Some(details) = tree.case_details(path) else {
                continue;
            };
            let Some(result) = details.result else {
                continue;
            };
            self.write_result_line(path, result, &mut buf);
            if let Some(description) = details.description {
                swriteln!(buf, "{:>12} {description}", "");
            }
            write_error_text(details.error(), &mut buf);
        }

        self.stderr.write_buf(buf.as_bytes())
    }

    /// Returns the statistics aggregated so far.
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    // ---
    // Helper methods
    // ---

    fn write_result_line(&self, path: &str, result: &TestResult, buf: &mut String) {
        let style = self.styles.for_color(result.status.color());
        swriteln!(
            buf,
            "{:>12} [{:>8.3}s] {path}",
            status_label(result.status).style(style),
            result.duration.as_secs_f64(),
        );
    }

    fn write_summary_str(&self, buf: &mut String) {
        let stats = &self.stats;
        let mut parts = vec![format!(
            "{} {}",
            stats.passed.style(self.styles.count),
            "passed".style(self.styles.pass)
        )];

        let mut push = |count: usize, label: &str, style: Style| {
            if count > 0 {
                parts.push(format!(
                    "{} {}",
                    count.style(self.styles.count),
                    label.style(style)
                ));
            }
        };
        push(stats.failed, "failed", self.styles.fail);
        push(stats.errors, plural::errors_str(stats.errors), self.styles.fail);
        push(
            stats.unexpected_successes,
            "unexpectedly passed",
            self.styles.fail,
        );
        push(
            stats.expected_failures,
            "failed as expected",
            self.styles.skip,
        );
        push(stats.skipped, "skipped", self.styles.skip);

        swrite!(buf, "{}", parts.join(", "));
    }
}

fn write_error_text(error: Option<&str>, buf: &mut String) {
    let Some(error) = error.filter(|error| !error.is_empty()) else {
        return;
    };
    for line in error.lines() {
        swriteln!(buf, "    {line}");
    }
}

/// Returns the fixed-width label for a status.
pub fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "PASS",
        TestStatus::Skip => "SKIP",
        TestStatus::Fail => "FAIL",
        TestStatus::ExpectedFail => "XFAIL",
        TestStatus::UnexpectedSuccess => "XPASS",
        TestStatus::Error => "ERROR",
    }
}

enum ReporterStderrImpl<'a> {
    Terminal {
        show_progress_bar: bool,
        // Created once the run's total is known.
        progress_bar: Option<ProgressBarState>,
    },
    Buffer(&'a mut Vec<u8>),
}

impl ReporterStderrImpl<'_> {
    fn start_bar(&mut self, total: usize, prefix: String) {
        if let ReporterStderrImpl::Terminal {
            show_progress_bar: true,
            progress_bar,
        } = self
        {
            if let Some(old) = progress_bar.take() {
                old.finish_and_clear();
            }
            *progress_bar = Some(ProgressBarState::new(total, prefix));
        }
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<(), WriteEventError> {
        match self {
            ReporterStderrImpl::Terminal {
                progress_bar: Some(bar),
                ..
            } => bar.write_buf(buf)?,
            ReporterStderrImpl::Terminal {
                progress_bar: None,
                ..
            } => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(buf)?;
                stderr.flush()?;
            }
            ReporterStderrImpl::Buffer(out) => out.extend_from_slice(buf),
        }
        Ok(())
    }

    fn finish_and_clear_bar(&mut self) {
        if let ReporterStderrImpl::Terminal { progress_bar, .. } = self {
            if let Some(bar) = progress_bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    unset: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().blue().bold();
        self.unset = Style::new().dimmed();
    }

    fn for_color(&self, color: StatusColor) -> Style {
        match color {
            StatusColor::Green => self.pass,
            StatusColor::Blue => self.skip,
            StatusColor::Red => self.fail,
            StatusColor::Gray => self.unset,
        }
    }
}
