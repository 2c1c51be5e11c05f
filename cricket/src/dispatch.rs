// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts, OutputWriter},
    signal::StopSignal,
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use cricket_runner::{
    config::{CricketConfig, DefaultConfigWarnings},
    decoder::Sentinels,
    discover::{discover_tests, read_paths_file},
    errors::WriteEventError,
    process::TestLauncher,
    reporter::{ReporterBuilder, RunReporter, events::RunEvent},
    runner::{RunController, RunState, TickOutcome},
    test_tree::{NodeEvent, NodeKind, TestTree},
};
use owo_colors::{OwoColorize, Style, style};
use std::{io::Write, time::Duration};
use supports_color::Stream;
use tracing::debug;

/// Runs a test suite and streams its results to the terminal.
///
/// The project's test runner is launched as a child process, and its output is decoded into
/// per-test results as it arrives.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct CricketApp {
    /// Project directory: where the test commands run [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<Utf8PathBuf>,

    /// Config file [default: project-dir/.config/cricket.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tests in the project
    ///
    /// This command runs the configured discovery command and prints out the tests it found,
    /// grouped by suite and group.
    List(ListOpts),

    /// Discover and run tests
    ///
    /// Only tests whose path equals a filter, or is nested within one, are run. Every test is run
    /// if no filters are given.
    Run(RunOpts),
}

#[derive(Debug, Args)]
struct TestSourceOpts {
    /// Read test paths from this file instead of running the discovery command
    #[arg(long, value_name = "PATH")]
    paths_file: Option<Utf8PathBuf>,
}

impl TestSourceOpts {
    fn load(&self, config: &CricketConfig) -> Result<TestTree> {
        let tree = match &self.paths_file {
            Some(file) => read_paths_file(file)?,
            None => discover_tests(&config.discover().command, config.project_dir())?,
        };
        Ok(tree)
    }
}

#[derive(Debug, Args)]
struct ListOpts {
    #[command(flatten)]
    source: TestSourceOpts,

    /// Output format
    #[arg(
        short = 'T',
        long,
        value_enum,
        default_value_t,
        help_heading = "OUTPUT OPTIONS",
        value_name = "FMT"
    )]
    message_format: MessageFormatOpts,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormatOpts {
    #[default]
    Human,
    Json,
    JsonPretty,
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    source: TestSourceOpts,

    /// Time between polls of the test runner's output [default: from config]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    /// Do not display the progress bar
    #[arg(long, env = "CRICKET_HIDE_PROGRESS_BAR")]
    hide_progress_bar: bool,

    /// Test path filters: a suite, group or case path
    #[arg(value_name = "FILTERS")]
    filters: Vec<String>,
}

impl CricketApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let project_dir = match self.project_dir {
            Some(dir) => dir,
            None => current_dir()?,
        };
        let config = CricketConfig::from_sources(
            project_dir,
            self.config_file.as_deref(),
            &mut DefaultConfigWarnings,
        )?;

        match self.command {
            Command::List(opts) => {
                let tree = opts.source.load(&config)?;
                let colorize = output.color.should_colorize(Stream::Stdout);
                write_list(
                    &tree,
                    opts.message_format,
                    output.verbose,
                    colorize,
                    &mut output_writer.stdout_writer(),
                )?;
            }
            Command::Run(opts) => {
                let mut tree = opts.source.load(&config)?;
                select_filtered(&mut tree, &opts.filters);
                if tree.active_case_count() == 0 {
                    return Err(ExpectedError::no_tests_run(&opts.filters));
                }

                let poll_interval = opts
                    .poll_interval
                    .unwrap_or(config.runner().poll_interval);
                let mut builder = ReporterBuilder::default();
                builder
                    .set_colorize(output.color.should_colorize(Stream::Stderr))
                    .set_verbose(output.verbose)
                    .set_hide_progress_bar(opts.hide_progress_bar);
                let reporter = builder.build(output_writer.reporter_output());

                let launcher = config.launcher();
                debug!(
                    "test runner command: `{}`",
                    shell_words::join(launcher.command_line(&tree.test_labels()))
                );
                execute_run(
                    &launcher,
                    &mut tree,
                    config.sentinels().clone(),
                    poll_interval,
                    reporter,
                )?;
            }
        }
        Ok(0)
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(ExpectedError::current_dir_failed)?;
    Utf8PathBuf::try_from(dir)
        .map_err(|err| ExpectedError::current_dir_invalid_utf8(err.into_path_buf()))
}

/// Returns true if `filter` selects `path`: either the same path, or one of its dotted prefixes.
fn filter_matches(filter: &str, path: &str) -> bool {
    match path.strip_prefix(filter) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Activates exactly the cases selected by `filters`. With no filters, every case is active.
///
/// Returns the activation changes, in the order they happened. Each one is also logged.
fn select_filtered(tree: &mut TestTree, filters: &[String]) -> Vec<NodeEvent> {
    let mut changes = Vec::new();
    if filters.is_empty() {
        changes.extend(tree.set_all_active(true));
    } else {
        changes.extend(tree.set_all_active(false));
        let selected: Vec<_> = tree
            .cases()
            .filter(|&id| {
                let path = tree.node(id).path();
                filters.iter().any(|filter| filter_matches(filter, path))
            })
            .collect();
        for id in selected {
            changes.extend(tree.set_active(id, true));
        }
    }

    for change in &changes {
        if let NodeEvent::ActivationChanged { path, active } = change {
            debug!(
                "{} `{path}`",
                if *active { "activated" } else { "deactivated" }
            );
        }
    }
    debug!(
        "{} of {} tests selected by filters",
        tree.active_case_count(),
        tree.case_count()
    );
    changes
}

/// Forwards run events to the reporter, holding on to the first write error.
struct EventSink<'a> {
    reporter: RunReporter<'a>,
    error: Option<WriteEventError>,
}

impl EventSink<'_> {
    fn report(&mut self, event: RunEvent) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.reporter.report_event(&event) {
            self.error = Some(error);
        }
    }

    fn check(&mut self) -> Result<(), WriteEventError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Drives a run to completion, ticking every `poll_interval`.
fn execute_run<L: TestLauncher>(
    launcher: &L,
    tree: &mut TestTree,
    sentinels: Sentinels,
    poll_interval: Duration,
    reporter: RunReporter<'_>,
) -> Result<()> {
    let stop_signal = StopSignal::install().map_err(ExpectedError::signal_handler_setup_error)?;
    let mut sink = EventSink {
        reporter,
        error: None,
    };

    let mut controller = RunController::new(sentinels);
    controller.start(launcher, tree, |event| sink.report(event))?;

    let state = loop {
        if stop_signal.take_request() {
            controller.stop(|event| sink.report(event));
        }
        match controller.tick(tree, |event| sink.report(event)) {
            TickOutcome::Continue => {}
            TickOutcome::Done(state) => break state,
        }
        // Dropping the controller terminates the producer.
        sink.check()?;
        std::thread::sleep(poll_interval);
    };
    sink.check()?;
    sink.reporter.finish(tree)?;

    // Give a producer that just finished a chance to be reaped, so exit codes get logged.
    controller.reap();

    let stats = sink.reporter.stats();
    match state {
        RunState::Stopped(reason) => Err(ExpectedError::run_stopped(reason)),
        _ if stats.has_failures() => Err(ExpectedError::test_run_failed()),
        _ => Ok(()),
    }
}

fn write_list(
    tree: &TestTree,
    format: MessageFormatOpts,
    verbose: bool,
    colorize: bool,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        MessageFormatOpts::Human => {
            let styles = ListStyles::new(colorize);
            write_list_human(tree, verbose, &styles, writer)
                .map_err(ExpectedError::write_list_error)?;
        }
        MessageFormatOpts::Json => {
            serde_json::to_writer(&mut *writer, &tree.to_summary())
                .map_err(ExpectedError::serialize_list_error)?;
            writeln!(writer).map_err(ExpectedError::write_list_error)?;
        }
        MessageFormatOpts::JsonPretty => {
            serde_json::to_writer_pretty(&mut *writer, &tree.to_summary())
                .map_err(ExpectedError::serialize_list_error)?;
            writeln!(writer).map_err(ExpectedError::write_list_error)?;
        }
    }
    writer.flush().map_err(ExpectedError::write_list_error)
}

#[derive(Debug, Default)]
struct ListStyles {
    suite: Style,
    group: Style,
    description: Style,
}

impl ListStyles {
    fn new(colorize: bool) -> Self {
        let mut styles = Self::default();
        if colorize {
            styles.suite = style().magenta().bold();
            styles.group = style().bold();
            styles.description = style().dimmed();
        }
        styles
    }
}

fn write_list_human(
    tree: &TestTree,
    verbose: bool,
    styles: &ListStyles,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    for suite in tree.suites() {
        writeln!(writer, "{}", tree.node(suite).name().style(styles.suite))?;
        for group in tree.node(suite).children() {
            writeln!(writer, "    {}", tree.node(group).name().style(styles.group))?;
            for case in tree.node(group).children() {
                let node = tree.node(case);
                debug_assert_eq!(node.kind(), NodeKind::Case);
                write!(writer, "        {}", node.name())?;
                match node.description() {
                    Some(description) if verbose => {
                        writeln!(writer, ": {}", description.style(styles.description))?;
                    }
                    _ => writeln!(writer)?,
                }
            }
        }
    }
    Ok(())
}
