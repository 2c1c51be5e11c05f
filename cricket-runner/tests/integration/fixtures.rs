// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Result, bail};
use cricket_runner::{
    decoder::Sentinels,
    process::{ChildOutput, ChildProcess, CommandLauncher},
    reporter::events::{RunEvent, RunEventKind},
    runner::{RunController, RunState, TickOutcome},
    test_tree::TestTree,
};
use std::{
    sync::Once,
    thread,
    time::{Duration, Instant},
};

pub(crate) type ChildController = RunController<ChildProcess, ChildOutput>;

const TICK_INTERVAL: Duration = Duration::from_millis(10);
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().expect("color-eyre installed once");
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Builds the output a producer writes for a run.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProducerOutput {
    sentinels: Sentinels,
    lines: Vec<String>,
    preamble_done: bool,
}

impl ProducerOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_sentinels(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            ..Self::default()
        }
    }

    pub(crate) fn preamble(mut self, line: &str) -> Self {
        self.lines.push(line.to_owned());
        self
    }

    /// Adds a complete block for a case.
    pub(crate) fn case(self, path: &str, code: &str, duration: f64, details: &[&str]) -> Self {
        let mut this = self.open_case(path);
        this.lines.push("start: 100.0".to_owned());
        this.lines.push(format!("result: {code}"));
        this.lines.push(format!("end: {}", 100.0 + duration));
        this.lines.extend(details.iter().map(|line| (*line).to_owned()));
        this.lines.push(this.sentinels.section_sentinel.clone());
        this
    }

    /// Adds the path line and opening sentinel for a case, but no record.
    pub(crate) fn open_case(mut self, path: &str) -> Self {
        if !self.preamble_done {
            self.lines.push(self.sentinels.section_sentinel.clone());
            self.preamble_done = true;
        }
        self.lines.push(path.to_owned());
        self.lines.push(self.sentinels.section_sentinel.clone());
        self
    }

    pub(crate) fn raw_line(mut self, line: &str) -> Self {
        self.lines.push(line.to_owned());
        self
    }

    pub(crate) fn terminator(mut self) -> Self {
        self.lines.push(self.sentinels.run_terminator.clone());
        self
    }

    /// Writes the output to a file in `dir`, and returns its path.
    pub(crate) fn write_to(&self, dir: &Utf8Path) -> Result<Utf8PathBuf> {
        let path = dir.join("producer-output.txt");
        let mut contents = self.lines.join("\n");
        contents.push('\n');
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Returns a launcher whose producer echoes its labels as a preamble line, replays `output`, and
/// then runs `tail` (if any).
pub(crate) fn replay_launcher(output: &Utf8Path, tail: Option<&str>) -> CommandLauncher {
    let mut script = r#"echo "args: $*"; cat "$0""#.to_owned();
    if let Some(tail) = tail {
        script.push_str("; ");
        script.push_str(tail);
    }
    CommandLauncher::new("sh", ["-c".to_owned(), script, output.to_string()])
}

/// Ticks `controller` until the run is over, collecting every event.
pub(crate) fn run_to_completion(
    controller: &mut ChildController,
    tree: &mut TestTree,
    events: &mut Vec<RunEvent>,
) -> Result<RunState> {
    let deadline = Instant::now() + RUN_TIMEOUT;
    loop {
        match controller.tick(tree, |event| events.push(event)) {
            TickOutcome::Continue => {}
            TickOutcome::Done(state) => return Ok(state),
        }
        if Instant::now() > deadline {
            bail!("run didn't finish within {RUN_TIMEOUT:?}");
        }
        thread::sleep(TICK_INTERVAL);
    }
}

/// Ticks `controller` until `pred` holds for the events seen so far.
pub(crate) fn tick_until(
    controller: &mut ChildController,
    tree: &mut TestTree,
    events: &mut Vec<RunEvent>,
    mut pred: impl FnMut(&[RunEvent]) -> bool,
) -> Result<()> {
    let deadline = Instant::now() + RUN_TIMEOUT;
    while !pred(events) {
        if let TickOutcome::Done(state) = controller.tick(tree, |event| events.push(event)) {
            bail!("run ended ({state}) before the condition held");
        }
        if Instant::now() > deadline {
            bail!("condition didn't hold within {RUN_TIMEOUT:?}");
        }
        thread::sleep(TICK_INTERVAL);
    }
    Ok(())
}

/// Waits for every producer the controller knows about to exit.
pub(crate) fn reap_all(controller: &mut ChildController) -> Result<()> {
    let deadline = Instant::now() + RUN_TIMEOUT;
    while controller.unreaped_count() > 0 {
        controller.reap();
        if Instant::now() > deadline {
            bail!("producers didn't exit within {RUN_TIMEOUT:?}");
        }
        thread::sleep(TICK_INTERVAL);
    }
    Ok(())
}

pub(crate) fn status_messages(events: &[RunEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            RunEventKind::StatusMessage { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}
