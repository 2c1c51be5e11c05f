// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decodes the producer's line protocol into result records.
//!
//! The producer writes a free-text preamble, then one block per case, then a run terminator:
//!
//! ```text
//! <preamble lines>
//! <section sentinel>
//! suite.group.case
//! <section sentinel>
//! start: 1700000000.25
//! result: F
//! end: 1700000000.75
//! AssertionError: boom
//! <section sentinel>
//! suite.group.other_case
//! ...
//! <run terminator>
//! ```
//!
//! [`ResultDecoder`] is fed one line at a time and tracks where in that structure it is. It never
//! touches the test tree: it produces [`DecoderEvent`]s, which the
//! [run controller](crate::runner::RunController) applies.

use crate::{
    errors::{DecodeError, RecordLine},
    test_tree::{CasePath, TestResult, TestStatus},
};
use serde::Deserialize;
use smallvec::SmallVec;
use std::time::Duration;
use tracing::debug;

/// The events produced by decoding a single line.
pub type DecoderEvents = SmallVec<[DecoderEvent; 2]>;

const START_PREFIX: &str = "start: ";
const END_PREFIX: &str = "end: ";

/// The two delimiter lines agreed upon with the producer.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Sentinels {
    /// Separates the preamble from the first case, and each case's path from its record, and
    /// consecutive cases from each other.
    pub section_sentinel: String,

    /// Marks the end of the whole run.
    pub run_terminator: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            section_sentinel: "=".repeat(70),
            run_terminator: "-".repeat(70),
        }
    }
}

/// What a decoded line means for the run.
#[derive(Clone, Debug, PartialEq)]
pub enum DecoderEvent {
    /// A free-text line written before the first case.
    Preamble(String),

    /// The producer announced the next case to run.
    CaseStarted {
        /// The path of the case.
        path: String,
    },

    /// The producer announced a path that isn't a valid case path. The block that follows is
    /// consumed and discarded.
    CaseRejected {
        /// The path as written.
        path: String,

        /// Why the path was rejected.
        error: DecodeError,
    },

    /// A case's block was closed.
    CaseFinished {
        /// The path of the case.
        path: String,

        /// The decoded result, or the reason the block couldn't be decoded.
        outcome: Result<TestResult, MalformedRecord>,
    },

    /// The run terminator was seen.
    RunFinished,
}

/// A block that couldn't be decoded into a result.
#[derive(Clone, Debug, PartialEq)]
pub struct MalformedRecord {
    /// Why decoding failed.
    pub error: DecodeError,

    /// The raw lines of the block, joined with newlines.
    pub raw_text: String,
}

impl MalformedRecord {
    /// Converts this into the result recorded against the case: an error, with the raw block as
    /// its text.
    pub fn to_result(&self) -> TestResult {
        TestResult {
            status: TestStatus::Error,
            error: Some(self.raw_text.clone()),
            duration: Duration::ZERO,
        }
    }
}

/// Where the decoder is in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodePhase {
    /// Free-text lines before the first section sentinel.
    AwaitingPreamble,

    /// The next non-sentinel line names a case.
    BetweenTests,

    /// Lines are collected into the current case's record.
    CollectingCase,

    /// The run terminator has been seen. Further lines are ignored.
    Finished,
}

#[derive(Clone, Debug)]
enum Phase {
    AwaitingPreamble,
    BetweenTests,
    CollectingCase(PendingCase),
    Finished,
}

#[derive(Clone, Debug)]
struct PendingCase {
    path: String,
    // False if the path couldn't be parsed: the block is collected and then dropped.
    valid: bool,
    // The opening section sentinel that follows the path line has been seen.
    block_opened: bool,
    lines: Vec<String>,
}

/// A line-at-a-time decoder for the producer's output.
#[derive(Clone, Debug)]
pub struct ResultDecoder {
    sentinels: Sentinels,
    phase: Phase,
}

impl ResultDecoder {
    /// Creates a new decoder, waiting for the preamble.
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            phase: Phase::AwaitingPreamble,
        }
    }

    /// Returns the sentinels this decoder matches against.
    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    /// Returns the current phase.
    pub fn phase(&self) -> DecodePhase {
        match &self.phase {
            Phase::AwaitingPreamble => DecodePhase::AwaitingPreamble,
            Phase::BetweenTests => DecodePhase::BetweenTests,
            Phase::CollectingCase(_) => DecodePhase::CollectingCase,
            Phase::Finished => DecodePhase::Finished,
        }
    }

    /// Returns the path of the case whose output is currently being collected.
    pub fn current_case_path(&self) -> Option<&str> {
        match &self.phase {
            Phase::CollectingCase(pending) => Some(&pending.path),
            _ => None,
        }
    }

    /// Returns the lines collected so far for the current case. This is empty outside of
    /// [`DecodePhase::CollectingCase`].
    pub fn accumulated_lines(&self) -> &[String] {
        match &self.phase {
            Phase::CollectingCase(pending) => &pending.lines,
            _ => &[],
        }
    }

    /// Drops any partially collected case. Used when a run is stopped: a partial block is never
    /// turned into a result.
    pub fn discard_pending(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::CollectingCase(pending) => {
                debug!(
                    "discarding {} collected lines for `{}`",
                    pending.lines.len(),
                    pending.path,
                );
                Some(pending.path)
            }
            _ => None,
        }
    }

    /// Decodes a single line.
    pub fn decode_line(&mut self, line: &str) -> DecoderEvents {
        let mut events = DecoderEvents::new();

        if line == self.sentinels.run_terminator {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => {
                    debug!("ignoring run terminator after the run finished");
                    return events;
                }
                Phase::CollectingCase(pending) => events.extend(Self::flush(pending)),
                Phase::AwaitingPreamble | Phase::BetweenTests => {}
            }
            events.push(DecoderEvent::RunFinished);
            return events;
        }

        if line == self.sentinels.section_sentinel {
            match std::mem::replace(&mut self.phase, Phase::BetweenTests) {
                Phase::AwaitingPreamble => {}
                Phase::BetweenTests => debug!("ignoring section sentinel between tests"),
                // The sentinel that follows the path line opens the block.
                Phase::CollectingCase(mut pending)
                    if !pending.block_opened && pending.lines.is_empty() =>
                {
                    pending.block_opened = true;
                    self.phase = Phase::CollectingCase(pending);
                }
                Phase::CollectingCase(pending) => events.extend(Self::flush(pending)),
                Phase::Finished => {
                    debug!("ignoring section sentinel after the run finished");
                    self.phase = Phase::Finished;
                }
            }
            return events;
        }

        match &mut self.phase {
            Phase::AwaitingPreamble => events.push(DecoderEvent::Preamble(line.to_owned())),
            Phase::BetweenTests => {
                let valid = match CasePath::parse(line) {
                    Ok(_) => {
                        events.push(DecoderEvent::CaseStarted {
                            path: line.to_owned(),
                        });
                        true
                    }
                    Err(err) => {
                        events.push(DecoderEvent::CaseRejected {
                            path: line.to_owned(),
                            error: DecodeError::InvalidCasePath { err },
                        });
                        false
                    }
                };
                self.phase = Phase::CollectingCase(PendingCase {
                    path: line.to_owned(),
                    valid,
                    block_opened: false,
                    lines: Vec::new(),
                });
            }
            Phase::CollectingCase(pending) => pending.lines.push(line.to_owned()),
            Phase::Finished => debug!("ignoring output after the run finished: {line}"),
        }

        events
    }

    fn flush(pending: PendingCase) -> Option<DecoderEvent> {
        if !pending.valid {
            debug!("discarding block for rejected path `{}`", pending.path);
            return None;
        }

        let outcome = decode_record(&pending.lines).map_err(|error| MalformedRecord {
            error,
            raw_text: pending.lines.join("\n"),
        });
        Some(DecoderEvent::CaseFinished {
            path: pending.path,
            outcome,
        })
    }
}

/// Decodes the lines of a single case's block into a result.
///
/// The block has a start timestamp, a result code and an end timestamp at fixed positions,
/// followed by any number of detail lines.
pub fn decode_record(lines: &[String]) -> Result<TestResult, DecodeError> {
    let start = parse_timestamp(lines, 0, RecordLine::Start, START_PREFIX)?;

    let code = lines.get(1).ok_or(DecodeError::MissingLine {
        expected: RecordLine::Result,
    })?;
    let details = || lines.get(3..).unwrap_or_default().join("\n");
    let (status, error) = match code.as_str() {
        "result: OK" => (TestStatus::Pass, None),
        "result: s" => (TestStatus::Skip, Some(format!("Skipped: {}", details()))),
        "result: F" => (TestStatus::Fail, Some(details())),
        "result: x" => (TestStatus::ExpectedFail, Some(details())),
        "result: u" => (TestStatus::UnexpectedSuccess, None),
        "result: E" => (TestStatus::Error, Some(details())),
        _ => {
            return Err(DecodeError::UnknownResultCode { line: code.clone() });
        }
    };

    let end = parse_timestamp(lines, 2, RecordLine::End, END_PREFIX)?;
    let duration = Duration::try_from_secs_f64(end - start)
        .map_err(|_| DecodeError::InvalidDuration { start, end })?;

    Ok(TestResult {
        status,
        error,
        duration,
    })
}

fn parse_timestamp(
    lines: &[String],
    index: usize,
    expected: RecordLine,
    prefix: &'static str,
) -> Result<f64, DecodeError> {
    let line = lines
        .get(index)
        .ok_or(DecodeError::MissingLine { expected })?;
    let value = line
        .strip_prefix(prefix)
        .ok_or_else(|| DecodeError::MissingPrefix {
            expected,
            prefix,
            line: line.clone(),
        })?;
    value
        .trim()
        .parse::<f64>()
        .map_err(|err| DecodeError::InvalidTimestamp {
            expected,
            line: line.clone(),
            err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn decode_all(lines: &[&str]) -> (ResultDecoder, Vec<DecoderEvent>) {
        let mut decoder = ResultDecoder::new(Sentinels::default());
        let events = lines
            .iter()
            .flat_map(|line| decoder.decode_line(line))
            .collect();
        (decoder, events)
    }

    fn record(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn scenario_pass() {
        let s = Sentinels::default();
        let (decoder, events) = decode_all(&[
            "",
            s.section_sentinel.as_str(),
            "suite.group.case1",
            s.section_sentinel.as_str(),
            "start: 10.0",
            "result: OK",
            "end: 10.5",
            s.section_sentinel.as_str(),
            s.run_terminator.as_str(),
        ]);

        assert_eq!(
            events,
            vec![
                DecoderEvent::Preamble(String::new()),
                DecoderEvent::CaseStarted {
                    path: "suite.group.case1".to_owned(),
                },
                DecoderEvent::CaseFinished {
                    path: "suite.group.case1".to_owned(),
                    outcome: Ok(TestResult {
                        status: TestStatus::Pass,
                        error: None,
                        duration: Duration::from_millis(500),
                    }),
                },
                DecoderEvent::RunFinished,
            ]
        );
        assert_eq!(decoder.phase(), DecodePhase::Finished);
    }

    #[test]
    fn scenario_fail_then_terminator_flushes() {
        let s = Sentinels::default();
        let (_, events) = decode_all(&[
            s.section_sentinel.as_str(),
            "suite.group.case1",
            s.section_sentinel.as_str(),
            "start: 10.0",
            "result: F",
            "end: 10.5",
            "AssertionError: boom",
            s.run_terminator.as_str(),
        ]);

        assert_eq!(
            events,
            vec![
                DecoderEvent::CaseStarted {
                    path: "suite.group.case1".to_owned(),
                },
                DecoderEvent::CaseFinished {
                    path: "suite.group.case1".to_owned(),
                    outcome: Ok(TestResult {
                        status: TestStatus::Fail,
                        error: Some("AssertionError: boom".to_owned()),
                        duration: Duration::from_millis(500),
                    }),
                },
                DecoderEvent::RunFinished,
            ]
        );
    }

    #[test]
    fn unknown_result_code_continues_with_next_block() {
        let s = Sentinels::default();
        let (_, events) = decode_all(&[
            s.section_sentinel.as_str(),
            "suite.group.case1",
            s.section_sentinel.as_str(),
            "start: 1.0",
            "result: ?",
            "end: 2.0",
            s.section_sentinel.as_str(),
            "suite.group.case2",
            s.section_sentinel.as_str(),
            "start: 1.0",
            "result: u",
            "end: 2.0",
            s.run_terminator.as_str(),
        ]);

        let finished: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                DecoderEvent::CaseFinished { path, outcome } => Some((path.as_str(), outcome)),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 2);

        let (path, outcome) = &finished[0];
        assert_eq!(*path, "suite.group.case1");
        let malformed = outcome.as_ref().expect_err("unknown code is malformed");
        assert_eq!(
            malformed.error,
            DecodeError::UnknownResultCode {
                line: "result: ?".to_owned(),
            }
        );
        assert_eq!(malformed.raw_text, "start: 1.0\nresult: ?\nend: 2.0");
        let result = malformed.to_result();
        assert_eq!(result.status, TestStatus::Error);
        assert_eq!(result.error.as_deref(), Some(malformed.raw_text.as_str()));

        let (path, outcome) = &finished[1];
        assert_eq!(*path, "suite.group.case2");
        assert_eq!(
            outcome.as_ref().map(|result| result.status),
            Ok(TestStatus::UnexpectedSuccess)
        );
    }

    #[test]
    fn blocks_without_opening_sentinel() {
        // Path line followed directly by the record, as older producers write it.
        let s = Sentinels::default();
        let (_, events) = decode_all(&[
            "Ran discovery.",
            s.section_sentinel.as_str(),
            "app.Tests.test_a",
            "start: 0",
            "result: s",
            "end: 0.25",
            "not on this platform",
            s.section_sentinel.as_str(),
            s.run_terminator.as_str(),
        ]);

        assert_eq!(
            events[2],
            DecoderEvent::CaseFinished {
                path: "app.Tests.test_a".to_owned(),
                outcome: Ok(TestResult {
                    status: TestStatus::Skip,
                    error: Some("Skipped: not on this platform".to_owned()),
                    duration: Duration::from_millis(250),
                }),
            }
        );
    }

    #[test]
    fn accumulator_tracks_phase() {
        let s = Sentinels::default();
        let mut decoder = ResultDecoder::new(s.clone());
        assert_eq!(decoder.phase(), DecodePhase::AwaitingPreamble);

        decoder.decode_line("preamble");
        decoder.decode_line(&s.section_sentinel);
        assert_eq!(decoder.phase(), DecodePhase::BetweenTests);
        assert!(decoder.accumulated_lines().is_empty());

        // Extra sentinels between tests are ignored.
        assert!(decoder.decode_line(&s.section_sentinel).is_empty());
        assert_eq!(decoder.phase(), DecodePhase::BetweenTests);

        decoder.decode_line("a.b.c");
        decoder.decode_line(&s.section_sentinel);
        decoder.decode_line("start: 1");
        assert_eq!(decoder.phase(), DecodePhase::CollectingCase);
        assert_eq!(decoder.current_case_path(), Some("a.b.c"));
        assert_eq!(decoder.accumulated_lines(), ["start: 1".to_owned()]);

        assert_eq!(decoder.discard_pending(), Some("a.b.c".to_owned()));
        assert_eq!(decoder.phase(), DecodePhase::Finished);
        assert!(decoder.decode_line("a.b.d").is_empty());
    }

    #[test]
    fn terminator_during_preamble() {
        let s = Sentinels::default();
        let (_, events) = decode_all(&["starting", s.run_terminator.as_str(), "trailing"]);
        assert_eq!(
            events,
            vec![
                DecoderEvent::Preamble("starting".to_owned()),
                DecoderEvent::RunFinished,
            ]
        );
    }

    #[test]
    fn rejected_path_discards_block() {
        let s = Sentinels::default();
        let (_, events) = decode_all(&[
            s.section_sentinel.as_str(),
            "not_a_case",
            s.section_sentinel.as_str(),
            "start: 1",
            "result: OK",
            "end: 2",
            s.run_terminator.as_str(),
        ]);

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            DecoderEvent::CaseRejected {
                path,
                error: DecodeError::InvalidCasePath { .. },
            } if path == "not_a_case"
        ));
        assert_eq!(events[1], DecoderEvent::RunFinished);
    }

    #[test_case(&["start: 1", "result: OK", "end: 3"], TestStatus::Pass, None; "pass")]
    #[test_case(&["start: 1", "result: s", "end: 3", "why"], TestStatus::Skip, Some("Skipped: why"); "skip")]
    #[test_case(&["start: 1", "result: s", "end: 3"], TestStatus::Skip, Some("Skipped: "); "skip without reason")]
    #[test_case(&["start: 1", "result: F", "end: 3", "a", "b"], TestStatus::Fail, Some("a\nb"); "fail")]
    #[test_case(&["start: 1", "result: x", "end: 3", "known"], TestStatus::ExpectedFail, Some("known"); "expected fail")]
    #[test_case(&["start: 1", "result: u", "end: 3", "ignored"], TestStatus::UnexpectedSuccess, None; "unexpected success")]
    #[test_case(&["start: 1", "result: E", "end: 3"], TestStatus::Error, Some(""); "error")]
    fn status_mapping(lines: &[&str], status: TestStatus, error: Option<&str>) {
        let result = decode_record(&record(lines)).expect("record is well-formed");
        assert_eq!(result.status, status);
        assert_eq!(result.error.as_deref(), error);
        assert_eq!(result.duration, Duration::from_secs(2));
    }

    #[test]
    fn malformed_records() {
        assert_eq!(
            decode_record(&[]),
            Err(DecodeError::MissingLine {
                expected: RecordLine::Start,
            })
        );
        assert_eq!(
            decode_record(&record(&["start: 1"])),
            Err(DecodeError::MissingLine {
                expected: RecordLine::Result,
            })
        );
        assert_eq!(
            decode_record(&record(&["start: 1", "result: OK"])),
            Err(DecodeError::MissingLine {
                expected: RecordLine::End,
            })
        );
        assert_eq!(
            decode_record(&record(&["begin: 1", "result: OK", "end: 2"])),
            Err(DecodeError::MissingPrefix {
                expected: RecordLine::Start,
                prefix: START_PREFIX,
                line: "begin: 1".to_owned(),
            })
        );
        assert!(matches!(
            decode_record(&record(&["start: 1", "result: OK", "end: soon"])),
            Err(DecodeError::InvalidTimestamp {
                expected: RecordLine::End,
                ..
            })
        ));
        assert_eq!(
            decode_record(&record(&["start: 5", "result: OK", "end: 4"])),
            Err(DecodeError::InvalidDuration {
                start: 5.0,
                end: 4.0,
            })
        );
        assert!(matches!(
            decode_record(&record(&["start: 1", "result: OK", "end: inf"])),
            Err(DecodeError::InvalidDuration { .. })
        ));
    }
}
