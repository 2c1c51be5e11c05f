// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reassembles a non-blocking byte stream into lines.
//!
//! The producer's standard output is read in non-blocking mode: a read either returns some bytes,
//! reports that nothing is available right now (`WouldBlock`), or reports the end of the stream.
//! [`LineFramer`] turns those reads into complete lines, holding on to any trailing partial line
//! until the rest of it arrives.

use bstr::ByteSlice;
use debug_ignore::DebugIgnore;
use std::io::{self, Read};
use tracing::debug;

/// The default maximum number of bytes read in a single call to [`LineFramer::poll_lines`].
pub const DEFAULT_MAX_BYTES_PER_POLL: usize = 1 << 20;

const READ_CHUNK_SIZE: usize = 8192;

/// The lines produced by one call to [`LineFramer::poll_lines`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramedLines {
    /// Complete lines, in order, without their terminators.
    pub lines: Vec<String>,

    /// True if the stream has ended or its handle has become unusable.
    ///
    /// Once this is true, it stays true for every subsequent poll.
    pub stream_closed: bool,
}

/// Splits a non-blocking reader into lines.
#[derive(Debug)]
pub struct LineFramer<R> {
    reader: DebugIgnore<R>,
    buffer: Vec<u8>,
    closed: bool,
    max_bytes_per_poll: usize,
}

impl<R: Read> LineFramer<R> {
    /// Creates a new framer over a reader.
    ///
    /// The reader is expected to be in non-blocking mode: a read with nothing available should
    /// return an error of kind [`io::ErrorKind::WouldBlock`] rather than waiting.
    pub fn new(reader: R) -> Self {
        Self {
            reader: DebugIgnore(reader),
            buffer: Vec::new(),
            closed: false,
            max_bytes_per_poll: DEFAULT_MAX_BYTES_PER_POLL,
        }
    }

    /// Sets the maximum number of bytes read per poll. Anything beyond that is left for the next
    /// poll, so one call never does an unbounded amount of work.
    pub fn with_max_bytes_per_poll(mut self, max_bytes_per_poll: usize) -> Self {
        self.max_bytes_per_poll = max_bytes_per_poll.max(1);
        self
    }

    /// Returns true if the stream has been observed to close.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads whatever is currently available without blocking, and returns the complete lines
    /// assembled so far.
    ///
    /// "Nothing available" is the normal steady state and isn't reported. End of stream, or any
    /// read error other than `WouldBlock` and `Interrupted`, closes the framer: the partial buffer
    /// is discarded, since it can never be completed.
    pub fn poll_lines(&mut self) -> FramedLines {
        let mut lines = Vec::new();
        if self.closed {
            return FramedLines {
                lines,
                stream_closed: true,
            };
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut bytes_read = 0;
        while bytes_read < self.max_bytes_per_poll {
            let limit = chunk.len().min(self.max_bytes_per_poll - bytes_read);
            match self.reader.read(&mut chunk[..limit]) {
                Ok(0) => {
                    self.close(None);
                    break;
                }
                Ok(n) => {
                    bytes_read += n;
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.drain_lines(&mut lines);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    self.close(Some(error));
                    break;
                }
            }
        }

        FramedLines {
            lines,
            stream_closed: self.closed,
        }
    }

    /// Consumes the framer, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader.0
    }

    fn drain_lines(&mut self, lines: &mut Vec<String>) {
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].find_byte(b'\n') {
            lines.push(decode_line(&self.buffer[start..start + pos]));
            start += pos + 1;
        }
        self.buffer.drain(..start);
    }

    fn close(&mut self, error: Option<io::Error>) {
        self.closed = true;
        match error {
            Some(error) => debug!("output stream became unreadable: {error}"),
            None => debug!("output stream reached EOF"),
        }
        if !self.buffer.is_empty() {
            debug!(
                "discarding {} bytes of incomplete output: {:?}",
                self.buffer.len(),
                self.buffer.as_bstr(),
            );
            self.buffer.clear();
        }
    }
}

/// Decodes a line lossily, stripping a trailing carriage return.
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.to_str_lossy().into_owned()
}
