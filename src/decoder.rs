// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The byte-level multipart state machine.
//!
//! The decoder walks every input byte exactly once, left to right, and never
//! looks further back than the previous `max(|delimiter|, |terminator|) - 1`
//! bytes, so any chunking of the body (including one byte at a time, or a
//! delimiter split across chunks) produces identical target calls.
//!
//! While a part body is being read, two [`Finder`]s run in lockstep: one for
//! the delimiter `\r\n--<boundary>\r\n` and one for the terminator
//! `\r\n--<boundary>--`. A body byte is released to the bound targets as soon
//! as it can no longer belong to a pending match of either pattern; the
//! undecided tail lives in a small carry buffer bounded by the pattern
//! length. Both patterns open with CR, so CR-free stretches of a chunk are
//! handed to the targets in a single slice without ever being copied.

use std::cmp;
use std::mem;

use bytes::{BufMut, BytesMut};
use log::{debug, trace};

use crate::error::Error;
use crate::finder::Finder;
use crate::headers;
use crate::helpers::show_bytes;
use crate::registry::{Binding, Registry};
use crate::targets::Target;

pub(crate) const DEFAULT_HEADER_LINE_LIMIT: usize = 8 * 1024;

const HYPHEN: u8 = 0x2d;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the opening `--<boundary>`; a stray leading CRLF is skipped.
    Start,
    /// One `-` of the opening `--` seen.
    OpeningHyphen,
    /// Matching the boundary token of the opening line.
    OpeningBoundary,
    /// CR after the opening token seen; LF expected.
    OpeningLf,
    /// `-` after the opening token; one more means an empty form.
    OpeningFinalHyphen,
    /// Accumulating one header line.
    ReadingHeader,
    /// CR inside the header section seen; LF expected.
    EndingHeader,
    /// A header line just ended; CR here starts the empty line.
    EndedHeader,
    /// Empty-line CR seen; LF opens the body.
    EndingAllHeaders,
    /// Streaming body bytes through the delimiter finders.
    ReadingBody,
    /// Terminator seen; everything that follows is ignored.
    End,
}

pub(crate) struct Decoder<'t> {
    state: State,
    boundary: Vec<u8>,
    /// Matched prefix of the boundary token on the opening line.
    matched: usize,
    delimiter: Finder,
    terminator: Finder,
    carry: BytesMut,
    header_line: Vec<u8>,
    header_line_limit: usize,
    registry: Registry<'t>,
    strict: bool,
    binding: Binding,
    part_open: bool,
    pending_filename: Option<String>,
    pending_content_type: Option<String>,
    offset: u64,
    poisoned: Option<Error>,
}

impl<'t> Decoder<'t> {
    pub fn new(boundary: &[u8]) -> Decoder<'t> {
        let mut delimiter = Vec::with_capacity(boundary.len() + 6);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary);

        let mut terminator = delimiter.clone();
        delimiter.extend_from_slice(b"\r\n");
        terminator.extend_from_slice(b"--");

        let window = cmp::max(delimiter.len(), terminator.len());

        Decoder {
            state: State::Start,
            boundary: boundary.to_vec(),
            matched: 0,
            delimiter: Finder::new(delimiter).expect("delimiter pattern is never empty"),
            terminator: Finder::new(terminator).expect("terminator pattern is never empty"),
            carry: BytesMut::with_capacity(window),
            header_line: Vec::new(),
            header_line_limit: DEFAULT_HEADER_LINE_LIMIT,
            registry: Registry::new(),
            strict: false,
            binding: Binding::new(),
            part_open: false,
            pending_filename: None,
            pending_content_type: None,
            offset: 0,
            poisoned: None,
        }
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn set_header_line_limit(&mut self, limit: usize) {
        self.header_line_limit = limit;
    }

    pub fn register(&mut self, name: String, target: impl Target + 't) {
        self.registry.register(name, target);
    }

    pub fn is_done(&self) -> bool {
        self.state == State::End
    }

    /// Decode one chunk of the body, dispatching to the bound targets.
    ///
    /// The first error poisons the decoder; later calls return a clone of it
    /// without reading a byte or touching a target.
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }

        match self.run(chunk) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Started targets hold resources; release them before
                // reporting the original failure.
                if self.part_open {
                    let binding = mem::take(&mut self.binding);
                    self.registry.finish_best_effort(&binding);
                    self.part_open = false;
                }

                self.poisoned = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let mut i = 0;

        while i < chunk.len() {
            match self.state {
                State::ReadingBody => i = self.read_body(chunk, i)?,
                State::End => return Ok(()),
                _ => {
                    self.step(chunk[i])?;
                    i += 1;
                    self.offset += 1;
                }
            }
        }

        Ok(())
    }

    /// One byte through every state except the body.
    fn step(&mut self, byte: u8) -> Result<(), Error> {
        match self.state {
            State::Start => match byte {
                HYPHEN => self.state = State::OpeningHyphen,
                // some clients lead with an extra CRLF
                CR | LF => trace!("skipping stray byte before the opening boundary"),
                _ => return Err(Error::BadBoundary { offset: self.offset }),
            },

            State::OpeningHyphen => {
                if byte != HYPHEN {
                    return Err(Error::BadBoundary { offset: self.offset });
                }

                self.matched = 0;
                self.state = State::OpeningBoundary;
            }

            State::OpeningBoundary => {
                if self.matched < self.boundary.len() {
                    if byte != self.boundary[self.matched] {
                        return Err(Error::BadBoundary { offset: self.offset });
                    }

                    self.matched += 1;
                } else if byte == CR {
                    self.state = State::OpeningLf;
                } else if byte == HYPHEN {
                    self.state = State::OpeningFinalHyphen;
                } else {
                    return Err(Error::BadBoundary { offset: self.offset });
                }
            }

            State::OpeningFinalHyphen => {
                if byte != HYPHEN {
                    return Err(Error::BadBoundary { offset: self.offset });
                }

                debug!("terminator on the opening line: the form is empty");
                self.state = State::End;
            }

            State::OpeningLf => {
                if byte != LF {
                    return Err(Error::BadBoundary { offset: self.offset });
                }

                self.begin_headers();
            }

            State::ReadingHeader => match byte {
                CR => self.state = State::EndingHeader,
                LF => return Err(self.malformed("header line ends with a bare LF")),
                _ => self.push_header_byte(byte)?,
            },

            State::EndingHeader => match byte {
                // an empty line right away: a part without headers
                LF if self.header_line.is_empty() => self.open_body()?,
                LF => {
                    self.emit_header()?;
                    self.state = State::EndedHeader;
                }
                _ => {
                    return Err(self.malformed("CR inside a header line is not followed by LF"));
                }
            },

            State::EndedHeader => match byte {
                CR => self.state = State::EndingAllHeaders,
                LF => return Err(self.malformed("bare LF after a header line")),
                _ => {
                    self.push_header_byte(byte)?;
                    self.state = State::ReadingHeader;
                }
            },

            State::EndingAllHeaders => match byte {
                LF => self.open_body()?,
                _ => return Err(self.malformed("the empty line after the headers is not CRLF")),
            },

            State::ReadingBody | State::End => unreachable!("run() dispatches these states"),
        }

        Ok(())
    }

    /// Body bytes from `chunk[i..]`; returns the new position.
    fn read_body(&mut self, chunk: &[u8], mut i: usize) -> Result<usize, Error> {
        // With no partial match pending, nothing before the next CR can start
        // one: release it as a single slice straight from the input.
        if self.carry.is_empty() && self.delimiter.inactive() && self.terminator.inactive() {
            let safe = chunk[i..]
                .iter()
                .position(|&byte| byte == CR)
                .unwrap_or(chunk.len() - i);

            if safe > 0 {
                self.flush(&chunk[i..i + safe])?;
                self.offset += safe as u64;
                i += safe;
            }

            if i == chunk.len() {
                return Ok(i);
            }
        }

        let byte = chunk[i];
        self.delimiter.feed(byte);
        self.terminator.feed(byte);
        self.carry.put_u8(byte);
        i += 1;
        self.offset += 1;

        if self.delimiter.found() {
            let pattern_len = self.delimiter.len();
            self.end_part(pattern_len)?;
            self.begin_headers();
        } else if self.terminator.found() {
            let pattern_len = self.terminator.len();
            self.end_part(pattern_len)?;
            debug!("multipart body complete at offset {}", self.offset);
            self.state = State::End;
        } else {
            // Whatever cannot belong to the longest pending match is safe.
            let keep = cmp::max(self.delimiter.progress(), self.terminator.progress());

            if self.carry.len() > keep {
                let safe_len = self.carry.len() - keep;
                let safe = self.carry.split_to(safe_len);
                self.flush(&safe)?;
            }
        }

        Ok(i)
    }

    fn flush(&mut self, bytes: &[u8]) -> Result<(), Error> {
        trace!("flushing {} body byte(s)", bytes.len());
        self.registry.data(&self.binding, bytes).map_err(Error::from)
    }

    /// The carry ends with a full delimiter or terminator; everything before
    /// it is the tail of the part body.
    fn end_part(&mut self, pattern_len: usize) -> Result<(), Error> {
        let body_len = self.carry.len() - pattern_len;

        if body_len > 0 {
            let body = self.carry.split_to(body_len);
            self.flush(&body)?;
        }

        self.carry.clear();
        self.delimiter.reset();
        self.terminator.reset();

        self.part_open = false;
        let binding = mem::take(&mut self.binding);

        if let Err((err, failed)) = self.registry.finish(&binding) {
            // The targets after the failing one still hold resources.
            self.registry.finish_best_effort(&binding[failed + 1..]);
            return Err(err.into());
        }

        Ok(())
    }

    fn begin_headers(&mut self) {
        self.header_line.clear();
        self.pending_filename = None;
        self.pending_content_type = None;
        self.state = State::ReadingHeader;
    }

    fn push_header_byte(&mut self, byte: u8) -> Result<(), Error> {
        if self.header_line.len() >= self.header_line_limit {
            return Err(self.malformed(format!(
                "header line exceeds {} bytes",
                self.header_line_limit
            )));
        }

        self.header_line.push(byte);
        Ok(())
    }

    /// A complete header line is in the buffer.
    fn emit_header(&mut self) -> Result<(), Error> {
        let line = mem::take(&mut self.header_line);
        trace!("part header: {}", show_bytes(&line));

        let header = headers::parse(&line).map_err(|reason| Error::MalformedHeaders {
            offset: self.offset,
            reason,
        })?;

        match header.name.as_str() {
            "content-disposition" => {
                if !header.value.eq_ignore_ascii_case("form-data") {
                    return Err(Error::BadContentDisposition(header.value));
                }

                let name = header.param("name").unwrap_or("");
                self.binding = self.registry.lookup(name);

                if self.binding.is_empty() {
                    if self.strict {
                        return Err(Error::UnexpectedPart(name.to_owned()));
                    }

                    debug!("no target registered for part {:?}; discarding it", name);
                }

                self.pending_filename = header.param("filename").map(str::to_owned);
            }
            "content-type" => {
                self.pending_content_type = Some(header.value);
            }
            other => trace!("ignoring part header {:?}", other),
        }

        Ok(())
    }

    /// The header section is complete: hand the part attributes to the bound
    /// targets and start them.
    fn open_body(&mut self) -> Result<(), Error> {
        trace!(
            "part open: {} bound target(s), filename {:?}, content type {:?}",
            self.binding.len(),
            self.pending_filename,
            self.pending_content_type
        );

        let started = self.registry.start(
            &self.binding,
            self.pending_filename.as_deref(),
            self.pending_content_type.as_deref(),
        );

        if let Err((err, started)) = started {
            let binding = mem::take(&mut self.binding);
            self.registry.finish_best_effort(&binding[..started]);
            return Err(err.into());
        }

        self.part_open = true;
        self.carry.clear();
        self.delimiter.reset();
        self.terminator.reset();
        self.state = State::ReadingBody;
        Ok(())
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedHeaders {
            offset: self.offset,
            reason: reason.into(),
        }
    }
}

impl<'t> Drop for Decoder<'t> {
    fn drop(&mut self) {
        // A started target may be holding a file descriptor.
        if self.part_open {
            debug!(
                "decoder dropped mid-part; finishing {} active target(s)",
                self.binding.len()
            );

            let binding = mem::take(&mut self.binding);
            self.registry.finish_best_effort(&binding);
        }
    }
}
