// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The request-facing parser: boundary extraction and the chunk-ingest API.

use http::header::CONTENT_TYPE;
use http::HeaderMap;
use log::debug;
use mime::Mime;

use crate::decoder::Decoder;
use crate::error::Error;
use crate::targets::Target;

/// A push parser for one `multipart/form-data` request body.
///
/// Construct it from the request headers, register a target for every part
/// name you expect, then feed the body chunks as they arrive, in whatever
/// sizes the transport produces. Targets receive each part's bytes
/// incrementally; the parser itself never holds more than one delimiter's
/// worth of body data.
///
/// The lifetime parameter is the lifetime of the registered targets, so
/// `&mut` borrows work and the caller can read a target's collected value
/// back after the parser is dropped.
pub struct Parser<'t> {
    decoder: Decoder<'t>,
    started: bool,
}

impl<'t> std::fmt::Debug for Parser<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").field("started", &self.started).finish()
    }
}

impl<'t> Parser<'t> {
    /// Build a parser from the request headers.
    ///
    /// The `Content-Type` header must be `multipart/form-data` with a
    /// `boundary` parameter.
    pub fn new(headers: &HeaderMap) -> Result<Parser<'t>, Error> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .ok_or(Error::ContentTypeMissing)?
            .to_str()
            .map_err(|_| Error::NotMultipart)?;

        let mime: Mime = content_type.parse().map_err(|_| Error::NotMultipart)?;

        if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
            return Err(Error::NotMultipart);
        }

        let boundary = mime
            .get_param(mime::BOUNDARY)
            .ok_or(Error::BoundaryMissing)?;

        Parser::with_boundary(boundary.as_str())
    }

    /// Build a parser from an already-extracted boundary token.
    ///
    /// Surrounding double quotes are accepted and stripped.
    pub fn with_boundary(boundary: &str) -> Result<Parser<'t>, Error> {
        let boundary = boundary.trim_matches('"');

        // RFC 2046: 1 to 70 characters.
        if boundary.is_empty() || boundary.len() > 70 {
            return Err(Error::InvalidBoundary(boundary.to_owned()));
        }

        debug!("multipart boundary: {:?}", boundary);

        Ok(Parser {
            decoder: Decoder::new(boundary.as_bytes()),
            started: false,
        })
    }

    /// Reject parts whose name has no registered target instead of silently
    /// discarding them.
    pub fn strict(mut self) -> Parser<'t> {
        self.decoder.set_strict(true);
        self
    }

    /// Cap the size of a single part-header line (default 8 KiB).
    pub fn header_line_limit(mut self, limit: usize) -> Parser<'t> {
        self.decoder.set_header_line_limit(limit);
        self
    }

    /// Register a target for a part name.
    ///
    /// The same name may be registered repeatedly; every target registered
    /// under the active part's name receives the part, in registration order.
    /// Registration locks once the first chunk has been fed.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        target: impl Target + 't,
    ) -> Result<(), Error> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }

        self.decoder.register(name.into(), target);
        Ok(())
    }

    /// Decode the next chunk of the request body.
    ///
    /// Chunks may be any size, including empty, and may split the body at any
    /// byte. The first error poisons the parser; every later call returns a
    /// clone of the same error without touching a target.
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.started = true;
        self.decoder.feed_chunk(chunk)
    }

    /// Whether the closing boundary has been seen.
    ///
    /// Once true, further chunks are accepted and ignored.
    pub fn is_done(&self) -> bool {
        self.decoder.is_done()
    }
}
