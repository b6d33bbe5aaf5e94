// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Error types reported by the parser and by targets.

use std::io;
use std::sync::Arc;

use crate::validators::ValidationError;

/// Error raised by a target's `start`/`data_received`/`finish`, or by a
/// validator guarding a target.
///
/// I/O causes are shared behind an [`Arc`] so the error can be cloned when the
/// parser replays its poisoned state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    /// A validator rejected the part data.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An I/O operation on the target's sink failed.
    #[error("{0}")]
    Io(Arc<io::Error>),
    /// A target-defined failure.
    #[error("{0}")]
    Custom(String),
}

impl From<io::Error> for TargetError {
    fn from(err: io::Error) -> Self {
        TargetError::Io(Arc::new(err))
    }
}

/// Everything that can go wrong while constructing or feeding a parser.
///
/// After `feed_chunk` returns an error the parser is poisoned: every later
/// call returns a clone of the same error without touching any target.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request has no `Content-Type` header.
    #[error("missing Content-Type header")]
    ContentTypeMissing,
    /// The `Content-Type` header is present but not `multipart/form-data`.
    #[error("Content-Type is not multipart/form-data")]
    NotMultipart,
    /// The content type carries no `boundary` parameter.
    #[error("Content-Type is missing the boundary parameter")]
    BoundaryMissing,
    /// The boundary token violates RFC 2046 (must be 1-70 characters).
    #[error("invalid multipart boundary {0:?}")]
    InvalidBoundary(String),
    /// The stream does not open with `--<boundary>` (stray leading CRLFs
    /// excepted).
    #[error("malformed opening boundary at offset {offset}")]
    BadBoundary {
        /// Offset of the offending byte from the start of the body.
        offset: u64,
    },
    /// A part's header section is not a CRLF-separated sequence of header
    /// lines within the configured size limit.
    #[error("malformed part headers at offset {offset}: {reason}")]
    MalformedHeaders {
        /// Offset of the offending byte from the start of the body.
        offset: u64,
        /// What exactly was wrong with the header section.
        reason: String,
    },
    /// A part carries a `Content-Disposition` other than `form-data`.
    #[error("Content-Disposition is {0:?}, expected \"form-data\"")]
    BadContentDisposition(String),
    /// Strict mode only: the payload names a part nobody registered for.
    #[error("no target registered for part {0:?}")]
    UnexpectedPart(String),
    /// `register` was called after the first chunk was fed.
    #[error("targets cannot be registered once parsing has started")]
    AlreadyStarted,
    /// A target failed; the cause is preserved verbatim.
    #[error("target failed: {0}")]
    Target(#[from] TargetError),
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Target(TargetError::Validation(err))
    }
}

impl Error {
    /// Coarse grouping used for diagnostics and error pages.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::BadBoundary { .. } => ErrorClass::Delimiting,
            Error::MalformedHeaders { .. } | Error::BadContentDisposition(_) => {
                ErrorClass::PartHeaders
            }
            Error::UnexpectedPart(_) => ErrorClass::UnexpectedPart,
            _ => ErrorClass::Internal,
        }
    }
}

/// Diagnostic grouping of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Configuration and target failures.
    Internal,
    /// The boundary structure of the stream is broken.
    Delimiting,
    /// A part's header section is unusable.
    PartHeaders,
    /// Strict mode rejected an unregistered part name.
    UnexpectedPart,
}
