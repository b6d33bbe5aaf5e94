// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Per-target guards that inspect part data before the target sees it.

use crate::error::TargetError;
use crate::targets::Target;

/// Rejection raised by a [`Validator`].
///
/// Carried inside [`TargetError`](crate::TargetError) so callers can tell a
/// policy rejection from an I/O failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    reason: String,
}

impl ValidationError {
    /// A rejection with the given reason.
    pub fn new(reason: impl Into<String>) -> ValidationError {
        ValidationError {
            reason: reason.into(),
        }
    }

    /// Why the data was rejected.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Inspects each chunk of a part before the wrapped target receives it.
///
/// Implemented for any `FnMut(&[u8]) -> Result<(), ValidationError>` closure.
pub trait Validator {
    /// Accept or reject the next chunk.
    fn validate(&mut self, chunk: &[u8]) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: FnMut(&[u8]) -> Result<(), ValidationError>,
{
    fn validate(&mut self, chunk: &[u8]) -> Result<(), ValidationError> {
        self(chunk)
    }
}

/// Rejects a part once its cumulative size crosses a limit.
#[derive(Debug, Clone)]
pub struct MaxSizeValidator {
    limit: u64,
    seen: u64,
}

impl MaxSizeValidator {
    /// Allow at most `limit` bytes in total.
    pub fn new(limit: u64) -> MaxSizeValidator {
        MaxSizeValidator { limit, seen: 0 }
    }
}

impl Validator for MaxSizeValidator {
    fn validate(&mut self, chunk: &[u8]) -> Result<(), ValidationError> {
        self.seen += chunk.len() as u64;

        if self.seen > self.limit {
            return Err(ValidationError::new(format!(
                "size must not be greater than {}",
                self.limit
            )));
        }

        Ok(())
    }
}

/// A target wrapped with a validator; data only reaches the target after the
/// validator accepted it.
#[derive(Debug)]
pub struct ValidatedTarget<T, V> {
    target: T,
    validator: V,
}

impl<T: Target, V: Validator> ValidatedTarget<T, V> {
    /// Guard `target` with `validator`.
    pub fn new(target: T, validator: V) -> ValidatedTarget<T, V> {
        ValidatedTarget { target, validator }
    }

    /// The wrapped target.
    pub fn get_ref(&self) -> &T {
        &self.target
    }

    /// Unwrap the target.
    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T: Target, V: Validator> Target for ValidatedTarget<T, V> {
    fn start(&mut self) -> Result<(), TargetError> {
        self.target.start()
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        self.validator.validate(chunk)?;
        self.target.data_received(chunk)
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        self.target.finish()
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        self.target.set_multipart_filename(filename)
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        self.target.set_multipart_content_type(content_type)
    }
}
