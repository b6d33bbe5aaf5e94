// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Streaming server-side parsing of HTTP `multipart/form-data` request
//! bodies.
//!
//! The [`Parser`] is push-based: the caller feeds body chunks of any size,
//! one byte at a time or a delimiter split across two reads, and each named
//! part is streamed into a caller-registered [`Target`] as it is decoded. No
//! part is ever buffered whole: the parser's own memory is bounded by one
//! header line plus one delimiter, regardless of body size.
//!
//! ```
//! use http::header::{HeaderValue, CONTENT_TYPE};
//! use http::HeaderMap;
//! use streaming_multipart::{targets::ValueTarget, Parser};
//!
//! # fn main() -> Result<(), streaming_multipart::Error> {
//! let mut headers = HeaderMap::new();
//! headers.insert(
//!     CONTENT_TYPE,
//!     HeaderValue::from_static("multipart/form-data; boundary=sep"),
//! );
//!
//! let mut name = ValueTarget::new();
//!
//! {
//!     let mut parser = Parser::new(&headers)?;
//!     parser.register("name", &mut name)?;
//!
//!     // chunks may arrive in any size, split at any byte
//!     parser.feed_chunk(b"--sep\r\nContent-Disposition: form-d")?;
//!     parser.feed_chunk(b"ata; name=\"name\"\r\n\r\nferris\r\n--sep--")?;
//! }
//!
//! assert_eq!(name.value(), b"ferris");
//! # Ok(())
//! # }
//! ```
//!
//! Ship a part to disk with [`targets::FileTarget`], hash it in flight with
//! [`targets::Sha1Target`], or guard any target with a
//! [`validators::MaxSizeValidator`]. Unregistered part names are discarded by
//! default; [`Parser::strict`] turns them into errors.
#![deny(missing_docs)]

mod decoder;
mod finder;
mod headers;
mod helpers;
mod parser;
mod registry;

pub mod error;
pub mod targets;
pub mod validators;

pub use crate::error::{Error, ErrorClass, TargetError};
pub use crate::parser::Parser;
pub use crate::targets::Target;
pub use crate::validators::{MaxSizeValidator, ValidatedTarget, ValidationError, Validator};
