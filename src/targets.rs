// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Targets receive the decoded body of one named part, chunk by chunk.
//!
//! Register a target under a part name before feeding the first chunk; the
//! parser then drives the lifecycle: the filename/content-type setters (when
//! the part provides them), `start` exactly once, any number of
//! `data_received` calls, and `finish` exactly once, even for empty parts.
//!
//! Targets are commonly registered as `&mut` borrows so the caller can read
//! the collected value back once the parser is dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::{self, Utf8Error};

use sha1::{Digest, Sha1};

use crate::error::TargetError;

/// A sink for the body bytes of a single named part.
///
/// All methods have defaults except [`data_received`](Target::data_received),
/// so trivial sinks stay trivial. Errors abort the parse; the parser still
/// makes a best-effort `finish` call on every target that was started.
pub trait Target {
    /// Called once, before any data, after the filename/content-type setters.
    fn start(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    /// Called for every decoded slice of the part body, in input order.
    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError>;

    /// Called once, after the last body byte.
    fn finish(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    /// The `filename` parameter of the part's `Content-Disposition`, if any.
    fn set_multipart_filename(&mut self, _filename: &str) {}

    /// The part's own `Content-Type` header value, if any.
    fn set_multipart_content_type(&mut self, _content_type: &str) {}
}

impl<'a, T: Target + ?Sized> Target for &'a mut T {
    fn start(&mut self) -> Result<(), TargetError> {
        (**self).start()
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        (**self).data_received(chunk)
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        (**self).finish()
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        (**self).set_multipart_filename(filename)
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        (**self).set_multipart_content_type(content_type)
    }
}

impl<T: Target + ?Sized> Target for Box<T> {
    fn start(&mut self) -> Result<(), TargetError> {
        (**self).start()
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        (**self).data_received(chunk)
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        (**self).finish()
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        (**self).set_multipart_filename(filename)
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        (**self).set_multipart_content_type(content_type)
    }
}

/// Discards everything it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTarget;

impl NullTarget {
    /// A fresh discarding target.
    pub fn new() -> NullTarget {
        NullTarget
    }
}

impl Target for NullTarget {
    fn data_received(&mut self, _chunk: &[u8]) -> Result<(), TargetError> {
        Ok(())
    }
}

/// Accumulates a part's body in memory.
#[derive(Debug, Default)]
pub struct ValueTarget {
    value: Vec<u8>,
    filename: Option<String>,
    content_type: Option<String>,
}

impl ValueTarget {
    /// An empty in-memory target.
    pub fn new() -> ValueTarget {
        ValueTarget::default()
    }

    /// The bytes received so far.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consume the target, keeping the collected bytes.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// The collected bytes as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        str::from_utf8(&self.value)
    }

    /// Filename announced by the part, if any.
    pub fn multipart_filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Content type announced by the part, if any.
    pub fn multipart_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Target for ValueTarget {
    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        self.value.extend_from_slice(chunk);
        Ok(())
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        self.filename = Some(filename.to_owned());
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_owned());
    }
}

/// Collects one value per finished part; use it when the same name repeats.
#[derive(Debug, Default)]
pub struct ListTarget {
    values: Vec<Vec<u8>>,
    pending: Vec<u8>,
}

impl ListTarget {
    /// An empty list target.
    pub fn new() -> ListTarget {
        ListTarget::default()
    }

    /// The values of all finished parts, in arrival order.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// Consume the target, keeping the finished values.
    pub fn into_values(self) -> Vec<Vec<u8>> {
        self.values
    }
}

impl Target for ListTarget {
    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        self.pending.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        self.values.push(std::mem::take(&mut self.pending));
        Ok(())
    }
}

/// Streams a part to a file at a caller-chosen path.
///
/// The file is only created when the part actually starts.
#[derive(Debug)]
pub struct FileTarget {
    path: PathBuf,
    overwrite: bool,
    file: Option<File>,
    written: u64,
}

impl FileTarget {
    /// Target the given path, replacing an existing file.
    pub fn new(path: impl Into<PathBuf>) -> FileTarget {
        FileTarget {
            path: path.into(),
            overwrite: true,
            file: None,
            written: 0,
        }
    }

    /// Fail `start` instead of replacing an existing file.
    pub fn no_overwrite(mut self) -> FileTarget {
        self.overwrite = false;
        self
    }

    /// Where the part is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn open(path: &Path, overwrite: bool) -> Result<File, TargetError> {
        let file = if overwrite {
            File::create(path)?
        } else {
            OpenOptions::new().write(true).create_new(true).open(path)?
        };

        Ok(file)
    }
}

impl Target for FileTarget {
    fn start(&mut self) -> Result<(), TargetError> {
        self.file = Some(Self::open(&self.path, self.overwrite)?);
        Ok(())
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        if let Some(file) = &mut self.file {
            file.write_all(chunk)?;
            self.written += chunk.len() as u64;
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        Ok(())
    }
}

/// Writes each part into a directory under the filename the client sent.
///
/// Path components are stripped from the client filename, so a hostile
/// `filename="../../x"` lands in the directory as `x`. Parts without a
/// filename are discarded.
#[derive(Debug)]
pub struct DirectoryTarget {
    directory: PathBuf,
    overwrite: bool,
    file: Option<File>,
    filename: Option<String>,
    content_type: Option<String>,
    filenames: Vec<String>,
    content_types: Vec<Option<String>>,
}

impl DirectoryTarget {
    /// Target the given directory, replacing existing files.
    pub fn new(directory: impl Into<PathBuf>) -> DirectoryTarget {
        DirectoryTarget {
            directory: directory.into(),
            overwrite: true,
            file: None,
            filename: None,
            content_type: None,
            filenames: Vec::new(),
            content_types: Vec::new(),
        }
    }

    /// Fail `start` instead of replacing an existing file.
    pub fn no_overwrite(mut self) -> DirectoryTarget {
        self.overwrite = false;
        self
    }

    /// Sanitised filenames of the parts written so far.
    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// Content types of the parts written so far, index-aligned with
    /// [`filenames`](DirectoryTarget::filenames).
    pub fn content_types(&self) -> &[Option<String>] {
        &self.content_types
    }

    /// The client filename reduced to its final path component.
    fn sanitised(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;

        Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
    }
}

impl Target for DirectoryTarget {
    fn start(&mut self) -> Result<(), TargetError> {
        if let Some(name) = self.sanitised() {
            let path = self.directory.join(&name);
            self.file = Some(FileTarget::open(&path, self.overwrite)?);
            self.filename = Some(name);
        } else {
            self.file = None;
            self.filename = None;
        }

        Ok(())
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        if let Some(file) = &mut self.file {
            file.write_all(chunk)?;
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        if let Some(name) = self.filename.take() {
            self.filenames.push(name);
            self.content_types.push(self.content_type.take());
        }

        self.content_type = None;
        Ok(())
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        self.filename = Some(filename.to_owned());
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_owned());
    }
}

/// Streams a part through a SHA-1 digest instead of keeping the bytes.
#[derive(Debug, Default, Clone)]
pub struct Sha1Target {
    hasher: Sha1,
}

impl Sha1Target {
    /// A fresh digest target.
    pub fn new() -> Sha1Target {
        Sha1Target::default()
    }

    /// Lowercase hex digest of everything received so far.
    pub fn digest(&self) -> String {
        self.hasher
            .clone()
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }
}

impl Target for Sha1Target {
    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        self.hasher.update(chunk);
        Ok(())
    }
}
