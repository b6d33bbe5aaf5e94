// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The name-to-target registry and its lifecycle dispatch.
//!
//! A name may be registered more than once; every lookup returns the matching
//! targets in registration order and each lifecycle call walks them in that
//! order. When a target errors, the targets after it in the same list are not
//! called for that operation; callers that need transactional behaviour keep
//! one writer per name.

use log::warn;

use crate::error::TargetError;
use crate::targets::Target;

struct Entry<'t> {
    name: String,
    target: Box<dyn Target + 't>,
}

/// Owns every registered target for one parser.
pub(crate) struct Registry<'t> {
    entries: Vec<Entry<'t>>,
}

/// Positions into the registry of the targets bound to the active part.
///
/// An empty binding is the null target: dispatch walks nothing.
pub(crate) type Binding = Vec<usize>;

impl<'t> Registry<'t> {
    pub fn new() -> Registry<'t> {
        Registry {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, name: String, target: impl Target + 't) {
        self.entries.push(Entry {
            name,
            target: Box::new(target),
        });
    }

    /// All targets registered under `name`, in registration order.
    pub fn lookup(&self, name: &str) -> Binding {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.name == name)
            .map(|(index, _)| index)
            .collect()
    }

    /// Announce the part attributes and start every bound target.
    ///
    /// On error, reports how many targets had already been started so the
    /// caller can finish exactly those.
    pub fn start(
        &mut self,
        binding: &[usize],
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<(), (TargetError, usize)> {
        for (started, &index) in binding.iter().enumerate() {
            let target = &mut self.entries[index].target;

            if let Some(filename) = filename {
                target.set_multipart_filename(filename);
            }
            if let Some(content_type) = content_type {
                target.set_multipart_content_type(content_type);
            }

            target.start().map_err(|err| (err, started))?;
        }

        Ok(())
    }

    pub fn data(&mut self, binding: &[usize], chunk: &[u8]) -> Result<(), TargetError> {
        for &index in binding {
            self.entries[index].target.data_received(chunk)?;
        }

        Ok(())
    }

    /// Finish every bound target; on error, reports the failing position so
    /// the caller can best-effort finish the rest.
    pub fn finish(&mut self, binding: &[usize]) -> Result<(), (TargetError, usize)> {
        for (position, &index) in binding.iter().enumerate() {
            self.entries[index]
                .target
                .finish()
                .map_err(|err| (err, position))?;
        }

        Ok(())
    }

    /// Finish targets that must be released even though the parse failed.
    pub fn finish_best_effort(&mut self, binding: &[usize]) {
        for &index in binding {
            let entry = &mut self.entries[index];

            if let Err(err) = entry.target.finish() {
                warn!("target {:?} failed to finish: {}", entry.name, err);
            }
        }
    }
}
