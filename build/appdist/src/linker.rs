// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared user linker script.
//!
//! All applications link against one script whose origin address is a single
//! literal token. [`LinkerScript`] owns that file for the duration of a run:
//! it remembers the content it found, rewrites the token for each
//! application, and puts the original back when it is done with it, whether
//! or not the run succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use crate::alloc::LoadAddress;
use crate::error::{PatchError, ResourceError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// The file holds the original content.
    Loaded,
    /// The file holds the script for the application with this ordinal.
    Patched(usize),
}

#[derive(Debug)]
pub struct LinkerScript {
    path: PathBuf,
    token: String,
    /// Byte offset of the token in `original`.
    offset: usize,
    /// Content of the file when the run started. Every patch is made from
    /// this, never from a previous patch.
    original: String,
    state: State,
    /// Set once `restore` has run, so that `Drop` leaves the file alone.
    released: bool,
}

impl LinkerScript {
    /// Takes ownership of the script at `path`. The origin `token` must occur
    /// exactly once; this is checked here, before anything is written.
    pub fn load(path: &Path, token: &str) -> Result<Self, crate::Error> {
        let bytes = fs::read(path).map_err(|source| ResourceError::Read {
            path: path.to_owned(),
            source,
        })?;
        let original = String::from_utf8(bytes)
            .map_err(|_| ResourceError::NotUtf8(path.to_owned()))?;

        let found = occurrences(&original, token);
        let offset = match found.len() {
            0 => {
                return Err(PatchError::TokenNotFound {
                    path: path.to_owned(),
                    token: token.to_string(),
                }
                .into())
            }
            1 => found[0],
            count => {
                return Err(PatchError::AmbiguousToken {
                    path: path.to_owned(),
                    token: token.to_string(),
                    count,
                }
                .into())
            }
        };

        log::debug!("loaded linker script {}", path.display());
        Ok(LinkerScript {
            path: path.to_owned(),
            token: token.to_string(),
            offset,
            original,
            state: State::Loaded,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The script as it should read for an application linked at `address`.
    pub fn render(&self, address: LoadAddress) -> String {
        let end = self.offset + self.token.len();
        format!(
            "{}{}{}",
            &self.original[..self.offset],
            address.render_like(&self.token),
            &self.original[end..]
        )
    }

    /// Writes the script for the application `ordinal` at `address`.
    pub fn patch(
        &mut self,
        ordinal: usize,
        address: LoadAddress,
    ) -> Result<(), PatchError> {
        let patched = self.render(address);
        self.write(patched.as_bytes())?;
        self.state = State::Patched(ordinal);
        Ok(())
    }

    /// Puts the original content back after an application has been built.
    pub fn revert(&mut self) -> Result<(), PatchError> {
        if self.state != State::Loaded {
            self.write(self.original.as_bytes())?;
            self.state = State::Loaded;
        }
        Ok(())
    }

    /// Ends the run: makes sure the file on disk is byte-for-byte what it
    /// was when the script was loaded.
    pub fn restore(mut self) -> Result<(), PatchError> {
        self.released = true;
        self.put_back()
    }

    fn put_back(&mut self) -> Result<(), PatchError> {
        // Only write if the content differs; an untouched script keeps its
        // mtime.
        let on_disk = fs::read(&self.path).ok();
        if on_disk.as_deref() != Some(self.original.as_bytes()) {
            log::debug!("restoring {}", self.path.display());
            fs::write(&self.path, self.original.as_bytes()).map_err(
                |source| PatchError::Write {
                    path: self.path.clone(),
                    source,
                },
            )?;
        }
        self.state = State::Loaded;
        Ok(())
    }

    fn write(&self, contents: &[u8]) -> Result<(), PatchError> {
        // In place, so the file keeps its inode and permissions.
        fs::write(&self.path, contents).map_err(|source| PatchError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Byte offsets of every standalone `token` in `text`. A match running into
/// a neighbouring identifier or number character (`0x835000000` for the
/// token `0x83500000`) does not count.
fn occurrences(text: &str, token: &str) -> Vec<usize> {
    if token.is_empty() {
        return vec![];
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(token)
        .map(|(start, _)| start)
        .filter(|&start| {
            let before = text[..start].chars().next_back();
            let after = text[start + token.len()..].chars().next();
            !before.map_or(false, is_word) && !after.map_or(false, is_word)
        })
        .collect()
}

impl Drop for LinkerScript {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.put_back() {
            log::error!(
                "{:#}; the file must be restored by hand",
                anyhow::Error::from(e)
            );
        }
    }
}
