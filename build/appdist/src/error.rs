// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Failure modes of a run.
//!
//! Each stage of `dist` has its own error enum so that callers (and the exit
//! code) can tell a missing application apart from a broken linker script or
//! a failed compile. [`Error`] wraps all of them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::board::Board;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source directory {} does not exist", .0.display())]
    MissingSourceDir(PathBuf),

    #[error("could not list {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no applications found in {}", .0.display())]
    NoApplications(PathBuf),

    #[error("application list is empty")]
    EmptyList,

    #[error(
        "'{name}' is not a valid application name; names must be non-empty \
         and contain no whitespace"
    )]
    InvalidName { name: String },

    #[error(
        "'{name}' is not a known application (looked for {}).{}",
        .path.display(),
        did_you_mean(.suggestion)
    )]
    UnknownApplication {
        name: String,
        path: PathBuf,
        suggestion: Option<String>,
    },

    #[error(
        "'{value}' is not a valid board; expected one of {}.{}",
        Board::names(),
        did_you_mean(.suggestion)
    )]
    UnknownBoard {
        value: String,
        suggestion: Option<String>,
    },

    #[error("no application set is configured for board {0}")]
    NoAppsForBoard(Board),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error(
        "stride {stride:#x} is smaller than the minimum section size {min:#x}"
    )]
    StrideTooSmall { stride: u64, min: u64 },

    #[error(
        "application {ordinal} at base {base:#x} + {ordinal} * {stride:#x} \
         does not fit in a {bits}-bit address space"
    )]
    Overflow {
        ordinal: usize,
        base: u64,
        stride: u64,
        bits: u32,
    },
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error(
        "origin token '{token}' not found in {}; \
         does the linker script match the configuration?",
        .path.display()
    )]
    TokenNotFound { path: PathBuf, token: String },

    #[error(
        "origin token '{token}' appears {count} times in {}; \
         it must appear exactly once",
        .path.display()
    )]
    AmbiguousToken {
        path: PathBuf,
        token: String,
        count: usize,
    },

    #[error("could not write linker script {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("could not read linker script {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("linker script {} is not valid UTF-8", .0.display())]
    NotUtf8(PathBuf),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to run build for {app} ({command})")]
    Spawn {
        app: String,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "build of {app} failed ({}), see output for details",
        exit(.code)
    )]
    Failed { app: String, code: Option<i32> },

    #[error("build command is empty")]
    EmptyCommand,
}

#[derive(Debug, Error)]
#[error("could not write {}", .path.display())]
pub struct ManifestError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("interrupted after building {built} of {total} applications")]
    Cancelled { built: usize, total: usize },
}

impl Error {
    /// Process exit status for this failure. Configuration and usage errors
    /// that never make it into an `Error` exit with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Discovery(_) => 2,
            Error::Allocation(_) => 3,
            Error::Patch(_) => 4,
            Error::Build(_) => 5,
            Error::Resource(_) => 6,
            Error::Manifest(_) => 7,
            Error::Cancelled { .. } => 130,
        }
    }
}

/// Picks the candidate closest to `name`, if any is close enough to be a
/// plausible typo.
pub(crate) fn closest<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    // Suggest only for very small differences; a large distance gives silly
    // suggestions for short names.
    const MAX_DISTANCE: usize = 3;

    let mut scored: Vec<_> = candidates
        .into_iter()
        .filter_map(|s| {
            let distance = strsim::damerau_levenshtein(name, s);
            if distance <= MAX_DISTANCE {
                Some((distance, s))
            } else {
                None
            }
        })
        .collect();
    scored.sort();
    scored.first().map(|(_, s)| s.to_string())
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" Did you mean '{}'?", s),
        None => String::new(),
    }
}

fn exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_near_misses_only() {
        let names = ["init", "shell", "terminal"];
        assert_eq!(closest("shel", names), Some("shell".to_string()));
        assert_eq!(closest("int", names), Some("init".to_string()));
        assert_eq!(closest("virtio-blk", names), None);
    }

    #[test]
    fn exit_codes_are_distinct_per_stage() {
        let manifest = Error::Manifest(ManifestError {
            path: "application.txt".into(),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        });
        let build = Error::Build(BuildError::Failed {
            app: "fs".to_string(),
            code: Some(101),
        });
        assert_eq!(manifest.exit_code(), 7);
        assert_eq!(build.exit_code(), 5);
        assert_eq!(
            build.to_string(),
            "build of fs failed (exit code 101), see output for details"
        );
    }
}
