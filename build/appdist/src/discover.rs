// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Finds the applications to build and puts them in build order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{closest, DiscoveryError};

/// One program to build. `ordinal` is its position in build order and the
/// only input to its load address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub source_path: PathBuf,
    pub ordinal: usize,
}

/// How discovered applications are ordered before ordinals are assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Order {
    /// Byte-wise by name. The kernel build sorts the manifest the same way.
    #[default]
    Lexicographic,
    /// Keep the order of an explicit list.
    AsListed,
}

/// An application named in the configuration.
///
/// Most applications live in the source directory under their own name, so
/// a bare string is enough:
/// ```toml
/// apps = [
///     "init",
///     "shell",
///     { name = "terminal", path = "../drivers/terminal" },
/// ]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AppEntry {
    Name(String),
    Located { name: String, path: PathBuf },
}

impl AppEntry {
    pub fn name(&self) -> &str {
        match self {
            AppEntry::Name(name) => name,
            AppEntry::Located { name, .. } => name,
        }
    }
}

/// Where the application set comes from.
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    /// Every program found directly inside the directory.
    Directory(&'a Path),
    /// A fixed list, with bare names resolved against `root`.
    List { root: &'a Path, entries: &'a [AppEntry] },
}

/// Produces the deduplicated, ordered application set for a run.
pub fn discover(
    source: Source<'_>,
    order: Order,
) -> Result<Vec<Application>, DiscoveryError> {
    let (found, order) = match source {
        Source::Directory(root) => {
            let found = list_directory(root)?;
            if found.is_empty() {
                return Err(DiscoveryError::NoApplications(root.to_owned()));
            }
            for (name, _) in &found {
                check_name(name)?;
            }
            // A directory listing has no meaningful order of its own.
            (found, Order::Lexicographic)
        }
        Source::List { root, entries } => {
            if entries.is_empty() {
                return Err(DiscoveryError::EmptyList);
            }
            for entry in entries {
                check_name(entry.name())?;
            }
            let found = entries
                .iter()
                .map(|entry| resolve(root, entry))
                .collect::<Result<Vec<_>, _>>()?;
            (found, order)
        }
    };

    Ok(arrange(found, order))
}

/// The manifest is split on whitespace, so a name must be a single
/// non-empty word.
fn check_name(name: &str) -> Result<(), DiscoveryError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(DiscoveryError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Lists the programs directly inside `root`: `*.rs` files, named after
/// their stem, and directories holding a `Cargo.toml`.
pub fn list_directory(
    root: &Path,
) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::MissingSourceDir(root.to_owned()));
    }

    let mut found = vec![];
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true)
    {
        let entry = entry.map_err(|source| DiscoveryError::Unreadable {
            path: root.to_owned(),
            source,
        })?;
        let path = entry.path();
        let file_name = match entry.file_name().to_str() {
            Some(name) => name,
            None => {
                log::warn!("skipping non-UTF-8 entry {}", path.display());
                continue;
            }
        };
        if file_name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_file() {
            if let Some(stem) = file_name.strip_suffix(".rs") {
                if !stem.is_empty() {
                    found.push((stem.to_string(), path.to_owned()));
                }
            }
        } else if file_type.is_dir() && path.join("Cargo.toml").is_file() {
            found.push((file_name.to_string(), path.to_owned()));
        }
    }
    Ok(found)
}

fn resolve(
    root: &Path,
    entry: &AppEntry,
) -> Result<(String, PathBuf), DiscoveryError> {
    let (name, path) = match entry {
        AppEntry::Name(name) => {
            let file = root.join(format!("{}.rs", name));
            if file.is_file() {
                return Ok((name.clone(), file));
            }
            (name, root.join(name))
        }
        AppEntry::Located { name, path } => (name, root.join(path)),
    };

    if path.exists() {
        return Ok((name.clone(), path));
    }

    let known = list_directory(root).unwrap_or_default();
    Err(DiscoveryError::UnknownApplication {
        name: name.clone(),
        path,
        suggestion: closest(name, known.iter().map(|(n, _)| n.as_str())),
    })
}

/// Drops repeated names (the first one wins), orders the rest and hands out
/// ordinals `0..n`.
fn arrange(found: Vec<(String, PathBuf)>, order: Order) -> Vec<Application> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(found.len());
    for (name, path) in found {
        if seen.insert(name.clone()) {
            unique.push((name, path));
        } else {
            log::warn!("application {} listed more than once; ignoring", name);
        }
    }

    if order == Order::Lexicographic {
        unique.sort_by(|a, b| a.0.cmp(&b.0));
    }

    unique
        .into_iter()
        .enumerate()
        .map(|(ordinal, (name, source_path))| Application {
            name,
            source_path,
            ordinal,
        })
        .collect()
}
