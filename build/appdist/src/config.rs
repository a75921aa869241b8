// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::alloc::Layout;
use crate::board::Board;
use crate::discover::{AppEntry, Order, Source};
use crate::error::DiscoveryError;

/// A `RawConfig` represents a `dist.toml` file that has been deserialized,
/// but not checked or resolved against the directory it came from.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    source_dir: PathBuf,
    manifest: PathBuf,
    #[serde(default)]
    order: Order,
    #[serde(default = "default_board_env")]
    board_env: String,
    #[serde(default)]
    apps: Option<Vec<AppEntry>>,
    layout: RawLayout,
    linker: RawLinker,
    build: RawBuild,
    #[serde(default)]
    boards: IndexMap<String, BoardApps>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawLayout {
    base: u64,
    stride: u64,
    #[serde(default = "default_min_section_size")]
    min_section_size: u64,
    #[serde(default = "default_address_bits")]
    address_bits: u32,
    map: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawLinker {
    script: PathBuf,
    token: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawBuild {
    command: Vec<String>,
    workdir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BoardApps {
    apps: Vec<AppEntry>,
}

fn default_board_env() -> String {
    "BOARD".to_string()
}

fn default_min_section_size() -> u64 {
    0x1000
}

fn default_address_bits() -> u32 {
    64
}

/// A checked configuration with every path resolved against the directory
/// holding the configuration file.
#[derive(Clone, Debug)]
pub struct Config {
    pub source_dir: PathBuf,
    pub manifest: PathBuf,
    pub order: Order,
    /// Environment variable holding the board selector.
    pub board_env: String,
    pub apps: Option<Vec<AppEntry>>,
    pub layout: Layout,
    /// Where to write the allocation map, if anywhere.
    pub map: Option<PathBuf>,
    pub linker: LinkerConfig,
    pub build: BuildConfig,
    pub boards: BTreeMap<Board, Vec<AppEntry>>,
}

#[derive(Clone, Debug)]
pub struct LinkerConfig {
    pub script: PathBuf,
    /// The literal in the script that holds the origin address.
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub command: Vec<String>,
    pub workdir: PathBuf,
}

impl Config {
    pub fn from_file(cfg: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(cfg)
            .with_context(|| format!("could not read {}", cfg.display()))?;
        let dir = match cfg.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        Self::parse(&text, dir)
            .with_context(|| format!("invalid configuration {}", cfg.display()))
    }

    /// Parses configuration `text`, resolving relative paths against `dir`.
    pub fn parse(text: &str, dir: &Path) -> Result<Self> {
        let toml: RawConfig = toml::from_str(text)?;

        if !(1..=64).contains(&toml.layout.address_bits) {
            bail!(
                "address-bits must be between 1 and 64, not {}",
                toml.layout.address_bits
            );
        }
        if toml.build.command.is_empty() {
            bail!("build command is empty");
        }
        let token = toml
            .linker
            .token
            .unwrap_or_else(|| format!("{:#x}", toml.layout.base));
        if token.is_empty() {
            bail!("linker token is empty");
        }

        let mut boards = BTreeMap::new();
        for (name, set) in toml.boards {
            let board: Board = name
                .parse()
                .with_context(|| format!("in [boards.{}]", name))?;
            boards.insert(board, set.apps);
        }

        Ok(Config {
            source_dir: dir.join(toml.source_dir),
            manifest: dir.join(toml.manifest),
            order: toml.order,
            board_env: toml.board_env,
            apps: toml.apps,
            layout: Layout {
                base: toml.layout.base,
                stride: toml.layout.stride,
                min_section_size: toml.layout.min_section_size,
                address_bits: toml.layout.address_bits,
            },
            map: toml.layout.map.map(|m| dir.join(m)),
            linker: LinkerConfig {
                script: dir.join(toml.linker.script),
                token,
            },
            build: BuildConfig {
                command: toml.build.command,
                workdir: match toml.build.workdir {
                    Some(w) => dir.join(w),
                    None => dir.to_owned(),
                },
            },
            boards,
        })
    }

    /// Where the application set comes from for `board`: its own list, the
    /// top-level `apps` list, or failing both the source directory.
    pub fn source(
        &self,
        board: Option<Board>,
    ) -> Result<Source<'_>, DiscoveryError> {
        if let Some(board) = board {
            return match self.boards.get(&board) {
                Some(entries) => Ok(Source::List {
                    root: &self.source_dir,
                    entries,
                }),
                None => Err(DiscoveryError::NoAppsForBoard(board)),
            };
        }
        Ok(match &self.apps {
            Some(entries) => Source::List {
                root: &self.source_dir,
                entries,
            },
            None => Source::Directory(&self.source_dir),
        })
    }
}
