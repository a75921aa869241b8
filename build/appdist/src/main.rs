// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{ErrorKind, Parser};

use appdist::board::Board;
use appdist::config::Config;
use appdist::{dist, Error};

static CANCEL: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Parser)]
#[clap(
    max_term_width = 80,
    about = "builds user applications at non-overlapping load addresses"
)]
enum Appdist {
    /// Writes the application manifest, then builds every application
    /// against the shared linker script patched with its own load address.
    Dist(Target),

    /// Prints the load address each application would be built at, without
    /// writing anything.
    Plan(Target),

    /// Writes only the application manifest (and allocation map).
    Manifest(Target),
}

#[derive(Debug, clap::Args)]
struct Target {
    /// Board whose application set to build. Overrides the environment
    /// variable named by `board-env` in the configuration.
    #[clap(long)]
    board: Option<String>,

    /// Path to the configuration file, in TOML.
    #[clap(default_value = "dist.toml")]
    cfg: PathBuf,
}

impl Target {
    fn load(&self) -> Result<(Config, Option<Board>)> {
        let cfg = Config::from_file(&self.cfg)?;
        let board = Board::select(self.board.as_deref(), &cfg.board_env)
            .map_err(Error::from)?;
        if let Some(board) = board {
            log::info!("board {}", board);
        }
        Ok((cfg, board))
    }
}

fn run(cmd: Appdist) -> Result<()> {
    match cmd {
        Appdist::Dist(target) => {
            let (cfg, board) = target.load()?;

            // Leave the interrupt to the build in the foreground; stop once
            // it exits and put the linker script back before quitting.
            ctrlc::set_handler(|| CANCEL.store(true, Ordering::SeqCst))
                .context("could not install Ctrl-C handler")?;

            dist::run(&cfg, board, &CANCEL)?;
        }
        Appdist::Plan(target) => {
            let (cfg, board) = target.load()?;
            let plan = dist::plan_only(&cfg, board)?;
            plan.write_map(&mut std::io::stdout().lock())?;
        }
        Appdist::Manifest(target) => {
            let (cfg, board) = target.load()?;
            let plan = dist::plan_only(&cfg, board)?;
            dist::write_manifest(&cfg, &plan)?;
        }
    }
    Ok(())
}

fn main() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");

    env_logger::init_from_env(env);

    let cmd = match Appdist::try_parse() {
        Ok(cmd) => cmd,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cmd) {
        eprintln!("Error: {:?}", e);
        let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
        std::process::exit(code);
    }
}
