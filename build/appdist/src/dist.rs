// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dist` flow: discover, allocate, write the manifest, then build every
//! application against its own patch of the shared linker script.

use std::fs;
use std::sync::atomic::AtomicBool;

use crate::alloc::Plan;
use crate::board::Board;
use crate::config::Config;
use crate::discover::discover;
use crate::driver::{self, Builder, CommandBuilder, Report};
use crate::error::{Error, ManifestError};
use crate::linker::LinkerScript;
use crate::manifest;

/// Discovers the applications for `board` and assigns their addresses.
/// Nothing is written.
pub fn plan_only(cfg: &Config, board: Option<Board>) -> Result<Plan, Error> {
    let source = cfg.source(board)?;
    let apps = discover(source, cfg.order)?;
    let plan = Plan::new(apps, cfg.layout)?;

    for (app, address) in plan.iter() {
        log::debug!("{:>3} {} -> {}", app.ordinal, app.name, address);
    }
    Ok(plan)
}

/// The production builder for `plan`: the configured command, with the
/// application set and board exported to every invocation.
pub fn command_builder(
    cfg: &Config,
    plan: &Plan,
    board: Option<Board>,
) -> Result<CommandBuilder, Error> {
    let mut builder = CommandBuilder::new(
        cfg.build.command.clone(),
        cfg.build.workdir.clone(),
    )?;
    builder.env("APPDIST_APPS", &plan.names().collect::<Vec<_>>().join(","));
    if let Some(board) = board {
        builder.env("APPDIST_BOARD", board.as_str());
    }
    Ok(builder)
}

/// Writes the manifest (and the allocation map, if one is configured) for
/// `plan`.
pub fn write_manifest(cfg: &Config, plan: &Plan) -> Result<(), Error> {
    manifest::write(&cfg.manifest, plan.names())?;

    if let Some(map) = &cfg.map {
        let err = |source| ManifestError {
            path: map.clone(),
            source,
        };
        let mut contents: Vec<u8> = vec![];
        plan.write_map(&mut contents).map_err(err)?;
        if let Some(dir) = map.parent() {
            fs::create_dir_all(dir).map_err(err)?;
        }
        manifest::write_atomic(map, &contents).map_err(err)?;
        log::debug!("wrote allocation map {}", map.display());
    }
    Ok(())
}

/// Runs the build half of `dist` for an already computed `plan`.
///
/// The manifest is written first; if that fails the linker script is never
/// opened. Every exit path leaves the script as it was found.
pub fn package<B: Builder + ?Sized>(
    cfg: &Config,
    plan: &Plan,
    builder: &mut B,
    cancel: &AtomicBool,
) -> Result<Report, Error> {
    write_manifest(cfg, plan)?;

    let script = LinkerScript::load(&cfg.linker.script, &cfg.linker.token)?;
    let report = driver::run(plan, script, builder, cancel)?;

    log::info!(
        "built {} application{}",
        report.built.len(),
        if report.built.len() == 1 { "" } else { "s" }
    );
    Ok(report)
}

/// Full `dist` run with the configured build command.
pub fn run(
    cfg: &Config,
    board: Option<Board>,
    cancel: &AtomicBool,
) -> Result<Report, Error> {
    let plan = plan_only(cfg, board)?;
    let mut builder = command_builder(cfg, &plan, board)?;
    package(cfg, &plan, &mut builder, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::{formatdoc, indoc};

    fn project(extra: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("src").join("bin");
        fs::create_dir_all(&bin).unwrap();
        for app in ["shell", "fs", "init"] {
            fs::write(bin.join(format!("{}.rs", app)), "fn main() {}\n")
                .unwrap();
        }
        fs::write(dir.path().join("linker.ld"), "BASE = 0x83500000;\n")
            .unwrap();

        let text = formatdoc! {r#"
            source-dir = "src/bin"
            manifest = "os/application.txt"

            [layout]
            base = 0x83500000
            stride = 0x20000
            map = "target/map.txt"

            [linker]
            script = "linker.ld"

            [build]
            command = ["true"]

            {extra}
        "#, extra = extra};
        let cfg = Config::parse(&text, dir.path()).unwrap();
        (dir, cfg)
    }

    #[test]
    fn plan_follows_the_board() {
        let (_dir, cfg) = project(indoc! {r#"
            [boards.k210]
            apps = ["shell", "init"]
        "#});

        let all = plan_only(&cfg, None).unwrap();
        assert_eq!(all.names().collect::<Vec<_>>(), ["fs", "init", "shell"]);

        let k210 = plan_only(&cfg, Some(Board::K210)).unwrap();
        assert_eq!(k210.names().collect::<Vec<_>>(), ["init", "shell"]);
        assert_eq!(k210.address_of("shell").unwrap().value(), 0x8352_0000);

        assert!(matches!(
            plan_only(&cfg, Some(Board::Qemu)),
            Err(Error::Discovery(_))
        ));
    }

    #[test]
    fn manifest_and_map_are_written() {
        let (dir, cfg) = project("");
        fs::create_dir(dir.path().join("os")).unwrap();
        let plan = plan_only(&cfg, None).unwrap();

        write_manifest(&cfg, &plan).unwrap();

        let manifest = fs::read_to_string(&cfg.manifest).unwrap();
        assert_eq!(manifest, "fs init shell");
        let map =
            fs::read_to_string(dir.path().join("target/map.txt")).unwrap();
        assert_eq!(map.lines().count(), 4);
        assert!(map.lines().nth(2).unwrap().ends_with(" init"));
    }

    #[test]
    fn command_builder_exports_the_set() {
        let (_dir, cfg) = project("");
        let plan = plan_only(&cfg, None).unwrap();
        let builder =
            command_builder(&cfg, &plan, Some(Board::Qemu)).unwrap();
        let debug = format!("{:?}", builder);
        assert!(debug.contains(r#""APPDIST_APPS": "fs,init,shell""#));
        assert!(debug.contains(r#""APPDIST_BOARD": "qemu""#));
    }
}
