// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs the per-application builds against the patched linker script.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::alloc::{LoadAddress, Plan};
use crate::discover::Application;
use crate::error::{BuildError, Error};
use crate::linker::LinkerScript;

/// Compiles one application. Called with the linker script already patched
/// for `address`; only success or failure is observed.
pub trait Builder {
    fn build(
        &mut self,
        app: &Application,
        address: LoadAddress,
    ) -> Result<(), BuildError>;
}

/// Runs an external command once per application.
///
/// `{name}`, `{path}` and `{address}` in the arguments are replaced with the
/// application's name, source path and load address.
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    argv: Vec<String>,
    workdir: PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandBuilder {
    pub fn new(
        argv: Vec<String>,
        workdir: PathBuf,
    ) -> Result<Self, BuildError> {
        if argv.is_empty() {
            return Err(BuildError::EmptyCommand);
        }
        Ok(CommandBuilder {
            argv,
            workdir,
            env: BTreeMap::new(),
        })
    }

    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    fn command(&self, app: &Application, address: LoadAddress) -> Command {
        let expand = |arg: &str| {
            arg.replace("{name}", &app.name)
                .replace("{path}", &app.source_path.display().to_string())
                .replace("{address}", &format!("{:#x}", address.value()))
        };

        // NOTE: a relative program path combined with current_dir resolves
        // differently across platforms. Configure a bare name found on PATH
        // or an absolute path.
        let mut cmd = Command::new(expand(&self.argv[0]));
        for arg in &self.argv[1..] {
            cmd.arg(expand(arg));
        }
        cmd.current_dir(&self.workdir);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd.env("APPDIST_APP", &app.name);
        cmd.env("APPDIST_ADDRESS", format!("{:#x}", address.value()));
        cmd
    }
}

impl Builder for CommandBuilder {
    fn build(
        &mut self,
        app: &Application,
        address: LoadAddress,
    ) -> Result<(), BuildError> {
        let mut cmd = self.command(app, address);
        log::debug!("running {:?}", cmd);

        let status = cmd.status().map_err(|source| BuildError::Spawn {
            app: app.name.clone(),
            command: format!("{:?}", cmd),
            source,
        })?;
        if !status.success() {
            return Err(BuildError::Failed {
                app: app.name.clone(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// Applications built by a completed run, in build order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub built: Vec<String>,
}

/// Builds every application in `plan` in ordinal order, each against the
/// script patched with its own address.
///
/// The first failure stops the run; later applications are not attempted.
/// The script is restored before this returns, on every path.
pub fn run<B: Builder + ?Sized>(
    plan: &Plan,
    mut script: LinkerScript,
    builder: &mut B,
    cancel: &AtomicBool,
) -> Result<Report, Error> {
    let outcome = build_all(plan, &mut script, builder, cancel);
    let restored = script.restore();

    match (outcome, restored) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            // Report the build failure; the restore failure is only logged.
            log::error!("{:#}", anyhow::Error::from(restore_err));
            Err(e)
        }
    }
}

fn build_all<B: Builder + ?Sized>(
    plan: &Plan,
    script: &mut LinkerScript,
    builder: &mut B,
    cancel: &AtomicBool,
) -> Result<Report, Error> {
    let mut report = Report::default();
    let cancelled = |report: &Report| Error::Cancelled {
        built: report.built.len(),
        total: plan.len(),
    };

    for (app, address) in plan.iter() {
        if cancel.load(Ordering::SeqCst) {
            return Err(cancelled(&report));
        }

        log::info!("building {} at {}", app.name, address);
        script.patch(app.ordinal, *address)?;

        if let Err(e) = builder.build(app, *address) {
            // An interrupt kills the child too; report the interrupt.
            if cancel.load(Ordering::SeqCst) {
                log::warn!("{}", e);
                return Err(cancelled(&report));
            }
            return Err(e.into());
        }

        script.revert()?;
        report.built.push(app.name.clone());
    }

    Ok(report)
}
