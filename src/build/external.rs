//! Building aports with an external build command.
//!
//! A package is rebuilt when no binary exists for the target architecture or
//! when the APKBUILD carries a newer `pkgver-rpkgrel` than the newest binary.
//! The command from the `build_command` config key gets
//! `--arch <arch> <pkgname>` appended and runs with the terminal attached.

use anyhow::{bail, Result};
use std::cmp::Ordering;

use crate::apk::{BuildOutcome, BuildSubsystem};
use crate::arch::Arch;
use crate::error::{ApkError, ApkResult};
use crate::index::BinaryIndex;
use crate::parse::{version, Apkbuild, PackageRecord};
use crate::pmaports::AportLookup;
use crate::process::Cmd;

/// Whether `apkbuild` must be built given the newest existing `binary`.
pub fn is_necessary(apkbuild: &Apkbuild, binary: Option<&PackageRecord>) -> Result<bool> {
    let Some(binary) = binary else {
        return Ok(true);
    };

    let source = apkbuild.version();
    match version::compare(&source, &binary.version)? {
        Ordering::Greater => Ok(true),
        Ordering::Equal => Ok(false),
        Ordering::Less => {
            tracing::warn!(
                "{}: binary package {} is newer than aport version {}",
                apkbuild.pkgname,
                binary.version,
                source
            );
            Ok(false)
        }
    }
}

pub struct ExternalBuilder<'a> {
    command: Vec<String>,
    aports: &'a dyn AportLookup,
    index: &'a dyn BinaryIndex,
}

impl<'a> ExternalBuilder<'a> {
    pub fn new(command: Vec<String>, aports: &'a dyn AportLookup, index: &'a dyn BinaryIndex) -> Self {
        Self {
            command,
            aports,
            index,
        }
    }

    fn cmd(&self, pkgname: &str, arch: Arch) -> Result<Cmd> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("build_command is empty, cannot build {}", pkgname);
        };
        Ok(Cmd::new(program)
            .args(args)
            .args(["--arch", arch.as_str(), pkgname])
            .allow_fail())
    }
}

impl BuildSubsystem for ExternalBuilder<'_> {
    fn build_if_necessary(&mut self, pkgname: &str, arch: Arch) -> ApkResult<BuildOutcome> {
        // Not an aport: the binary can only come from a mirror
        let Some(apkbuild) = self.aports.apkbuild(pkgname)? else {
            return Ok(BuildOutcome::Skipped);
        };

        let binary = self.index.lookup(pkgname, arch)?;
        if !is_necessary(&apkbuild, binary.as_ref())? {
            return Ok(BuildOutcome::Skipped);
        }

        tracing::info!("build {}/{}", arch, apkbuild.pkgname);
        let cmd = self.cmd(&apkbuild.pkgname, arch)?;
        let status = cmd.run_interactive()?;
        if !status.success() {
            return Err(ApkError::ExternalToolFailure {
                command: cmd.display(),
                exit_code: status.code().unwrap_or(-1),
                stderr: String::new(),
            });
        }
        Ok(BuildOutcome::Built)
    }
}
