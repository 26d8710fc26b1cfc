//! In-memory stand-ins for the installer's collaborators.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use super::build::{BuildOutcome, BuildSubsystem};
use super::driver::PackageManager;
use super::plan::ApkCommand;
use crate::arch::Arch;
use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::index::BinaryIndex;
use crate::parse::{apkbuild, apkindex, Apkbuild, PackageRecord};
use crate::pmaports::AportLookup;

#[derive(Default)]
pub(crate) struct FakeIndex {
    pub(crate) records: HashMap<String, PackageRecord>,
}

impl FakeIndex {
    pub(crate) fn with(mut self, index_text: &str) -> Self {
        for record in apkindex::parse(index_text).unwrap() {
            self.records.insert(record.pkgname.clone(), record);
        }
        self
    }
}

impl BinaryIndex for FakeIndex {
    fn lookup(&self, pkgname: &str, _arch: Arch) -> Result<Option<PackageRecord>> {
        Ok(self.records.get(pkgname).cloned().or_else(|| {
            self.records
                .values()
                .find(|r| r.provides.contains(pkgname))
                .cloned()
        }))
    }
}

#[derive(Default)]
pub(crate) struct FakeAports {
    pub(crate) aports: HashMap<String, Apkbuild>,
}

impl FakeAports {
    pub(crate) fn with(mut self, apkbuild_text: &str) -> Self {
        let apkbuild = apkbuild::parse(apkbuild_text).unwrap();
        self.aports.insert(apkbuild.pkgname.clone(), apkbuild);
        self
    }
}

impl AportLookup for FakeAports {
    fn find(&self, pkgname: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .aports
            .contains_key(pkgname)
            .then(|| PathBuf::from("/aports/main").join(pkgname)))
    }

    fn apkbuild(&self, pkgname: &str) -> Result<Option<Apkbuild>> {
        Ok(self.aports.get(pkgname).cloned())
    }
}

/// Records every call; builds the packages listed in `builds`.
#[derive(Default)]
pub(crate) struct FakeBuilder {
    pub(crate) calls: Vec<String>,
    builds: HashSet<String>,
    fails: HashSet<String>,
}

impl FakeBuilder {
    pub(crate) fn building(mut self, names: &[&str]) -> Self {
        self.builds.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub(crate) fn failing(mut self, names: &[&str]) -> Self {
        self.fails.extend(names.iter().map(|s| s.to_string()));
        self
    }
}

impl BuildSubsystem for FakeBuilder {
    fn build_if_necessary(&mut self, pkgname: &str, _arch: Arch) -> ApkResult<BuildOutcome> {
        self.calls.push(pkgname.to_string());
        if self.fails.contains(pkgname) {
            return Err(ApkError::ExternalToolFailure {
                command: format!("build {}", pkgname),
                exit_code: 1,
                stderr: "compile error".into(),
            });
        }
        if self.builds.contains(pkgname) {
            Ok(BuildOutcome::Built)
        } else {
            Ok(BuildOutcome::Skipped)
        }
    }
}

/// Package manager that records commands instead of running apk.
///
/// Real `add` commands append each named package to the chroot's installed
/// database, with its version from `versions` or `1-r0`, so `installed()`
/// sees them afterwards.
#[derive(Default)]
pub(crate) struct RecordingApk {
    pub(crate) commands: RefCell<Vec<ApkCommand>>,
    pub(crate) versions: HashMap<String, String>,
    pub(crate) fail_on: Option<usize>,
}

impl RecordingApk {
    pub(crate) fn args(&self) -> Vec<Vec<String>> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.args.clone())
            .collect()
    }
}

impl PackageManager for RecordingApk {
    fn run(&self, chroot: &Chroot, command: &ApkCommand) -> ApkResult<()> {
        let index = self.commands.borrow().len();
        self.commands.borrow_mut().push(command.clone());
        if self.fail_on == Some(index) {
            return Err(ApkError::ExternalToolFailure {
                command: format!("apk {}", command.args.join(" ")),
                exit_code: 99,
                stderr: "ERROR: unable to select packages".into(),
            });
        }

        let args: Vec<&str> = command
            .args
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "--no-network")
            .collect();
        if args.first() != Some(&"add") || args.contains(&"--virtual") {
            return Ok(());
        }

        let db = chroot.installed_db();
        fs::create_dir_all(db.parent().unwrap()).unwrap();
        let mut content = fs::read_to_string(&db).unwrap_or_default();
        for name in &args[1..] {
            let version = self
                .versions
                .get(*name)
                .map(String::as_str)
                .unwrap_or("1-r0");
            content.push_str(&format!("P:{}\nV:{}\n\n", name, version));
        }
        fs::write(&db, content).unwrap();
        Ok(())
    }
}
