//! Installing packages into chroots with apk.
//!
//! [`Installer::install`] is the entry point. For one request it:
//!
//! - validates the tokens and checks the chroot's apk-tools and repository list
//! - expands the request into its dependency closure ([`resolve`])
//! - builds missing or outdated aports ([`build`])
//! - references local builds by path ([`rewrite`])
//! - plans and runs the apk commands ([`plan`], [`driver`])
//!
//! Everything runs sequentially and fails fast. A failed install is redone
//! from scratch; the only state carried between calls is the [`Session`].

pub mod build;
pub mod driver;
pub mod plan;
pub mod progress;
pub mod repositories;
pub mod request;
pub mod resolve;
pub mod rewrite;

#[cfg(test)]
pub(crate) mod fakes;

use std::collections::BTreeMap;

use crate::chroot::{Chroot, Suffix};
use crate::config::Config;
use crate::error::ApkResult;
use crate::index::BinaryIndex;
use crate::parse::{apkindex, PackageRecord};
use crate::pmaports::AportLookup;
use crate::process::Privilege;
use crate::session::Session;

pub use build::{BuildDecision, BuildOutcome, BuildPolicy, BuildSubsystem};
pub use driver::{ChrootApk, PackageManager};
pub use plan::{ApkCommand, CommandPlan, VIRTUAL_GROUP};
pub use resolve::{DependencyResolver, IndexResolver};
pub use rewrite::{ArtifactLayout, ResolvedPackageRef};

/// Packages currently installed in `chroot`, keyed by name.
///
/// Read from the chroot's installed database on every call.
pub fn installed(chroot: &Chroot) -> ApkResult<BTreeMap<String, PackageRecord>> {
    let records = apkindex::parse_file(&chroot.installed_db())?;
    Ok(records
        .into_iter()
        .map(|record| (record.pkgname.clone(), record))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    pub policy: BuildPolicy,
    /// Pass `--no-network` to every apk command.
    pub offline: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            policy: BuildPolicy::Enabled,
            offline: false,
        }
    }
}

impl InstallOptions {
    /// Options for installing into `suffix` as configured.
    ///
    /// `build_pkgs_on_install = false` only restricts device chroots; build
    /// and native chroots may always build.
    pub fn from_config(config: &Config, suffix: &Suffix) -> Self {
        let device = matches!(suffix, Suffix::Rootfs(_) | Suffix::Installer(_));
        let policy = if device && !config.build_pkgs_on_install {
            BuildPolicy::Disabled
        } else {
            BuildPolicy::Enabled
        };
        Self {
            policy,
            offline: config.offline,
        }
    }
}

/// Ties the install steps to their collaborators.
pub struct Installer<'a> {
    pub config: &'a Config,
    pub privilege: &'a Privilege,
    pub resolver: &'a dyn DependencyResolver,
    pub aports: &'a dyn AportLookup,
    pub index: &'a dyn BinaryIndex,
    pub builder: &'a mut dyn BuildSubsystem,
    pub apk: &'a dyn PackageManager,
}

impl Installer<'_> {
    /// Install `packages` (and remove `!`-prefixed ones) in `chroot`.
    ///
    /// Only the requested names end up explicitly installed; dependencies
    /// are recorded as such.
    pub fn install(
        &mut self,
        session: &mut Session,
        chroot: &Chroot,
        packages: &[String],
        options: &InstallOptions,
    ) -> ApkResult<()> {
        if packages.is_empty() {
            tracing::debug!(
                "({}) install called with empty packages list, ignoring",
                chroot.suffix
            );
            return Ok(());
        }
        request::validate_tokens(packages)?;

        repositories::check_min_version(session, chroot, &self.config.apk_tools_min_version)?;
        repositories::ensure_repository_list_current(
            session,
            chroot,
            self.privilege,
            &self.config.repository_urls(),
        )?;

        let closure = self.resolver.resolve(packages, chroot)?;
        let (to_add, to_del) = request::split_to_add_del(&closure);
        request::validate_tokens(&to_add)?;
        request::validate_tokens(&to_del)?;

        let decisions = build::decide(
            &to_add,
            chroot.arch,
            options.policy,
            self.index,
            &mut *self.builder,
        )?;
        build::ensure_buildable(&decisions, chroot.arch)?;

        self.log_install_message(chroot, packages)?;

        let layout = ArtifactLayout::new(self.config.local_repo_mount.as_str());
        let resolved = rewrite::rewrite(&to_add, chroot, &layout, self.aports, self.index)?;
        let plan = plan::plan(packages, &resolved, &to_del, options.offline);
        driver::execute(&plan, chroot, self.apk)
    }

    /// Log the requested packages that are not installed yet, leaving out
    /// dependencies.
    fn log_install_message(&self, chroot: &Chroot, packages: &[String]) -> ApkResult<()> {
        let installed = installed(chroot)?;
        let mut message = format!("({}) install", chroot.suffix);
        for pkgname in request::requested_additions(packages) {
            if !installed.contains_key(&pkgname) {
                message.push(' ');
                message.push_str(&pkgname);
            }
        }
        tracing::info!("{}", message);
        Ok(())
    }
}
