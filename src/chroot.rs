//! Chroot identity and paths.
//!
//! Every chroot lives at `<work>/chroot_<suffix>`. The suffix identifies the
//! chroot for session caches and log prefixes, and determines which
//! architecture its packages are built for.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::arch::Arch;
use crate::process::{Cmd, Privilege};

/// apk's database of installed packages, relative to the chroot root.
pub const INSTALLED_DB: &str = "lib/apk/db/installed";

/// apk's list of repository URLs, relative to the chroot root.
pub const REPOSITORIES_FILE: &str = "etc/apk/repositories";

/// The apk binary, relative to the chroot root.
pub const APK_BINARY: &str = "sbin/apk";

/// PATH exported to every command run inside a chroot.
const CHROOT_PATH: &str = "PATH=/usr/bin:/usr/sbin:/bin:/sbin";

/// Which chroot we are talking about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Suffix {
    /// Host-architecture chroot used for tooling.
    Native,
    /// Foreign-architecture chroot used for building packages.
    Buildroot(Arch),
    /// Target device root filesystem.
    Rootfs(String),
    /// On-device installer image.
    Installer(String),
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suffix::Native => f.write_str("native"),
            Suffix::Buildroot(arch) => write!(f, "buildroot_{}", arch),
            Suffix::Rootfs(device) => write!(f, "rootfs_{}", device),
            Suffix::Installer(device) => write!(f, "installer_{}", device),
        }
    }
}

impl FromStr for Suffix {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "native" {
            return Ok(Suffix::Native);
        }
        if let Some(arch) = s.strip_prefix("buildroot_") {
            return Ok(Suffix::Buildroot(arch.parse()?));
        }
        if let Some(device) = s.strip_prefix("rootfs_") {
            if !device.is_empty() {
                return Ok(Suffix::Rootfs(device.to_string()));
            }
        }
        if let Some(device) = s.strip_prefix("installer_") {
            if !device.is_empty() {
                return Ok(Suffix::Installer(device.to_string()));
            }
        }
        bail!(
            "invalid chroot suffix '{}'; expected native, buildroot_<arch>, \
             rootfs_<device> or installer_<device>",
            s
        )
    }
}

/// A chroot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chroot {
    pub suffix: Suffix,
    pub path: PathBuf,
    pub arch: Arch,
}

impl Chroot {
    /// Locate the chroot for `suffix` under the work directory.
    ///
    /// Device chroots take their architecture from `device_arch`.
    pub fn new(work: &Path, suffix: Suffix, device_arch: Arch) -> Result<Self> {
        let arch = match &suffix {
            Suffix::Native => Arch::native()?,
            Suffix::Buildroot(arch) => *arch,
            Suffix::Rootfs(_) | Suffix::Installer(_) => device_arch,
        };
        Ok(Self::with_arch(work, suffix, arch))
    }

    /// Construct a chroot with an explicit architecture.
    pub fn with_arch(work: &Path, suffix: Suffix, arch: Arch) -> Self {
        let path = work.join(format!("chroot_{}", suffix));
        Self { suffix, path, arch }
    }

    /// Host path of an absolute path inside the chroot.
    pub fn host_path(&self, inner: &str) -> PathBuf {
        self.path.join(inner.trim_start_matches('/'))
    }

    pub fn installed_db(&self) -> PathBuf {
        self.host_path(INSTALLED_DB)
    }

    pub fn repositories_file(&self) -> PathBuf {
        self.host_path(REPOSITORIES_FILE)
    }

    pub fn has_apk(&self) -> bool {
        self.host_path(APK_BINARY).exists()
    }

    /// Run `argv` as root inside the chroot with a clean environment.
    pub fn root_cmd<I, S>(&self, privilege: &Privilege, argv: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        privilege
            .cmd("chroot")
            .arg_path(&self.path)
            .args(["/usr/bin/env", "-i", CHROOT_PATH, "HOME=/root"])
            .args(argv)
    }
}
