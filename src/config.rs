//! User configuration.
//!
//! Read from `pmbootstrap.toml` in the user's config directory. Every key is
//! optional; missing keys fall back to the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::arch::Arch;
use crate::chroot::{Chroot, Suffix};

pub const CONFIG_FILENAME: &str = "pmbootstrap.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Work directory holding chroots, package repositories and caches.
    pub work: PathBuf,
    /// Checkout of the aports tree with locally buildable packages.
    /// Defaults to `<work>/cache_git/pmaports`; see [`Config::aports_dir`].
    pub aports: Option<PathBuf>,
    pub mirror_alpine: String,
    pub mirrors_postmarketos: Vec<String>,
    /// Alpine mirror directory, e.g. `edge` or `v3.19`.
    pub alpine_branch: String,
    /// postmarketOS mirror directory and local repository channel.
    pub pmaports_branch: String,
    /// Architecture of rootfs/installer chroots.
    pub device_arch: String,
    /// Refuse any network access from apk.
    pub offline: bool,
    /// Allow building packages from aports during device installation.
    pub build_pkgs_on_install: bool,
    pub apk_tools_min_version: String,
    /// Where the local package repository is mounted inside chroots.
    pub local_repo_mount: String,
    /// Command that builds one package; `--arch <arch> <pkgname>` is appended.
    pub build_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("/var/tmp"))
                .join("pmbootstrap"),
            aports: None,
            mirror_alpine: "http://dl-cdn.alpinelinux.org/alpine/".to_string(),
            mirrors_postmarketos: vec!["http://mirror.postmarketos.org/postmarketos/".to_string()],
            alpine_branch: "edge".to_string(),
            pmaports_branch: "master".to_string(),
            device_arch: "aarch64".to_string(),
            offline: false,
            build_pkgs_on_install: true,
            apk_tools_min_version: "2.14.0-r5".to_string(),
            local_repo_mount: "/mnt/pmbootstrap-packages".to_string(),
            build_command: vec!["pmbootstrap".to_string(), "build".to_string()],
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config '{}'", path.display()))
    }

    /// Load the default config file, or defaults if it does not exist.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Self::load(&path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn device_arch(&self) -> Result<Arch> {
        self.device_arch
            .parse()
            .with_context(|| format!("invalid device_arch '{}' in config", self.device_arch))
    }

    pub fn chroot(&self, suffix: Suffix) -> Result<Chroot> {
        Chroot::new(&self.work, suffix, self.device_arch()?)
    }

    pub fn aports_dir(&self) -> PathBuf {
        self.aports
            .clone()
            .unwrap_or_else(|| self.work.join("cache_git/pmaports"))
    }

    /// Host directory of the local package repository for `arch`.
    pub fn local_repo_dir(&self, arch: Arch) -> PathBuf {
        self.work
            .join("packages")
            .join(&self.pmaports_branch)
            .join(arch.as_str())
    }

    /// Host directory where apk caches downloaded indexes for `arch`.
    pub fn apk_cache_dir(&self, arch: Arch) -> PathBuf {
        self.work.join(format!("cache_apk_{}", arch))
    }

    /// Repository URLs as they should appear in a chroot's
    /// `/etc/apk/repositories`.
    ///
    /// The local repository comes first, then the postmarketOS mirrors, then
    /// Alpine (with `testing` on edge).
    pub fn repository_urls(&self) -> Vec<String> {
        let mut urls = vec![self.local_repo_mount.clone()];

        for mirror in &self.mirrors_postmarketos {
            if !mirror.is_empty() {
                urls.push(format!("{}{}", mirror, self.pmaports_branch));
            }
        }

        let mut directories = vec!["main", "community"];
        if self.alpine_branch == "edge" {
            directories.push("testing");
        }
        for dir in directories {
            urls.push(format!("{}{}/{}", self.mirror_alpine, self.alpine_branch, dir));
        }

        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_repository_urls_edge() {
        let config = Config::default();
        assert_eq!(
            config.repository_urls(),
            vec![
                "/mnt/pmbootstrap-packages",
                "http://mirror.postmarketos.org/postmarketos/master",
                "http://dl-cdn.alpinelinux.org/alpine/edge/main",
                "http://dl-cdn.alpinelinux.org/alpine/edge/community",
                "http://dl-cdn.alpinelinux.org/alpine/edge/testing",
            ]
        );
    }

    #[test]
    fn test_repository_urls_stable_without_pmos_mirror() {
        let config = Config {
            alpine_branch: "v3.19".into(),
            mirrors_postmarketos: vec![String::new()],
            ..Config::default()
        };
        let urls = config.repository_urls();
        assert_eq!(urls.len(), 3);
        assert!(urls.iter().all(|u| !u.ends_with("testing")));
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            "work = \"/srv/pmb\"\noffline = true\ndevice_arch = \"armv7\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.work, Path::new("/srv/pmb"));
        assert!(config.offline);
        assert!(config.build_pkgs_on_install);
        assert_eq!(config.device_arch().unwrap(), Arch::Armv7);
        assert_eq!(
            config.local_repo_dir(Arch::Armv7),
            Path::new("/srv/pmb/packages/master/armv7")
        );
    }

    #[test]
    fn test_aports_follows_configured_work() {
        let config: Config = toml::from_str("work = \"/srv/pmb\"\n").unwrap();
        assert_eq!(config.aports_dir(), Path::new("/srv/pmb/cache_git/pmaports"));

        let config: Config =
            toml::from_str("work = \"/srv/pmb\"\naports = \"/home/user/pmaports\"\n").unwrap();
        assert_eq!(config.aports_dir(), Path::new("/home/user/pmaports"));
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        fs::write(&path, "mirror_typo = \"x\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
