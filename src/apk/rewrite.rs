//! Referencing locally built packages by path.
//!
//! apk skips a package whose name, version and release are already
//! installed. A local rebuild that only changed the build date would be
//! ignored, so packages that come from aports are passed to apk as the path
//! of their `.apk` file instead, which makes apk reinstall them.

use std::fmt;

use crate::arch::Arch;
use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::index::BinaryIndex;
use crate::pmaports::AportLookup;

/// Where locally built packages are visible inside a chroot, and how their
/// files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    mount: String,
}

impl ArtifactLayout {
    pub fn new(mount: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    /// Absolute in-chroot path: `<mount>/<arch>/<pkgname>-<version>.apk`.
    pub fn artifact_path(&self, arch: Arch, pkgname: &str, version: &str) -> String {
        format!(
            "{}/{}/{}-{}.apk",
            self.mount.trim_end_matches('/'),
            arch,
            pkgname,
            version
        )
    }
}

/// A package as it will be named on apk's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPackageRef {
    Name(String),
    /// In-chroot path of a locally built package.
    Path(String),
}

impl ResolvedPackageRef {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Name(s) | Self::Path(s) => s,
        }
    }
}

impl fmt::Display for ResolvedPackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn rewrite(
    to_add: &[String],
    chroot: &Chroot,
    layout: &ArtifactLayout,
    aports: &dyn AportLookup,
    index: &dyn BinaryIndex,
) -> ApkResult<Vec<ResolvedPackageRef>> {
    let mut ret = Vec::with_capacity(to_add.len());

    for package in to_add {
        if aports.find(package)?.is_none() {
            ret.push(ResolvedPackageRef::Name(package.clone()));
            continue;
        }

        // Built (or confirmed current) just before this, so it must be indexed
        let Some(record) = index.lookup(package, chroot.arch)? else {
            return Err(ApkError::MissingExpectedArtifact {
                package: package.clone(),
                arch: chroot.arch.to_string(),
            });
        };

        let apk_path = layout.artifact_path(chroot.arch, package, &record.version);
        if chroot.host_path(&apk_path).exists() {
            ret.push(ResolvedPackageRef::Path(apk_path));
        } else {
            // Binary comes from a mirror, not from the local repository
            ret.push(ResolvedPackageRef::Name(package.clone()));
        }
    }

    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apk::fakes::{FakeAports, FakeIndex};
    use crate::chroot::Suffix;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Chroot, ArtifactLayout) {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        (temp, chroot, ArtifactLayout::new("/mnt/pmbootstrap-packages"))
    }

    #[test]
    fn test_artifact_path_layout() {
        let layout = ArtifactLayout::new("/mnt/pmbootstrap-packages/");
        assert_eq!(
            layout.artifact_path(Arch::Armv7, "hello-world", "1-r8"),
            "/mnt/pmbootstrap-packages/armv7/hello-world-1-r8.apk"
        );
    }

    #[test]
    fn test_local_package_with_artifact_becomes_path() {
        let (_temp, chroot, layout) = setup();
        let aports = FakeAports::default().with("pkgname=hello-world\npkgver=1\npkgrel=8\n");
        let index = FakeIndex::default().with("P:hello-world\nV:1-r8\n\nP:musl\nV:1.2-r0\n\n");

        let artifact = chroot.host_path("/mnt/pmbootstrap-packages/x86_64/hello-world-1-r8.apk");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"apk").unwrap();

        let refs = rewrite(
            &["hello-world".into(), "musl".into()],
            &chroot,
            &layout,
            &aports,
            &index,
        )
        .unwrap();
        assert_eq!(
            refs,
            vec![
                ResolvedPackageRef::Path(
                    "/mnt/pmbootstrap-packages/x86_64/hello-world-1-r8.apk".into()
                ),
                ResolvedPackageRef::Name("musl".into()),
            ]
        );
    }

    #[test]
    fn test_local_package_without_artifact_keeps_name() {
        let (_temp, chroot, layout) = setup();
        let aports = FakeAports::default().with("pkgname=hello-world\npkgver=1\npkgrel=8\n");
        let index = FakeIndex::default().with("P:hello-world\nV:1-r8\n\n");

        let refs = rewrite(&["hello-world".into()], &chroot, &layout, &aports, &index).unwrap();
        assert_eq!(refs, vec![ResolvedPackageRef::Name("hello-world".into())]);
    }

    #[test]
    fn test_local_package_missing_from_index_fails() {
        let (_temp, chroot, layout) = setup();
        let aports = FakeAports::default().with("pkgname=hello-world\npkgver=1\npkgrel=8\n");
        let index = FakeIndex::default();

        let err = rewrite(&["hello-world".into()], &chroot, &layout, &aports, &index).unwrap_err();
        assert!(matches!(err, ApkError::MissingExpectedArtifact { ref package, .. } if package == "hello-world"));
        assert!(err.to_string().contains("subpackage"));
    }
}
