//! Lookup of locally buildable package definitions ("aports").
//!
//! The aports tree is organised as `<category>/<pkgname>/APKBUILD`. A package
//! may also be a subpackage of another aport, in which case the parent aport
//! is returned.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::parse::apkbuild::{self, Apkbuild};

/// Where locally buildable definitions come from.
pub trait AportLookup {
    /// Directory of the aport providing `pkgname`, if any.
    fn find(&self, pkgname: &str) -> Result<Option<PathBuf>>;

    /// Parsed APKBUILD of the aport providing `pkgname`, if any.
    fn apkbuild(&self, pkgname: &str) -> Result<Option<Apkbuild>>;
}

/// An aports checkout on disk.
pub struct Pmaports {
    root: PathBuf,
    scanned: RefCell<Option<Vec<(PathBuf, Apkbuild)>>>,
    found: RefCell<HashMap<String, Option<PathBuf>>>,
}

impl Pmaports {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            scanned: RefCell::new(None),
            found: RefCell::new(HashMap::new()),
        }
    }

    /// Parse every APKBUILD once. Files that fail to parse are skipped with a
    /// warning so one broken aport does not hide all others.
    fn scan(&self) -> Vec<(PathBuf, Apkbuild)> {
        if let Some(scanned) = self.scanned.borrow().as_ref() {
            return scanned.clone();
        }

        let mut aports = Vec::new();
        if self.root.is_dir() {
            for entry in WalkDir::new(&self.root)
                .min_depth(2)
                .max_depth(3)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_name() != "APKBUILD" || !entry.file_type().is_file() {
                    continue;
                }
                let Some(dir) = entry.path().parent() else {
                    continue;
                };
                match apkbuild::parse_file(entry.path()) {
                    Ok(parsed) => aports.push((dir.to_path_buf(), parsed)),
                    Err(err) => tracing::warn!("skipping {}: {:#}", entry.path().display(), err),
                }
            }
        }

        *self.scanned.borrow_mut() = Some(aports.clone());
        aports
    }
}

impl AportLookup for Pmaports {
    fn find(&self, pkgname: &str) -> Result<Option<PathBuf>> {
        if let Some(hit) = self.found.borrow().get(pkgname) {
            return Ok(hit.clone());
        }

        let aports = self.scan();
        let by_dir = aports
            .iter()
            .find(|(dir, _)| dir.file_name().is_some_and(|n| n == pkgname));
        let hit = by_dir
            .or_else(|| aports.iter().find(|(_, a)| a.provides_package(pkgname)))
            .map(|(dir, _)| dir.clone());

        self.found
            .borrow_mut()
            .insert(pkgname.to_string(), hit.clone());
        Ok(hit)
    }

    fn apkbuild(&self, pkgname: &str) -> Result<Option<Apkbuild>> {
        match self.find(pkgname)? {
            Some(dir) => Ok(Some(apkbuild::parse_file(&dir.join("APKBUILD"))?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_aport(root: &Path, category: &str, name: &str, body: &str) {
        let dir = root.join(category).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("APKBUILD"), body).unwrap();
    }

    #[test]
    fn test_find_by_directory_and_subpackage() {
        let temp = TempDir::new().unwrap();
        write_aport(
            temp.path(),
            "main",
            "hello-world",
            "pkgname=hello-world\npkgver=1\npkgrel=8\nsubpackages=\"$pkgname-doc\"\n",
        );

        let aports = Pmaports::new(temp.path());
        assert_eq!(
            aports.find("hello-world").unwrap(),
            Some(temp.path().join("main/hello-world"))
        );
        assert_eq!(
            aports.find("hello-world-doc").unwrap(),
            Some(temp.path().join("main/hello-world"))
        );
        assert_eq!(aports.find("busybox").unwrap(), None);
        assert_eq!(
            aports.apkbuild("hello-world").unwrap().unwrap().version(),
            "1-r8"
        );
    }

    #[test]
    fn test_broken_aport_is_skipped() {
        let temp = TempDir::new().unwrap();
        write_aport(temp.path(), "main", "broken", "pkgname=broken\n");
        write_aport(temp.path(), "main", "ok", "pkgname=ok\npkgver=1\n");

        let aports = Pmaports::new(temp.path());
        assert_eq!(aports.find("broken").unwrap(), None);
        assert!(aports.find("ok").unwrap().is_some());
    }

    #[test]
    fn test_missing_tree_finds_nothing() {
        let temp = TempDir::new().unwrap();
        let aports = Pmaports::new(&temp.path().join("nope"));
        assert_eq!(aports.find("anything").unwrap(), None);
    }
}
