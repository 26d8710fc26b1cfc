//! Binary package index.
//!
//! Answers "which binary package version exists for this name and arch" by
//! reading every `APKINDEX*.tar.gz` in the local package repository and in
//! apk's download cache. Parsed archives are kept in memory and re-read only
//! when their modification time changes, so a package built during this
//! process shows up on the next lookup.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use crate::arch::Arch;
use crate::config::Config;
use crate::parse::apkindex::{self, PackageRecord};
use crate::parse::Version;

pub trait BinaryIndex {
    /// Newest binary package named `pkgname` (or providing it) for `arch`.
    fn lookup(&self, pkgname: &str, arch: Arch) -> Result<Option<PackageRecord>>;
}

type CachedIndex = (SystemTime, Rc<Vec<PackageRecord>>);

pub struct RepositoryIndex {
    local_repos: PathBuf,
    work: PathBuf,
    cache: RefCell<HashMap<PathBuf, CachedIndex>>,
}

impl RepositoryIndex {
    pub fn new(config: &Config) -> Self {
        Self {
            local_repos: config.work.join("packages").join(&config.pmaports_branch),
            work: config.work.clone(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn search_dirs(&self, arch: Arch) -> [PathBuf; 2] {
        [
            self.local_repos.join(arch.as_str()),
            self.work.join(format!("cache_apk_{}", arch)),
        ]
    }

    fn index_files(&self, arch: Arch) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in self.search_dirs(arch) {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)
                .with_context(|| format!("reading index directory '{}'", dir.display()))?
            {
                let path = entry
                    .with_context(|| format!("reading entry under '{}'", dir.display()))?
                    .path();
                let is_index = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("APKINDEX") && n.ends_with(".tar.gz"));
                if is_index {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn records(&self, path: &Path) -> Result<Rc<Vec<PackageRecord>>> {
        let mtime = fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading metadata of '{}'", path.display()))?;

        if let Some((cached_mtime, records)) = self.cache.borrow().get(path) {
            if *cached_mtime == mtime {
                return Ok(Rc::clone(records));
            }
        }

        tracing::debug!("parsing {}", path.display());
        let records = Rc::new(apkindex::parse_archive(path)?);
        self.cache
            .borrow_mut()
            .insert(path.to_path_buf(), (mtime, Rc::clone(&records)));
        Ok(records)
    }
}

fn newest<'a>(candidates: impl Iterator<Item = &'a PackageRecord>) -> Option<&'a PackageRecord> {
    let mut best: Option<(&PackageRecord, Version)> = None;
    for record in candidates {
        let version = match Version::parse(&record.version) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!("ignoring {} {}: {:#}", record.pkgname, record.version, err);
                continue;
            }
        };
        if best.as_ref().map_or(true, |(_, v)| version > *v) {
            best = Some((record, version));
        }
    }
    best.map(|(record, _)| record)
}

impl BinaryIndex for RepositoryIndex {
    fn lookup(&self, pkgname: &str, arch: Arch) -> Result<Option<PackageRecord>> {
        let mut all = Vec::new();
        for file in self.index_files(arch)? {
            all.push(self.records(&file)?);
        }
        let records = || all.iter().flat_map(|r| r.iter());

        let by_name = newest(records().filter(|r| r.pkgname == pkgname));
        let found = by_name.or_else(|| newest(records().filter(|r| r.provides.contains(pkgname))));
        Ok(found.cloned())
    }
}
