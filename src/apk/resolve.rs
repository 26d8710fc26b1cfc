//! Recursive dependency expansion.
//!
//! `DependencyResolver` is the seam the installer calls through; the real
//! version/SAT resolution stays inside apk. `IndexResolver` expands names
//! breadth-first from aports and the binary index, which is all apk needs to
//! be told up front.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::index::BinaryIndex;
use crate::parse::PackageRecord;
use crate::pmaports::AportLookup;

pub trait DependencyResolver {
    /// Expand `packages` into the ordered closure for `chroot`. Removal
    /// tokens (`!name`) are carried through.
    fn resolve(&self, packages: &[String], chroot: &Chroot) -> ApkResult<Vec<String>>;
}

pub struct IndexResolver<'a> {
    aports: &'a dyn AportLookup,
    index: &'a dyn BinaryIndex,
}

impl<'a> IndexResolver<'a> {
    pub fn new(aports: &'a dyn AportLookup, index: &'a dyn BinaryIndex) -> Self {
        Self { aports, index }
    }

    /// Name to install and its dependencies. Aports win over binary
    /// packages, since they get built before installing.
    fn lookup(&self, name: &str, chroot: &Chroot) -> ApkResult<Option<(String, Vec<String>)>> {
        if let Some(apkbuild) = self.aports.apkbuild(name)? {
            return Ok(Some((name.to_string(), apkbuild.depends)));
        }
        Ok(self
            .index
            .lookup(name, chroot.arch)?
            .map(|record| (record.pkgname, record.depends.into_iter().collect())))
    }
}

fn push_unique(ret: &mut Vec<String>, token: String) {
    if !ret.contains(&token) {
        ret.push(token);
    }
}

impl DependencyResolver for IndexResolver<'_> {
    fn resolve(&self, packages: &[String], chroot: &Chroot) -> ApkResult<Vec<String>> {
        let installed: BTreeMap<String, PackageRecord> = super::installed(chroot)?;
        let is_installed = |name: &str| {
            installed.contains_key(name) || installed.values().any(|r| r.provides.contains(name))
        };

        let mut ret = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        for package in packages {
            if package.starts_with('!') {
                push_unique(&mut ret, package.clone());
            } else {
                queue.push_back((package.clone(), String::from("(requested)")));
            }
        }

        while let Some((name, required_by)) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }

            let Some((pkgname, depends)) = self.lookup(&name, chroot)? else {
                if is_installed(&name) {
                    tracing::debug!("({}) {} only provided by installed packages", chroot.suffix, name);
                    continue;
                }
                return Err(ApkError::UnresolvableDependency {
                    package: name,
                    required_by,
                });
            };

            seen.insert(pkgname.clone());
            push_unique(&mut ret, pkgname.clone());

            for depend in depends {
                if let Some(conflict) = depend.strip_prefix('!') {
                    // Only conflicts that would actually collide need removing
                    if is_installed(conflict) {
                        push_unique(&mut ret, depend.clone());
                    }
                    continue;
                }
                queue.push_back((depend, pkgname.clone()));
            }
        }

        Ok(ret)
    }
}
