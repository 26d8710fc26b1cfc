//! Per-process bookkeeping shared by every install in one invocation.
//!
//! Created once at startup and passed by reference. Nothing here is ever
//! written to disk.

use std::collections::HashSet;

use crate::chroot::Suffix;

#[derive(Debug, Default)]
pub struct Session {
    repository_list_updated: HashSet<Suffix>,
    apk_version_checked: HashSet<Suffix>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repository_list_updated(&self, suffix: &Suffix) -> bool {
        self.repository_list_updated.contains(suffix)
    }

    pub fn mark_repository_list_updated(&mut self, suffix: &Suffix) {
        self.repository_list_updated.insert(suffix.clone());
    }

    pub fn apk_version_checked(&self, suffix: &Suffix) -> bool {
        self.apk_version_checked.contains(suffix)
    }

    pub fn mark_apk_version_checked(&mut self, suffix: &Suffix) {
        self.apk_version_checked.insert(suffix.clone());
    }
}
