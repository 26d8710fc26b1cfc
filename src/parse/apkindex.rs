//! APKINDEX and installed-database parsing.
//!
//! Both files share the same record format: `K:value` lines, one record per
//! package, records separated by a blank line. The installed database has
//! a few more keys (file lists, checksums), which are skipped.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// One package record from an APKINDEX or `lib/apk/db/installed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub pkgname: String,
    /// Full apk version including release, e.g. `0.0.4-r10`.
    pub version: String,
    pub arch: Option<String>,
    pub origin: Option<String>,
    /// Dependency names, version constraints stripped. Conflicts keep
    /// their `!` prefix.
    pub depends: BTreeSet<String>,
    /// Provided names, versions stripped.
    pub provides: BTreeSet<String>,
}

impl PackageRecord {
    /// Split the version into `(pkgver, pkgrel)`.
    pub fn release(&self) -> (&str, &str) {
        match self.version.rsplit_once("-r") {
            Some((ver, rel)) if rel.chars().all(|c| c.is_ascii_digit()) => (ver, rel),
            _ => (self.version.as_str(), "0"),
        }
    }
}

#[derive(Default)]
struct PartialRecord {
    pkgname: Option<String>,
    version: Option<String>,
    arch: Option<String>,
    origin: Option<String>,
    depends: BTreeSet<String>,
    provides: BTreeSet<String>,
    line: usize,
}

impl PartialRecord {
    fn is_empty(&self) -> bool {
        self.pkgname.is_none() && self.version.is_none()
    }

    fn finish(self) -> Result<PackageRecord> {
        let Some(pkgname) = self.pkgname else {
            bail!("record ending at line {} has no package name (P:)", self.line);
        };
        let Some(version) = self.version else {
            bail!(
                "record '{}' ending at line {} has no version (V:)",
                pkgname,
                self.line
            );
        };
        Ok(PackageRecord {
            pkgname,
            version,
            arch: self.arch,
            origin: self.origin,
            depends: self.depends,
            provides: self.provides,
        })
    }
}

/// Strip a version constraint from a dependency or provides entry.
///
/// `so:libc.musl-x86_64.so.1=1` becomes `so:libc.musl-x86_64.so.1`,
/// `busybox>=1.36` becomes `busybox`.
pub fn strip_constraint(token: &str) -> &str {
    token
        .find(|c: char| matches!(c, '<' | '>' | '=' | '~'))
        .map(|idx| &token[..idx])
        .unwrap_or(token)
}

/// Parse the text of an APKINDEX or installed database.
pub fn parse(content: &str) -> Result<Vec<PackageRecord>> {
    let mut records = Vec::new();
    let mut current = PartialRecord::default();

    for (idx, line) in content.lines().enumerate() {
        current.line = idx + 1;
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current).finish()?);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "P" => current.pkgname = Some(value.to_string()),
            "V" => current.version = Some(value.to_string()),
            "A" => current.arch = Some(value.to_string()),
            "o" => current.origin = Some(value.to_string()),
            "D" => current.depends.extend(
                value
                    .split_whitespace()
                    .map(|d| strip_constraint(d).to_string()),
            ),
            "p" => current.provides.extend(
                value
                    .split_whitespace()
                    .map(|p| strip_constraint(p).to_string()),
            ),
            _ => {}
        }
    }

    if !current.is_empty() {
        records.push(current.finish()?);
    }

    Ok(records)
}

/// Parse an uncompressed index file. A missing file yields no records.
pub fn parse_file(path: &Path) -> Result<Vec<PackageRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse the `APKINDEX` member of an `APKINDEX.tar.gz` archive.
pub fn parse_archive(path: &Path) -> Result<Vec<PackageRecord>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read archive {}", path.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("Failed to read entry in {}", path.display()))?;
        let is_index = entry
            .path()
            .map(|p| p.as_os_str() == "APKINDEX")
            .unwrap_or(false);
        if !is_index {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read APKINDEX from {}", path.display()))?;
        return parse(&content).with_context(|| format!("Failed to parse {}", path.display()));
    }

    bail!("{} does not contain an APKINDEX file", path.display())
}
