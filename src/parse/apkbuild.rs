//! Minimal APKBUILD reader.
//!
//! Only the top-level variable assignments needed to decide whether a
//! package must be built are read. The file is not evaluated as shell;
//! `$pkgname`/`${pkgname}` and `$pkgver` are substituted, nothing else.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const KEYS: &[&str] = &["pkgname", "pkgver", "pkgrel", "depends", "subpackages"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apkbuild {
    pub pkgname: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub depends: Vec<String>,
    /// Names of subpackages, without their `:function:arch` decorations.
    pub subpackages: Vec<String>,
}

impl Apkbuild {
    /// Full apk version, e.g. `1.2-r0`.
    pub fn version(&self) -> String {
        format!("{}-r{}", self.pkgver, self.pkgrel)
    }

    pub fn provides_package(&self, name: &str) -> bool {
        self.pkgname == name || self.subpackages.iter().any(|s| s == name)
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

fn substitute(value: &str, pkgname: &str, pkgver: &str) -> String {
    value
        .replace("${pkgname}", pkgname)
        .replace("$pkgname", pkgname)
        .replace("${pkgver}", pkgver)
        .replace("$pkgver", pkgver)
}

/// Collect `key=value` assignments at column zero, joining multi-line
/// quoted values.
fn assignments(content: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some((key, rest)) = line.split_once('=') else {
            continue;
        };
        if !KEYS.contains(&key) {
            continue;
        }

        let mut value = rest.to_string();
        let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'');
        if let Some(quote) = quote {
            while value.matches(quote).count() < 2 {
                match lines.next() {
                    Some(next) => {
                        value.push('\n');
                        value.push_str(next);
                    }
                    None => break,
                }
            }
        }
        out.push((key.to_string(), unquote(&value).to_string()));
    }

    out
}

pub fn parse(content: &str) -> Result<Apkbuild> {
    let mut pkgname = None;
    let mut pkgver = None;
    let mut pkgrel = None;
    let mut depends_raw = String::new();
    let mut subpackages_raw = String::new();

    for (key, value) in assignments(content) {
        match key.as_str() {
            "pkgname" => pkgname = Some(value),
            "pkgver" => pkgver = Some(value),
            "pkgrel" => pkgrel = Some(value),
            "depends" => depends_raw = value,
            "subpackages" => subpackages_raw = value,
            _ => {}
        }
    }

    let Some(pkgname) = pkgname else {
        bail!("APKBUILD has no pkgname");
    };
    let Some(pkgver) = pkgver else {
        bail!("APKBUILD for '{}' has no pkgver", pkgname);
    };
    let pkgrel = pkgrel.unwrap_or_else(|| "0".to_string());

    let depends = substitute(&depends_raw, &pkgname, &pkgver)
        .split_whitespace()
        .map(|d| super::apkindex::strip_constraint(d).to_string())
        .collect();
    let subpackages = substitute(&subpackages_raw, &pkgname, &pkgver)
        .split_whitespace()
        .map(|s| s.split(':').next().unwrap_or(s).to_string())
        .collect();

    Ok(Apkbuild {
        pkgname,
        pkgver,
        pkgrel,
        depends,
        subpackages,
    })
}

pub fn parse_file(path: &Path) -> Result<Apkbuild> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
