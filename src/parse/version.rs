//! apk version ordering.
//!
//! Versions look like `1.2.3b_rc1_p2-r4`: dot separated numbers, an optional
//! letter, any number of `_suffix[N]` parts, an optional `~hash` and an
//! optional `-rN` release.

use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::fmt;

/// Suffix ranks. Negative ranks sort before a bare version.
const SUFFIXES: &[(&str, i8)] = &[
    ("alpha", -4),
    ("beta", -3),
    ("pre", -2),
    ("rc", -1),
    ("cvs", 1),
    ("svn", 2),
    ("git", 3),
    ("hg", 4),
    ("p", 5),
];

#[derive(Debug, Clone)]
pub struct Version {
    numbers: Vec<u64>,
    letter: Option<char>,
    suffixes: Vec<(i8, u64)>,
    hash: Option<String>,
    release: u64,
    raw: String,
}

/// Digits at `pos`, or `None` if there are none. Numbers that do not fit in
/// a `u64` are an error.
fn take_number(raw: &str, chars: &[char], pos: &mut usize) -> Result<Option<u64>> {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if start == *pos {
        return Ok(None);
    }
    let digits: String = chars[start..*pos].iter().collect();
    match digits.parse() {
        Ok(n) => Ok(Some(n)),
        Err(_) => bail!("invalid version '{}': number '{}' is too large", raw, digits),
    }
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self> {
        let (main, release) = match raw.rsplit_once("-r") {
            Some((main, rel)) if !rel.is_empty() && rel.chars().all(|c| c.is_ascii_digit()) => {
                (main, rel.parse::<u64>()?)
            }
            _ => (raw, 0),
        };

        let chars: Vec<char> = main.chars().collect();
        let mut pos = 0;

        let mut numbers = Vec::new();
        loop {
            let Some(n) = take_number(raw, &chars, &mut pos)? else {
                bail!("invalid version '{}': expected a number at offset {}", raw, pos);
            };
            numbers.push(n);
            if pos < chars.len() && chars[pos] == '.' {
                pos += 1;
                continue;
            }
            break;
        }

        let mut letter = None;
        if pos < chars.len() && chars[pos].is_ascii_lowercase() {
            letter = Some(chars[pos]);
            pos += 1;
        }

        let mut suffixes = Vec::new();
        while pos < chars.len() && chars[pos] == '_' {
            pos += 1;
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_lowercase() {
                pos += 1;
            }
            let name: String = chars[start..pos].iter().collect();
            let Some((_, rank)) = SUFFIXES.iter().find(|(s, _)| *s == name) else {
                bail!("invalid version '{}': unknown suffix '_{}'", raw, name);
            };
            let n = take_number(raw, &chars, &mut pos)?.unwrap_or(0);
            suffixes.push((*rank, n));
        }

        let mut hash = None;
        if pos < chars.len() && chars[pos] == '~' {
            let h: String = chars[pos + 1..].iter().collect();
            if h.is_empty() || !h.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("invalid version '{}': bad commit hash", raw);
            }
            hash = Some(h);
            pos = chars.len();
        }

        if pos != chars.len() {
            bail!(
                "invalid version '{}': unexpected '{}'",
                raw,
                chars[pos..].iter().collect::<String>()
            );
        }

        Ok(Self {
            numbers,
            letter,
            suffixes,
            hash,
            release,
            raw: raw.to_string(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let ord = match (self.numbers.get(i), other.numbers.get(i)) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        let ord = self.letter.cmp(&other.letter);
        if ord != Ordering::Equal {
            return ord;
        }

        let len = self.suffixes.len().max(other.suffixes.len());
        for i in 0..len {
            let a = self.suffixes.get(i).copied().unwrap_or((0, 0));
            let b = other.suffixes.get(i).copied().unwrap_or((0, 0));
            let ord = a.cmp(&b);
            if ord != Ordering::Equal {
                return ord;
            }
        }

        self.hash
            .cmp(&other.hash)
            .then(self.release.cmp(&other.release))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}
