//! Alpine architecture names.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X86_64,
    X86,
    Aarch64,
    Armhf,
    Armv7,
    Riscv64,
    Ppc64le,
    S390x,
}

impl Arch {
    pub const ALL: &'static [Arch] = &[
        Arch::X86_64,
        Arch::X86,
        Arch::Aarch64,
        Arch::Armhf,
        Arch::Armv7,
        Arch::Riscv64,
        Arch::Ppc64le,
        Arch::S390x,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "x86",
            Arch::Aarch64 => "aarch64",
            Arch::Armhf => "armhf",
            Arch::Armv7 => "armv7",
            Arch::Riscv64 => "riscv64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
        }
    }

    /// Architecture of the machine we are running on, in Alpine naming.
    pub fn native() -> Result<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Ok(Arch::X86_64),
            "x86" => Ok(Arch::X86),
            "aarch64" => Ok(Arch::Aarch64),
            "arm" => Ok(Arch::Armv7),
            "riscv64" => Ok(Arch::Riscv64),
            "powerpc64" => Ok(Arch::Ppc64le),
            "s390x" => Ok(Arch::S390x),
            other => bail!("unsupported host architecture '{}'", other),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Arch::ALL
            .iter()
            .copied()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| {
                let known = Arch::ALL
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::anyhow!("unknown architecture '{}'; expected one of: {}", s, known)
            })
    }
}
