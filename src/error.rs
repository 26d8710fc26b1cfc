//! Error kinds surfaced by the package installation core.
//!
//! None of these are retried internally. Callers report and abort.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApkError {
    #[error("could not find package '{package}' in any configured repository (required by: {required_by})")]
    UnresolvableDependency {
        package: String,
        required_by: String,
    },

    #[error(
        "{}: no binary package found for {arch}, and compiling packages has been disabled. \
         Consider changing this option in your configuration.",
        .packages.join(", ")
    )]
    NoBinaryAvailable { packages: Vec<String>, arch: String },

    #[error(
        "{package}: could not find binary package for {arch}, although it should exist \
         at this point. Probably an APKBUILD subpackage parsing bug (multi-output package)."
    )]
    MissingExpectedArtifact { package: String, arch: String },

    #[error("invalid package name: {token}")]
    InvalidPackageToken { token: String },

    #[error("failed to update repository list: {}", .path.display())]
    RepositoryListUpdateFailure { path: PathBuf },

    #[error("{command} failed with exit code {exit_code}: {stderr}")]
    ExternalToolFailure {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(
        "apk-tools {installed} in chroot '{suffix}' is older than the required {required}. \
         Delete your http cache and zap all chroots, then try again."
    )]
    OutdatedApkTools {
        suffix: String,
        installed: String,
        required: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApkError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type ApkResult<T> = std::result::Result<T, ApkError>;
