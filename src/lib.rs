//! Package installation for postmarketOS chroots.
//!
//! Chroots live under the work directory as `chroot_<suffix>` and are managed
//! with Alpine's apk. This crate decides what apk has to do for a request:
//!
//! - **Dependency expansion** - closure of a request from aports and binary indexes
//! - **Local builds** - build aports whose binary is missing or outdated
//! - **Install planning** - apk commands that keep only requested packages explicit
//! - **Execution** - apk inside the chroot, with a progress bar
//!
//! # Architecture
//!
//! ```text
//! apk::Installer
//!     │
//!     ├── DependencyResolver ── IndexResolver (pmaports + index)
//!     ├── BuildSubsystem ────── build::ExternalBuilder
//!     ├── rewrite / plan ────── pure
//!     └── PackageManager ────── apk::ChrootApk (sudo chroot ... apk)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use pmbootstrap::apk::{ChrootApk, IndexResolver, InstallOptions, Installer};
//!
//! let config = Config::load_default()?;
//! let chroot = config.chroot(Suffix::Native)?;
//! let mut installer = Installer { config: &config, /* collaborators */ };
//! installer.install(&mut session, &chroot, &["hello-world".into()], &InstallOptions::default())?;
//! ```

pub mod apk;
pub mod arch;
pub mod build;
pub mod chroot;
pub mod config;
pub mod error;
pub mod index;
pub mod parse;
pub mod pmaports;
pub mod process;
pub mod session;

pub use apk::{installed, InstallOptions, Installer};
pub use arch::Arch;
pub use chroot::{Chroot, Suffix};
pub use config::Config;
pub use error::{ApkError, ApkResult};
pub use session::Session;
