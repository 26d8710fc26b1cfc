//! Parsers for apk metadata: package indexes, the installed database,
//! APKBUILD files and version strings.

pub mod apkbuild;
pub mod apkindex;
pub mod version;

pub use apkbuild::Apkbuild;
pub use apkindex::PackageRecord;
pub use version::Version;
