//! Package building.
//!
//! The installer only needs to know whether a package had to be built. The
//! build itself is delegated to an external command, see [`external`].

pub mod external;

pub use external::{is_necessary, ExternalBuilder};
