//! Provider implementations wired into the CLI.
//!
//! The core is provider-agnostic; this module supplies the concrete
//! capability set the binary registers per type tag.

pub mod local;

pub use local::LocalProvider;
