//! Content hashing and diffing

pub mod diff;
pub mod hash;

pub use diff::{diff, merge, ConfigDiff};
pub use hash::{hash, FileHashes};
