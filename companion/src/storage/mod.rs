//! Persistent storage: layout, settings and the snapshot store

pub mod layout;
pub mod memory;
pub mod reservations;
pub mod settings;
pub mod snapshots;

pub use memory::MemoryConfigStore;
pub use reservations::Reservations;
pub use snapshots::{ConfigStore, FsConfigStore, GenerationFiles, Snapshot};
