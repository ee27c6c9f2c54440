//! Configuration deployment and rollback

pub mod deployer;
pub mod generation;
pub mod naming;
pub mod pack;
pub mod rollback;

pub use deployer::{DeploymentEngine, UploadOutcome};
pub use pack::ConfigPack;
pub use rollback::{RollbackEngine, RollbackOutcome};
