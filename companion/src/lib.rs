//! DashMaster Companion Library
//!
//! Device registry, configuration deployment with snapshot history and
//! rollback, and a live event stream for a fleet of embedded devices.

pub mod actions;
pub mod app;
pub mod content;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod logs;
pub mod registry;
pub mod server;
pub mod storage;
pub mod utils;
