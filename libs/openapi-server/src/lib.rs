//! Wire models served by the DashMaster companion HTTP API.

pub mod models;
