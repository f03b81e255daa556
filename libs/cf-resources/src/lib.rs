//! Wire models for the Cloud Foundry v2 and v3 APIs
//!
//! Only the resources the deployment engine reads or writes are modelled.

pub mod models;

pub use models::*;
