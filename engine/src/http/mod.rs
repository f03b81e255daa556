//! HTTP plumbing: connection chain, API client, auxiliary API clients

pub mod auth;
pub mod client;
pub mod connection;
pub mod log_cache;
pub mod logger;
pub mod retry;
pub mod routing;
