//! Cloud Foundry application deployment engine
//!
//! Archive fetching, bits upload, run binding and the deployment strategies, on top of an
//! authenticated [`session::Session`].

pub mod archive;
pub mod authn;
pub mod bits;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod polling;
pub mod session;
pub mod storage;
pub mod utils;
