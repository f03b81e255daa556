//! API models

mod apps;
mod bindings;
mod builds;
mod common;
mod deployments;
mod jobs;
mod packages;
mod processes;
mod quotas;
mod root;
mod routes;
mod routing;

pub use apps::*;
pub use bindings::*;
pub use builds::*;
pub use common::*;
pub use deployments::*;
pub use jobs::*;
pub use packages::*;
pub use processes::*;
pub use quotas::*;
pub use root::*;
pub use routes::*;
pub use routing::*;
