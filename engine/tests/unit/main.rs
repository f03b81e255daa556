//! Deployment engine tests against an in-memory platform

mod fake;
mod test_binder;
mod test_bits;
mod test_bluegreen;
mod test_deployer;
mod test_rolling;
mod test_standard;
mod test_token_mngr;
