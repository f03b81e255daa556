pub mod grant;
pub mod token;
pub mod token_mngr;
pub mod uaa;
