mod env;
mod http_config;
mod retry_config;

pub use env::*;
pub use http_config::*;
pub use retry_config::*;
