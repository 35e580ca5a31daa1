mod client;
mod dashboard;
mod request;
mod response;
mod transport;

#[cfg(test)]
mod test_utils;

pub use client::*;
pub use dashboard::*;
pub use request::*;
pub use response::*;
pub use transport::*;
