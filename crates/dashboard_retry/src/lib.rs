mod attempt;
mod backoff;
mod diagnostics;
mod error;
mod executor;

pub use attempt::*;
pub use backoff::*;
pub use diagnostics::*;
pub use error::*;
pub use executor::*;
