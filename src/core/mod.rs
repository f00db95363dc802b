//! Core types: frames, retry policy, endpoint configuration, errors, and
//! the [`Transport`] trait.

pub mod constants;
mod endpoint;
mod error;
mod frame;
mod retry;
mod traits;

pub use endpoint::*;
pub use error::*;
pub use frame::Frame;
pub use retry::{Deadline, MaxAttempts, RetryPolicy};
pub use traits::{Transport, TransportKind};
