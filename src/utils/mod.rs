//! The `utils` module provides the pieces shared across `pushrelay`: the crate
//! error type and logging initialization.

pub mod error;
pub mod logging;

pub use error::RelayError;
