//! Error taxonomy and JSON wire types shared across `rpcgw` crates.

pub mod error;
pub mod protocol;

pub use error::{Engine, RegistrationError, RequestError, ServeError, WriteAfterFaultError};
