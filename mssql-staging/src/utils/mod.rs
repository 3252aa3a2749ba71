//! Utility modules for the staging engine.

pub mod errors;
pub mod logger;

pub use errors::{CommandResultExt, EngineError, Result};
