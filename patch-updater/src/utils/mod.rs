//! Utility modules for the patch updater.

pub mod errors;
pub mod logger;
pub mod shutdown;

pub use errors::{Result, UpdaterError};
