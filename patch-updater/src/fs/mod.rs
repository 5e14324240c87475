//! Filesystem access for the install root.

pub mod hash;
pub mod installation;
pub mod paths;

pub use installation::{ClientInstallation, DirectoryRejection};
