//! Small pieces shared by the object store and the index crates.

pub mod error;
pub mod lockfile;

pub use error::{LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
