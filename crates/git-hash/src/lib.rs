//! Content identifiers for staged blobs and trees.
//!
//! Provides [`ObjectId`], the [`HashAlgorithm`] it was produced with, a
//! streaming [`hasher::Hasher`], and the hex codec used to print and parse ids.

mod algorithm;
mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use oid::ObjectId;
