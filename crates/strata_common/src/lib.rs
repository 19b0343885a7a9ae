//! Shared foundational types used across the strata layered build core.
//!
//! This crate provides content hashing, millisecond timestamps for staleness
//! checks, and the internal result type used for invariant violations.

#![warn(missing_docs)]

pub mod hash;
pub mod result;
pub mod timestamp;

pub use hash::{ContentHash, ParseHashError};
pub use result::{InternalError, StrataResult};
pub use timestamp::Timestamp;
