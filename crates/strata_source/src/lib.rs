//! Source file records, discovery under layer source roots, and hashing.
//!
//! A [`SrcRecord`] identifies one source file of one layer and carries the
//! content hash and modification time used by the incremental build tracker.
//! [`discover_sources`] walks a layer's source roots and [`SrcHasher`] turns
//! the discovered paths into records in parallel.

#![warn(missing_docs)]

pub mod discover;
pub mod hasher;
pub mod src_record;

pub use discover::{discover_sources, DiscoveredFile};
pub use hasher::SrcHasher;
pub use src_record::SrcRecord;
