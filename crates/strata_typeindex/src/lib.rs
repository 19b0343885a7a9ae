//! Persistent index of the types each layer declares.
//!
//! Every layer owns a [`LayerTypeIndex`]: its declared types keyed by full
//! name and by declaring file. A [`LayerListTypeIndex`] aggregates the
//! layer indexes of one layer set and derives two reverse maps from them,
//! subtypes and the modifies-chain of every re-declared type. The reverse
//! maps are rebuilt lazily, tracked by an explicit [`ReverseIndexState`].
//! The [`TypeIndex`] ties the active and inactive sets to their files on
//! disk, one artifact per layer plus the [`LayerOrderIndex`].

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod index;
pub mod layer_index;
pub mod list;
pub mod order;
pub mod store;

pub use entry::TypeIndexEntry;
pub use error::TypeIndexError;
pub use index::TypeIndex;
pub use layer_index::LayerTypeIndex;
pub use list::{LayerListTypeIndex, ReverseIndexState};
pub use order::LayerOrderIndex;
pub use store::TypeIndexStore;
