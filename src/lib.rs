#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// An incrementally-rehashing dictionary.
///
/// This module provides a `Dict` built from two chained [`HashTable`]s. Growth
/// and shrinking migrate entries one bucket at a time, piggybacked on normal
/// operations, so no single call pays for a full rehash.
pub mod dict;

/// Error type shared by every structure in the crate.
pub mod error;

/// The chained hash table underneath [`Dict`].
pub mod hash_table;

pub mod skip_list;

/// A sorted set pairing a [`Dict`] with a [`SkipList`].
pub mod sorted_set;

pub use dict::Dict;
pub use error::Error;
pub use error::Result;
pub use hash_table::HashTable;
pub use skip_list::SkipList;
pub use sorted_set::SortedSet;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used when none is given.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used when none is given.
        pub type DefaultHashBuilder = std::hash::RandomState;
    }
}

/// A [`Dict`] using [`DefaultHashBuilder`].
#[cfg(any(feature = "foldhash", feature = "std"))]
pub type DefaultDict<K, V> = Dict<K, V, DefaultHashBuilder>;

/// A [`SortedSet`] using [`DefaultHashBuilder`].
#[cfg(any(feature = "foldhash", feature = "std"))]
pub type DefaultSortedSet<M> = SortedSet<M, DefaultHashBuilder>;
