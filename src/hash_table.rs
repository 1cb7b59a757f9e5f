//! A bucket array of singly-linked chains.
//!
//! [`HashTable`] is the leaf storage of a [`Dict`](crate::Dict). It knows
//! nothing about rehashing: callers supply the hash of every key along with an
//! equality predicate, exactly as they would for a raw table, and the
//! dictionary decides which of its two tables an operation goes to.
//!
//! Each bucket owns the head of its chain and each entry owns the link to the
//! next entry, so dropping a bucket drops the whole chain below it. New
//! entries are pushed at the head of their chain; there is no ordering
//! guarantee across chains.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

/// Debug statistics for bucket chain analysis.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries currently in the table
    pub used: usize,
    /// Number of buckets allocated
    pub size: usize,
    /// Number of buckets holding at least one entry
    pub occupied_buckets: usize,
    /// Length of the longest chain
    pub longest_chain: usize,
    /// Load factor (used / size)
    pub load_factor: f64,
    /// Bucket utilization (occupied_buckets / size)
    pub bucket_utilization: f64,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.used,
            self.size,
            self.load_factor * 100.0
        );
        println!(
            "Bucket Usage: {}/{} ({:.2}% utilization)",
            self.occupied_buckets,
            self.size,
            self.bucket_utilization * 100.0
        );
        println!("Longest chain: {}", self.longest_chain);
    }
}

/// A single key/value pair living in a bucket chain.
pub struct HashEntry<K, V> {
    key: K,
    value: V,
    next: Option<Box<HashEntry<K, V>>>,
}

impl<K, V> HashEntry<K, V> {
    fn new(key: K, value: V, next: Option<Box<HashEntry<K, V>>>) -> Box<Self> {
        Box::new(Self { key, value, next })
    }

    /// The entry's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The entry's value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Mutable access to the entry's value.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// The next entry in the same bucket chain, if any.
    pub fn next(&self) -> Option<&HashEntry<K, V>> {
        self.next.as_deref()
    }

    fn into_pair(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K: Debug, V: Debug> Debug for HashEntry<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashEntry")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

type Chain<K, V> = Option<Box<HashEntry<K, V>>>;

/// A fixed-size array of chained buckets.
///
/// `size` is always zero or a power of two and `sizemask == size - 1`, so a
/// bucket index is `hash & sizemask`. The table never grows on its own; the
/// owning dictionary replaces it wholesale.
///
/// ## Example
///
/// ```rust
/// # use zset_core::hash_table::HashTable;
/// #
/// let mut table: HashTable<&str, u32> = HashTable::with_size(8);
/// table.push_front(0x2a, "answer", 42);
///
/// let entry = table.find(0x2a, |k| *k == "answer").unwrap();
/// assert_eq!(*entry.value(), 42);
/// assert_eq!(table.used(), 1);
/// ```
pub struct HashTable<K, V> {
    buckets: Vec<Chain<K, V>>,
    sizemask: usize,
    used: usize,
}

impl<K, V> Debug for HashTable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("size", &self.size())
            .field("sizemask", &self.sizemask)
            .field("used", &self.used)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> Clone for HashTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let mut new_table = Self::with_size(self.size());
        for (index, chain) in self.buckets.iter().enumerate() {
            // Walk to the tail first so the clone keeps the same chain order.
            let mut pairs = Vec::new();
            let mut cursor = chain.as_deref();
            while let Some(entry) = cursor {
                pairs.push((entry.key.clone(), entry.value.clone()));
                cursor = entry.next.as_deref();
            }
            for (key, value) in pairs.into_iter().rev() {
                let head = new_table.buckets[index].take();
                new_table.buckets[index] = Some(HashEntry::new(key, value, head));
                new_table.used += 1;
            }
        }

        debug_assert_eq!(new_table.used, self.used);
        new_table
    }
}

impl<K, V> Drop for HashTable<K, V> {
    fn drop(&mut self) {
        self.unlink_all();
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty, unallocated table with zero buckets.
    pub const fn new() -> Self {
        Self {
            buckets: Vec::new(),
            sizemask: 0,
            used: 0,
        }
    }

    /// Creates a table with exactly `size` empty buckets.
    ///
    /// `size` must be zero or a power of two.
    pub fn with_size(size: usize) -> Self {
        debug_assert!(
            size == 0 || size.is_power_of_two(),
            "table size {size} is not a power of two"
        );

        if size == 0 {
            return Self::new();
        }

        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Self {
            buckets,
            sizemask: size - 1,
            used: 0,
        }
    }

    /// Number of buckets.
    #[inline]
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Always `size - 1`, or zero for an unallocated table.
    #[inline]
    pub fn sizemask(&self) -> usize {
        self.sizemask
    }

    /// Number of live entries across all chains.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns `true` if the table has at least one bucket.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Returns `true` if the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Bucket index of `hash` in this table.
    #[inline]
    pub fn bucket_index(&self, hash: u64) -> usize {
        hash as usize & self.sizemask
    }

    /// Head of the chain stored in bucket `index`.
    ///
    /// Returns `None` for an empty bucket or an index past the end of the
    /// table.
    pub fn chain(&self, index: usize) -> Option<&HashEntry<K, V>> {
        self.buckets.get(index).and_then(|chain| chain.as_deref())
    }

    /// Number of entries in the chain stored in bucket `index`.
    pub fn chain_len(&self, index: usize) -> usize {
        let mut len = 0;
        let mut cursor = self.chain(index);
        while let Some(entry) = cursor {
            len += 1;
            cursor = entry.next.as_deref();
        }
        len
    }

    /// Inserts a new entry at the head of the chain for `hash`.
    ///
    /// The table must be allocated. No duplicate check is performed.
    pub fn push_front(&mut self, hash: u64, key: K, value: V) {
        debug_assert!(self.is_allocated(), "push into unallocated table");
        let index = self.bucket_index(hash);
        let head = self.buckets[index].take();
        self.buckets[index] = Some(HashEntry::new(key, value, head));
        self.used += 1;
    }

    /// Detaches the whole chain of bucket `index`, leaving the bucket empty.
    ///
    /// The detached entries are no longer counted in `used`; hand each of
    /// them to [`HashTable::push_entry_front`] on the destination table.
    pub(crate) fn take_chain(&mut self, index: usize) -> Chain<K, V> {
        let chain = self.buckets.get_mut(index)?.take();
        let mut cursor = chain.as_deref();
        while let Some(entry) = cursor {
            self.used -= 1;
            cursor = entry.next.as_deref();
        }
        chain
    }

    /// Re-links an entry detached from another table at the head of its new
    /// chain, returning whatever followed it in the old chain.
    pub(crate) fn push_entry_front(
        &mut self,
        hash: u64,
        mut entry: Box<HashEntry<K, V>>,
    ) -> Chain<K, V> {
        let rest = entry.next.take();
        let index = self.bucket_index(hash);
        entry.next = self.buckets[index].take();
        self.buckets[index] = Some(entry);
        self.used += 1;
        rest
    }

    /// Finds the entry for `hash` accepted by `eq`.
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<&HashEntry<K, V>> {
        if !self.is_allocated() {
            return None;
        }

        let mut cursor = self.buckets[self.bucket_index(hash)].as_deref();
        while let Some(entry) = cursor {
            if eq(&entry.key) {
                return Some(entry);
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    /// Finds the entry for `hash` accepted by `eq`, mutably.
    pub fn find_mut(
        &mut self,
        hash: u64,
        eq: impl Fn(&K) -> bool,
    ) -> Option<&mut HashEntry<K, V>> {
        if !self.is_allocated() {
            return None;
        }

        let index = self.bucket_index(hash);
        let mut cursor = self.buckets[index].as_deref_mut();
        while let Some(entry) = cursor {
            if eq(&entry.key) {
                return Some(entry);
            }
            cursor = entry.next.as_deref_mut();
        }
        None
    }

    /// Unlinks and returns the entry for `hash` accepted by `eq`.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        if !self.is_allocated() {
            return None;
        }

        let index = self.bucket_index(hash);
        let mut link = &mut self.buckets[index];
        loop {
            match link {
                None => return None,
                Some(entry) if eq(&entry.key) => {
                    let next = entry.next.take();
                    let removed = core::mem::replace(link, next);
                    self.used -= 1;
                    return removed.map(|entry| entry.into_pair());
                }
                Some(entry) => link = &mut entry.next,
            }
        }
    }

    /// Drops every entry and releases the bucket array.
    pub fn clear(&mut self) {
        self.unlink_all();
        self.buckets = Vec::new();
        self.sizemask = 0;
        self.used = 0;
    }

    /// Returns an iterator over all entries, bucket by bucket.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: self,
            bucket_index: 0,
            current: None,
        }
    }

    // Chains are dropped one link at a time so a long chain cannot overflow
    // the stack through recursive `Box` drops.
    fn unlink_all(&mut self) {
        for bucket in self.buckets.iter_mut() {
            let mut cursor = bucket.take();
            while let Some(mut entry) = cursor {
                cursor = entry.next.take();
            }
        }
        self.used = 0;
    }

    /// Computes a histogram of chain lengths for the current table state.
    ///
    /// Index `i` of the returned vector counts buckets whose chain holds
    /// exactly `i` entries.
    #[cfg(any(test, feature = "stats"))]
    pub fn chain_histogram(&self) -> Vec<usize> {
        let mut hist = alloc::vec![0usize; 1];
        for index in 0..self.size() {
            let len = self.chain_len(index);
            if len >= hist.len() {
                hist.resize(len + 1, 0);
            }
            hist[len] += 1;
        }
        hist
    }

    /// Returns utilization statistics for debugging.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.chain_histogram();
        let size = self.size();
        let occupied_buckets = size - hist[0];

        DebugStats {
            used: self.used,
            size,
            occupied_buckets,
            longest_chain: hist.len() - 1,
            load_factor: if size == 0 {
                0.0
            } else {
                self.used as f64 / size as f64
            },
            bucket_utilization: if size == 0 {
                0.0
            } else {
                occupied_buckets as f64 / size as f64
            },
        }
    }
}

/// An iterator over the entries of a [`HashTable`].
pub struct Iter<'a, K, V> {
    table: &'a HashTable<K, V>,
    bucket_index: usize,
    current: Option<&'a HashEntry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current {
                self.current = entry.next.as_deref();
                return Some((&entry.key, &entry.value));
            }

            if self.bucket_index >= self.table.size() {
                return None;
            }

            self.current = self.table.buckets[self.bucket_index].as_deref();
            self.bucket_index += 1;
        }
    }
}
