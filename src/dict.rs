//! A chained hash dictionary that resizes incrementally.
//!
//! [`Dict`] owns two [`HashTable`]s. Normally only the first one is in use.
//! When the load factor crosses its threshold the dictionary allocates the
//! second table and starts *rehashing*: every subsequent `add`, `find`,
//! `delete` and `random_key` migrates one non-empty bucket from the old table
//! to the new one before doing its own work. Once the old table is empty the
//! new table takes its place. The cost of a resize is therefore spread over
//! normal traffic instead of being paid in one pause.
//!
//! While rehashing, a key may live in either table, so every lookup probes
//! the old table first and then the new one. New keys always go to the new
//! table.
//!
//! The key capabilities of a classic dictionary type map onto Rust traits:
//! hashing is done by the `S: BuildHasher`, equality by `K: Eq`, duplication
//! by `Clone` where a caller needs it and destruction by `Drop`.
//!
//! A `Dict` is not synchronized. Callers sharing one across threads must
//! serialize access themselves.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use rand::Rng;

use crate::error::Error;
use crate::error::Result;
use crate::hash_table::HashEntry;
use crate::hash_table::HashTable;

/// Bucket count of a freshly allocated primary table.
pub const DICT_HT_INITIAL_SIZE: usize = 4;

/// Load factor (`used / size`) above which the dictionary grows even when
/// resizing is disabled.
pub const DICT_FORCE_RESIZE_RATIO: usize = 5;

/// Fill percentage below which [`Dict::needs_shrink`] reports `true`.
pub const DICT_HT_MIN_FILL: usize = 10;

/// Empty buckets a single rehash step may skip per bucket it is asked to
/// migrate.
const EMPTY_VISITS_PER_STEP: usize = 10;

#[inline]
fn next_table_size(len: usize) -> usize {
    len.max(DICT_HT_INITIAL_SIZE).next_power_of_two()
}

/// An incrementally-rehashing hash dictionary.
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use zset_core::DefaultHashBuilder;
/// use zset_core::Dict;
/// use zset_core::Error;
///
/// let mut dict: Dict<&str, u32, DefaultHashBuilder> = Dict::new();
/// dict.add("one", 1).unwrap();
/// assert_eq!(dict.add("one", 10), Err(Error::KeyExists));
/// assert_eq!(dict.find(&"one"), Ok(Some(&1)));
///
/// dict.delete(&"one").unwrap();
/// assert_eq!(dict.delete(&"one"), Err(Error::KeyNotFound));
/// # }
/// ```
pub struct Dict<K, V, S> {
    ht: [HashTable<K, V>; 2],
    rehash_idx: Option<usize>,
    resize_enabled: bool,
    hash_builder: S,
}

impl<K, V, S> Debug for Dict<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Clone for Dict<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            ht: [self.ht[0].clone(), self.ht[1].clone()],
            rehash_idx: self.rehash_idx,
            resize_enabled: self.resize_enabled,
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S> Dict<K, V, S> {
    /// Total number of entries across both tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.ht[0].used() + self.ht[1].used()
    }

    /// Returns `true` if the dictionary holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while entries are being migrated to the second table.
    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    /// Position of the rehash cursor in the primary table, or `None` when no
    /// rehash is in flight.
    #[inline]
    pub fn rehash_index(&self) -> Option<usize> {
        self.rehash_idx
    }

    /// The primary table and the rehash target.
    ///
    /// The second table is unallocated unless a rehash is in flight.
    pub fn tables(&self) -> (&HashTable<K, V>, &HashTable<K, V>) {
        (&self.ht[0], &self.ht[1])
    }

    /// Whether load-factor driven resizing is enabled.
    pub fn resize_enabled(&self) -> bool {
        self.resize_enabled
    }

    /// Enables or disables load-factor driven resizing.
    ///
    /// With resizing disabled the dictionary still grows once the load factor
    /// exceeds [`DICT_FORCE_RESIZE_RATIO`], and [`Dict::shrink_to_fit`]
    /// becomes a no-op.
    pub fn set_resize_enabled(&mut self, enabled: bool) {
        self.resize_enabled = enabled;
    }

    /// Returns an iterator over all key-value pairs in both tables.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.ht[0].iter().chain(self.ht[1].iter()),
        }
    }

    /// Frees both tables and every entry in them.
    ///
    /// Refused with [`Error::RehashInProgress`] while a rehash is in flight;
    /// finish it first with [`Dict::rehash_to_completion`].
    pub fn release(&mut self) -> Result<()> {
        if self.is_rehashing() {
            log::debug!("Refusing to release dictionary mid-rehash at {:?}", self.rehash_idx);
            return Err(Error::RehashInProgress);
        }

        self.ht[0].clear();
        self.ht[1].clear();
        Ok(())
    }

    /// Returns `true` when the primary table is sparse enough that
    /// [`Dict::shrink_to_fit`] would reclaim memory.
    pub fn needs_shrink(&self) -> bool {
        let size = self.ht[0].size();
        let used = self.ht[0].used();
        size > DICT_HT_INITIAL_SIZE && used * 100 / size < DICT_HT_MIN_FILL
    }

    /// Computes a histogram of chain lengths over both tables.
    #[cfg(any(test, feature = "stats"))]
    pub fn chain_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = self.ht[0].chain_histogram();
        for (len, count) in self.ht[1].chain_histogram().into_iter().enumerate() {
            if len >= hist.len() {
                hist.resize(len + 1, 0);
            }
            hist[len] += count;
        }
        hist
    }

    /// Returns utilization statistics for the primary table and the rehash
    /// target.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> [crate::hash_table::DebugStats; 2] {
        [self.ht[0].debug_stats(), self.ht[1].debug_stats()]
    }

    fn start_rehash(&mut self, size: usize) {
        log::trace!(
            "Starting rehash from {} to {} buckets ({} entries)",
            self.ht[0].size(),
            size,
            self.ht[0].used()
        );
        self.ht[1] = HashTable::with_size(size);
        self.rehash_idx = Some(0);
    }

    fn finish_rehash(&mut self) {
        log::trace!("Rehash complete, table now has {} buckets", self.ht[1].size());
        self.ht[0] = core::mem::take(&mut self.ht[1]);
        self.rehash_idx = None;
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }

        let size = self.ht[0].size();
        if size == 0 {
            self.ht[0] = HashTable::with_size(DICT_HT_INITIAL_SIZE);
            return;
        }

        let used = self.ht[0].used();
        if (used >= size && self.resize_enabled) || used / size > DICT_FORCE_RESIZE_RATIO {
            self.start_rehash(next_table_size(used * 2));
        }
    }

    /// Begins a rehash into the smallest table that fits the current entries.
    ///
    /// Returns `false` without doing anything if a rehash is already in
    /// flight, resizing is disabled, the dictionary was never allocated or the
    /// table already has the target size.
    pub fn shrink_to_fit(&mut self) -> bool {
        if self.is_rehashing() || !self.resize_enabled || !self.ht[0].is_allocated() {
            return false;
        }

        let size = next_table_size(self.ht[0].used());
        if size == self.ht[0].size() {
            return false;
        }

        self.start_rehash(size);
        true
    }
}

impl<K, V, S> Dict<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty dictionary with the given hasher builder.
    ///
    /// No buckets are allocated until the first insertion.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a dictionary whose primary table holds at least `capacity`
    /// buckets.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let primary = if capacity == 0 {
            HashTable::new()
        } else {
            HashTable::with_size(next_table_size(capacity))
        };

        Self {
            ht: [primary, HashTable::new()],
            rehash_idx: None,
            resize_enabled: true,
            hash_builder,
        }
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn lookup(&self, hash: u64, key: &K) -> Option<&HashEntry<K, V>> {
        let found = self.ht[0].find(hash, |k| k == key);
        if found.is_some() || !self.is_rehashing() {
            return found;
        }
        self.ht[1].find(hash, |k| k == key)
    }

    fn lookup_mut(&mut self, hash: u64, key: &K) -> Option<&mut V> {
        let rehashing = self.is_rehashing();
        let [primary, target] = &mut self.ht;
        if let Some(entry) = primary.find_mut(hash, |k| k == key) {
            return Some(entry.value_mut());
        }
        if !rehashing {
            return None;
        }
        target.find_mut(hash, |k| k == key).map(|entry| entry.value_mut())
    }

    /// Migrates up to `n` non-empty buckets from the primary table to the
    /// rehash target.
    ///
    /// At most `10 * n` empty buckets are skipped in one call. Returns
    /// `Ok(true)` when no rehash is in flight any more, `Ok(false)` if
    /// buckets remain to be moved.
    ///
    /// # Errors
    ///
    /// [`Error::RehashOutOfRange`] if the cursor runs past the end of the
    /// primary table while entries remain in it. This indicates corrupted
    /// bookkeeping and is not recoverable.
    pub fn rehash(&mut self, n: usize) -> Result<bool> {
        let Some(mut idx) = self.rehash_idx else {
            return Ok(true);
        };

        let mut empty_visits = n.saturating_mul(EMPTY_VISITS_PER_STEP);
        for _ in 0..n {
            if self.ht[0].used() == 0 {
                break;
            }

            loop {
                if idx >= self.ht[0].size() {
                    log::error!(
                        "Rehash cursor {} past table of {} buckets with {} entries left",
                        idx,
                        self.ht[0].size(),
                        self.ht[0].used()
                    );
                    self.rehash_idx = Some(idx);
                    return Err(Error::RehashOutOfRange);
                }
                if self.ht[0].chain(idx).is_some() {
                    break;
                }

                idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash_idx = Some(idx);
                    return Ok(false);
                }
            }

            // Each entry is prepended to its new chain, so relative order
            // within a migrated chain is reversed.
            let mut chain = self.ht[0].take_chain(idx);
            while let Some(entry) = chain {
                let hash = self.hash_builder.hash_one(entry.key());
                chain = self.ht[1].push_entry_front(hash, entry);
            }
            idx += 1;
        }

        if self.ht[0].used() == 0 {
            self.finish_rehash();
            return Ok(true);
        }

        self.rehash_idx = Some(idx);
        Ok(false)
    }

    /// Runs rehash steps until the in-flight rehash, if any, is complete.
    pub fn rehash_to_completion(&mut self) -> Result<()> {
        while !self.rehash(100)? {}
        Ok(())
    }

    #[inline]
    fn rehash_step(&mut self) -> Result<()> {
        if self.is_rehashing() {
            self.rehash(1)?;
        }
        Ok(())
    }

    /// Inserts a new key-value pair.
    ///
    /// The entry goes to the head of its bucket chain in the rehash target if
    /// a rehash is in flight, otherwise in the primary table. May start a
    /// rehash when the primary table is full.
    ///
    /// # Errors
    ///
    /// [`Error::KeyExists`] if `key` is already present in either table.
    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        self.rehash_step()?;

        let hash = self.hash(&key);
        if self.lookup(hash, &key).is_some() {
            return Err(Error::KeyExists);
        }

        self.expand_if_needed();
        let target = if self.is_rehashing() { 1 } else { 0 };
        self.ht[target].push_front(hash, key, value);
        Ok(())
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// An existing entry keeps its place and only its value is replaced.
    /// Returns `true` if the key was newly added.
    pub fn replace(&mut self, key: K, value: V) -> Result<bool> {
        let hash = self.hash(&key);
        if let Some(slot) = self.lookup_mut(hash, &key) {
            *slot = value;
            return Ok(false);
        }

        self.add(key, value)?;
        Ok(true)
    }

    /// Looks up the value for `key`.
    ///
    /// Performs one rehash step first if a rehash is in flight; otherwise the
    /// dictionary is not modified.
    pub fn find(&mut self, key: &K) -> Result<Option<&V>> {
        if !self.ht[0].is_allocated() {
            return Ok(None);
        }

        self.rehash_step()?;
        let hash = self.hash(key);
        Ok(self.lookup(hash, key).map(HashEntry::value))
    }

    /// Like [`Dict::find`], returning a mutable reference to the value.
    pub fn find_mut(&mut self, key: &K) -> Result<Option<&mut V>> {
        if !self.ht[0].is_allocated() {
            return Ok(None);
        }

        self.rehash_step()?;
        let hash = self.hash(key);
        Ok(self.lookup_mut(hash, key))
    }

    /// Looks up the value for `key` without advancing a rehash.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.lookup(self.hash(key), key).map(HashEntry::value)
    }

    /// Returns `true` if `key` is present, without advancing a rehash.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjPtrNil`] if the dictionary has no allocated table.
    /// - [`Error::KeyNotFound`] if `key` is in neither table.
    pub fn delete(&mut self, key: &K) -> Result<V> {
        self.delete_entry(key).map(|(_, value)| value)
    }

    /// Removes `key`, returning the stored key and value.
    pub fn delete_entry(&mut self, key: &K) -> Result<(K, V)> {
        if !self.ht[0].is_allocated() {
            return Err(Error::ObjPtrNil);
        }

        self.rehash_step()?;
        let hash = self.hash(key);
        if let Some(pair) = self.ht[0].remove(hash, |k| k == key) {
            return Ok(pair);
        }
        if self.is_rehashing() {
            if let Some(pair) = self.ht[1].remove(hash, |k| k == key) {
                return Ok(pair);
            }
        }
        Err(Error::KeyNotFound)
    }

    /// Returns a random entry.
    ///
    /// A bucket is chosen uniformly among the occupied buckets of both
    /// tables, then an entry uniformly among that bucket's chain. Returns
    /// `None` when the dictionary is empty.
    pub fn random_key<R>(&mut self, rng: &mut R) -> Result<Option<(&K, &V)>>
    where
        R: Rng,
    {
        if self.is_empty() {
            return Ok(None);
        }

        self.rehash_step()?;

        let primary_size = self.ht[0].size();
        let total = primary_size + self.ht[1].size();
        // Buckets of the primary table below the cursor are already empty.
        let first = self.rehash_idx.unwrap_or(0);

        let head = loop {
            let index = rng.random_range(first..total);
            let chain = if index < primary_size {
                self.ht[0].chain(index)
            } else {
                self.ht[1].chain(index - primary_size)
            };
            if let Some(head) = chain {
                break head;
            }
        };

        let mut len = 0;
        let mut cursor = Some(head);
        while let Some(entry) = cursor {
            len += 1;
            cursor = entry.next();
        }

        let mut entry = head;
        for _ in 0..rng.random_range(0..len) {
            match entry.next() {
                Some(next) => entry = next,
                None => break,
            }
        }
        Ok(Some((entry.key(), entry.value())))
    }
}

impl<K, V, S> Dict<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty dictionary with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a dictionary with at least `capacity` buckets and a default
    /// hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for Dict<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator over the key-value pairs of a [`Dict`].
pub struct Iter<'a, K, V> {
    inner: core::iter::Chain<crate::hash_table::Iter<'a, K, V>, crate::hash_table::Iter<'a, K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
