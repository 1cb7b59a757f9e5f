use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::RangeBounds;

use rand::Rng;

use crate::dict::Dict;
use crate::error::Error;
use crate::error::Result;
use crate::skip_list::CoinFlip;
use crate::skip_list::Iter;
use crate::skip_list::LevelGenerator;
use crate::skip_list::SkipList;

/// A set of unique members ordered by score.
///
/// `SortedSet<M, S, G>` pairs a [`Dict`] mapping each member to its score with
/// a [`SkipList`] ordering `(score, member)`. The dictionary answers "what is
/// this member's score" in O(1) and the skip list answers everything about
/// order and rank in O(log n). Every mutation keeps the two in step.
///
/// Members are stored once in each structure, so `M` must be `Clone`.
///
/// # Examples
///
/// ```rust
/// # use core::hash::BuildHasher;
/// # use siphasher::sip::SipHasher;
/// #
/// # use zset_core::SortedSet;
/// #
/// # struct SimpleHasher;
/// # impl BuildHasher for SimpleHasher {
/// #     type Hasher = SipHasher;
/// #
/// #     fn build_hasher(&self) -> Self::Hasher {
/// #         SipHasher::new()
/// #     }
/// # }
/// #
/// let mut set = SortedSet::with_seed_and_hasher(7, SimpleHasher);
/// set.insert("carol", 30.0).unwrap();
/// set.insert("alice", 10.0).unwrap();
/// set.insert("bob", 20.0).unwrap();
///
/// assert_eq!(set.rank(&"bob"), Some(2));
/// assert_eq!(set.by_rank(1), Some((&"alice", 10.0)));
///
/// // Re-inserting an existing member moves it.
/// assert_eq!(set.insert("alice", 40.0), Ok(false));
/// assert_eq!(set.rank(&"alice"), Some(3));
/// ```
pub struct SortedSet<M, S, G = CoinFlip> {
    dict: Dict<M, f64, S>,
    list: SkipList<M, G>,
}

impl<M, S, G> Debug for SortedSet<M, S, G>
where
    M: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (member, score) in self.list.iter() {
            map.entry(member, &score);
        }
        map.finish()
    }
}

#[cfg(feature = "std")]
impl<M, S> SortedSet<M, S, CoinFlip>
where
    M: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            dict: Dict::with_hasher(hash_builder),
            list: SkipList::new(),
        }
    }
}

#[cfg(feature = "std")]
impl<M, S> SortedSet<M, S, CoinFlip>
where
    M: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty set with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }
}

#[cfg(feature = "std")]
impl<M, S> Default for SortedSet<M, S, CoinFlip>
where
    M: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, S> SortedSet<M, S, CoinFlip>
where
    M: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set whose skip list draws tower heights from a
    /// generator seeded with `seed`.
    pub fn with_seed_and_hasher(seed: u64, hash_builder: S) -> Self {
        Self::with_generator_and_hasher(CoinFlip::with_seed(seed), hash_builder)
    }
}

impl<M, S, G> SortedSet<M, S, G>
where
    M: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set with a custom tower height generator.
    pub fn with_generator_and_hasher(generator: G, hash_builder: S) -> Self {
        Self {
            dict: Dict::with_hasher(hash_builder),
            list: SkipList::with_generator(generator),
        }
    }
}

impl<M, S, G> SortedSet<M, S, G> {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Iterates over `(member, score)` in ascending order.
    pub fn iter(&self) -> Iter<'_, M, G> {
        self.list.iter()
    }

    /// The member-to-score dictionary.
    pub fn dict(&self) -> &Dict<M, f64, S> {
        &self.dict
    }

    /// The score-ordered skip list.
    pub fn skip_list(&self) -> &SkipList<M, G> {
        &self.list
    }

    /// The member at 1-based `rank`.
    pub fn by_rank(&self, rank: usize) -> Option<(&M, f64)> {
        self.list.get_by_rank(rank)
    }

    /// All `(member, score)` pairs whose score lies in `range`, ascending.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    pub fn range_by_score(
        &self,
        range: impl RangeBounds<f64>,
    ) -> Result<alloc::vec::Vec<(&M, f64)>> {
        Ok(self.list.range(range)?.collect())
    }
}

impl<M, S, G> SortedSet<M, S, G>
where
    M: Ord + Hash + Clone,
    S: BuildHasher,
    G: LevelGenerator,
{
    /// Adds `member` with `score`, or moves it to `score` if already present.
    ///
    /// Returns `true` if the member is new.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAllowedType`] if `score` is NaN.
    /// - [`Error::RehashOutOfRange`] if the dictionary is corrupt.
    pub fn insert(&mut self, member: M, score: f64) -> Result<bool> {
        if score.is_nan() {
            return Err(Error::NotAllowedType);
        }

        match self.dict.find(&member)?.copied() {
            Some(current) if current == score => Ok(false),
            Some(current) => {
                self.list.update_score(&member, current, score)?;
                self.dict.replace(member, score)?;
                Ok(false)
            }
            None => {
                self.dict.add(member.clone(), score)?;
                self.list.insert(member, score)?;
                Ok(true)
            }
        }
    }

    /// Removes `member`, returning its score if it was present.
    ///
    /// # Errors
    ///
    /// [`Error::RehashOutOfRange`] if the dictionary is corrupt.
    pub fn remove(&mut self, member: &M) -> Result<Option<f64>> {
        match self.dict.delete_entry(member) {
            Ok((member, score)) => {
                self.list.delete(&member, score)?;
                Ok(Some(score))
            }
            Err(Error::KeyNotFound | Error::ObjPtrNil) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The score of `member`.
    pub fn score(&self, member: &M) -> Option<f64> {
        self.dict.get(member).copied()
    }

    /// Returns `true` if `member` is in the set.
    pub fn contains(&self, member: &M) -> bool {
        self.dict.contains_key(member)
    }

    /// The 1-based rank of `member` in ascending score order.
    pub fn rank(&self, member: &M) -> Option<usize> {
        let score = self.score(member)?;
        self.list.get_rank(member, score)
    }

    /// Removes every member whose score lies in `range`. Returns the number
    /// removed.
    ///
    /// # Errors
    ///
    /// See [`SkipList::delete_range_by_score`].
    pub fn remove_range_by_score(&mut self, range: impl RangeBounds<f64>) -> Result<usize> {
        self.list.delete_range_by_score(range, &mut self.dict)
    }

    /// Removes the members ranked `start..=end` (1-based). Returns the number
    /// removed.
    ///
    /// # Errors
    ///
    /// See [`SkipList::delete_range_by_rank`].
    pub fn remove_range_by_rank(&mut self, start: usize, end: usize) -> Result<usize> {
        self.list.delete_range_by_rank(start, end, &mut self.dict)
    }

    /// A randomly chosen member and its score.
    ///
    /// Members sharing a dictionary bucket split that bucket's chance between
    /// them.
    ///
    /// # Errors
    ///
    /// [`Error::RehashOutOfRange`] if the dictionary is corrupt.
    pub fn random_member<R: Rng>(&mut self, rng: &mut R) -> Result<Option<(&M, f64)>> {
        Ok(self
            .dict
            .random_key(rng)?
            .map(|(member, score)| (member, *score)))
    }

    /// Removes every member.
    ///
    /// # Errors
    ///
    /// [`Error::RehashOutOfRange`] if the dictionary is corrupt.
    pub fn clear(&mut self) -> Result<()> {
        self.dict.rehash_to_completion()?;
        self.dict.release()?;
        self.list.clear();
        Ok(())
    }
}
