//! A ranked skip list ordered by `(score, member)`.
//!
//! Every node carries a tower of forward links. Each link also records its
//! *span*: the number of level-0 steps it skips. Summing spans along the
//! search path gives a node's 1-based rank in O(log n), which is what makes
//! rank queries and rank-range deletion cheap.
//!
//! Nodes live in an arena and refer to each other by index. Forward links are
//! the structural links; `backward` and the list's `tail` are back-references
//! used only for reverse iteration and O(1) access to the last node.
//!
//! ```text
//! L2: HEAD ---------------------------> C ------------------> None
//! L1: HEAD -----------> B ------------> C ------> D --------> None
//! L0: HEAD ---> A ----> B ----> X ----> C ------> D --------> None
//! ```
//!
//! Ties in score are broken by member order, so the list is totally ordered
//! and no two nodes share the same pair. Keeping members unique across
//! different scores is the caller's job; [`SortedSet`](crate::SortedSet) does
//! it with a [`Dict`].

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Bound;
use core::ops::RangeBounds;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::dict::Dict;
use crate::error::Error;
use crate::error::Result;

/// Maximum height of a node tower.
pub const MAX_LEVEL: usize = 32;

/// Probability that a tower grows by one more level.
pub const SKIPLIST_P: f64 = 0.25;

/// Source of tower heights for new nodes.
///
/// Implementations must return a value in `1..=MAX_LEVEL`; anything else is
/// clamped into that range.
pub trait LevelGenerator {
    /// Returns the height of the next node's tower.
    fn random_level(&mut self) -> usize;
}

/// Samples tower heights by flipping a biased coin: each further level is
/// added with probability [`SKIPLIST_P`], up to [`MAX_LEVEL`].
#[derive(Debug, Clone)]
pub struct CoinFlip<R = SmallRng> {
    rng: R,
}

impl<R: Rng> CoinFlip<R> {
    /// Wraps a random number generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl CoinFlip<SmallRng> {
    /// A deterministic generator seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> LevelGenerator for CoinFlip<R> {
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.random_bool(SKIPLIST_P) {
            level += 1;
        }
        level
    }
}

type NodeId = usize;

const HEADER: NodeId = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Level {
    forward: Option<NodeId>,
    span: usize,
}

struct Node<M> {
    score: f64,
    // `None` for the header and for freed arena slots.
    member: Option<M>,
    backward: Option<NodeId>,
    levels: Vec<Level>,
}

impl<M> Node<M> {
    fn header() -> Self {
        Self {
            score: 0.0,
            member: None,
            backward: None,
            levels: vec![Level::default(); MAX_LEVEL],
        }
    }
}

/// A score interval resolved from any `RangeBounds<f64>`.
#[derive(Debug, Clone, Copy)]
struct ScoreRange {
    min: Bound<f64>,
    max: Bound<f64>,
}

impl ScoreRange {
    fn new(range: &impl RangeBounds<f64>) -> Result<Self> {
        let min = range.start_bound().cloned();
        let max = range.end_bound().cloned();

        let is_nan = |bound: &Bound<f64>| matches!(bound, Bound::Included(v) | Bound::Excluded(v) if v.is_nan());
        if is_nan(&min) || is_nan(&max) {
            return Err(Error::OutOfRange);
        }

        let valid = match (min, max) {
            (Bound::Included(lo), Bound::Included(hi)) => lo <= hi,
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
                lo < hi
            }
            _ => true,
        };
        if !valid {
            return Err(Error::OutOfRange);
        }

        Ok(Self { min, max })
    }

    #[inline]
    fn gte_min(&self, score: f64) -> bool {
        match self.min {
            Bound::Included(min) => score >= min,
            Bound::Excluded(min) => score > min,
            Bound::Unbounded => true,
        }
    }

    #[inline]
    fn lte_max(&self, score: f64) -> bool {
        match self.max {
            Bound::Included(max) => score <= max,
            Bound::Excluded(max) => score < max,
            Bound::Unbounded => true,
        }
    }
}

/// A skip list of `(member, score)` pairs with O(log n) rank queries.
///
/// ```rust
/// use zset_core::SkipList;
///
/// let mut list = SkipList::with_seed(42);
/// list.insert("b", 2.0).unwrap();
/// list.insert("a", 1.0).unwrap();
/// list.insert("c", 1.0).unwrap();
///
/// let order: Vec<_> = list.iter().map(|(m, _)| *m).collect();
/// assert_eq!(order, ["a", "c", "b"]);
/// assert_eq!(list.get_rank(&"b", 2.0), Some(3));
/// assert_eq!(list.get_by_rank(2), Some((&"c", 1.0)));
/// ```
///
/// Removed nodes free their member and tower at once, but their arena slot is
/// kept for the next insert. Call [`SkipList::shrink_to_fit`] to release
/// slots after deleting a large share of the list.
pub struct SkipList<M, G = CoinFlip> {
    nodes: Vec<Node<M>>,
    free: Vec<NodeId>,
    tail: Option<NodeId>,
    level: usize,
    length: usize,
    generator: G,
}

impl<M, G> Debug for SkipList<M, G>
where
    M: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(feature = "std")]
impl<M> SkipList<M, CoinFlip> {
    /// Creates an empty skip list whose tower heights are drawn from an
    /// OS-seeded generator.
    pub fn new() -> Self {
        Self::with_generator(CoinFlip::new(SmallRng::from_os_rng()))
    }
}

#[cfg(feature = "std")]
impl<M> Default for SkipList<M, CoinFlip> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> SkipList<M, CoinFlip> {
    /// Creates an empty skip list with deterministic tower heights.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_generator(CoinFlip::with_seed(seed))
    }
}

impl<M, G> SkipList<M, G> {
    /// Creates an empty skip list drawing tower heights from `generator`.
    pub fn with_generator(generator: G) -> Self {
        Self {
            nodes: vec![Node::header()],
            free: Vec::new(),
            tail: None,
            level: 1,
            length: 0,
            generator,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the list holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Height of the tallest tower currently in the list, at least 1.
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// The element with the lowest `(score, member)`.
    pub fn first(&self) -> Option<(&M, f64)> {
        self.nodes[HEADER].levels[0].forward.and_then(|id| self.entry(id))
    }

    /// The element with the highest `(score, member)`.
    pub fn last(&self) -> Option<(&M, f64)> {
        self.tail.and_then(|id| self.entry(id))
    }

    /// Returns an iterator in ascending order. It can be reversed.
    pub fn iter(&self) -> Iter<'_, M, G> {
        Iter {
            list: self,
            front: self.nodes[HEADER].levels[0].forward,
            back: self.tail,
            remaining: self.length,
        }
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[HEADER] = Node::header();
        self.free.clear();
        self.tail = None;
        self.level = 1;
        self.length = 0;
    }

    #[inline]
    fn entry(&self, id: NodeId) -> Option<(&M, f64)> {
        let node = &self.nodes[id];
        node.member.as_ref().map(|member| (member, node.score))
    }

    #[inline]
    fn forward(&self, id: NodeId, level: usize) -> Option<NodeId> {
        self.nodes[id].levels[level].forward
    }

    #[inline]
    fn span(&self, id: NodeId, level: usize) -> usize {
        self.nodes[id].levels[level].span
    }

    #[inline]
    fn score(&self, id: NodeId) -> f64 {
        self.nodes[id].score
    }

    fn alloc(&mut self, member: M, score: f64, height: usize) -> NodeId {
        let node = Node {
            score,
            member: Some(member),
            backward: None,
            levels: vec![Level::default(); height],
        };

        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Splices `id` out of every level, given the last node before it on
    /// each level, and frees its slot. Returns the member it held.
    fn unlink(&mut self, id: NodeId, update: &[NodeId; MAX_LEVEL]) -> Option<M> {
        let height = self.nodes[id].levels.len();
        for (i, &prev) in update.iter().enumerate().take(height) {
            debug_assert_eq!(self.forward(prev, i), Some(id));
            let removed = self.nodes[id].levels[i];
            let link = &mut self.nodes[prev].levels[i];
            link.span = link.span + removed.span - 1;
            link.forward = removed.forward;
        }
        // Taller edges jump over the removed node without pointing at it.
        for (i, &prev) in update.iter().enumerate().take(self.level).skip(height) {
            self.nodes[prev].levels[i].span -= 1;
        }

        let backward = self.nodes[id].backward;
        match self.forward(id, 0) {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }

        while self.level > 1 && self.forward(HEADER, self.level - 1).is_none() {
            self.level -= 1;
        }
        self.length -= 1;

        let node = &mut self.nodes[id];
        node.levels = Vec::new();
        node.backward = None;
        let member = node.member.take();
        if self.length == 0 {
            // Only the header is left alive.
            self.nodes.truncate(1);
            self.free.clear();
        } else {
            self.free.push(id);
        }
        member
    }

    /// Number of arena slots in use or waiting for reuse, header included.
    #[cfg(any(test, feature = "stats"))]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Compacts the node arena so it holds exactly the live nodes.
    ///
    /// Freed slots are otherwise kept for reuse by later inserts, so after a
    /// large range delete the arena stays at its high-water mark until this is
    /// called or the list empties. Runs in O(n).
    pub fn shrink_to_fit(&mut self) {
        if self.free.is_empty() {
            self.nodes.shrink_to_fit();
            return;
        }

        // Live nodes are renumbered in list order, the header keeps slot 0.
        let mut remap = vec![usize::MAX; self.nodes.len()];
        remap[HEADER] = HEADER;
        let mut live = 1;
        let mut x = self.forward(HEADER, 0);
        while let Some(id) = x {
            remap[id] = live;
            live += 1;
            x = self.forward(id, 0);
        }

        let mut slots: Vec<Option<Node<M>>> = (0..live).map(|_| None).collect();
        for (old, mut node) in core::mem::take(&mut self.nodes).into_iter().enumerate() {
            let new = remap[old];
            if new == usize::MAX {
                continue;
            }
            for level in node.levels.iter_mut() {
                level.forward = level.forward.map(|f| remap[f]);
            }
            node.backward = node.backward.map(|b| remap[b]);
            slots[new] = Some(node);
        }

        self.nodes = slots.into_iter().flatten().collect();
        self.tail = self.tail.map(|t| remap[t]);
        self.free = Vec::new();
    }

    fn is_in_score_range(&self, range: &ScoreRange) -> bool {
        match (self.tail, self.forward(HEADER, 0)) {
            (Some(last), Some(first)) => {
                range.gte_min(self.score(last)) && range.lte_max(self.score(first))
            }
            _ => false,
        }
    }

    /// Returns `true` if some part of the list may fall inside `range`,
    /// judging only by the lowest and highest scores.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    pub fn is_in_range(&self, range: impl RangeBounds<f64>) -> Result<bool> {
        let range = ScoreRange::new(&range)?;
        Ok(self.is_in_score_range(&range))
    }

    /// Locates the lowest node in `range` and its rank.
    fn first_node_in(&self, range: &ScoreRange) -> Option<(NodeId, usize)> {
        if !self.is_in_score_range(range) {
            return None;
        }

        let mut rank = 0;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if range.gte_min(self.score(next)) {
                    break;
                }
                rank += self.span(x, i);
                x = next;
            }
        }

        self.forward(x, 0)
            .filter(|&first| range.lte_max(self.score(first)))
            .map(|first| (first, rank + 1))
    }

    /// Locates the highest node in `range` and its rank.
    fn last_node_in(&self, range: &ScoreRange) -> Option<(NodeId, usize)> {
        if !self.is_in_score_range(range) {
            return None;
        }

        let mut rank = 0;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !range.lte_max(self.score(next)) {
                    break;
                }
                rank += self.span(x, i);
                x = next;
            }
        }

        if x == HEADER || !range.gte_min(self.score(x)) {
            return None;
        }
        Some((x, rank))
    }

    /// The lowest element whose score lies in `range`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    pub fn first_in_range(&self, range: impl RangeBounds<f64>) -> Result<Option<(&M, f64)>> {
        let range = ScoreRange::new(&range)?;
        Ok(self
            .first_node_in(&range)
            .and_then(|(id, _)| self.entry(id)))
    }

    /// The highest element whose score lies in `range`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    pub fn last_in_range(&self, range: impl RangeBounds<f64>) -> Result<Option<(&M, f64)>> {
        let range = ScoreRange::new(&range)?;
        Ok(self
            .last_node_in(&range)
            .and_then(|(id, _)| self.entry(id)))
    }

    /// Iterates over the elements whose score lies in `range`, in ascending
    /// order.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    pub fn range(&self, range: impl RangeBounds<f64>) -> Result<Iter<'_, M, G>> {
        let range = ScoreRange::new(&range)?;
        let iter = match (self.first_node_in(&range), self.last_node_in(&range)) {
            (Some((front, lo)), Some((back, hi))) if lo <= hi => Iter {
                list: self,
                front: Some(front),
                back: Some(back),
                remaining: hi - lo + 1,
            },
            _ => Iter {
                list: self,
                front: None,
                back: None,
                remaining: 0,
            },
        };
        Ok(iter)
    }

    /// The element at 1-based `rank`, or `None` if `rank` is 0 or past the
    /// end.
    pub fn get_by_rank(&self, rank: usize) -> Option<(&M, f64)> {
        if rank == 0 || rank > self.length {
            return None;
        }

        let mut traversed = 0;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) > rank {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            if traversed == rank {
                return self.entry(x);
            }
        }
        None
    }
}

impl<M, G> SkipList<M, G>
where
    M: Ord,
{
    /// `true` if node `id` sorts strictly before `(score, member)`.
    #[inline]
    fn precedes(&self, id: NodeId, score: f64, member: &M) -> bool {
        let node = &self.nodes[id];
        match &node.member {
            Some(m) => node.score < score || (node.score == score && m < member),
            None => false,
        }
    }

    #[inline]
    fn holds(&self, id: NodeId, score: f64, member: &M) -> bool {
        let node = &self.nodes[id];
        node.score == score && node.member.as_ref() == Some(member)
    }

    /// Walks down from the top level, recording on each level the last node
    /// strictly before `(score, member)`. Returns the level-0 predecessor.
    fn find_update(&self, score: f64, member: &M, update: &mut [NodeId; MAX_LEVEL]) -> NodeId {
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !self.precedes(next, score, member) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }
        x
    }

    /// Returns `true` if the exact `(score, member)` pair is present.
    pub fn contains(&self, member: &M, score: f64) -> bool {
        let mut update = [HEADER; MAX_LEVEL];
        let x = self.find_update(score, member, &mut update);
        self.forward(x, 0)
            .is_some_and(|next| self.holds(next, score, member))
    }

    /// Removes the node holding exactly `(score, member)` and returns its
    /// member.
    ///
    /// # Errors
    ///
    /// [`Error::MemberNotFound`] if no node holds that pair.
    pub fn delete(&mut self, member: &M, score: f64) -> Result<M> {
        let mut update = [HEADER; MAX_LEVEL];
        let x = self.find_update(score, member, &mut update);
        match self.forward(x, 0) {
            Some(target) if self.holds(target, score, member) => {
                self.unlink(target, &update).ok_or(Error::MemberNotFound)
            }
            _ => Err(Error::MemberNotFound),
        }
    }

    /// The 1-based rank of `(score, member)`, or `None` if the pair is
    /// absent.
    pub fn get_rank(&self, member: &M, score: f64) -> Option<usize> {
        let mut rank = 0;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !(self.precedes(next, score, member) || self.holds(next, score, member)) {
                    break;
                }
                rank += self.span(x, i);
                x = next;
            }
            if x != HEADER && self.holds(x, score, member) {
                return Some(rank);
            }
        }
        None
    }

    /// Removes every element whose score lies in `range` from the list and
    /// the member of each from `dict`. Returns the number removed.
    ///
    /// Each node leaves the skip list before its member is deleted from the
    /// dictionary. Members missing from the dictionary are skipped and
    /// counted in a single warning.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `range` is empty or has a NaN bound.
    /// - Any dictionary error other than a miss, such as
    ///   [`Error::RehashOutOfRange`]. Nodes removed before it stay removed.
    pub fn delete_range_by_score<V, S>(
        &mut self,
        range: impl RangeBounds<f64>,
        dict: &mut Dict<M, V, S>,
    ) -> Result<usize>
    where
        M: Hash,
        S: BuildHasher,
    {
        let range = ScoreRange::new(&range)?;
        if !self.is_in_score_range(&range) {
            return Ok(0);
        }

        let mut update = [HEADER; MAX_LEVEL];
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if range.gte_min(self.score(next)) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        let mut removed = 0;
        let mut missing = 0;
        let mut cursor = self.forward(x, 0);
        while let Some(id) = cursor {
            if !range.lte_max(self.score(id)) {
                break;
            }
            cursor = self.forward(id, 0);
            let member = self.unlink(id, &update);
            removed += 1;
            if let Some(member) = member {
                if !forget(dict, &member)? {
                    missing += 1;
                }
            }
        }
        warn_missing(missing, removed, dict.len());
        Ok(removed)
    }

    /// Removes the elements ranked `start..=end` (1-based) from the list and
    /// their members from `dict`. Returns the number removed.
    ///
    /// `end` past the last rank is clamped.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `start` is 0 or greater than `end`.
    /// - Any dictionary error other than a miss.
    pub fn delete_range_by_rank<V, S>(
        &mut self,
        start: usize,
        end: usize,
        dict: &mut Dict<M, V, S>,
    ) -> Result<usize>
    where
        M: Hash,
        S: BuildHasher,
    {
        if start == 0 || start > end {
            return Err(Error::OutOfRange);
        }

        let mut update = [HEADER; MAX_LEVEL];
        let mut traversed = 0;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) >= start {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        let mut removed = 0;
        let mut missing = 0;
        let mut rank = traversed + 1;
        let mut cursor = self.forward(x, 0);
        while let Some(id) = cursor {
            if rank > end {
                break;
            }
            cursor = self.forward(id, 0);
            let member = self.unlink(id, &update);
            removed += 1;
            rank += 1;
            if let Some(member) = member {
                if !forget(dict, &member)? {
                    missing += 1;
                }
            }
        }
        warn_missing(missing, removed, dict.len());
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn validate(&self) {
        let mut rank_of = vec![usize::MAX; self.nodes.len()];
        let mut prev: Option<NodeId> = None;
        let mut x = self.forward(HEADER, 0);
        let mut rank = 0;
        while let Some(id) = x {
            rank += 1;
            rank_of[id] = rank;
            assert_eq!(self.nodes[id].backward, prev, "backward link of rank {rank}");
            if let Some(p) = prev {
                let (pm, ps) = (self.nodes[p].member.as_ref(), self.score(p));
                let (m, s) = (self.nodes[id].member.as_ref(), self.score(id));
                assert!(ps < s || (ps == s && pm < m), "order broken at rank {rank}");
            }
            prev = Some(id);
            x = self.forward(id, 0);
        }
        assert_eq!(rank, self.length);
        assert_eq!(self.tail, prev);
        assert!(self.level >= 1);

        for i in 0..self.level {
            let mut pos = 0;
            let mut x = HEADER;
            loop {
                let span = self.span(x, i);
                match self.forward(x, i) {
                    Some(next) => {
                        assert!(self.nodes[next].levels.len() > i);
                        pos += span;
                        assert_eq!(pos, rank_of[next], "span mismatch on level {i}");
                        x = next;
                    }
                    None => {
                        assert_eq!(span, self.length - pos, "tail span on level {i}");
                        break;
                    }
                }
            }
        }
        if self.level > 1 {
            assert!(self.forward(HEADER, self.level - 1).is_some());
        }
    }
}

impl<M, G> SkipList<M, G>
where
    M: Ord,
    G: LevelGenerator,
{
    /// Inserts `member` with `score`.
    ///
    /// # Errors
    ///
    /// - [`Error::SkipNodeExists`] if the exact pair is already present.
    /// - [`Error::NotAllowedType`] if `score` is NaN.
    pub fn insert(&mut self, member: M, score: f64) -> Result<()> {
        if score.is_nan() {
            return Err(Error::NotAllowedType);
        }

        let mut update = [HEADER; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.forward(x, i) {
                if !self.precedes(next, score, &member) {
                    break;
                }
                rank[i] += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        if self
            .forward(x, 0)
            .is_some_and(|next| self.holds(next, score, &member))
        {
            return Err(Error::SkipNodeExists);
        }

        let height = self.generator.random_level().clamp(1, MAX_LEVEL);
        if height > self.level {
            for i in self.level..height {
                rank[i] = 0;
                update[i] = HEADER;
                self.nodes[HEADER].levels[i].span = self.length;
            }
            self.level = height;
        }

        let id = self.alloc(member, score, height);
        for i in 0..height {
            let prev = self.nodes[update[i]].levels[i];
            let skipped = rank[0] - rank[i];
            self.nodes[id].levels[i] = Level {
                forward: prev.forward,
                span: prev.span - skipped,
            };
            self.nodes[update[i]].levels[i] = Level {
                forward: Some(id),
                span: skipped + 1,
            };
        }
        for i in height..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[id].backward = if update[0] == HEADER {
            None
        } else {
            Some(update[0])
        };
        match self.forward(id, 0) {
            Some(next) => self.nodes[next].backward = Some(id),
            None => self.tail = Some(id),
        }
        self.length += 1;
        Ok(())
    }

    /// Moves `member` from `cur_score` to `new_score`.
    ///
    /// The node is updated in place when its neighbours still bracket the new
    /// score, otherwise it is removed and reinserted.
    ///
    /// # Errors
    ///
    /// - [`Error::MemberNotFound`] if `(cur_score, member)` is absent.
    /// - [`Error::NotAllowedType`] if `new_score` is NaN.
    pub fn update_score(&mut self, member: &M, cur_score: f64, new_score: f64) -> Result<()> {
        if new_score.is_nan() {
            return Err(Error::NotAllowedType);
        }

        let mut update = [HEADER; MAX_LEVEL];
        let x = self.find_update(cur_score, member, &mut update);
        let target = match self.forward(x, 0) {
            Some(target) if self.holds(target, cur_score, member) => target,
            _ => return Err(Error::MemberNotFound),
        };

        let fits_after = self.nodes[target]
            .backward
            .is_none_or(|prev| self.score(prev) < new_score);
        let fits_before = self
            .forward(target, 0)
            .is_none_or(|next| self.score(next) > new_score);
        if fits_after && fits_before {
            self.nodes[target].score = new_score;
            return Ok(());
        }

        let member = self
            .unlink(target, &update)
            .ok_or(Error::MemberNotFound)?;
        self.insert(member, new_score)
    }
}

/// Deletes `member` from `dict`. Returns `Ok(false)` if it was not there.
fn forget<M, V, S>(dict: &mut Dict<M, V, S>, member: &M) -> Result<bool>
where
    M: Hash + Eq,
    S: BuildHasher,
{
    match dict.delete(member) {
        Ok(_) => Ok(true),
        Err(Error::KeyNotFound | Error::ObjPtrNil) => Ok(false),
        Err(err) => Err(err),
    }
}

fn warn_missing(missing: usize, removed: usize, dict_len: usize) {
    if missing > 0 {
        log::warn!(
            "Range delete removed {removed} skip list nodes but {missing} of their members were \
             missing from the dictionary ({dict_len} entries left)"
        );
    }
}

/// An iterator over the elements of a [`SkipList`] in ascending order.
pub struct Iter<'a, M, G> {
    list: &'a SkipList<M, G>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<'a, M, G> Iterator for Iter<'a, M, G> {
    type Item = (&'a M, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front?;
        self.front = self.list.forward(id, 0);
        self.remaining -= 1;
        self.list.entry(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<M, G> DoubleEndedIterator for Iter<'_, M, G> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back?;
        self.back = self.list.nodes[id].backward;
        self.remaining -= 1;
        self.list.entry(id)
    }
}

impl<M, G> ExactSizeIterator for Iter<'_, M, G> {}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeSet;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    use rand::RngCore;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;
    use test_log::test;

    use super::*;

    /// Hands out a scripted sequence of tower heights, then height 1.
    struct FixedLevels {
        levels: Vec<usize>,
        next: usize,
    }

    impl FixedLevels {
        fn new(levels: &[usize]) -> Self {
            Self {
                levels: levels.to_vec(),
                next: 0,
            }
        }
    }

    impl LevelGenerator for FixedLevels {
        fn random_level(&mut self) -> usize {
            let level = self.levels.get(self.next).copied().unwrap_or(1);
            self.next += 1;
            level
        }
    }

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    fn members<G>(list: &SkipList<String, G>) -> Vec<(String, f64)> {
        list.iter().map(|(m, s)| (m.clone(), s)).collect()
    }

    /// Builds a list and a dictionary holding `m0..m{n}` with score `i`.
    fn paired(n: usize, seed: u64) -> (SkipList<String>, Dict<String, f64, SipHashBuilder>) {
        let mut list = SkipList::with_seed(seed);
        let mut dict = Dict::new();
        for i in 0..n {
            let member = alloc::format!("m{i:03}");
            dict.add(member.clone(), i as f64).unwrap();
            list.insert(member, i as f64).unwrap();
        }
        (list, dict)
    }

    #[test]
    fn test_empty() {
        let list: SkipList<String> = SkipList::with_seed(1);
        assert!(list.is_empty());
        assert_eq!(list.level(), 1);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert_eq!(list.get_by_rank(1), None);
        assert_eq!(list.first_in_range(..), Ok(None));
        list.validate();
    }

    #[test]
    fn test_tie_break_orders_by_member() {
        let mut list = SkipList::with_seed(7);
        list.insert("b".to_string(), 2.0).unwrap();
        list.insert("a".to_string(), 1.0).unwrap();
        list.insert("c".to_string(), 1.0).unwrap();
        list.validate();

        assert_eq!(
            members(&list),
            vec![
                ("a".to_string(), 1.0),
                ("c".to_string(), 1.0),
                ("b".to_string(), 2.0)
            ]
        );
        assert_eq!(list.get_rank(&"b".to_string(), 2.0), Some(3));
        assert_eq!(list.get_rank(&"a".to_string(), 1.0), Some(1));
        assert_eq!(list.get_rank(&"a".to_string(), 2.0), None);
        assert_eq!(list.first(), Some((&"a".to_string(), 1.0)));
        assert_eq!(list.last(), Some((&"b".to_string(), 2.0)));
    }

    #[test]
    fn test_duplicate_and_missing() {
        let mut list = SkipList::with_seed(3);
        list.insert(10u32, 1.5).unwrap();
        assert_eq!(list.insert(10, 1.5), Err(Error::SkipNodeExists));
        // Same member with a different score is a different pair.
        assert_eq!(list.insert(10, 2.5), Ok(()));
        assert_eq!(list.len(), 2);

        assert_eq!(list.delete(&10, 9.0), Err(Error::MemberNotFound));
        assert_eq!(list.delete(&11, 1.5), Err(Error::MemberNotFound));
        assert_eq!(list.delete(&10, 1.5), Ok(10));
        assert_eq!(list.delete(&10, 1.5), Err(Error::MemberNotFound));
        assert_eq!(list.len(), 1);
        list.validate();
    }

    #[test]
    fn test_nan_score_rejected() {
        let mut list = SkipList::with_seed(3);
        assert_eq!(list.insert(1u32, f64::NAN), Err(Error::NotAllowedType));
        list.insert(1u32, 1.0).unwrap();
        assert_eq!(
            list.update_score(&1, 1.0, f64::NAN),
            Err(Error::NotAllowedType)
        );
        assert!(list.contains(&1, 1.0));
    }

    #[test]
    fn test_forced_heights_and_spans() {
        let mut list = SkipList::with_generator(FixedLevels::new(&[3, 1, 2, 1, 4]));
        for (i, member) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            list.insert(member, i as f64).unwrap();
            list.validate();
        }
        assert_eq!(list.level(), 4);

        // "a" is 3 levels tall and "e" is 4: the level-2 edge from "a" skips
        // b, c, d and lands on e.
        let a = list.nodes[HEADER].levels[0].forward.unwrap();
        assert_eq!(list.nodes[a].levels.len(), 3);
        assert_eq!(list.span(a, 2), 4);
        assert_eq!(list.span(a, 1), 2);

        for (rank, member) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            assert_eq!(list.get_rank(&member, rank as f64), Some(rank + 1));
        }

        // Removing the only level-4 node lowers the list level.
        list.delete(&"e", 4.0).unwrap();
        list.validate();
        assert_eq!(list.level(), 3);
    }

    #[test]
    fn test_delete_decrements_taller_spans() {
        let mut list = SkipList::with_generator(FixedLevels::new(&[4, 1, 1, 4]));
        for (i, member) in [1u32, 2, 3, 4].into_iter().enumerate() {
            list.insert(member, i as f64).unwrap();
        }
        let first = list.forward(HEADER, 0).unwrap();
        assert_eq!(list.span(first, 3), 3);

        list.delete(&2, 1.0).unwrap();
        list.validate();
        assert_eq!(list.span(first, 3), 2);
        assert_eq!(list.get_rank(&4, 3.0), Some(3));
    }

    #[test]
    fn test_get_by_rank_inverts_get_rank() {
        let mut list = SkipList::with_seed(0xfeed);
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..500 {
            let member = rng.next_u32() % 1000;
            let score = f64::from(rng.next_u32() % 50);
            let _ = list.insert(member, score);
        }
        list.validate();

        for rank in 1..=list.len() {
            let (member, score) = list.get_by_rank(rank).unwrap();
            assert_eq!(list.get_rank(member, score), Some(rank));
        }
        assert_eq!(list.get_by_rank(0), None);
        assert_eq!(list.get_by_rank(list.len() + 1), None);
    }

    #[test]
    fn test_iter_reverses_through_backward_links() {
        let mut list = SkipList::with_seed(5);
        for i in 0..50u32 {
            list.insert(i, f64::from(i % 7)).unwrap();
        }
        let forward: Vec<_> = list.iter().map(|(m, s)| (*m, s)).collect();
        let mut backward: Vec<_> = list.iter().rev().map(|(m, s)| (*m, s)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(list.iter().len(), 50);
    }

    #[test]
    fn test_range_queries() {
        let (list, _) = paired(10, 17);

        assert_eq!(list.is_in_range(2.0..=4.0), Ok(true));
        assert_eq!(list.is_in_range(20.0..=40.0), Ok(false));
        assert_eq!(list.is_in_range(-5.0..-1.0), Ok(false));
        assert_eq!(list.is_in_range(4.0..=2.0), Err(Error::OutOfRange));
        assert_eq!(list.is_in_range(3.0..3.0), Err(Error::OutOfRange));
        assert_eq!(list.is_in_range(f64::NAN..=1.0), Err(Error::OutOfRange));

        let first = list.first_in_range(2.5..=7.0).unwrap();
        assert_eq!(first, Some((&"m003".to_string(), 3.0)));
        let last = list.last_in_range(2.5..=7.0).unwrap();
        assert_eq!(last, Some((&"m007".to_string(), 7.0)));

        // Exclusive bounds.
        let first = list.first_in_range((Bound::Excluded(3.0), Bound::Unbounded));
        assert_eq!(first.unwrap(), Some((&"m004".to_string(), 4.0)));
        let last = list.last_in_range(..7.0).unwrap();
        assert_eq!(last, Some((&"m006".to_string(), 6.0)));

        // Overlapping the list's span but holding no element.
        assert_eq!(list.first_in_range(3.2..3.8), Ok(None));
        assert_eq!(list.last_in_range(3.2..3.8), Ok(None));

        assert_eq!(list.first_in_range(..), Ok(Some((&"m000".to_string(), 0.0))));
        assert_eq!(list.last_in_range(..), Ok(Some((&"m009".to_string(), 9.0))));
    }

    #[test]
    fn test_range_iterates_both_ways() {
        let (list, _) = paired(10, 31);

        let scores: Vec<f64> = list.range(2.0..5.0).unwrap().map(|(_, s)| s).collect();
        assert_eq!(scores, [2.0, 3.0, 4.0]);
        let scores: Vec<f64> = list.range(2.0..5.0).unwrap().rev().map(|(_, s)| s).collect();
        assert_eq!(scores, [4.0, 3.0, 2.0]);

        assert_eq!(list.range(..).unwrap().len(), 10);
        assert_eq!(list.range(3.2..3.8).unwrap().count(), 0);
        assert_eq!(list.range(50.0..).unwrap().count(), 0);
        assert!(list.range(5.0..2.0).is_err());
    }

    #[test]
    fn test_delete_range_by_score() {
        let (mut list, mut dict) = paired(10, 21);

        assert_eq!(list.delete_range_by_score(2.0..=5.0, &mut dict), Ok(4));
        list.validate();
        assert_eq!(list.len(), 6);
        assert_eq!(dict.len(), 6);
        for i in 2..=5 {
            assert!(!dict.contains_key(&alloc::format!("m{i:03}")));
        }

        let expected = [0, 1, 6, 7, 8, 9];
        for (rank, i) in expected.into_iter().enumerate() {
            let member = alloc::format!("m{i:03}");
            assert_eq!(dict.get(&member), Some(&(i as f64)));
            assert_eq!(list.get_rank(&member, i as f64), Some(rank + 1));
        }

        assert_eq!(list.delete_range_by_score(2.0..=5.0, &mut dict), Ok(0));
        assert_eq!(list.delete_range_by_score(100.0.., &mut dict), Ok(0));
        assert_eq!(
            list.delete_range_by_score(5.0..=2.0, &mut dict),
            Err(Error::OutOfRange)
        );

        assert_eq!(list.delete_range_by_score(..7.0, &mut dict), Ok(3));
        assert_eq!(members(&list).len(), 3);
        list.validate();
    }

    #[test]
    fn test_delete_range_tolerates_dictionary_miss() {
        let (mut list, mut dict) = paired(6, 4);
        dict.delete(&"m002".to_string()).unwrap();

        assert_eq!(list.delete_range_by_score(1.0..=3.0, &mut dict), Ok(3));
        list.validate();
        assert_eq!(list.len(), 3);
        assert_eq!(dict.len(), 3);

        dict.delete(&"m005".to_string()).unwrap();
        assert_eq!(list.delete_range_by_rank(2, 3, &mut dict), Ok(2));
        list.validate();
        assert_eq!(list.len(), 1);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&"m000".to_string()), Some(&0.0));
    }

    #[test]
    fn test_delete_range_by_rank() {
        let (mut list, mut dict) = paired(10, 8);

        assert_eq!(list.delete_range_by_rank(0, 3, &mut dict), Err(Error::OutOfRange));
        assert_eq!(list.delete_range_by_rank(4, 3, &mut dict), Err(Error::OutOfRange));

        assert_eq!(list.delete_range_by_rank(2, 4, &mut dict), Ok(3));
        list.validate();
        let left: Vec<String> = members(&list).into_iter().map(|(m, _)| m).collect();
        assert_eq!(left, ["m000", "m004", "m005", "m006", "m007", "m008", "m009"]);
        assert_eq!(dict.len(), 7);

        // End past the last rank is clamped.
        assert_eq!(list.delete_range_by_rank(6, 100, &mut dict), Ok(2));
        assert_eq!(list.delete_range_by_rank(6, 100, &mut dict), Ok(0));
        list.validate();
        assert_eq!(list.len(), 5);
        assert_eq!(dict.len(), 5);
    }

    #[test]
    fn test_update_score() {
        let (mut list, _) = paired(5, 12);
        let m2 = "m002".to_string();

        // Still between m001 (1.0) and m003 (3.0): updated in place.
        list.update_score(&m2, 2.0, 2.5).unwrap();
        list.validate();
        assert_eq!(list.get_rank(&m2, 2.5), Some(3));

        list.update_score(&m2, 2.5, 10.0).unwrap();
        list.validate();
        assert_eq!(list.get_rank(&m2, 10.0), Some(5));
        assert_eq!(list.last(), Some((&m2, 10.0)));

        assert_eq!(
            list.update_score(&m2, 2.5, 1.0),
            Err(Error::MemberNotFound)
        );
    }

    #[test]
    fn test_shrink_to_fit_compacts_arena() {
        let (mut list, mut dict) = paired(200, 44);
        assert_eq!(list.arena_len(), 201);

        assert_eq!(list.delete_range_by_score(20.0..180.0, &mut dict), Ok(160));
        assert_eq!(list.arena_len(), 201);

        list.shrink_to_fit();
        list.validate();
        assert_eq!(list.arena_len(), list.len() + 1);
        for rank in 1..=list.len() {
            let (member, score) = list.get_by_rank(rank).unwrap();
            assert_eq!(list.get_rank(member, score), Some(rank));
        }
        assert_eq!(list.first(), Some((&"m000".to_string(), 0.0)));
        assert_eq!(list.last(), Some((&"m199".to_string(), 199.0)));

        for i in 0..10 {
            list.insert(alloc::format!("n{i}"), 50.0).unwrap();
        }
        list.validate();
        assert_eq!(list.arena_len(), list.len() + 1);
    }

    #[test]
    fn test_emptied_list_releases_arena() {
        let (mut list, mut dict) = paired(64, 45);
        list.delete(&"m010".to_string(), 10.0).unwrap();
        assert_eq!(list.arena_len(), 65);

        assert_eq!(list.delete_range_by_rank(1, 100, &mut dict), Ok(63));
        assert!(list.is_empty());
        assert_eq!(list.arena_len(), 1);
        list.validate();

        list.insert("fresh".to_string(), 1.0).unwrap();
        assert_eq!(list.arena_len(), 2);
        list.validate();
    }

    #[test]
    fn test_clear_and_reuse() {
        let (mut list, _) = paired(20, 2);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.level(), 1);
        list.validate();

        list.insert("again".to_string(), 1.0).unwrap();
        list.validate();
        assert_eq!(list.len(), 1);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_randomized_against_ordered_model() {
        let mut rng = SmallRng::seed_from_u64(0x51_ab);
        let mut list = SkipList::with_seed(0xabc);
        let mut model: BTreeSet<(u64, u32)> = BTreeSet::new();

        for step in 0..5_000u32 {
            let score = rng.next_u32() % 64;
            let member = rng.next_u32() % 256;
            let key = (u64::from(score), member);
            if rng.random_bool(0.6) {
                let inserted = list.insert(member, f64::from(score));
                assert_eq!(inserted.is_ok(), model.insert(key), "step {step}");
            } else {
                let deleted = list.delete(&member, f64::from(score));
                assert_eq!(deleted.is_ok(), model.remove(&key), "step {step}");
            }

            if step % 250 == 0 {
                list.validate();
                let got: Vec<(u64, u32)> = list.iter().map(|(m, s)| (s as u64, *m)).collect();
                assert_eq!(got, model.iter().copied().collect::<Vec<_>>());
            }
        }
        list.validate();
    }
}
