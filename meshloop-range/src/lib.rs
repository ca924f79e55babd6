//! meshloop-range
//! ==============
//!
//! Splittable ranges over mesh entities.
//!
//! A [`StoredRange`] is a contiguous window into a shared, immutable list of entity handles.
//! Splitting a range never copies the handles: both halves refer to the same storage, and
//! together they cover exactly the entities of the original range, in the original order.
//! This is the only decomposition primitive the parallel loops rely on.

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// The grain size used when none is given explicitly.
pub const DEFAULT_GRAIN_SIZE: usize = 1000;

/// An ordered, splittable range of entity handles.
pub struct StoredRange<H> {
    items: Arc<[H]>,
    // Start/end represent the window of `items` covered by this range
    start: usize,
    end: usize,
    grain_size: usize,
}

impl<H> Clone for StoredRange<H> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            start: self.start,
            end: self.end,
            grain_size: self.grain_size,
        }
    }
}

impl<H> Debug for StoredRange<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredRange")
            // .field("items", &"<not printed>")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("grain_size", &self.grain_size)
            .finish()
    }
}

impl<H> From<Vec<H>> for StoredRange<H> {
    fn from(items: Vec<H>) -> Self {
        Self::new(items)
    }
}

impl<H> StoredRange<H> {
    pub fn new(items: Vec<H>) -> Self {
        let end = items.len();
        Self {
            items: items.into(),
            start: 0,
            end,
            grain_size: DEFAULT_GRAIN_SIZE,
        }
    }

    /// Returns the same range with a different grain size.
    ///
    /// A grain size of zero is treated as one.
    pub fn with_grain_size(mut self, grain_size: usize) -> Self {
        self.grain_size = grain_size.max(1);
        self
    }

    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The offset of the first entity of this range in the full range it was split from.
    pub fn offset(&self) -> usize {
        self.start
    }

    /// Whether a call to [`split`](Self::split) would produce two non-empty ranges of work.
    pub fn is_divisible(&self) -> bool {
        self.len() > self.grain_size && self.len() > 1
    }

    pub fn as_slice(&self) -> &[H] {
        &self.items[self.start..self.end]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, H> {
        self.as_slice().iter()
    }

    /// Splits the range into two halves.
    ///
    /// The left half receives the first `len / 2` entities. A range with at most one entity
    /// is returned unchanged together with an empty right half.
    pub fn split(self) -> (Self, Self) {
        let len = self.len();
        if len <= 1 {
            self.split_at(len)
        } else {
            self.split_at(len / 2)
        }
    }

    /// Splits the range so that the left part contains the first `index` entities.
    ///
    /// # Panics
    ///
    /// Panics if `index > self.len()`.
    pub fn split_at(self, index: usize) -> (Self, Self) {
        assert!(index <= self.len(), "Split index out of bounds");
        let mid = self.start + index;
        let left = Self {
            items: Arc::clone(&self.items),
            start: self.start,
            end: mid,
            grain_size: self.grain_size,
        };
        let right = Self {
            items: self.items,
            start: mid,
            end: self.end,
            grain_size: self.grain_size,
        };
        (left, right)
    }

    /// Merges two adjacent ranges over the same storage back into one.
    ///
    /// Returns the two ranges unchanged if they do not share storage or if `other` does not
    /// start where `self` ends. Empty ranges merge with anything over the same storage.
    pub fn try_merge(self, other: Self) -> Result<Self, (Self, Self)> {
        if !Arc::ptr_eq(&self.items, &other.items) {
            return Err((self, other));
        }

        if other.is_empty() {
            Ok(self)
        } else if self.is_empty() {
            Ok(other)
        } else if self.end == other.start {
            Ok(Self {
                items: self.items,
                start: self.start,
                end: other.end,
                grain_size: self.grain_size,
            })
        } else {
            Err((self, other))
        }
    }

    /// Recursively splits the range until no piece is divisible, returning the leaves in order.
    pub fn leaves(&self) -> Vec<Self> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(range) = stack.pop() {
            if range.is_divisible() {
                let (left, right) = range.split();
                // Push right first so that leaves come out in range order
                stack.push(right);
                stack.push(left);
            } else if !range.is_empty() {
                leaves.push(range);
            }
        }
        leaves
    }
}

impl<'a, H> IntoIterator for &'a StoredRange<H> {
    type Item = &'a H;
    type IntoIter = std::slice::Iter<'a, H>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
