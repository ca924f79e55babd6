//! Accumulators merged across execution contexts.
//!
//! Every implementation of [`Reduce::join`] must be associative and commutative: the shape
//! of the join tree is chosen by the scheduler, and the merged value must not depend on it.
use std::collections::BTreeSet;

pub trait Reduce {
    /// Merges the partial result of a sibling context into `self`.
    fn join(&mut self, other: Self);
}

/// Counts events, joined by summation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Counter(pub usize);

impl Counter {
    pub fn increment(&mut self) {
        self.0 += 1;
    }

    pub fn add(&mut self, n: usize) {
        self.0 += n;
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Reduce for Counter {
    fn join(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// A running maximum, joined by taking the larger value.
///
/// `Max(None)` is the neutral element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Max<T>(pub Option<T>);

impl<T> Default for Max<T> {
    fn default() -> Self {
        Max(None)
    }
}

impl<T: Ord + Copy> Max<T> {
    pub fn update(&mut self, value: T) {
        self.0 = Some(match self.0 {
            Some(current) => current.max(value),
            None => value,
        });
    }

    pub fn get(&self) -> Option<T> {
        self.0
    }
}

impl<T: Ord + Copy> Reduce for Max<T> {
    fn join(&mut self, other: Self) {
        if let Some(value) = other.0 {
            self.update(value);
        }
    }
}

/// The set of distinct values seen, joined by union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetUnion<T: Ord>(pub BTreeSet<T>);

impl<T: Ord> Default for SetUnion<T> {
    fn default() -> Self {
        SetUnion(BTreeSet::new())
    }
}

impl<T: Ord> SetUnion<T> {
    pub fn insert(&mut self, value: T) -> bool {
        self.0.insert(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.contains(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeSet<T> {
        self.0
    }
}

impl<T: Ord> Reduce for SetUnion<T> {
    fn join(&mut self, mut other: Self) {
        // Move the smaller set into the larger one
        if other.0.len() > self.0.len() {
            std::mem::swap(&mut self.0, &mut other.0);
        }
        self.0.append(&mut other.0);
    }
}

impl<A: Reduce, B: Reduce> Reduce for (A, B) {
    fn join(&mut self, other: Self) {
        self.0.join(other.0);
        self.1.join(other.1);
    }
}
