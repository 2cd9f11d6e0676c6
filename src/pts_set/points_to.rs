// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::slice;

use fixedbitset::FixedBitSet;

use super::Idx;

const SMALL_SET_CAPACITY: usize = 32;

/// The operations the solvers need from a points-to set. Insertion is
/// monotonic; there is no removal.
pub trait PointsToSet<T> {
    type Iter<'a>: Iterator<Item = T>
    where
        Self: 'a;

    fn new() -> Self;
    fn count(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn contains(&self, elem: T) -> bool;
    fn superset(&self, other: &Self) -> bool;
    fn insert(&mut self, elem: T) -> bool;
    fn union(&mut self, other: &Self) -> bool;
    fn iter(&self) -> Self::Iter<'_>;
}

/// Hybrid implementation of a points-to set, which uses an explicit array
/// for small sets and a bit set for large sets.
#[derive(Clone)]
pub struct HybridPointsToSet<T> {
    points_to: HybridSet<T>,
}

impl<T: Idx + fmt::Debug> fmt::Debug for HybridPointsToSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, T: Idx> IntoIterator for &'a HybridPointsToSet<T> {
    type Item = T;
    type IntoIter = HybridIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Idx> HybridPointsToSet<T> {
    /// Creates a singleton set, the common case when seeding the worklist
    /// from an allocation.
    pub fn singleton(elem: T) -> Self {
        let mut set = Self::new();
        set.insert(elem);
        set
    }
}

impl<T: Idx> PointsToSet<T> for HybridPointsToSet<T> {
    fn new() -> Self {
        HybridPointsToSet {
            points_to: HybridSet::Small(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        match &self.points_to {
            HybridSet::Small(small) => small.len(),
            HybridSet::Large(large) => large.count_ones(..),
        }
    }

    fn is_empty(&self) -> bool {
        match &self.points_to {
            HybridSet::Small(small) => small.is_empty(),
            HybridSet::Large(large) => large.count_ones(..) == 0,
        }
    }

    fn contains(&self, elem: T) -> bool {
        match &self.points_to {
            HybridSet::Small(small) => small.contains(&elem),
            HybridSet::Large(large) => large.contains(elem.index()),
        }
    }

    fn superset(&self, other: &Self) -> bool {
        other.iter().all(|elem| self.contains(elem))
    }

    /// Adds `elem` to this set, returns true if it was not already present.
    fn insert(&mut self, elem: T) -> bool {
        match &mut self.points_to {
            HybridSet::Small(small) => {
                if small.contains(&elem) {
                    return false;
                }
                if small.len() < SMALL_SET_CAPACITY {
                    small.push(elem);
                } else {
                    // The small set is full, convert to a bit set.
                    let mut large = FixedBitSet::with_capacity(elem.index() + 1);
                    for e in small.iter() {
                        large.grow(e.index() + 1);
                        large.insert(e.index());
                    }
                    large.grow(elem.index() + 1);
                    large.insert(elem.index());
                    self.points_to = HybridSet::Large(large);
                }
                true
            }
            HybridSet::Large(large) => {
                large.grow(elem.index() + 1);
                !large.put(elem.index())
            }
        }
    }

    fn union(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for elem in other.iter() {
            changed |= self.insert(elem);
        }
        changed
    }

    type Iter<'a>
        = HybridIter<'a, T>
    where
        Self: 'a;

    fn iter(&self) -> HybridIter<'_, T> {
        match &self.points_to {
            HybridSet::Small(small) => HybridIter::Small(small.iter()),
            HybridSet::Large(large) => HybridIter::Large(large.ones()),
        }
    }
}

#[derive(Clone)]
enum HybridSet<T> {
    Small(Vec<T>),
    Large(FixedBitSet),
}

pub enum HybridIter<'a, T> {
    Small(slice::Iter<'a, T>),
    Large(fixedbitset::Ones<'a>),
}

impl<'a, T: Idx> Iterator for HybridIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            HybridIter::Small(iter) => iter.next().copied(),
            HybridIter::Large(iter) => iter.next().map(T::new),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::Rng;

    use super::{HybridPointsToSet, PointsToSet, SMALL_SET_CAPACITY};

    fn random_set(len: usize) -> HashSet<u32> {
        let mut rng = rand::thread_rng();
        let mut set = HashSet::new();
        while set.len() < len {
            let x = rng.gen_range(1..1000);
            set.insert(x);
        }
        set
    }

    #[test]
    fn small_set() {
        let rand_set = random_set(8);
        let mut set = HybridPointsToSet::<u32>::new();
        for x in rand_set.iter() {
            assert!(set.insert(*x));
        }
        for x in rand_set.iter() {
            assert!(!set.insert(*x));
        }
        assert_eq!(set.count(), 8);
        assert_eq!(set.iter().collect::<HashSet<_>>(), rand_set);
    }

    #[test]
    fn small_to_large_conversion() {
        let rand_set = random_set(SMALL_SET_CAPACITY * 4);
        let mut set = HybridPointsToSet::<u32>::new();
        for x in rand_set.iter() {
            set.insert(*x);
        }
        assert_eq!(set.count(), rand_set.len());
        assert_eq!(set.iter().collect::<HashSet<_>>(), rand_set);
        for x in rand_set.iter() {
            assert!(set.contains(*x));
        }
    }

    #[test]
    fn union_reports_change() {
        let left = random_set(SMALL_SET_CAPACITY * 2);
        let right = random_set(SMALL_SET_CAPACITY * 2);
        let mut a = HybridPointsToSet::<u32>::new();
        let mut b = HybridPointsToSet::<u32>::new();
        for x in left.iter() {
            a.insert(*x);
        }
        for x in right.iter() {
            b.insert(*x);
        }
        let expect_change = !right.is_subset(&left);
        assert_eq!(a.union(&b), expect_change);
        assert!(!a.union(&b));
        assert!(a.superset(&b));
        let expected: HashSet<u32> = left.union(&right).copied().collect();
        assert_eq!(a.iter().collect::<HashSet<_>>(), expected);
    }
}
