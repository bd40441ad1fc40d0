use std::collections::BTreeSet;
use std::fmt;

/// An ordered set of indices into the modulus chain.
///
/// Iteration is always in increasing index order, which is also the order
/// in which a [`ResiduePoly`](crate::ring::ResiduePoly) stores its residues.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimeSet(BTreeSet<usize>);

impl PrimeSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// `{first, first+1, ..., last}`; empty when `first > last`.
    pub fn interval(first: usize, last: usize) -> Self {
        Self((first..=last).collect())
    }

    pub fn singleton(i: usize) -> Self {
        Self(BTreeSet::from([i]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, i: usize) -> bool {
        self.0.contains(&i)
    }

    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn insert(&mut self, i: usize) -> bool {
        self.0.insert(i)
    }

    pub fn remove(&mut self, i: usize) -> bool {
        self.0.remove(&i)
    }

    pub fn insert_all(&mut self, other: &PrimeSet) {
        self.0.extend(other.iter());
    }

    pub fn remove_all(&mut self, other: &PrimeSet) {
        for i in other.iter() {
            self.0.remove(&i);
        }
    }

    pub fn union(&self, other: &PrimeSet) -> PrimeSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersection(&self, other: &PrimeSet) -> PrimeSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// `self \ other`.
    pub fn difference(&self, other: &PrimeSet) -> PrimeSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn is_subset(&self, other: &PrimeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_disjoint(&self, other: &PrimeSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// True when the indices are consecutive. The empty set counts.
    pub fn is_interval(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last - first + 1 == self.len(),
            _ => true,
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Position of chain index `i` within the set.
    pub fn position(&self, i: usize) -> Option<usize> {
        if !self.contains(i) {
            return None;
        }
        Some(self.0.range(..i).count())
    }
}

impl FromIterator<usize> for PrimeSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PrimeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, i) in self.iter().enumerate() {
            if k > 0 {
                write!(f, " ")?;
            }
            write!(f, "{i}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_and_ops() {
        let a = PrimeSet::interval(0, 4);
        let b = PrimeSet::interval(3, 6);
        assert_eq!(a.len(), 5);
        assert_eq!(a.intersection(&b), PrimeSet::interval(3, 4));
        assert_eq!(a.difference(&b), PrimeSet::interval(0, 2));
        assert_eq!(a.union(&b), PrimeSet::interval(0, 6));
        assert!(PrimeSet::interval(1, 2).is_subset(&a));
        assert!(PrimeSet::interval(5, 4).is_empty());
    }

    #[test]
    fn test_is_interval() {
        assert!(PrimeSet::new().is_interval());
        assert!(PrimeSet::interval(2, 5).is_interval());
        let gappy: PrimeSet = [0, 1, 3].into_iter().collect();
        assert!(!gappy.is_interval());
    }

    #[test]
    fn test_position_and_display() {
        let s: PrimeSet = [1, 4, 7].into_iter().collect();
        assert_eq!(s.position(4), Some(1));
        assert_eq!(s.position(5), None);
        assert_eq!(s.to_string(), "{1 4 7}");
        assert_eq!(PrimeSet::new().to_string(), "{}");
    }
}
