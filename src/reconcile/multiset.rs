//! Multiset Differ
//!
//! Order-independent comparison (multiplicity-aware) and partition
//! (membership-based) of key sequences (initiator WWNs, host ids, volume ids, port keys, ...).

use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Result of partitioning desired against observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<K> {
    /// Present in desired, absent from observed
    pub to_add: Vec<K>,
    /// Present in observed, absent from desired
    pub to_remove: Vec<K>,
}

impl<K> Partition<K> {
    /// True when neither side needs a mutation
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Multiset equality: same elements with the same multiplicities, in any order
pub fn equal<K: Eq + Hash>(a: &[K], b: &[K]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut counts: IndexMap<&K, usize> = IndexMap::with_capacity(a.len());
    for k in a {
        *counts.entry(k).or_insert(0) += 1;
    }

    for k in b {
        match counts.get_mut(k) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                counts.swap_remove(k);
            }
            None => return false,
        }
    }

    counts.is_empty()
}

/// Split the difference between `desired` and `observed` into additions and
/// removals. `to_add` holds elements of `desired` missing from `observed`,
/// `to_remove` elements of `observed` missing from `desired`; both are
/// deduplicated in first-seen order, so neither side ever repeats an element
/// the other already holds.
pub fn partition<K: Eq + Hash + Clone>(desired: &[K], observed: &[K]) -> Partition<K> {
    let have: IndexSet<&K> = observed.iter().collect();
    let want: IndexSet<&K> = desired.iter().collect();

    let to_add = want
        .iter()
        .filter(|k| !have.contains(*k))
        .map(|k| (*k).clone())
        .collect();
    let to_remove = have
        .iter()
        .filter(|k| !want.contains(*k))
        .map(|k| (*k).clone())
        .collect();

    Partition { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_equal_ignores_order() {
        let a = s(&["A", "B", "C", "B"]);
        let b = s(&["B", "C", "B", "A"]);
        assert!(equal(&a, &b));
        assert!(equal(&b, &a));
        assert!(equal(&a, &a));
        assert!(equal::<String>(&[], &[]));
    }

    #[test]
    fn test_equal_is_multiplicity_sensitive() {
        assert!(!equal(&s(&["x", "x"]), &s(&["x"])));
        assert!(!equal(&s(&["x", "x", "y"]), &s(&["x", "y", "y"])));
        assert!(!equal(&s(&["x"]), &s(&["y"])));
    }

    #[test]
    fn test_partition_initiators() {
        let p = partition(&s(&["A", "B"]), &s(&["A", "C"]));
        assert_eq!(p.to_add, s(&["B"]));
        assert_eq!(p.to_remove, s(&["C"]));
        assert!(!p.is_noop());

        let p = partition(&s(&["A", "B"]), &s(&["B", "A"]));
        assert!(p.is_noop());
    }

    #[test]
    fn test_partition_is_disjoint_with_duplicates() {
        let cases = [
            (s(&["A", "A", "B"]), s(&["A"])),
            (s(&["A", "B", "B"]), s(&["B", "C", "C"])),
            (s(&[]), s(&["A", "A"])),
            (s(&["A", "A"]), s(&[])),
            (s(&["x", "y", "z"]), s(&["z", "y", "x", "x"])),
        ];

        for (desired, observed) in cases {
            let p = partition(&desired, &observed);
            assert!(
                p.to_add.iter().all(|k| !observed.contains(k)),
                "to_add {:?} overlaps observed {:?}",
                p.to_add,
                observed
            );
            assert!(
                p.to_remove.iter().all(|k| !desired.contains(k)),
                "to_remove {:?} overlaps desired {:?}",
                p.to_remove,
                desired
            );
        }
    }

    #[test]
    fn test_partition_dedups_in_first_seen_order() {
        let p = partition(&s(&["A", "A", "B", "C", "B"]), &s(&["A", "D", "D", "E"]));
        assert_eq!(p.to_add, s(&["B", "C"]));
        assert_eq!(p.to_remove, s(&["D", "E"]));

        // equal sets with different multiplicities need no mutation
        let p = partition(&s(&["A", "A"]), &s(&["A"]));
        assert!(p.is_noop());
    }

    #[test]
    fn test_partition_disjoint_for_sets() {
        let desired = s(&["h1", "h2", "h3"]);
        let observed = s(&["h3", "h4"]);
        let p = partition(&desired, &observed);
        assert!(p.to_add.iter().all(|k| !observed.contains(k)));
        assert!(p.to_remove.iter().all(|k| !desired.contains(k)));
        assert_eq!(p.to_add, s(&["h1", "h2"]));
        assert_eq!(p.to_remove, s(&["h4"]));
    }
}
