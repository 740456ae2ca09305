use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use vaultsync_sync::{diff, values_equal, DiffResult};
use vaultsync_types::VariableSet;

fn set(pairs: &[(&str, &str)]) -> VariableSet {
    VariableSet::from_pairs(pairs.iter().copied()).unwrap()
}

fn keys(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ── Examples ─────────────────────────────────────────────────────

#[test]
fn addition_deletion_and_unchanged() {
    let local = set(&[("A", "1"), ("B", "2")]);
    let remote = set(&[("A", "1"), ("C", "3")]);

    let result = diff(&local, &remote);
    assert_eq!(result.additions, keys(&["C"]));
    assert_eq!(result.deletions, keys(&["B"]));
    assert!(result.modifications.is_empty());
    assert_eq!(result.unchanged, keys(&["A"]));
    assert_eq!(result.change_count(), 2);
}

#[test]
fn modification_detected() {
    let result = diff(&set(&[("X", "old")]), &set(&[("X", "new")]));
    assert_eq!(result.modifications, keys(&["X"]));
    assert!(!result.is_empty());
}

#[test]
fn both_empty() {
    let result = diff(&VariableSet::new(), &VariableSet::new());
    assert_eq!(result, DiffResult::default());
    assert!(result.is_empty());
}

#[test]
fn empty_local_is_all_additions() {
    let remote = set(&[("A", "1"), ("B", "2")]);
    let result = diff(&VariableSet::new(), &remote);
    assert_eq!(result.additions, keys(&["A", "B"]));
    assert!(result.deletions.is_empty());
}

#[test]
fn empty_remote_is_all_deletions() {
    let local = set(&[("A", "1"), ("B", "2")]);
    let result = diff(&local, &VariableSet::new());
    assert_eq!(result.deletions, keys(&["A", "B"]));
    assert!(result.additions.is_empty());
}

#[test]
fn newline_encodings_compare_equal() {
    let local = set(&[("CERT", "line1\nline2")]);
    let remote = set(&[("CERT", "line1\\nline2")]);
    let result = diff(&local, &remote);
    assert!(result.is_empty());
    assert_eq!(result.unchanged, keys(&["CERT"]));
}

#[test]
fn comparison_is_byte_exact_otherwise() {
    assert!(!values_equal("abc", "abc "));
    assert!(!values_equal("abc", "ABC"));
    assert!(values_equal("a\r\nb", "a\nb"));
}

#[test]
fn interleaved_keys() {
    let local = set(&[("A", "1"), ("C", "3"), ("E", "5"), ("G", "x")]);
    let remote = set(&[("B", "2"), ("C", "3"), ("D", "4"), ("G", "y")]);
    let result = diff(&local, &remote);
    assert_eq!(result.additions, keys(&["B", "D"]));
    assert_eq!(result.deletions, keys(&["A", "E"]));
    assert_eq!(result.modifications, keys(&["G"]));
    assert_eq!(result.unchanged, keys(&["C"]));
}

// ── Properties ───────────────────────────────────────────────────

fn variable_set_strategy() -> impl Strategy<Value = VariableSet> {
    prop::collection::btree_map("[A-F]{1,2}", "[a-c]{0,2}", 0..12).prop_map(
        |map: BTreeMap<String, String>| VariableSet::from_pairs(map).unwrap(),
    )
}

proptest! {
    /// Every key of either side lands in exactly one bucket.
    #[test]
    fn diff_is_complete_and_disjoint(a in variable_set_strategy(), b in variable_set_strategy()) {
        let result = diff(&a, &b);
        let all: BTreeSet<String> = a.names().chain(b.names()).map(str::to_string).collect();

        for key in &all {
            let hits = [
                result.additions.contains(key),
                result.deletions.contains(key),
                result.modifications.contains(key),
                result.unchanged.contains(key),
            ]
            .iter()
            .filter(|hit| **hit)
            .count();
            prop_assert_eq!(hits, 1, "key {} in {} buckets", key, hits);
        }

        let total = result.additions.len()
            + result.deletions.len()
            + result.modifications.len()
            + result.unchanged.len();
        prop_assert_eq!(total, all.len());
    }

    /// Swapping the sides swaps additions and deletions.
    #[test]
    fn diff_is_symmetric(a in variable_set_strategy(), b in variable_set_strategy()) {
        let ab = diff(&a, &b);
        let ba = diff(&b, &a);
        prop_assert_eq!(&ab.additions, &ba.deletions);
        prop_assert_eq!(&ab.deletions, &ba.additions);
        prop_assert_eq!(&ab.modifications, &ba.modifications);
        prop_assert_eq!(&ab.unchanged, &ba.unchanged);
    }

    /// A set never differs from itself.
    #[test]
    fn diff_with_self_is_empty(a in variable_set_strategy()) {
        prop_assert!(diff(&a, &a).is_empty());
    }
}
