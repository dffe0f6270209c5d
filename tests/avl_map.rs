use std::collections::BTreeMap;

use cordyceps_avl::AvlMap;
use proptest::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 5_000;

/// Keys are drawn from a range smaller than `TEST_SIZE` so that collisions are frequent.
fn key_strategy() -> impl Strategy<Value = i64> {
    -2_000i64..2_000i64
}

fn value_strategy() -> impl Strategy<Value = i64> {
    any::<i64>()
}

#[derive(Debug, Clone)]
enum MapOp {
    Insert(i64, i64),
    Replace(i64, i64),
    Remove(i64),
    Get(i64),
    ContainsKey(i64),
    GetKeyValue(i64),
    FirstKeyValue,
    LastKeyValue,
    PopFirst,
    PopLast,
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        5 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        1 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Replace(k, v)),
        3 => key_strategy().prop_map(MapOp::Remove),
        2 => key_strategy().prop_map(MapOp::Get),
        1 => key_strategy().prop_map(MapOp::ContainsKey),
        1 => key_strategy().prop_map(MapOp::GetKeyValue),
        1 => Just(MapOp::FirstKeyValue),
        1 => Just(MapOp::LastKeyValue),
        1 => Just(MapOp::PopFirst),
        1 => Just(MapOp::PopLast),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Replays a random sequence of operations on both AvlMap and BTreeMap and asserts identical
    /// results at every step.
    #[test]
    fn map_ops_match_btreemap(ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE)) {
        let mut avl_map: AvlMap<i64, i64> = AvlMap::new();
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for op in &ops {
            match op {
                MapOp::Insert(k, v) => {
                    let avl_result = avl_map.insert(*k, *v);
                    let bt_result = !bt_map.contains_key(k);
                    bt_map.entry(*k).or_insert(*v);
                    prop_assert_eq!(avl_result, bt_result, "insert({}, {})", k, v);
                }
                MapOp::Replace(k, v) => {
                    let avl_result = avl_map.replace(*k, *v);
                    let bt_result = bt_map.insert(*k, *v);
                    prop_assert_eq!(avl_result, bt_result, "replace({}, {})", k, v);
                }
                MapOp::Remove(k) => {
                    let avl_result = avl_map.remove(k);
                    let bt_result = bt_map.remove(k);
                    prop_assert_eq!(avl_result, bt_result, "remove({})", k);
                }
                MapOp::Get(k) => {
                    let avl_result = avl_map.get(k);
                    let bt_result = bt_map.get(k);
                    prop_assert_eq!(avl_result, bt_result, "get({})", k);
                }
                MapOp::ContainsKey(k) => {
                    let avl_result = avl_map.contains_key(k);
                    let bt_result = bt_map.contains_key(k);
                    prop_assert_eq!(avl_result, bt_result, "contains_key({})", k);
                }
                MapOp::GetKeyValue(k) => {
                    let avl_result = avl_map.get_key_value(k);
                    let bt_result = bt_map.get_key_value(k);
                    prop_assert_eq!(avl_result, bt_result, "get_key_value({})", k);
                }
                MapOp::FirstKeyValue => {
                    let avl_result = avl_map.first_key_value();
                    let bt_result = bt_map.first_key_value();
                    prop_assert_eq!(avl_result, bt_result, "first_key_value");
                }
                MapOp::LastKeyValue => {
                    let avl_result = avl_map.last_key_value();
                    let bt_result = bt_map.last_key_value();
                    prop_assert_eq!(avl_result, bt_result, "last_key_value");
                }
                MapOp::PopFirst => {
                    let avl_result = avl_map.pop_first();
                    let bt_result = bt_map.pop_first();
                    prop_assert_eq!(avl_result, bt_result, "pop_first");
                }
                MapOp::PopLast => {
                    let avl_result = avl_map.pop_last();
                    let bt_result = bt_map.pop_last();
                    prop_assert_eq!(avl_result, bt_result, "pop_last");
                }
            }
            prop_assert_eq!(avl_map.len(), bt_map.len(), "len mismatch after {:?}", op);
            prop_assert_eq!(avl_map.is_empty(), bt_map.is_empty(), "is_empty mismatch after {:?}", op);
        }

        avl_map.assert_invariants();
    }

    /// Tests that iteration order matches BTreeMap after random insertions.
    #[test]
    fn iter_matches_btreemap(entries in proptest::collection::vec((key_strategy(), value_strategy()), TEST_SIZE)) {
        let mut avl_map: AvlMap<i64, i64> = AvlMap::new();
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for (k, v) in &entries {
            avl_map.insert(*k, *v);
            bt_map.entry(*k).or_insert(*v);
        }

        // Forward iteration
        let avl_items: Vec<_> = avl_map.iter().map(|(&k, &v)| (k, v)).collect();
        let bt_items: Vec<_> = bt_map.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&avl_items, &bt_items, "iter() mismatch");

        // Reverse iteration
        let avl_rev: Vec<_> = avl_map.iter().rev().map(|(&k, &v)| (k, v)).collect();
        let bt_rev: Vec<_> = bt_map.iter().rev().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&avl_rev, &bt_rev, "iter().rev() mismatch");

        // Keys
        let avl_keys: Vec<_> = avl_map.keys().copied().collect();
        let bt_keys: Vec<_> = bt_map.keys().copied().collect();
        prop_assert_eq!(&avl_keys, &bt_keys, "keys() mismatch");

        // Values
        let avl_vals: Vec<_> = avl_map.values().copied().collect();
        let bt_vals: Vec<_> = bt_map.values().copied().collect();
        prop_assert_eq!(&avl_vals, &bt_vals, "values() mismatch");

        // Clones iterate identically
        let copy = avl_map.clone();
        prop_assert!(copy == avl_map);
        copy.assert_invariants();
    }

    /// Tests ExactSizeIterator and DoubleEndedIterator behavior.
    #[test]
    fn iter_size_and_double_ended(entries in proptest::collection::vec((key_strategy(), value_strategy()), 1..TEST_SIZE)) {
        let avl_map: AvlMap<i64, i64> = entries.iter().cloned().collect();

        let iter = avl_map.iter();
        prop_assert_eq!(iter.len(), avl_map.len(), "ExactSizeIterator len mismatch");

        // Alternating front/back should yield all elements exactly once
        let mut from_front = Vec::new();
        let mut from_back = Vec::new();
        let mut iter = avl_map.iter();
        let mut toggle = true;
        loop {
            if toggle {
                if let Some(item) = iter.next() {
                    from_front.push(item);
                } else {
                    break;
                }
            } else if let Some(item) = iter.next_back() {
                from_back.push(item);
            } else {
                break;
            }
            toggle = !toggle;
        }
        prop_assert_eq!(from_front.len() + from_back.len(), avl_map.len());

        from_back.reverse();
        from_front.extend(from_back);
        let all: Vec<_> = avl_map.iter().collect();
        prop_assert_eq!(from_front, all);
    }

    /// Tests that a cursor visits every entry in both directions and passes through the ghost.
    #[test]
    fn cursor_walks_like_iter(entries in proptest::collection::vec((key_strategy(), value_strategy()), 0..500)) {
        let avl_map: AvlMap<i64, i64> = entries.into_iter().collect();

        let mut curs = avl_map.cursor_front();
        let mut walked = Vec::new();
        while let Some(kv) = curs.key_value() {
            walked.push(kv);
            curs.move_next();
        }
        prop_assert!(avl_map.iter().eq(walked.iter().copied()));

        // Stepping off the end lands on the ghost, whose neighbours are the extremes.
        prop_assert_eq!(curs.peek_next(), avl_map.first_key_value());
        prop_assert_eq!(curs.peek_prev(), avl_map.last_key_value());

        curs.move_prev();
        prop_assert!(curs == avl_map.cursor_back());

        let mut walked_back = Vec::new();
        while let Some(kv) = curs.key_value() {
            walked_back.push(kv);
            curs.move_prev();
        }
        prop_assert!(avl_map.iter().rev().eq(walked_back.iter().copied()));
    }

    /// Tests that heights stay within the AVL bound under random churn.
    #[test]
    fn height_is_logarithmic(
        inserts in proptest::collection::vec(key_strategy(), 0..TEST_SIZE),
        removes in proptest::collection::vec(key_strategy(), 0..TEST_SIZE),
    ) {
        let mut avl_map: AvlMap<i64, ()> = AvlMap::new();

        for k in inserts {
            avl_map.insert(k, ());
        }
        for k in removes {
            avl_map.remove(&k);
        }

        let height = avl_map.assert_invariants();
        let bound = 1.45 * ((avl_map.len() + 2) as f64).log2();
        prop_assert!(height as f64 <= bound, "height {} exceeds {}", height, bound);
    }
}

#[test]
fn from_iter_keeps_first_duplicate() {
    let map: AvlMap<u32, &str> = [(1, "a"), (2, "b"), (1, "c")].into_iter().collect();

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&1), Some(&"a"));
}

#[test]
fn extend_skips_present_keys() {
    let mut map: AvlMap<u32, u32> = (0..10).map(|k| (k, k)).collect();
    map.extend((5..15).map(|k| (k, k * 100)));

    assert_eq!(map.len(), 15);
    assert_eq!(map.get(&5), Some(&5));
    assert_eq!(map.get(&14), Some(&1400));
    map.assert_invariants();
}

#[test]
fn borrowed_key_lookup() {
    let mut map: AvlMap<String, usize> = AvlMap::new();
    for word in ["pear", "apple", "fig"] {
        assert!(map.insert(word.to_owned(), word.len()));
    }

    assert_eq!(map.get("fig"), Some(&3));
    assert!(map.contains_key("apple"));
    assert_eq!(map.remove("pear"), Some(4));
    assert_eq!(map.keys().map(String::as_str).collect::<Vec<_>>(), ["apple", "fig"]);
}

#[test]
fn get_or_insert_with_counts() {
    let mut counts: AvlMap<char, usize> = AvlMap::new();
    for c in "mississippi".chars() {
        *counts.get_or_insert_with(c, || 0) += 1;
    }

    let counted: Vec<_> = counts.iter().map(|(&c, &n)| (c, n)).collect();
    assert_eq!(counted, [('i', 4), ('m', 1), ('p', 2), ('s', 4)]);
}

#[test]
fn empty_map_edges() {
    let mut map: AvlMap<u8, u8> = AvlMap::default();

    assert!(map.is_empty());
    assert_eq!(map.height(), 0);
    assert_eq!(map.first_key_value(), None);
    assert_eq!(map.pop_last(), None);
    assert_eq!(map.remove(&0), None);
    assert_eq!(map.iter().next_back(), None);
    assert!(map.cursor_front() == map.cursor_back());
    assert_eq!(format!("{map:?}"), "{}");
}
