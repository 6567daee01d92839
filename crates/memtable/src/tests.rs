use super::*;
use proptest::prelude::*;

// -------------------- Basic CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let mut m = Memtable::with_default_size();
    m.put(b"k1".to_vec(), b"v1".to_vec());
    assert_eq!(m.num_entries(), 1);
    assert_eq!(m.get(b"k1"), Lookup::Found(b"v1".to_vec()));
}

#[test]
fn put_overwrites_previous_value() {
    let mut m = Memtable::with_default_size();
    m.put(b"k1".to_vec(), b"v1".to_vec());
    m.put(b"k1".to_vec(), b"v2".to_vec());
    assert_eq!(m.get(b"k1"), Lookup::Found(b"v2".to_vec()));
    assert_eq!(m.num_entries(), 1);
}

#[test]
fn get_missing_key_is_absent() {
    let m = Memtable::with_default_size();
    assert_eq!(m.get(b"nonexistent"), Lookup::Absent);
}

#[test]
fn delete_creates_tombstone() {
    let mut m = Memtable::with_default_size();
    m.put(b"k1".to_vec(), b"v1".to_vec());
    m.delete(b"k1".to_vec());
    assert_eq!(m.get(b"k1"), Lookup::Tombstone);
    assert_eq!(m.num_entries(), 1); // tombstone still occupies the slot
}

#[test]
fn delete_nonexistent_key_still_inserts_tombstone() {
    let mut m = Memtable::with_default_size();
    m.delete(b"k".to_vec());
    assert_eq!(m.num_entries(), 1);
    assert_eq!(m.get(b"k"), Lookup::Tombstone);
    assert!(m.contains_key(b"k"));
}

#[test]
fn put_after_delete_resurrects_key() {
    let mut m = Memtable::with_default_size();
    m.put(b"k".to_vec(), b"v1".to_vec());
    m.delete(b"k".to_vec());
    assert_eq!(m.get(b"k"), Lookup::Tombstone);
    m.put(b"k".to_vec(), b"v2".to_vec());
    assert_eq!(m.get(b"k"), Lookup::Found(b"v2".to_vec()));
}

#[test]
fn lookup_into_option_collapses_tombstone_and_absent() {
    let mut m = Memtable::with_default_size();
    m.put(b"live".to_vec(), b"v".to_vec());
    m.delete(b"dead".to_vec());

    assert_eq!(m.get(b"live").into_option(), Some(b"v".to_vec()));
    assert_eq!(m.get(b"dead").into_option(), None);
    assert_eq!(m.get(b"never").into_option(), None);
}

// -------------------- Sorted iteration --------------------

#[test]
fn iter_yields_strictly_increasing_keys() {
    let mut m = Memtable::with_default_size();
    for (k, v) in [("zebra", "v0"), ("alpha", "v1"), ("beta", "v2"), ("gamma", "v3"), ("delta", "v4")] {
        m.put(k.as_bytes().to_vec(), v.as_bytes().to_vec());
    }

    let keys: Vec<&[u8]> = m.iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        vec![
            b"alpha".as_slice(),
            b"beta".as_slice(),
            b"delta".as_slice(),
            b"gamma".as_slice(),
            b"zebra".as_slice(),
        ]
    );
}

#[test]
fn iter_includes_tombstones() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"1".to_vec());
    m.delete(b"b".to_vec());
    m.put(b"c".to_vec(), b"3".to_vec());

    let entries: Vec<_> = m.iter().collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].1, &Value::Tombstone);
}

#[test]
fn iter_on_empty_memtable_yields_nothing() {
    let m = Memtable::with_default_size();
    assert_eq!(m.iter().count(), 0);
}

#[test]
fn iter_is_a_point_in_time_snapshot() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"1".to_vec());
    let snapshot: Vec<(Vec<u8>, Value)> = m
        .iter()
        .map(|(k, v)| (k.to_vec(), v.clone()))
        .collect();
    m.put(b"b".to_vec(), b"2".to_vec());
    assert_eq!(snapshot.len(), 1);
}

// -------------------- size_bytes accounting --------------------

#[test]
fn size_starts_at_zero() {
    let m = Memtable::with_default_size();
    assert_eq!(m.size_bytes(), 0);
}

#[test]
fn size_tracks_key_and_value_plus_overhead() {
    let mut m = Memtable::with_default_size();
    m.put(b"ab".to_vec(), b"ccc".to_vec());
    assert_eq!(m.size_bytes(), 2 + 3 + PER_ENTRY_OVERHEAD);
}

#[test]
fn size_adjusts_on_overwrite() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"aaa".to_vec());
    let after_first = m.size_bytes();
    m.put(b"a".to_vec(), b"bb".to_vec());
    assert_eq!(m.size_bytes(), after_first - 1); // value shrank by one byte
}

#[test]
fn size_adjusts_on_delete() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"aaaaaaaaaa".to_vec()); // 10-byte value
    m.delete(b"a".to_vec());
    assert_eq!(m.size_bytes(), 1 + TOMBSTONE_VALUE_BYTES + PER_ENTRY_OVERHEAD);
}

#[test]
fn size_for_new_tombstone_on_unseen_key() {
    let mut m = Memtable::with_default_size();
    m.delete(b"key".to_vec());
    assert_eq!(m.size_bytes(), 3 + TOMBSTONE_VALUE_BYTES + PER_ENTRY_OVERHEAD);
}

#[test]
fn size_is_sum_over_distinct_keys() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"1".to_vec());
    m.put(b"bb".to_vec(), b"22".to_vec());
    m.put(b"ccc".to_vec(), b"333".to_vec());
    let expected = (1 + 1 + PER_ENTRY_OVERHEAD) + (2 + 2 + PER_ENTRY_OVERHEAD) + (3 + 3 + PER_ENTRY_OVERHEAD);
    assert_eq!(m.size_bytes(), expected);
}

// -------------------- is_full / clear --------------------

#[test]
fn is_full_respects_configured_threshold() {
    let mut m = Memtable::new(10);
    assert!(!m.is_full());
    m.put(b"key".to_vec(), b"value".to_vec()); // well past 10 with overhead
    assert!(m.is_full());
}

#[test]
fn clear_resets_everything() {
    let mut m = Memtable::with_default_size();
    m.put(b"a".to_vec(), b"1".to_vec());
    m.put(b"b".to_vec(), b"2".to_vec());
    assert!(!m.is_empty());

    m.clear();
    assert_eq!(m.num_entries(), 0);
    assert_eq!(m.size_bytes(), 0);
    assert!(m.is_empty());
    assert_eq!(m.get(b"a"), Lookup::Absent);
}

#[test]
fn clear_then_reuse() {
    let mut m = Memtable::with_default_size();
    m.put(b"old".to_vec(), b"data".to_vec());
    m.clear();
    m.put(b"new".to_vec(), b"data".to_vec());
    assert_eq!(m.get(b"new"), Lookup::Found(b"data".to_vec()));
    assert_eq!(m.get(b"old"), Lookup::Absent);
}

// -------------------- Edge cases --------------------

#[test]
fn empty_key_is_legal() {
    let mut m = Memtable::with_default_size();
    m.put(b"".to_vec(), b"val".to_vec());
    assert_eq!(m.get(b""), Lookup::Found(b"val".to_vec()));
}

#[test]
fn empty_value_is_distinct_from_tombstone() {
    let mut m = Memtable::with_default_size();
    m.put(b"k".to_vec(), b"".to_vec());
    assert_eq!(m.get(b"k"), Lookup::Found(Vec::new()));
    assert_ne!(m.get(b"k"), Lookup::Tombstone);
}

#[test]
fn binary_key_and_value() {
    let mut m = Memtable::with_default_size();
    let key = vec![0x00, 0xFF, 0x80, 0x01];
    let val = vec![0xDE, 0xAD, 0xBE, 0xEF];
    m.put(key.clone(), val.clone());
    assert_eq!(m.get(&key), Lookup::Found(val));
}

#[test]
fn large_value() {
    let mut m = Memtable::with_default_size();
    let val = vec![b'x'; 1_000_000];
    m.put(b"big".to_vec(), val.clone());
    assert_eq!(m.get(b"big"), Lookup::Found(val));
}

#[test]
fn default_trait_matches_with_default_size() {
    let m = Memtable::default();
    assert!(m.is_empty());
    assert_eq!(m.size_bytes(), 0);
}

// -------------------- Stress --------------------

#[test]
fn many_distinct_keys_stay_sorted() {
    let mut m = Memtable::with_default_size();
    for i in 0u32..1000 {
        m.put(format!("key{i:04}").into_bytes(), b"v".to_vec());
    }
    assert_eq!(m.num_entries(), 1000);
    let keys: Vec<&[u8]> = m.iter().map(|(k, _)| k).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn overwrite_same_key_many_times() {
    let mut m = Memtable::with_default_size();
    for i in 0..10_000u32 {
        m.put(b"k".to_vec(), format!("v{i}").into_bytes());
    }
    assert_eq!(m.num_entries(), 1);
    assert_eq!(m.get(b"k"), Lookup::Found(b"v9999".to_vec()));
}

// -------------------- Property-based invariants --------------------

proptest! {
    #[test]
    fn iter_always_yields_strictly_increasing_keys(
        ops in proptest::collection::vec(
            (any::<bool>(), proptest::collection::vec(any::<u8>(), 0..16), proptest::collection::vec(any::<u8>(), 0..32)),
            0..300,
        )
    ) {
        let mut m = Memtable::with_default_size();
        for (is_put, key, value) in &ops {
            if *is_put {
                m.put(key.clone(), value.clone());
            } else {
                m.delete(key.clone());
            }
        }
        let keys: Vec<&[u8]> = m.iter().map(|(k, _)| k).collect();
        for pair in keys.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn last_write_for_a_key_always_wins(
        key in proptest::collection::vec(any::<u8>(), 1..8),
        writes in proptest::collection::vec(
            proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
            1..50,
        )
    ) {
        let mut m = Memtable::with_default_size();
        for value in &writes {
            match value {
                Some(v) => m.put(key.clone(), v.clone()),
                None => m.delete(key.clone()),
            }
        }
        let expected = match writes.last().unwrap() {
            Some(v) => Lookup::Found(v.clone()),
            None => Lookup::Tombstone,
        };
        prop_assert_eq!(m.get(&key), expected);
        prop_assert_eq!(m.num_entries(), 1);
    }
}
