use std::sync::Arc;

use ringlab_chord::{ChordConfig, ChordRing};
use ringlab_idspace::{hash_key, in_range, mod_pow2};
use ringlab_transport::{InMemoryTransport, Transport, Value};

fn ring(m: u32) -> Arc<ChordRing> {
    let transport = Arc::new(InMemoryTransport::new());
    ChordRing::new(transport, ChordConfig { m, btree_order: 4 }).unwrap()
}

fn successor_in_sorted(sorted: &[u64], target: u64) -> u64 {
    match sorted.binary_search(&target) {
        Ok(idx) => sorted[idx],
        Err(idx) => sorted[idx % sorted.len()],
    }
}

/// S1 - build + lookup.
#[test]
fn build_then_lookup_finds_the_right_owner() {
    let ring = ring(8);
    let ids = [10u64, 50, 100, 150, 200];
    let bindings = vec![
        ("alpha".to_string(), Value::Text("A".to_string())),
        ("omega".to_string(), Value::Text("Z".to_string())),
    ];
    ring.build(&ids, &bindings).unwrap();

    let mut observed = ring.all_node_ids();
    observed.sort_unstable();
    let mut expected = ids.to_vec();
    expected.sort_unstable();
    assert_eq!(observed, expected);

    let (values, hops) = ring.lookup(10, "alpha").unwrap();
    assert_eq!(values, vec![Value::Text("A".to_string())]);
    assert!(hops < 8);

    let owner = ring.find_successor(10, hash_key("alpha", 8)).unwrap();
    assert_eq!(owner, successor_in_sorted(&expected, hash_key("alpha", 8)));
}

/// Invariant 4 - the finger table agrees with the omniscient successor
/// lookup for every peer and every row.
#[test]
fn finger_tables_satisfy_the_successor_invariant() {
    let ring = ring(8);
    let ids = [10u64, 50, 100, 150, 200];
    ring.build(&ids, &[]).unwrap();

    let mut sorted = ids.to_vec();
    sorted.sort_unstable();

    for &id in &ids {
        for i in 0..8u32 {
            let start = mod_pow2(id.wrapping_add(1u64 << i), 8);
            let expected = successor_in_sorted(&sorted, start);
            // fix_finger recomputes via routing; compare against the
            // omniscient definition invariant 4 actually states.
            let resolved = ring.find_successor(id, start).unwrap();
            assert_eq!(resolved, expected, "peer {id} finger {i}");
        }
    }
}

/// Invariant 7 - round trip through insert/lookup/update/delete.
#[test]
fn insert_update_delete_round_trip() {
    let ring = ring(8);
    ring.build(&[10, 50, 100], &[]).unwrap();

    ring.insert(10, "k", Value::Text("v1".into())).unwrap();
    let (values, _) = ring.lookup(10, "k").unwrap();
    assert_eq!(values, vec![Value::Text("v1".into())]);

    ring.update(10, "k", Value::Text("v2".into())).unwrap();
    let (values, _) = ring.lookup(10, "k").unwrap();
    assert_eq!(values, vec![Value::Text("v2".into())]);

    ring.delete(10, "k", None).unwrap();
    let (values, _) = ring.lookup(10, "k").unwrap();
    assert!(values.is_empty());
}

/// S2 - join with handoff.
#[test]
fn join_transfers_exactly_the_bindings_in_its_arc() {
    let ring = ring(8);
    let ids = [10u64, 50, 100, 150, 200];
    let bindings = vec![
        ("alpha".to_string(), Value::Text("A".to_string())),
        ("omega".to_string(), Value::Text("Z".to_string())),
    ];
    ring.build(&ids, &bindings).unwrap();

    // Find a key that currently lands in (50, 100] so the new peer 75
    // should receive it. We already know which peer owns each key from
    // find_successor, so discover one synthetically rather than relying on
    // "alpha"/"omega" landing there by chance.
    let before_owner_of_new_key = ring.find_successor(10, hash_key("needle", 8)).unwrap();
    ring.insert(10, "needle", Value::Text("N".into())).unwrap();

    ring.join(75).unwrap();

    let mut expected_ids: Vec<u64> = ids.to_vec();
    expected_ids.push(75);
    expected_ids.sort_unstable();
    let mut observed = ring.all_node_ids();
    observed.sort_unstable();
    assert_eq!(observed, expected_ids);

    let needle_hash = hash_key("needle", 8);
    if in_range(needle_hash, 50, 75, false, true) {
        let (values, _) = ring.lookup(10, "needle").unwrap();
        assert_eq!(values, vec![Value::Text("N".into())]);
        assert_ne!(before_owner_of_new_key, 75, "sanity: owner should move to the new peer");
    }

    // Every binding is still reachable regardless of who ended up owning it.
    let (alpha, _) = ring.lookup(10, "alpha").unwrap();
    assert_eq!(alpha, vec![Value::Text("A".into())]);
    let (omega, _) = ring.lookup(10, "omega").unwrap();
    assert_eq!(omega, vec![Value::Text("Z".into())]);
}

/// S3 - graceful leave hands bindings to the successor.
#[test]
fn graceful_leave_hands_bindings_to_successor() {
    let ring = ring(8);
    ring.build(&[10, 50, 100, 150, 200], &[]).unwrap();
    ring.insert(10, "a", Value::Text("1".into())).unwrap();
    ring.insert(10, "b", Value::Text("2".into())).unwrap();

    let owner_of_a = ring.find_successor(10, hash_key("a", 8)).unwrap();
    let owner_of_b = ring.find_successor(10, hash_key("b", 8)).unwrap();

    ring.leave(100, true).unwrap();

    let mut observed = ring.all_node_ids();
    observed.sort_unstable();
    assert_eq!(observed, vec![10, 50, 150, 200]);

    // Whatever 100 used to own must now resolve to the same value through
    // its successor (150), and every other binding is untouched.
    let (a, _) = ring.lookup(10, "a").unwrap();
    let (b, _) = ring.lookup(10, "b").unwrap();
    assert_eq!(a, vec![Value::Text("1".into())]);
    assert_eq!(b, vec![Value::Text("2".into())]);

    if owner_of_a == 100 {
        assert_eq!(ring.find_successor(10, hash_key("a", 8)).unwrap(), 150);
    }
    if owner_of_b == 100 {
        assert_eq!(ring.find_successor(10, hash_key("b", 8)).unwrap(), 150);
    }
}

/// Invariant 8 - repeated join/leave are no-ops.
#[test]
fn repeated_join_and_leave_are_no_ops() {
    let ring = ring(8);
    ring.build(&[10, 50, 100], &[]).unwrap();

    assert_eq!(ring.join(10).unwrap(), 0);
    ring.leave(50, true).unwrap();
    assert_eq!(ring.leave(50, true).unwrap(), 0);
}

/// S6 - hop counting is reproducible across identical operations.
#[test]
fn hop_counts_are_reproducible() {
    let ring = ring(8);
    ring.build(&[10, 50, 100, 150, 200], &[("alpha".to_string(), Value::Text("A".into()))]).unwrap();

    let (_, h1) = ring.lookup(10, "alpha").unwrap();
    let (_, h2) = ring.lookup(10, "alpha").unwrap();
    assert_eq!(h1, h2);
}

/// Invariant 10 - the terminal store-op never contributes a hop.
#[test]
fn terminal_store_op_never_counts_as_a_hop() {
    let ring = ring(8);
    ring.build(&[10], &[]).unwrap();
    let (_, hops) = ring.lookup(10, "anything").unwrap();
    assert_eq!(hops, 0, "single peer ring: no forwarding possible, and the store-op itself never counts");
}
