use std::collections::HashMap;
use std::fmt::Debug;

use rand::prelude::*;
use rand::{thread_rng, Rng};

use finetree::{Error, FineTree, LaneKey, NodeIds, TreeConfig};

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn config(fanout: usize, leaf_capacity: usize) -> TreeConfig {
    TreeConfig::default()
        .with_inner_fanout(fanout as u16)
        .with_leaf_capacity(leaf_capacity as u16)
}

fn test_insertion<K, V>(elements: Vec<(K, V)>, fanout: usize, leaf_capacity: usize, min_key: K)
where
    K: LaneKey + std::hash::Hash,
    V: Clone + PartialEq + Debug,
{
    let tree = FineTree::with_config(min_key, config(fanout, leaf_capacity));
    let mut expected = HashMap::new();
    for (key, val) in &elements {
        let prev = tree.insert(*key, val.clone()).unwrap();
        assert_eq!(prev, expected.insert(*key, val.clone()));
    }

    assert_eq!(tree.len(), expected.len());
    for (key, val) in &expected {
        assert_eq!(tree.get(key).unwrap().as_ref(), Some(val), "key {:?}", key);
    }
    let stats = tree.validate().unwrap();
    assert_eq!(stats.entries, expected.len());
}

fn fill(tree: &FineTree<u64, String>, size: u64) -> Vec<(u64, String)> {
    let mut expected_items = Vec::new();
    for key in 0..size {
        let val = thread_rng().gen::<usize>().to_string();
        tree.insert(key, val.clone()).unwrap();
        if thread_rng().gen_bool(0.3) {
            let val = thread_rng().gen::<usize>().to_string();
            tree.insert(key, val.clone()).unwrap();
            expected_items.push((key, val));
        } else {
            expected_items.push((key, val));
        }
    }
    expected_items
}

#[test]
fn sequential_key_insert() {
    let fanout: usize = thread_rng().gen_range(8..64);
    let leaf_capacity: usize = thread_rng().gen_range(8..256);
    println!("Fanout: {:?}, leaf capacity: {:?}", fanout, leaf_capacity);
    let tree_size = (leaf_capacity * fanout * 4) as u64;
    let elems: Vec<(u64, String)> = (0..tree_size)
        .map(|i| (i, thread_rng().gen::<usize>().to_string()))
        .collect();
    test_insertion(elems, fanout, leaf_capacity, 0);
}

#[test]
fn random_key_insert() {
    let fanout: usize = thread_rng().gen_range(8..64);
    let leaf_capacity: usize = thread_rng().gen_range(8..256);
    println!("Fanout: {:?}, leaf capacity: {:?}", fanout, leaf_capacity);
    let tree_size = leaf_capacity * fanout * 4;
    let elems: Vec<(i64, usize)> = (0..tree_size)
        .map(|_| (thread_rng().gen::<i64>(), thread_rng().gen::<usize>()))
        .collect();
    test_insertion(elems, fanout, leaf_capacity, i64::MIN);
}

/// Minimal node sizes force splits of every node type(leaf, inner and root).
#[test]
fn min_sized_node_inserts() {
    for fanout in 3..6usize {
        for leaf_capacity in 2..5usize {
            let tree_size = (fanout * leaf_capacity).pow(3) as u32;
            let mut elems: Vec<(u32, u32)> = (0..tree_size).map(|i| (i, i * 2)).collect();
            elems.shuffle(&mut thread_rng());
            test_insertion(elems, fanout, leaf_capacity, 0);
        }
    }
}

#[test]
fn narrow_key_types() {
    let elems: Vec<(u8, u8)> = (0..=255u8).map(|i| (i, i)).collect();
    test_insertion(elems, 4, 3, 0);
    let elems: Vec<(i16, i16)> = (-300..300i16).rev().map(|i| (i, -i)).collect();
    test_insertion(elems, 5, 7, i16::MIN);
}

#[test]
fn upsert() {
    let fanout: usize = thread_rng().gen_range(8..64);
    println!("Fanout: {:?}", fanout);
    let tree_size = fanout.pow(3);
    let elems: Vec<(u64, String)> = (0..tree_size)
        .map(|i| ((i % fanout) as u64, thread_rng().gen::<usize>().to_string()))
        .collect();
    test_insertion(elems, fanout, 16, 0);
}

#[test]
fn upsert_same_element() {
    let tree = FineTree::with_config(0u64, config(4, 4));
    for i in 0..1000usize {
        tree.insert(1, i).unwrap();
    }
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.get(&1).unwrap(), Some(999));
    let stats = tree.validate().unwrap();
    assert_eq!(stats.leaf_nodes, 1);
}

#[test]
fn deletes_starting_from_tree_start() {
    let fanout: usize = thread_rng().gen_range(3..64);
    let leaf_capacity: usize = thread_rng().gen_range(2..64);
    let size = (fanout * leaf_capacity * 8) as u64;
    println!("Fanout: {:?}, leaf capacity: {:?}", fanout, leaf_capacity);
    let tree = FineTree::with_config(0, config(fanout, leaf_capacity));
    for _ in 0..2 {
        let expected_items = fill(&tree, size);
        for (key, value) in &expected_items {
            assert_eq!(
                tree.delete(key)
                    .unwrap()
                    .expect("Inserted element cannot be deleted because not found"),
                *value
            );
            assert_eq!(tree.get(key).unwrap(), None);
        }
        assert!(tree.is_empty());
        tree.validate().unwrap();
    }
}

#[test]
fn deletes_starting_from_tree_end() {
    let fanout: usize = thread_rng().gen_range(3..64);
    let leaf_capacity: usize = thread_rng().gen_range(2..64);
    let size = (fanout * leaf_capacity * 8) as u64;
    println!("Fanout: {:?}, leaf capacity: {:?}", fanout, leaf_capacity);
    let tree = FineTree::with_config(0, config(fanout, leaf_capacity));
    for _ in 0..2 {
        let expected_items = fill(&tree, size);
        for (key, value) in expected_items.iter().rev() {
            assert_eq!(tree.delete(key).unwrap().as_ref(), Some(value));
        }
        assert!(tree.is_empty());
        tree.validate().unwrap();
    }
}

#[test]
fn random_deletes() {
    let fanout: usize = thread_rng().gen_range(8..32);
    let leaf_capacity: usize = thread_rng().gen_range(8..32);
    println!("Fanout: {:?}, leaf capacity: {:?}", fanout, leaf_capacity);
    let tree = FineTree::with_config(0, config(fanout, leaf_capacity));
    let mut expected_items = fill(&tree, 20_000);
    expected_items.shuffle(&mut thread_rng());

    let (deleted, kept) = expected_items.split_at(expected_items.len() / 2);
    for (key, value) in deleted {
        assert_eq!(tree.delete(key).unwrap().as_ref(), Some(value));
        // second delete of same key
        assert_eq!(tree.delete(key).unwrap(), None);
    }
    for (key, _) in deleted {
        assert_eq!(tree.get(key).unwrap(), None);
    }
    for (key, value) in kept {
        assert_eq!(tree.get(key).unwrap().as_ref(), Some(value));
    }
    let stats = tree.validate().unwrap();
    assert_eq!(stats.entries, kept.len());
}

#[test]
fn mixed_operations_against_hashmap() {
    for _ in 0..5 {
        let fanout: usize = thread_rng().gen_range(3..16);
        let leaf_capacity: usize = thread_rng().gen_range(2..16);
        let tree = FineTree::with_config(0, config(fanout, leaf_capacity));
        let mut expected: HashMap<u64, u64> = HashMap::new();
        for _ in 0..20_000 {
            let key = thread_rng().gen_range(0..2_000);
            match thread_rng().gen_range(0..3) {
                0 => assert_eq!(tree.delete(&key).unwrap(), expected.remove(&key)),
                1 => assert_eq!(tree.get(&key).unwrap(), expected.get(&key).copied()),
                _ => {
                    let value = thread_rng().gen::<u64>();
                    assert_eq!(tree.insert(key, value).unwrap(), expected.insert(key, value));
                }
            }
        }
        assert_eq!(tree.len(), expected.len());
        tree.validate()
            .unwrap_or_else(|err| panic!("{}\n{}", err, tree.describe()));
    }
}

#[test]
fn fill_and_drain_repeatedly() {
    let tree = FineTree::with_config(0, config(8, 8));
    for round in 0..3 {
        let mut keys: Vec<u64> = (0..5000).collect();
        keys.shuffle(&mut thread_rng());
        for key in &keys {
            tree.insert(*key, key.to_string()).unwrap();
        }
        assert!(tree.height() > 3, "round {}", round);
        keys.shuffle(&mut thread_rng());
        for key in &keys {
            tree.delete(key).unwrap();
        }
        let stats = tree.validate().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.height, 2);
        assert_eq!(tree.live_nodes(), 2);
    }
}

#[test]
fn scenario_a_lookup_after_insert() {
    let tree = FineTree::new(u64::MIN);
    tree.insert(5, "a").unwrap();
    assert_eq!(tree.get(&5).unwrap(), Some("a"));
    assert_eq!(tree.get(&6).unwrap(), None);
}

#[test]
fn scenario_b_leaf_split() {
    let leaf_capacity = 16;
    let tree = FineTree::with_config(0, config(8, leaf_capacity));
    for key in 0..leaf_capacity as u64 {
        tree.insert(key, key).unwrap();
    }
    let before = tree.validate().unwrap();
    assert_eq!(before.leaf_nodes, 1);

    tree.insert(leaf_capacity as u64, 0).unwrap();
    let after = tree.validate().unwrap();
    assert_eq!(after.leaf_nodes, 2);
    assert_eq!(after.inner_nodes, 1);
    let root_line = tree.describe().lines().next().unwrap().to_string();
    // root has 2 (separator, child) pairs now
    assert_eq!(root_line.matches(':').count(), 2, "{}", root_line);
    for key in 0..leaf_capacity as u64 {
        assert_eq!(tree.get(&key).unwrap(), Some(key));
    }
    assert_eq!(tree.get(&(leaf_capacity as u64)).unwrap(), Some(0));
}

#[test]
fn scenario_c_merge_removes_separator() {
    let tree = FineTree::with_config(0, config(4, 8));
    for key in 0..9u64 {
        tree.insert(key, key).unwrap();
    }
    // ids: root 0, first leaf 1, right leaf 2
    assert_eq!(tree.describe().lines().next().unwrap(), "InnerNode[0 @ 1]  0:1 4:2");

    for key in 0..3u64 {
        assert_eq!(tree.delete(&key).unwrap(), Some(key));
    }
    assert_eq!(tree.describe().lines().next().unwrap(), "InnerNode[0 @ 1]  0:1");
    for key in 0..3u64 {
        assert_eq!(tree.get(&key).unwrap(), None);
    }
    for key in 3..9u64 {
        assert_eq!(tree.get(&key).unwrap(), Some(key));
    }
    assert_eq!(tree.validate().unwrap().leaf_nodes, 1);
}

#[test]
fn shared_id_sequence() {
    let ids = NodeIds::new();
    let first: FineTree<u64, u64> = FineTree::with_node_ids(0, TreeConfig::default(), ids.clone());
    let second: FineTree<u64, u64> = FineTree::with_node_ids(0, TreeConfig::default(), ids.clone());
    assert_eq!(ids.allocated(), 4);
    assert_eq!(first.node_ids().allocated(), 4);

    // independent trees start their own sequence
    let third: FineTree<u64, u64> = FineTree::new(0);
    assert_eq!(third.node_ids().allocated(), 2);
    drop((first, second));
}

#[test]
fn node_limit() {
    let tree = FineTree::with_config(0u64, config(8, 4).with_max_nodes(16));
    let mut inserted = 0u64;
    let err = loop {
        match tree.insert(inserted, inserted) {
            Ok(_) => inserted += 1,
            Err(err) => break err,
        }
    };
    assert!(matches!(err, Error::ResourceExhausted { limit: Some(16), .. }));
    assert!(tree.live_nodes() <= 16);
    assert_eq!(tree.len() as u64, inserted);
    for key in 0..inserted {
        assert_eq!(tree.get(&key).unwrap(), Some(key));
    }
    assert_eq!(tree.get(&inserted).unwrap(), None);
    tree.validate().unwrap();

    // deletes free nodes which can be used by later inserts
    for key in 0..inserted {
        tree.delete(&key).unwrap();
    }
    assert_eq!(tree.live_nodes(), 2);
    for key in 0..inserted {
        tree.insert(key, key).unwrap();
    }
    tree.validate().unwrap();
}

#[test]
fn key_below_minimum_is_rejected() {
    let tree: FineTree<i32, &str> = FineTree::new(0);
    assert_eq!(tree.insert(-1, "x"), Err(Error::KeyBelowMinimum));
    assert!(tree.is_empty());
    assert_eq!(tree.get(&-1).unwrap(), None);
}
