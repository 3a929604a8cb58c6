//! Property-based tests for allocator correctness
//!
//! Uses proptest to drive random allocate/release/grow/reload sequences and
//! checks the pool against a simple set-based model after every step.

use proptest::prelude::*;
use proptest::sample::Index;
use shard_slots::{BitPool, GrowthPolicy, MemoryStore};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Release(Index),
    Grow(u32),
    PersistAndReload,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Allocate),
        3 => any::<Index>().prop_map(Op::Release),
        1 => (0u32..40).prop_map(Op::Grow),
        1 => Just(Op::PersistAndReload),
    ]
}

fn check_invariants(pool: &BitPool, used: &BTreeSet<u32>, capacity: u32) -> Result<(), TestCaseError> {
    prop_assert_eq!(pool.capacity(), capacity);
    prop_assert_eq!(pool.capacity() % 8, 0);
    prop_assert_eq!(pool.as_bytes().len() as u32, pool.capacity() / 8);
    prop_assert_eq!(pool.used_count() as usize, used.len());

    for slot in 0..pool.head() {
        prop_assert!(pool.is_used(slot), "slot {} below head {} is free", slot, pool.head());
    }
    for slot in 0..capacity {
        prop_assert_eq!(pool.is_used(slot), used.contains(&slot));
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_pool_matches_model(
        initial in 0u32..64,
        ops in prop::collection::vec(op_strategy(), 1..150)
    ) {
        let mut pool = BitPool::load(Vec::new(), initial, GrowthPolicy::auto()).unwrap();
        let mut capacity = (initial + 7) / 8 * 8;
        let mut used = BTreeSet::new();

        for op in ops {
            match op {
                Op::Allocate => {
                    let expected = (0..capacity).find(|slot| !used.contains(slot));
                    let slot = pool.allocate().unwrap();

                    match expected {
                        Some(lowest) => prop_assert_eq!(slot, lowest),
                        None => {
                            prop_assert_eq!(slot, capacity);
                            capacity += 8;
                        }
                    }
                    prop_assert!(used.insert(slot), "slot {} handed out twice", slot);
                }
                Op::Release(index) => {
                    if used.is_empty() {
                        continue;
                    }
                    let slot = *used.iter().nth(index.index(used.len())).unwrap();
                    pool.release(slot).unwrap();
                    used.remove(&slot);
                }
                Op::Grow(by) => {
                    pool.grow(by).unwrap();
                    capacity += (by + 7) / 8 * 8;
                }
                Op::PersistAndReload => {
                    let mut store = MemoryStore::new();
                    pool.persist(&mut store).unwrap();

                    let reloaded = BitPool::load_from(&mut store, 0, GrowthPolicy::auto()).unwrap();
                    prop_assert_eq!(reloaded.as_bytes(), pool.as_bytes());
                    pool = reloaded;
                }
            }

            check_invariants(&pool, &used, capacity)?;
        }
    }

    #[test]
    fn prop_no_double_allocation(count in 1usize..500) {
        let mut pool = BitPool::new(GrowthPolicy::auto());
        let mut seen = HashSet::new();

        for _ in 0..count {
            let slot = pool.allocate().unwrap();
            prop_assert!(seen.insert(slot), "slot {} allocated twice", slot);
        }
        prop_assert_eq!(pool.used_count() as usize, count);
    }

    #[test]
    fn prop_reuse_lowest_released(
        count in 2u32..200,
        victims in prop::collection::vec(any::<Index>(), 1..10)
    ) {
        let mut pool = BitPool::load(Vec::new(), count, GrowthPolicy::Manual).unwrap();
        for _ in 0..count {
            pool.allocate().unwrap();
        }

        let released: BTreeSet<u32> = victims
            .iter()
            .map(|index| index.index(count as usize) as u32)
            .collect();
        for &slot in &released {
            pool.release(slot).unwrap();
        }

        // Released slots come back lowest first
        for &slot in &released {
            prop_assert_eq!(pool.allocate().unwrap(), slot);
        }
    }

    #[test]
    fn prop_load_pads_without_truncating(
        bytes in prop::collection::vec(any::<u8>(), 0..32),
        target in 0u32..400
    ) {
        let pool = BitPool::load(bytes.clone(), target, GrowthPolicy::Manual).unwrap();

        let expected_len = bytes.len().max(((target + 7) / 8) as usize);
        prop_assert_eq!(pool.as_bytes().len(), expected_len);
        prop_assert_eq!(&pool.as_bytes()[..bytes.len()], bytes.as_slice());
        prop_assert!(pool.as_bytes()[bytes.len()..].iter().all(|&b| b == 0xFF));

        let first_free = (0..pool.capacity()).find(|&slot| pool.is_free(slot));
        prop_assert_eq!(pool.head(), first_free.unwrap_or(pool.capacity()));
    }
}
