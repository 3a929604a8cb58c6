#![no_main]
use libfuzzer_sys::{fuzz_target, arbitrary::{Arbitrary, Unstructured}};
use shard_slots::{BitPool, GrowthPolicy, MemoryStore};

#[derive(Debug, Arbitrary)]
enum PoolOp {
    Allocate,
    Release(u16),
    MarkUsed(u16),
    Grow(u8),
    Rescan,
    PersistAndReload,
}

// Random operation sequences must never break the bitmap invariants
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let manual: bool = match u.arbitrary() {
        Ok(m) => m,
        Err(_) => return,
    };
    let ops: Vec<PoolOp> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let growth = if manual { GrowthPolicy::Manual } else { GrowthPolicy::auto() };
    let mut pool = BitPool::new(growth);

    for op in ops.iter().take(256) {
        match op {
            PoolOp::Allocate => {
                if let Ok(slot) = pool.allocate() {
                    assert!(pool.is_used(slot));
                }
            }
            PoolOp::Release(slot) => {
                let _ = pool.release(*slot as u32);
            }
            PoolOp::MarkUsed(slot) => {
                let _ = pool.mark_used(*slot as u32);
            }
            PoolOp::Grow(by) => {
                let _ = pool.grow(*by as u32);
            }
            PoolOp::Rescan => pool.rescan(),
            PoolOp::PersistAndReload => {
                let mut store = MemoryStore::new();
                pool.persist(&mut store).unwrap();
                let reloaded = BitPool::load_from(&mut store, 0, growth).unwrap();
                assert_eq!(reloaded.as_bytes(), pool.as_bytes());
                pool = reloaded;
            }
        }

        assert_eq!(pool.capacity() % 8, 0);
        assert_eq!(pool.as_bytes().len() as u32 * 8, pool.capacity());
        assert!(pool.head() <= pool.capacity());
        for slot in 0..pool.head() {
            assert!(pool.is_used(slot));
        }
    }
});
