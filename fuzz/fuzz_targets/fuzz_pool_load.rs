#![no_main]
use libfuzzer_sys::fuzz_target;
use shard_slots::{BitPool, GrowthPolicy};

// Any byte string is a valid bitmap
fuzz_target!(|input: &[u8]| {
    let target = input.first().copied().unwrap_or(0) as u32 * 4;

    let pool = match BitPool::load(input.to_vec(), target, GrowthPolicy::Manual) {
        Ok(pool) => pool,
        Err(_) => return,
    };

    assert!(pool.as_bytes().len() >= input.len());
    assert_eq!(&pool.as_bytes()[..input.len()], input);
    assert!(pool.capacity() >= target);

    let first_free = (0..pool.capacity()).find(|&slot| pool.is_free(slot));
    assert_eq!(pool.head(), first_free.unwrap_or(pool.capacity()));
    assert_eq!(pool.next_free(), first_free);
});
