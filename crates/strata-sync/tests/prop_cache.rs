use proptest::prelude::*;
use std::collections::VecDeque;
use strata_sync::SparseCache;

#[derive(Clone, Debug)]
enum Op {
    Get(u8),
    Set(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..32).prop_map(Op::Get),
        (0u8..32).prop_map(Op::Set),
        (0u8..32).prop_map(Op::Remove),
    ]
}

proptest! {
    // The cache evicts exactly what a reference LRU list evicts.
    #[test]
    fn matches_reference_lru(limit in 1usize..12, ops in prop::collection::vec(op(), 0..200)) {
        let cache: SparseCache<u8, u32> = SparseCache::new(limit);
        let mut model: VecDeque<u8> = VecDeque::new();
        let touch = |m: &mut VecDeque<u8>, k: u8| {
            m.retain(|x| *x != k);
            m.push_back(k);
        };
        for op in ops {
            match op {
                Op::Get(k) => {
                    let hit = cache.get(&k).is_some();
                    prop_assert_eq!(hit, model.contains(&k));
                    if hit { touch(&mut model, k); }
                }
                Op::Set(k) => {
                    cache.set(k, u32::from(k) * 10);
                    touch(&mut model, k);
                    while model.len() > limit { model.pop_front(); }
                }
                Op::Remove(k) => {
                    let had = cache.remove(&k).is_some();
                    prop_assert_eq!(had, model.contains(&k));
                    model.retain(|x| *x != k);
                }
            }
            prop_assert!(cache.len() <= limit);
            prop_assert_eq!(cache.keys(), model.iter().copied().collect::<Vec<_>>());
        }
    }

    // Filling past the limit leaves exactly the most recent `limit` keys.
    #[test]
    fn resident_set_after_overflow(limit in 1usize..16, extra in 1usize..16) {
        let cache: SparseCache<u32, u32> = SparseCache::new(limit);
        let n = limit + extra;
        for k in 0..n as u32 {
            cache.get_or_create(k, || k);
        }
        prop_assert_eq!(cache.len(), limit);
        prop_assert_eq!(cache.stats().evictions, extra as u64);
        let expect: Vec<u32> = (extra as u32..n as u32).collect();
        prop_assert_eq!(cache.keys(), expect);
    }
}
