use super::*;

fn key(n: u8) -> Fingerprint {
    Fingerprint::from_bytes([n, 0, 0, 0, 0, 0, 0, n])
}

fn put(cache: &ContentCache, n: u8) -> Option<Fingerprint> {
    cache.put(key(n), Arc::new(vec![n]), None)
}

#[test]
fn zero_capacity_is_rejected() {
    assert!(matches!(ContentCache::new(0), Err(BrokerError::Config(_))));
}

#[test]
fn overflow_keeps_the_most_recent_capacity_entries() {
    let cache = ContentCache::new(DEFAULT_CAPACITY).unwrap();
    let extra = 5u8;
    for n in 0..(DEFAULT_CAPACITY as u8 + extra) {
        put(&cache, n);
    }
    assert_eq!(cache.len(), DEFAULT_CAPACITY);
    for n in 0..extra {
        assert!(!cache.contains(&key(n)), "entry {n} should be evicted");
    }
    for n in extra..(DEFAULT_CAPACITY as u8 + extra) {
        assert!(cache.contains(&key(n)), "entry {n} should survive");
    }
}

#[test]
fn get_promotes_to_most_recently_used() {
    let cache = ContentCache::new(3).unwrap();
    put(&cache, 1);
    put(&cache, 2);
    put(&cache, 3);

    let hit = cache.get(&key(1)).unwrap();
    assert_eq!(hit.fingerprint, key(1));
    assert_eq!(*hit.bytes, vec![1]);

    assert_eq!(put(&cache, 4), Some(key(2)));
    assert_eq!(cache.keys_by_recency(), vec![key(4), key(1), key(3)]);
}

#[test]
fn put_existing_key_replaces_and_promotes_without_eviction() {
    let cache = ContentCache::new(2).unwrap();
    put(&cache, 1);
    put(&cache, 2);

    assert_eq!(
        cache.put(key(1), Arc::new(vec![9, 9]), Some("<svg/>".to_string())),
        None
    );
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.keys_by_recency(), vec![key(1), key(2)]);

    let e = cache.get(&key(1)).unwrap();
    assert_eq!(*e.bytes, vec![9, 9]);
    assert_eq!(e.vector_text.as_deref(), Some("<svg/>"));
}

#[test]
fn miss_returns_none_and_contains_does_not_promote() {
    let cache = ContentCache::new(2).unwrap();
    assert!(cache.get(&key(7)).is_none());
    put(&cache, 1);
    put(&cache, 2);
    assert!(cache.contains(&key(1)));
    assert_eq!(put(&cache, 3), Some(key(1)));
}

#[test]
fn concurrent_access_stays_bounded() {
    let cache = Arc::new(ContentCache::new(8).unwrap());
    let handles = (0..4u8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for n in 0..32u8 {
                    let k = Fingerprint::from_bytes([t, n, 0, 0, 0, 0, 0, 0]);
                    cache.put(k, Arc::new(vec![t, n]), None);
                    let _ = cache.get(&k);
                }
            })
        })
        .collect::<Vec<_>>();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(cache.len(), 8);
}
