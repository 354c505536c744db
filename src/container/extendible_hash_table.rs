use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Bucket payload: the key/value pairs plus the number of hash bits every
/// resident key agrees on.
struct BucketInner<K, V> {
    local_depth: usize,
    entries: Vec<(K, V)>,
}

/// A bucket carries its own latch, so it lives and dies with the latch
/// that guards it and the directory holds nothing but `Arc`s.
struct Bucket<K, V> {
    inner: RwLock<BucketInner<K, V>>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize, entries: Vec<(K, V)>) -> Self {
        Self {
            inner: RwLock::new(BucketInner {
                local_depth,
                entries,
            }),
        }
    }
}

/// Directory shape: `2^global_depth` slots, each referencing a bucket.
/// Several slots may share one bucket while its local depth trails the
/// global depth.
struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    slots: Vec<Arc<Bucket<K, V>>>,
}

/// A concurrent extendible hash table.
///
/// Used as the buffer pool's page table: the key space is open-ended while
/// residency is bounded, so the table grows by doubling its directory
/// instead of rehashing. Point operations are amortized O(1) and never
/// pause for a full rehash.
///
/// Locking: one top-level mutex guards the directory shape (doubling, slot
/// reassignment, bucket creation); each bucket's contents sit behind the
/// bucket's own read/write latch. The lock order is always directory
/// before bucket and never bucket before bucket, so the table cannot
/// deadlock with itself.
///
/// The hasher is pluggable the way `HashMap`'s is; tests use a
/// deterministic hasher to pin down directory growth.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hasher: S,
    directory: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a table whose buckets hold up to `bucket_size` entries.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size >= 1, "bucket size must be at least 1");
        Self {
            bucket_size,
            hasher,
            directory: Mutex::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                slots: vec![Arc::new(Bucket::new(0, Vec::new()))],
            }),
        }
    }

    fn hash_of(&self, key: &K) -> usize {
        self.hasher.hash_one(key) as usize
    }

    fn slot_index(&self, key: &K, global_depth: usize) -> usize {
        self.hash_of(key) & ((1 << global_depth) - 1)
    }

    /// Looks up `key`, returning a clone of its value.
    ///
    /// The bucket latch is acquired before the directory lock is released,
    /// so a concurrent split cannot relocate the key in between.
    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.directory.lock();
        let bucket = Arc::clone(&dir.slots[self.slot_index(key, dir.global_depth)]);
        let inner = bucket.inner.read();
        drop(dir);

        inner
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts `key -> value`, overwriting in place when the key is already
    /// present. A full bucket is split (doubling the directory first when
    /// its local depth has caught up with the global depth) and the insert
    /// retried against the reshaped directory. Insert always succeeds.
    pub fn insert(&self, key: K, value: V) {
        loop {
            let mut dir = self.directory.lock();
            let idx = self.slot_index(&key, dir.global_depth);
            let bucket = Arc::clone(&dir.slots[idx]);
            let mut inner = bucket.inner.write();

            if let Some(entry) = inner.entries.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if inner.entries.len() < self.bucket_size {
                inner.entries.push((key, value));
                return;
            }

            if inner.local_depth == dir.global_depth {
                // Double the directory: the new upper half mirrors the
                // lower so every existing bucket keeps all its referents.
                let mirror = dir.slots.clone();
                dir.slots.extend(mirror);
                dir.global_depth += 1;
            }
            self.split_bucket(&mut dir, idx, &mut inner);
        }
    }

    /// Removes `key` if present. No merge on underflow.
    pub fn remove(&self, key: &K) -> bool {
        let dir = self.directory.lock();
        let bucket = Arc::clone(&dir.slots[self.slot_index(key, dir.global_depth)]);
        let mut inner = bucket.inner.write();
        drop(dir);

        match inner.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                inner.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Splits the full bucket at directory slot `idx`: bumps its local
    /// depth, moves every entry whose newly discriminating hash bit is set
    /// into a fresh sibling, and points the matching directory slots at the
    /// sibling.
    fn split_bucket(&self, dir: &mut Directory<K, V>, idx: usize, inner: &mut BucketInner<K, V>) {
        let old_depth = inner.local_depth;
        debug_assert!(old_depth < dir.global_depth);
        let discriminant = 1usize << old_depth;
        inner.local_depth += 1;

        let mut kept = Vec::with_capacity(self.bucket_size);
        let mut moved = Vec::new();
        for (k, v) in inner.entries.drain(..) {
            if self.hash_of(&k) & discriminant != 0 {
                moved.push((k, v));
            } else {
                kept.push((k, v));
            }
        }
        inner.entries = kept;

        let sibling = Arc::new(Bucket::new(inner.local_depth, moved));
        dir.num_buckets += 1;

        // Directory slots agreeing with the split bucket on the old low
        // bits and carrying the discriminating bit now select the sibling.
        let mask = (1usize << inner.local_depth) - 1;
        let pattern = (idx & (discriminant - 1)) | discriminant;
        for (slot, bucket_ref) in dir.slots.iter_mut().enumerate() {
            if slot & mask == pattern {
                *bucket_ref = Arc::clone(&sibling);
            }
        }
    }

    /// log2 of the directory size.
    pub fn global_depth(&self) -> usize {
        self.directory.lock().global_depth
    }

    /// Local depth of the bucket referenced by directory slot `dir_idx`.
    pub fn local_depth(&self, dir_idx: usize) -> usize {
        let dir = self.directory.lock();
        let bucket = Arc::clone(&dir.slots[dir_idx]);
        let inner = bucket.inner.read();
        drop(dir);
        inner.local_depth
    }

    /// Number of distinct buckets reachable from the directory.
    pub fn num_buckets(&self) -> usize {
        self.directory.lock().num_buckets
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }
}
