//! File directory of the name server.
//!
//! Records live in a fixed array of hash buckets. A small most-recently-used
//! cache of weak references sits in front of it; lookups that hit the cache
//! skip the bucket walk. Records are immutable once inserted: changes go
//! through `insert` with a modified clone, so a caller holding an old
//! `Arc<FileRecord>` keeps a consistent snapshot.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use docs_core::FileMeta;

use crate::ConnId;

pub const BUCKETS: usize = 1024;
pub const CACHE_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    /// Connection id of the storage server holding the bytes.
    pub node: ConnId,
    pub meta: FileMeta,
}

/// djb2: `h = h * 33 + c` starting at 5381.
pub fn bucket_of(name: &str) -> usize {
    let hash = name
        .bytes()
        .fold(5381u64, |h, c| h.wrapping_mul(33).wrapping_add(u64::from(c)));
    (hash % BUCKETS as u64) as usize
}

#[derive(Debug)]
pub struct FileDirectory {
    buckets: Vec<Vec<Arc<FileRecord>>>,
    /// Front is the most recently used entry.
    cache: VecDeque<(String, Weak<FileRecord>)>,
    len: usize,
}

impl Default for FileDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDirectory {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); BUCKETS],
            cache: VecDeque::with_capacity(CACHE_CAPACITY + 1),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn find(&mut self, name: &str) -> Option<Arc<FileRecord>> {
        if let Some(pos) = self.cache.iter().position(|(key, _)| key == name) {
            match self.cache[pos].1.upgrade() {
                Some(record) => {
                    if let Some(entry) = self.cache.remove(pos) {
                        self.cache.push_front(entry);
                    }
                    return Some(record);
                }
                None => {
                    self.cache.remove(pos);
                }
            }
        }

        let record = self.lookup(name)?;
        self.cache
            .push_front((name.to_string(), Arc::downgrade(&record)));
        if self.cache.len() > CACHE_CAPACITY {
            self.cache.pop_back();
        }
        Some(record)
    }

    /// Bucket lookup that leaves the cache alone.
    pub fn lookup(&self, name: &str) -> Option<Arc<FileRecord>> {
        self.buckets[bucket_of(name)]
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn cache_contains(&self, name: &str) -> bool {
        self.cache.iter().any(|(key, _)| key == name)
    }

    /// Adds `record`, replacing any record with the same name. A cached
    /// entry for the name is pointed at the new record.
    pub fn insert(&mut self, record: FileRecord) -> Arc<FileRecord> {
        let record = Arc::new(record);
        let bucket = &mut self.buckets[bucket_of(&record.name)];
        match bucket.iter_mut().find(|r| r.name == record.name) {
            Some(slot) => *slot = Arc::clone(&record),
            None => {
                bucket.insert(0, Arc::clone(&record));
                self.len += 1;
            }
        }
        if let Some((_, weak)) = self.cache.iter_mut().find(|(key, _)| *key == record.name) {
            *weak = Arc::downgrade(&record);
        }
        record
    }

    /// Removes a record. Its cache entry goes first so the cache never
    /// points at a removed record.
    pub fn remove(&mut self, name: &str) -> Option<Arc<FileRecord>> {
        self.cache.retain(|(key, _)| key != name);
        let bucket = &mut self.buckets[bucket_of(name)];
        let pos = bucket.iter().position(|r| r.name == name)?;
        self.len -= 1;
        Some(bucket.remove(pos))
    }

    /// All records, sorted by name.
    pub fn records(&self) -> Vec<Arc<FileRecord>> {
        let mut all: Vec<_> = self.buckets.iter().flatten().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn records_on(&self, node: ConnId) -> usize {
        self.buckets
            .iter()
            .flatten()
            .filter(|r| r.node == node)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, owner: &str) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            node: 1,
            meta: FileMeta::new(owner),
        }
    }

    #[test]
    fn insert_twice_keeps_count() {
        let mut dir = FileDirectory::new();
        dir.insert(record("r.txt", "alice"));
        dir.insert(record("r.txt", "bob"));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.find("r.txt").unwrap().meta.owner, "bob");
    }

    #[test]
    fn cache_evicts_least_recent_but_table_still_answers() {
        let mut dir = FileDirectory::new();
        for i in 0..=CACHE_CAPACITY {
            dir.insert(record(&format!("f{i}"), "alice"));
        }
        for i in 0..=CACHE_CAPACITY {
            assert!(dir.find(&format!("f{i}")).is_some());
        }
        assert!(!dir.cache_contains("f0"));
        assert!(dir.cache_contains("f1"));
        assert!(dir.cache_contains(&format!("f{CACHE_CAPACITY}")));

        assert_eq!(dir.find("f0").unwrap().name, "f0");
        assert!(dir.cache_contains("f0"));
        assert!(!dir.cache_contains("f1"));
    }

    #[test]
    fn hit_promotes_to_front() {
        let mut dir = FileDirectory::new();
        for i in 0..CACHE_CAPACITY {
            dir.insert(record(&format!("f{i}"), "alice"));
            dir.find(&format!("f{i}"));
        }
        dir.find("f0");
        dir.insert(record("new", "alice"));
        dir.find("new");
        assert!(dir.cache_contains("f0"));
        assert!(!dir.cache_contains("f1"));
    }

    #[test]
    fn remove_purges_cache() {
        let mut dir = FileDirectory::new();
        dir.insert(record("r.txt", "alice"));
        dir.find("r.txt");
        assert!(dir.cache_contains("r.txt"));
        assert!(dir.remove("r.txt").is_some());
        assert!(!dir.cache_contains("r.txt"));
        assert!(dir.find("r.txt").is_none());
        assert!(dir.is_empty());
        assert!(dir.remove("r.txt").is_none());
    }

    #[test]
    fn replaced_record_is_seen_through_cache() {
        let mut dir = FileDirectory::new();
        dir.insert(record("r.txt", "alice"));
        let old = dir.find("r.txt").unwrap();
        let mut changed = (*old).clone();
        changed.meta.size = 42;
        dir.insert(changed);
        assert_eq!(dir.find("r.txt").unwrap().meta.size, 42);
        assert_eq!(old.meta.size, 0);
    }

    #[test]
    fn colliding_names_share_a_bucket() {
        // "Ez" and "FY" collide under djb2.
        assert_eq!(bucket_of("Ez"), bucket_of("FY"));
        let mut dir = FileDirectory::new();
        dir.insert(record("Ez", "alice"));
        dir.insert(record("FY", "bob"));
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.find("Ez").unwrap().meta.owner, "alice");
        assert_eq!(dir.find("FY").unwrap().meta.owner, "bob");
        dir.remove("Ez");
        assert!(dir.find("FY").is_some());
    }
}
