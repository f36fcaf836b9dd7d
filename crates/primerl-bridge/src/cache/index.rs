//! In-process cache index, a subset/possibly-stale view of the
//! durable prefix cache's node sets, kept separate so warmth lookups never
//! need a network round trip.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
pub struct CacheIndex {
    index: RwLock<HashMap<[u8; 16], HashSet<String>>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, fp: [u8; 16], node_id: &str) {
        let mut index = self.index.write().expect("cache index lock poisoned");
        index.entry(fp).or_default().insert(node_id.to_string());
    }

    pub fn unregister_node(&self, node_id: &str) {
        let mut index = self.index.write().expect("cache index lock poisoned");
        for nodes in index.values_mut() {
            nodes.remove(node_id);
        }
    }

    pub fn lookup(&self, fp: Option<&[u8; 16]>) -> HashSet<String> {
        let Some(fp) = fp else {
            return HashSet::new();
        };
        let index = self.index.read().expect("cache index lock poisoned");
        index.get(fp).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_finds_node() {
        let idx = CacheIndex::new();
        let fp = [7u8; 16];
        idx.register(fp, "node-a");
        assert_eq!(idx.lookup(Some(&fp)), HashSet::from(["node-a".to_string()]));
    }

    #[test]
    fn unknown_fingerprint_is_empty() {
        let idx = CacheIndex::new();
        assert!(idx.lookup(Some(&[0u8; 16])).is_empty());
    }

    #[test]
    fn none_fingerprint_is_empty() {
        let idx = CacheIndex::new();
        assert!(idx.lookup(None).is_empty());
    }

    #[test]
    fn unregister_node_clears_it_from_every_entry() {
        let idx = CacheIndex::new();
        let fp_a = [1u8; 16];
        let fp_b = [2u8; 16];
        idx.register(fp_a, "node-a");
        idx.register(fp_b, "node-a");
        idx.register(fp_b, "node-b");

        idx.unregister_node("node-a");

        assert!(idx.lookup(Some(&fp_a)).is_empty());
        assert_eq!(idx.lookup(Some(&fp_b)), HashSet::from(["node-b".to_string()]));
    }
}
