//! Consistent-hash ring for client-side sharding.
//!
//! The ring is a continuum of points over the 32-bit hash space. Each node
//! contributes a number of points proportional to its weight, so adding or
//! removing one node only remaps roughly its share of the keyspace instead
//! of reshuffling everything. Lookup finds the first point at or past the
//! key's hash, wrapping around at the top of the space.

use md5::{Digest, Md5};

/// Ring points contributed per unit of node weight.
const POINTS_PER_WEIGHT: usize = 160;

/// A weighted consistent-hash ring over connection ids.
///
/// The ring stores ids, not connections; resolving an id to a live
/// connection is the pool's job. Mutation takes `&mut self`, so no lookup
/// can observe a half-rebuilt ring.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    /// `(position, id)` pairs, sorted by position then id.
    points: Vec<(u32, String)>,
    /// Distinct nodes currently on the ring.
    nodes: usize,
}

impl HashRing {
    /// Creates an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// The 32-bit hash used for both ring placement and key lookup.
    ///
    /// First four bytes of the MD5 digest, big-endian. Exposed so key
    /// extraction and ring placement agree on one hash function.
    pub fn hash_key(key: &[u8]) -> u32 {
        let digest = Md5::digest(key);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Inserts a node, contributing `160 × weight` points.
    ///
    /// Re-adding an existing id replaces its previous points, so an id
    /// never occupies the ring twice.
    pub fn add(&mut self, id: &str, weight: u32) {
        self.remove(id);

        let count = POINTS_PER_WEIGHT * weight as usize;
        self.points.reserve(count);
        for replica in 0..count {
            let position = Self::hash_key(format!("{id}|{replica}").as_bytes());
            self.points.push((position, id.to_string()));
        }
        // ties on position are broken by id so lookups stay deterministic
        self.points
            .sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.nodes += 1;
    }

    /// Removes every point owned by the given id.
    ///
    /// Returns true if the node was on the ring.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.points.len();
        self.points.retain(|(_, node)| node != id);
        let removed = self.points.len() != before;
        if removed {
            self.nodes -= 1;
        }
        removed
    }

    /// Returns the node owning the given hash.
    ///
    /// Picks the first point whose position is at or past `hash`, wrapping
    /// to the first point of the ring. `None` only for an empty ring.
    pub fn get(&self, hash: u32) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let idx = match self.points.binary_search_by(|(pos, _)| pos.cmp(&hash)) {
            Ok(idx) => idx,
            Err(idx) if idx == self.points.len() => 0,
            Err(idx) => idx,
        };
        Some(self.points[idx].1.as_str())
    }

    /// Looks up the owning node for a key's bytes.
    pub fn get_by_key(&self, key: &[u8]) -> Option<&str> {
        self.get(Self::hash_key(key))
    }

    /// Number of points on the ring.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if no node is on the ring.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of distinct nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.nodes
    }
}
