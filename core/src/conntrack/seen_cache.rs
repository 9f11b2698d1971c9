//! Bounded, TTL'd cache of observed payload segments for retransmission
//! detection (`SeenSegmentCache`).

use hashlink::LinkedHashMap;

use super::conn_id::Direction;

/// An LRU-bounded cache of `(direction, sequence, length)` triples.
///
/// A triple probed a second time within `ttl_micros` of its last-seen time
/// is reported as a retransmission; otherwise it is recorded fresh. Entries
/// are evicted oldest-first once `capacity` is exceeded, bounding memory for
/// long-lived flows .
#[derive(Debug)]
pub struct SeenSegmentCache {
    capacity: usize,
    ttl_micros: i64,
    entries: LinkedHashMap<(Direction, u32, u32), i64>,
}

impl SeenSegmentCache {
    pub fn new(capacity: usize, ttl_micros: i64) -> Self {
        SeenSegmentCache {
            capacity,
            ttl_micros,
            entries: LinkedHashMap::new(),
        }
    }

    /// Probes `(direction, seq, len)` at `now_micros`.
    ///
    /// Returns `true` if this is a retransmission (seen before, within
    /// TTL); the entry's last-seen time is refreshed either way.
    pub fn probe(&mut self, direction: Direction, seq: u32, len: u32, now_micros: i64) -> bool {
        let key = (direction, seq, len);
        if let Some(&last_seen) = self.entries.get(&key) {
            let is_retransmission = now_micros.saturating_sub(last_seen) <= self.ttl_micros;
            self.entries.insert(key, now_micros);
            return is_retransmission;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.insert(key, now_micros);
        false
    }
}
