//! Rotation LRU cache for the 2D batcher (spec §4.8).
//!
//! Incoming quads carry a full Euler rotation but the instance record
//! only stores a `(sin, cos)` pair for the Z axis; many quads share the
//! same handful of angles (grid-aligned sprites, cardinal facings), so
//! a small tolerance-bucketed LRU avoids re-computing `sin`/`cos` for
//! repeats.

struct CachedRotation {
    key: (f32, f32, f32),
    sin_cos: (f32, f32),
    frame_last_used: u64,
}

fn within_tolerance(a: (f32, f32, f32), b: (f32, f32, f32), tolerance: f32) -> bool {
    (a.0 - b.0).abs() <= tolerance && (a.1 - b.1).abs() <= tolerance && (a.2 - b.2).abs() <= tolerance
}

/// Capacity-bounded, tolerance-deduplicated `(sin, cos)` cache.
pub struct RotationCache {
    capacity: usize,
    tolerance: f32,
    entries: Vec<CachedRotation>,
}

impl RotationCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(16), tolerance: 1e-3, entries: Vec::new() }
    }

    /// Looks up `euler` within tolerance; on miss, computes `(sin, cos)`
    /// of the Z component, evicting the least-recently-used entry if
    /// the cache is at capacity.
    pub fn get_or_insert(&mut self, euler: (f32, f32, f32), frame: u64) -> (f32, f32) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| within_tolerance(entry.key, euler, self.tolerance)) {
            entry.frame_last_used = frame;
            return entry.sin_cos;
        }

        let sin_cos = euler.2.sin_cos();
        let sin_cos = (sin_cos.0, sin_cos.1);

        if self.entries.len() >= self.capacity {
            let lru = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.frame_last_used)
                .map(|(index, _)| index)
                .expect("capacity is always > 0");
            self.entries.remove(lru);
        }

        self.entries.push(CachedRotation { key: euler, sin_cos, frame_last_used: frame });
        sin_cos
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_angle_within_tolerance_is_a_cache_hit() {
        let mut cache = RotationCache::new(16);
        let a = cache.get_or_insert((0.0, 0.0, 0.5), 0);
        let b = cache.get_or_insert((0.0, 0.0, 0.5 + 1e-4), 1);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn angle_outside_tolerance_is_a_new_entry() {
        let mut cache = RotationCache::new(16);
        cache.get_or_insert((0.0, 0.0, 0.0), 0);
        cache.get_or_insert((0.0, 0.0, 1.0), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_drops_the_least_recently_used_entry() {
        let mut cache = RotationCache::new(16);
        for i in 0..16 {
            cache.get_or_insert((0.0, 0.0, i as f32), i as u64);
        }
        // touch every entry except angle 0.0 so it becomes the LRU
        for i in 1..16 {
            cache.get_or_insert((0.0, 0.0, i as f32), 100 + i as u64);
        }
        cache.get_or_insert((0.0, 0.0, 99.0), 200);
        assert_eq!(cache.len(), 16);
        // angle 0.0's frame_last_used (0) was never refreshed, so it was evicted;
        // looking it up again must count as a fresh insert rather than a hit.
        let before = cache.len();
        cache.get_or_insert((0.0, 0.0, 0.0), 300);
        assert_eq!(cache.len(), before);
    }
}
