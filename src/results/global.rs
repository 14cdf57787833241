//! Geometry-wide counters, hit/leak caches and texture autoscale limits.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::util::DVec3;

/// Capacity of the hit position cache.
pub const HIT_CACHE_SIZE: usize = 2048;
/// Capacity of the leak cache.
pub const LEAK_CACHE_SIZE: usize = 2048;
/// Initial minimum of a texture limit search.
pub const HIT_MAX: f64 = 1e38;

/// Kind of event stored in the hit cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitType {
    #[default]
    Des,
    Abs,
    Ref,
    Trans,
    TeleportSource,
    TeleportDest,
    Moving,
    /// End of a block of consecutive hits.
    Last,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitEntry {
    pub pos: DVec3,
    pub kind: HitType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakEntry {
    pub pos: DVec3,
    pub dir: DVec3,
}

/// Bounded cache of recent events.
///
/// A thread-local cache fills linearly and drops events once full. The shared
/// cache is a ring: merged blocks are written after the last one, wrapping
/// around and overwriting the oldest entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingCache<T> {
    entries: Vec<T>,
    capacity: usize,
    /// Slot following the most recently merged block.
    last_index: usize,
    /// Number of valid entries, at most `capacity`.
    size: usize,
}

impl<T: Copy + Default> RingCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![T::default(); capacity],
            capacity,
            last_index: 0,
            size: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    /// Append an entry to a local cache. Returns `false` when full.
    pub fn push(&mut self, entry: T) -> bool {
        if self.size >= self.capacity {
            return false;
        }
        self.entries[self.size] = entry;
        self.size += 1;
        true
    }

    /// Valid entries in storage order.
    pub fn entries(&self) -> &[T] {
        &self.entries[..self.size]
    }

    /// Copy the local block `block` after the last merged block.
    ///
    /// Returns the slot that follows the written block.
    pub fn append_block(&mut self, block: &RingCache<T>) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        for (i, e) in block.entries().iter().enumerate() {
            self.entries[(self.last_index + i) % self.capacity] = *e;
        }
        self.last_index = (self.last_index + block.size) % self.capacity;
        self.size = (self.size + block.size).min(self.capacity);
        self.last_index
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn clear(&mut self) {
        self.entries.fill(T::default());
        self.last_index = 0;
        self.size = 0;
    }
}

/// Geometry-wide event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalHitCounter {
    pub nb_mc_hit: u64,
    pub nb_hit_equiv: f64,
    pub nb_abs_equiv: f64,
    pub nb_desorbed: u64,
}

impl AddAssign<&GlobalHitCounter> for GlobalHitCounter {
    fn add_assign(&mut self, rhs: &GlobalHitCounter) {
        self.nb_mc_hit += rhs.nb_mc_hit;
        self.nb_hit_equiv += rhs.nb_hit_equiv;
        self.nb_abs_equiv += rhs.nb_abs_equiv;
        self.nb_desorbed += rhs.nb_desorbed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub all: f64,
    /// Ignoring the steady-state bucket.
    pub moments_only: f64,
}

/// Autoscale range of one texture quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureMinMax {
    pub min: MinMax,
    pub max: MinMax,
}

impl Default for TextureMinMax {
    fn default() -> Self {
        Self {
            min: MinMax {
                all: HIT_MAX,
                moments_only: HIT_MAX,
            },
            max: MinMax {
                all: 0.0,
                moments_only: 0.0,
            },
        }
    }
}

impl TextureMinMax {
    /// Widen the range with `value` of a cell.
    ///
    /// Only cells large enough take part; minimums only consider positive values.
    pub fn update(&mut self, value: f64, large_enough: bool, is_moment: bool) {
        if !large_enough {
            return;
        }
        self.max.all = self.max.all.max(value);
        if value > 0.0 && value < self.min.all {
            self.min.all = value;
        }
        if is_moment {
            self.max.moments_only = self.max.moments_only.max(value);
            if value > 0.0 && value < self.min.moments_only {
                self.min.moments_only = value;
            }
        }
    }

    /// Keep `old` for every bound the last search did not find.
    pub fn restore_unset(&mut self, old: &TextureMinMax) {
        if self.min.all == HIT_MAX {
            self.min.all = old.min.all;
        }
        if self.min.moments_only == HIT_MAX {
            self.min.moments_only = old.min.moments_only;
        }
        if self.max.all == 0.0 {
            self.max.all = old.max.all;
        }
        if self.max.moments_only == 0.0 {
            self.max.moments_only = old.max.moments_only;
        }
    }
}

/// Indices into [`GlobalHits::texture_limits`].
pub mod texture_quantity {
    pub const PRESSURE: usize = 0;
    pub const IMPINGEMENT_RATE: usize = 1;
    pub const DENSITY: usize = 2;
}

/// Geometry-wide results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalHits {
    pub hits: GlobalHitCounter,
    /// Distance traveled by all particles, including partial flights [cm].
    pub dist_traveled_total: f64,
    /// Distance traveled between full hits only [cm].
    pub dist_traveled_full_hits_only: f64,
    pub nb_leak_total: u64,
    pub hit_cache: RingCache<HitEntry>,
    pub leak_cache: RingCache<LeakEntry>,
    /// Pressure, impingement rate and density ranges.
    pub texture_limits: [TextureMinMax; 3],
}

impl Default for GlobalHits {
    fn default() -> Self {
        Self {
            hits: GlobalHitCounter::default(),
            dist_traveled_total: 0.0,
            dist_traveled_full_hits_only: 0.0,
            nb_leak_total: 0,
            hit_cache: RingCache::new(HIT_CACHE_SIZE),
            leak_cache: RingCache::new(LEAK_CACHE_SIZE),
            texture_limits: [TextureMinMax::default(); 3],
        }
    }
}

impl GlobalHits {
    /// Add counters and append the caches of a thread-local instance.
    ///
    /// The slot after a merged hit block is marked [`HitType::Last`].
    pub fn merge_from(&mut self, local: &GlobalHits) {
        self.hits += &local.hits;
        self.dist_traveled_total += local.dist_traveled_total;
        self.dist_traveled_full_hits_only += local.dist_traveled_full_hits_only;
        self.nb_leak_total += local.nb_leak_total;

        self.leak_cache.append_block(&local.leak_cache);
        if !local.hit_cache.is_empty() {
            let next = self.hit_cache.append_block(&local.hit_cache);
            if let Some(slot) = self.hit_cache.slot_mut(next) {
                slot.kind = HitType::Last;
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_cache_saturates() {
        let mut c = RingCache::<LeakEntry>::new(3);
        for _ in 0..5 {
            c.push(LeakEntry::default());
        }
        assert_eq!(c.len(), 3);
        assert!(!c.push(LeakEntry::default()));
    }

    #[test]
    fn test_ring_wraps() {
        let mut shared = RingCache::<HitEntry>::new(4);
        let mut block = RingCache::<HitEntry>::new(4);
        for i in 0..3 {
            block.push(HitEntry {
                pos: DVec3::splat(i as f64),
                kind: HitType::Ref,
            });
        }
        assert_eq!(shared.append_block(&block), 3);
        assert_eq!(shared.append_block(&block), 2);
        assert_eq!(shared.len(), 4);
        // second block wrapped over slots 3, 0, 1
        assert_eq!(shared.entries()[3].pos, DVec3::ZERO);
        assert_eq!(shared.entries()[1].pos, DVec3::splat(2.0));
    }

    #[test]
    fn test_merge_marks_pen_up() {
        let mut shared = GlobalHits::default();
        let mut local = GlobalHits::default();
        local.hits.nb_desorbed = 2;
        local.nb_leak_total = 1;
        local.hit_cache.push(HitEntry {
            pos: DVec3::X,
            kind: HitType::Des,
        });
        local.hit_cache.push(HitEntry {
            pos: DVec3::Y,
            kind: HitType::Abs,
        });
        shared.merge_from(&local);
        shared.merge_from(&local);
        assert_eq!(shared.hits.nb_desorbed, 4);
        assert_eq!(shared.nb_leak_total, 2);
        assert_eq!(shared.hit_cache.last_index(), 4);
        assert_eq!(shared.hit_cache.len(), 4);
    }

    #[test]
    fn test_texture_limits() {
        let mut lim = TextureMinMax::default();
        lim.update(5.0, true, false);
        lim.update(0.0, true, true);
        lim.update(100.0, false, true);
        assert_eq!(lim.max.all, 5.0);
        assert_eq!(lim.min.all, 5.0);
        assert_eq!(lim.max.moments_only, 0.0);

        let old = TextureMinMax {
            min: MinMax {
                all: 1.0,
                moments_only: 2.0,
            },
            max: MinMax {
                all: 3.0,
                moments_only: 4.0,
            },
        };
        lim.restore_unset(&old);
        assert_eq!(lim.min.moments_only, 2.0);
        assert_eq!(lim.max.moments_only, 4.0);
        assert_eq!(lim.max.all, 5.0);
    }
}
