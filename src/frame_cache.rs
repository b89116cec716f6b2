//! Single-slot per-frame memoization for derived shader parameters.

/// Caches one computed value, tagged with the frame index it was computed at.
///
/// Several shader parameters are derived from ambient game state that cannot
/// change within a frame, but the deriving functions are called more than
/// once per frame (and are not free: biome checks, sky sampling). A
/// `FrameCache` recomputes only when the frame index moves on; within a frame
/// the stored value is returned bit-identical.
///
/// This is deliberately not a general cache — there is exactly one slot and
/// no eviction, because a stale value is worthless the moment the frame
/// index changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCache<T> {
    slot: Option<(u64, T)>,
}

impl<T: Copy> FrameCache<T> {
    /// Creates an empty cache; the first lookup always computes.
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Returns the cached value for `frame`, running `compute` only when the
    /// stored value belongs to a different frame (or none is stored).
    pub fn get_or_insert_with(&mut self, frame: u64, compute: impl FnOnce() -> T) -> T {
        match self.slot {
            Some((cached_frame, value)) if cached_frame == frame => value,
            _ => {
                let value = compute();
                self.slot = Some((frame, value));
                value
            }
        }
    }

    /// The cached value for `frame`, if one is stored.
    pub fn get(&self, frame: u64) -> Option<T> {
        match self.slot {
            Some((cached_frame, value)) if cached_frame == frame => Some(value),
            _ => None,
        }
    }
}
