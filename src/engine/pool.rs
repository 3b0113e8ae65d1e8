//! Fixed-capacity pool of reusable grain records.

use crate::backend::VoiceHandle;

// -------------------------------------------------------------------------------------------------

/// Index into a [`GrainPool`]. Only valid for the pool that handed it out, and only
/// until the grain is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrainId(usize);

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Grain {
    active: bool,
    handle: Option<VoiceHandle>,
    end_time: f64,
}

impl Grain {
    const fn idle() -> Self {
        Self {
            active: false,
            handle: None,
            end_time: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Preallocated grain records. No allocation happens after construction: acquiring
/// from an exhausted pool returns `None` and the caller drops the request.
#[derive(Debug)]
pub struct GrainPool {
    grains: Vec<Grain>,
    active_indices: Vec<usize>,
    free_indices: Vec<usize>,
}

impl GrainPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            grains: vec![Grain::idle(); capacity],
            active_indices: Vec::with_capacity(capacity),
            // pop from the back, so lower indices get reused first
            free_indices: (0..capacity).rev().collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.grains.len()
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active_indices.len()
    }

    /// Fraction of the pool currently in use (0..=1).
    pub fn utilization(&self) -> f32 {
        if self.grains.is_empty() {
            return 1.0;
        }
        self.active_indices.len() as f32 / self.grains.len() as f32
    }

    /// Ids of all currently active grains, in acquisition order.
    pub fn active_ids(&self) -> impl Iterator<Item = GrainId> + '_ {
        self.active_indices.iter().map(|&index| GrainId(index))
    }

    /// Backend handle of an active grain, if the grain has been started already.
    pub fn voice_handle(&self, id: GrainId) -> Option<VoiceHandle> {
        let grain = &self.grains[id.0];
        if grain.active {
            grain.handle
        } else {
            None
        }
    }

    /// Take a free grain record out of the pool. Returns `None` when exhausted.
    pub fn acquire(&mut self) -> Option<GrainId> {
        let index = self.free_indices.pop()?;
        let grain = &mut self.grains[index];
        debug_assert!(!grain.active, "Acquired a grain which is still in use");
        grain.active = true;
        grain.handle = None;
        grain.end_time = f64::INFINITY;
        self.active_indices.push(index);
        Some(GrainId(index))
    }

    /// Attach the backend voice and completion time to an acquired grain.
    pub fn start(&mut self, id: GrainId, handle: VoiceHandle, end_time: f64) {
        let grain = &mut self.grains[id.0];
        debug_assert!(grain.active, "Starting a grain which was never acquired");
        grain.handle = Some(handle);
        grain.end_time = end_time;
    }

    /// Return a grain record to the pool. Releasing an already released grain is a
    /// no-op: completion events may race with explicit stops.
    pub fn release(&mut self, id: GrainId) {
        let grain = &mut self.grains[id.0];
        if !grain.active {
            return;
        }
        grain.active = false;
        grain.handle = None;
        self.active_indices.retain(|&index| index != id.0);
        self.free_indices.push(id.0);
    }

    /// Release every grain whose playback end time has passed.
    pub fn release_elapsed(&mut self, now: f64) {
        let grains = &mut self.grains;
        let free_indices = &mut self.free_indices;
        self.active_indices.retain(|&index| {
            let grain = &mut grains[index];
            if grain.end_time <= now {
                grain.active = false;
                grain.handle = None;
                free_indices.push(index);
                false
            } else {
                true
            }
        });
    }

    /// Release everything at once.
    pub fn reset(&mut self) {
        self.release_elapsed(f64::INFINITY);
    }
}

// -------------------------------------------------------------------------------------------------
