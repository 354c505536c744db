use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for one frame. The deque holds at most `k` timestamps,
/// oldest at the front.
#[derive(Debug)]
struct AccessSlot {
    history: VecDeque<Timestamp>,
    evictable: bool,
}

impl AccessSlot {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }

    fn record(&mut self, now: Timestamp, k: usize) {
        self.history.push_back(now);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Oldest retained timestamp. For a slot with fewer than `k` accesses
    /// this is its first access ever; for a slot with exactly `k` it is the
    /// kth-most-recent access, which orders backward K-distances.
    fn oldest(&self) -> Timestamp {
        *self.history.front().expect("slot with empty history")
    }
}

/// State behind the replacer's mutex. The clock lives here so that each
/// `record_access` observes and advances it atomically.
struct ReplacerState {
    slots: HashMap<FrameId, AccessSlot>,
    num_evictable: usize,
    clock: Timestamp,
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame with the largest backward K-distance:
/// the time elapsed since its kth-most-recent access. Frames with fewer
/// than K recorded accesses count as infinitely distant and are evicted
/// first, oldest first access winning among them.
///
/// The replacer guards its state with its own mutex so it is usable
/// standalone, even though the buffer pool only calls it from inside its
/// pool-wide critical section.
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `capacity` frames with parameter
    /// `k >= 1`.
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            k,
            capacity,
            state: Mutex::new(ReplacerState {
                slots: HashMap::new(),
                num_evictable: 0,
                clock: 0,
            }),
        }
    }

    /// Selects and removes a victim, or returns `None` when nothing is
    /// evictable.
    ///
    /// Frames with fewer than `k` accesses are preferred over frames with a
    /// full history; within the former group the oldest first access wins,
    /// within the latter the smallest kth-most-recent timestamp (i.e. the
    /// largest backward K-distance) wins.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        // (frame, oldest timestamp) accumulators; None until a candidate
        // is seen.
        let mut young: Option<(FrameId, Timestamp)> = None;
        let mut mature: Option<(FrameId, Timestamp)> = None;

        for (&frame_id, slot) in state.slots.iter() {
            if !slot.evictable {
                continue;
            }
            let oldest = slot.oldest();
            if slot.history.len() < self.k {
                if young.is_none_or(|(_, best)| oldest < best) {
                    young = Some((frame_id, oldest));
                }
            } else if mature.is_none_or(|(_, best)| oldest < best) {
                mature = Some((frame_id, oldest));
            }
        }

        let (victim, _) = young.or(mature)?;
        state.slots.remove(&victim);
        state.num_evictable -= 1;
        Some(victim)
    }

    /// Records an access to `frame_id` at the current clock value and
    /// advances the clock. The slot is created on first access and starts
    /// out non-evictable.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.capacity,
            "frame {frame_id} outside replacer capacity {}",
            self.capacity
        );

        let mut state = self.state.lock();
        let now = state.clock;
        state.clock += 1;
        state
            .slots
            .entry(frame_id)
            .or_insert_with(AccessSlot::new)
            .record(now, self.k);
    }

    /// Flips the evictable flag of a tracked frame, adjusting the evictable
    /// count when the flag actually changes. Calling this for a frame with
    /// no recorded access is a caller bug.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let slot = state
            .slots
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("set_evictable on untracked frame {frame_id}"));

        if slot.evictable != evictable {
            slot.evictable = evictable;
            if evictable {
                state.num_evictable += 1;
            } else {
                state.num_evictable -= 1;
            }
        }
    }

    /// Drops the slot for `frame_id`, e.g. when its page is deleted.
    /// Removing an untracked frame is a no-op; removing a non-evictable
    /// (pinned) frame is a caller bug.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.get(&frame_id) else {
            return;
        };
        assert!(slot.evictable, "remove of non-evictable frame {frame_id}");
        state.slots.remove(&frame_id);
        state.num_evictable -= 1;
    }

    /// Number of frames currently evictable.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// The K parameter of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
