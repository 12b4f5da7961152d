use spin::Mutex;

/// Per-frame owner counts.
///
/// Maps a dense frame index (see
/// [`FrameRange::index_of`](pmm_addresses::FrameRange::index_of)) to the
/// number of active owners of that frame. A frame on the free list has count
/// 0 — logically "no owners"; a frame handed out by the allocator has count
/// exactly 1 until further [`retain`](Self::retain) calls raise it.
///
/// `CAPACITY` bounds the table at compile time; the used prefix is sized by
/// the bootstrapped range. Every read-modify-write goes through one
/// table-wide lock. Operations are O(1) and never block on anything but that
/// lock, so contention is brief.
///
/// Indexing outside the table is a programming-contract violation and
/// panics; so does decrementing a count that is already 0 (a double free) or
/// incrementing one (retaining a frame nobody owns). Counts never wrap.
pub struct RefCountTable<const CAPACITY: usize> {
    counts: Mutex<[u32; CAPACITY]>,
}

impl<const CAPACITY: usize> RefCountTable<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: Mutex::new([0; CAPACITY]),
        }
    }

    /// Force the count for `index` to exactly 1.
    ///
    /// Used when a frame transitions from free to live (and by bootstrap to
    /// plant the phantom owner it immediately releases).
    ///
    /// # Panics
    /// When `index` is outside the table.
    pub fn set_owned(&self, index: usize) {
        let mut counts = self.counts.lock();
        Self::check_index(index, "set_owned");
        counts[index] = 1;
    }

    /// Add one owner to a live frame.
    ///
    /// # Panics
    /// When `index` is outside the table or the frame has no owner: callers
    /// may only retain frames they already legitimately hold.
    pub fn retain(&self, index: usize) {
        let mut counts = self.counts.lock();
        Self::check_index(index, "retain");
        assert!(
            counts[index] > 0,
            "retain: frame index {index} has no owner"
        );
        counts[index] += 1;
    }

    /// Drop one owner and return the new count.
    ///
    /// Must be call-for-call paired with a prior allocation or
    /// [`retain`](Self::retain); the caller uses the zero/non-zero result to
    /// decide whether to physically reclaim the frame.
    ///
    /// # Panics
    /// When `index` is outside the table or the count is already 0 — the
    /// latter is a double free, not a recoverable condition.
    #[must_use = "the zero/non-zero result decides whether to reclaim the frame"]
    pub fn release_one(&self, index: usize) -> u32 {
        let mut counts = self.counts.lock();
        Self::check_index(index, "release_one");
        assert!(
            counts[index] > 0,
            "release_one: frame index {index} is already free"
        );
        counts[index] -= 1;
        counts[index]
    }

    /// Read-only snapshot of the count for `index`.
    ///
    /// # Panics
    /// When `index` is outside the table.
    #[must_use]
    pub fn count(&self, index: usize) -> u32 {
        let counts = self.counts.lock();
        Self::check_index(index, "count");
        counts[index]
    }

    fn check_index(index: usize, op: &str) {
        assert!(
            index < CAPACITY,
            "{op}: frame index {index} outside table of {CAPACITY} entries"
        );
    }
}

impl<const CAPACITY: usize> Default for RefCountTable<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
