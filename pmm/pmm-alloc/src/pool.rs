use crate::FrameAlloc;
use crate::free_list::FreeList;
use crate::ref_count::RefCountTable;
use core::ptr;
use log::{debug, trace};
use pmm_addresses::{FRAME_SIZE, FrameRange, PhysicalAddress, PhysicalFrame};
use spin::{Mutex, Once};

/// Byte written over a frame's contents as it is handed out, to surface
/// use-before-initialize bugs.
pub const ALLOC_FILL: u8 = 0x05;

/// Byte written over a frame's contents as it returns to the free list, to
/// catch dangling references to reclaimed memory.
pub const FREE_FILL: u8 = 0x01;

/// The physical page-frame pool.
///
/// Owns the free list and the per-frame [`RefCountTable`]; every allocation
/// and every release updates both, so a frame can be safely shared across
/// multiple owners (e.g. parent and child after a fork) and only returns to
/// the pool when the last owner lets go.
///
/// `CAPACITY` is the compile-time bound on the number of managed frames; the
/// actual managed range arrives once through [`bootstrap`](Self::bootstrap).
/// [`new`](Self::new) is `const`, so an embedder may place the pool in a
/// `static` and pass it by reference to every call site.
///
/// The free list and the table are guarded by two independent locks, never
/// held at the same time: [`release`](Self::release) fully drops the table
/// lock before (conditionally) taking the free-list lock, and
/// [`allocate`](Self::allocate) fully drops the free-list lock before taking
/// the table lock.
pub struct FramePool<const CAPACITY: usize> {
    /// Managed range; set exactly once by [`bootstrap`](Self::bootstrap).
    range: Once<FrameRange>,
    free: Mutex<FreeList>,
    refs: RefCountTable<CAPACITY>,
}

impl<const CAPACITY: usize> FramePool<CAPACITY> {
    /// An empty pool managing nothing.
    ///
    /// [`allocate`](Self::allocate) returns `None` until
    /// [`bootstrap`](Self::bootstrap) has seeded a range.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            range: Once::new(),
            free: Mutex::new(FreeList::new()),
            refs: RefCountTable::new(),
        }
    }

    /// Seed every frame of `[start, limit)` into the free pool.
    ///
    /// `start` is rounded up and `limit` down to frame boundaries. Each frame
    /// gets a phantom owner (`set_owned`) which is immediately dropped
    /// through the ordinary [`release`](Self::release) path — seeding reuses
    /// the exact decrement/reclaim logic of normal operation, so the list and
    /// the table cannot drift apart.
    ///
    /// Callable exactly once, during system start-up.
    ///
    /// # Errors
    /// - [`BootstrapError::AlreadyBootstrapped`] on any call after the first.
    /// - [`BootstrapError::EmptyRange`] when no whole frame fits the range.
    /// - [`BootstrapError::CapacityExceeded`] when the range holds more
    ///   frames than `CAPACITY`.
    ///
    /// On error the pool is left untouched.
    ///
    /// # Safety
    /// - `[start, limit)` must be real, writable memory, directly addressable
    ///   at these addresses, and exclusively owned by the pool from this call
    ///   on. Frame contents are overwritten.
    pub unsafe fn bootstrap(
        &self,
        start: PhysicalAddress,
        limit: PhysicalAddress,
    ) -> Result<(), BootstrapError> {
        let range = FrameRange::new(start, limit);
        if range.is_empty() {
            return Err(BootstrapError::EmptyRange);
        }
        if range.frame_count() > CAPACITY {
            return Err(BootstrapError::CapacityExceeded {
                frames: range.frame_count(),
                capacity: CAPACITY,
            });
        }

        let mut fresh = false;
        self.range.call_once(|| {
            fresh = true;
            range
        });
        if !fresh {
            return Err(BootstrapError::AlreadyBootstrapped);
        }

        for (index, frame) in range.iter().enumerate() {
            // Phantom owner, dropped right away through the normal path.
            self.refs.set_owned(index);
            unsafe { self.release(frame) };
        }
        debug!(
            "bootstrapped {} frames in [{start}, {limit})",
            range.frame_count()
        );
        Ok(())
    }

    /// Pop a free frame, or `None` when the pool is exhausted.
    ///
    /// Never blocks and never retries; the caller decides whether to wait,
    /// reclaim elsewhere, or fail upward. On success the frame's contents are
    /// filled with [`ALLOC_FILL`] and its owner count is exactly 1.
    #[must_use = "an unreleased frame stays allocated forever"]
    pub fn allocate(&self) -> Option<PhysicalFrame> {
        let (frame, remaining) = {
            let mut free = self.free.lock();
            let frame = free.pop()?;
            (frame, free.len())
        };

        // The frame is exclusively ours now; poison it outside the lock.
        unsafe {
            ptr::write_bytes(frame.base().as_mut_ptr::<u8>(), ALLOC_FILL, FRAME_SIZE as usize);
        }
        self.refs.set_owned(self.index_of(frame, "allocate"));

        trace!("allocate: {frame} handed out, {remaining} frames free");
        Some(frame)
    }

    /// Drop one ownership reference to `frame`, physically reclaiming it when
    /// the last owner is gone.
    ///
    /// A frame that still has other owners stays live and nothing else
    /// happens. At count zero the frame is filled with [`FREE_FILL`] and
    /// pushed onto the free list (the link overwrites the first word of the
    /// fill).
    ///
    /// # Panics
    /// When `frame` lies outside the managed range or its owner count is
    /// already zero — both indicate a corrupted caller, and corruption of
    /// physical memory cannot be safely continued past.
    ///
    /// # Safety
    /// - Must be call-for-call paired with a prior
    ///   [`allocate`](Self::allocate) or [`retain`](Self::retain) for this
    ///   frame; an unpaired release reclaims memory out from under its
    ///   remaining owners.
    pub unsafe fn release(&self, frame: PhysicalFrame) {
        if self.refs.release_one(self.index_of(frame, "release")) > 0 {
            // Still owned elsewhere; the frame stays live.
            return;
        }

        unsafe {
            ptr::write_bytes(frame.base().as_mut_ptr::<u8>(), FREE_FILL, FRAME_SIZE as usize);
        }
        let mut free = self.free.lock();
        unsafe { free.push(frame) };
    }

    /// [`release`](Self::release) for a raw address.
    ///
    /// # Panics
    /// When `addr` is not frame-aligned; a misaligned pointer here means the
    /// caller handed back something it never got from this pool.
    ///
    /// # Safety
    /// See [`release`](Self::release).
    pub unsafe fn release_addr(&self, addr: PhysicalAddress) {
        assert!(
            addr.is_frame_aligned(),
            "release: {addr:?} is not frame-aligned"
        );
        unsafe { self.release(PhysicalFrame::new_aligned(addr)) };
    }

    /// Add one ownership reference to a live frame (used when a frame becomes
    /// shared by a new owner).
    ///
    /// # Panics
    /// When `frame` lies outside the managed range or has no owner; callers
    /// may only retain frames they already legitimately hold.
    pub fn retain(&self, frame: PhysicalFrame) {
        self.refs.retain(self.index_of(frame, "retain"));
    }

    /// Number of frames currently on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of frames in the managed range (0 before bootstrap).
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.range.get().map_or(0, |range| range.frame_count())
    }

    /// `true` when `addr` falls inside the managed range.
    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        self.range.get().is_some_and(|range| range.contains(addr))
    }

    /// Point-in-time usage snapshot.
    ///
    /// Counts taken from concurrently mutated state; consistent with *some*
    /// interleaving of in-flight operations.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let total_frames = self.total_frames();
        let free_frames = self.free_frames();
        PoolStats {
            total_frames,
            free_frames,
            live_frames: total_frames - free_frames,
        }
    }

    /// Table index for `frame`; fatal when the frame is not managed here.
    fn index_of(&self, frame: PhysicalFrame, op: &str) -> usize {
        let range = self
            .range
            .get()
            .unwrap_or_else(|| panic!("{op}: frame pool is not bootstrapped"));
        range
            .index_of(frame)
            .unwrap_or_else(|| panic!("{op}: {frame:?} outside managed range {range:?}"))
    }
}

impl<const CAPACITY: usize> Default for FramePool<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> FrameAlloc for FramePool<CAPACITY> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.allocate().map(PhysicalFrame::base)
    }
}

/// Usage counters reported by [`FramePool::stats`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// Frames in the managed range.
    pub total_frames: usize,
    /// Frames currently on the free list.
    pub free_frames: usize,
    /// Frames with at least one owner.
    pub live_frames: usize,
}

/// Why [`FramePool::bootstrap`] refused a range.
#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum BootstrapError {
    #[error("frame pool is already bootstrapped")]
    AlreadyBootstrapped,
    #[error("managed range contains no whole frame")]
    EmptyRange,
    #[error("range of {frames} frames exceeds pool capacity of {capacity}")]
    CapacityExceeded { frames: usize, capacity: usize },
}
