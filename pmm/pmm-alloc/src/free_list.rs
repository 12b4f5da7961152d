use core::ptr::{self, null_mut};
use pmm_addresses::{FRAME_SIZE, PhysicalAddress, PhysicalFrame};

/// Link stored at the beginning of every **free** frame.
///
/// A free frame's storage is otherwise unused, so the list node is carved out
/// of the frame itself:
///
/// ```text
/// +----------------------+--------------------------------+
/// | FreeNode (link)      |   rest of the 4 KiB frame      |
/// +----------------------+--------------------------------+
/// ^ frame base           ^ frame base + sizeof::<FreeNode>()
/// ```
#[repr(C)]
struct FreeNode {
    /// Pointer to the next free frame's node (or null).
    next: *mut FreeNode,
}

const _: () = assert!(
    size_of::<FreeNode>() as u64 <= FRAME_SIZE,
    "link node must fit inside a frame"
);

/// Intrusive LIFO stack of free frames, plus its live length.
///
/// There is no address ordering and no fairness: the most recently pushed
/// frame is popped first. Frames are uniform in size, so unlike a
/// general-purpose free list there is nothing to split or coalesce.
///
/// # Invariants
/// - Every node reachable from `head` is the base of a frame inside the
///   managed range with owner count 0.
/// - `len` equals the number of reachable nodes at all times; push and pop
///   update both in the same critical section.
pub(crate) struct FreeList {
    /// Most recently freed frame (or null).
    head: *mut FreeNode,
    len: usize,
}

// Safety: the list is only ever touched under the pool's free-list mutex;
// the raw pointers never leave the critical section.
unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: null_mut(),
            len: 0,
        }
    }

    /// Number of frames currently on the list.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Push `frame` onto the head of the list, writing the link node into the
    /// frame's first word.
    ///
    /// # Safety
    /// - `frame` must be valid, writable memory exclusively owned by the
    ///   caller (owner count 0, not already on the list).
    /// - Must only be called while holding the pool's free-list lock.
    pub(crate) unsafe fn push(&mut self, frame: PhysicalFrame) {
        let node = frame.base().as_mut_ptr::<FreeNode>();
        unsafe {
            ptr::write(node, FreeNode { next: self.head });
        }
        self.head = node;
        self.len += 1;
    }

    /// Pop the most recently pushed frame, or `None` when the list is empty.
    pub(crate) fn pop(&mut self) -> Option<PhysicalFrame> {
        if self.head.is_null() {
            return None;
        }
        let node = self.head;
        // Safety: `head` was written by `push` and the frame has stayed on
        // the list, so the node is still exclusively ours to read.
        self.head = unsafe { (*node).next };
        self.len -= 1;
        Some(PhysicalFrame::new_aligned(PhysicalAddress::from_ptr(node)))
    }
}
