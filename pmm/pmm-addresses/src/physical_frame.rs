use crate::{FRAME_SIZE, PhysicalAddress};
use core::fmt;

/// Physical frame base.
///
/// A `PhysicalFrame` represents the **frame-aligned base** of one 4 KiB
/// physical page frame. It is a thin wrapper over [`PhysicalAddress`] whose
/// low [`FRAME_SHIFT`](crate::FRAME_SHIFT) bits are always zero.
///
/// ### Semantics
/// - [`containing_address`](Self::containing_address) aligns down; use it for
///   arbitrary addresses.
/// - [`new_aligned`](Self::new_aligned) asserts alignment in debug builds;
///   use it where the address is aligned by construction.
/// - `TryFrom<PhysicalAddress>` is the checked conversion for untrusted
///   input.
///
/// ### Invariants
/// - The base is always frame aligned; holders never need to re-check it.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(PhysicalAddress);

impl PhysicalFrame {
    /// The frame that contains `addr` (aligns down to the frame boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(addr.align_down())
    }

    /// Create from an address that must already be aligned.
    /// Panics in debug if unaligned (no runtime cost in release).
    #[inline]
    #[must_use]
    pub fn new_aligned(addr: PhysicalAddress) -> Self {
        debug_assert!(addr.is_frame_aligned(), "unaligned frame address");
        Self(addr.align_down())
    }

    /// Return the base as a [`PhysicalAddress`].
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }

    /// The frame immediately after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(PhysicalAddress::new(self.0.as_u64() + FRAME_SIZE))
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(0x{:016X})", self.base().as_u64())
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.base().as_u64())
    }
}

impl From<PhysicalFrame> for PhysicalAddress {
    #[inline]
    fn from(frame: PhysicalFrame) -> Self {
        frame.base()
    }
}

impl TryFrom<PhysicalAddress> for PhysicalFrame {
    type Error = ();

    #[inline]
    fn try_from(addr: PhysicalAddress) -> Result<Self, ()> {
        if addr.is_frame_aligned() {
            Ok(Self(addr))
        } else {
            Err(())
        }
    }
}
