//! Physical frame pool.
//!
//! A bump allocator over a fixed physical region: every call to
//! [`FramePool::alloc`] hands out the next untouched 4 KiB frame and zeroes
//! it. There is no free list — frames released by [`vmm::evict_one`]
//! are never returned here, only dropped from the VM manager's descriptor
//! set (see `memory::vmm` and spec §4.3/§9 for why: the workload this
//! prototype targets is bounded, and a production design would need an
//! explicit free list).
//!
//! Capacity is `MAX_PHYSICAL_PAGES` plus headroom for page-table frames
//! (intermediate PDPT/PD/PT tables also come from this pool), so the pool
//! itself exhausting is a distinct, stricter failure than the VM manager's
//! `Exhausted` (which is about its descriptor set being full, not about
//! physical memory running out).

use crate::memory::address::PhysAddr;
use crate::memory::layout;
use crate::sync::SpinLock;

/// Upper bound on concurrently resident user pages, per spec.
pub const MAX_PHYSICAL_PAGES: usize = 1024;

/// Total frames carved out of the pool's backing region: user pages plus
/// generous headroom for page-table frames (a handful per task at most).
const POOL_CAPACITY: usize = MAX_PHYSICAL_PAGES + 256;

pub struct FramePool {
    /// Physical address of the next frame to hand out.
    next: u64,
    /// Frames issued so far; `next` rarely reaches this.
    issued: usize,
}

impl FramePool {
    const fn new() -> Self {
        Self {
            next: layout::FRAME_POOL_BASE,
            issued: 0,
        }
    }

    /// Hands out the next frame, zeroed. Returns `None` once the pool's
    /// backing region is exhausted.
    pub fn alloc(&mut self) -> Option<PhysAddr> {
        let frame = self.bump()?;
        // SAFETY: `frame` is a freshly bumped, never-before-issued frame
        // inside the identity-mapped pool region.
        unsafe {
            core::ptr::write_bytes(frame.to_virt().as_mut_ptr::<u8>(), 0, 4096);
        }
        Some(frame)
    }

    /// The bookkeeping half of `alloc`, split out so it can be tested
    /// without touching physical memory: advances the cursor and reports
    /// exhaustion, but never dereferences the resulting address.
    fn bump(&mut self) -> Option<PhysAddr> {
        if self.issued >= POOL_CAPACITY {
            return None;
        }
        let frame = PhysAddr::new(self.next);
        self.next += crate::memory::address::PAGE_SIZE;
        self.issued += 1;
        Some(frame)
    }

    /// Number of frames issued since boot.
    pub fn issued(&self) -> usize {
        self.issued
    }
}

/// The global frame pool, guarded by the kernel's IRQ-masking spinlock —
/// allocation happens from page-fault context, which can nest inside an
/// otherwise-masked syscall handler's critical section.
pub static FRAME_POOL: SpinLock<FramePool> = SpinLock::new(FramePool::new());

/// Allocates and zeroes one physical frame from the global pool.
pub fn alloc_frame() -> Option<PhysAddr> {
    FRAME_POOL.lock().alloc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocator_advances_by_page_size() {
        let mut pool = FramePool::new();
        let a = pool.bump().unwrap();
        let b = pool.bump().unwrap();
        assert_eq!(b.as_u64() - a.as_u64(), 4096);
        assert_eq!(pool.issued(), 2);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut pool = FramePool::new();
        for _ in 0..POOL_CAPACITY {
            assert!(pool.bump().is_some());
        }
        assert!(pool.bump().is_none());
    }
}
