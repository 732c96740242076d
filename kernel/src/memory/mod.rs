//! Memory subsystem.
//!
//! Layered bottom-up:
//!
//!   address.rs — PhysAddr/VirtAddr newtypes (type safety for addresses)
//!   layout.rs  — fixed memory map this prototype kernel runs inside
//!   pmm.rs     — physical frame pool (bump allocator, no free list)
//!   paging.rs  — raw PML4/PDPT/PD/PT tree: types and the tree walk
//!   vmm.rs     — demand-paging and LRU eviction policy on top of paging.rs
//!
//! There is no `alloc` anywhere in this crate: every data structure above
//! this module is a fixed-capacity array, per spec §9's cyclic-reference
//! resolution (slot indices, not owning heap references).

pub mod address;
pub mod layout;
pub mod paging;
pub mod pmm;
pub mod vmm;

/// Initializes the memory subsystem. The frame pool and VM manager are
/// both statically initialized `SpinLock`s, so runtime setup is limited to
/// a sanity check that the boot trampoline's early identity map covers the
/// frame pool's backing region, plus carving the demand-paged user range
/// back out of that same identity map (spec §9's page-size-per-range open
/// question: the early map covers the first 1GiB with 2MiB pages
/// indiscriminately, which would otherwise make `[USER_BASE,
/// USER_STACK_TOP)` permanently present and unreachable by the page-fault
/// path).
pub fn init() {
    debug_assert!(
        layout::FRAME_POOL_BASE < layout::VGA_FRAMEBUFFER,
        "frame pool must sit below the first 1GiB identity map"
    );

    let root = paging::active_root();
    unsafe {
        paging::unmap_huge_range(
            root,
            address::VirtAddr::new(layout::USER_BASE),
            address::VirtAddr::new(layout::USER_STACK_TOP),
        );
        paging::flush_all();
    }
    klog::info!(
        "memory: user range {:#x}..{:#x} reserved for 4KiB demand paging",
        layout::USER_BASE,
        layout::USER_STACK_TOP
    );

    klog::info!("memory: frame pool base={:#x}", layout::FRAME_POOL_BASE);
}
