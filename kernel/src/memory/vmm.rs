//! Virtual Memory Manager: demand paging and LRU eviction policy.
//!
//! Everything here operates on a single, shared page-table root — this
//! prototype gives every task the same address space (see DESIGN.md) — and
//! layers a dense descriptor set plus a monotonic LRU ordinal on top of the
//! raw tree walk in `memory::paging`.

use crate::memory::address::{PhysAddr, VirtAddr};
use crate::memory::layout;
use crate::memory::paging::{self, PageTableFlags};
use crate::memory::pmm;
use crate::sync::SpinLock;

/// One entry in the VM Manager's resident-page set.
#[derive(Clone, Copy)]
struct PageFrameDescriptor {
    vaddr: VirtAddr,
    paddr: PhysAddr,
    dirty: bool,
    accessed: bool,
    last_access: u64,
}

/// Failure from [`allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The descriptor set is at `MAX_PHYSICAL_PAGES` capacity.
    Exhausted,
}

struct VmManager {
    /// Dense set of resident-page descriptors; `len` entries are live,
    /// `descriptors[len..]` is unspecified. Kept dense per spec §4.3 so
    /// eviction can shift-remove without leaving holes.
    descriptors: [PageFrameDescriptor; pmm::MAX_PHYSICAL_PAGES],
    len: usize,
    /// Advances on every allocation and every Accessed-bit refresh.
    next_ordinal: u64,
}

const EMPTY_DESCRIPTOR: PageFrameDescriptor = PageFrameDescriptor {
    vaddr: VirtAddr::new(0),
    paddr: PhysAddr::new(0),
    dirty: false,
    accessed: false,
    last_access: 0,
};

impl VmManager {
    const fn new() -> Self {
        Self {
            descriptors: [EMPTY_DESCRIPTOR; pmm::MAX_PHYSICAL_PAGES],
            len: 0,
            next_ordinal: 0,
        }
    }

    fn find(&self, vaddr: VirtAddr) -> Option<usize> {
        self.descriptors[..self.len].iter().position(|d| d.vaddr == vaddr)
    }

    fn tick(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    /// Picks the index of the descriptor with the smallest `last_access`.
    /// `len` is always > 0 when this is called.
    fn lru_index(&self) -> usize {
        let mut min_index = 0;
        let mut min_ordinal = self.descriptors[0].last_access;
        for i in 1..self.len {
            if self.descriptors[i].last_access < min_ordinal {
                min_ordinal = self.descriptors[i].last_access;
                min_index = i;
            }
        }
        min_index
    }

    /// Removes the descriptor at `index`, shifting the tail down to keep
    /// the set dense. Order of remaining descriptors is not significant.
    fn remove(&mut self, index: usize) -> PageFrameDescriptor {
        let removed = self.descriptors[index];
        for i in index..self.len - 1 {
            self.descriptors[i] = self.descriptors[i + 1];
        }
        self.len -= 1;
        removed
    }

    fn push(&mut self, descriptor: PageFrameDescriptor) {
        self.descriptors[self.len] = descriptor;
        self.len += 1;
    }
}

static VM: SpinLock<VmManager> = SpinLock::new(VmManager::new());

/// Error-code bit set by the CPU when the faulting access hit a present
/// page (a protection violation rather than a missing mapping).
const PAGE_FAULT_PRESENT: u64 = 1 << 0;

/// Services a page fault per spec §4.3. Faults outside the demand-paged
/// user range, or on an already-present page (a protection violation, not
/// a missing mapping), are fatal: this prototype transparently services
/// missing user pages only.
pub fn handle_page_fault(faulting_addr: u64, error_code: u64) {
    if !layout::is_user_range(faulting_addr) {
        panic!("page fault outside user range: addr={:#x} err={:#x}", faulting_addr, error_code);
    }
    if error_code & PAGE_FAULT_PRESENT != 0 {
        panic!("protection-violation page fault: addr={:#x} err={:#x}", faulting_addr, error_code);
    }

    let page = VirtAddr::new(faulting_addr).page_align_down();

    {
        let mut vm = VM.lock();
        if let Some(index) = vm.find(page) {
            let ordinal = vm.tick();
            vm.descriptors[index].accessed = true;
            vm.descriptors[index].last_access = ordinal;
            return;
        }
    }

    if allocate(page).is_ok() {
        return;
    }

    evict_one();
    if allocate(page).is_err() {
        panic!("frame pool exhausted after eviction: addr={:#x}", faulting_addr);
    }
}

/// Claims a fresh frame for `vaddr`, establishes the mapping, and records a
/// descriptor for it. `vaddr` must already be page-aligned.
pub fn allocate(vaddr: VirtAddr) -> Result<(), AllocError> {
    {
        let vm = VM.lock();
        if vm.len >= pmm::MAX_PHYSICAL_PAGES {
            return Err(AllocError::Exhausted);
        }
    }

    let frame = pmm::alloc_frame().ok_or(AllocError::Exhausted)?;
    let root = paging::active_root();
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER;
    unsafe {
        paging::map_page(root, vaddr, frame, flags).expect("demand page must be freshly unmapped");
    }
    paging::flush(vaddr);

    let mut vm = VM.lock();
    let ordinal = vm.tick();
    vm.push(PageFrameDescriptor {
        vaddr,
        paddr: frame,
        dirty: false,
        accessed: true,
        last_access: ordinal,
    });
    Ok(())
}

/// Evicts the resident page with the smallest LRU ordinal: writes it back
/// (a no-op in this prototype — see spec §4.3/§9), clears its page-table
/// entry, and drops its descriptor. The underlying frame is not returned
/// to the frame pool (see `pmm` for why).
pub fn evict_one() {
    let mut vm = VM.lock();
    if vm.len == 0 {
        return;
    }
    let index = vm.lru_index();
    let victim = vm.remove(index);
    drop(vm);

    let root = paging::active_root();
    unsafe {
        paging::unmap_page(root, victim.vaddr);
    }
    paging::flush(victim.vaddr);
}

/// Establishes an explicit mapping outside the fault-handling path (used
/// by task setup to map a stack or code page ahead of first access).
pub fn map(vaddr: VirtAddr, paddr: PhysAddr, user: bool, writable: bool) -> Result<(), paging::MapError> {
    debug_assert!(vaddr.is_page_aligned());
    debug_assert!(paddr.is_page_aligned());

    let mut flags = PageTableFlags::PRESENT;
    if writable {
        flags |= PageTableFlags::WRITABLE;
    }
    if user {
        flags |= PageTableFlags::USER;
    } else {
        flags |= PageTableFlags::GLOBAL;
    }

    let root = paging::active_root();
    unsafe {
        paging::map_page(root, vaddr, paddr, flags)?;
    }
    paging::flush(vaddr);
    Ok(())
}

/// Tears down an explicit mapping. Silently returns if unmapped already.
pub fn unmap(vaddr: VirtAddr) {
    let root = paging::active_root();
    unsafe {
        paging::unmap_page(root, vaddr);
    }
    paging::flush(vaddr);
}

/// Result of [`translate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Mapped(PhysAddr),
    Unmapped,
}

/// Resolves `vaddr` to its mapped physical address, if any.
pub fn translate(vaddr: VirtAddr) -> Translation {
    match paging::translate(paging::active_root(), vaddr) {
        Some(paddr) => Translation::Mapped(paddr),
        None => Translation::Unmapped,
    }
}

/// Number of resident pages currently tracked, for diagnostics and tests.
pub fn resident_count() -> usize {
    VM.lock().len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(vaddr: u64, ordinal: u64) -> PageFrameDescriptor {
        PageFrameDescriptor {
            vaddr: VirtAddr::new(vaddr),
            paddr: PhysAddr::new(vaddr),
            dirty: false,
            accessed: true,
            last_access: ordinal,
        }
    }

    #[test]
    fn lru_index_picks_smallest_ordinal() {
        let mut vm = VmManager::new();
        vm.push(descriptor(0x500000, 5));
        vm.push(descriptor(0x501000, 1));
        vm.push(descriptor(0x502000, 9));
        assert_eq!(vm.lru_index(), 1);
    }

    #[test]
    fn remove_keeps_set_dense() {
        let mut vm = VmManager::new();
        vm.push(descriptor(0x500000, 0));
        vm.push(descriptor(0x501000, 1));
        vm.push(descriptor(0x502000, 2));
        let removed = vm.remove(0);
        assert_eq!(removed.vaddr.as_u64(), 0x500000);
        assert_eq!(vm.len, 2);
        assert_eq!(vm.descriptors[0].vaddr.as_u64(), 0x501000);
        assert_eq!(vm.descriptors[1].vaddr.as_u64(), 0x502000);
    }

    #[test]
    fn find_locates_existing_descriptor() {
        let mut vm = VmManager::new();
        vm.push(descriptor(0x500000, 0));
        vm.push(descriptor(0x501000, 1));
        assert_eq!(vm.find(VirtAddr::new(0x501000)), Some(1));
        assert_eq!(vm.find(VirtAddr::new(0x509000)), None);
    }

    #[test]
    fn ordinal_advances_monotonically() {
        let mut vm = VmManager::new();
        let a = vm.tick();
        let b = vm.tick();
        assert!(b > a);
    }
}
