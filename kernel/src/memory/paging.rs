//! x86_64 four-level page tables: types and the raw tree walk.
//!
//! This module is policy-free — it knows how to read and write PML4 /
//! PDPT / PD / PT entries and walk the tree, nothing more. `memory::vmm`
//! layers demand-paging and LRU eviction policy on top of the operations
//! here.
//!
//! ```text
//! 63  62..52  51..12       11..9   8   7   6   5   4   3   2   1   0
//! ┌───┬──────┬────────────┬───────┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//! │NXE│ Avail│ Phys Addr  │ Avail │ G │PS │ D │ A │PCD│PWT│U/S│R/W│ P │
//! └───┴──────┴────────────┴───────┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//! ```

use bitflags::bitflags;

use crate::arch::cpu;
use crate::memory::address::{PhysAddr, VirtAddr, HUGE_PAGE_SIZE};
use crate::memory::pmm;

bitflags! {
    /// x86_64 page table entry flags. Effective permissions are the
    /// intersection of all levels, so intermediate (non-leaf) entries are
    /// kept maximally permissive and the real restriction lives at the leaf.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageTableFlags: u64 {
        /// Entry is valid; if clear, every other bit is ignored.
        const PRESENT    = 1 << 0;
        /// Writes permitted. If clear, writes fault.
        const WRITABLE   = 1 << 1;
        /// Accessible from Ring 3. If clear, only Ring 0 can touch it.
        const USER       = 1 << 2;
        /// CPU sets this on any access. Unused by this prototype's LRU
        /// (the LRU ordinal is software-maintained instead) but kept
        /// faithful to the architecture.
        const ACCESSED   = 1 << 5;
        /// CPU sets this on a write.
        const DIRTY      = 1 << 6;
        /// Page Size: at the PD level, this entry is a 2 MiB leaf instead
        /// of a pointer to a PT. Only the early kernel identity map uses
        /// this; the demand-paged user range is 4 KiB leaves exclusively
        /// (spec §9's page-size-per-range open question).
        const HUGE       = 1 << 7;
        /// TLB entry survives a CR3 reload. Used for kernel mappings that
        /// are identical across every address space.
        const GLOBAL     = 1 << 8;
        /// No-Execute. Requires EFER.NXE, which the boot trampoline enables.
        const NO_EXECUTE = 1 << 63;
    }
}

impl PageTableFlags {
    /// Flags for an intermediate (non-leaf) table entry covering a kernel
    /// mapping: present, writable, not user-accessible.
    pub const INTERMEDIATE: Self = Self::PRESENT.union(Self::WRITABLE);

    /// Same as `INTERMEDIATE` but also walkable from Ring 3 — needed on
    /// every intermediate entry above a user leaf.
    pub const INTERMEDIATE_USER: Self = Self::PRESENT.union(Self::WRITABLE).union(Self::USER);
}

/// Mask extracting the 40-bit physical frame number from an entry.
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// A single 8-byte entry in an x86_64 page table.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub fn addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & ADDR_MASK)
    }

    #[inline]
    pub fn is_present(self) -> bool {
        self.0 & PageTableFlags::PRESENT.bits() != 0
    }

    /// True if this is a present PDPT/PD entry whose PS bit marks it a
    /// huge-page leaf (1 GiB / 2 MiB) rather than a pointer to the next
    /// table level.
    #[inline]
    pub fn is_huge(self) -> bool {
        self.is_present() && self.0 & PageTableFlags::HUGE.bits() != 0
    }

    #[inline]
    pub fn set(&mut self, addr: PhysAddr, flags: PageTableFlags) {
        debug_assert!(addr.is_page_aligned(), "page table entry address must be page-aligned");
        self.0 = (addr.as_u64() & ADDR_MASK) | flags.bits();
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// A 4 KiB, 512-entry page table — one level of the PML4/PDPT/PD/PT tree.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; 512],
}

impl core::ops::Index<usize> for PageTable {
    type Output = PageTableEntry;
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl core::ops::IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

/// Errors from [`map_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The virtual address already has a present leaf entry.
    AlreadyMapped,
    /// The frame pool could not supply a page for a new intermediate table.
    OutOfMemory,
}

/// Returns the physical address of the currently active PML4 (from CR3).
#[inline]
pub fn active_root() -> PhysAddr {
    PhysAddr::new(cpu::read_cr3() & ADDR_MASK)
}

/// Walks `root` (a PML4) for `virt`, creating any missing intermediate
/// table with `pmm::alloc_frame`, and writes the leaf entry to map `phys`
/// with `flags`.
///
/// # Safety
/// `root` must be a valid, identity-accessible PML4. The caller must
/// flush the TLB for `virt` (or reload CR3) after this returns `Ok`.
pub unsafe fn map_page(
    root: PhysAddr,
    virt: VirtAddr,
    phys: PhysAddr,
    flags: PageTableFlags,
) -> Result<(), MapError> {
    debug_assert!(virt.is_page_aligned());
    debug_assert!(phys.is_page_aligned());

    let indices = virt.page_table_indices();
    let inter_flags = if flags.contains(PageTableFlags::USER) {
        PageTableFlags::INTERMEDIATE_USER
    } else {
        PageTableFlags::INTERMEDIATE
    };

    let pml4 = unsafe { &mut *root.to_virt().as_mut_ptr::<PageTable>() };
    let pdpt_phys = get_or_create(&mut pml4[indices[3] as usize], inter_flags)?;

    let pdpt = unsafe { &mut *pdpt_phys.to_virt().as_mut_ptr::<PageTable>() };
    assert!(!pdpt[indices[2] as usize].is_huge(), "1GiB huge-page entry in a 4KiB mapping's walk");
    let pd_phys = get_or_create(&mut pdpt[indices[2] as usize], inter_flags)?;

    let pd = unsafe { &mut *pd_phys.to_virt().as_mut_ptr::<PageTable>() };
    assert!(
        !pd[indices[1] as usize].is_huge(),
        "2MiB huge-page entry at {:#x}: the early identity map must not cover the demand-paged range",
        virt.as_u64()
    );
    let pt_phys = get_or_create(&mut pd[indices[1] as usize], inter_flags)?;

    let pt = unsafe { &mut *pt_phys.to_virt().as_mut_ptr::<PageTable>() };
    let leaf = &mut pt[indices[0] as usize];
    if leaf.is_present() {
        return Err(MapError::AlreadyMapped);
    }
    leaf.set(phys, flags);
    Ok(())
}

/// Walks `root` for `virt` and clears its leaf entry, if present. Silently
/// returns if any intermediate level is absent, per spec §4.3.
///
/// # Safety
/// `root` must be a valid, identity-accessible PML4. The caller must
/// flush the TLB for `virt` afterwards.
pub unsafe fn unmap_page(root: PhysAddr, virt: VirtAddr) {
    let indices = virt.page_table_indices();

    let pml4 = unsafe { &*root.to_virt().as_ptr::<PageTable>() };
    let pml4_entry = pml4[indices[3] as usize];
    if !pml4_entry.is_present() {
        return;
    }

    let pdpt = unsafe { &*pml4_entry.addr().to_virt().as_ptr::<PageTable>() };
    let pdpt_entry = pdpt[indices[2] as usize];
    if !pdpt_entry.is_present() {
        return;
    }
    assert!(!pdpt_entry.is_huge(), "1GiB huge-page entry in a 4KiB unmap's walk");

    let pd = unsafe { &*pdpt_entry.addr().to_virt().as_ptr::<PageTable>() };
    let pd_entry = pd[indices[1] as usize];
    if !pd_entry.is_present() {
        return;
    }
    assert!(!pd_entry.is_huge(), "2MiB huge-page entry at {:#x} in a 4KiB unmap's walk", virt.as_u64());

    let pt = unsafe { &mut *pd_entry.addr().to_virt().as_mut_ptr::<PageTable>() };
    pt[indices[0] as usize].clear();
}

/// Translates `virt` to a physical address by walking `root`, or returns
/// `None` if any level along the way is not present.
pub fn translate(root: PhysAddr, virt: VirtAddr) -> Option<PhysAddr> {
    let indices = virt.page_table_indices();
    let offset = virt.page_offset() as u64;

    let pml4 = unsafe { &*root.to_virt().as_ptr::<PageTable>() };
    let pml4_entry = pml4[indices[3] as usize];
    if !pml4_entry.is_present() {
        return None;
    }

    let pdpt = unsafe { &*pml4_entry.addr().to_virt().as_ptr::<PageTable>() };
    let pdpt_entry = pdpt[indices[2] as usize];
    if !pdpt_entry.is_present() {
        return None;
    }
    if pdpt_entry.is_huge() {
        // 1GiB leaf: `offset` below is sized for a 4KiB page, so this
        // would misreport the physical address rather than just fail.
        return Some(pdpt_entry.addr() + (virt.as_u64() & 0x3FFF_FFFF));
    }

    let pd = unsafe { &*pdpt_entry.addr().to_virt().as_ptr::<PageTable>() };
    let pd_entry = pd[indices[1] as usize];
    if !pd_entry.is_present() {
        return None;
    }
    if pd_entry.is_huge() {
        // 2MiB leaf, e.g. the early kernel identity map: resolve directly
        // instead of misreading the frame number as a PT pointer.
        return Some(pd_entry.addr() + (virt.as_u64() & 0x1F_FFFF));
    }

    let pt = unsafe { &*pd_entry.addr().to_virt().as_ptr::<PageTable>() };
    let pt_entry = pt[indices[0] as usize];
    if !pt_entry.is_present() {
        return None;
    }

    Some(pt_entry.addr() + offset)
}

/// Flushes the TLB entry for a single virtual address.
#[inline]
pub fn flush(virt: VirtAddr) {
    cpu::invlpg(virt.as_u64());
}

/// Flushes the whole TLB by reloading CR3 with its current value — cheap
/// insurance on a single core with no TLB shootdown to coordinate.
///
/// # Safety
/// The current CR3 must still point at a valid PML4.
pub unsafe fn flush_all() {
    let cr3 = cpu::read_cr3();
    unsafe { cpu::write_cr3(cr3) };
}

/// Clears any present 2MiB PD-level huge-page entries covering
/// `[start, end)`, reverting that range to not-present so it can be
/// demand-paged at 4KiB instead (spec §9: "implementers must explicitly
/// choose page sizes per range"). `start`/`end` must be 2MiB-aligned.
///
/// The early boot-trampoline identity map this prototype inherits covers
/// the first 1GiB with 2MiB pages indiscriminately; this carves the
/// demand-paged user range back out of it before the VM manager's first
/// fault, so a user access there reliably misses rather than hitting a
/// stale huge mapping.
///
/// # Safety
/// `root` must be a valid, identity-accessible PML4 not currently loaded
/// by any other CPU (none exist here). The caller must flush the TLB for
/// the affected range afterwards.
pub unsafe fn unmap_huge_range(root: PhysAddr, start: VirtAddr, end: VirtAddr) {
    debug_assert!(start.as_u64() % HUGE_PAGE_SIZE == 0);
    debug_assert!(end.as_u64() % HUGE_PAGE_SIZE == 0);

    let mut addr = start.as_u64();
    while addr < end.as_u64() {
        let virt = VirtAddr::new(addr);
        let indices = virt.page_table_indices();

        let pml4 = unsafe { &*root.to_virt().as_ptr::<PageTable>() };
        let pml4_entry = pml4[indices[3] as usize];
        if pml4_entry.is_present() && !pml4_entry.is_huge() {
            let pdpt = unsafe { &*pml4_entry.addr().to_virt().as_ptr::<PageTable>() };
            let pdpt_entry = pdpt[indices[2] as usize];
            if pdpt_entry.is_present() && !pdpt_entry.is_huge() {
                let pd = unsafe { &mut *pdpt_entry.addr().to_virt().as_mut_ptr::<PageTable>() };
                let pd_entry = &mut pd[indices[1] as usize];
                if pd_entry.is_huge() {
                    pd_entry.clear();
                }
            }
        }

        addr += HUGE_PAGE_SIZE;
    }
}

/// Returns the physical address of the table `entry` points to, allocating
/// and zeroing a new one from the frame pool if `entry` is not yet present.
fn get_or_create(entry: &mut PageTableEntry, flags: PageTableFlags) -> Result<PhysAddr, MapError> {
    if entry.is_present() {
        Ok(entry.addr())
    } else {
        let frame = pmm::alloc_frame().ok_or(MapError::OutOfMemory)?;
        entry.set(frame, flags);
        Ok(frame)
    }
}
