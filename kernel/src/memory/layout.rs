//! Fixed memory layout for this prototype kernel.
//!
//! Everything here is a constant, not a policy decision: the boot
//! trampoline (outside this crate) sets up a minimal GDT/IDT and 64-bit
//! long mode with identity-mapped low memory before `kernel_main` ever
//! runs, and these addresses describe the world it hands us.

/// Kernel image base: `[KERNEL_BASE, KERNEL_STACK_TOP)`.
pub const KERNEL_BASE: u64 = 0x0010_0000;
/// Top of the kernel's own stack, set up by the boot trampoline.
pub const KERNEL_STACK_TOP: u64 = 0x0020_0000;

/// Start of the demand-paged user range (inclusive).
pub const USER_BASE: u64 = 0x0040_0000;
/// End of the demand-paged user range (exclusive). A fault outside
/// `[USER_BASE, USER_STACK_TOP)` is fatal.
pub const USER_STACK_TOP: u64 = 0x0060_0000;
/// Per-task user stack size.
pub const USER_STACK_SIZE: u64 = 16 * 1024;

/// Early identity-mapped page tables set up before `kernel_main`, covering
/// the first 1GiB with 2MiB pages. `vmm` inherits this root rather than
/// building a fresh PML4 per task; every task shares one address space.
///
/// Page size is chosen per range, not uniformly: the early 2MiB mapping
/// covers kernel memory and the frame pool, but `[USER_BASE,
/// USER_STACK_TOP)` is explicitly carved back out of it (`memory::init`,
/// via `paging::unmap_huge_range`) and is demand-paged at 4KiB
/// exclusively, one frame per fault (`memory::vmm`). Without that split
/// the demand-paged range would already read as present from boot and
/// never fault.
pub const EARLY_PML4: u64 = 0x0000_1000;
pub const EARLY_PDPT: u64 = 0x0000_2000;
pub const EARLY_PD: u64 = 0x0000_3000;

/// 80x25 VGA text-mode framebuffer, `[attr:8][char:8]` per cell.
pub const VGA_FRAMEBUFFER: u64 = 0x000B_8000;

/// Base of the physical frame pool: past the kernel image and the
/// demand-paged user range, still inside the first 1GiB identity map so
/// the kernel can zero a freshly issued frame without a temporary mapping.
pub const FRAME_POOL_BASE: u64 = 0x0070_0000;

/// PIT channel 0 input frequency (Hz).
pub const PIT_BASE_FREQUENCY: u32 = 1_193_180;
/// Target tick rate: 100Hz.
pub const TIMER_HZ: u32 = 100;

/// Legacy IRQ line the PIT is wired to.
pub const TIMER_IRQ: u8 = 0;

/// True if `vaddr` falls inside the legal demand-paged user range.
pub fn is_user_range(vaddr: u64) -> bool {
    vaddr >= USER_BASE && vaddr < USER_STACK_TOP
}

/// True if `vaddr` falls inside the kernel's own identity-mapped range.
pub fn is_kernel_range(vaddr: u64) -> bool {
    vaddr >= KERNEL_BASE && vaddr < KERNEL_STACK_TOP
}
