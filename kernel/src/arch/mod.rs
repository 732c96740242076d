// =============================================================================
// Architecture support: x86_64 only
// =============================================================================
//
// Everything privileged or CPU-specific lives here. There is exactly one
// supported target, so this prototype skips the per-architecture
// subdirectory indirection larger kernels use and just declares the
// modules flat; the rest of the kernel reaches `crate::arch::*` and never
// touches `core::arch::asm!` directly outside this module.
// =============================================================================

pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod serial;
pub mod syscall;
pub mod tss;
