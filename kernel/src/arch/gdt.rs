//! Global Descriptor Table (GDT) for x86_64.
//!
//! Long mode uses segmentation only nominally: base/limit are ignored for
//! code and data, but a GDT is still required to define the four
//! privilege-level segments user tasks run under, and to point at the TSS.

use core::arch::asm;
use core::mem::size_of;

use super::tss::Tss;

/// Null, kernel code, kernel data, user data, user code, TSS (2 entries).
const GDT_ENTRIES: usize = 7;

/// A segment descriptor in the GDT.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    /// A null descriptor (required as the first GDT entry).
    pub const NULL: Self = Self(0);

    /// 64-bit kernel code segment. Access byte 0x9A (P=1,DPL=0,code,RW),
    /// flags 0x2 (long mode).
    pub const fn kernel_code() -> Self {
        Self(0x00_2F_9A_00_0000_FFFF)
    }

    /// 64-bit kernel data segment. Access byte 0x92 (P=1,DPL=0,data,writable).
    pub const fn kernel_data() -> Self {
        Self(0x00_0F_92_00_0000_FFFF)
    }

    /// Ring-3 data segment. Same as kernel data but DPL=3 (access 0xF2).
    pub const fn user_data() -> Self {
        Self(0x00_0F_F2_00_0000_FFFF)
    }

    /// Ring-3 code segment. Same as kernel code but DPL=3 (access 0xFA).
    pub const fn user_code() -> Self {
        Self(0x00_2F_FA_00_0000_FFFF)
    }
}

/// A TSS descriptor in the GDT (128 bits / 2 entries).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TssDescriptor {
    low: u64,
    high: u64,
}

impl TssDescriptor {
    pub fn new(tss: &Tss) -> Self {
        let tss_addr = tss as *const _ as u64;
        let tss_len = (size_of::<Tss>() - 1) as u64;

        let mut low: u64 = 0;
        low |= tss_len & 0xFFFF;
        low |= (tss_addr & 0xFFFF) << 16;
        low |= ((tss_addr >> 16) & 0xFF) << 32;
        low |= 0x89u64 << 40; // present, DPL=0, type=0x9 (64-bit TSS available)
        low |= ((tss_len >> 16) & 0xF) << 48;
        low |= ((tss_addr >> 24) & 0xFF) << 56;

        let high = tss_addr >> 32;

        Self { low, high }
    }
}

/// Fixed selector values for this GDT's layout — usable at compile time by
/// code (the scheduler's first-switch trampoline, the syscall MSR setup)
/// that needs a selector before or without a `Selectors` instance at hand.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_DATA_SELECTOR: u16 = 0x18 | 3;
pub const USER_CODE_SELECTOR: u16 = 0x20 | 3;

/// Layout: Null, Kernel Code (0x08), Kernel Data (0x10), User Data (0x18),
/// User Code (0x20), TSS (0x28, spans two entries).
///
/// This ordering — user data directly below user code — is what lets a
/// single `STAR` MSR write set up both `sysret` and `syscall` selectors;
/// see `arch::syscall::init`.
#[repr(C, align(16))]
pub struct Gdt {
    entries: [u64; GDT_ENTRIES],
}

/// Segment selectors into the GDT, RPL already folded in where relevant.
pub struct Selectors {
    pub kernel_code: u16,
    pub kernel_data: u16,
    pub user_code: u16,
    pub user_data: u16,
    pub tss: u16,
}

impl Gdt {
    pub fn new(tss: &Tss) -> (Self, Selectors) {
        let tss_desc = TssDescriptor::new(tss);

        let gdt = Self {
            entries: [
                SegmentDescriptor::NULL.0,
                SegmentDescriptor::kernel_code().0, // 0x08
                SegmentDescriptor::kernel_data().0, // 0x10
                SegmentDescriptor::user_data().0,   // 0x18
                SegmentDescriptor::user_code().0,   // 0x20
                tss_desc.low,                       // 0x28
                tss_desc.high,                      // 0x30
            ],
        };

        let selectors = Selectors {
            kernel_code: KERNEL_CODE_SELECTOR,
            kernel_data: KERNEL_DATA_SELECTOR,
            user_data: USER_DATA_SELECTOR,
            user_code: USER_CODE_SELECTOR,
            tss: 0x28,
        };

        (gdt, selectors)
    }

    /// # Safety
    /// Must remain valid (and `'static`) for as long as these segments are
    /// in use; `selectors` must refer to entries of this same table.
    pub unsafe fn load(&'static self, selectors: &Selectors) {
        let ptr = GdtPointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const _ as u64,
        };

        unsafe {
            asm!(
                "lgdt [{}]",
                in(reg) &ptr,
                options(readonly, nostack, preserves_flags)
            );

            // Reload CS via a far return: push the selector and a local
            // return address, then `retfq` pops both.
            asm!(
                "push {sel}",
                "lea {tmp}, [rip + 2f]",
                "push {tmp}",
                "retfq",
                "2:",
                sel = in(reg) selectors.kernel_code as u64,
                tmp = lateout(reg) _,
                options(preserves_flags)
            );

            asm!(
                "mov ds, {sel:x}",
                "mov es, {sel:x}",
                "mov ss, {sel:x}",
                sel = in(reg) selectors.kernel_data as u16,
                options(nostack, preserves_flags)
            );

            asm!(
                "ltr {sel:x}",
                sel = in(reg) selectors.tss,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u64,
}
