//! IDT, GDT, and TSS bring-up.

use core::sync::atomic::{AtomicPtr, Ordering};
use spin::Once;

use crate::arch::gdt::Gdt;
use crate::arch::idt::{EntryOptions, GateType, Idt, PrivilegeLevel};
use crate::arch::tss::Tss;

use super::handlers;

/// Global IDT instance.
static IDT: Once<Idt> = Once::new();

/// Global TSS instance.
static TSS: Once<Tss> = Once::new();

/// Global GDT instance.
static GDT: Once<Gdt> = Once::new();

/// Raw pointer to the TSS, set after init, so the scheduler can update
/// RSP0 on every context switch without re-deriving it.
static TSS_PTR: AtomicPtr<Tss> = AtomicPtr::new(core::ptr::null_mut());

/// Initializes the TSS, GDT, and IDT, in that dependency order: the IDT's
/// double-fault entry needs the TSS's IST1 index, and the GDT needs the
/// TSS's base address for its descriptor.
///
/// Registers exactly the vectors this kernel's core needs (spec §4.4):
/// breakpoint (3, debugging aid), double fault (8, fatal safety net),
/// page fault (14, routed to the VM manager), the timer IRQ (0x20, routed
/// to the scheduler's preemption entry), and the `int 0x80` software
/// syscall gate (equivalent to the `syscall` instruction fast path).
pub fn init_idt() {
    let tss_ref = TSS.call_once(|| {
        let mut tss = Tss::new();
        tss.init();
        tss
    });
    TSS_PTR.store(tss_ref as *const Tss as *mut Tss, Ordering::Relaxed);

    let (gdt, selectors) = Gdt::new(tss_ref);
    let gdt_ref = GDT.call_once(|| gdt);
    unsafe { gdt_ref.load(&selectors) };
    klog::debug!(
        "GDT loaded (CS={:#06x} DS={:#06x} TSS={:#06x})",
        selectors.kernel_code, selectors.kernel_data, selectors.tss
    );

    let mut idt = Idt::new();
    let cs = selectors.kernel_code;

    idt.set_handler(
        3,
        handlers::breakpoint_handler as usize,
        cs,
        EntryOptions::new().set_present(true).set_gate_type(GateType::Interrupt),
    );

    idt.set_handler(
        8,
        handlers::double_fault_handler as usize,
        cs,
        EntryOptions::new()
            .set_present(true)
            .set_gate_type(GateType::Interrupt)
            .set_stack_index(crate::arch::tss::DOUBLE_FAULT_IST_INDEX),
    );

    idt.set_handler(
        0x0E,
        handlers::page_fault_handler as usize,
        cs,
        EntryOptions::new().set_present(true).set_gate_type(GateType::Interrupt),
    );

    idt.set_handler(
        0x20,
        handlers::timer_handler as usize,
        cs,
        EntryOptions::new().set_present(true).set_gate_type(GateType::Interrupt),
    );

    idt.set_handler(
        0x80,
        crate::arch::syscall::int80_entry as usize,
        cs,
        EntryOptions::new()
            .set_present(true)
            .set_gate_type(GateType::Interrupt)
            .set_privilege_level(PrivilegeLevel::Ring3),
    );

    let idt_ref = IDT.call_once(|| idt);
    idt_ref.load();

    klog::info!("IDT loaded: breakpoint=3 double_fault=8 page_fault=0xe timer=0x20 syscall=0x80");
}

/// Raw pointer to the live TSS, for `Tss::set_rsp0` on every context
/// switch. Panics if called before `init_idt`.
pub fn tss_ptr() -> *mut Tss {
    let ptr = TSS_PTR.load(Ordering::Relaxed);
    assert!(!ptr.is_null(), "tss_ptr() called before init_idt()");
    ptr
}
