//! Exception and IRQ handlers.
//!
//! Each handler here is deliberately thin: the `extern "x86-interrupt"`
//! calling convention already preserves whatever the interrupted code had
//! live in any register, so the body only needs to perform the one call
//! that routes into the relevant subsystem (spec §4.4: "translates traps
//! into calls on the above").

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::arch::cpu;
use crate::memory::vmm;
use crate::task::scheduler;

/// Breakpoint exception (INT 3), raised by the `int3` instruction. Used
/// only for interactive debugging; logs and returns.
pub extern "x86-interrupt" fn breakpoint_handler(_frame: InterruptStackFrame) {
    klog::info!("trap: breakpoint");
}

/// Double fault (INT 8): a second exception happened while the CPU was
/// trying to invoke a handler for the first, most commonly because the
/// original handler's own stack was unusable. Runs on its own IST1 stack
/// so a blown task stack does not also take this handler down with it.
/// Not named in spec's failure taxonomy, but the same "fatal, can't
/// continue" bucket as a corrupted page-table walk (spec §7).
pub extern "x86-interrupt" fn double_fault_handler(
    _frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!("double fault (error_code={:#x})", error_code);
}

/// Timer IRQ (vector 0x20, PIT channel 0 via PIC IRQ0): the scheduler's
/// preemption entry. `scheduler::preempt` sends the PIC its EOI and then
/// performs the same demote-and-dispatch `yield_now` does (spec §4.1/§4.4).
pub extern "x86-interrupt" fn timer_handler(_frame: InterruptStackFrame) {
    scheduler::preempt();
}

/// Page fault (vector 0x0E): reads the faulting address from CR2 and the
/// CPU-pushed error code, then hands both to the VM manager (spec §4.3/
/// §4.4). Returns normally when the fault was serviced by demand paging;
/// `vmm::handle_page_fault` panics itself for anything outside that.
pub extern "x86-interrupt" fn page_fault_handler(
    _frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let faulting_addr = cpu::read_cr2();
    vmm::handle_page_fault(faulting_addr, error_code.bits());
}
