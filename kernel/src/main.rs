#![no_std]
#![no_main]

mod arch;
mod ipc;
mod memory;
mod sync;
mod task;
mod traps;
mod util;

use memory::address::VirtAddr;

/// Seed task table: name, entry point, priority. A real loader would
/// place these images and pick entry points at load time; this prototype
/// just points every task at the same trampoline-reachable address and
/// lets each one run the kernel's own demo code path (spec's example
/// scenario, §3).
const SEED_TASKS: &[(&str, u64, u8)] = &[
    ("t1", memory::layout::USER_BASE, 0),
    ("t2", memory::layout::USER_BASE, 0),
    ("t3", memory::layout::USER_BASE, 0),
];

/// Kernel entry point, called directly by the boot trampoline (not
/// through a bootloader protocol) at the address `linker.ld`'s
/// `ENTRY(kernel_main)` names. Long mode, a minimal GDT/IDT, and the
/// early identity-mapped page tables are already live by the time this
/// runs — see `memory::layout`'s module doc.
#[no_mangle]
extern "C" fn kernel_main() -> ! {
    klog::init();
    klog::info!("microkernel booting");

    memory::init();
    traps::init_idt();

    khal::pic::remap_and_mask_all();
    khal::pic::unmask_irq(memory::layout::TIMER_IRQ);
    khal::pit::set_frequency(memory::layout::TIMER_HZ);
    klog::info!("timer: {}Hz on IRQ{}", memory::layout::TIMER_HZ, memory::layout::TIMER_IRQ);

    unsafe { arch::syscall::init(memory::layout::KERNEL_STACK_TOP) };

    for &(name, entry, priority) in SEED_TASKS {
        match task::scheduler::create_task(name, VirtAddr::new(entry), priority) {
            Ok(pid) => klog::info!("spawned task {:?} pid={}", name, pid),
            Err(e) => klog::error!("failed to spawn {:?}: {:?}", name, e),
        }
    }

    sync::spinlock::enable_interrupts();
    klog::info!("interrupts enabled, starting scheduler");

    task::scheduler::start();
}
