// =============================================================================
// Kernel logger (kprint! / kprintln!)
// =============================================================================
//
// Raw, always-on text output over the serial port. Goes through our own
// `SpinLock` (interrupt-masking, not `klog`'s plain `spin::Mutex`) because
// this is also the panic-path logger: if a fault fires while some other
// piece of kernel state is being mutated, kprintln! must not be the thing
// that deadlocks on the way to reporting it.
//
// This exists alongside `klog`'s leveled logging rather than replacing it:
// `klog::info!` etc. are for ordinary leveled diagnostics, kprintln! is the
// unconditional path used by the panic handler and boot banner.
// =============================================================================

use crate::arch::serial::SERIAL;
use core::fmt;
use core::fmt::Write;

/// The internal print function backing `kprint!`/`kprintln!`.
///
/// Not meant to be called directly.
#[doc(hidden)]
pub fn _kprint(args: fmt::Arguments) {
    let mut serial = SERIAL.lock();
    let _ = serial.write_fmt(args);
}

/// Prints formatted text to the kernel's serial console, no trailing newline.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::util::logger::_kprint(format_args!($($arg)*))
    };
}

/// Prints formatted text followed by a newline to the kernel's serial console.
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {
        $crate::kprint!("{}\n", format_args!($($arg)*))
    };
}
