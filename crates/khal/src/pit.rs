//! 8253/8254 Programmable Interval Timer driver, channel 0 only.
//!
//! This is the one clock source this kernel drives: channel 0 wired to
//! IRQ 0 through the PIC, reprogrammed to fire at a fixed rate so the
//! scheduler gets a steady preemption tick. No APIC timer, no TSC
//! deadline mode — just the legacy PIT, which every x86 box since the
//! IBM PC has had.

use crate::port::outb;

/// PIT input clock frequency in Hz. Fixed by the hardware.
const PIT_BASE_FREQUENCY: u32 = 1_193_180;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND_REG: u16 = 0x43;

/// Command byte: channel 0, access mode lo/hi byte, mode 3 (square wave),
/// binary (not BCD) counting.
const MODE3_SQUARE_WAVE: u8 = 0b0011_0110;

/// Reprograms channel 0 to fire at `hz`, rounding down via integer divide
/// the same way the 8253 itself truncates a non-integral divisor.
///
/// # Safety
/// Must run with interrupts disabled until the PIC unmasks IRQ0, or a
/// stray tick mid-reprogram could read a half-written divisor.
pub fn set_frequency(hz: u32) {
    let divisor = (PIT_BASE_FREQUENCY / hz) as u16;
    unsafe {
        outb(COMMAND_REG, MODE3_SQUARE_WAVE);
        outb(CHANNEL0_DATA, (divisor & 0xFF) as u8);
        outb(CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}
