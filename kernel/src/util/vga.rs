//! 0xB8000 text-mode framebuffer writer.
//!
//! 80x25 cells, each two bytes: `[char:8][attr:8]`. This is write-only
//! diagnostic output used by the panic handler — everything else in the
//! kernel talks over serial.

const VGA_BUFFER: *mut u16 = 0xB8000 as *mut u16;
const WIDTH: usize = 80;
const HEIGHT: usize = 25;

/// Light grey on black.
const DEFAULT_ATTR: u8 = 0x07;
/// White on red, used for the panic banner.
const PANIC_ATTR: u8 = 0x4F;

fn cell(ch: u8, attr: u8) -> u16 {
    (attr as u16) << 8 | ch as u16
}

/// Clears the screen to blank cells with the given attribute byte.
pub fn clear(attr: u8) {
    let blank = cell(b' ', attr);
    unsafe {
        for i in 0..(WIDTH * HEIGHT) {
            VGA_BUFFER.add(i).write_volatile(blank);
        }
    }
}

/// Writes `s` starting at `(row, col)`, wrapping at the screen width and
/// truncating at the bottom of the screen. Does not scroll.
pub fn write_at(row: usize, col: usize, s: &str, attr: u8) {
    let mut row = row;
    let mut col = col;
    unsafe {
        for byte in s.bytes() {
            if byte == b'\n' || col >= WIDTH {
                row += 1;
                col = 0;
                if row >= HEIGHT {
                    return;
                }
                if byte == b'\n' {
                    continue;
                }
            }
            let offset = row * WIDTH + col;
            VGA_BUFFER.add(offset).write_volatile(cell(byte, attr));
            col += 1;
        }
    }
}

/// Writes the kernel panic diagnostic to the framebuffer: clears the
/// screen to the panic attribute, then writes `message` starting at the
/// top-left cell.
pub fn panic_screen(message: &str) {
    clear(PANIC_ATTR);
    write_at(0, 0, message, PANIC_ATTR);
}

/// Restores the default text attribute across the whole screen.
#[allow(dead_code)]
pub fn reset() {
    clear(DEFAULT_ATTR);
}
