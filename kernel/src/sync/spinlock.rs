// =============================================================================
// Ticket spinlock with interrupt masking
// =============================================================================
//
// A ticket lock: two counters, `next_ticket` and `now_serving`. Locking
// takes the next ticket and spins until it is being served; unlocking bumps
// `now_serving`. FIFO ordering falls out for free.
//
// There is only one hardware thread, so the lock itself never actually
// contends — its real job is the interrupt-masking it does around the
// critical section. Every mutation of shared kernel state must happen with
// interrupts disabled for its whole duration, or a timer tick could
// reschedule onto a half-updated ready queue. `SpinLock::lock` disables
// interrupts before taking a ticket and `Drop` restores whatever the
// interrupt state was beforehand, so nested lock/unlock pairs compose
// correctly.
// =============================================================================

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

/// A ticket-based spinlock that disables interrupts while held.
///
/// # Examples
/// ```
/// static COUNTER: SpinLock<u64> = SpinLock::new(0);
///
/// {
///     let mut guard = COUNTER.lock();
///     *guard += 1;
/// } // lock released, interrupt state restored
/// ```
pub struct SpinLock<T> {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
    data: UnsafeCell<T>,
}

// SAFETY: only one hardware thread ever touches `data`, and only while
// holding the lock, so sharing the handle across call sites is sound as
// long as T itself is Send.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock wrapping the given value, initially unlocked.
    pub const fn new(value: T) -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, disabling interrupts for as long as the guard lives.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let irq_was_enabled = interrupts_enabled();
        disable_interrupts();

        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }

        SpinLockGuard {
            lock: self,
            irq_was_enabled,
        }
    }

    /// Attempts to acquire the lock without spinning. Used from contexts
    /// where blocking is not an option, such as the panic path.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let irq_was_enabled = interrupts_enabled();
        disable_interrupts();

        let current = self.now_serving.load(Ordering::Relaxed);
        let result = self.next_ticket.compare_exchange(
            current,
            current + 1,
            Ordering::Acquire,
            Ordering::Relaxed,
        );

        match result {
            Ok(_) => Some(SpinLockGuard {
                lock: self,
                irq_was_enabled,
            }),
            Err(_) => {
                if irq_was_enabled {
                    enable_interrupts();
                }
                None
            }
        }
    }

    /// Mutable access with no locking, valid only while `&mut self` is held
    /// (i.e. before the value is ever shared — during early init).
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// RAII guard for a held spinlock. Dropping it releases the lock and
/// restores whatever interrupt state held before `lock()` was called.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    irq_was_enabled: bool,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.now_serving.fetch_add(1, Ordering::Release);
        if self.irq_was_enabled {
            enable_interrupts();
        }
    }
}

/// Checks whether interrupts are currently enabled (RFLAGS.IF).
#[inline(always)]
fn interrupts_enabled() -> bool {
    let rflags: u64;
    unsafe {
        core::arch::asm!(
            "pushfq",
            "pop {}",
            out(reg) rflags,
            options(nomem, preserves_flags)
        );
    }
    rflags & (1 << 9) != 0
}

/// Disables maskable interrupts on the current core.
#[inline(always)]
pub fn disable_interrupts() {
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

/// Enables maskable interrupts on the current core.
#[inline(always)]
pub fn enable_interrupts() {
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

// No #[cfg(test)] unit tests here: every public entry point disables or
// enables interrupts via `cli`/`sti`, which traps in ring 3. Exercised
// instead wherever `SpinLock` guards pure logic, e.g. `task::scheduler`.
