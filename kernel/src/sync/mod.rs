// =============================================================================
// Kernel synchronization primitives
// =============================================================================
//
// There is exactly one hardware thread here, so the only thing a lock needs
// to protect against is an interrupt handler running on top of code that
// is mid-mutation. `SpinLock` achieves that by disabling interrupts for the
// duration it is held, not by arbitrating between cores.
//
// Almost all shared kernel state (task table, ready queue, blocked list,
// mailboxes) lives behind a single `SpinLock<KernelState>` in
// `task::scheduler` — there is no multi-lock ordering discipline to get
// wrong because there is effectively one lock on the hot path. The frame
// pool has its own, separate lock.
// =============================================================================

pub mod spinlock;

pub use spinlock::SpinLock;
