//! Task Control Block: the data held for one task slot.
//!
//! Every field needed to suspend and later resume a task lives here. There
//! is no heap anywhere in this module — the kernel stack is an inline
//! array, and the table of TCBs (in `task::scheduler`) is a fixed-size
//! array indexed by slot, not a collection of owned/boxed structs. This
//! is the resolution spec §9 calls for of the scheduler/IPC cyclic
//! reference: both subsystems refer to a task by slot index, never by a
//! reference into the other's state.

use crate::ipc::Mailbox;
use crate::memory::address::{PhysAddr, VirtAddr};

/// Numeric task identity. PID 0 is reserved and never assigned.
pub type Pid = u32;

/// Upper bound on concurrent user tasks.
pub const MAX_TASKS: usize = 8;

/// Longest task name this prototype stores (excluding truncation marker).
pub const MAX_NAME_LEN: usize = 31;

/// Size of each task's private kernel stack, used only while executing
/// kernel code on the task's behalf (syscalls, the context switch itself).
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// Lifecycle state of a task, per spec §4.1's state machine:
/// `Zombie -> Ready (create) -> Running (dispatch) -> {Ready, Blocked,
/// Zombie}`. A freed/never-used slot is represented by `None` in the task
/// table rather than a lingering `Zombie` TCB — nothing ever needs to
/// inspect a task after it exits, so there is no reaping step to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
}

/// A task's private kernel-mode execution stack. Zero-initialized; the
/// first context switch into a fresh task writes a trampoline return
/// address near the top (see `task::scheduler::prepare_initial_stack`).
#[repr(align(16))]
pub struct KernelStack([u8; KERNEL_STACK_SIZE]);

impl KernelStack {
    const fn new() -> Self {
        Self([0; KERNEL_STACK_SIZE])
    }

    /// Address one past the last byte — the initial stack pointer value.
    pub fn top(&self) -> u64 {
        self.0.as_ptr() as u64 + KERNEL_STACK_SIZE as u64
    }
}

/// One task's complete kernel-visible state.
pub struct Tcb {
    pub pid: Pid,
    name: [u8; MAX_NAME_LEN],
    name_len: u8,
    pub state: TaskState,
    /// Scheduling priority. Reserved: the current policy is strict
    /// round-robin and never reads this field (spec §3/§4.1).
    pub priority: u8,
    /// Saved stack pointer; valid only while this task is not Running.
    pub kernel_rsp: u64,
    /// Page-table root (CR3 value) for this task's address space.
    pub address_space_root: PhysAddr,
    /// User-mode entry point, read by the first-switch trampoline.
    pub entry: VirtAddr,
    /// Top of this task's carved-out slice of the shared user range.
    pub user_stack_top: VirtAddr,
    kernel_stack: KernelStack,
    pub mailbox: Mailbox,
}

impl Tcb {
    pub fn new(
        pid: Pid,
        name: &str,
        priority: u8,
        entry: VirtAddr,
        user_stack_top: VirtAddr,
        address_space_root: PhysAddr,
    ) -> Self {
        let mut name_buf = [0u8; MAX_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_NAME_LEN);
        name_buf[..len].copy_from_slice(&bytes[..len]);

        Self {
            pid,
            name: name_buf,
            name_len: len as u8,
            state: TaskState::Ready,
            priority,
            kernel_rsp: 0,
            address_space_root,
            entry,
            user_stack_top,
            kernel_stack: KernelStack::new(),
            mailbox: Mailbox::new(),
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }

    /// Top of this task's kernel stack — the starting stack pointer before
    /// anything has been pushed onto it.
    pub fn kernel_stack_top(&self) -> u64 {
        self.kernel_stack.top()
    }
}
