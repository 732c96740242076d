//! Round-robin scheduler: task table, ready queue, and context switch.
//!
//! All shared scheduling state — the task table and the ready queue —
//! lives behind one `SpinLock<KernelState>`. There is exactly one hardware
//! thread, so the lock's job is only to keep an interrupt handler from
//! observing a half-updated table, never to arbitrate between cores.

use core::arch::global_asm;

use crate::arch::{cpu, gdt, tss::Tss};
use crate::ipc::{IpcError, Message};
use crate::memory::address::{PhysAddr, VirtAddr};
use crate::memory::layout;
use crate::sync::SpinLock;
use crate::task::tcb::{Pid, Tcb, TaskState, MAX_TASKS};
use crate::task::usermode::{self, IretqFrame};
use crate::traps;

/// Failure from `create_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// No Zombie (free) slot was available in the task table.
    NoSlot,
}

/// Bounded FIFO of task identities, capacity `MAX_TASKS`. Strict insertion
/// order — there are no priorities to break ties with.
struct ReadyQueue {
    items: [Pid; MAX_TASKS],
    head: usize,
    tail: usize,
    count: usize,
}

impl ReadyQueue {
    const fn new() -> Self {
        Self { items: [0; MAX_TASKS], head: 0, tail: 0, count: 0 }
    }

    fn push(&mut self, pid: Pid) -> Result<(), ()> {
        if self.count == MAX_TASKS {
            return Err(());
        }
        self.items[self.tail] = pid;
        self.tail = (self.tail + 1) % MAX_TASKS;
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Pid> {
        if self.count == 0 {
            return None;
        }
        let pid = self.items[self.head];
        self.head = (self.head + 1) % MAX_TASKS;
        self.count -= 1;
        Some(pid)
    }

    fn len(&self) -> usize {
        self.count
    }
}

struct KernelState {
    tasks: [Option<Tcb>; MAX_TASKS],
    ready: ReadyQueue,
    current: Option<Pid>,
    next_pid: Pid,
}

const NONE_TCB: Option<Tcb> = None;

impl KernelState {
    const fn new() -> Self {
        Self {
            tasks: [NONE_TCB; MAX_TASKS],
            ready: ReadyQueue::new(),
            current: None,
            // PID 0 is reserved/invalid.
            next_pid: 1,
        }
    }

    fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.tasks.iter().position(|slot| matches!(slot, Some(tcb) if tcb.pid == pid))
    }

    fn task(&self, pid: Pid) -> Option<&Tcb> {
        self.slot_of(pid).and_then(|i| self.tasks[i].as_ref())
    }

    fn task_mut(&mut self, pid: Pid) -> Option<&mut Tcb> {
        match self.slot_of(pid) {
            Some(i) => self.tasks[i].as_mut(),
            None => None,
        }
    }

    fn free_slot(&mut self) -> Option<usize> {
        self.tasks.iter().position(|slot| slot.is_none())
    }
}

static STATE: SpinLock<KernelState> = SpinLock::new(KernelState::new());

/// The stack pointer of whatever was executing before the very first task
/// switch (the boot/init call stack). Never restored — `start()` is a
/// one-way trip — but `context_switch_asm` always needs somewhere to save
/// the outgoing RSP.
static mut BOOTSTRAP_RSP: u64 = 0;

// ── Context switch ──────────────────────────────────────────────

global_asm!(
    ".global context_switch_asm",
    "context_switch_asm:",
    // rdi = &mut old_rsp, rsi = new_rsp
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

unsafe extern "C" {
    /// Saves callee-saved registers on the outgoing stack, records its RSP
    /// at `*old_rsp_ptr`, loads `new_rsp`, restores registers, and `ret`s
    /// into the incoming task's saved return address.
    fn context_switch_asm(old_rsp_ptr: *mut u64, new_rsp: u64);
}

/// Lays out a fresh kernel stack so the first `context_switch_asm` pop
/// sequence lands in `task_entry_trampoline` with a clean (zeroed)
/// callee-saved register file.
fn prepare_initial_stack(tcb: &mut Tcb) {
    let top = tcb.kernel_stack_top();
    let sp = top - 7 * 8;
    unsafe {
        let ptr = sp as *mut u64;
        ptr.add(0).write(0); // r15
        ptr.add(1).write(0); // r14
        ptr.add(2).write(0); // r13
        ptr.add(3).write(0); // r12
        ptr.add(4).write(0); // rbx
        ptr.add(5).write(0); // rbp
        ptr.add(6).write(task_entry_trampoline as u64); // return address
    }
    tcb.kernel_rsp = sp;
}

/// Where `context_switch_asm` first `ret`s to for a freshly created task.
/// Reads the now-current task's entry point and user stack, then drops to
/// Ring 3. Never returns.
extern "C" fn task_entry_trampoline() -> ! {
    let (entry, user_rsp) = {
        let st = STATE.lock();
        let pid = st.current.expect("trampoline entered with no current task");
        let tcb = st.task(pid).expect("current task must have a live TCB");
        (tcb.entry, tcb.user_stack_top)
    };

    klog::info!("task: entering user mode rip={} rsp={}", entry, user_rsp);

    let frame = IretqFrame::new(
        entry.as_u64(),
        gdt::USER_CODE_SELECTOR,
        gdt::USER_DATA_SELECTOR,
        user_rsp.as_u64(),
    );
    unsafe { usermode::jump_to_ring3(&frame) };
}

/// What happens to the outgoing task before the next one is picked.
enum Demote {
    ToReady,
    ToBlocked,
    ToZombie,
}

/// The single scheduling decision point: demotes the outgoing task,
/// dequeues the next Ready task (or the same one, if it was the only
/// Ready task), and switches to it. If no task is Ready, halts waiting
/// for the next interrupt to retry.
fn schedule(demote: Demote) {
    let (old_ptr, new_rsp, new_cr3, new_rsp0, halt) = {
        let mut st = STATE.lock();
        let old_pid = st.current.expect("schedule() called with no current task");

        match demote {
            Demote::ToReady => {
                if let Some(tcb) = st.task_mut(old_pid) {
                    tcb.state = TaskState::Ready;
                }
                st.ready.push(old_pid).expect("ready queue capacity matches task count");
            }
            Demote::ToBlocked => {
                if let Some(tcb) = st.task_mut(old_pid) {
                    tcb.state = TaskState::Blocked;
                }
            }
            Demote::ToZombie => {
                if let Some(slot) = st.slot_of(old_pid) {
                    st.tasks[slot] = None;
                }
            }
        }

        match st.ready.pop() {
            Some(next_pid) => {
                if let Some(tcb) = st.task_mut(next_pid) {
                    tcb.state = TaskState::Running;
                }
                st.current = Some(next_pid);
                let next = st.task(next_pid).expect("next task must exist");
                let new_rsp = next.kernel_rsp;
                let new_cr3 = next.address_space_root;
                let new_rsp0 = next.kernel_stack_top();
                let old_ptr = match st.task_mut(old_pid) {
                    Some(tcb) => &mut tcb.kernel_rsp as *mut u64,
                    None => core::ptr::addr_of_mut!(BOOTSTRAP_RSP),
                };
                (old_ptr, new_rsp, new_cr3, new_rsp0, false)
            }
            None => {
                st.current = None;
                (core::ptr::null_mut(), 0, PhysAddr::zero(), 0, true)
            }
        }
    };

    if halt {
        loop {
            cpu::halt();
        }
    }

    // The incoming task is about to become the one taking Ring3->Ring0
    // traps (syscalls, faults, the next timer tick); RSP0 must point at
    // its own kernel stack before that can happen safely, and so must the
    // `syscall` fast path's own stack-switch scratch variable — it does
    // not go through the TSS at all.
    unsafe {
        Tss::set_rsp0(traps::tss_ptr(), new_rsp0);
        core::ptr::write_volatile(core::ptr::addr_of_mut!(crate::arch::syscall::SYSCALL_KERNEL_RSP), new_rsp0);
    }

    // All tasks currently share one address space (see DESIGN.md); the
    // reload is a no-op today but keeps the contract spec §4.1 describes
    // ("address-space switch occurs when the incoming root differs").
    let active = crate::memory::paging::active_root();
    if new_cr3 != active {
        unsafe { cpu::write_cr3(new_cr3.as_u64()) };
    }

    unsafe { context_switch_asm(old_ptr, new_rsp) };
}

// ── Public scheduler API (spec §4.1) ─────────────────────────────

/// Creates a task in the Ready state. Initializes its machine context so
/// the first switch restores to `entry` with a clean register file and a
/// user stack carved from this task's slice of the shared user range.
///
/// `priority` is accepted and stored per spec §4.1's signature but is not
/// read by this round-robin policy (spec §3: "reserved").
pub fn create_task(name: &str, entry: VirtAddr, priority: u8) -> Result<Pid, TaskError> {
    let mut st = STATE.lock();
    let slot = st.free_slot().ok_or(TaskError::NoSlot)?;
    let pid = st.next_pid;
    st.next_pid += 1;

    let user_stack_top = VirtAddr::new(layout::USER_STACK_TOP - (slot as u64) * layout::USER_STACK_SIZE);
    let root = crate::memory::paging::active_root();

    // The kernel stack lives inline in the Tcb (no heap indirection), so
    // its initial layout must be written after the Tcb reaches its final
    // resting place in the task table — `prepare_initial_stack` records an
    // absolute address into `kernel_rsp`, which a later move would
    // silently invalidate.
    st.tasks[slot] = Some(Tcb::new(pid, name, priority, entry, user_stack_top, root));
    prepare_initial_stack(st.tasks[slot].as_mut().expect("just inserted"));
    st.ready.push(pid).expect("ready queue capacity matches task count");
    Ok(pid)
}

/// Performs the first-ever context switch, from the boot call stack into
/// the first Ready task. Never returns.
pub fn start() -> ! {
    let (new_rsp, new_cr3, new_rsp0) = {
        let mut st = STATE.lock();
        let pid = st.ready.pop().expect("start() requires at least one created task");
        if let Some(tcb) = st.task_mut(pid) {
            tcb.state = TaskState::Running;
        }
        st.current = Some(pid);
        let tcb = st.task(pid).expect("just-scheduled task must exist");
        (tcb.kernel_rsp, tcb.address_space_root, tcb.kernel_stack_top())
    };

    unsafe {
        Tss::set_rsp0(traps::tss_ptr(), new_rsp0);
        core::ptr::write_volatile(core::ptr::addr_of_mut!(crate::arch::syscall::SYSCALL_KERNEL_RSP), new_rsp0);
    }
    unsafe { cpu::write_cr3(new_cr3.as_u64()) };
    unsafe {
        context_switch_asm(core::ptr::addr_of_mut!(BOOTSTRAP_RSP), new_rsp);
    }
    unreachable!("bootstrap stack is never switched back to");
}

/// Voluntary preemption: demote to Ready, enqueue, switch.
pub fn yield_now() {
    schedule(Demote::ToReady);
}

/// Timer-IRQ preemption entry: acknowledge the PIC, then do exactly what
/// `yield_now` does for the current task. Callable from interrupt context.
pub fn preempt() {
    khal::pic::send_eoi(layout::TIMER_IRQ);
    schedule(Demote::ToReady);
}

/// Marks the current task Zombie (slot freed) and switches away. If no
/// task is Ready, halts the CPU in a loop waiting for IRQs.
pub fn exit(code: i32) -> ! {
    klog::info!("task: exit code={}", code);
    schedule(Demote::ToZombie);
    unreachable!("exit() never resumes its caller");
}

/// Blocks the current task (used by `ipc::recv` on an empty mailbox) and
/// switches away. Returns once a later `unblock`/`deliver` makes this
/// task Ready again and the scheduler dispatches it.
pub fn block_current_for_recv() {
    schedule(Demote::ToBlocked);
}

/// Moves a Blocked task back to Ready and enqueues it. No-op if the task
/// is not currently Blocked (e.g. already exited).
pub fn unblock(pid: Pid) {
    let mut st = STATE.lock();
    if let Some(tcb) = st.task_mut(pid) {
        if tcb.state == TaskState::Blocked {
            tcb.state = TaskState::Ready;
            let _ = st.ready.push(pid);
        }
    }
}

/// PID of the currently Running task, if any.
pub fn current_pid() -> Option<Pid> {
    STATE.lock().current
}

/// Number of tasks currently occupying a slot (any state).
pub fn task_count() -> usize {
    STATE.lock().tasks.iter().filter(|t| t.is_some()).count()
}

/// Number of tasks in the ready queue, for diagnostics and tests.
pub fn ready_len() -> usize {
    STATE.lock().ready.len()
}

// ── IPC-facing table access ──────────────────────────────────────
//
// `ipc::send`/`recv`/`broadcast` delegate here because delivering a
// message and waking a Blocked receiver both need the same table lock
// IPC itself has no handle to.

/// Delivers `message` to `dst_pid`'s mailbox and wakes it if Blocked.
pub fn deliver(dst_pid: Pid, message: Message) -> Result<usize, IpcError> {
    let mut st = STATE.lock();
    let tcb = st.task_mut(dst_pid).ok_or(IpcError::UnknownDestination)?;
    tcb.mailbox.push(message)?;
    let len = message.len;
    let was_blocked = tcb.state == TaskState::Blocked;
    if was_blocked {
        tcb.state = TaskState::Ready;
    }
    if was_blocked {
        let _ = st.ready.push(dst_pid);
    }
    Ok(len)
}

/// Non-blocking receive attempt for the current task. `Ok(None)` means
/// the mailbox was empty and the caller should block and retry.
pub fn try_recv_current(buffer: &mut [u8], capacity: usize) -> Result<Option<usize>, IpcError> {
    let mut st = STATE.lock();
    let pid = st.current.ok_or(IpcError::NoCurrentTask)?;
    let tcb = st.task_mut(pid).ok_or(IpcError::NoCurrentTask)?;
    match tcb.mailbox.pop() {
        Some(message) => {
            let copy_len = message.len.min(capacity).min(buffer.len());
            buffer[..copy_len].copy_from_slice(&message.payload[..copy_len]);
            Ok(Some(copy_len))
        }
        None => Ok(None),
    }
}

/// Sends to every live task other than the caller. Returns the number of
/// recipients the send succeeded for.
pub fn broadcast(buffer: &[u8], length: usize) -> usize {
    let length = length.min(crate::ipc::MAX_MESSAGE_SIZE).min(buffer.len());
    let Some(sender) = current_pid() else { return 0 };

    let mut payload = [0u8; crate::ipc::MAX_MESSAGE_SIZE];
    payload[..length].copy_from_slice(&buffer[..length]);

    let mut st = STATE.lock();
    let recipients: [Option<Pid>; MAX_TASKS] =
        core::array::from_fn(|i| st.tasks[i].as_ref().map(|t| t.pid).filter(|&pid| pid != sender));

    let mut delivered = 0;
    for maybe_pid in recipients {
        let Some(pid) = maybe_pid else { continue };
        let message = Message { sender, receiver: pid, len: length, payload };
        if let Some(tcb) = st.task_mut(pid) {
            if tcb.mailbox.push(message).is_ok() {
                delivered += 1;
                if tcb.state == TaskState::Blocked {
                    tcb.state = TaskState::Ready;
                    let _ = st.ready.push(pid);
                }
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_queue_is_fifo() {
        let mut q = ReadyQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn ready_queue_rejects_past_capacity() {
        let mut q = ReadyQueue::new();
        for pid in 0..MAX_TASKS as Pid {
            q.push(pid).unwrap();
        }
        assert!(q.push(99).is_err());
    }
}
