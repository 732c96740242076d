//! Inter-process communication: per-task bounded mailboxes.
//!
//! The mailbox itself is plain data (`Mailbox` lives inside each `Tcb`);
//! `send`/`recv`/`broadcast` here are the public API and delegate table
//! access and scheduler coordination to `task::scheduler`, which is the
//! only code allowed to touch the task table directly.

use crate::task::scheduler;
use crate::task::tcb::Pid;

/// Upper bound on messages queued in one mailbox at a time.
pub const MAX_IPC_MESSAGES: usize = 32;

/// Upper bound on a single message's payload, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 256;

/// A delivered message: sender/receiver identity plus a fixed payload
/// buffer. `len` bytes of `payload` are valid; the rest is unspecified.
#[derive(Clone, Copy)]
pub struct Message {
    pub sender: Pid,
    pub receiver: Pid,
    pub len: usize,
    pub payload: [u8; MAX_MESSAGE_SIZE],
}

impl Message {
    const fn empty() -> Self {
        Self {
            sender: 0,
            receiver: 0,
            len: 0,
            payload: [0; MAX_MESSAGE_SIZE],
        }
    }
}

/// Errors `send`/`recv` can return, per spec §4.2's failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    InvalidLength,
    UnknownDestination,
    MailboxFull,
    NoCurrentTask,
}

/// A bounded FIFO of `Message`s, owned by a `Tcb` for its lifetime.
pub struct Mailbox {
    messages: [Message; MAX_IPC_MESSAGES],
    head: usize,
    tail: usize,
    count: usize,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            messages: [Message::empty(); MAX_IPC_MESSAGES],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.count == MAX_IPC_MESSAGES
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Appends `message` at the tail. Fails if the mailbox is full.
    pub fn push(&mut self, message: Message) -> Result<(), IpcError> {
        if self.is_full() {
            return Err(IpcError::MailboxFull);
        }
        self.messages[self.tail] = message;
        self.tail = (self.tail + 1) % MAX_IPC_MESSAGES;
        self.count += 1;
        Ok(())
    }

    /// Removes and returns the head message, if any.
    pub fn pop(&mut self) -> Option<Message> {
        if self.is_empty() {
            return None;
        }
        let message = self.messages[self.head];
        self.head = (self.head + 1) % MAX_IPC_MESSAGES;
        self.count -= 1;
        Some(message)
    }
}

/// Sends `length` bytes of `buffer` to `dst_pid`'s mailbox.
///
/// Validates length, resolves the destination, and — if the destination
/// was Blocked waiting on this mailbox — unblocks it. Never switches
/// tasks itself; preemption remains timer-driven.
pub fn send(dst_pid: Pid, buffer: &[u8], length: usize) -> Result<usize, IpcError> {
    if length > MAX_MESSAGE_SIZE || length > buffer.len() {
        return Err(IpcError::InvalidLength);
    }
    let sender = scheduler::current_pid().ok_or(IpcError::NoCurrentTask)?;

    let mut payload = [0u8; MAX_MESSAGE_SIZE];
    payload[..length].copy_from_slice(&buffer[..length]);
    let message = Message {
        sender,
        receiver: dst_pid,
        len: length,
        payload,
    };

    scheduler::deliver(dst_pid, message)
}

/// Receives into `buffer` (up to `capacity` bytes), blocking if the
/// current task's mailbox is empty.
///
/// On wakeup the dequeue is retried explicitly rather than assumed to
/// succeed — see spec §9's note on the post-wakeup recheck.
pub fn recv(buffer: &mut [u8], capacity: usize) -> Result<usize, IpcError> {
    loop {
        if let Some(copied) = scheduler::try_recv_current(buffer, capacity)? {
            return Ok(copied);
        }
        scheduler::block_current_for_recv();
    }
}

/// Sends to every non-Zombie task other than the caller; returns the
/// count of recipients the send succeeded for. Partial success is not
/// rolled back.
pub fn broadcast(buffer: &[u8], length: usize) -> usize {
    scheduler::broadcast(buffer, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: Pid, len: usize) -> Message {
        Message {
            sender,
            receiver: 0,
            len,
            payload: [0; MAX_MESSAGE_SIZE],
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut mailbox = Mailbox::new();
        mailbox.push(msg(1, 4)).unwrap();
        mailbox.push(msg(2, 5)).unwrap();
        assert_eq!(mailbox.pop().unwrap().sender, 1);
        assert_eq!(mailbox.pop().unwrap().sender, 2);
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn fills_to_capacity_then_rejects() {
        let mut mailbox = Mailbox::new();
        for _ in 0..MAX_IPC_MESSAGES {
            mailbox.push(msg(1, 1)).unwrap();
        }
        assert_eq!(mailbox.push(msg(1, 1)), Err(IpcError::MailboxFull));
        mailbox.pop().unwrap();
        assert!(mailbox.push(msg(1, 1)).is_ok());
    }

    #[test]
    fn count_matches_head_tail_distance() {
        let mut mailbox = Mailbox::new();
        assert_eq!(mailbox.count(), 0);
        mailbox.push(msg(1, 1)).unwrap();
        mailbox.push(msg(1, 1)).unwrap();
        mailbox.pop().unwrap();
        assert_eq!(mailbox.count(), 1);
    }
}
