/// Capability-guarded IPC message queues.
///
/// Two ordering disciplines selected at creation time (spec 4.6.1):
/// plain FIFO, or priority-descending with FIFO among equal priorities.
/// Senders/receivers are validated against the capability table in
/// [`super::capability`] before the queue itself is touched.
use super::capability::{self, CapOps, ObjectKind};
use crate::lib::error::{Errno, Result};
use crate::process::Pid;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

bitflags::bitflags! {
    /// Queue creation flags (spec 4.6 wire-visible flag values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueFlags: u32 {
        const ACCESS_CONTROL = 0x01;
        const PRIORITY_QUEUE = 0x02;
        const ENCRYPTED       = 0x04;
        const ZERO_COPY       = 0x08;
    }
}

pub const MAX_PAYLOAD_BYTES: usize = 4096;
pub const DEFAULT_CAPACITY: usize = 64;

/// A message's payload, either copied into the queue or shared with the
/// sender (spec 3 "IPC message": "if zero-copy, payload is borrowed from
/// sender until receiver releases; otherwise queue owns a copied payload").
///
/// `Shared` never duplicates the sender's bytes: the `Arc` is cloned (a
/// refcount bump) on send, on delivery to the receiver, and again into the
/// queue's `pending_zero_copy` table, which is the "still borrowed" marker
/// until the receiver calls [`release`].
#[derive(Debug, Clone)]
pub enum Payload {
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
}

impl Payload {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Owned(v) => v,
            Payload::Shared(a) => a,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub msg_id: u64,
    pub sender: Pid,
    pub priority: u8,
    pub payload: Payload,
    pub zero_copy: bool,
    pub timestamp_us: u64,
    pub deadline_us: u64,
}

struct QueueState {
    id: u64,
    owner: Pid,
    flags: QueueFlags,
    capacity: usize,
    messages: VecDeque<Message>,
    peak_depth: usize,
    cipher: Option<super::crypto::StreamCipher>,
    /// Zero-copy deliveries the receiver has not yet released; the queue
    /// keeps its `Arc` clone pinned here until then (spec 4.6.1 ownership
    /// rule for zero-copy messages).
    pending_zero_copy: BTreeMap<u64, Arc<[u8]>>,
    /// PIDs parked in `receive()` waiting for this queue to become
    /// non-empty, in arrival order (spec 4.6.1: "wake one waiter").
    waiting_receivers: VecDeque<Pid>,
}

impl QueueState {
    fn is_priority(&self) -> bool {
        self.flags.contains(QueueFlags::PRIORITY_QUEUE)
    }

    fn insert(&mut self, msg: Message) {
        if self.is_priority() {
            // Weakly descending by priority: insert after the last entry
            // with priority >= msg.priority, preserving FIFO among ties.
            let pos = self
                .messages
                .iter()
                .position(|m| m.priority < msg.priority)
                .unwrap_or(self.messages.len());
            self.messages.insert(pos, msg);
        } else {
            self.messages.push_back(msg);
        }
        if self.messages.len() > self.peak_depth {
            self.peak_depth = self.messages.len();
        }
    }
}

struct QueueTable {
    queues: BTreeMap<u64, QueueState>,
}

static TABLE: Mutex<Option<QueueTable>> = Mutex::new(None);
static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MSG_ID: AtomicU64 = AtomicU64::new(1);

pub fn init() {
    *TABLE.lock() = Some(QueueTable { queues: BTreeMap::new() });
}

/// Create a queue owned by `owner`; grants the owner full rights.
pub fn create_queue(owner: Pid, flags: QueueFlags, capacity: usize) -> Result<u64> {
    if capacity == 0 {
        return Err(Errno::EINVAL);
    }
    let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
    let cipher = if flags.contains(QueueFlags::ENCRYPTED) {
        Some(super::crypto::StreamCipher::new(id))
    } else {
        None
    };
    let state = QueueState {
        id,
        owner,
        flags,
        capacity,
        messages: VecDeque::new(),
        peak_depth: 0,
        cipher,
        pending_zero_copy: BTreeMap::new(),
        waiting_receivers: VecDeque::new(),
    };
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    table.queues.insert(id, state);
    drop(guard);

    if flags.contains(QueueFlags::ACCESS_CONTROL) {
        capability::grant(
            owner,
            owner,
            id,
            ObjectKind::Queue,
            CapOps::READ | CapOps::WRITE | CapOps::DELETE | CapOps::ADMIN,
            0,
            true,
            true,
            0,
        )?;
    }
    Ok(id)
}

pub fn destroy_queue(owner: Pid, queue_id: u64) -> Result<()> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let q = table.queues.get(&queue_id).ok_or(Errno::EINVAL)?;
    if q.owner != owner {
        return Err(Errno::EPERM);
    }
    table.queues.remove(&queue_id);
    drop(guard);
    capability::revoke_for_object(owner, queue_id, ObjectKind::Queue);
    Ok(())
}

fn check_access(queue: &QueueState, pid: Pid, op: CapOps, now: u64) -> Result<()> {
    if !queue.flags.contains(QueueFlags::ACCESS_CONTROL) {
        return Ok(());
    }
    capability::validate(pid, queue.id, ObjectKind::Queue, op, now)
}

/// Enqueue `payload` from `sender`. Fails on capacity, oversized payload, or
/// capability denial; the last case is caller-visible as `Errno::EACCES`
/// (spec S4: a denied send bumps `security_violations` exactly once, which
/// `capability::validate` already does internally).
///
/// `zero_copy` asks the queue to share `payload` by reference (an `Arc`
/// clone) instead of copying it; honored only when the queue itself was
/// created with `QueueFlags::ZERO_COPY` and the queue is not encrypted
/// (encryption transforms the bytes, so there is nothing left to share with
/// the sender's original buffer — see spec 4.6.4).
#[allow(clippy::too_many_arguments)]
pub fn send(
    queue_id: u64,
    sender: Pid,
    priority: u8,
    payload: &[u8],
    zero_copy: bool,
    deadline_us: u64,
    now_us: u64,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(Errno::EMSGSIZE);
    }
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let queue = table.queues.get_mut(&queue_id).ok_or(Errno::EINVAL)?;
    check_access(queue, sender, CapOps::WRITE, now_us)?;
    if queue.messages.len() >= queue.capacity {
        return Err(Errno::ENOSPC);
    }

    let use_zero_copy = zero_copy && queue.flags.contains(QueueFlags::ZERO_COPY) && queue.cipher.is_none();
    let msg_id = NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed);
    let payload = if use_zero_copy {
        Payload::Shared(Arc::from(payload))
    } else {
        let mut bytes = payload.to_vec();
        if let Some(cipher) = queue.cipher.as_mut() {
            bytes = cipher.encrypt(&bytes);
        }
        Payload::Owned(bytes)
    };
    queue.insert(Message {
        msg_id,
        sender,
        priority,
        payload,
        zero_copy: use_zero_copy,
        timestamp_us: now_us,
        deadline_us,
    });

    // Spec 4.6.1: "wake one waiter" — exactly one, not a broadcast.
    if let Some(pid) = queue.waiting_receivers.pop_front() {
        crate::process::scheduler::wake_process(pid);
    }
    Ok(())
}

/// Dequeue the next message for `receiver`. FIFO queues pop the head;
/// priority queues pop the head too, since `insert` already maintains
/// weakly-descending order there.
///
/// `wait_deadline_us == 0` is a non-blocking poll: an empty queue returns
/// `Errno::EAGAIN` immediately. A nonzero deadline blocks the caller (spec
/// 4.6.1: "while queue empty and deadline not reached, wait") by attaching
/// it to the queue's wait list and invoking the scheduler's suspension
/// primitive (spec 5); it returns `Errno::ETIMEDOUT` once `now >= deadline`.
pub fn receive(queue_id: u64, receiver: Pid, wait_deadline_us: u64) -> Result<Message> {
    loop {
        let now = crate::time::get_time_since_boot_us();
        {
            let mut guard = TABLE.lock();
            let table = guard.as_mut().ok_or(Errno::EINVAL)?;
            let queue = table.queues.get_mut(&queue_id).ok_or(Errno::EINVAL)?;
            check_access(queue, receiver, CapOps::READ, now)?;

            if let Some(mut msg) = queue.messages.pop_front() {
                if let Some(cipher) = queue.cipher.as_mut() {
                    if let Payload::Owned(ref mut bytes) = msg.payload {
                        *bytes = cipher.decrypt(bytes);
                    }
                }
                if let Payload::Shared(ref shared) = msg.payload {
                    queue.pending_zero_copy.insert(msg.msg_id, shared.clone());
                }
                return Ok(msg);
            }

            if wait_deadline_us == 0 {
                return Err(Errno::EAGAIN);
            }
            if now >= wait_deadline_us {
                return Err(Errno::ETIMEDOUT);
            }
            queue.waiting_receivers.push_back(receiver);
        }
        // Lock released before suspending: IPC queue locks are never held
        // across a wait (spec 5 shared-resource policy).
        crate::process::scheduler::block_current();
    }
}

/// Release a zero-copy delivery, dropping the queue's pinned reference to
/// the shared buffer. `Errno::ENOENT` if `msg_id` was never delivered
/// zero-copy on this queue, or was already released.
pub fn release(queue_id: u64, msg_id: u64) -> Result<()> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let queue = table.queues.get_mut(&queue_id).ok_or(Errno::EINVAL)?;
    queue.pending_zero_copy.remove(&msg_id).ok_or(Errno::ENOENT)?;
    Ok(())
}

/// Count of zero-copy deliveries still awaiting `release` on this queue.
pub fn pending_zero_copy_count(queue_id: u64) -> Result<usize> {
    let guard = TABLE.lock();
    let table = guard.as_ref().ok_or(Errno::EINVAL)?;
    Ok(table.queues.get(&queue_id).ok_or(Errno::EINVAL)?.pending_zero_copy.len())
}

pub fn depth(queue_id: u64) -> Result<usize> {
    let guard = TABLE.lock();
    let table = guard.as_ref().ok_or(Errno::EINVAL)?;
    Ok(table.queues.get(&queue_id).ok_or(Errno::EINVAL)?.messages.len())
}

/// Monotonic high-water mark of queue depth since creation (spec invariant:
/// "peak_queue_depth never decreases").
pub fn peak_depth(queue_id: u64) -> Result<usize> {
    let guard = TABLE.lock();
    let table = guard.as_ref().ok_or(Errno::EINVAL)?;
    Ok(table.queues.get(&queue_id).ok_or(Errno::EINVAL)?.peak_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        init();
        capability::init();
    }

    #[test]
    fn fifo_round_trip_is_byte_identical() {
        setup();
        let q = create_queue(1, QueueFlags::empty(), 8).unwrap();
        send(q, 1, 0, b"payload-one", false, 0, 10).unwrap();
        send(q, 1, 0, b"payload-two", false, 0, 11).unwrap();
        let m1 = receive(q, 1, 12).unwrap();
        let m2 = receive(q, 1, 13).unwrap();
        assert_eq!(m1.payload.as_slice(), b"payload-one");
        assert_eq!(m2.payload.as_slice(), b"payload-two");
    }

    #[test]
    fn priority_queue_orders_weakly_descending() {
        setup();
        let q = create_queue(1, QueueFlags::PRIORITY_QUEUE, 8).unwrap();
        send(q, 1, 1, b"A", false, 0, 1).unwrap();
        send(q, 1, 5, b"B", false, 0, 2).unwrap();
        send(q, 1, 3, b"C", false, 0, 3).unwrap();
        let order: Vec<u8> = (0..3).map(|_| receive(q, 1, 4).unwrap().payload.as_slice()[0]).collect();
        assert_eq!(order, alloc::vec![b'B', b'C', b'A']);
    }

    #[test]
    fn peak_depth_never_decreases() {
        setup();
        let q = create_queue(1, QueueFlags::empty(), 8).unwrap();
        send(q, 1, 0, b"x", false, 0, 0).unwrap();
        send(q, 1, 0, b"y", false, 0, 0).unwrap();
        assert_eq!(peak_depth(q).unwrap(), 2);
        receive(q, 1, 0).unwrap();
        receive(q, 1, 0).unwrap();
        assert_eq!(peak_depth(q).unwrap(), 2);
    }

    #[test]
    fn capacity_exhaustion_rejects_send() {
        setup();
        let q = create_queue(1, QueueFlags::empty(), 1).unwrap();
        send(q, 1, 0, b"x", false, 0, 0).unwrap();
        assert_eq!(send(q, 1, 0, b"y", false, 0, 0), Err(Errno::ENOSPC));
    }

    #[test]
    fn access_control_denies_unauthorized_sender() {
        setup();
        let q = create_queue(1, QueueFlags::ACCESS_CONTROL, 8).unwrap();
        let before = capability::stats().security_violations;
        let result = send(q, 999, 0, b"x", false, 0, 0);
        assert_eq!(result, Err(Errno::EACCES));
        assert_eq!(capability::stats().security_violations, before + 1);
    }

    #[test]
    fn encrypted_queue_round_trips_through_cipher() {
        setup();
        let q = create_queue(1, QueueFlags::ENCRYPTED, 8).unwrap();
        send(q, 1, 0, b"secret message", false, 0, 0).unwrap();
        let msg = receive(q, 1, 0).unwrap();
        assert_eq!(msg.payload.as_slice(), b"secret message");
    }

    #[test]
    fn zero_copy_send_shares_buffer_and_requires_release() {
        setup();
        let q = create_queue(1, QueueFlags::ZERO_COPY, 8).unwrap();
        send(q, 1, 0, b"zero-copy-payload", true, 0, 0).unwrap();
        let msg = receive(q, 1, 0).unwrap();
        assert!(msg.zero_copy);
        assert_eq!(msg.payload.as_slice(), b"zero-copy-payload");
        // Still pinned: the queue has not forgotten it was borrowed.
        assert_eq!(pending_zero_copy_count(q).unwrap(), 1);
        release(q, msg.msg_id).unwrap();
        assert_eq!(pending_zero_copy_count(q).unwrap(), 0);
        // Releasing twice is an error, not a silent no-op.
        assert_eq!(release(q, msg.msg_id), Err(Errno::ENOENT));
    }

    #[test]
    fn zero_copy_request_on_plain_queue_falls_back_to_owned() {
        setup();
        // Queue wasn't created with ZERO_COPY, so the request is downgraded.
        let q = create_queue(1, QueueFlags::empty(), 8).unwrap();
        send(q, 1, 0, b"not actually shared", true, 0, 0).unwrap();
        let msg = receive(q, 1, 0).unwrap();
        assert!(!msg.zero_copy);
        assert_eq!(pending_zero_copy_count(q).unwrap(), 0);
    }

    #[test]
    fn deadline_already_past_returns_timed_out_without_blocking() {
        setup();
        let q = create_queue(1, QueueFlags::empty(), 8).unwrap();
        // Empty queue, deadline already behind "now": must fail fast with
        // TimedOut rather than EAGAIN or hanging in the wait loop.
        let now = crate::time::get_time_since_boot_us();
        assert_eq!(receive(q, 1, now.max(1)), Err(Errno::ETIMEDOUT));
    }

    #[test]
    fn non_blocking_receive_on_empty_queue_is_again() {
        setup();
        let q = create_queue(1, QueueFlags::empty(), 8).unwrap();
        assert_eq!(receive(q, 1, 0), Err(Errno::EAGAIN));
    }
}
