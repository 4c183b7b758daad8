/// Inter-process communication: capability-guarded message queues and
/// NUMA-aware shared memory (C6).
///
/// Lock ordering when a caller needs both a queue/shm table lock and the
/// capability table lock: always take the object table first, release it,
/// then touch `capability` — no function in this module holds both at once.
pub mod capability;
pub mod crypto;
pub mod queue;
pub mod shm;

pub use capability::{CapOps, CapStats, ObjectKind};
pub use queue::{Message, Payload, QueueFlags};
pub use shm::ShmFlags;

/// Bring up the IPC subsystem's global tables. Must run after `mm` is
/// initialized (shm segment allocation depends on the frame allocator) and
/// before any process can call into queue/shm syscalls.
pub fn init() {
    capability::init();
    queue::init();
    shm::init();
}
