/// Process, thread, and scheduling subsystem (spec 4.3 / 4.4 / 4.5).
///
/// The process table is the single source of truth for every `Process` and
/// its `Thread`s; the scheduler only ever stores `(pid, tid)` pairs in its
/// ready queues and resolves them back through here. Lock order note (spec
/// 5): process table lock is always acquired before a ready-queue lock,
/// never the reverse.
pub mod advanced;
pub mod scheduler;
pub mod task;

pub use task::{Pid, PriorityClass, Process, ProcessState, Thread, Tid, Vma, VmaFlags, MemoryManager};

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

static PROCESS_TABLE: Mutex<BTreeMap<Pid, Process>> = Mutex::new(BTreeMap::new());
static NEXT_PID: AtomicU32 = AtomicU32::new(1); // PID 0 is the kernel task

/// `process_init()` (4.3): create PID 0 as the current kernel task.
pub fn process_init() {
    let kernel_task = Process::new_kernel_task();
    let (pid, tid) = (kernel_task.pid, kernel_task.threads[0].tid);
    PROCESS_TABLE.lock().insert(kernel_task.pid, kernel_task);
    scheduler::enqueue(pid, tid, PriorityClass::Realtime);
    scheduler::schedule();
    crate::info!("process: PID 0 (kernel task) created and running");
}

/// `process_create(entry_point)` (4.3): allocate a PID, stack, and address
/// space; enqueue at priority normal. Returns `None` on resource exhaustion.
pub fn process_create(name: &str, entry: extern "C" fn() -> !) -> Option<Pid> {
    let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
    let proc = Process::new_with_entry(pid, current_pid(), String::from(name), entry).ok()?;
    let tid = proc.threads[0].tid;
    PROCESS_TABLE.lock().insert(pid, proc);
    scheduler::enqueue(pid, tid, PriorityClass::Normal);
    Some(pid)
}

/// `thread_create(entry_point)` (4.3): add a thread to the *current*
/// process, primed and enqueued at the tail of the process's class.
pub fn thread_create(entry: extern "C" fn() -> !) -> Option<Tid> {
    let pid = current_pid();
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(&pid)?;
    let tid = proc.threads.len() as Tid;
    proc.add_thread(tid, entry).ok()?;
    let class = proc.priority_class;
    drop(table);
    scheduler::enqueue(pid, tid, class);
    Some(tid)
}

/// `process_cleanup(proc)` (4.3): release address space, kernel stacks, and
/// thread list; mark the PID slot free (allowing future reuse).
pub fn process_cleanup(pid: Pid) {
    if let Some(proc) = PROCESS_TABLE.lock().remove(&pid) {
        for t in proc.threads.iter() {
            scheduler::forget(pid, t.tid);
            crate::mm::free_pages(t.kstack_base, 2);
        }
    }
}

/// PID of the currently running thread's process (spec 3: "current is never
/// null post-init").
pub fn current_pid() -> Pid {
    scheduler::current().map(|(pid, _)| pid).unwrap_or(0)
}

/// Run `f` with mutable access to a thread, returning its result, or `None`
/// if the (pid, tid) no longer exists.
pub fn with_thread_mut<R>(pid: Pid, tid: Tid, f: impl FnOnce(&mut Thread) -> R) -> Option<R> {
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(&pid)?;
    let thread = proc.threads.iter_mut().find(|t| t.tid == tid)?;
    Some(f(thread))
}

/// Run `f` with mutable access to a process, returning its result, or `None`
/// if the pid no longer exists.
pub fn with_process_mut<R>(pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(&pid)?;
    Some(f(proc))
}

/// Raw pointer to a thread's saved stack pointer slot, for use by
/// `context_switch`. Only valid while the thread is not the one currently
/// executing (see `scheduler::schedule`'s safety note).
pub fn thread_sp_ptr(pid: Pid, tid: Tid) -> Option<*mut u64> {
    let mut table = PROCESS_TABLE.lock();
    let proc = table.get_mut(&pid)?;
    let thread = proc.threads.iter_mut().find(|t| t.tid == tid)?;
    Some(&mut thread.saved_sp as *mut u64)
}

/// Number of live processes (diagnostics).
pub fn process_count() -> usize {
    PROCESS_TABLE.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_entry() -> ! {
        loop {}
    }

    #[test]
    fn process_create_assigns_monotonic_nonzero_pids() {
        let a = process_create("a", noop_entry);
        let b = process_create("b", noop_entry);
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
        assert!(a.unwrap() != 0 && b.unwrap() != 0);
    }
}
