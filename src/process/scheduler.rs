/// Base scheduler: multi-level feedback queue (spec 4.4).
///
/// One ready queue per `PriorityClass`, highest class served first; within a
/// class, round-robin via a circular (here: `VecDeque`, rotated head-to-tail)
/// list. The overlay in `advanced` tunes placement and quanta without
/// touching this dispatch discipline.
use super::task::{Pid, PriorityClass, ProcessState, Tid};
use alloc::collections::VecDeque;
use spin::Mutex;

/// (pid, tid) — the ready-queue entries just name a runnable thread.
type Entity = (Pid, Tid);

struct ReadyQueues {
    classes: [VecDeque<Entity>; PriorityClass::COUNT],
}

impl ReadyQueues {
    const fn new() -> Self {
        Self {
            classes: [VecDeque::new(), VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }

    fn enqueue(&mut self, class: PriorityClass, e: Entity) {
        self.classes[class.index()].push_back(e);
    }

    /// Pop the head of the highest non-empty class.
    fn pop_highest(&mut self) -> Option<Entity> {
        for q in self.classes.iter_mut() {
            if let Some(e) = q.pop_front() {
                return Some(e);
            }
        }
        None
    }

    fn remove(&mut self, e: Entity) {
        for q in self.classes.iter_mut() {
            q.retain(|x| *x != e);
        }
    }

    /// Move to the head of its class (input boost, 4.5).
    fn promote_to_head(&mut self, class: PriorityClass, e: Entity) {
        self.classes[class.index()].retain(|x| *x != e);
        self.classes[class.index()].push_front(e);
    }
}

static READY: Mutex<ReadyQueues> = Mutex::new(ReadyQueues::new());
static CURRENT: Mutex<Option<Entity>> = Mutex::new(None);

/// Enqueue a runnable thread at the tail of its class (4.4 tie-break rule:
/// "a new process enters at the tail of its initial class").
pub fn enqueue(pid: Pid, tid: Tid, class: PriorityClass) {
    READY.lock().enqueue(class, (pid, tid));
}

/// Currently executing (pid, tid), if the scheduler has run at least once.
pub fn current() -> Option<(Pid, Tid)> {
    *CURRENT.lock()
}

/// `schedule()` — spec 4.4 algorithm, steps 1-6.
pub fn schedule() {
    let next = {
        let mut ready = READY.lock();
        match ready.pop_highest() {
            Some(e) => e,
            None => return, // step 1: nothing runnable, current keeps running
        }
    };

    let prev = *CURRENT.lock();
    if prev == Some(next) {
        return; // step 3: no switch needed
    }

    let next_sp = super::with_thread_mut(next.0, next.1, |t| {
        t.state = ProcessState::Running;
        t.saved_sp
    });
    let next_sp = match next_sp {
        Some(sp) => sp,
        None => return, // thread vanished (terminated/cleaned up) between enqueue and dispatch
    };

    let prev_sp_slot: *mut u64 = if let Some((ppid, ptid)) = prev {
        // step 4: demote outgoing thread and re-enqueue at the tail of its own class
        let class = super::with_thread_mut(ppid, ptid, |t| {
            t.state = ProcessState::Ready;
            t.entity.class
        });
        match class {
            Some(class) => {
                READY.lock().enqueue(class, (ppid, ptid));
                // Safe to take after the lock above is released: nothing else
                // touches a ready (not running) thread's saved_sp concurrently
                // on this single-CPU core.
                super::thread_sp_ptr(ppid, ptid).unwrap_or(core::ptr::null_mut())
            }
            None => core::ptr::null_mut(),
        }
    } else {
        core::ptr::null_mut()
    };

    *CURRENT.lock() = Some(next);

    // step 6: context_switch saves callee-saved regs + sp for `prev`, loads
    // them for `next`, and returns into whatever `next`'s stack points at.
    if prev_sp_slot.is_null() {
        // Nothing to save into (boot path, or outgoing thread already gone):
        // fabricate a scratch slot so we can still switch into `next`.
        let mut scratch: u64 = 0;
        unsafe { crate::arch::context_switch(&mut scratch as *mut u64, next_sp) };
    } else {
        unsafe { crate::arch::context_switch(prev_sp_slot, next_sp) };
    }
}

/// Timer IRQ tail (4.4 "Tick"): decrement the running thread's quantum; on
/// zero, reload it and call `schedule()`.
pub fn timer_tick() {
    let expired = match *CURRENT.lock() {
        Some((pid, tid)) => super::with_thread_mut(pid, tid, |t| {
            if t.entity.quantum_remaining > 0 {
                t.entity.quantum_remaining -= 1;
            }
            if t.entity.quantum_remaining == 0 {
                t.entity.quantum_remaining = super::task::default_quantum(t.entity.class);
                true
            } else {
                false
            }
        })
        .unwrap_or(false),
        None => false,
    };
    if expired {
        schedule();
    }
}

/// Voluntary yield: current thread keeps its quantum but gives up the CPU now.
pub fn yield_now() {
    schedule();
}

/// Block the current thread (suspension point, spec 5) and reschedule.
pub fn block_current() {
    if let Some((pid, tid)) = *CURRENT.lock() {
        super::with_thread_mut(pid, tid, |t| t.state = ProcessState::Blocked);
    }
    schedule();
}

/// Wake every blocked thread of a process, enqueuing at the tail of its class.
pub fn wake_process(pid: Pid) {
    super::with_process_mut(pid, |proc| {
        for t in proc.threads.iter_mut() {
            if t.state == ProcessState::Blocked {
                t.state = ProcessState::Ready;
                READY.lock().enqueue(t.entity.class, (pid, t.tid));
            }
        }
    });
}

/// Wake a single thread.
pub fn wake_thread(pid: Pid, tid: Tid) {
    let class = super::with_thread_mut(pid, tid, |t| {
        t.state = ProcessState::Ready;
        t.entity.class
    });
    if let Some(class) = class {
        READY.lock().enqueue(class, (pid, tid));
    }
}

/// Drop a terminated thread from the ready queue without rescheduling.
pub fn forget(pid: Pid, tid: Tid) {
    READY.lock().remove((pid, tid));
    let mut cur = CURRENT.lock();
    if *cur == Some((pid, tid)) {
        *cur = None;
    }
}

/// `gaming_input_boost` primitive (4.5): promote to head of class immediately.
pub fn promote_to_head(pid: Pid, tid: Tid, class: PriorityClass) {
    READY.lock().promote_to_head(class, (pid, tid));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_queue_serves_highest_class_first() {
        let mut rq = ReadyQueues::new();
        rq.enqueue(PriorityClass::Normal, (1, 0));
        rq.enqueue(PriorityClass::Realtime, (2, 0));
        assert_eq!(rq.pop_highest(), Some((2, 0)));
        assert_eq!(rq.pop_highest(), Some((1, 0)));
        assert_eq!(rq.pop_highest(), None);
    }

    #[test]
    fn promote_to_head_moves_entity_to_front() {
        let mut rq = ReadyQueues::new();
        rq.enqueue(PriorityClass::Realtime, (1, 0));
        rq.enqueue(PriorityClass::Realtime, (2, 0));
        rq.enqueue(PriorityClass::Realtime, (3, 0));
        rq.promote_to_head(PriorityClass::Realtime, (3, 0));
        assert_eq!(rq.pop_highest(), Some((3, 0)));
        assert_eq!(rq.pop_highest(), Some((1, 0)));
    }
}
