/// Process and thread records (spec 4.3 / data model 3).
///
/// A `Process` owns an address space, a kernel stack region, a bounded file
/// table, and a list of `Thread`s. Every thread carries a `SchedEntity`
/// (spec 3: "extension attached to each thread") that the scheduler and the
/// advanced policy overlay (4.5) read and mutate; `Process`/`Thread` never
/// touch scheduling state directly.

use crate::lib::error::KernelError;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use alloc::vec;

pub type Pid = u32;
pub type Tid = u32;

/// Process/thread lifecycle state (spec 3: "ready, running, blocked, terminated").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Base priority class the MLFQ scheduler (4.4) dispatches on.
/// Ordered highest-to-lowest; `PriorityClass::index()` is the ready-queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    Realtime,
    High,
    Normal,
    Idle,
}

impl PriorityClass {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            PriorityClass::Realtime => 0,
            PriorityClass::High => 1,
            PriorityClass::Normal => 2,
            PriorityClass::Idle => 3,
        }
    }
}

/// Advanced-overlay classification (spec 4.5) attached to a scheduler entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadClass {
    Normal,
    Gaming,
    Ai,
}

/// Gaming-specific scheduling hints, populated by `register_gaming_process`.
#[derive(Debug, Clone, Copy)]
pub struct GamingProfile {
    pub target_fps: u32,
    pub frame_deadline_us: u64,
}

/// Scheduler entity: the part of a thread the scheduler and overlay own.
#[derive(Debug, Clone)]
pub struct SchedEntity {
    pub class: PriorityClass,
    pub workload: WorkloadClass,
    pub static_priority: u8,
    pub quantum_remaining: u32,
    pub last_cpu: u32,
    pub preferred_cpu: Option<u32>,
    pub migrations: u32,
    pub gaming: Option<GamingProfile>,
}

impl SchedEntity {
    pub fn new(class: PriorityClass) -> Self {
        Self {
            class,
            workload: WorkloadClass::Normal,
            static_priority: 0,
            quantum_remaining: default_quantum(class),
            last_cpu: 0,
            preferred_cpu: None,
            migrations: 0,
            gaming: None,
        }
    }
}

/// Default time quantum per class, in scheduler ticks. Gaming profiles
/// override this with a 1ms quantum when registered (4.5).
pub fn default_quantum(class: PriorityClass) -> u32 {
    match class {
        PriorityClass::Realtime => 2,
        PriorityClass::High => 4,
        PriorityClass::Normal => 8,
        PriorityClass::Idle => 16,
    }
}

/// A schedulable thread of execution within a process.
pub struct Thread {
    pub tid: Tid,
    pub pid: Pid,
    pub state: ProcessState,
    pub entity: SchedEntity,
    /// Saved kernel stack pointer; valid only while the thread is not
    /// the one currently executing. See `arch::x86_64::switch::context_switch`.
    pub saved_sp: u64,
    /// Base of this thread's kernel stack, kept for `process_cleanup`.
    pub kstack_base: u64,
}

impl Thread {
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }
}

/// Process credentials (uid/gid); kept minimal, no setuid semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

/// Virtual Memory Area.
#[derive(Debug, Clone)]
pub struct Vma {
    pub start: u64,
    pub end: u64,
    pub flags: VmaFlags,
    pub offset: u64,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmaFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const SHARED = 1 << 3;
        const ANONYMOUS = 1 << 4;
    }
}

/// Owning address-space handle (spec 3: "owning address-space handle").
#[derive(Debug)]
pub struct MemoryManager {
    pub page_table: u64,
    pub brk: u64,
    pub brk_start: u64,
    pub stack_top: u64,
    pub mmap_base: u64,
    pub vmas: Vec<Vma>,
}

impl MemoryManager {
    pub fn new_user() -> Result<Self, KernelError> {
        let page_table = crate::mm::alloc_user_page_table()?;
        let (stack_top, heap_start, mmap_base) = if crate::mm::is_aslr_enabled() {
            crate::mm::randomize_address_space()
        } else {
            (
                crate::mm::USER_STACK_TOP,
                crate::mm::USER_HEAP_START,
                crate::mm::USER_MMAP_BASE,
            )
        };
        Ok(Self {
            page_table,
            brk: heap_start,
            brk_start: heap_start,
            stack_top,
            mmap_base,
            vmas: Vec::new(),
        })
    }
}

/// Bounded file-descriptor table (spec 4.7 file struct lives behind these slots).
pub struct FileTable {
    pub fds: Vec<Option<alloc::sync::Arc<crate::vfs::File>>>,
}

const MAX_FDS: usize = 256;

impl FileTable {
    pub fn new() -> Self {
        Self {
            fds: vec![None; MAX_FDS],
        }
    }

    pub fn alloc_fd(&mut self, file: alloc::sync::Arc<crate::vfs::File>) -> Result<i32, crate::lib::error::Errno> {
        for (i, slot) in self.fds.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(i as i32);
            }
        }
        Err(crate::lib::error::Errno::EMFILE)
    }

    pub fn get(&self, fd: i32) -> Result<alloc::sync::Arc<crate::vfs::File>, crate::lib::error::Errno> {
        if fd < 0 || fd as usize >= self.fds.len() {
            return Err(crate::lib::error::Errno::EBADF);
        }
        self.fds[fd as usize].clone().ok_or(crate::lib::error::Errno::EBADF)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), crate::lib::error::Errno> {
        if fd < 0 || fd as usize >= self.fds.len() || self.fds[fd as usize].is_none() {
            return Err(crate::lib::error::Errno::EBADF);
        }
        self.fds[fd as usize] = None;
        Ok(())
    }
}

/// A process: one address space, one file table, one or more threads.
pub struct Process {
    pub pid: Pid,
    pub ppid: Pid,
    pub priority_class: PriorityClass,
    pub mm: MemoryManager,
    pub files: FileTable,
    pub threads: Vec<Box<Thread>>,
    pub cred: Credentials,
    pub name: String,
    pub exit_code: i32,
}

/// Kernel stack size: 4 pages (16 KiB), same budget regardless of process kind.
const KSTACK_ORDER: u8 = 2;
const KSTACK_PAGES: u64 = 1 << KSTACK_ORDER;

fn alloc_kstack() -> Result<u64, KernelError> {
    crate::mm::alloc_pages(KSTACK_ORDER).ok_or(KernelError::OutOfMemory)
}

/// Prime a never-before-run kernel stack so that `context_switch` returning
/// into it lands in `entry` with interrupts enabled.
///
/// Must mirror `context_switch`'s push order exactly (see
/// `arch::x86_64::switch`): from high to low address, entry-point return
/// address, then rbp, rbx, r12, r13, r14, r15, then rflags at the lowest
/// address — `saved_sp` is that lowest address.
pub fn prime_kernel_stack(stack_top: u64, entry: extern "C" fn() -> !) -> u64 {
    unsafe {
        let mut sp = stack_top as *mut u64;
        sp = sp.sub(1);
        *sp = entry as usize as u64; // return address `ret` will pop
        sp = sp.sub(1);
        *sp = 0; // rbp
        sp = sp.sub(1);
        *sp = 0; // rbx
        sp = sp.sub(1);
        *sp = 0; // r12
        sp = sp.sub(1);
        *sp = 0; // r13
        sp = sp.sub(1);
        *sp = 0; // r14
        sp = sp.sub(1);
        *sp = 0; // r15
        sp = sp.sub(1);
        *sp = 0x202; // rflags: IF set, bit 1 reserved-1
        sp as u64
    }
}

impl Process {
    /// Create PID 0, the kernel task (spec 4.3 `process_init`).
    pub fn new_kernel_task() -> Self {
        let mm = MemoryManager {
            page_table: crate::mm::alloc_user_page_table().unwrap_or(0),
            brk: 0,
            brk_start: 0,
            stack_top: 0,
            mmap_base: 0,
            vmas: Vec::new(),
        };
        let kstack = alloc_kstack().expect("failed to allocate kernel task stack");
        let main_thread = Box::new(Thread {
            tid: 0,
            pid: 0,
            state: ProcessState::Running,
            entity: SchedEntity::new(PriorityClass::Realtime),
            saved_sp: 0, // never context-switched away from at boot
            kstack_base: kstack,
        });
        Self {
            pid: 0,
            ppid: 0,
            priority_class: PriorityClass::Realtime,
            mm,
            files: FileTable::new(),
            threads: vec![main_thread],
            cred: Credentials::default(),
            name: String::from("kernel"),
            exit_code: 0,
        }
    }

    /// Create a new process whose single thread is primed to start at
    /// `entry` (spec 4.3 `process_create`).
    pub fn new_with_entry(pid: Pid, ppid: Pid, name: String, entry: extern "C" fn() -> !) -> Result<Self, KernelError> {
        let mm = MemoryManager::new_user()?;
        let kstack = alloc_kstack()?;
        let stack_top = kstack + (KSTACK_PAGES * crate::mm::PAGE_SIZE as u64);
        let saved_sp = prime_kernel_stack(stack_top, entry);

        let main_thread = Box::new(Thread {
            tid: 0,
            pid,
            state: ProcessState::Ready,
            entity: SchedEntity::new(PriorityClass::Normal),
            saved_sp,
            kstack_base: kstack,
        });

        Ok(Self {
            pid,
            ppid,
            priority_class: PriorityClass::Normal,
            mm,
            files: FileTable::new(),
            threads: vec![main_thread],
            cred: Credentials::default(),
            name,
            exit_code: 0,
        })
    }

    /// Add a new thread to this process, primed to start at `entry`
    /// (spec 4.3 `thread_create`).
    pub fn add_thread(&mut self, tid: Tid, entry: extern "C" fn() -> !) -> Result<(), KernelError> {
        let kstack = alloc_kstack()?;
        let stack_top = kstack + (KSTACK_PAGES * crate::mm::PAGE_SIZE as u64);
        let saved_sp = prime_kernel_stack(stack_top, entry);
        let thread = Box::new(Thread {
            tid,
            pid: self.pid,
            state: ProcessState::Ready,
            entity: SchedEntity::new(self.priority_class),
            saved_sp,
            kstack_base: kstack,
        });
        self.threads.push(thread);
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.threads.iter().all(|t| t.state == ProcessState::Terminated)
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("ppid", &self.ppid)
            .field("name", &self.name)
            .field("threads", &self.threads.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_kernel_stack_lays_out_pop_order() {
        let mut stack = [0u64; 64];
        let top = stack.as_mut_ptr() as u64 + core::mem::size_of_val(&stack) as u64;
        extern "C" fn dummy_entry() -> ! {
            loop {}
        }
        let sp = prime_kernel_stack(top, dummy_entry);
        // Lowest address holds rflags, then r15..r12, rbx, rbp, then the
        // return address one slot above rbp.
        let words = unsafe { core::slice::from_raw_parts(sp as *const u64, 8) };
        assert_eq!(words[0], 0x202); // rflags
        assert_eq!(words[1], 0); // r15
        assert_eq!(words[2], 0); // r14
        assert_eq!(words[3], 0); // r13
        assert_eq!(words[4], 0); // r12
        assert_eq!(words[5], 0); // rbx
        assert_eq!(words[6], 0); // rbp
        assert_eq!(words[7], dummy_entry as usize as u64); // return address
    }
}
