/// Memory management subsystem
///
/// Phase A1 implementation including:
/// - Buddy page allocator
/// - Page table management and PTE flags
/// - Virtual memory areas (VMAs)
/// - Page fault handling with COW support
/// - brk/mmap/munmap syscalls

pub mod page;
pub mod pmm;
pub mod buddy;
pub mod paging;
pub mod address_space;
pub mod fault;
pub mod slab;
pub mod page_cache;
pub mod aslr;

// Re-export commonly used items
pub use page::{
    PhysAddr, Pfn, Page, PageFlags,
    pa_to_pfn, pfn_to_pa,
    page_align_down, page_align_up,
};

pub use buddy::{
    init_buddy, alloc_page, alloc_pages,
    free_page, free_pages, get_stats,
    MAX_ORDER, AllocStats,
};

pub use paging::{
    PAGE_SIZE, PAGE_SHIFT, KERNEL_BASE,
    PteFlags, Pte, PageTable,
    map_page, unmap_page,
    flush_tlb, flush_tlb_all,
};

pub use address_space::{
    USER_STACK_TOP, USER_STACK_SIZE,
    USER_HEAP_START, USER_MMAP_BASE,
};

pub use fault::{FaultInfo, decode_error_code};

pub use pmm::{
    init_from_memory_map, alloc_frame, free_frame,
    MemoryMapEntry, FrameStats, REGION_AVAILABLE,
};
pub use pmm::stats as pmm_stats;

pub use aslr::{is_aslr_enabled, randomize_address_space};

/// Allocate and zero a fresh top-level page table for a new address space.
///
/// Backed directly by the frame allocator (C1): one frame, identity-sized
/// for a `PageTable`, zeroed so every entry starts invalid.
pub fn alloc_user_page_table() -> Result<u64, crate::lib::error::KernelError> {
    pmm::alloc_frame().ok_or(crate::lib::error::KernelError::OutOfMemory)
}
