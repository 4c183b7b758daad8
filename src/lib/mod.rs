// Core library utilities for the kernel: error taxonomy, console logging,
// ring buffers, and the panic handler.

pub mod error;
pub mod printk;
pub mod ringbuf;
pub mod debug;
pub mod panic;
