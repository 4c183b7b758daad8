//! Architecture abstraction layer.
//!
//! This kernel targets x86_64 only; the submodule is kept separate from this
//! file so a second architecture could be dropped in beside it later, the
//! way the x86_64 module's own doc comment describes the SMP/ACPI milestones
//! growing in over time.

pub mod x86_64;

pub use x86_64::{arch_early_init, context_switch, halt, halt_loop};
pub use x86_64::trapframe::ExceptionFrame;
