/// Device drivers
///
/// Per the driver model, hardware is touched only through the trait
/// abstractions in `traits` (`BlockDevice`, `NetworkDevice`, `CharDevice`,
/// ...); concrete hardware drivers (NVMe, E1000, USB, ...) are out of scope
/// for this core and are mocked via `mock` for testing.

pub mod timeout;   // Timeout utilities for hardware operations
pub mod error;     // Common driver error types
pub mod traits;    // Device trait abstractions
#[cfg(feature = "mock-devices")]
pub mod mock;

// Re-export common types for convenience
pub use error::{DriverError, DriverResult, Validator};
pub use timeout::{Timeout, TimeoutError};
