/// Security subsystem (Phase D)
///
/// Provides credentials, permissions, and access control

pub mod cred;
pub mod perm;
pub mod random;

pub use cred::{Credentials, init_credentials, current_cred, set_current_cred};
pub use perm::{Permission, inode_permission, check_permission};
pub use random::{fill_random_bytes, random_u64, random_u32, random_range};

/// Bring up the security subsystem's entropy source. Call once after the
/// heap is available and before any capability or IPC encryption key is
/// derived (spec 9: no hidden lazy initialization).
pub fn init() {
    random::init();
}
