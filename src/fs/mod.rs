/// Filesystem Layer - Phase F
///
/// Provides journaling filesystem support with ext4 and JBD2, plus the
/// unjournaled FAT32 exemplar backend.

pub mod jbd2;
pub mod ext4;
pub mod fat32;

pub use jbd2::{Journal, TransactionHandle, JBD2_MAGIC_NUMBER};
pub use ext4::{Ext4FileSystem, Ext4Superblock, Ext4Stats, get_stats};
pub use fat32::{Fat32FileSystem, BiosParameterBlock, Fat32DirEntry, BOOT_SIGNATURE};
