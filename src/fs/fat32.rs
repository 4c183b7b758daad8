/// FAT32 filesystem backend (spec 4.7 exemplar backend) - Phase F
///
/// FAT32 has no journal; it is the "simple, pluggable backend" exemplar the
/// VFS layer's vtable is measured against, the way `ext4`/`jbd2` are the
/// journaled exemplar. Directory traversal walks 32-byte 8.3 entries,
/// skipping deleted (0xE5) markers and stopping at the first free (0x00)
/// entry, per spec 4.7 / 6 / testable property S6/S8.

use crate::lib::error::{Errno, Result};
use crate::block::BlockDevice;
use alloc::sync::Arc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

/// Boot sector signature required at byte offset 510 (spec 6, S8).
pub const BOOT_SIGNATURE: u16 = 0xAA55;

const DELETED_ENTRY_MARKER: u8 = 0xE5;
const FREE_ENTRY_MARKER: u8 = 0x00;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LONG_NAME: u8 = 0x0F; // combination of read-only/hidden/system/volume-id

/// BIOS Parameter Block fields this driver needs, parsed out of the 512-byte
/// boot sector (spec 6: "standard boot sector ... including fat_size_32,
/// root_cluster, signature 0xAA55 at offset 510").
#[derive(Debug, Clone, Copy)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub total_sectors_32: u32,
    pub fat_size_32: u32,
    pub root_cluster: u32,
}

impl BiosParameterBlock {
    /// Parse from a 512-byte boot sector buffer. Returns `InvalidArgument`
    /// if the buffer is short, `NotSupported` if the 0xAA55 signature is
    /// missing (spec: "mount on an unsignatured volume fails").
    pub fn parse(sector: &[u8]) -> Result<Self> {
        if sector.len() < 512 {
            return Err(Errno::EINVAL);
        }
        let sig = u16::from_le_bytes([sector[510], sector[511]]);
        if sig != BOOT_SIGNATURE {
            return Err(Errno::ENOTSUP);
        }

        let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
        let sectors_per_cluster = sector[13];
        let reserved_sector_count = u16::from_le_bytes([sector[14], sector[15]]);
        let num_fats = sector[16];
        let total_sectors_32 = u32::from_le_bytes([sector[32], sector[33], sector[34], sector[35]]);
        let fat_size_32 = u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]);
        let root_cluster = u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]);

        if bytes_per_sector == 0 || sectors_per_cluster == 0 {
            return Err(Errno::EINVAL);
        }

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count,
            num_fats,
            total_sectors_32,
            fat_size_32,
            root_cluster,
        })
    }
}

/// A single parsed 8.3 directory entry, pre-filtered for deleted/free/
/// long-name/volume-id markers (spec 4.7: "traverse directory sectors
/// iterating 32-byte entries, skipping deleted (0xE5) and stopping at
/// 0x00").
#[derive(Debug, Clone)]
pub struct Fat32DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub first_cluster: u32,
    pub size: u32,
}

fn format_short_name(raw: &[u8; 11]) -> String {
    let base = core::str::from_utf8(&raw[0..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&raw[8..11]).unwrap_or("").trim_end();
    if ext.is_empty() {
        String::from(base)
    } else {
        let mut s = String::from(base);
        s.push('.');
        s.push_str(ext);
        s
    }
}

/// Mounted FAT32 filesystem state.
pub struct Fat32FileSystem {
    pub device: Arc<BlockDevice>,
    pub bpb: BiosParameterBlock,
    /// First sector of the FAT table.
    pub fat_start_sector: u64,
    /// First sector of cluster 2 (the first data cluster).
    pub cluster_start_sector: u64,
    is_mounted: Mutex<bool>,
}

impl Fat32FileSystem {
    /// Mount a FAT32 volume: read and validate the boot sector, then cache
    /// the derived sector offsets used by every later cluster lookup (spec
    /// 4.7 exemplar backend).
    pub fn mount(device: Arc<BlockDevice>) -> Result<Arc<Self>> {
        let mut boot_sector = vec![0u8; 512];
        device.read_sectors(0, &mut boot_sector)?;

        let bpb = BiosParameterBlock::parse(&boot_sector)?;

        let fat_start_sector = bpb.reserved_sector_count as u64;
        let fat_region_sectors = bpb.fat_size_32 as u64 * bpb.num_fats as u64;
        let cluster_start_sector = fat_start_sector + fat_region_sectors;

        crate::info!(
            "fat32: mounted (bytes_per_sector={}, sectors_per_cluster={}, root_cluster={})",
            bpb.bytes_per_sector, bpb.sectors_per_cluster, bpb.root_cluster
        );

        Ok(Arc::new(Self {
            device,
            bpb,
            fat_start_sector,
            cluster_start_sector,
            is_mounted: Mutex::new(true),
        }))
    }

    pub fn unmount(&self) -> Result<()> {
        let mut mounted = self.is_mounted.lock();
        if !*mounted {
            return Err(Errno::EINVAL);
        }
        *mounted = false;
        Ok(())
    }

    /// `cluster_to_sector(c) = cluster_start + (c-2) * sectors_per_cluster`
    /// (spec 4.7). Clusters 0 and 1 are reserved/unused by the format.
    pub fn cluster_to_sector(&self, cluster: u32) -> u64 {
        self.cluster_start_sector + (cluster as u64 - 2) * self.bpb.sectors_per_cluster as u64
    }

    fn sectors_per_cluster_bytes(&self) -> usize {
        self.bpb.sectors_per_cluster as usize * self.bpb.bytes_per_sector as usize
    }

    /// Read one cluster's worth of raw bytes (spec 4.7 backend vtable: read
    /// inode / readdir both bottom out here for a directory's first
    /// cluster; this core does not chase the FAT chain across multiple
    /// clusters for a single directory, matching the scope of the exemplar).
    fn read_cluster(&self, cluster: u32) -> Result<Vec<u8>> {
        let sector = self.cluster_to_sector(cluster);
        let mut buf = vec![0u8; self.sectors_per_cluster_bytes()];
        self.device.read_sectors(sector, &mut buf)?;
        Ok(buf)
    }

    /// `readdir(dir, entries, max)` (spec 4.7): deliver name/type/size
    /// triples for the directory starting at `cluster`, skipping deleted
    /// (0xE5) entries, long-name and volume-ID entries, and stopping at the
    /// first free (0x00) entry.
    pub fn readdir(&self, cluster: u32) -> Result<Vec<Fat32DirEntry>> {
        let data = self.read_cluster(cluster)?;
        let mut out = Vec::new();

        for chunk in data.chunks_exact(32) {
            let first_byte = chunk[0];
            if first_byte == FREE_ENTRY_MARKER {
                break;
            }
            if first_byte == DELETED_ENTRY_MARKER {
                continue;
            }

            let attr = chunk[11];
            if attr == ATTR_LONG_NAME || (attr & ATTR_VOLUME_ID) != 0 {
                continue;
            }

            let mut raw_name = [0u8; 11];
            raw_name.copy_from_slice(&chunk[0..11]);
            let name = format_short_name(&raw_name);

            let cluster_high = u16::from_le_bytes([chunk[20], chunk[21]]) as u32;
            let cluster_low = u16::from_le_bytes([chunk[26], chunk[27]]) as u32;
            let first_cluster = (cluster_high << 16) | cluster_low;
            let size = u32::from_le_bytes([chunk[28], chunk[29], chunk[30], chunk[31]]);

            out.push(Fat32DirEntry {
                name,
                is_directory: attr & ATTR_DIRECTORY != 0,
                first_cluster,
                size,
            });
        }

        Ok(out)
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb.root_cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockDevice, BlockDeviceOps};
    use alloc::boxed::Box;
    use alloc::string::ToString;
    use spin::Mutex as StdMutex;

    /// In-memory block device backing a fabricated FAT32 image, for the
    /// S6/S8 scenarios without real hardware.
    struct RamDisk {
        data: StdMutex<Vec<u8>>,
    }

    impl BlockDeviceOps for RamDisk {
        fn read_sectors(&self, _dev: &BlockDevice, sector: u64, buf: &mut [u8]) -> Result<()> {
            let data = self.data.lock();
            let offset = sector as usize * 512;
            if offset + buf.len() > data.len() {
                return Err(Errno::EIO);
            }
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
            Ok(())
        }

        fn write_sectors(&self, _dev: &BlockDevice, sector: u64, buf: &[u8]) -> Result<()> {
            let mut data = self.data.lock();
            let offset = sector as usize * 512;
            if offset + buf.len() > data.len() {
                return Err(Errno::EIO);
            }
            data[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        }

        fn flush(&self, _dev: &BlockDevice) -> Result<()> {
            Ok(())
        }
    }

    fn write_short_name(buf: &mut [u8], name: &str, ext: &str) {
        for (i, b) in buf.iter_mut().enumerate().take(8) {
            *b = if i < name.len() { name.as_bytes()[i] } else { b' ' };
        }
        for (i, b) in buf.iter_mut().skip(8).enumerate().take(3) {
            *b = if i < ext.len() { ext.as_bytes()[i] } else { b' ' };
        }
    }

    fn build_image() -> Vec<u8> {
        const SECTORS_PER_CLUSTER: u8 = 1;
        const RESERVED_SECTORS: u16 = 2;
        const NUM_FATS: u8 = 1;
        const FAT_SIZE: u32 = 1;
        const TOTAL_SECTORS: u64 = 16;

        let mut image = vec![0u8; (TOTAL_SECTORS * 512) as usize];

        image[11..13].copy_from_slice(&512u16.to_le_bytes());
        image[13] = SECTORS_PER_CLUSTER;
        image[14..16].copy_from_slice(&RESERVED_SECTORS.to_le_bytes());
        image[16] = NUM_FATS;
        image[32..36].copy_from_slice(&(TOTAL_SECTORS as u32).to_le_bytes());
        image[36..40].copy_from_slice(&FAT_SIZE.to_le_bytes());
        image[44..48].copy_from_slice(&2u32.to_le_bytes()); // root_cluster = 2
        image[510..512].copy_from_slice(&BOOT_SIGNATURE.to_le_bytes());

        // Root directory cluster begins right after reserved + FAT sectors.
        let cluster_start_sector = RESERVED_SECTORS as u64 + FAT_SIZE as u64 * NUM_FATS as u64;
        let dir_offset = (cluster_start_sector * 512) as usize;

        // Entry 0: "README.TXT" regular file.
        let mut e = [0u8; 32];
        write_short_name(&mut e, "README", "TXT");
        e[11] = 0; // attributes: regular file
        image[dir_offset..dir_offset + 32].copy_from_slice(&e);

        // Entry 1: "SYSTEM" directory.
        let mut e = [0u8; 32];
        write_short_name(&mut e, "SYSTEM", "");
        e[11] = ATTR_DIRECTORY;
        image[dir_offset + 32..dir_offset + 64].copy_from_slice(&e);

        // Entry 2: deleted entry ("DELETED\xE5ENTRY" per the scenario,
        // first byte overwritten with 0xE5 to mark deletion).
        let mut e = [0u8; 32];
        write_short_name(&mut e, "DELETED", "TXT");
        e[0] = DELETED_ENTRY_MARKER;
        image[dir_offset + 64..dir_offset + 96].copy_from_slice(&e);

        // Entry 3: free marker terminates the directory.
        // (left as zeroed bytes already)

        image
    }

    fn mounted() -> Arc<Fat32FileSystem> {
        let image = build_image();
        let device = Arc::new(BlockDevice::new(
            "ram0".to_string(),
            1,
            0,
            image.len() as u64 / 512,
            Box::leak(Box::new(RamDisk { data: StdMutex::new(image) })),
        ));
        Fat32FileSystem::mount(device).expect("mount should succeed on a signed image")
    }

    #[test]
    fn mount_rejects_missing_signature() {
        let mut image = build_image();
        image[510] = 0;
        image[511] = 0;
        let device = Arc::new(BlockDevice::new(
            "ram0".to_string(),
            1,
            0,
            image.len() as u64 / 512,
            Box::leak(Box::new(RamDisk { data: StdMutex::new(image) })),
        ));
        assert!(Fat32FileSystem::mount(device).is_err());
    }

    #[test]
    fn cluster_to_sector_matches_formula() {
        let fs = mounted();
        let expected = fs.cluster_start_sector + (5 - 2) * fs.bpb.sectors_per_cluster as u64;
        assert_eq!(fs.cluster_to_sector(5), expected);
    }

    #[test]
    fn readdir_skips_deleted_and_stops_at_free_entry() {
        let fs = mounted();
        let entries = fs.readdir(fs.root_cluster()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "README.TXT");
        assert!(!entries[0].is_directory);
        assert_eq!(entries[1].name, "SYSTEM");
        assert!(entries[1].is_directory);
    }
}
