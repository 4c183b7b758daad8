//! System call dispatch.
//!
//! Entry vector is the legacy software interrupt `int 0x80`. Arguments are
//! passed in RAX (syscall number), RBX, RCX, RDX; the return value goes back
//! in RAX as a non-negative result or a negated `Errno`.
//!
//! | # | name         | RBX            | RCX         | RDX   |
//! |---|--------------|----------------|-------------|-------|
//! | 0 | exit         | exit code      | -           | -     |
//! | 1 | getpid       | -              | -           | -     |
//! | 2 | write console| buf ptr        | len         | -     |
//! | 3 | open         | path ptr       | path len    | flags |
//! | 4 | close        | fd             | -           | -     |
//! | 5 | read         | fd             | buf ptr     | len   |
//! | 6 | write file   | fd             | buf ptr     | len   |
//! | 7 | create       | path ptr       | path len    | mode  |
//! | 8 | readdir      | fd             | entries ptr | max   |
//! | 9 | read-key     | -              | -           | -     |

pub mod uaccess;

use crate::lib::error::{Errno, Result};
use crate::vfs::OpenFlags;
use alloc::string::String;

/// Dispatch one `int 0x80` trap. `args` holds RBX, RCX, RDX in that order.
pub fn syscall_dispatcher(nr: usize, args: &[u64; 3]) -> isize {
    let result = match nr {
        0 => sys_exit(args[0] as i32),
        1 => sys_getpid(),
        2 => sys_write_console(args[0] as *const u8, args[1] as usize),
        3 => sys_open(args[0] as *const u8, args[1] as usize, args[2] as u32),
        4 => sys_close(args[0] as i32),
        5 => sys_read(args[0] as i32, args[1] as *mut u8, args[2] as usize),
        6 => sys_write_file(args[0] as i32, args[1] as *const u8, args[2] as usize),
        7 => sys_create(args[0] as *const u8, args[1] as usize, args[2] as u32),
        8 => sys_readdir(args[0] as i32, args[1] as *mut u8, args[2] as usize),
        9 => sys_read_key(),
        _ => {
            crate::warn!("syscall: unknown vector {}", nr);
            Err(Errno::ENOSYS)
        }
    };

    match result {
        Ok(ret) => ret,
        Err(e) => e.as_isize(),
    }
}

/// Copy a length-prefixed, userspace-owned byte string into a kernel `String`.
unsafe fn copy_path(ptr: *const u8, len: usize) -> Result<String> {
    if ptr.is_null() {
        return Err(Errno::EFAULT);
    }
    if len == 0 || len > 4096 {
        return Err(Errno::EINVAL);
    }
    let bytes = core::slice::from_raw_parts(ptr, len);
    core::str::from_utf8(bytes)
        .map(alloc::string::ToString::to_string)
        .map_err(|_| Errno::EINVAL)
}

/// 0: exit — terminate the calling process and never return.
pub fn sys_exit(code: i32) -> Result<isize> {
    let pid = crate::process::current_pid();
    crate::info!("process {} exit with code {}", pid, code);
    crate::process::do_exit(pid, code);
}

/// 1: getpid.
pub fn sys_getpid() -> Result<isize> {
    Ok(crate::process::current_pid() as isize)
}

/// 2: write console — always fd-less, goes straight to the console sink.
pub fn sys_write_console(buf: *const u8, len: usize) -> Result<isize> {
    if buf.is_null() {
        return Err(Errno::EFAULT);
    }
    if len == 0 {
        return Ok(0);
    }
    let data = unsafe { core::slice::from_raw_parts(buf, len) };
    crate::console::put_str(data);
    Ok(len as isize)
}

/// 3: open — resolve an existing path to a new file descriptor.
pub fn sys_open(path_ptr: *const u8, path_len: usize, flags: u32) -> Result<isize> {
    let path = unsafe { copy_path(path_ptr, path_len)? };
    let open_flags = OpenFlags::from_bits_truncate(flags);
    let file = crate::vfs::open(&path, open_flags)?;

    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;
    let fd = task.files.alloc_fd(file)?;

    crate::debug!("sys_open({}) -> fd {}", path, fd);
    Ok(fd as isize)
}

/// 4: close.
pub fn sys_close(fd: i32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;
    task.files.close(fd)?;
    Ok(0)
}

/// 5: read — read from an open file descriptor.
pub fn sys_read(fd: i32, buf: *mut u8, count: usize) -> Result<isize> {
    if buf.is_null() {
        return Err(Errno::EFAULT);
    }
    if count == 0 {
        return Ok(0);
    }

    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    let file = task.files.get(fd)?;

    let data = unsafe { core::slice::from_raw_parts_mut(buf, count) };
    let n = file.read(data)?;
    Ok(n as isize)
}

/// 6: write file — write to an open file descriptor.
pub fn sys_write_file(fd: i32, buf: *const u8, count: usize) -> Result<isize> {
    if buf.is_null() {
        return Err(Errno::EFAULT);
    }
    if count == 0 {
        return Ok(0);
    }

    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    let file = task.files.get(fd)?;

    let data = unsafe { core::slice::from_raw_parts(buf, count) };
    let n = file.write(data)?;
    Ok(n as isize)
}

/// 7: create — create a new regular file and open it, returning the new fd.
pub fn sys_create(path_ptr: *const u8, path_len: usize, mode: u32) -> Result<isize> {
    let path = unsafe { copy_path(path_ptr, path_len)? };
    let inode = crate::vfs::create(&path, mode)?;
    let file = alloc::sync::Arc::new(crate::vfs::File::new(inode, OpenFlags::O_RDWR));

    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;
    let fd = task.files.alloc_fd(file)?;

    crate::debug!("sys_create({}) -> fd {}", path, fd);
    Ok(fd as isize)
}

/// 8: readdir — fill a caller buffer with `(ino: u64, itype: u8, name[60])`
/// fixed-size records, one per directory entry, up to `max` entries.
pub fn sys_readdir(fd: i32, entries: *mut u8, max: usize) -> Result<isize> {
    if entries.is_null() {
        return Err(Errno::EFAULT);
    }

    const RECORD_SIZE: usize = 8 + 1 + 60;

    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    let file = task.files.get(fd)?;

    if !file.inode.is_dir() {
        return Err(Errno::ENOTDIR);
    }

    let dir_entries = file.inode.readdir()?;
    let mut count = 0usize;

    for entry in dir_entries.iter().take(max) {
        let name_bytes = entry.name.as_bytes();
        let name_len = name_bytes.len().min(59);

        unsafe {
            let record = entries.add(count * RECORD_SIZE);
            *(record as *mut u64) = entry.ino;
            *record.add(8) = match entry.itype {
                crate::vfs::InodeType::Regular => 1,
                crate::vfs::InodeType::Directory => 2,
                crate::vfs::InodeType::CharDevice => 3,
                crate::vfs::InodeType::Symlink => 4,
            };
            let name_dst = core::slice::from_raw_parts_mut(record.add(9), 60);
            name_dst.fill(0);
            name_dst[..name_len].copy_from_slice(&name_bytes[..name_len]);
        }
        count += 1;
    }

    Ok(count as isize)
}

/// 9: read-key — poll the console's scancode-derived key ring.
pub fn sys_read_key() -> Result<isize> {
    match crate::console::try_read_key() {
        Some(k) => Ok(k as isize),
        None => Ok(-1),
    }
}
