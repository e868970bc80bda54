//! Host file I/O backing the Int 21h handlers in [`crate::kernel`].
//!
//! The original `DOSKernel.cpp` called `::open`/`::read`/`::write`/`::close`/
//! `::lseek`/`::stat` directly against a plain `int` file descriptor, and
//! [`crate::fd::FdTable`] stores exactly that kind of opaque host handle
//! ([`crate::fd::RawHandle`]). This module plays the same role using
//! `std::fs`/`std::io` rather than raw syscalls, converting to and from a raw
//! file descriptor only at the `FdTable` boundary so the rest of the kernel
//! never has to know the handle is, on this platform, a Unix fd.
//!
//! Only Unix hosts are supported; this mirrors the original, which only ever
//! ran atop Apple's Hypervisor.framework.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::{FromRawFd, IntoRawFd};

use crate::fd::RawHandle;

/// Access-mode argument to [`open_existing`], matching the low two bits of
/// DOS's `AH=3D` access-mode byte (`AL & 3`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    /// Open for reading only.
    ReadOnly,
    /// Open for writing only.
    WriteOnly,
    /// Open for both reading and writing.
    ReadWrite,
}

impl AccessMode {
    /// Decodes the low two bits of a DOS access-mode byte.
    pub fn from_dos(al: u8) -> Self {
        match al & 0x3 {
            0 => AccessMode::ReadOnly,
            1 => AccessMode::WriteOnly,
            _ => AccessMode::ReadWrite,
        }
    }

    fn apply(self, options: &mut OpenOptions) {
        match self {
            AccessMode::ReadOnly => {
                options.read(true);
            }
            AccessMode::WriteOnly => {
                options.write(true);
            }
            AccessMode::ReadWrite => {
                options.read(true).write(true);
            }
        }
    }
}

/// The three DOS `AH=42` seek origins, mapped explicitly to
/// [`std::io::SeekFrom`] rather than passed through as a raw host constant
/// (Design Note 5 — the DOS values happen to match common host `SEEK_*`
/// values, but that is not guaranteed).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Whence {
    /// Seek relative to the start of the file.
    Start,
    /// Seek relative to the current position.
    Current,
    /// Seek relative to the end of the file.
    End,
}

impl Whence {
    /// Decodes a DOS `AH=42` origin byte (`AL`). Any value other than
    /// `0`/`1`/`2` is treated as `Start`, matching the DOS documentation's
    /// silence on any other value.
    pub fn from_dos(al: u8) -> Self {
        match al {
            1 => Whence::Current,
            2 => Whence::End,
            _ => Whence::Start,
        }
    }

    fn to_seek_from(self, offset: i64) -> SeekFrom {
        match self {
            Whence::Start => SeekFrom::Start(offset as u64),
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        }
    }
}

/// The result of a host metadata query, reduced to the facts
/// [`crate::dta::attributes_from_host`] and `FindData` need.
pub struct Stat {
    /// Whether the path names a directory.
    pub is_directory: bool,
    /// Whether the owner-read permission bit is set.
    pub owner_readable: bool,
    /// The file size in bytes.
    pub size: u64,
}

const OWNER_READ_BIT: u32 = 0o400;

/// Wraps a `RawHandle` as a `File` for the duration of the closure, then
/// leaks the fd back out so the `FdTable` entry stays valid. `File`'s
/// `Drop` would otherwise close the descriptor out from under the table.
fn with_file<R>(handle: RawHandle, body: impl FnOnce(&mut File) -> io::Result<R>) -> io::Result<R> {
    let mut file = unsafe { File::from_raw_fd(handle as i32) };
    let result = body(&mut file);
    file.into_raw_fd();
    result
}

/// Opens (creating/truncating if necessary) the file at `path` for
/// read/write access, used by `AH=3C` (create/truncate).
pub fn create_truncate(path: &[u8]) -> io::Result<RawHandle> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o777)
        .open(path_str(path)?)?;

    Ok(file.into_raw_fd() as RawHandle)
}

/// Opens the existing file at `path` with the given access mode, used by
/// `AH=3D` (open existing).
pub fn open_existing(path: &[u8], mode: AccessMode) -> io::Result<RawHandle> {
    let mut options = OpenOptions::new();
    mode.apply(&mut options);
    let file = options.open(path_str(path)?)?;

    Ok(file.into_raw_fd() as RawHandle)
}

/// Closes a host handle.
pub fn close(handle: RawHandle) -> io::Result<()> {
    drop(unsafe { File::from_raw_fd(handle as i32) });
    Ok(())
}

/// Reads up to `buf.len()` bytes from `handle` into `buf`, returning the
/// number of bytes actually read.
pub fn read(handle: RawHandle, buf: &mut [u8]) -> io::Result<usize> {
    with_file(handle, |file| file.read(buf))
}

/// Writes all of `buf` to `handle`, returning the number of bytes actually
/// written.
pub fn write(handle: RawHandle, buf: &[u8]) -> io::Result<usize> {
    with_file(handle, |file| file.write(buf))
}

/// Flushes any host-side buffering on `handle`.
pub fn flush(handle: RawHandle) -> io::Result<()> {
    with_file(handle, |file| file.flush())
}

/// Repositions the file offset of `handle` and returns the resulting
/// absolute offset.
pub fn lseek(handle: RawHandle, offset: i64, whence: Whence) -> io::Result<u64> {
    with_file(handle, |file| file.seek(whence.to_seek_from(offset)))
}

/// Stats the file at `path`.
pub fn stat(path: &[u8]) -> io::Result<Stat> {
    let metadata = fs::metadata(path_str(path)?)?;

    Ok(Stat {
        is_directory: metadata.is_dir(),
        owner_readable: (metadata.mode() & OWNER_READ_BIT) != 0,
        size: metadata.len(),
    })
}

/// Deletes the file at `path`, used by `AH=41` (unlink).
pub fn remove_file(path: &[u8]) -> io::Result<()> {
    fs::remove_file(path_str(path)?)
}

fn path_str(path: &[u8]) -> io::Result<&std::path::Path> {
    std::str::from_utf8(path)
        .map(std::path::Path::new)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 path"))
}
