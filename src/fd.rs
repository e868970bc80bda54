//! This module provides [`FdTable`], the mapping from DOS file handles to
//! opaque host handles.
//!
//! `FdTable` mirrors the `std::map<int, int> _fdtable` / `std::vector<bool>
//! _fdbits` pair from the original `DOSKernel`, collapsed into a single
//! `Vec<Option<RawHandle>>` since both structures always moved in lockstep
//! there.

use crate::error::Error;

/// The DOS standard input handle.
pub const STDIN: u16 = 0;
/// The DOS standard output handle.
pub const STDOUT: u16 = 1;
/// The DOS standard error handle.
pub const STDERR: u16 = 2;

/// The number of DOS handles, `[0, 256)`.
const NUM_HANDLES: usize = 256;

/// A host-side handle opaque to this crate. In practice this is a raw file
/// descriptor (Unix) or handle (Windows); the crate never interprets the
/// value itself, it only threads it through to the host's file I/O calls.
pub type RawHandle = i64;

/// Maps DOS handles `[0, 256)` to host handles.
///
/// Handles 0, 1, and 2 are always present, mapped to the host's
/// stdin/stdout/stderr, and can never be deallocated. Allocation returns the
/// lowest unused handle; when all 256 slots are in use, allocation fails.
pub struct FdTable {
    slots: Vec<Option<RawHandle>>,
}

impl FdTable {
    /// Creates a new table with handles 0/1/2 pre-populated with the given
    /// host stdin/stdout/stderr handles.
    pub fn new(stdin: RawHandle, stdout: RawHandle, stderr: RawHandle) -> Self {
        let mut slots = vec![None; NUM_HANDLES];
        slots[STDIN as usize] = Some(stdin);
        slots[STDOUT as usize] = Some(stdout);
        slots[STDERR as usize] = Some(stderr);

        Self { slots }
    }

    /// Allocates the lowest unused DOS handle and maps it to `host_handle`.
    /// Fails with [`Error::NoFreeHandle`] if all 256 slots are in use.
    pub fn alloc(&mut self, host_handle: RawHandle) -> Result<u16, Error> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(Error::NoFreeHandle)?;

        self.slots[index] = Some(host_handle);

        Ok(index as u16)
    }

    /// Deallocates a DOS handle. A no-op for handles below 3, since the
    /// standard handles are never released.
    pub fn dealloc(&mut self, dos_handle: u16) {
        if dos_handle < 3 {
            return;
        }

        if let Some(slot) = self.slots.get_mut(dos_handle as usize) {
            *slot = None;
        }
    }

    /// Looks up the host handle mapped to `dos_handle`, or `None` if the
    /// handle is unmapped or out of range.
    pub fn lookup(&self, dos_handle: u16) -> Option<RawHandle> {
        self.slots.get(dos_handle as usize).copied().flatten()
    }
}
