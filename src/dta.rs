//! This module provides [`Dta`], the Disk Transfer Area offset tracked across
//! Int 21h calls, and [`FindData`], the 43-byte record `FindFirst` writes
//! there.

use bitflags::bitflags;

use crate::memory::{wrap, GuestMemory};

bitflags! {
    /// DOS file attribute bits, as found in a [`FindData`] record or
    /// returned by `AH=43/AL=00` (get file attributes).
    pub struct Attributes: u8 {
        /// Bit 0: the file is read-only.
        const READ_ONLY    = 1 << 0;
        /// Bit 1: the file is hidden.
        const HIDDEN       = 1 << 1;
        /// Bit 2: the file is a system file.
        const SYSTEM       = 1 << 2;
        /// Bit 3: the entry is a volume label, not a file.
        const VOLUME_LABEL = 1 << 3;
        /// Bit 4: the entry is a directory.
        const DIRECTORY    = 1 << 4;
        /// Bit 5: the file has been modified since the last backup.
        const ARCHIVE      = 1 << 5;
    }
}

/// Derives the DOS attribute byte for a host file from whether it is a
/// directory and whether the owner-read permission bit is set. Every other
/// bit is always clear in this implementation (no DOS program running under
/// this kernel can mark a file hidden, system, or a volume label).
pub fn attributes_from_host(is_directory: bool, owner_readable: bool) -> Attributes {
    let mut attrs = Attributes::empty();

    if is_directory {
        attrs |= Attributes::DIRECTORY;
    }
    if !owner_readable {
        attrs |= Attributes::READ_ONLY;
    }

    attrs
}

/// The Disk Transfer Area: the `DS:DTA` offset `AH=1A` sets, consulted by
/// `AH=4E` (FindFirst). The segment used is whatever `DS` held at the time
/// `AH=1A` was issued.
#[derive(Debug, Default)]
pub struct Dta {
    offset: u16,
}

impl Dta {
    /// Creates a `Dta` with the initial offset of zero.
    pub fn new() -> Self {
        Self { offset: 0 }
    }

    /// Sets the DTA offset.
    pub fn set(&mut self, offset: u16) {
        self.offset = offset;
    }

    /// Returns the current DTA offset.
    pub fn offset(&self) -> u16 {
        self.offset
    }
}

/// The total size in bytes of a `FindData` record.
pub const FIND_DATA_SIZE: u32 = 43;

const OFFSET_ATTRIBUTES: u32 = 21;
// Bytes 22..26 (file time, file date) are always zero: this implementation
// does not emulate DOS timestamps, per the Non-goals.
const OFFSET_FILE_SIZE: u32 = 26;
const OFFSET_FILE_NAME: u32 = 30;
const FILE_NAME_FIELD_LEN: usize = 13;

/// The 43-byte record `FindFirst` writes to `DS:DTA`.
pub struct FindData {
    attributes: Attributes,
    file_size: u32,
    /// The base file name, truncated to fit the 13-byte (12 chars + NUL)
    /// field.
    file_name: Vec<u8>,
}

impl FindData {
    /// Builds a `FindData` record. `file_name` is truncated to 12 bytes; the
    /// 13th byte of the field is always the NUL terminator.
    pub fn new(attributes: Attributes, file_size: u32, file_name: &[u8]) -> Self {
        let mut name = file_name.to_vec();
        name.truncate(FILE_NAME_FIELD_LEN - 1);

        Self {
            attributes,
            file_size,
            file_name: name,
        }
    }

    /// Writes the record to guest memory at the given linear address. Writes
    /// exactly [`FIND_DATA_SIZE`] bytes; every byte outside of the
    /// attribute/size/name fields is zero (the 21-byte reserved header, the
    /// file time, and the file date — this implementation does not emulate
    /// DOS timestamps). Wraps at the 1 MiB boundary (A20-off) rather than
    /// indexing past it.
    pub fn write<M: GuestMemory + ?Sized>(&self, memory: &mut M, addr: u32) {
        for i in 0..FIND_DATA_SIZE {
            memory.write8(wrap(addr + i), 0);
        }

        memory.write8(wrap(addr + OFFSET_ATTRIBUTES), self.attributes.bits());

        for (i, byte) in self.file_size.to_le_bytes().iter().enumerate() {
            memory.write8(wrap(addr + OFFSET_FILE_SIZE + i as u32), *byte);
        }

        for (i, &byte) in self.file_name.iter().enumerate() {
            memory.write8(wrap(addr + OFFSET_FILE_NAME + i as u32), byte);
        }
    }
}
