//! `dos-kernel` implements the DOS service kernel of a minimal 16-bit DOS
//! emulator: Program Segment Prefix construction, the Int 20h/21h dispatch
//! table, the DOS-handle-to-host-handle file descriptor layer, and guest
//! memory marshalling of strings and byte-packed structures.
//!
//! This crate does not own a virtual CPU or guest memory itself. It is
//! generic over the [`VCpu`] and [`GuestMemory`] traits, which a host
//! implements against whatever hardware-virtualization facility it embeds
//! (KVM, the Windows Hypervisor Platform, Apple's Hypervisor.framework,
//! ...). The host's VM-exit run loop traps `INT 20h`/`INT 21h` and calls
//! [`Kernel::dispatch`], which mutates the guest's registers and memory and
//! returns a [`DispatchStatus`] telling the run loop how to resume.
//!
//! Host file I/O (component [`host`]) targets Unix; every production
//! hardware-virtualization facility this crate's `VCpu`/`GuestMemory` traits
//! are meant to sit behind (KVM, Hypervisor.framework) runs on one.

pub mod dta;
pub mod errno;
pub mod error;
pub mod fd;
pub mod host;
pub mod kernel;
pub mod memory;
pub mod psp;
pub mod registers;

#[cfg(test)]
pub(crate) mod testutil;

pub use dta::{Dta, FindData};
pub use error::Error;
pub use fd::FdTable;
pub use kernel::{DispatchStatus, Kernel};
pub use memory::{GuestMemory, MemoryView};
pub use registers::{Register, RegisterView, SegmentRegister, VCpu};
