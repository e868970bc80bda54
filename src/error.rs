//! This module provides an `Error` type for the crate using the [`thiserror`] crate.

use thiserror::Error;

/// The `Error` type for the fallible parts of this crate's own Rust API.
///
/// Int 21h handlers never propagate this type to their caller: a handler
/// catches every failure at its own boundary and converts it into the
/// guest-visible carry-flag/`AX` convention (see [`crate::errno`]). `Error`
/// only surfaces from [`crate::fd::FdTable::alloc`], which a handler calls
/// and maps to that convention itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The FD table has no free handle to allocate (all 256 slots in use).
    #[error("no free DOS handle available")]
    NoFreeHandle,
}
