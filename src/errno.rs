//! DOS error codes and the translation from host `errno` values to them.
//!
//! The original `hvdos` kernel passed the raw host `errno` straight through
//! in `AX` on a failed Int 21h call (`getDOSError` in `DOSKernel.cpp`). Real
//! DOS programs branch on the specific DOS error code, so this module
//! translates the handful of `errno` values the handlers in [`crate::kernel`]
//! actually produce into their DOS equivalents, falling back to the raw
//! errno for anything not in the table — the same fallback behavior the
//! original exhibited for every errno, now narrowed to the unmapped tail.

/// File not found.
pub const FILE_NOT_FOUND: u16 = 0x02;
/// Path not found.
pub const PATH_NOT_FOUND: u16 = 0x03;
/// Too many open files (DOS handle table, or host fd table, exhausted).
pub const TOO_MANY_OPEN_FILES: u16 = 0x04;
/// Access denied.
pub const ACCESS_DENIED: u16 = 0x05;
/// Invalid handle.
pub const INVALID_HANDLE: u16 = 0x06;
/// No more files (FindFirst/FindNext exhaustion).
pub const NO_MORE_FILES: u16 = 0x12;

/// Translates a [`std::io::Error`] into the DOS error code a guest program
/// would see in `AX` after an Int 21h call fails with `CF=1`.
///
/// On non-Unix targets, or when the error carries no raw OS error code (for
/// example a [`std::io::ErrorKind`]-only error synthesized by this crate),
/// this falls back to matching on [`std::io::ErrorKind`] for the handful of
/// kinds libstd guarantees are stable across platforms.
pub fn dos_error_from_io(error: &std::io::Error) -> u16 {
    #[cfg(unix)]
    {
        if let Some(errno) = error.raw_os_error() {
            if let Some(code) = dos_error_from_errno(errno) {
                return code;
            }
            return errno as u16;
        }
    }

    dos_error_from_kind(error.kind())
}

#[cfg(unix)]
fn dos_error_from_errno(errno: i32) -> Option<u16> {
    let code = match errno {
        libc::ENOENT => FILE_NOT_FOUND,
        libc::ENOTDIR => PATH_NOT_FOUND,
        libc::EACCES | libc::EPERM | libc::EISDIR | libc::EROFS => ACCESS_DENIED,
        libc::EMFILE | libc::ENFILE => TOO_MANY_OPEN_FILES,
        libc::EBADF => INVALID_HANDLE,
        _ => return None,
    };

    Some(code)
}

fn dos_error_from_kind(kind: std::io::ErrorKind) -> u16 {
    use std::io::ErrorKind::*;

    match kind {
        NotFound => FILE_NOT_FOUND,
        PermissionDenied => ACCESS_DENIED,
        _ => 0x1d, // DOS "general failure", used when nothing more specific is known.
    }
}
