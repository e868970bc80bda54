//! This module provides the Program Segment Prefix builder.
//!
//! [`build_psp`] writes a 256-byte PSP into a given segment: the `INT 20h`
//! exit stub, the `INT 21h`/`RETF` far-call stub, two empty default FCBs, and
//! the command-line tail built from the host's `argv`.

use crate::memory::{linear_address, wrap, GuestMemory, MemoryView};

/// The total size in bytes of a PSP.
pub const PSP_SIZE: u16 = 256;

const OFFSET_CPM_EXIT: u16 = 0x00;
const OFFSET_FAR_CALL: u16 = 0x50;
const OFFSET_FCB1: u16 = 0x5C;
const OFFSET_COMMAND_LINE_LENGTH: u16 = 0x80;
const OFFSET_COMMAND_LINE: u16 = 0x81;

/// The maximum number of bytes the command-line tail may occupy before the
/// terminating `0x0D`. `0x81 + 0x7E = 0xFF`, the last byte of the PSP.
const COMMAND_LINE_MAX_LEN: u16 = 0x7E;

/// Writes a 256-byte PSP at `seg:0`, with the command-line tail built from
/// `args` (the host's `argv[2..]` — `argv[0]` is the emulator itself and
/// `argv[1]` is the program image path, both already excluded by the
/// caller). Every byte of the PSP outside the fields below is left zero.
/// Every write wraps at the 1 MiB boundary (A20-off) rather than indexing
/// past it, so a segment near the top of the address space does not panic.
pub fn build_psp<M: GuestMemory + ?Sized>(memory: &mut M, seg: u16, args: &[impl AsRef<[u8]>]) {
    let base = linear_address(seg, 0);
    let mut view = MemoryView::new(memory);

    // Zero the whole 256-byte region first so every unspecified field is zero.
    for i in 0..PSP_SIZE as u32 {
        view.write8(wrap(base + i), 0);
    }

    // CPMExit: INT 20h.
    view.write8(wrap(base + OFFSET_CPM_EXIT as u32), 0xCD);
    view.write8(wrap(base + OFFSET_CPM_EXIT as u32 + 1), 0x20);

    // DOS far call: INT 21h; RETF.
    view.write8(wrap(base + OFFSET_FAR_CALL as u32), 0xCD);
    view.write8(wrap(base + OFFSET_FAR_CALL as u32 + 1), 0x21);
    view.write8(wrap(base + OFFSET_FAR_CALL as u32 + 2), 0xCB);

    // First default FCB: empty file name.
    view.write8(wrap(base + OFFSET_FCB1 as u32), 0x01);
    view.write8(wrap(base + OFFSET_FCB1 as u32 + 1), 0x20);
    // The rest of FCB1 (14 bytes) and all 20 bytes of FCB2 at 0x6C stay zero,
    // already cleared above.

    // Command-line tail: each argument prefixed with a single space,
    // truncated so the cursor never reaches COMMAND_LINE_MAX_LEN.
    let mut cursor: u16 = 0;

    for arg in args {
        if cursor == COMMAND_LINE_MAX_LEN {
            break;
        }

        view.write8(wrap(base + (OFFSET_COMMAND_LINE + cursor) as u32), b' ');
        cursor += 1;

        for &byte in arg.as_ref() {
            if cursor == COMMAND_LINE_MAX_LEN {
                break;
            }
            view.write8(wrap(base + (OFFSET_COMMAND_LINE + cursor) as u32), byte);
            cursor += 1;
        }
    }

    view.write8(wrap(base + OFFSET_COMMAND_LINE_LENGTH as u32), cursor as u8);
    view.write8(wrap(base + (OFFSET_COMMAND_LINE + cursor) as u32), 0x0D);
}
