//! This module provides [`Kernel`], the top-level Int 20h/21h dispatcher, and
//! [`DispatchStatus`], the outcome a host run loop acts on after a trap.
//!
//! `Kernel` owns the state the original `DOSKernel` class kept as instance
//! fields: the FD table, the DTA, the extended-break flag, and the exit
//! status. It holds no reference to the guest's `VCpu`/`GuestMemory` between
//! calls — both are borrowed fresh on each [`Kernel::dispatch`].

use std::io;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::dta::{attributes_from_host, Attributes, Dta, FindData};
use crate::errno;
use crate::fd::{self, FdTable};
use crate::host::{self, AccessMode, Whence};
use crate::memory::{linear_address, GuestMemory, MemoryView};
use crate::psp;
use crate::registers::{Register, RegisterView, SegmentRegister, VCpu};

/// The outcome of a single [`Kernel::dispatch`] call, telling the run loop
/// how to resume the guest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchStatus {
    /// The call was serviced; the run loop should advance `RIP` past the
    /// two-byte `INT n` instruction.
    Handled,
    /// The guest requested termination; the run loop should read the exit
    /// status and tear down the VM.
    Stop,
    /// The trapped interrupt vector is not one this kernel dispatches.
    Unhandled,
    /// The interrupt vector was recognized but the subfunction was not; a
    /// diagnostic has already been printed to host stderr.
    Unsupported,
    /// The handler already moved `RIP` itself; the run loop must not advance
    /// it again.
    NoReturn,
}

/// A DOS Int 21h subfunction selector, decoded from `AH`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
enum Function {
    WriteCharacter = 0x02,
    CharacterInputNoEcho = 0x08,
    WriteString = 0x09,
    BufferedInput = 0x0A,
    FlushAndInput = 0x0C,
    SelectDefaultDrive = 0x0E,
    GetDefaultDrive = 0x19,
    SetDta = 0x1A,
    SetInterruptVector = 0x25,
    CreatePsp = 0x26,
    GetVersion = 0x30,
    BreakChecking = 0x33,
    GetInterruptVector = 0x35,
    CreateTruncate = 0x3C,
    OpenExisting = 0x3D,
    Close = 0x3E,
    Read = 0x3F,
    Write = 0x40,
    Unlink = 0x41,
    LSeek = 0x42,
    FileAttributes = 0x43,
    Exit = 0x4C,
    FindFirst = 0x4E,
    FindNext = 0x4F,
    GetSetFileDateTime = 0x57,
}

/// The DOS service kernel for a single guest process.
///
/// Constructed once per `.COM` image; the host's run loop holds one of these
/// alongside the vCPU and guest memory it dispatches against.
pub struct Kernel {
    fds: FdTable,
    dta: Dta,
    break_flag: bool,
    exit_status: u8,
}

impl Kernel {
    /// Constructs a kernel for a new guest process: writes the initial PSP
    /// at `psp_segment:0` built from `args` and pre-populates FDs 0/1/2 with
    /// the host's stdin/stdout/stderr.
    ///
    /// `args` is the host's `argv[2..]` — the emulator binary and the
    /// `.COM` image path have already been stripped by the caller, matching
    /// `makePSP`'s assumption about its own `argv`.
    pub fn new<M: GuestMemory + ?Sized>(
        memory: &mut M,
        psp_segment: u16,
        args: &[impl AsRef<[u8]>],
    ) -> Self {
        psp::build_psp(memory, psp_segment, args);

        Self {
            fds: FdTable::new(fd::STDIN as i64, fd::STDOUT as i64, fd::STDERR as i64),
            dta: Dta::new(),
            break_flag: false,
            exit_status: 0,
        }
    }

    /// The guest's exit status, latched by `INT 21h/AH=4C` (or left `0` if
    /// the guest exited via `INT 20h`). Only meaningful after `dispatch`
    /// returns [`DispatchStatus::Stop`].
    pub fn exit_status(&self) -> u8 {
        self.exit_status
    }

    /// Routes a trapped interrupt vector to its handler. Only `0x20` and
    /// `0x21` are recognized; any other vector returns
    /// [`DispatchStatus::Unhandled`].
    pub fn dispatch<V: VCpu + ?Sized, M: GuestMemory + ?Sized>(
        &mut self,
        vcpu: &mut V,
        memory: &mut M,
        int_no: u8,
    ) -> DispatchStatus {
        match int_no {
            0x20 => self.int20(),
            0x21 => self.int21(vcpu, memory),
            _ => DispatchStatus::Unhandled,
        }
    }

    fn int20(&mut self) -> DispatchStatus {
        self.exit_status = 0;
        DispatchStatus::Stop
    }

    fn int21<V: VCpu + ?Sized, M: GuestMemory + ?Sized>(
        &mut self,
        vcpu: &mut V,
        memory: &mut M,
    ) -> DispatchStatus {
        let ah = RegisterView::new(vcpu).get8h(Register::Ax);

        let function = match Function::from_u8(ah) {
            Some(function) => function,
            None => {
                eprintln!("dos-kernel: unsupported Int 21h subfunction AH={:#04x}", ah);
                return DispatchStatus::Unsupported;
            }
        };

        match function {
            Function::WriteCharacter => {
                let dl = RegisterView::new(vcpu).get8l(Register::Dx);
                let _ = self.write_stdout(&[dl]);
                RegisterView::new(vcpu).set8l(Register::Ax, dl);
                DispatchStatus::Handled
            }

            Function::CharacterInputNoEcho => {
                let byte = self.read_stdin_byte().unwrap_or(0);
                RegisterView::new(vcpu).set8l(Register::Ax, byte);
                DispatchStatus::Handled
            }

            Function::WriteString => {
                let addr = self.ds_dx(vcpu);
                let s = MemoryView::new(memory).read_c_string(addr, b'$');
                let _ = self.write_stdout(&s);
                RegisterView::new(vcpu).set8l(Register::Ax, b'$');
                DispatchStatus::Handled
            }

            Function::BufferedInput => {
                let addr = self.ds_dx(vcpu);
                let mut mem = MemoryView::new(memory);
                Self::buffered_input(&mut mem, addr, || match self.read_stdin_byte() {
                    Some(byte) => Ok(Some(byte)),
                    None => Ok(None),
                });
                DispatchStatus::Handled
            }

            Function::FlushAndInput => {
                let _ = self.flush_stdout();
                let al = RegisterView::new(vcpu).get8l(Register::Ax);
                if matches!(al, 0x01 | 0x06 | 0x07 | 0x08 | 0x0A) {
                    RegisterView::new(vcpu).set8h(Register::Ax, al);
                    self.int21(vcpu, memory);
                    RegisterView::new(vcpu).set8h(Register::Ax, 0x0C);
                }
                DispatchStatus::Handled
            }

            Function::SelectDefaultDrive => {
                let dl = RegisterView::new(vcpu).get8l(Register::Dx);
                RegisterView::new(vcpu).set8l(Register::Ax, dl.wrapping_add(b'A'));
                DispatchStatus::Handled
            }

            Function::GetDefaultDrive => {
                RegisterView::new(vcpu).set8l(Register::Ax, 0);
                DispatchStatus::Handled
            }

            Function::SetDta => {
                let dx = RegisterView::new(vcpu).get16(Register::Dx);
                self.dta.set(dx);
                DispatchStatus::Handled
            }

            Function::SetInterruptVector => DispatchStatus::Handled,

            Function::CreatePsp => {
                let ds = RegisterView::new(vcpu).get_segment(SegmentRegister::Ds);
                psp::build_psp(memory, ds, &[] as &[&str]);
                DispatchStatus::Handled
            }

            Function::GetVersion => {
                let mut regs = RegisterView::new(vcpu);
                regs.set8l(Register::Ax, 7);
                regs.set8h(Register::Ax, 0);
                DispatchStatus::Handled
            }

            Function::BreakChecking => {
                let mut regs = RegisterView::new(vcpu);
                match regs.get8l(Register::Ax) {
                    0x01 => {
                        self.break_flag = regs.get8l(Register::Dx) != 0;
                    }
                    _ => {
                        let value = self.break_flag as u8;
                        regs.set8l(Register::Dx, value);
                    }
                }
                DispatchStatus::Handled
            }

            Function::GetInterruptVector => {
                let mut regs = RegisterView::new(vcpu);
                regs.set_segment(SegmentRegister::Es, 0);
                regs.set16(Register::Bx, 0);
                DispatchStatus::Handled
            }

            Function::CreateTruncate => {
                let path = self.read_path_raw(vcpu, memory);
                match host::create_truncate(&path) {
                    Ok(handle) => match self.fds.alloc(handle) {
                        Ok(dos_handle) => self.set_success(vcpu, dos_handle),
                        Err(_) => {
                            let _ = host::close(handle);
                            self.set_failure(vcpu, errno::TOO_MANY_OPEN_FILES);
                        }
                    },
                    Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                }
                DispatchStatus::Handled
            }

            Function::OpenExisting => {
                let path = self.read_path_raw(vcpu, memory);
                let al = RegisterView::new(vcpu).get8l(Register::Ax);
                let mode = AccessMode::from_dos(al);
                match host::open_existing(&path, mode) {
                    Ok(handle) => match self.fds.alloc(handle) {
                        Ok(dos_handle) => self.set_success(vcpu, dos_handle),
                        Err(_) => {
                            let _ = host::close(handle);
                            self.set_failure(vcpu, errno::TOO_MANY_OPEN_FILES);
                        }
                    },
                    Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                }
                DispatchStatus::Handled
            }

            Function::Close => {
                let bx = RegisterView::new(vcpu).get16(Register::Bx);
                match self.fds.lookup(bx) {
                    Some(handle) => {
                        self.fds.dealloc(bx);
                        match host::close(handle) {
                            Ok(()) => self.clear_carry(vcpu),
                            Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                        }
                    }
                    None => self.set_failure(vcpu, errno::INVALID_HANDLE),
                }
                DispatchStatus::Handled
            }

            Function::Read => {
                let (bx, cx) = {
                    let regs = RegisterView::new(vcpu);
                    (regs.get16(Register::Bx), regs.get16(Register::Cx))
                };
                match self.fds.lookup(bx) {
                    Some(handle) => {
                        let mut buf = vec![0u8; cx as usize];
                        match host::read(handle, &mut buf) {
                            Ok(n) => {
                                let addr = self.ds_dx(vcpu);
                                MemoryView::new(memory).write_block(addr, &buf[..n]);
                                self.set_success(vcpu, n as u16);
                            }
                            Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                        }
                    }
                    None => self.set_failure(vcpu, errno::INVALID_HANDLE),
                }
                DispatchStatus::Handled
            }

            Function::Write => {
                let (bx, cx) = {
                    let regs = RegisterView::new(vcpu);
                    (regs.get16(Register::Bx), regs.get16(Register::Cx))
                };
                match self.fds.lookup(bx) {
                    Some(handle) => {
                        let addr = self.ds_dx(vcpu);
                        let buf = MemoryView::new(memory).read_fixed(addr, cx as usize);
                        match host::write(handle, &buf) {
                            Ok(n) => self.set_success(vcpu, n as u16),
                            Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                        }
                    }
                    None => self.set_failure(vcpu, errno::INVALID_HANDLE),
                }
                DispatchStatus::Handled
            }

            Function::Unlink => {
                let path = self.read_path(vcpu, memory);
                match host::remove_file(&path) {
                    Ok(()) => self.clear_carry(vcpu),
                    Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                }
                DispatchStatus::Handled
            }

            Function::LSeek => {
                let (bx, al, cx, dx) = {
                    let regs = RegisterView::new(vcpu);
                    (
                        regs.get16(Register::Bx),
                        regs.get8l(Register::Ax),
                        regs.get16(Register::Cx),
                        regs.get16(Register::Dx),
                    )
                };
                match self.fds.lookup(bx) {
                    Some(handle) => {
                        let offset = (((cx as u32) << 16) | dx as u32) as i32 as i64;
                        let whence = Whence::from_dos(al);
                        match host::lseek(handle, offset, whence) {
                            Ok(pos) => {
                                let mut regs = RegisterView::new(vcpu);
                                regs.set16(Register::Dx, (pos >> 16) as u16);
                                regs.set16(Register::Ax, pos as u16);
                                regs.set_carry(false);
                            }
                            Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                        }
                    }
                    None => self.set_failure(vcpu, errno::INVALID_HANDLE),
                }
                DispatchStatus::Handled
            }

            Function::FileAttributes => {
                let al = RegisterView::new(vcpu).get8l(Register::Ax);
                match al {
                    0x00 => {
                        let path = self.read_path(vcpu, memory);
                        match host::stat(&path) {
                            Ok(st) => {
                                let attrs = attributes_from_host(st.is_directory, st.owner_readable);
                                let mut regs = RegisterView::new(vcpu);
                                regs.set16(Register::Cx, attrs.bits() as u16);
                                regs.set_carry(false);
                            }
                            Err(e) => self.set_failure(vcpu, errno::dos_error_from_io(&e)),
                        }
                        DispatchStatus::Handled
                    }
                    0x01 => {
                        self.clear_carry(vcpu);
                        DispatchStatus::Handled
                    }
                    _ => {
                        eprintln!("dos-kernel: unsupported Int 21h AH=43 AL={:#04x}", al);
                        DispatchStatus::Unsupported
                    }
                }
            }

            Function::Exit => {
                let al = RegisterView::new(vcpu).get8l(Register::Ax);
                self.exit_status = al;
                DispatchStatus::Stop
            }

            Function::FindFirst => {
                let cx = RegisterView::new(vcpu).get16(Register::Cx);
                let path = self.read_path(vcpu, memory);
                self.find_first(vcpu, memory, cx, &path);
                DispatchStatus::Handled
            }

            Function::FindNext => {
                self.set_failure(vcpu, errno::NO_MORE_FILES);
                DispatchStatus::Handled
            }

            Function::GetSetFileDateTime => {
                self.clear_carry(vcpu);
                DispatchStatus::Handled
            }
        }
    }

    fn find_first<V: VCpu + ?Sized, M: GuestMemory + ?Sized>(
        &self,
        vcpu: &mut V,
        memory: &mut M,
        attribute_mask: u16,
        path: &[u8],
    ) {
        if attribute_mask & (Attributes::VOLUME_LABEL.bits() as u16) != 0 {
            self.set_failure(vcpu, errno::NO_MORE_FILES);
            return;
        }

        if path.iter().any(|&b| b == b'?' || b == b'*') {
            self.set_failure(vcpu, errno::NO_MORE_FILES);
            return;
        }

        let st = match host::stat(path) {
            Ok(st) => st,
            Err(e) => {
                self.set_failure(vcpu, errno::dos_error_from_io(&e));
                return;
            }
        };

        let wants_directories = attribute_mask & (Attributes::DIRECTORY.bits() as u16) != 0;
        if st.is_directory && !wants_directories {
            self.set_failure(vcpu, errno::NO_MORE_FILES);
            return;
        }

        let name = path
            .rsplit(|&b| b == b'/')
            .next()
            .unwrap_or(path)
            .to_vec();
        let attrs = attributes_from_host(st.is_directory, st.owner_readable);
        let find_data = FindData::new(attrs, st.size as u32, &name);

        let ds = RegisterView::new(vcpu).get_segment(SegmentRegister::Ds);
        let addr = linear_address(ds, self.dta.offset());
        find_data.write(memory, addr);

        self.clear_carry(vcpu);
    }

    /// Reads a guest C-string at `DS:DX`, unmodified.
    fn read_path_raw<V: VCpu + ?Sized, M: GuestMemory + ?Sized>(
        &self,
        vcpu: &mut V,
        memory: &mut M,
    ) -> Vec<u8> {
        let addr = self.ds_dx(vcpu);
        MemoryView::new(memory).read_c_string(addr, 0)
    }

    /// Reads a guest C-string at `DS:DX` and replaces every backslash with a
    /// forward slash (Design Note 4's fix to the original's off-by-range
    /// bug, which only converted part of the string). Used by the handlers
    /// that document this conversion (`AH=41/43/4E`); `AH=3C/3D` pass the
    /// path through unconverted.
    fn read_path<V: VCpu + ?Sized, M: GuestMemory + ?Sized>(
        &self,
        vcpu: &mut V,
        memory: &mut M,
    ) -> Vec<u8> {
        let mut path = self.read_path_raw(vcpu, memory);

        for byte in path.iter_mut() {
            if *byte == b'\\' {
                *byte = b'/';
            }
        }

        path
    }

    fn ds_dx<V: VCpu + ?Sized>(&self, vcpu: &mut V) -> u32 {
        let regs = RegisterView::new(vcpu);
        linear_address(
            regs.get_segment(SegmentRegister::Ds),
            regs.get16(Register::Dx),
        )
    }

    fn set_success<V: VCpu + ?Sized>(&self, vcpu: &mut V, value: u16) {
        let mut regs = RegisterView::new(vcpu);
        regs.set16(Register::Ax, value);
        regs.set_carry(false);
    }

    fn set_failure<V: VCpu + ?Sized>(&self, vcpu: &mut V, dos_error: u16) {
        let mut regs = RegisterView::new(vcpu);
        regs.set16(Register::Ax, dos_error);
        regs.set_carry(true);
    }

    fn clear_carry<V: VCpu + ?Sized>(&self, vcpu: &mut V) {
        RegisterView::new(vcpu).set_carry(false);
    }

    fn write_stdout(&self, bytes: &[u8]) -> io::Result<usize> {
        let handle = self.fds.lookup(fd::STDOUT).expect("stdout is always present");
        host::write(handle, bytes)
    }

    fn flush_stdout(&self) -> io::Result<()> {
        let handle = self.fds.lookup(fd::STDOUT).expect("stdout is always present");
        host::flush(handle)
    }

    fn read_stdin_byte(&self) -> Option<u8> {
        let handle = self.fds.lookup(fd::STDIN).expect("stdin is always present");
        let mut byte = [0u8; 1];
        match host::read(handle, &mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    /// Fills a DOS `AH=0A` input buffer at `addr`: byte 0 is the
    /// caller-supplied buffer size, including the terminating CR; byte 1
    /// becomes the number of bytes read, and the data itself (terminated by
    /// `0x0D`) starts at byte 2. At most `capacity - 1` data bytes are ever
    /// stored, reserving the last slot for the CR. `next` supplies one byte
    /// at a time; returning `Ok(None)` (EOF) or a byte equal to `\n` both end
    /// the read without consuming it into the buffer.
    fn buffered_input<M: GuestMemory + ?Sized>(
        mem: &mut MemoryView<M>,
        addr: u32,
        mut next: impl FnMut() -> io::Result<Option<u8>>,
    ) {
        let capacity = mem.read8(addr) as usize;
        let max_data = capacity.saturating_sub(1);
        let mut data = Vec::new();

        while data.len() < max_data {
            match next() {
                Ok(Some(b'\n')) | Ok(None) | Err(_) => break,
                Ok(Some(byte)) => data.push(byte),
            }
        }

        mem.write8(addr + 1, data.len() as u8);
        for (i, &byte) in data.iter().enumerate() {
            mem.write8(addr + 2 + i as u32, byte);
        }
        mem.write8(addr + 2 + data.len() as u32, 0x0D);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ArrayVcpu, VecMemory};

    fn kernel_with_args(mem: &mut VecMemory, args: &[&str]) -> Kernel {
        Kernel::new(mem, 0, args)
    }

    #[test]
    fn dispatch_routes_int20_to_stop_with_zero_exit_status() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        let status = kernel.dispatch(&mut cpu, &mut mem, 0x20);
        assert_eq!(status, DispatchStatus::Stop);
        assert_eq!(kernel.exit_status(), 0);
    }

    #[test]
    fn dispatch_routes_unknown_vector_to_unhandled() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        assert_eq!(kernel.dispatch(&mut cpu, &mut mem, 0x13), DispatchStatus::Unhandled);
    }

    #[test]
    fn exit_latches_al_and_returns_stop() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x4C2A;
        let status = kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(status, DispatchStatus::Stop);
        assert_eq!(kernel.exit_status(), 42);
    }

    #[test]
    fn write_string_stops_before_dollar_and_echoes_it_in_al() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        mem.write8(0x200, b'H');
        mem.write8(0x201, b'i');
        mem.write8(0x202, b'$');

        cpu.ax = 0x0900;
        cpu.ds = 0;
        cpu.dx = 0x200;
        let status = kernel.dispatch(&mut cpu, &mut mem, 0x21);

        assert_eq!(status, DispatchStatus::Handled);
        assert_eq!(cpu.ax & 0xFF, b'$' as u16);
    }

    #[test]
    fn select_default_drive_echoes_dl_plus_a_in_al() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x0E00;
        cpu.dx = 2;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.ax & 0xFF, (b'A' + 2) as u16);
    }

    #[test]
    fn get_interrupt_vector_zeroes_es_and_bx() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.es = 0x1234;
        cpu.bx = 0x5678;
        cpu.ax = 0x3500;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.es, 0);
        assert_eq!(cpu.bx, 0);
    }

    #[test]
    fn get_version_reports_seven_dot_zero() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x3000;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.ax, 0x0007);
    }

    #[test]
    fn break_flag_round_trips_through_set_and_get() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x3301;
        cpu.dx = 1;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);

        cpu.ax = 0x3300;
        cpu.dx = 0;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.dx & 0xFF, 1);
    }

    #[test]
    fn find_next_always_reports_no_more_files() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x4F00;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.ax, errno::NO_MORE_FILES);
        assert_eq!(cpu.flags & 1, 1);
    }

    #[test]
    fn close_of_unknown_handle_fails_with_invalid_handle() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x3E00;
        cpu.bx = 99;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.ax, errno::INVALID_HANDLE);
        assert_eq!(cpu.flags & 1, 1);
    }

    #[test]
    fn find_first_rejects_wildcards_without_statting() {
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        // Set the DTA first, as a real guest would via AH=1A.
        cpu.ax = 0x1A00;
        cpu.ds = 0;
        cpu.dx = 0x500;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);

        let path = b"/nonexistent/*.txt\0";
        for (i, &b) in path.iter().enumerate() {
            mem.write8(0x300 + i as u32, b);
        }

        cpu.ax = 0x4E00;
        cpu.cx = 0;
        cpu.ds = 0;
        cpu.dx = 0x300;
        let _ = kernel.dispatch(&mut cpu, &mut mem, 0x21);
        // No host stat performed means the only possible outcome is the
        // documented no-more-files failure, never a stat-derived error.
        assert_eq!(cpu.ax, errno::NO_MORE_FILES);
        assert_eq!(cpu.flags & 1, 1);
    }

    #[test]
    fn buffered_input_stops_at_capacity_and_writes_header() {
        let mut mem = VecMemory::new();
        mem.write8(0x600, 5); // capacity, including the terminating CR

        let mut view = MemoryView::new(&mut mem);
        let mut source = b"hello world".iter().copied();
        Kernel::buffered_input(&mut view, 0x600, || Ok(source.next()));

        // Only capacity - 1 = 4 data bytes fit; the 5th slot is the CR.
        assert_eq!(mem.read8(0x601), 4);
        assert_eq!(mem.read8(0x602), b'h');
        assert_eq!(mem.read8(0x605), b'l');
        assert_eq!(mem.read8(0x606), 0x0D);
    }

    #[test]
    fn buffered_input_stops_at_newline_before_capacity() {
        let mut mem = VecMemory::new();
        mem.write8(0x600, 20);

        let mut view = MemoryView::new(&mut mem);
        let mut source = b"hi\nmore".iter().copied();
        Kernel::buffered_input(&mut view, 0x600, || Ok(source.next()));

        assert_eq!(mem.read8(0x601), 2);
        assert_eq!(mem.read8(0x602), b'h');
        assert_eq!(mem.read8(0x603), b'i');
        assert_eq!(mem.read8(0x604), 0x0D);
    }

    fn write_path(mem: &mut VecMemory, addr: u32, path: &std::path::Path) {
        let bytes = path.to_str().expect("utf-8 temp path").as_bytes();
        let mut view = MemoryView::new(mem);
        view.write_block(addr, bytes);
        view.write8(addr + bytes.len() as u32, 0);
    }

    #[test]
    fn open_read_close_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write as _;
        file.write_all(b"ABCDE").unwrap();

        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        write_path(&mut mem, 0x300, file.path());

        cpu.ax = 0x3D00;
        cpu.ds = 0;
        cpu.dx = 0x300;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.flags & 1, 0);
        let handle = cpu.ax;
        assert_eq!(handle, 3);

        cpu.ax = 0x3F00;
        cpu.bx = handle;
        cpu.cx = 5;
        cpu.dx = 0x400;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.flags & 1, 0);
        assert_eq!(cpu.ax, 5);
        assert_eq!(mem.read_fixed(0x400, 5), b"ABCDE");

        cpu.ax = 0x3E00;
        cpu.bx = handle;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.flags & 1, 0);

        cpu.ax = 0x3F00;
        cpu.bx = handle;
        cpu.cx = 5;
        cpu.dx = 0x400;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.flags & 1, 1);
        assert_eq!(cpu.ax, errno::INVALID_HANDLE);
    }

    #[test]
    fn open_existing_passes_the_path_through_without_backslash_conversion() {
        let dir = tempfile::tempdir().unwrap();
        // A literal backslash is a normal filename byte on a Unix host; if
        // AH=3D converted it to a slash this path would no longer resolve.
        let path = dir.path().join("back\\slash");
        std::fs::write(&path, b"x").unwrap();

        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        write_path(&mut mem, 0x300, &path);
        cpu.ax = 0x3D00;
        cpu.ds = 0;
        cpu.dx = 0x300;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        assert_eq!(cpu.flags & 1, 0);
    }

    #[test]
    fn fd_exhaustion_returns_too_many_open_files_without_leaking_a_host_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        for i in 0..253u32 {
            let path = dir.path().join(format!("f{}", i));
            write_path(&mut mem, 0x300, &path);
            cpu.ax = 0x3C00;
            cpu.ds = 0;
            cpu.dx = 0x300;
            cpu.cx = 0;
            kernel.dispatch(&mut cpu, &mut mem, 0x21);
            assert_eq!(cpu.flags & 1, 0, "create {} should succeed", i);
            assert_eq!(cpu.ax, 3 + i as u16);
        }

        let path = dir.path().join("overflow");
        write_path(&mut mem, 0x300, &path);
        cpu.ax = 0x3C00;
        cpu.ds = 0;
        cpu.dx = 0x300;
        cpu.cx = 0;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);
        // The host file is created by the time DOS-side allocation is
        // checked, so it exists; what must not happen is leaking its host fd
        // (closed explicitly in the allocation-failure path), and no DOS
        // handle is consumed for it.
        assert_eq!(cpu.flags & 1, 1);
        assert_eq!(cpu.ax, errno::TOO_MANY_OPEN_FILES);
    }

    #[test]
    fn find_first_direct_hit_writes_attributes_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        let mut mem = VecMemory::new();
        let mut cpu = ArrayVcpu::new();
        let mut kernel = kernel_with_args(&mut mem, &[]);

        cpu.ax = 0x1A00;
        cpu.ds = 0;
        cpu.dx = 0x500;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);

        write_path(&mut mem, 0x300, &path);
        cpu.ax = 0x4E00;
        cpu.cx = 0;
        cpu.ds = 0;
        cpu.dx = 0x300;
        kernel.dispatch(&mut cpu, &mut mem, 0x21);

        assert_eq!(cpu.flags & 1, 0);
        let size = u32::from_le_bytes([
            mem.read8(0x500 + 26),
            mem.read8(0x500 + 27),
            mem.read8(0x500 + 28),
            mem.read8(0x500 + 29),
        ]);
        assert_eq!(size, 100);
        assert_eq!(mem.read8(0x500 + 30), b'f');
        assert_eq!(mem.read8(0x500 + 31), 0);
    }
}
