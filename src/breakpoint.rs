//! Software breakpoints: a single byte of the tracee's text segment is
//! overwritten with the `INT3` (`0xCC`) opcode, with the displaced byte kept
//! around so the original instruction stream can be restored.

use std::ffi::c_void;

use nix::sys::ptrace::{self, AddressType};
use nix::unistd::Pid;

use crate::error::BpError;

const BKPT_OPCODE: i64 = 0xcc;
const OPCODE_BITMASK: i64 = 0xff;

#[derive(Debug)]
pub struct Breakpoint {
    pid: Pid,
    address: isize,
    enabled: bool,
    saved_data: i64,
}

impl Breakpoint {
    pub fn new(pid: Pid, address: isize) -> Breakpoint {
        Breakpoint {
            pid,
            address,
            enabled: false,
            saved_data: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Installs the `0xCC` trap byte. A no-op if already enabled: calling
    /// this twice in a row would otherwise save `0xCC` as `saved_data` on
    /// the second call, corrupting the byte `disable` would restore.
    pub fn enable(&mut self) -> Result<(), BpError> {
        if self.enabled {
            return Ok(());
        }

        let ptr = self.address as AddressType;
        let word = ptrace::read(self.pid, ptr).map_err(BpError::Peek)?;

        let saved = word & OPCODE_BITMASK;
        let trapped = (word & !OPCODE_BITMASK) | BKPT_OPCODE;

        unsafe {
            ptrace::write(self.pid, ptr, trapped as *mut c_void).map_err(BpError::Poke)?;
        }

        self.saved_data = saved;
        self.enabled = true;
        Ok(())
    }

    /// Restores the displaced byte. A no-op if already disabled.
    pub fn disable(&mut self) -> Result<(), BpError> {
        if !self.enabled {
            return Ok(());
        }

        let ptr = self.address as AddressType;
        let word = ptrace::read(self.pid, ptr).map_err(BpError::Peek)?;

        let restored = (word & !OPCODE_BITMASK) | self.saved_data;

        unsafe {
            ptrace::write(self.pid, ptr, restored as *mut c_void).map_err(BpError::Poke)?;
        }

        self.enabled = false;
        Ok(())
    }
}
