//! Owns the tracee pid and its breakpoint table, and dispatches REPL
//! commands onto the register map, breakpoint engine and DWARF loader.

use std::collections::HashMap;

use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::breakpoint::Breakpoint;
use crate::dwarf::{self, DebugSymbols};
use crate::error::{AddrError, DebuggerError};
use crate::register::{self, Reg};
use crate::util;

const PROMPT: &str = "dbg> ";

pub struct Debugger {
    pid: Pid,
    breakpoints: HashMap<isize, Breakpoint>,
    debug_symbols: Option<DebugSymbols>,
}

enum Command<'a> {
    Continue,
    Break(&'a [&'a str]),
    Register(&'a [&'a str]),
    Quit,
    Unknown,
}

impl Debugger {
    pub fn new(pid: Pid) -> Debugger {
        Debugger {
            pid,
            breakpoints: HashMap::new(),
            debug_symbols: None,
        }
    }

    /// Blocks until the tracee reports its next stop. Every resume
    /// (`continue`/single-step) must be followed by exactly one call to
    /// this before the REPL reads its next line.
    fn wait_for_signal(&self) -> Result<WaitStatus, DebuggerError> {
        waitpid(self.pid, None).map_err(DebuggerError::Wait)
    }

    /// Waits for the tracee's initial exec-stop, installs the exit-kill
    /// trace option, and best-effort loads DWARF symbols from `exe_path`.
    pub fn init(&mut self, exe_path: &str) -> Result<(), DebuggerError> {
        self.wait_for_signal()?;
        ptrace::setoptions(self.pid, ptrace::Options::PTRACE_O_EXITKILL)
            .map_err(DebuggerError::Wait)?;
        self.load_debug_symbols(exe_path);
        Ok(())
    }

    /// Runs the REPL until `quit`, EOF, or interrupt.
    pub fn run(&mut self) {
        let mut rl = DefaultEditor::new().expect("failed to initialize line editor");
        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let keep_going = self.handle_input(&line);
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if !keep_going {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    log::error!("readline failure: {e}");
                    break;
                }
            }
        }
    }

    /// Parses and dispatches one line of input. Returns `false` when the
    /// REPL should terminate.
    fn handle_input(&mut self, line: &str) -> bool {
        let tokens = util::split(line, ' ');
        if tokens.is_empty() {
            return true;
        }

        match parse_command(&tokens) {
            Command::Continue => {
                if let Err(e) = self.continue_execution() {
                    log::error!("{e}");
                }
            }
            Command::Break(args) => {
                if args.len() != 1 {
                    println!("usage: break <0xADDRESS>");
                } else if let Err(e) = self.set_breakpoint(args[0]) {
                    log::error!("{e}");
                }
            }
            Command::Register(args) => self.handle_register_command(args),
            Command::Quit => return false,
            Command::Unknown => println!("Unknown command"),
        }

        true
    }

    fn handle_register_command(&mut self, args: &[&str]) {
        if args.is_empty() {
            println!("usage: register dump | register read <name> | register write <name> <0xVALUE>");
            return;
        }

        let (sub, rest) = (args[0], &args[1..]);
        if util::is_prefix(sub, "dump") {
            if !rest.is_empty() {
                println!("usage: register dump");
                return;
            }
            if let Err(e) = self.dump_registers() {
                log::error!("{e}");
            }
        } else if util::is_prefix(sub, "read") {
            if rest.len() != 1 {
                println!("usage: register read <name>");
                return;
            }
            match self.read_register(rest[0]) {
                Ok(value) => println!("{}: 0x{value:016x}", rest[0]),
                Err(e) => log::error!("{e}"),
            }
        } else if util::is_prefix(sub, "write") {
            if rest.len() != 2 {
                println!("usage: register write <name> <0xVALUE>");
                return;
            }
            if let Err(e) = self.write_register(rest[0], rest[1]) {
                log::error!("{e}");
            }
        } else {
            println!("Unknown register command");
        }
    }

    /// Step-over-if-at-breakpoint, then resume the tracee.
    pub fn continue_execution(&mut self) -> Result<(), DebuggerError> {
        match register::get(self.pid, Reg::Rip) {
            Ok(rip) => {
                let probe = rip as isize - 1;
                let needs_step_over = self
                    .breakpoints
                    .get(&probe)
                    .is_some_and(Breakpoint::is_enabled);

                if needs_step_over {
                    register::set(self.pid, Reg::Rip, probe as u64)?;
                    self.breakpoints.get_mut(&probe).unwrap().disable()?;
                    ptrace::step(self.pid, None).map_err(DebuggerError::Wait)?;
                    self.wait_for_signal()?;
                    self.breakpoints.get_mut(&probe).unwrap().enable()?;
                }
            }
            Err(e) => log::warn!("could not read rip before continuing, state is uncertain: {e}"),
        }

        ptrace::cont(self.pid, None).map_err(DebuggerError::Wait)?;
        self.wait_for_signal()?;
        Ok(())
    }

    /// Parses `addr_str` as a `0x`-prefixed hex address and installs a
    /// breakpoint there. A no-op (with a message) if one is already active.
    pub fn set_breakpoint(&mut self, addr_str: &str) -> Result<(), DebuggerError> {
        let address = parse_hex_address(addr_str)?;

        if self.breakpoints.contains_key(&address) {
            println!("Breakpoint already active at {address:#x}");
            return Ok(());
        }

        let mut bp = Breakpoint::new(self.pid, address);
        let enable_result = bp.enable();
        self.breakpoints.insert(address, bp);
        enable_result?;

        println!("Breakpoint set at {address:#x}");
        Ok(())
    }

    pub fn read_register(&self, name: &str) -> Result<u64, DebuggerError> {
        let reg = register::from_name(name)?;
        Ok(register::get(self.pid, reg)?)
    }

    pub fn write_register(&self, name: &str, value_str: &str) -> Result<(), DebuggerError> {
        let reg = register::from_name(name)?;
        let value = parse_hex_value(value_str)?;
        register::set(self.pid, reg, value)?;
        Ok(())
    }

    pub fn dump_registers(&self) -> Result<(), DebuggerError> {
        Ok(register::dump(self.pid)?)
    }

    /// Best-effort: logs and leaves `debug_symbols` unset on failure, since
    /// symbols are not required for breakpoint/register operations.
    fn load_debug_symbols(&mut self, path: &str) {
        match dwarf::load(path) {
            Ok(symbols) => {
                log::info!("loaded debug symbols from {}", symbols.path());
                self.debug_symbols = Some(symbols);
            }
            Err(e) => log::warn!("{e}"),
        }
    }
}

fn parse_command<'a>(tokens: &'a [&'a str]) -> Command<'a> {
    const VOCABULARY: &[&str] = &["continue", "break", "register", "quit"];

    let head = tokens[0];
    let args = &tokens[1..];

    match VOCABULARY.iter().find(|name| util::is_prefix(head, name)) {
        Some(&"continue") => Command::Continue,
        Some(&"break") => Command::Break(args),
        Some(&"register") => Command::Register(args),
        Some(&"quit") => Command::Quit,
        _ => Command::Unknown,
    }
}

fn parse_hex_address(s: &str) -> Result<isize, AddrError> {
    let digits = s.strip_prefix("0x").ok_or(AddrError::Malformed)?;
    isize::from_str_radix(digits, 16).map_err(|_| AddrError::Malformed)
}

/// As [`parse_hex_address`], but for register *values*: the full 64-bit
/// range (including values with bit 63 set, like `0xffffffffffffffff`) is
/// valid here, where `isize::from_str_radix` would reject it as overflow.
fn parse_hex_value(s: &str) -> Result<u64, AddrError> {
    let digits = s.strip_prefix("0x").ok_or(AddrError::Malformed)?;
    u64::from_str_radix(digits, 16).map_err(|_| AddrError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::personality;
    use nix::sys::wait::waitpid;
    use nix::unistd::{fork, ForkResult};
    use std::ffi::CString;

    fn spawn_tracee() -> Debugger {
        match unsafe { fork() }.expect("fork") {
            ForkResult::Child => {
                ptrace::traceme().expect("traceme");
                let pers = personality::get().expect("get personality");
                personality::set(pers | personality::Persona::ADDR_NO_RANDOMIZE)
                    .expect("set personality");
                let path = CString::new("/bin/sleep").unwrap();
                let arg = CString::new("5").unwrap();
                match nix::unistd::execv(&path, &[path.clone(), arg]) {
                    Ok(infallible) => match infallible {},
                    Err(e) => panic!("execv: {e}"),
                }
            }
            ForkResult::Parent { child } => {
                let mut dbg = Debugger::new(child);
                dbg.init("/bin/sleep").expect("init");
                dbg
            }
        }
    }

    impl Drop for Debugger {
        fn drop(&mut self) {
            let _ = ptrace::kill(self.pid);
            let _ = waitpid(self.pid, None);
        }
    }

    #[test]
    fn parses_hex_address() {
        assert_eq!(parse_hex_address("0x401000").unwrap(), 0x401000);
        assert!(parse_hex_address("40x").is_err());
        assert!(parse_hex_address("401000").is_err());
    }

    #[test]
    fn parses_hex_value_with_bit_63_set() {
        assert_eq!(parse_hex_value("0xffffffffffffffff").unwrap(), u64::MAX);
        assert!(parse_hex_value("40x").is_err());
        assert!(parse_hex_value("ffffffffffffffff").is_err());
    }

    #[test]
    fn write_register_accepts_a_value_with_bit_63_set() {
        let dbg = spawn_tracee();
        dbg.write_register("rax", "0xffffffffffffffff").unwrap();
        assert_eq!(dbg.read_register("rax").unwrap(), u64::MAX);
    }

    #[test]
    fn set_breakpoint_twice_at_same_address_is_a_no_op() {
        let mut dbg = spawn_tracee();
        let rip = register::get(dbg.pid, Reg::Rip).unwrap();
        let addr = format!("{rip:#x}");

        dbg.set_breakpoint(&addr).unwrap();
        assert_eq!(dbg.breakpoints.len(), 1);
        dbg.set_breakpoint(&addr).unwrap();
        assert_eq!(dbg.breakpoints.len(), 1);
    }

    #[test]
    fn read_and_write_register_round_trip() {
        let dbg = spawn_tracee();
        dbg.write_register("rax", "0xdeadbeef").unwrap();
        let value = dbg.read_register("rax").unwrap();
        assert_eq!(value, 0xdeadbeef);
    }

    #[test]
    fn continue_across_a_breakpoint_stops_again_on_the_second_hit() {
        let mut dbg = spawn_tracee();
        let rip = register::get(dbg.pid, Reg::Rip).unwrap();
        let addr = rip as isize;

        dbg.set_breakpoint(&format!("{addr:#x}")).unwrap();
        dbg.continue_execution().unwrap();

        // rip should now sit one byte past the trap.
        let after_trap = register::get(dbg.pid, Reg::Rip).unwrap();
        assert_eq!(after_trap as isize, addr + 1);

        // Rewind to the breakpoint and continue again: it must still be live.
        register::set(dbg.pid, Reg::Rip, addr as u64).unwrap();
        dbg.continue_execution().unwrap();
        let second_hit = register::get(dbg.pid, Reg::Rip).unwrap();
        assert_eq!(second_hit as isize, addr + 1);
    }

    #[test]
    fn unknown_top_level_command_is_reported() {
        let mut dbg = spawn_tracee();
        assert!(dbg.handle_input("frobnicate"));
    }

    #[test]
    fn quit_terminates_the_repl_loop() {
        let mut dbg = spawn_tracee();
        assert!(!dbg.handle_input("quit"));
        assert!(!dbg.handle_input("q"));
    }
}
