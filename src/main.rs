mod breakpoint;
mod debugger;
mod dwarf;
mod error;
mod register;
mod util;

use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use nix::sys::personality;
use nix::sys::ptrace;
use nix::unistd::{execv, fork, ForkResult};

use debugger::Debugger;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// A Linux/x86-64 user-space debugger: set breakpoints, continue the
/// tracee, and inspect or modify its registers.
#[derive(Debug, Parser)]
#[command(name = "tracedbg")]
struct Args {
    /// Path to the executable to debug.
    path: PathBuf,

    /// Arguments forwarded to the tracee.
    argv: Vec<String>,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

/// Exactly one positional argument, naming an existing regular file at
/// least 4 bytes long whose first 4 bytes are the ELF magic.
fn check_elf_precondition(path: &Path) -> Result<(), String> {
    let metadata = fs::metadata(path).map_err(|e| format!("cannot stat {path:?}: {e}"))?;
    if !metadata.is_file() {
        return Err(format!("{path:?} is not a regular file"));
    }
    if metadata.len() < 4 {
        return Err(format!("{path:?} is too small to be an ELF executable"));
    }

    let bytes = fs::read(path).map_err(|e| format!("cannot read {path:?}: {e}"))?;
    if bytes[..4] != ELF_MAGIC {
        return Err(format!("{path:?} is not an ELF executable"));
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = check_elf_precondition(&args.path) {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }

    let path_str = args.path.to_string_lossy().into_owned();

    match unsafe { fork() } {
        Err(e) => {
            log::error!("fork failure: {e}");
            ExitCode::FAILURE
        }
        Ok(ForkResult::Child) => launch_tracee(&path_str, &args.argv),
        Ok(ForkResult::Parent { child }) => {
            log::info!("debugging pid {child}, executable {path_str}");

            let mut dbg = Debugger::new(child);
            if let Err(e) = dbg.init(&path_str) {
                log::error!("failed to initialize tracee: {e}");
                return ExitCode::FAILURE;
            }
            dbg.run();
            ExitCode::SUCCESS
        }
    }
}

/// Runs in the forked child: disables ASLR, requests tracing, and execs
/// the target. Never returns on success.
fn launch_tracee(path: &str, argv: &[String]) -> ! {
    if let Err(e) = ptrace::traceme() {
        log::error!("traceme failure: {e}");
        std::process::exit(1);
    }

    let pers = personality::get().unwrap_or(personality::Persona::empty());
    if let Err(e) = personality::set(pers | personality::Persona::ADDR_NO_RANDOMIZE) {
        log::error!("failed to disable ASLR: {e}");
        std::process::exit(1);
    }

    let program = CString::new(path).expect("path contains an interior NUL");
    let mut exec_argv = vec![program.clone()];
    exec_argv.extend(
        argv.iter()
            .map(|a| CString::new(a.as_str()).expect("argument contains an interior NUL")),
    );

    let err = execv(&program, &exec_argv).expect_err("execv only returns on failure");
    log::error!("exec failure: {err}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn elf_precondition_accepts_a_real_elf_binary() {
        assert!(check_elf_precondition(Path::new("/bin/sleep")).is_ok());
    }

    #[test]
    fn elf_precondition_rejects_a_missing_file() {
        assert!(check_elf_precondition(Path::new("/nonexistent/nope")).is_err());
    }

    #[test]
    fn elf_precondition_rejects_a_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        fs::write(&path, b"ab").unwrap();
        assert!(check_elf_precondition(&path).is_err());
    }

    #[test]
    fn elf_precondition_rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notelf");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"PK\x03\x04restofthefile").unwrap();
        assert!(check_elf_precondition(&path).is_err());
    }

    #[test]
    fn elf_precondition_rejects_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_elf_precondition(dir.path()).is_err());
    }
}
