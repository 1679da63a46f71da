use thiserror::Error;

/// Failures from the software breakpoint engine.
#[derive(Debug, Error)]
pub enum BpError {
    #[error("peek address failure: {0}")]
    Peek(#[source] nix::Error),
    #[error("poke address failure: {0}")]
    Poke(#[source] nix::Error),
}

/// Failures from the register map.
#[derive(Debug, Error)]
pub enum RegError {
    #[error("getregs failure: {0}")]
    GetRegs(#[source] nix::Error),
    #[error("setregs failure: {0}")]
    SetRegs(#[source] nix::Error),
    #[error("unknown DWARF register number: {0}")]
    UnknownDwarf(i64),
    #[error("unknown register name: {0}")]
    UnknownName(String),
}

/// Failures parsing an address argument out of a command line.
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("HEX argument to command should start with 0x.")]
    Malformed,
}

/// Failures loading DWARF debug information from the target executable.
#[derive(Debug, Error)]
pub enum DebugSymbolsError {
    #[error("failed to load debug symbols from {path}")]
    Load {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Top-level error, uniting every failure domain a command handler can raise.
#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error(transparent)]
    Breakpoint(#[from] BpError),
    #[error(transparent)]
    Register(#[from] RegError),
    #[error(transparent)]
    Address(#[from] AddrError),
    #[error(transparent)]
    DebugSymbols(#[from] DebugSymbolsError),
    #[error("ptrace wait failure: {0}")]
    Wait(#[source] nix::Error),
}
