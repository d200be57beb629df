//! Error types for the emulator and the assembler. Every variant is fatal for the run that
//! produced it; the host prints the diagnostic and stops.

use thiserror::Error;

use crate::bytecode::Word;

pub type Result<T> = std::result::Result<T, DcpuError>;

/// Violations of the decode/encode contract and of the engine's own invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DcpuError {
  #[error("Truncated instruction: header 0x{header:04X} needs {needed} words but only {available} remain")]
  TruncatedInstruction {
    header    : Word,
    needed    : usize,
    available : usize
  },

  #[error("Unknown opcode 0x{opcode:02X} in instruction 0x{header:04X}")]
  UnknownOpcode {
    opcode : u8,
    header : Word
  },

  #[error("Unknown special opcode 0x{opcode:02X} in instruction 0x{header:04X}")]
  UnknownSpecialOpcode {
    opcode : u8,
    header : Word
  },

  #[error("Device index {index} is out of range, {count} devices are attached")]
  DeviceIndexOutOfRange {
    index : Word,
    count : usize
  },

  #[error("Program of {words} words does not fit in memory")]
  ProgramTooLarge {
    words : usize
  },

  #[error("Program terminated with {queued} pending interrupts (handler active: {handler_active})")]
  PendingInterrupts {
    queued         : usize,
    handler_active : bool
  },

  #[error("Assembly failed: {0}")]
  Assembly(#[from] AssemblyError),
}

/// Failures of the S-expression assembly front end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
  #[error("Syntax error at byte offset {offset}")]
  Syntax { offset: usize },

  #[error("Unknown mnemonic `{0}`")]
  UnknownMnemonic(String),

  #[error("Unknown operand `{0}`")]
  UnknownOperand(String),

  #[error("Malformed reference `{0}`")]
  MalformedReference(String),

  #[error("`{mnemonic}` takes {expected} operands but was given {found}")]
  WrongArity {
    mnemonic : String,
    expected : usize,
    found    : usize
  },

  #[error("Label `{0}` is never defined")]
  UnresolvedLabel(String),

  #[error("Label `{0}` is defined more than once")]
  DuplicateLabel(String),
}
