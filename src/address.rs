//! A `Location` is where an operand reads from and writes to: a register, a memory cell, or a
//! constant that has no storage at all.

use std::fmt::{Display, Formatter};

use crate::bytecode::{Register, Word};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Location {
  /// One of the eight general purpose registers.
  Register(Register),
  Sp,
  Pc,
  Ex,
  /// A word of memory. Every `Word` is a valid address.
  Memory(Word),
  /// A constant. Writes to it are ignored.
  Literal(Word),
}

impl Display for Location {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Location::Register(register) => write!(f, "{}", register),
      Location::Sp                 => write!(f, "SP"),
      Location::Pc                 => write!(f, "PC"),
      Location::Ex                 => write!(f, "EX"),
      Location::Memory(address)    => write!(f, "MEM[0x{:04X}]", address),
      Location::Literal(value)     => write!(f, "#{}", value),
    }
  }
}
