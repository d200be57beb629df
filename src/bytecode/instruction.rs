use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

use super::binary::Word;

/// Number of values the 5 bit opcode field can hold. Adding an opcode means updating both
/// `Opcode` and the bound check below.
pub const OPCODE_COUNT: u8 = 0x20;
/// The opcode field value that redirects through operand B to a `SpecialOpcode`.
pub const SPECIAL_ESCAPE: u8 = 0x00;
/// First operand A code of the packed small literal range.
pub const SHORT_LITERAL_BASE: u8 = 0x20;
/// The packed small literal code standing for -1.
pub const SHORT_LITERAL_MINUS_ONE: u8 = 0x3F;
/// Largest non-negative value expressible as a packed small literal.
pub const SHORT_LITERAL_MAX: Word = (SHORT_LITERAL_MINUS_ONE - SHORT_LITERAL_BASE - 1) as Word;

/**
  The regular opcodes. The escape value 0x00 is not a variant; an instruction with the escape
  in its opcode field is an `Instruction::Special` instead. The gaps (0x18, 0x19, 0x1C, 0x1D)
  are unassigned and fail to decode.
*/
#[derive(
  StrumDisplay, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,       Eq, PartialEq,    Debug,         Hash
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum Opcode {
  Set = 0x01,
  Add = 0x02,
  Sub = 0x03,
  Mul = 0x04,
  Mli = 0x05,
  Div = 0x06,
  Dvi = 0x07,
  Mod = 0x08,
  Mdi = 0x09,
  And = 0x0A,
  Bor = 0x0B,
  Xor = 0x0C,
  Shr = 0x0D,
  Asr = 0x0E,
  Shl = 0x0F,
  // Conditionals
  Ifb = 0x10,
  Ifc = 0x11,
  Ife = 0x12,
  Ifn = 0x13,
  Ifg = 0x14,
  Ifa = 0x15,
  Ifl = 0x16,
  Ifu = 0x17,
  // Carry arithmetic
  Adx = 0x1A,
  Sbx = 0x1B,
  // Copy and step I, J
  Sti = 0x1E,
  Std = 0x1F,
}

const _: () = assert!((Opcode::Std as u8) < OPCODE_COUNT, "an opcode no longer fits the 5 bit opcode field");

/// Operations selected by operand B's bit pattern when the opcode field holds `SPECIAL_ESCAPE`.
#[derive(
  StrumDisplay, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,       Eq, PartialEq,    Debug,         Hash
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum SpecialOpcode {
  Jsr = 0x01,
  Int = 0x08,
  Iag = 0x09,
  Ias = 0x0A,
  Rfi = 0x0B,
  Iaq = 0x0C,
  Hwn = 0x10,
  Hwq = 0x11,
  Hwi = 0x12,
}

/// The eight general purpose registers, in encoding order.
#[derive(
  StrumDisplay, EnumString, EnumIter, IntoPrimitive,
  Clone,        Copy,       Eq, PartialEq, Debug, Hash
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Register {
  A, B, C, X, Y, Z, I, J
}

pub const REGISTER_COUNT: usize = 8;

impl Register {
  pub const ALL: [Register; REGISTER_COUNT] = [
    Register::A, Register::B, Register::C, Register::X,
    Register::Y, Register::Z, Register::I, Register::J
  ];

  /// The register selected by the low three bits of an operand code.
  pub fn from_bits(bits: u8) -> Register {
    Register::ALL[(bits & 0x7) as usize]
  }

  pub fn idx(&self) -> usize {
    Into::<u8>::into(*self) as usize
  }
}

/**
  Operand kinds, the 5 bit tags shared by operands A and B. Operand A additionally has the packed
  literal range 0x20-0x3F, which lives in `OperandA` rather than here because operand B can never
  use it.

  The order of the variants is the encoding and is significant: the register groups are located
  by masking.
*/
#[derive(IntoPrimitive, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum Value {
  // Plain registers
  A = 0x00, B, C, X, Y, Z, I, J,
  // [register]
  IndirectA = 0x08, IndirectB, IndirectC, IndirectX, IndirectY, IndirectZ, IndirectI, IndirectJ,
  // [register + next word]
  OffsetA = 0x10, OffsetB, OffsetC, OffsetX, OffsetY, OffsetZ, OffsetI, OffsetJ,
  /// POP when read as operand A, PUSH when written as operand B.
  PushPop = 0x18,
  /// [SP]
  Peek = 0x19,
  /// [SP + next word]
  Pick = 0x1A,
  Sp = 0x1B,
  Pc = 0x1C,
  Ex = 0x1D,
  /// [next word]
  Next = 0x1E,
  /// next word, as a literal
  NextLiteral = 0x1F,
}

impl Value {
  pub const ALL: [Value; 32] = [
    Value::A, Value::B, Value::C, Value::X, Value::Y, Value::Z, Value::I, Value::J,
    Value::IndirectA, Value::IndirectB, Value::IndirectC, Value::IndirectX,
    Value::IndirectY, Value::IndirectZ, Value::IndirectI, Value::IndirectJ,
    Value::OffsetA, Value::OffsetB, Value::OffsetC, Value::OffsetX,
    Value::OffsetY, Value::OffsetZ, Value::OffsetI, Value::OffsetJ,
    Value::PushPop, Value::Peek, Value::Pick, Value::Sp,
    Value::Pc, Value::Ex, Value::Next, Value::NextLiteral,
  ];

  /// Every 5 bit pattern names a kind, so this cannot fail.
  pub fn from_bits(bits: u8) -> Value {
    Value::ALL[(bits & 0x1F) as usize]
  }

  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn register(register: Register) -> Value {
    Value::from_bits(register.into())
  }

  pub fn indirect(register: Register) -> Value {
    Value::from_bits(0x08 | Into::<u8>::into(register))
  }

  pub fn offset(register: Register) -> Value {
    Value::from_bits(0x10 | Into::<u8>::into(register))
  }

  /// Whether this kind is followed by an extra word in the encoding.
  pub fn is_multiword(&self) -> bool {
    match self {
      | Value::OffsetA | Value::OffsetB | Value::OffsetC | Value::OffsetX
      | Value::OffsetY | Value::OffsetZ | Value::OffsetI | Value::OffsetJ
      | Value::Pick
      | Value::Next
      | Value::NextLiteral => true,
      _ => false
    }
  }

  /// Renders the operand the way a listing shows it. `word` is the operand's extra word.
  pub fn to_text(&self, is_a: bool, word: Word) -> String {
    let code = self.code();
    match self {
      Value::PushPop     => if is_a { "POP".to_string() } else { "PUSH".to_string() },
      Value::Peek        => "PEEK".to_string(),
      Value::Pick        => format!("PICK {}", word),
      Value::Sp          => "SP".to_string(),
      Value::Pc          => "PC".to_string(),
      Value::Ex          => "EX".to_string(),
      Value::Next        => format!("[0x{:x}]", word),
      Value::NextLiteral => format!("0x{:x}", word),
      _ if code < 0x08   => format!("{}", Register::from_bits(code)),
      _ if code < 0x10   => format!("[{}]", Register::from_bits(code)),
      _                  => format!("[{}+{}]", Register::from_bits(code), word),
    }
  }
}

/// Operand A: any `Value`, or a packed literal carried in the tag itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperandA {
  Value(Value),
  /// A packed literal. Holds the decoded word: 0xFFFF or 0 through 30.
  Literal(Word),
}

impl OperandA {
  /// Interprets a 6 bit operand A field.
  pub fn from_code(code: u8) -> OperandA {
    let code = code & 0x3F;
    match code {
      SHORT_LITERAL_MINUS_ONE => OperandA::Literal(0xFFFF),
      c if c >= SHORT_LITERAL_BASE => OperandA::Literal((c - SHORT_LITERAL_BASE) as Word),
      c => OperandA::Value(Value::from_bits(c))
    }
  }

  /// The packed literal for `value`, if it has one.
  pub fn literal(value: Word) -> Option<OperandA> {
    match value {
      0xFFFF => Some(OperandA::Literal(value)),
      v if v <= SHORT_LITERAL_MAX => Some(OperandA::Literal(v)),
      _ => None
    }
  }

  pub fn code(&self) -> u8 {
    match self {
      OperandA::Value(value) => value.code(),
      OperandA::Literal(0xFFFF) => SHORT_LITERAL_MINUS_ONE,
      OperandA::Literal(v) => {
        debug_assert!(*v <= SHORT_LITERAL_MAX, "packed literal {} is out of range", v);
        SHORT_LITERAL_BASE + *v as u8
      }
    }
  }

  pub fn is_multiword(&self) -> bool {
    match self {
      OperandA::Value(value) => value.is_multiword(),
      OperandA::Literal(_) => false
    }
  }

  pub fn to_text(&self, word: Word) -> String {
    match self {
      OperandA::Value(value) => value.to_text(true, word),
      OperandA::Literal(0xFFFF) => "-1".to_string(),
      OperandA::Literal(v) => format!("{}", v),
    }
  }
}

impl From<Value> for OperandA {
  fn from(value: Value) -> Self {
    OperandA::Value(value)
  }
}

impl From<Register> for OperandA {
  fn from(register: Register) -> Self {
    OperandA::Value(Value::register(register))
  }
}

/**
  A decoded instruction. The extra words are stored whether or not the operand uses them, so
  that an instruction is a fixed shape; only the words of multiword operands are encoded.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [a:6][b:5][opcode:5]
  Basic {
    opcode : Opcode,
    b      : Value,
    a      : OperandA,
    word_b : Word,
    word_a : Word
  },
  /// [a:6][opcode:5][00000]
  Special {
    opcode : SpecialOpcode,
    a      : OperandA,
    word_a : Word
  },
}

impl Instruction {
  pub fn basic(opcode: Opcode, b: Value, a: impl Into<OperandA>) -> Instruction {
    Instruction::Basic { opcode, b, a: a.into(), word_b: 0, word_a: 0 }
  }

  pub fn special(opcode: SpecialOpcode, a: impl Into<OperandA>) -> Instruction {
    Instruction::Special { opcode, a: a.into(), word_a: 0 }
  }

  pub fn with_word_a(mut self, word: Word) -> Instruction {
    match &mut self {
      | Instruction::Basic { word_a, .. }
      | Instruction::Special { word_a, .. } => *word_a = word
    }
    self
  }

  /// Has no effect on special instructions, which have no operand B.
  pub fn with_word_b(mut self, word: Word) -> Instruction {
    if let Instruction::Basic { word_b, .. } = &mut self {
      *word_b = word;
    }
    self
  }

  /// Number of words the instruction occupies once encoded.
  pub fn word_count(&self) -> Word {
    match self {
      Instruction::Basic { b, a, .. } => 1 + a.is_multiword() as Word + b.is_multiword() as Word,
      Instruction::Special { a, .. } => 1 + a.is_multiword() as Word,
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Basic { opcode, b, a, word_b, word_a } => {
        write!(f, "{} {}, {}", opcode, b.to_text(false, *word_b), a.to_text(*word_a))
      }

      Instruction::Special { opcode, a, word_a } => {
        write!(f, "{} {}", opcode, a.to_text(*word_a))
      }

    }
  }
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Whether a raw opcode field selects one of the IF opcodes.
  pub fn is_conditional_code(code: u8) -> bool {
    (Opcode::Ifb.code()..=Opcode::Ifu.code()).contains(&code)
  }

  /// Cycles spent before operand costs and conditional skips are added.
  pub fn base_cycles(&self) -> u8 {
    match self {
      | Opcode::Set | Opcode::And | Opcode::Bor | Opcode::Xor
      | Opcode::Shr | Opcode::Asr | Opcode::Shl => 1,

      | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Mli
      | Opcode::Ifb | Opcode::Ifc | Opcode::Ife | Opcode::Ifn
      | Opcode::Ifg | Opcode::Ifa | Opcode::Ifl | Opcode::Ifu => 2,

      | Opcode::Div | Opcode::Dvi | Opcode::Mod | Opcode::Mdi
      | Opcode::Adx | Opcode::Sbx | Opcode::Sti | Opcode::Std => 3,
    }
  }
}

impl SpecialOpcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Cycles spent before operand costs and, for HWI, the device's own cost.
  pub fn base_cycles(&self) -> u8 {
    match self {
      SpecialOpcode::Iag | SpecialOpcode::Ias => 1,
      SpecialOpcode::Iaq | SpecialOpcode::Hwn => 2,
      SpecialOpcode::Jsr | SpecialOpcode::Rfi => 3,
      SpecialOpcode::Int | SpecialOpcode::Hwq | SpecialOpcode::Hwi => 4,
    }
  }
}
