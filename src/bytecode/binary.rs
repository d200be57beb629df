/*!
  This module is responsible for the encoding and decoding of binary instructions, and for the
  conversion between words and the little-endian byte stream of a program file.

*/
use std::convert::TryFrom;

use tracing::warn;

use super::{Instruction, Opcode, OperandA, SpecialOpcode, Value, SPECIAL_ESCAPE};
use crate::error::{DcpuError, Result};

// If you change this you must also change `pack_bytes` and `unpack_bytes`.
pub type Word = u16;
pub type SignedWord = i16;
pub type Byte = u8;
pub const WORD_BYTES: usize = 2;

const OPCODE_MASK : Word = 0x1F;
const B_SHIFT     : Word = 5;
const B_MASK      : Word = 0x1F;
const A_SHIFT     : Word = 10;

/// An encoded instruction: the header followed by zero, one, or two extra words.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncodedInstruction {
  Word(Word),
  DoubleWord(Word, Word),
  TripleWord(Word, Word, Word),
}

impl EncodedInstruction {
  pub fn push_to(self, code: &mut Vec<Word>) {
    match self {
      EncodedInstruction::Word(header) => code.push(header),
      EncodedInstruction::DoubleWord(header, extra) => {
        code.push(header);
        code.push(extra);
      }
      EncodedInstruction::TripleWord(header, extra_a, extra_b) => {
        code.push(header);
        code.push(extra_a);
        code.push(extra_b);
      }
    }
  }
}

/// The header word, `[a:6][b:5][opcode:5]`.
pub fn encode_header(instruction: &Instruction) -> Word {
  let (opcode, b, a) = match instruction {
    Instruction::Basic { opcode, b, a, .. } => (opcode.code(), b.code(), a.code()),
    Instruction::Special { opcode, a, .. } => (SPECIAL_ESCAPE, opcode.code(), a.code()),
  };
  ((a as Word) << A_SHIFT) | ((b as Word) << B_SHIFT) | opcode as Word
}

/**
  Encodes the instruction. The extra word of operand A always comes before that of operand B,
  and an extra word is only emitted for a multiword operand.
*/
pub fn encode_instruction(instruction: &Instruction) -> EncodedInstruction {
  let header = encode_header(instruction);
  let (a_word, b_word) = match instruction {
    Instruction::Basic { b, a, word_b, word_a, .. } => (
      if a.is_multiword() { Some(*word_a) } else { None },
      if b.is_multiword() { Some(*word_b) } else { None },
    ),
    Instruction::Special { a, word_a, .. } => (
      if a.is_multiword() { Some(*word_a) } else { None },
      None
    ),
  };

  match (a_word, b_word) {
    (None, None)                 => EncodedInstruction::Word(header),
    (Some(extra), None)
    | (None, Some(extra))        => EncodedInstruction::DoubleWord(header, extra),
    (Some(extra_a), Some(extra_b)) => EncodedInstruction::TripleWord(header, extra_a, extra_b),
  }
}

pub fn encode(instructions: &[Instruction]) -> Vec<Word> {
  let mut code = Vec::with_capacity(instructions.len());
  for instruction in instructions {
    encode_instruction(instruction).push_to(&mut code);
  }
  code
}

/**
  Returns the size in WORDS of the instruction starting with `header`. The header alone always
  determines the size, which is what lets conditional skipping step over instructions without
  decoding them.

  Note that this function does not check if the header has a valid opcode.
*/
pub fn instruction_size(header: Word) -> Word {
  let opcode = (header & OPCODE_MASK) as u8;
  let a = OperandA::from_code((header >> A_SHIFT) as u8);
  let b = Value::from_bits(((header >> B_SHIFT) & B_MASK) as u8);

  let mut size = 1 + a.is_multiword() as Word;
  if opcode != SPECIAL_ESCAPE && b.is_multiword() {
    size += 1;
  }
  size
}

/// Whether the instruction starting with `header` is one of the IF opcodes.
pub fn is_conditional_header(header: Word) -> bool {
  Opcode::is_conditional_code((header & OPCODE_MASK) as u8)
}

/**
  Decodes the instruction at the start of `code`. The slice length is the bound on how many
  words the instruction may occupy; reading an extra word past it is an error. Words after the
  instruction are never read.
*/
pub fn decode_instruction(code: &[Word]) -> Result<Instruction> {
  let header = match code.first() {
    Some(word) => *word,
    None => return Err(DcpuError::TruncatedInstruction { header: 0, needed: 1, available: 0 })
  };
  let needed = instruction_size(header) as usize;
  if needed > code.len() {
    return Err(DcpuError::TruncatedInstruction { header, needed, available: code.len() });
  }

  let opcode = (header & OPCODE_MASK) as u8;
  let b_bits = ((header >> B_SHIFT) & B_MASK) as u8;
  let a = OperandA::from_code((header >> A_SHIFT) as u8);

  let mut cursor = 1;
  let mut next_word = |multiword: bool| -> Word {
    match multiword {
      true => {
        let word = code[cursor];
        cursor += 1;
        word
      }
      false => 0
    }
  };

  let instruction =
    if opcode == SPECIAL_ESCAPE {
      let special = SpecialOpcode::try_from(b_bits)
        .map_err(|_| DcpuError::UnknownSpecialOpcode { opcode: b_bits, header })?;
      Instruction::Special {
        opcode : special,
        a,
        word_a : next_word(a.is_multiword())
      }
    } else {
      let opcode = Opcode::try_from(opcode)
        .map_err(|_| DcpuError::UnknownOpcode { opcode, header })?;
      let b = Value::from_bits(b_bits);
      let word_a = next_word(a.is_multiword());
      let word_b = next_word(b.is_multiword());
      Instruction::Basic { opcode, b, a, word_b, word_a }
    };

  Ok(instruction)
}

/// Decodes a whole word stream. A partial instruction at the end of the stream is an error.
pub fn decode(code: &[Word]) -> Result<Vec<Instruction>> {
  let mut instructions = Vec::new();
  let mut cursor = 0usize;
  while cursor < code.len() {
    let instruction = decode_instruction(&code[cursor..])?;
    cursor += instruction.word_count() as usize;
    instructions.push(instruction);
  }
  Ok(instructions)
}

/// Splits each word into its little-endian byte pair, low byte first.
pub fn unpack_bytes(code: &[Word]) -> Vec<Byte> {
  let mut bytes = Vec::with_capacity(code.len() * WORD_BYTES);
  for word in code {
    bytes.extend_from_slice(&word.to_le_bytes());
  }
  bytes
}

/// Joins little-endian byte pairs into words. An odd trailing byte is dropped.
pub fn pack_bytes(bytes: &[Byte]) -> Vec<Word> {
  let pairs = bytes.chunks_exact(WORD_BYTES);
  if !pairs.remainder().is_empty() {
    warn!(length = bytes.len(), "dropping odd trailing byte of program image");
  }
  pairs.map(|pair| Word::from_le_bytes([pair[0], pair[1]])).collect()
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Register;

  fn sample_program() -> Vec<Instruction> {
    vec![
      Instruction::basic(Opcode::Set, Value::X, Value::NextLiteral).with_word_a(15),
      Instruction::basic(Opcode::Add, Value::Y, Register::X),
      Instruction::basic(Opcode::Mul, Value::X, Register::X),
      Instruction::basic(Opcode::Set, Value::Next, Value::OffsetI)
        .with_word_b(0x8000)
        .with_word_a(0xFFFF),
      Instruction::special(SpecialOpcode::Jsr, Value::NextLiteral).with_word_a(0x20),
      Instruction::special(SpecialOpcode::Int, OperandA::Literal(0xFFFF)),
      Instruction::basic(Opcode::Ifn, Value::Pick, OperandA::Literal(30)).with_word_b(2),
    ]
  }

  #[test]
  fn header_layout() {
    // SET X, 15 packs a=0x1F, b=0x03, op=0x01.
    let set = Instruction::basic(Opcode::Set, Value::X, Value::NextLiteral).with_word_a(15);
    assert_eq!(encode_instruction(&set), EncodedInstruction::DoubleWord(0x7C61, 15));

    // JSR puts its special opcode where operand B would be.
    let jsr = Instruction::special(SpecialOpcode::Jsr, Register::A);
    assert_eq!(encode_header(&jsr), 0x0020);
  }

  #[test]
  fn extra_words_are_ordered_a_then_b() {
    let set = Instruction::basic(Opcode::Set, Value::Next, Value::NextLiteral)
      .with_word_b(0xBBBB)
      .with_word_a(0xAAAA);
    assert_eq!(encode(&[set])[1..], [0xAAAA, 0xBBBB]);
  }

  #[test]
  fn decode_inverts_encode() -> Result<()> {
    let program = sample_program();
    let code = encode(&program);
    assert_eq!(decode(&code)?, program);
    Ok(())
  }

  #[test]
  fn decode_consumes_exactly_the_word_count() -> Result<()> {
    let program = sample_program();
    let code = encode(&program);
    let mut cursor = 0usize;
    for expected in &program {
      assert_eq!(instruction_size(code[cursor]), expected.word_count());
      // Trailing words of later instructions must not influence the result.
      let alone = &code[cursor..cursor + expected.word_count() as usize];
      assert_eq!(decode_instruction(alone)?, *expected);
      cursor += expected.word_count() as usize;
    }
    assert_eq!(cursor, code.len());
    Ok(())
  }

  #[test]
  fn truncated_stream_is_rejected() {
    let set = Instruction::basic(Opcode::Set, Value::Next, Value::NextLiteral);
    let code = encode(&[set]);
    assert_eq!(
      decode(&code[..2]),
      Err(DcpuError::TruncatedInstruction { header: code[0], needed: 3, available: 2 })
    );
    assert!(decode_instruction(&[]).is_err());
  }

  #[test]
  fn unassigned_opcodes_are_rejected() {
    assert_eq!(
      decode_instruction(&[0x0018]),
      Err(DcpuError::UnknownOpcode { opcode: 0x18, header: 0x0018 })
    );
    // Escape with b = 0x02, which no special opcode uses.
    assert_eq!(
      decode_instruction(&[0x0040]),
      Err(DcpuError::UnknownSpecialOpcode { opcode: 0x02, header: 0x0040 })
    );
  }

  #[test]
  fn special_instructions_ignore_operand_b_size() {
    // HWQ has b bits 0x11, which as a value kind would be the multiword [B+next].
    let hwq = Instruction::special(SpecialOpcode::Hwq, Register::A);
    assert_eq!(instruction_size(encode_header(&hwq)), 1);
  }

  #[test]
  fn bytes_are_little_endian() {
    assert_eq!(unpack_bytes(&[0x7C61, 0x000F]), vec![0x61, 0x7C, 0x0F, 0x00]);
    assert_eq!(pack_bytes(&[0x61, 0x7C, 0x0F, 0x00]), vec![0x7C61, 0x000F]);
  }

  #[test]
  fn odd_trailing_byte_is_dropped() {
    assert_eq!(pack_bytes(&[0x34, 0x12, 0xFF]), vec![0x1234]);
    assert_eq!(pack_bytes(&[]), Vec::<Word>::new());
  }

  #[test]
  fn pack_inverts_unpack() {
    let code: Vec<Word> = vec![0x0000, 0xFFFF, 0x1234, 0x8001];
    assert_eq!(pack_bytes(&unpack_bytes(&code)), code);
  }
}
