/*!

  The DCPU uses a 16 bit word, and memory addresses words, not bytes. An instruction is one
  header word followed by up to two extra words. The header is laid out as

    ```text
    [a:6][b:5][opcode:5]
    ```

  with operand A in the high bits. Opcode 0x00 is an escape: the instruction is then "special",
  has no operand B, and its real operation is read from the B field. The sizes of the
  components are as follows:

    Opcode:     5 bits
    Operand B:  5 bits
    Operand A:  6 bits
    Extra word: 16 bits, for each multiword operand (A's first)

  Operand A has one more bit than B, and the upper half of A's range packs the literals -1 and
  0 through 30 directly into the header. Operand B is always a write target, so it has no use
  for packed literals.

  A program on disk is the flat sequence of encoded words, each stored little-endian, with no
  header or length prefix.

  The instruction is stored decoded as a fixed shape (an enum over basic and special forms with
  both extra words present), so that the size of an instruction is always computed from its
  operand kinds and never stored.

*/

mod binary;
mod instruction;
pub mod assembly;

pub use binary::{
  decode, decode_instruction, encode, encode_header, encode_instruction, instruction_size,
  is_conditional_header, pack_bytes, unpack_bytes,
  Byte, EncodedInstruction, SignedWord, Word, WORD_BYTES
};
pub use instruction::{
  Instruction, Opcode, OperandA, Register, SpecialOpcode, Value,
  OPCODE_COUNT, REGISTER_COUNT, SHORT_LITERAL_BASE, SHORT_LITERAL_MAX, SHORT_LITERAL_MINUS_ONE,
  SPECIAL_ESCAPE
};
pub use assembly::{assemble, parse_sexps, Assembly, SExp};
