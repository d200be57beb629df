/*!
  The human readable form of a DCPU program is a sequence of S-expressions, one per instruction.
  This module parses that text and assembles it into `Instruction`s, leveraging the `strum`
  derives of the opcode enums for the mnemonics.

  The language is given by the following EBNF:
    ```text
    <program>  ::=  <list>*
    <list>     ::=  '(' <item>* ')'
    <item>     ::=  <number> | <symbol> | <list>
    <number>   ::=  ('+' | '-')? ( '0x' <hex>+ | '0' <octal>+ | <decimal>+ )
    <symbol>   ::=  (<alpha> | '_' | '.') (<alphanumeric> | '_' | '.' | '-')*
    ```

  Special lexical forms, which are ignored:
    ```text
    <eol_comment>  ::= ';' [^\n\r]*
    <whitespace>   ::= [ \t\r\n]+
    ```

  Every top level list is either a label definition or an instruction:
    ```text
    (label name)      binds `name` to the address of the next instruction
    (op b a)          basic instruction, e.g. (set x 5), (add (ref i 2) pop)
    (op a)            special instruction, e.g. (jsr sub), (int 1), (rfi 0)
    ```

  Mnemonics and register names are case insensitive; labels are not. An operand is a register
  (`a`..`j`, `sp`, `pc`, `ex`), `push` (operand B only), `pop` (operand A only), `peek`, a number,
  a label, or a reference:
    ```text
    (ref R)           [R]
    (ref R n)         [R + n]
    (ref sp)          PEEK
    (ref sp n)        PICK n
    (ref n)           [n]
    (ref label)       [label]
    ```

  A number in operand A uses a packed literal when it is -1 or 0 through 30 and otherwise an extra
  word. A label always takes an extra word, so every instruction's size is known as soon as it is
  parsed: the first pass lays out the code and records the labels, and the second fills in the
  extra words that refer to labels.
*/

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::num::TryFromIntError;
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{
    is_not,
    tag_no_case,
    take_while
  },
  character::complete::{
    char as one_char,
    digit1,
    hex_digit1,
    multispace1,
    oct_digit1,
    satisfy
  },
  combinator::{
    map,
    map_res,
    not,
    opt,
    recognize,
    value
  },
  multi::many0,
  sequence::{
    delimited,
    pair,
    preceded,
    terminated
  },
  IResult
};
use string_cache::DefaultAtom;
use tracing::debug;

use super::{encode, Instruction, Opcode, OperandA, Register, SpecialOpcode, Value, Word};
use crate::error::AssemblyError;
use crate::symboltable::SymbolTable;

/// The parse tree of assembly text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SExp {
  Number(Word),
  Symbol(DefaultAtom),
  List(Vec<SExp>),
}

impl Display for SExp {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      SExp::Number(n) => write!(f, "{}", n),
      SExp::Symbol(s) => write!(f, "{}", s),
      SExp::List(items) => {
        write!(
          f,
          "({})",
          items.iter().map(SExp::to_string).collect::<Vec<String>>().join(" ")
        )
      }
    }
  }
}

/// The output of assembly: the program and the labels it defines.
#[derive(Debug)]
pub struct Assembly {
  pub instructions : Vec<Instruction>,
  pub symbols      : SymbolTable
}

impl Assembly {
  /// The program as the word stream the CPU loads.
  pub fn encode(&self) -> Vec<Word> {
    encode(&self.instructions)
  }
}

// region Parser

/// Parses `text` into its top level lists. On failure, reports the byte offset at which the
/// unparsable input starts.
pub fn parse_sexps(text: &str) -> Result<Vec<SExp>, AssemblyError> {
  let result = preceded(pskip, many0(wst(map(plist, SExp::List))))(text);
  match result {
    Ok((rest, sexps)) if rest.is_empty() => Ok(sexps),
    Ok((rest, _)) => Err(AssemblyError::Syntax { offset: text.len() - rest.len() }),
    Err(_) => Err(AssemblyError::Syntax { offset: 0 })
  }
}

/// <list> ::= '(' <item>* ')'
fn plist(text: &str) -> IResult<&str, Vec<SExp>> {
  delimited(
    wst(one_char('(')),
    many0(wst(pitem)),
    one_char(')')
  )(text)
}

/// <item> ::= <number> | <symbol> | <list>
fn pitem(text: &str) -> IResult<&str, SExp> {
  alt((
    map(plist, SExp::List),
    map(pnumber, SExp::Number),
    map(psymbol, |out| SExp::Symbol(DefaultAtom::from(out)))
  ))(text)
}

/**
  <number> ::= ('+' | '-')? ( '0x' <hex>+ | '0' <octal>+ | <decimal>+ )

  A number must fit in a word, read either as signed or as unsigned, and cannot run into a symbol.
*/
fn pnumber(text: &str) -> IResult<&str, Word> {
  map_res(
    terminated(
      pair(
        opt(alt((one_char('+'), one_char('-')))),
        alt((
          preceded(
            tag_no_case("0x"),
            map_res(hex_digit1, |digits: &str| i64::from_str_radix(digits, 16))
          ),
          preceded(
            one_char('0'),
            map_res(oct_digit1, |digits: &str| i64::from_str_radix(digits, 8))
          ),
          map_res(digit1, |digits: &str| digits.parse::<i64>())
        ))
      ),
      not(satisfy(is_symbol_char))
    ),
    |(sign, magnitude): (Option<char>, i64)| to_word(sign == Some('-'), magnitude)
  )(text)
}

fn to_word(negative: bool, magnitude: i64) -> Result<Word, TryFromIntError> {
  match negative {
    true  => i16::try_from(-magnitude).map(|v| v as Word),
    false => Word::try_from(magnitude)
  }
}

/// <symbol> ::= (<alpha> | '_' | '.') (<alphanumeric> | '_' | '.' | '-')*
fn psymbol(text: &str) -> IResult<&str, &str> {
  recognize(pair(
    satisfy(|c: char| c.is_alphabetic() || c == '_' || c == '.'),
    take_while(is_symbol_char)
  ))(text)
}

fn is_symbol_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn wst<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
  where
  F: FnMut(&'a str) -> IResult<&'a str, O>,
{
  terminated(inner, pskip)
}

fn pskip(text: &str) -> IResult<&str, ()> {
  value(
    (),
    many0(alt((value((), multispace1), peol_comment)))
  )(text)
}

/// <eol_comment> ::= ';' [^\n\r]*
fn peol_comment(text: &str) -> IResult<&str, ()> {
  value((), pair(one_char(';'), opt(is_not("\n\r"))))(text)
}

// endregion

// region Assembler

/// Which side of an instruction an operand is on. PUSH and POP are only meaningful on one side.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Side {
  A,
  B
}

/// A resolved operand kind, its extra word, and the label the extra word must be patched with.
struct Operand {
  value : Value,
  word  : Word,
  label : Option<DefaultAtom>
}

impl Operand {
  fn plain(value: Value) -> Operand {
    Operand { value, word: 0, label: None }
  }

  fn with_word(value: Value, word: Word) -> Operand {
    Operand { value, word, label: None }
  }

  fn with_label(value: Value, label: DefaultAtom) -> Operand {
    Operand { value, word: 0, label: Some(label) }
  }

  /// As operand A, an unlabelled constant that fits is packed into the header.
  fn into_operand_a(self) -> (OperandA, Word, Option<DefaultAtom>) {
    if self.value == Value::NextLiteral && self.label.is_none() {
      if let Some(packed) = OperandA::literal(self.word) {
        return (packed, 0, None);
      }
    }
    (OperandA::Value(self.value), self.word, self.label)
  }
}

/// An instruction whose label references are not yet resolved.
struct Pending {
  instruction : Instruction,
  label_a     : Option<DefaultAtom>,
  label_b     : Option<DefaultAtom>
}

/// Parses and assembles `text`.
pub fn assemble(text: &str) -> Result<Assembly, AssemblyError> {
  let sexps = parse_sexps(text)?;

  // First pass: lay out the code and record the labels.
  let mut symbols = SymbolTable::new();
  let mut pending: Vec<Pending> = Vec::with_capacity(sexps.len());
  let mut address: Word = 0;

  for sexp in &sexps {
    match label_definition(sexp)? {
      Some(label) => {
        debug!(label = %label, address, "label");
        symbols.insert(label, address)?;
      }
      None => {
        let item = assemble_instruction(sexp)?;
        address = address.wrapping_add(item.instruction.word_count());
        pending.push(item);
      }
    }
  }

  // Second pass: patch label references.
  let mut instructions = Vec::with_capacity(pending.len());
  for item in pending {
    let mut instruction = item.instruction;
    if let Some(label) = item.label_a {
      instruction = instruction.with_word_a(resolve(&symbols, &label)?);
    }
    if let Some(label) = item.label_b {
      instruction = instruction.with_word_b(resolve(&symbols, &label)?);
    }
    instructions.push(instruction);
  }

  Ok(Assembly { instructions, symbols })
}

fn resolve(symbols: &SymbolTable, label: &DefaultAtom) -> Result<Word, AssemblyError> {
  symbols
    .get_address(label)
    .ok_or_else(|| AssemblyError::UnresolvedLabel(label.to_string()))
}

/// `Some(name)` if `sexp` is `(label name)`.
fn label_definition(sexp: &SExp) -> Result<Option<DefaultAtom>, AssemblyError> {
  match sexp {
    SExp::List(items) => match items.as_slice() {
      [SExp::Symbol(head), rest @ ..] if (**head).eq_ignore_ascii_case("label") => {
        match rest {
          [SExp::Symbol(name)] => Ok(Some(name.clone())),
          _ => Err(AssemblyError::WrongArity {
            mnemonic : "label".to_string(),
            expected : 1,
            found    : rest.len()
          })
        }
      }
      _ => Ok(None)
    },
    _ => Ok(None)
  }
}

fn assemble_instruction(sexp: &SExp) -> Result<Pending, AssemblyError> {
  let (mnemonic, operands) = match sexp {
    SExp::List(items) => match items.as_slice() {
      [SExp::Symbol(head), operands @ ..] => (head, operands),
      _ => return Err(AssemblyError::UnknownMnemonic(sexp.to_string()))
    },
    _ => return Err(AssemblyError::UnknownMnemonic(sexp.to_string()))
  };

  if let Ok(opcode) = Opcode::from_str(mnemonic) {
    let (b, a) = match operands {
      [b, a] => (b, a),
      _ => return Err(wrong_arity(mnemonic, 2, operands.len()))
    };
    // A is resolved first so that its extra word is laid out first.
    let (a, word_a, label_a) = parse_operand(a, Side::A)?.into_operand_a();
    let b = parse_operand(b, Side::B)?;
    return Ok(Pending {
      instruction : Instruction::Basic { opcode, b: b.value, a, word_b: b.word, word_a },
      label_a,
      label_b     : b.label
    });
  }

  if let Ok(opcode) = SpecialOpcode::from_str(mnemonic) {
    let a = match operands {
      [a] => a,
      _ => return Err(wrong_arity(mnemonic, 1, operands.len()))
    };
    let (a, word_a, label_a) = parse_operand(a, Side::A)?.into_operand_a();
    return Ok(Pending {
      instruction : Instruction::Special { opcode, a, word_a },
      label_a,
      label_b     : None
    });
  }

  Err(AssemblyError::UnknownMnemonic(mnemonic.to_string()))
}

fn wrong_arity(mnemonic: &DefaultAtom, expected: usize, found: usize) -> AssemblyError {
  AssemblyError::WrongArity { mnemonic: mnemonic.to_string(), expected, found }
}

fn parse_operand(sexp: &SExp, side: Side) -> Result<Operand, AssemblyError> {
  match sexp {

    SExp::Number(n) => Ok(Operand::with_word(Value::NextLiteral, *n)),

    SExp::Symbol(name) => {
      if let Some(value) = named_value(name) {
        return Ok(Operand::plain(value));
      }
      match ((**name).to_ascii_lowercase().as_str(), side) {
        ("peek", _)      => Ok(Operand::plain(Value::Peek)),
        ("push", Side::B)
        | ("pop", Side::A) => Ok(Operand::plain(Value::PushPop)),
        ("push", Side::A)
        | ("pop", Side::B) => Err(AssemblyError::UnknownOperand(name.to_string())),
        _                => Ok(Operand::with_label(Value::NextLiteral, name.clone()))
      }
    }

    SExp::List(items) => match items.as_slice() {
      [SExp::Symbol(head), rest @ ..] if (**head).eq_ignore_ascii_case("ref") => {
        parse_reference(sexp, rest)
      }
      _ => Err(AssemblyError::UnknownOperand(sexp.to_string()))
    }

  }
}

/// The body of a `(ref ...)` form.
fn parse_reference(sexp: &SExp, body: &[SExp]) -> Result<Operand, AssemblyError> {
  let malformed = || AssemblyError::MalformedReference(sexp.to_string());

  match body {
    [SExp::Number(address)] => Ok(Operand::with_word(Value::Next, *address)),

    [SExp::Symbol(name)] => {
      match named_value(name) {
        Some(Value::Sp) => Ok(Operand::plain(Value::Peek)),
        Some(value) => {
          let register = register_of(value).ok_or_else(malformed)?;
          Ok(Operand::plain(Value::indirect(register)))
        }
        None => Ok(Operand::with_label(Value::Next, name.clone()))
      }
    }

    [SExp::Symbol(name), SExp::Number(offset)] => {
      match named_value(name) {
        Some(Value::Sp) => Ok(Operand::with_word(Value::Pick, *offset)),
        Some(value) => {
          let register = register_of(value).ok_or_else(malformed)?;
          Ok(Operand::with_word(Value::offset(register), *offset))
        }
        None => Err(malformed())
      }
    }

    _ => Err(malformed())
  }
}

/// Registers, general purpose or not, by name.
fn named_value(name: &str) -> Option<Value> {
  if let Ok(register) = Register::from_str(name) {
    return Some(Value::register(register));
  }
  match name.to_ascii_lowercase().as_str() {
    "sp" => Some(Value::Sp),
    "pc" => Some(Value::Pc),
    "ex" => Some(Value::Ex),
    _    => None
  }
}

fn register_of(value: Value) -> Option<Register> {
  match value.code() < 0x08 {
    true  => Some(Register::from_bits(value.code())),
    false => None
  }
}

// endregion
