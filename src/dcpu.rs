/*!
  The DCPU engine.

  `Cpu` is the register file and the interrupt queue: everything a device may touch. `Dcpu` pairs
  it with the attached hardware and executes instructions. Memory is owned by the caller and
  lent to every call that needs it, so the engine, the devices, and the host can all look at the
  same words without sharing ownership.

  Executing one instruction is:

  1. Fetch and decode at PC, bounded by the top of memory.
  2. Resolve operand A, then operand B, to `Location`s. Resolution has the stack side effects of
     PUSH and POP, and reports the extra cycles of operands with an extra word.
  3. Perform the operation. PC still holds the address of the executing instruction.
  4. Advance PC past the instruction unless the instruction wrote PC.
  5. Update every device in attachment order.
  6. If interrupts are not being queued, dispatch one queued interrupt.
*/

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use prettytable::Table;
use strum::IntoEnumIterator;
use tracing::{debug, error, trace};

use crate::address::Location;
use crate::bytecode::{
  decode_instruction, instruction_size, is_conditional_header, pack_bytes,
  Byte, Instruction, Opcode, OperandA, Register, SignedWord, SpecialOpcode, Value, Word,
  REGISTER_COUNT
};
use crate::error::{DcpuError, Result};
use crate::hardware::{DeviceIndex, Hardware, HardwareRegistry};
use crate::memory::{Memory, MEMORY_WORDS};
use crate::TABLE_DISPLAY_FORMAT;

pub type Cycles = u64;

/// The stack grows down from the top of memory. The first PUSH writes to 0xFFFE.
pub const INITIAL_SP: Word = 0xFFFF;

/// A resolved operand and the extra cycles resolving it cost.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Resolved {
  pub location : Location,
  pub cycles   : Cycles
}

impl Resolved {
  fn free(location: Location) -> Resolved {
    Resolved { location, cycles: 0 }
  }

  fn extra_word(location: Location) -> Resolved {
    Resolved { location, cycles: 1 }
  }
}

// region Cpu

pub struct Cpu {
  registers       : [Word; REGISTER_COUNT],
  pc              : Word,
  sp              : Word,
  ex              : Word,
  /// Interrupt handler address. 0 means interrupts are dropped.
  ia              : Word,
  cycles          : Cycles,
  interrupt_queue : VecDeque<Word>,
  /// While set, interrupts are queued instead of dispatched.
  queueing        : bool,
  /// Set by every write to PC during the current instruction.
  jumped          : bool,
}

impl Cpu {
  pub fn new() -> Cpu {
    Cpu {
      registers       : [0; REGISTER_COUNT],
      pc              : 0,
      sp              : INITIAL_SP,
      ex              : 0,
      ia              : 0,
      cycles          : 0,
      interrupt_queue : VecDeque::new(),
      queueing        : false,
      jumped          : false,
    }
  }

  // region Accessors

  pub fn register(&self, register: Register) -> Word {
    self.registers[register.idx()]
  }

  pub fn set_register(&mut self, register: Register, value: Word) {
    self.registers[register.idx()] = value;
  }

  pub fn pc(&self) -> Word {
    self.pc
  }

  /// Every write to PC counts as a jump, including a write of its current value.
  pub fn set_pc(&mut self, address: Word) {
    self.pc = address;
    self.jumped = true;
  }

  pub fn sp(&self) -> Word {
    self.sp
  }

  pub fn set_sp(&mut self, address: Word) {
    self.sp = address;
  }

  pub fn ex(&self) -> Word {
    self.ex
  }

  pub fn ia(&self) -> Word {
    self.ia
  }

  /// Total cycles spent so far.
  pub fn cycles(&self) -> Cycles {
    self.cycles
  }

  pub fn queued_interrupts(&self) -> usize {
    self.interrupt_queue.len()
  }

  /// Whether interrupts are being queued rather than dispatched.
  pub fn is_queueing(&self) -> bool {
    self.queueing
  }

  // endregion

  // region Stack

  pub fn push(&mut self, mem: &mut Memory, value: Word) {
    self.sp = self.sp.wrapping_sub(1);
    mem.write(self.sp, value);
  }

  pub fn pop(&mut self, mem: &Memory) -> Word {
    let value = mem.read(self.sp);
    self.sp = self.sp.wrapping_add(1);
    value
  }

  // endregion

  // region Locations

  pub fn read(&self, mem: &Memory, location: Location) -> Word {
    match location {
      Location::Register(register) => self.register(register),
      Location::Sp                 => self.sp,
      Location::Pc                 => self.pc,
      Location::Ex                 => self.ex,
      Location::Memory(address)    => mem.read(address),
      Location::Literal(value)     => value,
    }
  }

  /// Writes to a literal are silently ignored.
  pub fn write(&mut self, mem: &mut Memory, location: Location, value: Word) {
    match location {
      Location::Register(register) => self.set_register(register, value),
      Location::Sp                 => self.sp = value,
      Location::Pc                 => self.set_pc(value),
      Location::Ex                 => self.ex = value,
      Location::Memory(address)    => mem.write(address, value),
      Location::Literal(_)         => {}
    }
  }

  pub fn resolve_operand_a(&mut self, operand: OperandA, word: Word) -> Resolved {
    match operand {
      OperandA::Literal(value) => Resolved::free(Location::Literal(value)),
      OperandA::Value(value)   => self.resolve(value, word, true)
    }
  }

  /**
    Resolves an operand kind to the location it names. `word` is the operand's extra word, and
    `is_a` selects POP over PUSH for `Value::PushPop`. Address arithmetic wraps, so the result
    is always a valid address.
  */
  pub fn resolve(&mut self, value: Value, word: Word, is_a: bool) -> Resolved {
    let code = value.code();
    match value {

      Value::PushPop => match is_a {
        true => {
          let location = Location::Memory(self.sp);
          self.sp = self.sp.wrapping_add(1);
          Resolved::free(location)
        }
        false => {
          self.sp = self.sp.wrapping_sub(1);
          Resolved::free(Location::Memory(self.sp))
        }
      },

      Value::Peek        => Resolved::free(Location::Memory(self.sp)),
      Value::Pick        => Resolved::extra_word(Location::Memory(self.sp.wrapping_add(word))),
      Value::Sp          => Resolved::free(Location::Sp),
      Value::Pc          => Resolved::free(Location::Pc),
      Value::Ex          => Resolved::free(Location::Ex),
      Value::Next        => Resolved::extra_word(Location::Memory(word)),
      Value::NextLiteral => Resolved::extra_word(Location::Literal(word)),

      _ if code < 0x08 => Resolved::free(Location::Register(Register::from_bits(code))),

      _ if code < 0x10 => {
        let address = self.register(Register::from_bits(code));
        Resolved::free(Location::Memory(address))
      }

      _ => {
        let address = self.register(Register::from_bits(code)).wrapping_add(word);
        Resolved::extra_word(Location::Memory(address))
      }

    }
  }

  // endregion

  // region Interrupts

  /// Raises an interrupt from outside the program. It is queued and dispatched at the end of a
  /// step once interrupts are no longer being queued.
  pub fn interrupt(&mut self, message: Word) {
    debug!(message, queued = self.interrupt_queue.len() + 1, "interrupt queued");
    self.interrupt_queue.push_back(message);
  }

  /// INT: dropped without a handler, queued while queueing, dispatched otherwise.
  fn software_interrupt(&mut self, mem: &mut Memory, message: Word, return_to: Word) {
    if self.ia == 0 {
      debug!(message, "interrupt dropped, no handler installed");
      return;
    }
    match self.queueing {
      true  => self.interrupt(message),
      false => self.dispatch(mem, message, return_to)
    }
  }

  /// Enters the handler: pushes the return address and A, then jumps to IA with the message in A.
  fn dispatch(&mut self, mem: &mut Memory, message: Word, return_to: Word) {
    debug!(message, handler = self.ia, return_to, "interrupt dispatched");
    self.queueing = true;
    self.push(mem, return_to);
    let a = self.register(Register::A);
    self.push(mem, a);
    let handler = self.ia;
    self.set_pc(handler);
    self.set_register(Register::A, message);
  }

  fn return_from_interrupt(&mut self, mem: &Memory) {
    self.queueing = false;
    let a = self.pop(mem);
    self.set_register(Register::A, a);
    let pc = self.pop(mem);
    self.set_pc(pc);
  }

  /// Dispatches at most one queued interrupt, returning to the current PC.
  fn dispatch_queued(&mut self, mem: &mut Memory) {
    if self.queueing {
      return;
    }
    if let Some(message) = self.interrupt_queue.pop_front() {
      match self.ia {
        0 => debug!(message, "queued interrupt dropped, no handler installed"),
        _ => {
          let pc = self.pc;
          self.dispatch(mem, message, pc);
        }
      }
    }
  }

  // endregion

  pub fn register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for register in Register::iter() {
      table.add_row(row![r->format!("{} =", register), format!("0x{:04X}", self.register(register))]);
    }
    table.add_row(row![r->"PC =", format!("0x{:04X}", self.pc)]);
    table.add_row(row![r->"SP =", format!("0x{:04X}", self.sp)]);
    table.add_row(row![r->"EX =", format!("0x{:04X}", self.ex)]);
    table.add_row(row![r->"IA =", format!("0x{:04X}", self.ia)]);
    table
  }
}

impl Default for Cpu {
  fn default() -> Self {
    Cpu::new()
  }
}

// endregion

// region Dcpu

/// What an operation does with its operands: store a result, or decide whether to skip.
enum Outcome {
  Store {
    value : Word,
    /// The new EX, for operations that set it.
    ex    : Option<Word>
  },
  Branch(bool)
}

fn ex_flag(condition: bool, value: Word) -> Word {
  match condition {
    true  => value,
    false => 0
  }
}

/// Computes a basic operation on operand values `b` and `a`.
fn operate(opcode: Opcode, b: Word, a: Word, ex: Word) -> Outcome {
  let signed_b = b as SignedWord;
  let signed_a = a as SignedWord;

  let store = |value: Word, ex: Option<Word>| Outcome::Store { value, ex };

  match opcode {
    Opcode::Set => store(a, None),

    Opcode::Add => {
      let (sum, carry) = b.overflowing_add(a);
      store(sum, Some(ex_flag(carry, 1)))
    }

    Opcode::Sub => {
      let (difference, borrow) = b.overflowing_sub(a);
      store(difference, Some(ex_flag(borrow, 0xFFFF)))
    }

    Opcode::Mul => {
      let product = b as u32 * a as u32;
      store(product as Word, Some((product >> 16) as Word))
    }

    Opcode::Mli => {
      let product = signed_b as i32 * signed_a as i32;
      store(product as Word, Some((product >> 16) as Word))
    }

    Opcode::Div => match a {
      0 => store(0, Some(0)),
      _ => store(b / a, Some((((b as u32) << 16) / a as u32) as Word))
    },

    Opcode::Dvi => match a {
      0 => store(0, Some(0)),
      _ => {
        let (b, a) = (signed_b as i64, signed_a as i64);
        store((b / a) as Word, Some(((b << 16) / a) as Word))
      }
    },

    Opcode::Mod => match a {
      0 => store(0, Some(0)),
      _ => store(b % a, None)
    },

    // Division by zero leaves EX alone here, unlike MOD.
    Opcode::Mdi => match a {
      0 => store(0, None),
      _ => store((signed_b as i32 % signed_a as i32) as Word, None)
    },

    Opcode::And => store(b & a, None),
    Opcode::Bor => store(b | a, None),
    Opcode::Xor => store(b ^ a, None),

    Opcode::Shr => store(
      b.checked_shr(a as u32).unwrap_or(0),
      Some(((b as u32) << 16).checked_shr(a as u32).unwrap_or(0) as Word)
    ),

    Opcode::Asr => store(
      (signed_b >> a.min(15)) as Word,
      Some(((b as u32) << 16).checked_shr(a as u32).unwrap_or(0) as Word)
    ),

    Opcode::Shl => store(
      b.checked_shl(a as u32).unwrap_or(0),
      Some(((b as u32).checked_shl(a as u32).unwrap_or(0) >> 16) as Word)
    ),

    Opcode::Ifb => Outcome::Branch((b & a) != 0),
    Opcode::Ifc => Outcome::Branch((b & a) == 0),
    Opcode::Ife => Outcome::Branch(b == a),
    Opcode::Ifn => Outcome::Branch(b != a),
    Opcode::Ifg => Outcome::Branch(b > a),
    Opcode::Ifa => Outcome::Branch(signed_b > signed_a),
    Opcode::Ifl => Outcome::Branch(b < a),
    Opcode::Ifu => Outcome::Branch(signed_b < signed_a),

    Opcode::Adx => {
      let sum = b as u32 + a as u32 + ex as u32;
      store(sum as Word, Some(ex_flag(sum > 0xFFFF, 1)))
    }

    Opcode::Sbx => {
      // An incoming EX of 0xFFFF is the borrow of a previous SUB or SBX.
      let difference = b as i32 - a as i32 + ex as SignedWord as i32;
      let ex = match difference {
        d if d < 0      => 0xFFFF,
        d if d > 0xFFFF => 1,
        _               => 0
      };
      store(difference as Word, Some(ex))
    }

    Opcode::Sti | Opcode::Std => store(a, None),
  }
}

/// The CPU together with its attached hardware.
pub struct Dcpu {
  cpu      : Cpu,
  hardware : HardwareRegistry,
}

impl Dcpu {
  pub fn new() -> Dcpu {
    Dcpu {
      cpu      : Cpu::new(),
      hardware : HardwareRegistry::new(),
    }
  }

  /// Attaches a device and returns the index HWQ and HWI know it by.
  pub fn attach(&mut self, device: Box<dyn Hardware>) -> DeviceIndex {
    self.hardware.attach(device)
  }

  pub fn cpu(&self) -> &Cpu {
    &self.cpu
  }

  pub fn cpu_mut(&mut self) -> &mut Cpu {
    &mut self.cpu
  }

  pub fn hardware(&self) -> &HardwareRegistry {
    &self.hardware
  }

  /// Queues an interrupt from the host.
  pub fn interrupt(&mut self, message: Word) {
    self.cpu.interrupt(message);
  }

  /**
    Executes the instruction at PC, updates the devices, and dispatches a queued interrupt if
    interrupts are not being queued. Returns the cycles the step cost.
  */
  pub fn step(&mut self, mem: &mut Memory) -> Result<Cycles> {
    let pc = self.cpu.pc;
    let instruction = decode_instruction(mem.words_from(pc))?;
    let next = pc.wrapping_add(instruction.word_count());

    self.cpu.jumped = false;
    let mut cycles = self.evaluate(mem, &instruction, next)?;
    debug_assert!(cycles > 0, "{} cost no cycles", instruction);
    if !self.cpu.jumped {
      self.cpu.pc = next;
    }
    trace!(pc = format_args!("0x{:04x}", pc), instruction = %instruction, cycles, "executed");
    self.cpu.cycles += cycles;

    let device_cycles = self.hardware.update_all(&mut self.cpu, mem);
    self.cpu.cycles += device_cycles;
    cycles += device_cycles;

    self.cpu.dispatch_queued(mem);

    #[cfg(feature = "trace_computation")]
      {
        println!("{}\n{}", instruction, self);
      }

    Ok(cycles)
  }

  /**
    Runs a program image given as little-endian bytes. See `run_program`.
  */
  pub fn run(&mut self, mem: &mut Memory, bytes: &[Byte]) -> Result<Cycles> {
    let program = pack_bytes(bytes);
    self.run_program(mem, &program)
  }

  /**
    Loads `program` at address 0 and steps until PC leaves it, that is, until PC is at or past
    the program's length. At that point no interrupt may be queued or being handled. Returns the
    total cycles spent.
  */
  pub fn run_program(&mut self, mem: &mut Memory, program: &[Word]) -> Result<Cycles> {
    let length = mem.load_program(program)?;
    debug!(words = length, "program loaded");

    while (self.cpu.pc as usize) < length {
      if let Err(e) = self.step(mem) {
        error!(pc = format_args!("0x{:04x}", self.cpu.pc), "{}", e);
        return Err(e);
      }
    }

    if !self.cpu.interrupt_queue.is_empty() || self.cpu.queueing {
      let e = DcpuError::PendingInterrupts {
        queued         : self.cpu.interrupt_queue.len(),
        handler_active : self.cpu.queueing
      };
      error!("{}", e);
      return Err(e);
    }

    debug!(cycles = self.cpu.cycles, "program finished");
    Ok(self.cpu.cycles)
  }

  /// Performs `instruction`, whose successor is at `next`, and returns its cost.
  fn evaluate(&mut self, mem: &mut Memory, instruction: &Instruction, next: Word) -> Result<Cycles> {
    match instruction {

      Instruction::Basic { opcode, b, a, word_b, word_a } => {
        let source = self.cpu.resolve_operand_a(*a, *word_a);
        let target = self.cpu.resolve(*b, *word_b, false);
        let a_value = self.cpu.read(mem, source.location);
        let b_value = self.cpu.read(mem, target.location);
        let mut cycles = opcode.base_cycles() as Cycles + source.cycles + target.cycles;

        match operate(*opcode, b_value, a_value, self.cpu.ex) {

          Outcome::Branch(true) => {}

          Outcome::Branch(false) => cycles += self.skip(mem, next),

          Outcome::Store { value, ex } => {
            self.cpu.write(mem, target.location, value);
            if let Some(ex) = ex {
              self.cpu.ex = ex;
            }
            let step = match opcode {
              Opcode::Sti => 1,
              Opcode::Std => 0xFFFF,
              _ => 0
            };
            if step != 0 {
              for register in [Register::I, Register::J] {
                let value = self.cpu.register(register).wrapping_add(step);
                self.cpu.set_register(register, value);
              }
            }
          }

        }
        Ok(cycles)
      }

      Instruction::Special { opcode, a, word_a } => {
        let source = self.cpu.resolve_operand_a(*a, *word_a);
        let a_value = self.cpu.read(mem, source.location);
        let mut cycles = opcode.base_cycles() as Cycles + source.cycles;

        match opcode {

          SpecialOpcode::Jsr => {
            self.cpu.push(mem, next);
            self.cpu.set_pc(a_value);
          }

          SpecialOpcode::Int => self.cpu.software_interrupt(mem, a_value, next),

          SpecialOpcode::Iag => {
            let ia = self.cpu.ia;
            self.cpu.write(mem, source.location, ia);
          }

          SpecialOpcode::Ias => self.cpu.ia = a_value,

          SpecialOpcode::Rfi => self.cpu.return_from_interrupt(mem),

          SpecialOpcode::Iaq => self.cpu.queueing = a_value != 0,

          SpecialOpcode::Hwn => {
            let count = self.hardware.len() as Word;
            self.cpu.write(mem, source.location, count);
          }

          SpecialOpcode::Hwq => {
            let device = self.hardware.get(a_value)?;
            let (id, version, manufacturer) = (device.id(), device.version(), device.manufacturer());
            self.cpu.set_register(Register::A, id as Word);
            self.cpu.set_register(Register::B, (id >> 16) as Word);
            self.cpu.set_register(Register::C, version);
            self.cpu.set_register(Register::X, manufacturer as Word);
            self.cpu.set_register(Register::Y, (manufacturer >> 16) as Word);
          }

          SpecialOpcode::Hwi => {
            let device = self.hardware.get_mut(a_value)?;
            cycles += device.interrupt(&mut self.cpu, mem);
          }

        }
        Ok(cycles)
      }

    }
  }

  /**
    Skips the instruction at `next`, and keeps skipping for as long as the skipped instructions
    are themselves conditionals. Returns the number of instructions skipped, which is also the
    extra cycles the skip costs.
  */
  fn skip(&mut self, mem: &Memory, next: Word) -> Cycles {
    let mut pc = next;
    let mut skipped: Cycles = 0;
    loop {
      let header = mem.read(pc);
      pc = pc.wrapping_add(instruction_size(header));
      skipped += 1;
      // A memory full of conditionals would otherwise never stop.
      if !is_conditional_header(header) || skipped >= MEMORY_WORDS as Cycles {
        break;
      }
    }
    self.cpu.set_pc(pc);
    skipped
  }

  fn device_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Index", ubl->"Id", ubl->"Version", ubl->"Manufacturer"]);

    for (index, device) in self.hardware.iter().enumerate() {
      table.add_row(row![
        r->format!("{} =", index),
        format!("0x{:08X}", device.id()),
        format!("{}", device.version()),
        format!("0x{:08X}", device.manufacturer())
      ]);
    }
    table
  }
}

impl Default for Dcpu {
  fn default() -> Self {
    Dcpu::new()
  }
}

impl Display for Dcpu {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.cpu.register_table();
    let device_table   = self.device_table();

    let mut combined_table = table!([register_table, device_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Hardware"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let queueing = match self.cpu.queueing {
      true  => "queueing",
      false => "dispatching"
    };

    write!(
      f,
      "Cycles: {}\tInterrupts: {} queued, {}\n{}",
      self.cpu.cycles, self.cpu.interrupt_queue.len(), queueing, combined_table
    )
  }
}

// endregion
