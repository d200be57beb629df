/*!
  A device for exercising the hardware interface from a guest program. It performs a handshake:

  1. HWI with A = 1 picks a key from the cycle counter, stores it in X, and raises an interrupt
     whose message is the low word of the device id.
  2. The next HWI, whatever A is, answers by pushing 123 if A holds the key and 0xFFFF otherwise.

  Outside a handshake, HWI with A = 0 stores 10 in X. The device never costs cycles.

  The key is the low byte of the cycle counter rather than a random draw, so a run is
  reproducible. A guest can therefore predict the key, and a key of 0 is as valid as any other.
*/

use tracing::debug;

use super::Hardware;
use crate::bytecode::{Register, Word};
use crate::dcpu::{Cpu, Cycles};
use crate::memory::Memory;

pub const TESTER_ID           : u32  = 0x7e57_0001;
pub const TESTER_VERSION      : Word = 1;
pub const TESTER_MANUFACTURER : u32  = 0;

/// Pushed when the program echoes the key back.
pub const HANDSHAKE_ACCEPTED : Word = 123;
pub const HANDSHAKE_REJECTED : Word = 0xFFFF;

const QUERY     : Word = 0;
const HANDSHAKE : Word = 1;
const QUERY_ANSWER : Word = 10;

#[derive(Default)]
pub struct TesterDevice {
  key: Option<Word>
}

impl TesterDevice {
  pub fn new() -> TesterDevice {
    TesterDevice { key: None }
  }
}

impl Hardware for TesterDevice {
  fn id(&self) -> u32 {
    TESTER_ID
  }

  fn version(&self) -> Word {
    TESTER_VERSION
  }

  fn manufacturer(&self) -> u32 {
    TESTER_MANUFACTURER
  }

  fn update(&mut self, _cpu: &mut Cpu, _mem: &mut Memory) -> Cycles {
    0
  }

  fn interrupt(&mut self, cpu: &mut Cpu, mem: &mut Memory) -> Cycles {
    if let Some(key) = self.key.take() {
      let answer = match cpu.register(Register::A) == key {
        true  => HANDSHAKE_ACCEPTED,
        false => HANDSHAKE_REJECTED
      };
      debug!(key, answer, "tester handshake answered");
      cpu.push(mem, answer);
      return 0;
    }

    match cpu.register(Register::A) {

      QUERY => cpu.set_register(Register::X, QUERY_ANSWER),

      HANDSHAKE => {
        let key = (cpu.cycles() & 0xFF) as Word;
        self.key = Some(key);
        cpu.set_register(Register::X, key);
        cpu.interrupt(TESTER_ID as Word);
      }

      _ => {}

    }
    0
  }
}
