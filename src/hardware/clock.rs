/*!
  The generic clock. It ticks at a programmable fraction of 60 Hz, counts its ticks, and can
  raise an interrupt on every tick.

  | A | HWI behavior                                                           |
  |---|------------------------------------------------------------------------|
  | 0 | Tick every B/60ths of a second. B = 0 stops the clock. Resets the count. |
  | 1 | Store the number of ticks since the last A = 0 call in C.              |
  | 2 | Interrupt with message B on every tick. B = 0 disables interrupts.     |
*/

use std::time::{Duration, Instant};

use tracing::trace;

use super::Hardware;
use crate::bytecode::{Register, Word};
use crate::dcpu::{Cpu, Cycles};
use crate::memory::Memory;

pub const CLOCK_ID           : u32  = 0x12d0_b402;
pub const CLOCK_VERSION      : Word = 1;
pub const CLOCK_MANUFACTURER : u32  = 0x0FE1_24C0;
/// The base rate the period divides.
pub const TICK_RATE_HZ       : u64  = 60;

const SET_PERIOD    : Word = 0;
const GET_TICKS     : Word = 1;
const SET_INTERRUPT : Word = 2;

pub struct Clock {
  /// Sixtieths of a second between ticks. 0 when stopped.
  period    : Word,
  ticks     : Word,
  /// Interrupt message, 0 when interrupts are off.
  message   : Word,
  last_tick : Instant
}

impl Clock {
  pub fn new() -> Clock {
    Clock {
      period    : 0,
      ticks     : 0,
      message   : 0,
      last_tick : Instant::now()
    }
  }

  fn interval(&self) -> Duration {
    Duration::from_nanos(1_000_000_000 * self.period as u64 / TICK_RATE_HZ)
  }
}

impl Default for Clock {
  fn default() -> Self {
    Clock::new()
  }
}

impl Hardware for Clock {
  fn id(&self) -> u32 {
    CLOCK_ID
  }

  fn version(&self) -> Word {
    CLOCK_VERSION
  }

  fn manufacturer(&self) -> u32 {
    CLOCK_MANUFACTURER
  }

  fn update(&mut self, cpu: &mut Cpu, _mem: &mut Memory) -> Cycles {
    if self.period == 0 {
      return 0;
    }

    let interval = self.interval();
    if self.last_tick.elapsed() >= interval {
      self.last_tick += interval;
      self.ticks = self.ticks.wrapping_add(1);
      trace!(ticks = self.ticks, "clock tick");
      if self.message != 0 {
        cpu.interrupt(self.message);
      }
    }
    1
  }

  fn interrupt(&mut self, cpu: &mut Cpu, _mem: &mut Memory) -> Cycles {
    match cpu.register(Register::A) {

      SET_PERIOD => {
        self.period    = cpu.register(Register::B);
        self.ticks     = 0;
        self.last_tick = Instant::now();
      }

      GET_TICKS => cpu.set_register(Register::C, self.ticks),

      SET_INTERRUPT => self.message = cpu.register(Register::B),

      _ => {}

    }
    1
  }
}
