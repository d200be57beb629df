/*!
  Hardware devices attached to the DCPU.

  A device is owned by the `HardwareRegistry` and never sees the engine itself. The engine hands
  it the `Cpu` (registers and interrupt queue) and `Memory` for the length of one call: once per
  step through `update`, and when the program executes `HWI` on the device's index through
  `interrupt`. A device raises a CPU interrupt by calling `Cpu::interrupt`, which queues it until
  the end of the step.
*/

mod clock;
mod tester;

pub use clock::Clock;
pub use tester::TesterDevice;

use tracing::debug;

use crate::bytecode::Word;
use crate::dcpu::{Cpu, Cycles};
use crate::error::{DcpuError, Result};
use crate::memory::Memory;

/// Index of a device in attachment order. HWQ and HWI take it in operand A.
pub type DeviceIndex = Word;

pub trait Hardware {
  /// The 32 bit hardware id reported by HWQ in A (low) and B (high).
  fn id(&self) -> u32;
  /// Reported by HWQ in C.
  fn version(&self) -> Word;
  /// The 32 bit manufacturer id reported by HWQ in X (low) and Y (high).
  fn manufacturer(&self) -> u32;

  /// Called once per CPU step, after the instruction. Returns the cycles it cost.
  fn update(&mut self, cpu: &mut Cpu, mem: &mut Memory) -> Cycles;

  /// Called when the program executes HWI on this device. Returns the cycles it cost on top of
  /// HWI's own.
  fn interrupt(&mut self, cpu: &mut Cpu, mem: &mut Memory) -> Cycles;
}

/// The attached devices, indexed by the order they were attached in.
#[derive(Default)]
pub struct HardwareRegistry {
  devices: Vec<Box<dyn Hardware>>,
}

impl HardwareRegistry {
  pub fn new() -> HardwareRegistry {
    HardwareRegistry { devices: Vec::new() }
  }

  /// Attaches `device` and returns its index, which stays valid for the life of the registry.
  pub fn attach(&mut self, device: Box<dyn Hardware>) -> DeviceIndex {
    let index = self.devices.len() as DeviceIndex;
    debug!(
      index,
      id = format_args!("0x{:08x}", device.id()),
      manufacturer = format_args!("0x{:08x}", device.manufacturer()),
      "attached device"
    );
    self.devices.push(device);
    index
  }

  pub fn len(&self) -> usize {
    self.devices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.devices.is_empty()
  }

  pub fn get(&self, index: DeviceIndex) -> Result<&(dyn Hardware + 'static)> {
    let count = self.devices.len();
    self.devices
      .get(index as usize)
      .map(|device| device.as_ref())
      .ok_or(DcpuError::DeviceIndexOutOfRange { index, count })
  }

  pub fn get_mut(&mut self, index: DeviceIndex) -> Result<&mut (dyn Hardware + 'static)> {
    let count = self.devices.len();
    self.devices
      .get_mut(index as usize)
      .map(|device| device.as_mut())
      .ok_or(DcpuError::DeviceIndexOutOfRange { index, count })
  }

  /// Updates every device in attachment order and returns the total cycles they spent.
  pub fn update_all(&mut self, cpu: &mut Cpu, mem: &mut Memory) -> Cycles {
    self.devices
      .iter_mut()
      .map(|device| device.update(cpu, mem))
      .sum()
  }

  pub fn iter(&self) -> impl Iterator<Item = &(dyn Hardware + 'static)> {
    self.devices.iter().map(|device| device.as_ref())
  }
}
