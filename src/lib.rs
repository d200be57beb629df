/*!
  An emulator for the DCPU, a 16 bit word-addressed CPU with a stack, a hardware interrupt queue,
  and pluggable devices.

  Programs are loaded as little-endian byte images (`Dcpu::run`) or as words
  (`Dcpu::run_program`). `bytecode::assemble` turns S-expression assembly into words.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod bytecode;
pub mod dcpu;
pub mod error;
pub mod hardware;
pub mod memory;
pub mod symboltable;

use prettytable::format as TableFormat;

pub use crate::dcpu::{Cpu, Cycles, Dcpu, INITIAL_SP};
pub use crate::error::{AssemblyError, DcpuError, Result};
pub use crate::hardware::{Clock, Hardware, HardwareRegistry, TesterDevice};
pub use crate::memory::Memory;

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}
