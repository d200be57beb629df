//! The DCPU's address space: a flat array of 65536 words.

use std::ops::{Index, IndexMut};

use prettytable::Table;

use crate::bytecode::Word;
use crate::error::{DcpuError, Result};
use crate::TABLE_DISPLAY_FORMAT;

/// Number of words of memory.
pub const MEMORY_WORDS: usize = 0x10000;
pub const LAST_VALID_ADDRESS: Word = 0xFFFF;

/**
  Zero-initialised memory. Addresses are `Word`s, so every address is in range and address
  arithmetic done in `Word` wraps within the address space. No access can fail.
*/
pub struct Memory {
  words: Box<[Word]>,
}

impl Memory {
  pub fn new() -> Memory {
    Memory {
      words: vec![0; MEMORY_WORDS].into_boxed_slice()
    }
  }

  /**
    Copies `program` to the bottom of memory and returns its length in words. The run loop
    stops once PC reaches that length.
  */
  pub fn load_program(&mut self, program: &[Word]) -> Result<usize> {
    if program.len() > MEMORY_WORDS {
      return Err(DcpuError::ProgramTooLarge { words: program.len() });
    }
    self.words[..program.len()].copy_from_slice(program);
    Ok(program.len())
  }

  pub fn read(&self, address: Word) -> Word {
    self.words[address as usize]
  }

  pub fn write(&mut self, address: Word, value: Word) {
    self.words[address as usize] = value;
  }

  pub fn words(&self) -> &[Word] {
    &self.words
  }

  /// Memory from `address` to the top. Never empty.
  pub fn words_from(&self, address: Word) -> &[Word] {
    &self.words[address as usize..]
  }

  /// A table of the inclusive range `from..=to`, or `None` if the range is empty.
  pub fn dump_table(&self, from: Word, to: Word) -> Option<Table> {
    if from > to {
      return None;
    }
    Some(Memory::make_table((from..=to).map(|address| (address, self.read(address)))))
  }

  /// Prints the inclusive range `from..=to`. Does nothing if `from > to`.
  pub fn dump(&self, from: Word, to: Word) {
    if let Some(table) = self.dump_table(from, to) {
      table.printstd();
    }
  }

  /// A table of every word in `from..=to` that is not zero.
  pub fn non_null_table(&self, from: Word, to: Word) -> Table {
    let cells = (from..=to)
      .map(|address| (address, self.read(address)))
      .filter(|(_, word)| *word != 0);
    Memory::make_table(cells)
  }

  /// Prints every word in `from..=to` that is not zero.
  pub fn dump_non_null(&self, from: Word, to: Word) {
    self.non_null_table(from, to).printstd();
  }

  fn make_table(cells: impl Iterator<Item = (Word, Word)>) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (address, word) in cells {
      table.add_row(row![r->format!("0x{:04X}:", address), format!("{:04X}", word)]);
    }
    table
  }
}

impl Default for Memory {
  fn default() -> Self {
    Memory::new()
  }
}

impl Index<Word> for Memory {
  type Output = Word;

  fn index(&self, address: Word) -> &Word {
    &self.words[address as usize]
  }
}

impl IndexMut<Word> for Memory {
  fn index_mut(&mut self, address: Word) -> &mut Word {
    &mut self.words[address as usize]
  }
}
