use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::Word;
use crate::error::AssemblyError;

/**
  The assembler's symbol table maps label names to word addresses in program memory. The first
  label defined at an address lives in a BiMap, so that a listing can go from an address back to
  the label that names it. Any further labels at the same address are aliases: they resolve like
  any other label but are never shown in place of the first.
*/
#[derive(Default, Debug)]
pub struct SymbolTable {
  table   : BiMap<DefaultAtom, Word>,
  aliases : HashMap<DefaultAtom, Word>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table   : BiMap::new(),
      aliases : HashMap::new()
    }
  }

  /// The first label defined at `address`.
  pub fn get_label(&self, address: Word) -> Option<&DefaultAtom> {
    self.table.get_by_right(&address)
  }

  pub fn get_address(&self, label: &DefaultAtom) -> Option<Word> {
    self.table
        .get_by_left(label)
        .or_else(|| self.aliases.get(label))
        .copied()
  }

  pub fn insert(&mut self, label: DefaultAtom, address: Word) -> Result<(), AssemblyError> {
    if self.get_address(&label).is_some() {
      return Err(AssemblyError::DuplicateLabel(label.to_string()));
    }
    match self.table.contains_right(&address) {
      true  => {
        self.aliases.insert(label, address);
        Ok(())
      }
      false => self.table
                   .insert_no_overwrite(label, address)
                   .map_err(|(label, _)| AssemblyError::DuplicateLabel(label.to_string()))
    }
  }

  pub fn len(&self) -> usize {
    self.table.len() + self.aliases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  /// Labels in ascending address order. At a shared address the first label comes first.
  pub fn iter(&self) -> impl Iterator<Item = (&DefaultAtom, Word)> {
    let mut entries: Vec<(&DefaultAtom, Word, bool)> = self.table
      .iter()
      .map(|(label, address)| (label, *address, false))
      .chain(self.aliases.iter().map(|(label, address)| (label, *address, true)))
      .collect();
    entries.sort_by(|x, y| (x.1, x.2, &**x.0).cmp(&(y.1, y.2, &**y.0)));
    entries.into_iter().map(|(label, address, _)| (label, address))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_both_ways() -> Result<(), AssemblyError> {
    let mut symbols = SymbolTable::new();
    symbols.insert(DefaultAtom::from("end"), 12)?;
    symbols.insert(DefaultAtom::from("start"), 0)?;

    assert_eq!(symbols.get_address(&DefaultAtom::from("end")), Some(12));
    assert_eq!(symbols.get_label(0).map(|l| l.to_string()), Some("start".to_string()));
    assert_eq!(symbols.get_label(1), None);
    assert_eq!(
      symbols.iter().map(|(l, a)| (l.to_string(), a)).collect::<Vec<_>>(),
      vec![("start".to_string(), 0), ("end".to_string(), 12)]
    );
    Ok(())
  }

  #[test]
  fn redefinition_is_rejected() {
    let mut symbols = SymbolTable::new();
    assert!(symbols.insert(DefaultAtom::from("loop"), 4).is_ok());
    assert_eq!(
      symbols.insert(DefaultAtom::from("loop"), 9),
      Err(AssemblyError::DuplicateLabel("loop".to_string()))
    );
    assert_eq!(symbols.len(), 1);
  }

  #[test]
  fn labels_may_share_an_address() -> Result<(), AssemblyError> {
    let mut symbols = SymbolTable::new();
    symbols.insert(DefaultAtom::from("start"), 0)?;
    symbols.insert(DefaultAtom::from("loop"), 0)?;
    symbols.insert(DefaultAtom::from("again"), 0)?;

    assert_eq!(symbols.get_address(&DefaultAtom::from("loop")), Some(0));
    assert_eq!(symbols.get_label(0).map(|l| l.to_string()), Some("start".to_string()));
    assert_eq!(
      symbols.insert(DefaultAtom::from("loop"), 3),
      Err(AssemblyError::DuplicateLabel("loop".to_string()))
    );
    assert_eq!(
      symbols.iter().map(|(l, _)| l.to_string()).collect::<Vec<_>>(),
      vec!["start".to_string(), "again".to_string(), "loop".to_string()]
    );
    assert_eq!(symbols.len(), 3);
    Ok(())
  }
}
