use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use dcpu::bytecode::{assemble, unpack_bytes, Assembly, Byte, Word, WORD_BYTES};
use dcpu::{Clock, Dcpu, DcpuError, Memory, TesterDevice};

const USAGE: &str = "usage: dcpu <program.bin | program.lasm>";

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    )
    .init();

  #[cfg(feature = "trace_computation")]
  println!("Computation Tracing ENABLED");

  let path = match std::env::args().nth(1) {
    Some(path) => path,
    None => {
      eprintln!("{}", USAGE);
      return ExitCode::from(2);
    }
  };

  match run(Path::new(&path)) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("Error: {}", e);
      ExitCode::FAILURE
    }
  }
}

/// Loads the program at `path`, assembling it first if it is `.lasm` source, and runs it with a
/// clock (device 0) and a tester (device 1) attached.
fn run(path: &Path) -> Result<(), Box<dyn Error>> {
  let image: Vec<Byte> = match path.extension().and_then(|extension| extension.to_str()) {
    Some("lasm") => {
      let text = fs::read_to_string(path)?;
      let assembly = assemble(&text).map_err(DcpuError::from)?;
      print_listing(&assembly);
      unpack_bytes(&assembly.encode())
    }
    _ => fs::read(path)?
  };

  let mut machine = Dcpu::new();
  machine.attach(Box::new(Clock::new()));
  machine.attach(Box::new(TesterDevice::new()));

  let mut mem = Memory::new();
  let cycles = machine.run(&mut mem, &image)?;
  info!(cycles, "program finished");

  println!("{}", machine);
  let words = image.len() / WORD_BYTES;
  if words > 0 {
    println!("Program:");
    mem.dump_non_null(0, (words - 1) as Word);
  }
  println!("Stack:");
  mem.dump(0xFFF0, 0xFFFF);
  Ok(())
}

fn print_listing(assembly: &Assembly) {
  let mut address: u16 = 0;
  for instruction in &assembly.instructions {
    if let Some(label) = assembly.symbols.get_label(address) {
      println!("{}:", label);
    }
    println!("  0x{:04x}: {}", address, instruction);
    address = address.wrapping_add(instruction.word_count());
  }
  if let Some(label) = assembly.symbols.get_label(address) {
    println!("{}:", label);
  }
}
