//! Whole programs, assembled from source and run through the byte image loader.

use dcpu::bytecode::{assemble, unpack_bytes, Register, Word};
use dcpu::{
  AssemblyError, Clock, Cpu, Cycles, Dcpu, DcpuError, Hardware, Memory, TesterDevice, INITIAL_SP
};

fn run_with(source: &str, devices: Vec<Box<dyn Hardware>>) -> Result<(Dcpu, Memory), DcpuError> {
  let assembly = assemble(source)?;
  let mut machine = Dcpu::new();
  for device in devices {
    machine.attach(device);
  }
  let mut mem = Memory::new();
  machine.run(&mut mem, &unpack_bytes(&assembly.encode()))?;
  Ok((machine, mem))
}

fn device(hardware: impl Hardware + 'static) -> Box<dyn Hardware> {
  Box::new(hardware)
}

fn run(source: &str) -> Result<(Dcpu, Memory), DcpuError> {
  run_with(source, vec![])
}

/// Raises one interrupt from its update once the CPU has spent `at` cycles.
struct Alarm {
  at      : Cycles,
  message : Word,
  raised  : bool
}

impl Hardware for Alarm {
  fn id(&self) -> u32 {
    0xa1a7_0001
  }

  fn version(&self) -> Word {
    1
  }

  fn manufacturer(&self) -> u32 {
    0
  }

  fn update(&mut self, cpu: &mut Cpu, _mem: &mut Memory) -> Cycles {
    if !self.raised && cpu.cycles() >= self.at {
      self.raised = true;
      cpu.interrupt(self.message);
    }
    0
  }

  fn interrupt(&mut self, _cpu: &mut Cpu, _mem: &mut Memory) -> Cycles {
    0
  }
}

#[test]
fn addition_overflow_sets_ex() -> Result<(), DcpuError> {
  let (machine, _) = run("(set x 0xFFFF) (add x 1)")?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::X), 0);
  assert_eq!(cpu.ex(), 1);
  assert_eq!(cpu.cycles(), 3);
  Ok(())
}

#[test]
fn subtraction_borrows_across_words() -> Result<(), DcpuError> {
  // 0x0001_0000 - 1, low word in X, high word in Y.
  let (machine, _) = run("(set x 0) (set y 1) (sub x 1) (sbx y 0)")?;
  let cpu = machine.cpu();
  assert_eq!((cpu.register(Register::Y), cpu.register(Register::X)), (0, 0xFFFF));
  assert_eq!(cpu.ex(), 0);
  assert_eq!(cpu.cycles(), 1 + 1 + 2 + 3);

  // 0 - 1 borrows out of the high word too.
  let (machine, _) = run("(set x 0) (set y 0) (sub x 1) (sbx y 0)")?;
  let cpu = machine.cpu();
  assert_eq!((cpu.register(Register::Y), cpu.register(Register::X)), (0xFFFF, 0xFFFF));
  assert_eq!(cpu.ex(), 0xFFFF);
  Ok(())
}

#[test]
fn signed_remainder_keeps_the_dividend_sign() -> Result<(), DcpuError> {
  let (machine, _) = run("(set x -29) (set y 3) (mdi x y)")?;
  assert_eq!(machine.cpu().register(Register::X), 0xFFFE);
  assert_eq!(machine.cpu().cycles(), 2 + 1 + 3);
  Ok(())
}

#[test]
fn chained_conditionals_are_skipped_together() -> Result<(), DcpuError> {
  let (machine, _) = run(
    "(set x 1)
     (set y 2)
     (ifg x y)    ; false, so both IFE and the SET they guard are skipped
     (ife x 1)
     (ife y 2)
     (set i 1)
     (set j 1)"
  )?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::I), 0);
  assert_eq!(cpu.register(Register::J), 1);
  assert_eq!(cpu.cycles(), 1 + 1 + (2 + 3) + 1);
  Ok(())
}

#[test]
fn stack_operations() -> Result<(), DcpuError> {
  let (machine, mem) = run(
    "(set push 14)
     (add peek 1)
     (set b 7)
     (and b pop)
     (set a (ref sp -1))"
  )?;
  let cpu = machine.cpu();
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.register(Register::B), 7);
  assert_eq!(mem.read(0xFFFE), 15);
  assert_eq!(cpu.register(Register::A), 15);
  assert_eq!(cpu.cycles(), 7);
  Ok(())
}

#[test]
fn subroutine_calls_return() -> Result<(), DcpuError> {
  let (machine, _) = run(
    "(set x 5)
     (jsr sqr)
     (jsr sqr)
     (set pc end)
     (label sqr)
     (mul x x)
     (set pc pop)
     (label end)"
  )?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::X), 625);
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.cycles(), 17);
  Ok(())
}

#[test]
fn subroutine_at_a_packed_literal_address() -> Result<(), DcpuError> {
  let (machine, _) = run(
    "(jsr 3)          ; the target packs into the header
     (set pc end)
     (set pc pop)     ; address 3
     (label end)"
  )?;
  assert_eq!(unpack_bytes(&assemble("(jsr 3)")?.encode()), vec![0x20, 0x8C]);
  let cpu = machine.cpu();
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.cycles(), 3 + 1 + 2);
  Ok(())
}

#[test]
fn interrupts_raised_in_a_handler_are_queued() -> Result<(), DcpuError> {
  let (machine, mem) = run(
    "(ias handler)
     (int 1)
     (set pc end)

     (label handler)
     (ifn a 1)
     (set pc count)
     ; Interrupts are queued while the handler runs.
     (int 2)
     (int 2)
     (int 2)
     (rfi 0)

     (label count)
     (add (ref 0x1000) 1)
     (rfi 0)
     (label end)"
  )?;
  let cpu = machine.cpu();
  assert_eq!(mem.read(0x1000), 3);
  assert_eq!(cpu.cycles(), 56);
  assert_eq!(cpu.queued_interrupts(), 0);
  assert!(!cpu.is_queueing());
  assert_eq!(cpu.sp(), INITIAL_SP);
  Ok(())
}

#[test]
fn interrupt_without_handler_is_dropped() -> Result<(), DcpuError> {
  let (machine, _) = run("(int 5) (set x 1)")?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::X), 1);
  assert_eq!(cpu.register(Register::A), 0);
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.cycles(), 5);
  Ok(())
}

#[test]
fn handler_address_can_be_read_back() -> Result<(), DcpuError> {
  let (machine, _) = run("(ias 0x1234) (iag b)")?;
  assert_eq!(machine.cpu().register(Register::B), 0x1234);
  assert_eq!(machine.cpu().ia(), 0x1234);
  assert_eq!(machine.cpu().cycles(), 2 + 1);
  Ok(())
}

#[test]
fn queueing_defers_interrupts_until_released() -> Result<(), DcpuError> {
  let (machine, _) = run(
    "(ias handler)
     (iaq 1)
     (int 7)          ; queued
     (set x 1)
     (iaq 0)          ; the queued interrupt is dispatched at the end of this step
     (set pc end)

     (label handler)
     (set y a)
     (set z x)
     (rfi 0)
     (label end)"
  )?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::Y), 7);
  // The handler ran after SET X.
  assert_eq!(cpu.register(Register::Z), 1);
  assert_eq!(cpu.register(Register::A), 0);
  assert_eq!(cpu.queued_interrupts(), 0);
  assert!(!cpu.is_queueing());
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.cycles(), 2 + 2 + 4 + 1 + 2 + (1 + 1 + 3) + 2);
  Ok(())
}

#[test]
fn device_interrupt_waits_for_the_active_handler() -> Result<(), DcpuError> {
  let alarm = Alarm { at: 6, message: 2, raised: false };
  let (machine, mem) = run_with(
    "(ias handler)
     (int 1)          ; dispatched at once; the alarm goes off at the end of this step
     (set pc end)

     (label handler)
     (sti (ref i 0x1000) a)
     (rfi 0)
     (label end)",
    vec![device(alarm)]
  )?;
  let cpu = machine.cpu();
  // Message 1 was handled first, then the alarm's message 2.
  assert_eq!((mem.read(0x1000), mem.read(0x1001)), (1, 2));
  assert_eq!(cpu.register(Register::I), 2);
  assert_eq!(cpu.register(Register::A), 0);
  assert_eq!(cpu.sp(), INITIAL_SP);
  assert_eq!(cpu.cycles(), 2 + 4 + (4 + 3) + (4 + 3) + 2);
  Ok(())
}

#[test]
fn pending_interrupts_at_exit_are_an_error() {
  let result = run(
    "(ias h)
     (iaq 1)
     (int 3)
     (set pc end)
     (label h)
     (rfi 0)
     (label end)"
  );
  assert_eq!(
    result.map(|(machine, _)| machine.cpu().cycles()),
    Err(DcpuError::PendingInterrupts { queued: 1, handler_active: true })
  );
}

#[test]
fn hardware_count() -> Result<(), DcpuError> {
  let (machine, _) = run_with(
    "(hwn a)",
    vec![device(Clock::new()), device(TesterDevice::new()), device(Clock::new())]
  )?;
  assert_eq!(machine.cpu().register(Register::A), 3);
  assert_eq!(machine.cpu().cycles(), 2);
  Ok(())
}

#[test]
fn hardware_query_reports_identity() -> Result<(), DcpuError> {
  let (machine, _) = run_with("(hwq 0)", vec![device(Clock::new())])?;
  let cpu = machine.cpu();
  let registers: Vec<u16> = [Register::A, Register::B, Register::C, Register::X, Register::Y]
    .iter()
    .map(|r| cpu.register(*r))
    .collect();
  assert_eq!(registers, vec![0xb402, 0x12d0, 1, 0x24C0, 0x0FE1]);
  assert_eq!(cpu.cycles(), 4);
  Ok(())
}

#[test]
fn hardware_query_out_of_range() {
  let result = run_with("(hwq 1)", vec![device(Clock::new())]);
  assert_eq!(
    result.map(|(machine, _)| machine.cpu().cycles()),
    Err(DcpuError::DeviceIndexOutOfRange { index: 1, count: 1 })
  );
}

#[test]
fn clock_reports_ticks() -> Result<(), DcpuError> {
  let (machine, _) = run_with("(set c 9) (set a 1) (hwi 0)", vec![device(Clock::new())])?;
  assert_eq!(machine.cpu().register(Register::C), 0);
  // HWI costs 4, plus 1 for the clock.
  assert_eq!(machine.cpu().cycles(), 1 + 1 + 5);
  Ok(())
}

#[test]
fn tester_handshake_through_an_interrupt() -> Result<(), DcpuError> {
  let (machine, _) = run_with(
    "(ias handler)
     (set a 1)
     (hwi 0)          ; starts the handshake, the key arrives in X
     (set pc end)

     (label handler)
     (set a x)
     (hwi 0)          ; answers the handshake
     (set y pop)
     (rfi 0)
     (label end)",
    vec![device(TesterDevice::new())]
  )?;
  let cpu = machine.cpu();
  assert_eq!(cpu.register(Register::Y), 123);
  assert_eq!(cpu.register(Register::A), 1);
  assert_eq!(cpu.sp(), INITIAL_SP);
  Ok(())
}

#[test]
fn odd_trailing_byte_is_ignored() -> Result<(), DcpuError> {
  let mut image = unpack_bytes(&assemble("(set x 5)")?.encode());
  image.push(0xAB);

  let mut machine = Dcpu::new();
  let mut mem = Memory::new();
  machine.run(&mut mem, &image)?;
  assert_eq!(machine.cpu().register(Register::X), 5);
  assert_eq!(machine.cpu().pc(), 1);
  Ok(())
}

#[test]
fn assembly_errors_are_reported() {
  assert_eq!(
    run("(set a nowhere)").map(|(machine, _)| machine.cpu().cycles()),
    Err(DcpuError::Assembly(AssemblyError::UnresolvedLabel("nowhere".to_string())))
  );
}
