use super::commands::{
    BreakpointAction, Command, CommandError, CommandResult, DisasmLine, SetTarget,
};
use crate::emu::{Chip8Error, MEMORY_SIZE, Opcode, Runner, RunnerResult};
use std::collections::HashSet;

/// Drives a [`Runner`] from debugger commands.
pub struct Executor {
    is_running: bool,
    runner: Runner,
    rom: Vec<u8>,
    breakpoints: HashSet<u16>,
}

impl Executor {
    /// `rom` is kept so `reset` can reload it.
    pub fn new(runner: Runner, rom: Vec<u8>) -> Self {
        Self {
            is_running: false,
            runner,
            rom,
            breakpoints: HashSet::new(),
        }
    }

    pub fn poll(&mut self, dt: f32) -> Result<RunnerResult, Chip8Error> {
        if !self.is_running {
            return Ok(RunnerResult::Ok);
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(RunnerResult::HitBreakpoint)) {
            self.is_running = false;
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.is_running = true;
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.is_running = false;
                Ok(CommandResult::Ok)
            }
            Command::Step { count } => self.execute_step(count),
            Command::Breakpoint { action } => Ok(self.handle_breakpoint(action)),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => self.handle_mem(start, len),
            Command::Disasm { start, len } => self.handle_disasm(start, len),
            Command::Reset => self.handle_reset(),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    // Stops early when a step lands on a breakpoint, like `poll` does.
    fn execute_step(&mut self, count: u16) -> Result<CommandResult, CommandError> {
        for _ in 0..count.max(1) {
            self.runner.step()?;
            if self.breakpoints.contains(&self.runner.machine().pc()) {
                break;
            }
        }
        Ok(CommandResult::Ok)
    }

    fn handle_breakpoint(&mut self, action: BreakpointAction) -> CommandResult {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut bps: Vec<u16> = self.breakpoints.iter().copied().collect();
                bps.sort();
                return CommandResult::Breakpoints(bps);
            }
        };

        CommandResult::Ok
    }

    fn handle_set(
        &mut self,
        target: SetTarget,
        value: u16,
    ) -> Result<CommandResult, CommandError> {
        let machine = self.runner.machine_mut();

        match target {
            SetTarget::V(reg) => machine.set_register(reg, to_byte(value)?),
            SetTarget::I => machine.set_index(value),
            SetTarget::Pc => {
                if usize::from(value) >= MEMORY_SIZE {
                    return Err(CommandError::ValueOutOfRange {
                        value,
                        max: MEMORY_SIZE as u16 - 1,
                    });
                }
                machine.set_pc(value)
            }
            SetTarget::DelayTimer => machine.set_delay_timer(to_byte(value)?),
            SetTarget::SoundTimer => machine.set_sound_timer(to_byte(value)?),
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let start_addr = usize::from(start);
        // Clamp to the end of memory rather than failing on a long dump
        let len = usize::from(len).min(MEMORY_SIZE.saturating_sub(start_addr));
        let data = self.runner.machine().memory().slice(start_addr, len)?.to_vec();

        Ok(CommandResult::MemDump {
            data,
            offset: start,
        })
    }

    fn handle_disasm(&self, start: Option<u16>, len: u16) -> Result<CommandResult, CommandError> {
        let machine = self.runner.machine();
        let start = start.unwrap_or(machine.pc());

        let mut instructions = Vec::with_capacity(usize::from(len));
        for n in 0..len {
            let addr = start.wrapping_add(n.wrapping_mul(2));
            let Ok(raw) = machine.memory().read_word(usize::from(addr)) else {
                break;
            };

            instructions.push(DisasmLine {
                addr,
                raw,
                text: Opcode::decode(raw).to_string(),
            });
        }

        if instructions.is_empty() {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: usize::from(start),
            }
            .into());
        }

        Ok(CommandResult::Disasm { instructions })
    }

    fn handle_reset(&mut self) -> Result<CommandResult, CommandError> {
        self.is_running = false;
        let machine = self.runner.machine_mut();
        machine.reset();
        machine.load_program(&self.rom)?;
        Ok(CommandResult::Ok)
    }
}

fn to_byte(value: u16) -> Result<u8, CommandError> {
    u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange { value, max: 0xFF })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::Machine;
    use crate::u4;

    // LD V0, 1 / ADD V0, 1 / JP 0x202
    const COUNTER: [u8; 6] = [0x60, 0x01, 0x70, 0x01, 0x12, 0x02];

    fn executor() -> Executor {
        let mut machine = Machine::with_seed(0);
        machine.load_program(&COUNTER).unwrap();
        Executor::new(Runner::new(machine, 64.0), COUNTER.to_vec())
    }

    #[test]
    fn step_runs_requested_cycles() {
        let mut exec = executor();
        exec.execute(Command::Step { count: 3 }).unwrap();
        assert_eq!(exec.runner().machine().pc(), 0x202);
        assert_eq!(exec.runner().machine().v()[0], 2);
    }

    #[test]
    fn step_stops_on_breakpoint() {
        let mut exec = executor();
        exec.execute(Command::Breakpoint {
            action: BreakpointAction::Set { addr: 0x204 },
        })
        .unwrap();
        exec.execute(Command::Step { count: 10 }).unwrap();
        assert_eq!(exec.runner().machine().pc(), 0x204);
    }

    #[test]
    fn poll_only_runs_while_running() {
        let mut exec = executor();
        exec.poll(1.0).unwrap();
        assert_eq!(exec.runner().machine().pc(), 0x200);

        exec.execute(Command::Breakpoint {
            action: BreakpointAction::Set { addr: 0x204 },
        })
        .unwrap();
        exec.execute(Command::Run).unwrap();
        assert!(exec.is_running());

        assert_eq!(exec.poll(1.0).unwrap(), RunnerResult::HitBreakpoint);
        assert!(!exec.is_running());
    }

    #[test]
    fn breakpoints_are_listed_sorted() {
        let mut exec = executor();
        for addr in [0x300, 0x200, 0x250] {
            exec.execute(Command::Breakpoint {
                action: BreakpointAction::Set { addr },
            })
            .unwrap();
        }
        exec.execute(Command::Breakpoint {
            action: BreakpointAction::Clear { addr: 0x250 },
        })
        .unwrap();

        match exec
            .execute(Command::Breakpoint { action: BreakpointAction::List })
            .unwrap()
        {
            CommandResult::Breakpoints(bps) => assert_eq!(bps, vec![0x200, 0x300]),
            _ => panic!("expected breakpoint list"),
        }
    }

    #[test]
    fn set_checks_register_width() {
        let mut exec = executor();
        exec.execute(Command::Set { target: SetTarget::V(u4::new(2)), value: 0x7F })
            .unwrap();
        assert_eq!(exec.runner().machine().v()[2], 0x7F);

        let err = exec
            .execute(Command::Set { target: SetTarget::DelayTimer, value: 0x100 })
            .err();
        assert!(matches!(err, Some(CommandError::ValueOutOfRange { value: 0x100, .. })));

        let result = exec.execute(Command::Set { target: SetTarget::Pc, value: 0x1000 });
        assert!(result.is_err());
    }

    #[test]
    fn mem_dump_is_clamped_to_memory() {
        let mut exec = executor();
        match exec.execute(Command::Mem { start: 0xFFC, len: 16 }).unwrap() {
            CommandResult::MemDump { data, offset } => {
                assert_eq!(offset, 0xFFC);
                assert_eq!(data.len(), 4);
            }
            _ => panic!("expected memory dump"),
        }
    }

    #[test]
    fn disasm_defaults_to_pc() {
        let mut exec = executor();
        match exec.execute(Command::Disasm { start: None, len: 3 }).unwrap() {
            CommandResult::Disasm { instructions } => {
                let text: Vec<&str> = instructions.iter().map(|l| l.text.as_str()).collect();
                assert_eq!(text, vec!["LD V0, 0x01", "ADD V0, 0x01", "JP 0x202"]);
                assert_eq!(instructions[2].addr, 0x204);
                assert_eq!(instructions[2].raw, 0x1202);
            }
            _ => panic!("expected disassembly"),
        }
    }

    #[test]
    fn reset_reloads_rom() {
        let mut exec = executor();
        exec.execute(Command::Step { count: 4 }).unwrap();
        exec.execute(Command::Run).unwrap();

        exec.execute(Command::Reset).unwrap();
        assert!(!exec.is_running());
        assert_eq!(exec.runner().machine().pc(), 0x200);
        assert_eq!(exec.runner().machine().v()[0], 0);
        assert_eq!(exec.runner().machine().memory().read(0x200).unwrap(), 0x60);
    }
}
