use super::{Chip8Error, Chip8Result, Cycle, Machine};
use crate::u4;
use std::collections::HashSet;

/// One cycle per 60Hz frame, the rate the timers are defined at.
pub const DEFAULT_CYCLE_HZ: f32 = 60.0;

/// High-level driver that paces cycles against elapsed wall time.
///
/// The machine itself has no notion of time; the runner turns frame deltas into a
/// number of cycles to execute.
pub struct Runner {
    machine: Machine,
    cycle_time_step: f32,
    cycle_dt_accumulator: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerResult {
    HitBreakpoint,
    Ok,
}

impl Runner {
    pub fn new(machine: Machine, cycle_hz: f32) -> Self {
        Self {
            machine,
            cycle_time_step: 1.0 / cycle_hz.max(1.0),
            cycle_dt_accumulator: 0.0,
        }
    }

    /// Update emulator by delta time.
    ///
    /// Runs as many cycles as needed based on the elapsed time `dt`.
    /// Returns early if a frame has to be rendered before the next cycle.
    pub fn update(&mut self, dt: f32) -> Result<RunnerResult, Chip8Error> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but stops when the program counter lands on a breakpoint.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<RunnerResult, Chip8Error> {
        self.cycle_dt_accumulator += dt;

        while self.cycle_dt_accumulator >= self.cycle_time_step {
            self.cycle_dt_accumulator -= self.cycle_time_step;

            let cycle = self.step()?;

            if let Some(breakpoints) = &breakpoints
                && breakpoints.contains(&self.machine.pc())
            {
                self.cycle_dt_accumulator = 0.0;
                return Ok(RunnerResult::HitBreakpoint);
            }

            match cycle.result {
                Chip8Result::WaitForNextFrame => {
                    // If we need to wait for the next frame we stop executing cycles.
                    // We clear the accumulator to avoid "catching up" in the next frame.
                    self.cycle_dt_accumulator = 0.0;
                    break;
                }
                Chip8Result::Continue => {}
            }
        }

        Ok(RunnerResult::Ok)
    }

    /// Executes exactly one cycle regardless of elapsed time.
    pub fn step(&mut self) -> Result<Cycle, Chip8Error> {
        let cycle = self
            .machine
            .cycle()
            .inspect_err(|e| log::warn!("cycle failed: {e}"))?;

        if cycle.tone_edge() {
            log::debug!("sound timer expired at {:#05X}", cycle.pc);
        }
        Ok(cycle)
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.machine.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.machine.set_key(key, pressed)
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}
