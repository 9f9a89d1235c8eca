use rand::{SeedableRng, rngs::StdRng};

use super::{
    Chip8Error, Cycle, Framebuffer, KEY_COUNT, MAX_ROM_SIZE, Memory, Opcode, REGISTER_COUNT,
    ROM_START_ADDRESS, Stack,
};
use crate::u4;

/// CHIP-8 virtual machine state
///
/// Owns every piece of CPU and display state. A `Machine` is driven one instruction
/// at a time through [`Machine::cycle`]; the framebuffer, draw flag and timers are
/// exposed read-only to the presentation and audio front-ends, and the keypad is the
/// only state an input front-end may write.
pub struct Machine {
    /// 4KB memory
    pub(crate) memory: Memory,
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Framebuffer,
    /// Set whenever the display changes, cleared by whoever renders it
    pub(crate) draw_flag: bool,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; REGISTER_COUNT],
    /// Call stack for subroutine returns
    pub(crate) stack: Stack,

    /// Delay timer: decrements once per cycle until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements once per cycle, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Tracks which key is waiting to be released for the FX0A instruction
    pub(crate) wait_release_key: Option<u8>,
    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; KEY_COUNT],

    /// Source for the CXNN instruction
    pub(crate) rng: StdRng,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Creates a machine whose random instruction is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut machine = Machine {
            memory: Memory::new(),
            display: Framebuffer::new(),
            draw_flag: false,
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; REGISTER_COUNT],
            stack: Stack::new(),
            delay_timer: 0,
            sound_timer: 0,
            wait_release_key: None,
            keypad: [false; KEY_COUNT],
            rng,
        };
        machine.reset();
        machine
    }

    /// Puts the machine back in its power-on state and installs the font set.
    ///
    /// The keypad belongs to the input front-end and is left as is.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.memory.install_font();

        self.display.clear();
        self.draw_flag = false;

        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; REGISTER_COUNT];
        self.stack.clear();

        self.delay_timer = 0;
        self.sound_timer = 0;
        self.wait_release_key = None;

        log::debug!("machine reset, pc at {:#05X}", self.pc);
    }

    /// Copies a program into memory at 0x200.
    ///
    /// Programs longer than the available program memory are rejected and memory is
    /// left untouched. No other state is modified.
    pub fn load_program(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.memory.load_at(ROM_START_ADDRESS, rom)?;
        log::debug!("loaded {} byte program at {:#05X}", rom.len(), ROM_START_ADDRESS);

        Ok(())
    }

    /// Executes a single CPU cycle (fetch, decode, execute, timer tick).
    ///
    /// A failed cycle leaves the machine exactly as it was before the call.
    pub fn cycle(&mut self) -> Result<Cycle, Chip8Error> {
        let pc = self.pc;
        let raw = self.fetch()?;
        let opcode = Opcode::decode(raw);

        log::trace!("{pc:#05X}: {raw:04X} {opcode}");

        let result = self.execute(opcode)?;
        let sound_timer = self.tick_timers();

        Ok(Cycle {
            pc,
            raw,
            opcode,
            result,
            sound_timer,
        })
    }

    /// Fetches the 16-bit instruction at the program counter without advancing it.
    pub fn fetch(&self) -> Result<u16, Chip8Error> {
        self.memory.read_word(self.pc as usize)
    }

    /// Decrements both timers towards zero and returns the sound timer value from
    /// before the decrement.
    pub fn tick_timers(&mut self) -> u8 {
        let sound_before = self.sound_timer;
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
        sound_before
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    pub fn keypad(&self) -> &[bool; KEY_COUNT] {
        &self.keypad
    }

    pub fn display(&self) -> &Framebuffer {
        &self.display
    }

    pub fn draw_flag(&self) -> bool {
        self.draw_flag
    }

    pub fn clear_draw_flag(&mut self) {
        self.draw_flag = false;
    }

    /// Returns the framebuffer if it changed since the last call, clearing the draw flag.
    pub fn take_frame(&mut self) -> Option<&Framebuffer> {
        if std::mem::take(&mut self.draw_flag) {
            Some(&self.display)
        } else {
            None
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn set_index(&mut self, i: u16) {
        self.i = i;
    }

    pub fn v(&self) -> &[u8; REGISTER_COUNT] {
        &self.v
    }

    pub fn register(&self, x: u4) -> u8 {
        self.v[x]
    }

    pub fn set_register(&mut self, x: u4, value: u8) {
        self.v[x] = value;
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.delay_timer = value;
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.sound_timer = value;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::{Chip8Result, ErrorKind, FONT, FONT_END_ADDRESS, MEMORY_SIZE};

    fn machine_with(program: &[u8]) -> Machine {
        let mut machine = Machine::with_seed(0);
        machine.load_program(program).unwrap();
        machine
    }

    fn assert_canonical(machine: &Machine) {
        let mem = machine.memory().as_slice();
        assert_eq!(&mem[..FONT_END_ADDRESS], &FONT);
        assert!(mem[FONT_END_ADDRESS..].iter().all(|&b| b == 0));
        assert_eq!(machine.pc(), 0x200);
        assert_eq!(machine.index(), 0);
        assert_eq!(machine.v(), &[0; 16]);
        assert_eq!(machine.stack().sp(), 0);
        assert_eq!(machine.delay_timer(), 0);
        assert_eq!(machine.sound_timer(), 0);
        assert_eq!(machine.display().lit_count(), 0);
        assert!(!machine.draw_flag());
    }

    #[test]
    fn new_machine_is_reset() {
        assert_canonical(&Machine::with_seed(1));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut machine = machine_with(&[0x60, 0x05, 0xA0, 0x00, 0xD0, 0x05]);
        for _ in 0..3 {
            machine.cycle().unwrap();
        }
        machine.set_delay_timer(9);

        machine.reset();
        let once_mem = machine.memory().clone();
        let once_display = machine.display().clone();
        assert_canonical(&machine);

        machine.reset();
        assert_canonical(&machine);
        assert!(machine.memory() == &once_mem);
        assert!(machine.display() == &once_display);
    }

    #[test]
    fn reset_keeps_keypad() {
        let mut machine = Machine::with_seed(0);
        machine.set_key(u4::new(4), true);
        machine.reset();
        assert!(machine.keypad()[4]);
    }

    #[test]
    fn load_largest_program() {
        let rom = vec![0x12; MAX_ROM_SIZE];
        let machine = machine_with(&rom);
        assert_eq!(machine.memory().read(MEMORY_SIZE - 1).unwrap(), 0x12);
        assert_eq!(&machine.memory().as_slice()[..FONT_END_ADDRESS], &FONT);
    }

    #[test]
    fn load_oversized_program_fails_without_writing() {
        let mut machine = machine_with(&[0xAB; 4]);
        let before = machine.memory().clone();

        let err = machine.load_program(&vec![0xCD; MAX_ROM_SIZE + 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(matches!(
            err,
            Chip8Error::RomTooLarge { size: 3585, max_size: 3584 }
        ));
        assert!(machine.memory() == &before);
    }

    #[test]
    fn load_does_not_touch_registers() {
        let mut machine = Machine::with_seed(0);
        machine.set_pc(0x300);
        machine.set_register(u4::new(2), 7);
        machine.load_program(&[0x00, 0xE0]).unwrap();
        assert_eq!(machine.pc(), 0x300);
        assert_eq!(machine.register(u4::new(2)), 7);
    }

    #[test]
    fn fetch_is_big_endian() {
        let machine = machine_with(&[0xA2, 0xF0]);
        assert_eq!(machine.fetch().unwrap(), 0xA2F0);
    }

    #[test]
    fn fetch_at_end_of_memory_is_out_of_bounds() {
        let mut machine = Machine::with_seed(0);
        machine.set_pc(0xFFF);
        let err = machine.cycle().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert_eq!(machine.pc(), 0xFFF);
    }

    #[test]
    fn cycle_reports_what_ran() {
        let mut machine = machine_with(&[0x00, 0xE0]);
        machine.set_sound_timer(1);

        let cycle = machine.cycle().unwrap();
        assert_eq!(cycle.pc, 0x200);
        assert_eq!(cycle.raw, 0x00E0);
        assert_eq!(cycle.opcode, Opcode::ClearDisplay);
        assert_eq!(cycle.result, Chip8Result::WaitForNextFrame);
        assert_eq!(cycle.sound_timer, 1);
        assert!(cycle.tone_edge());
        assert_eq!(machine.sound_timer(), 0);
    }

    #[test]
    fn timers_decay_to_zero() {
        // Five jumps to self
        let mut machine = machine_with(&[0x12, 0x00]);
        machine.set_delay_timer(3);
        for _ in 0..5 {
            machine.cycle().unwrap();
        }
        assert_eq!(machine.delay_timer(), 0);
        assert_eq!(machine.pc(), 0x200);
    }

    #[test]
    fn sound_timer_reports_pre_decrement_value() {
        let mut machine = machine_with(&[0x12, 0x00]);
        machine.set_sound_timer(2);

        let first = machine.cycle().unwrap();
        let second = machine.cycle().unwrap();
        let third = machine.cycle().unwrap();

        assert_eq!(
            (first.sound_timer, second.sound_timer, third.sound_timer),
            (2, 1, 0)
        );
        assert!(!first.tone_edge() && second.tone_edge() && !third.tone_edge());
        assert!(!machine.should_beep());
    }

    #[test]
    fn unknown_opcode_leaves_state_unchanged() {
        let mut machine = machine_with(&[0xFF, 0xFF]);
        machine.set_delay_timer(5);
        machine.set_register(u4::F, 0x42);

        let err = machine.cycle().unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::UnknownOpcode { opcode: 0xFFFF, pc: 0x200 }
        ));
        assert_eq!(machine.pc(), 0x200);
        assert_eq!(machine.delay_timer(), 5);
        assert_eq!(machine.register(u4::F), 0x42);
    }

    #[test]
    fn take_frame_clears_draw_flag() {
        let mut machine = machine_with(&[0x00, 0xE0]);
        assert!(machine.take_frame().is_none());

        machine.cycle().unwrap();
        assert!(machine.draw_flag());
        assert!(machine.take_frame().is_some());
        assert!(!machine.draw_flag());
        assert!(machine.take_frame().is_none());
    }
}
