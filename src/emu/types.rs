use std::path::PathBuf;

use super::Opcode;

// Fixed by the CHIP-8 architecture
pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;
pub const STACK_DEPTH: usize = 16;
pub const REGISTER_COUNT: usize = 16;
pub const KEY_COUNT: usize = 16;

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
pub const DISPLAY_LEN: usize = DISPLAY_X * DISPLAY_Y;

/// Control-flow hint returned by a CPU cycle to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions in the current frame.
    Continue,
    /// Wait for the next frame before continuing
    /// (after a draw, or while blocked on a key press).
    WaitForNextFrame,
}

/// What a single successful cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cycle {
    /// Address the instruction was fetched from.
    pub pc: u16,
    /// The raw instruction word.
    pub raw: u16,
    pub opcode: Opcode,
    pub result: Chip8Result,
    /// Sound timer value before this cycle's timer tick.
    pub sound_timer: u8,
}

impl Cycle {
    /// True on the cycle the sound timer runs out, the instant a tone should fire.
    pub fn tone_edge(&self) -> bool {
        self.sound_timer == 1
    }
}

/// Coarse classification of [`Chip8Error`] for drivers that only care about the category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    UnknownOpcode,
    Stack,
    OutOfBounds,
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Failed to read ROM file {}", path.display())]
    RomUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown opcode {opcode:#06X} at {pc:#05X}")]
    UnknownOpcode { opcode: u16, pc: u16 },

    #[error("Stack overflow: call at {pc:#05X} with a full call stack")]
    StackOverflow { pc: u16 },

    #[error("Stack underflow: return at {pc:#05X} with empty call stack")]
    StackUnderflow { pc: u16 },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },
}

impl Chip8Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Chip8Error::RomTooLarge { .. } | Chip8Error::RomUnreadable { .. } => ErrorKind::Load,
            Chip8Error::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
            Chip8Error::StackOverflow { .. } | Chip8Error::StackUnderflow { .. } => {
                ErrorKind::Stack
            }
            Chip8Error::MemoryOutOfBounds { .. } => ErrorKind::OutOfBounds,
        }
    }
}
