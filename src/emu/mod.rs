mod display;
mod execute;
mod font;
mod machine;
mod memory;
mod opcode;
mod rom;
mod runner;
mod stack;
mod types;

pub use display::*;
pub use font::*;
pub use machine::*;
pub use memory::*;
pub use opcode::*;
pub use rom::*;
pub use runner::*;
pub use stack::*;
pub use types::*;
