//! Command-driven stepping debugger used by the `dbg` front-end.

mod commands;
mod executor;

pub use commands::*;
pub use executor::*;
