use std::path::Path;

use super::{Chip8Error, MAX_ROM_SIZE};

/// Reads a raw CHIP-8 program from disk.
///
/// The file is loaded verbatim (no header). Files that cannot be read, or that would
/// not fit in program memory, are reported as load errors.
pub fn load_rom(path: impl AsRef<Path>) -> Result<Vec<u8>, Chip8Error> {
    let path = path.as_ref();

    let rom = std::fs::read(path).map_err(|source| Chip8Error::RomUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    if rom.len() > MAX_ROM_SIZE {
        return Err(Chip8Error::RomTooLarge {
            size: rom.len(),
            max_size: MAX_ROM_SIZE,
        });
    }

    log::info!("read {} bytes from {}", rom.len(), path.display());
    Ok(rom)
}
