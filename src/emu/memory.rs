use super::{Chip8Error, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS, MEMORY_SIZE};

/// 4KB of bounds-checked memory.
///
/// Every accessor validates the address range before touching the backing array, so an
/// out-of-range read or write is reported as [`Chip8Error::MemoryOutOfBounds`] and the
/// contents are left untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: [0; MEMORY_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Copies the built-in glyphs to `FONT_START_ADDRESS`.
    pub fn install_font(&mut self) {
        self.bytes[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
    }

    pub fn read(&self, addr: usize) -> Result<u8, Chip8Error> {
        self.bytes
            .get(addr)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    /// Big-endian word at `addr`, `addr + 1`.
    pub fn read_word(&self, addr: usize) -> Result<u16, Chip8Error> {
        let high = self.read(addr)?;
        let low = self.read(addr + 1)?;

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Borrow `len` bytes starting at `addr`.
    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], Chip8Error> {
        let end = Self::checked_end(addr, len)?;
        Ok(&self.bytes[addr..end])
    }

    /// Mutably borrow `len` bytes starting at `addr`.
    pub fn slice_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], Chip8Error> {
        let end = Self::checked_end(addr, len)?;
        Ok(&mut self.bytes[addr..end])
    }

    /// Copy `data` to `addr`. Nothing is written unless the whole range fits.
    pub fn load_at(&mut self, addr: usize, data: &[u8]) -> Result<(), Chip8Error> {
        self.slice_mut(addr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    // Reports the first address past the end of memory that the range would touch.
    fn checked_end(addr: usize, len: usize) -> Result<usize, Chip8Error> {
        match addr.checked_add(len) {
            Some(end) if end <= MEMORY_SIZE => Ok(end),
            _ => Err(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEMORY_SIZE),
            }),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_word_is_big_endian() {
        let mut mem = Memory::new();
        mem.load_at(0x200, &[0xA2, 0xF0]).unwrap();
        assert_eq!(mem.read_word(0x200).unwrap(), 0xA2F0);
    }

    #[test]
    fn read_past_end_is_an_error() {
        let mem = Memory::new();
        assert!(mem.read(MEMORY_SIZE - 1).is_ok());
        assert!(matches!(
            mem.read(MEMORY_SIZE),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        ));
        assert!(mem.read_word(MEMORY_SIZE - 1).is_err());
    }

    #[test]
    fn load_that_does_not_fit_writes_nothing() {
        let mut mem = Memory::new();
        let data = [0xAA; 4];

        assert!(mem.load_at(MEMORY_SIZE - 3, &data).is_err());
        assert!(mem.as_slice().iter().all(|&b| b == 0));

        mem.load_at(MEMORY_SIZE - 4, &data).unwrap();
        assert_eq!(mem.read(MEMORY_SIZE - 1).unwrap(), 0xAA);
    }

    #[test]
    fn slice_rejects_overflowing_ranges() {
        let mut mem = Memory::new();
        assert!(mem.slice(usize::MAX, 2).is_err());
        assert!(mem.slice_mut(0xFFE, 3).is_err());
        assert_eq!(mem.slice(0xFFE, 2).unwrap().len(), 2);
        assert!(mem.slice(0x1000, 0).is_ok());
    }
}
