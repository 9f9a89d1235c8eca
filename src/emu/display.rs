use super::{DISPLAY_LEN, DISPLAY_X, DISPLAY_Y};

/// 64x32 monochrome framebuffer, stored row-major (`index = x + y * DISPLAY_X`).
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    cells: [bool; DISPLAY_LEN],
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            cells: [false; DISPLAY_LEN],
        }
    }

    /// Row-major index of `(x, y)`, or `None` if the coordinate is off screen.
    pub fn index(x: usize, y: usize) -> Option<usize> {
        (x < DISPLAY_X && y < DISPLAY_Y).then(|| x + y * DISPLAY_X)
    }

    /// Get the state of a pixel (true = on). Off-screen pixels read as off.
    pub fn get(&self, x: usize, y: usize) -> bool {
        Self::index(x, y).is_some_and(|idx| self.cells[idx])
    }

    /// XOR-toggles the pixel at `(x, y)`.
    ///
    /// Returns `Some(true)` if the pixel was on before the toggle (a collision),
    /// `Some(false)` if it was off, and `None` if the coordinate is off screen.
    pub fn toggle(&mut self, x: usize, y: usize) -> Option<bool> {
        let idx = Self::index(x, y)?;
        let was_set = self.cells[idx];
        self.cells[idx] = !was_set;
        Some(was_set)
    }

    pub fn clear(&mut self) {
        self.cells.fill(false);
    }

    pub fn cells(&self) -> &[bool; DISPLAY_LEN] {
        &self.cells
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.cells.chunks_exact(DISPLAY_X)
    }

    pub fn lit_count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell).count()
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("lit", &self.lit_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_row_major() {
        assert_eq!(Framebuffer::index(0, 0), Some(0));
        assert_eq!(Framebuffer::index(5, 1), Some(69));
        assert_eq!(Framebuffer::index(63, 31), Some(DISPLAY_LEN - 1));
        assert_eq!(Framebuffer::index(64, 0), None);
        assert_eq!(Framebuffer::index(0, 32), None);
    }

    #[test]
    fn toggle_reports_previous_state() {
        let mut fb = Framebuffer::new();
        assert_eq!(fb.toggle(3, 4), Some(false));
        assert!(fb.get(3, 4));
        assert_eq!(fb.toggle(3, 4), Some(true));
        assert!(!fb.get(3, 4));
        assert_eq!(fb.toggle(70, 4), None);
    }

    #[test]
    fn rows_cover_the_whole_screen() {
        let mut fb = Framebuffer::new();
        fb.toggle(63, 31);
        let rows: Vec<&[bool]> = fb.rows().collect();
        assert_eq!(rows.len(), DISPLAY_Y);
        assert!(rows[31][63]);
        fb.clear();
        assert_eq!(fb.lit_count(), 0);
    }
}
