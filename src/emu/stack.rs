use super::STACK_DEPTH;

/// Fixed-depth call stack of return addresses.
///
/// `push` stores at the stack pointer then increments it; `pop` decrements then
/// loads. Both refuse to move the pointer outside `0..=STACK_DEPTH`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Stack {
    frames: [u16; STACK_DEPTH],
    sp: usize,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` without modifying the stack if every frame is in use.
    #[must_use]
    pub fn push(&mut self, addr: u16) -> bool {
        match self.frames.get_mut(self.sp) {
            Some(frame) => {
                *frame = addr;
                self.sp += 1;
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<u16> {
        self.sp = self.sp.checked_sub(1)?;
        Some(self.frames[self.sp])
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn is_full(&self) -> bool {
        self.sp == STACK_DEPTH
    }

    /// The active frames, oldest first.
    pub fn active(&self) -> &[u16] {
        &self.frames[..self.sp]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = Stack::new();
        assert!(stack.push(0x200));
        assert!(stack.push(0x300));
        assert_eq!(stack.active(), &[0x200, 0x300]);
        assert_eq!(stack.pop(), Some(0x300));
        assert_eq!(stack.pop(), Some(0x200));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.sp(), 0);
    }

    #[test]
    fn push_on_full_stack_is_refused() {
        let mut stack = Stack::new();
        for addr in 0..STACK_DEPTH as u16 {
            assert!(stack.push(addr));
        }
        assert!(stack.is_full());
        assert!(!stack.push(0xFFF));
        assert_eq!(stack.sp(), STACK_DEPTH);
        assert_eq!(stack.active().last(), Some(&(STACK_DEPTH as u16 - 1)));
    }
}
