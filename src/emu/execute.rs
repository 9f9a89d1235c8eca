use super::{
    Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, Machine, Opcode, OpcodeALU, glyph_address,
};
use crate::u4;
use rand::Rng;

impl Machine {
    /// Applies `opcode` to the machine.
    ///
    /// Every check that can fail runs before the first write, so an `Err` leaves the
    /// machine untouched. The program counter is only committed at the end.
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        let pc = self.pc;
        let mut next_pc = pc.wrapping_add(2);
        let mut result = Chip8Result::Continue;

        match opcode {
            Opcode::ClearDisplay => {
                self.display.clear();
                self.draw_flag = true;
                result = Chip8Result::WaitForNextFrame;
            }
            Opcode::Jump { nnn } => {
                next_pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                next_pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                // The call site itself is saved; Return skips over it
                if !self.stack.push(pc) {
                    return Err(Chip8Error::StackOverflow { pc });
                }
                log::debug!("call {nnn:#05X} from {pc:#05X}, depth {}", self.stack.sp());
                next_pc = nnn;
            }
            Opcode::Return => {
                let call_site = self.stack.pop().ok_or(Chip8Error::StackUnderflow { pc })?;
                next_pc = call_site.wrapping_add(2);
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                // No carry flag for this one
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
                result = Chip8Result::WaitForNextFrame;
            }
            Opcode::SkipIfPressed { x } => {
                if self.keypad[u4::low(self.v[x])] {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.keypad[u4::low(self.v[x])] {
                    next_pc = next_pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                if !self.execute_wait_for_key(x) {
                    // Repeat this instruction until a key is released
                    next_pc = pc;
                    result = Chip8Result::WaitForNextFrame;
                }
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                self.i = glyph_address(self.v[x]);
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                self.memory
                    .slice_mut(self.i as usize, 3)?
                    .copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                self.memory
                    .slice_mut(self.i as usize, count)?
                    .copy_from_slice(&self.v[..count]);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let bytes = self.memory.slice(self.i as usize, count)?;
                self.v[..count].copy_from_slice(bytes);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::Unknown(opcode) => {
                return Err(Chip8Error::UnknownOpcode { opcode, pc });
            }
        };

        self.pc = next_pc;
        Ok(result)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => {
                self.v[x] |= self.v[y];
                self.v[u4::F] = 0;
            }
            OpcodeALU::And => {
                self.v[x] &= self.v[y];
                self.v[u4::F] = 0;
            }
            OpcodeALU::Xor => {
                self.v[x] ^= self.v[y];
                self.v[u4::F] = 0;
            }
            OpcodeALU::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[u4::F] = u8::from(overflow);
            }
            OpcodeALU::Sub => {
                let (res, borrow) = self.v[x].overflowing_sub(self.v[y]);
                self.v[x] = res;
                self.v[u4::F] = u8::from(!borrow); // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = self.v[y].overflowing_sub(self.v[x]);
                self.v[x] = res;
                self.v[u4::F] = u8::from(!borrow);
            }
            OpcodeALU::ShiftRight => {
                let lsb = self.v[y] & 1;
                self.v[x] = self.v[y] >> 1;
                self.v[u4::F] = lsb;
            }
            OpcodeALU::ShiftLeft => {
                let msb = (self.v[y] >> 7) & 1;
                self.v[x] = self.v[y] << 1;
                self.v[u4::F] = msb;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), Chip8Error> {
        // The origin wraps around the screen, the sprite itself is clipped at the edges
        let x_pos = self.v[x] as usize % DISPLAY_X;
        let y_pos = self.v[y] as usize % DISPLAY_Y;

        // A zero-row sprite reads nothing, so I may point anywhere
        let sprite = match usize::from(n) {
            0 => &[][..],
            rows => self.memory.slice(self.i as usize, rows)?,
        };

        let mut collision = false;
        for (row, &sprite_byte) in sprite.iter().enumerate() {
            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0
                    && let Some(was_set) = self.display.toggle(x_pos + col, y_pos + row)
                {
                    collision |= was_set;
                }
            }
        }

        log::trace!("drew {n} rows at ({x_pos}, {y_pos}), collision: {collision}");

        self.v[u4::F] = u8::from(collision);
        self.draw_flag = true;
        Ok(())
    }

    /// Returns true once a key has been pressed and released, storing it in `V[x]`.
    fn execute_wait_for_key(&mut self, x: u4) -> bool {
        if let Some(key) = self.wait_release_key
            && !self.keypad[u4::new(key)]
        {
            // The key we were waiting for has been released
            self.v[x] = key;
            self.wait_release_key = None;
            return true;
        }

        if self.wait_release_key.is_none() {
            // Not waiting for a key release yet, check all keys
            self.wait_release_key = (0..16u8).find(|&key| self.keypad[u4::new(key)]);
        }

        false
    }
}
