use crate::runtime::register::Register;
use crate::runtime::runtime_error::RuntimeError;

/// Growable register stack with a window for the current frame.
///
/// Invariant: `base <= top <= slots.len()`. Storage past `top` may hold
/// stale values from earlier frames; it is overwritten before reuse.
#[derive(Debug, Clone, Default)]
pub struct DataStack {
    slots: Vec<Register>,
    // first slot of the current frame
    base: usize,
    // next free slot of the current frame
    top: usize,
}

impl DataStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn top(&self) -> usize {
        self.top
    }

    /// Slots in the current frame.
    pub fn frame_len(&self) -> usize {
        self.top - self.base
    }

    /// Live slots, from the bottom of the stack up to `top`.
    pub fn live(&self) -> &[Register] {
        &self.slots[..self.top]
    }

    /// Backing storage, including slots past `top`.
    pub fn storage_len(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, offset: usize) -> Result<usize, RuntimeError> {
        let idx = self.base + offset;
        if idx >= self.top {
            return Err(RuntimeError::FrameOutOfBounds {
                offset,
                base: self.base,
                top: self.top,
            });
        }
        Ok(idx)
    }

    pub fn get(&self, offset: usize) -> Result<Register, RuntimeError> {
        let idx = self.index(offset)?;
        Ok(self.slots[idx])
    }

    pub fn set(&mut self, offset: usize, value: Register) -> Result<(), RuntimeError> {
        let idx = self.index(offset)?;
        self.slots[idx] = value;
        Ok(())
    }

    pub fn push(&mut self, value: Register) {
        if self.top < self.slots.len() {
            self.slots[self.top] = value;
        } else {
            self.slots.push(value);
        }
        self.top += 1;
    }

    /// Make sure storage covers `base + amount` slots. `top` does not move.
    pub fn reserve(&mut self, amount: usize) {
        let wanted = self.base + amount;
        if self.slots.len() < wanted {
            self.slots.resize(wanted, Register::ZERO);
        }
    }

    /// Grow the current frame by `amount` zeroed slots.
    pub fn expand(&mut self, amount: usize) {
        let new_top = self.top + amount;
        if self.slots.len() < new_top {
            self.slots.resize(new_top, Register::ZERO);
        }
        self.slots[self.top..new_top].fill(Register::ZERO);
        self.top = new_top;
    }

    /// Reposition the frame window. Used by CALL and RET.
    pub(crate) fn set_frame(&mut self, base: usize, top: usize) -> Result<(), RuntimeError> {
        if base > top || top > self.slots.len() {
            return Err(RuntimeError::ReturnOutOfBounds {
                live: top.saturating_sub(base),
                top: base,
                len: self.slots.len(),
            });
        }
        self.base = base;
        self.top = top;
        Ok(())
    }
}
