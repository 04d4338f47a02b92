use crate::runtime::runtime_error::RuntimeError;

/// Caller context saved by CALL and restored by RET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Instruction to resume at.
    pub return_ip: usize,
    pub saved_base: usize,
    /// Caller's top before its outgoing arguments were pushed.
    pub saved_top: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Result<Frame, RuntimeError> {
        self.frames.pop().ok_or(RuntimeError::CallStackUnderflow)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost frame last.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}
