use std::collections::HashMap;

use log::debug;

use crate::bytecode::build_error::BuildError;
use crate::bytecode::ir::{call_operand, ensure_function_room};
use crate::bytecode::verify::check_program;
use crate::bytecode::{Bytecode, Opcode, Program};

/// Instruction before label resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingOp {
    Resolved(Bytecode),
    CallLabel(String),
}

/// Two-phase program construction.
///
/// Calls are recorded by label name and only resolved to function
/// indices in [`ProgramBuilder::finish`], so a call may appear before
/// the label it targets is defined.
pub struct ProgramBuilder {
    ops: Vec<PendingOp>,
    functions: Vec<usize>,
    frame_sizes: Vec<usize>,
    names: Vec<String>,
    labels: HashMap<String, usize>,
    open_label: Option<String>,
    entry: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            functions: Vec::new(),
            frame_sizes: Vec::new(),
            names: Vec::new(),
            labels: HashMap::new(),
            open_label: None,
            entry: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: Opcode, arg: u8) -> &mut Self {
        self.ops.push(PendingOp::Resolved(Bytecode::new(op, arg)));
        self
    }

    pub fn push_instruction(&mut self, instruction: Bytecode) -> &mut Self {
        self.ops.push(PendingOp::Resolved(instruction));
        self
    }

    pub fn push_call(&mut self, label: &str) -> &mut Self {
        self.ops.push(PendingOp::CallLabel(label.to_string()));
        self
    }

    /// Make execution start at the next instruction pushed.
    pub fn mark_entry(&mut self) -> &mut Self {
        self.entry = self.ops.len();
        self
    }

    /// Open a labeled function at the current position.
    ///
    /// `frame_size` excludes incoming arguments and return slots.
    pub fn begin_label(&mut self, label: &str, frame_size: usize) -> Result<usize, BuildError> {
        if let Some(outer) = &self.open_label {
            return Err(BuildError::NestedLabel {
                outer: outer.clone(),
                inner: label.to_string(),
            });
        }
        if self.labels.contains_key(label) {
            return Err(BuildError::DuplicateLabel(label.to_string()));
        }
        ensure_function_room(self.functions.len())?;

        let index = self.functions.len();
        self.functions.push(self.ops.len());
        self.frame_sizes.push(frame_size);
        self.names.push(label.to_string());
        self.labels.insert(label.to_string(), index);
        self.open_label = Some(label.to_string());

        debug!(
            "label '{}' -> function {} at {} (frame {})",
            label,
            index,
            self.ops.len(),
            frame_size
        );
        Ok(index)
    }

    pub fn end_label(&mut self) -> Result<(), BuildError> {
        match self.open_label.take() {
            Some(_) => Ok(()),
            None => Err(BuildError::NoOpenLabel),
        }
    }

    /// Resolve every symbolic call and verify the result.
    pub fn finish(self) -> Result<Program, BuildError> {
        if let Some(label) = self.open_label {
            return Err(BuildError::UnclosedLabel(label));
        }

        let mut code = Vec::with_capacity(self.ops.len());
        for op in self.ops {
            let bc = match op {
                PendingOp::Resolved(bc) => bc,
                PendingOp::CallLabel(name) => {
                    let index = *self
                        .labels
                        .get(&name)
                        .ok_or(BuildError::UnknownLabel(name))?;
                    Bytecode::new(Opcode::Call, call_operand(index)?)
                }
            };
            code.push(bc);
        }

        let program = Program {
            code,
            functions: self.functions,
            frame_sizes: self.frame_sizes,
            names: self.names,
            entry: self.entry,
        };
        check_program(&program)?;
        Ok(program)
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
