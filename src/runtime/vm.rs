use std::collections::HashMap;
use std::io::{self, Write};

use log::{debug, trace};

use crate::bytecode::build_error::BuildError;
use crate::bytecode::disasm::write_function_table;
use crate::bytecode::ir::call_operand;
use crate::bytecode::{Bytecode, Opcode, Program};
use crate::frontend::hexdump::write_hex_spaced;
use crate::runtime::call_stack::{CallStack, Frame};
use crate::runtime::data_stack::DataStack;
use crate::runtime::register::Register;
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// Accumulator machine over a frame-windowed data stack.
///
/// The VM is driven one instruction at a time by the caller. Code can be
/// appended directly through the `push_*`/`*_label` methods, or built
/// ahead of time with [`crate::bytecode::ProgramBuilder`] and loaded with
/// [`Vm::from_program`].
pub struct Vm {
    accumulator: Register,
    // outgoing arguments pushed since the last CALL
    pending_args: usize,
    stack: DataStack,
    call_stack: CallStack,

    program: Program,
    labels: HashMap<String, usize>,
    open_label: Option<String>,
    next_ip: usize,

    // Safety limits
    config: VmConfig,
    steps: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            accumulator: Register::ZERO,
            pending_args: 0,
            stack: DataStack::new(),
            call_stack: CallStack::new(),
            program: Program::new(),
            labels: HashMap::new(),
            open_label: None,
            next_ip: 0,
            config,
            steps: 0,
        }
    }

    pub fn with_code(code: Vec<Bytecode>) -> Self {
        let mut vm = Self::new();
        vm.program.code = code;
        vm
    }

    /// Load a finalized program; execution starts at its entry point.
    pub fn from_program(program: Program) -> Self {
        let mut vm = Self::new();
        vm.load_program(program);
        vm
    }

    pub fn load_program(&mut self, program: Program) {
        self.labels = program
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        self.next_ip = program.entry;
        self.open_label = None;
        self.program = program;
    }

    /// Append instructions in their raw two-byte form.
    pub fn load_raw(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() % 2 != 0 {
            return Err(RuntimeError::TruncatedBytecode(bytes.len()));
        }
        let decoded = bytes
            .chunks_exact(2)
            .map(|pair| Bytecode::decode([pair[0], pair[1]]))
            .collect::<Result<Vec<_>, _>>()?;
        self.program.code.extend(decoded);
        Ok(())
    }

    // =========================================================================
    // State access
    // =========================================================================

    pub fn accumulator(&self) -> Register {
        self.accumulator
    }

    pub fn set_accumulator(&mut self, value: Register) {
        self.accumulator = value;
    }

    pub fn pending_args(&self) -> usize {
        self.pending_args
    }

    pub fn push_data(&mut self, value: Register) {
        self.stack.push(value);
    }

    pub fn stack(&self) -> &DataStack {
        &self.stack
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.depth()
    }

    pub fn call_frames(&self) -> &[Frame] {
        self.call_stack.frames()
    }

    pub fn next_instruction_index(&self) -> usize {
        self.next_ip
    }

    pub fn set_next_instruction_index(&mut self, ip: usize) {
        self.next_ip = ip;
    }

    pub fn code(&self) -> &[Bytecode] {
        &self.program.code
    }

    pub fn function_table(&self) -> &[usize] {
        &self.program.functions
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn execute_next_instruction(&mut self) -> Result<(), RuntimeError> {
        self.check_limits()?;

        let ip = self.next_ip;
        let instruction = *self
            .program
            .code
            .get(ip)
            .ok_or(RuntimeError::InstructionOutOfRange {
                ip,
                len: self.program.code.len(),
            })?;

        trace!("{:04} {}", ip, instruction);

        // advance first: CALL overwrites next_ip and must not be clobbered
        self.next_ip += 1;
        self.execute_instruction(instruction)
    }

    /// Execute exactly `count` instructions from the code buffer.
    pub fn step(&mut self, count: usize) -> Result<(), RuntimeError> {
        for _ in 0..count {
            self.execute_next_instruction()?;
        }
        Ok(())
    }

    /// Run until top-level code is exhausted. Returns the number of steps.
    ///
    /// Top-level code ends at the end of the buffer, or where it would fall
    /// into a function body with no call in progress.
    pub fn run_to_end(&mut self) -> Result<usize, RuntimeError> {
        let mut executed = 0;
        while !self.is_finished() {
            self.execute_next_instruction()?;
            executed += 1;
        }
        Ok(executed)
    }

    /// True once top-level code has nothing left to execute.
    pub fn is_finished(&self) -> bool {
        if self.next_ip >= self.program.code.len() {
            return true;
        }
        self.call_stack.is_empty() && self.program.functions.contains(&self.next_ip)
    }

    /// Execute instructions that are not part of the code buffer.
    pub fn execute_instructions(&mut self, instructions: &[Bytecode]) -> Result<(), RuntimeError> {
        for &instruction in instructions {
            self.execute_instruction(instruction)?;
        }
        Ok(())
    }

    pub fn execute_instruction(&mut self, instruction: Bytecode) -> Result<(), RuntimeError> {
        let arg = instruction.arg;

        match instruction.op {
            Opcode::Add => {
                let value = self.stack.get(arg as usize)?;
                self.accumulator = self.accumulator.wrapping_add(value.i32());
            }
            Opcode::AddImm => {
                self.accumulator = self.accumulator.wrapping_add(arg as i32);
            }
            Opcode::Load => {
                self.accumulator = self.stack.get(arg as usize)?;
            }
            Opcode::Store => {
                self.stack.set(arg as usize, self.accumulator)?;
            }
            Opcode::ZeroAcc => {
                self.accumulator = Register::ZERO;
            }

            Opcode::Arg => {
                let value = self.stack.get(arg as usize)?;
                self.push_arg(value)?;
            }
            Opcode::ArgImm => {
                self.push_arg(Register::new(arg as i32))?;
            }
            Opcode::Call => self.call(arg as usize)?,
            Opcode::Ret => self.ret(arg as usize)?,
        }

        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimitExceeded(max));
            }
        }

        Ok(())
    }

    fn ensure_stack_room(&self, extra: usize) -> Result<(), RuntimeError> {
        if self.stack.top() + extra > self.config.max_stack_size {
            return Err(RuntimeError::StackOverflow(self.config.max_stack_size));
        }
        Ok(())
    }

    fn push_arg(&mut self, value: Register) -> Result<(), RuntimeError> {
        self.ensure_stack_room(1)?;
        self.stack.push(value);
        self.pending_args += 1;
        Ok(())
    }

    fn call(&mut self, index: usize) -> Result<(), RuntimeError> {
        let count = self.program.functions.len();
        let (start, frame_size) = match (
            self.program.functions.get(index),
            self.program.frame_sizes.get(index),
        ) {
            (Some(&start), Some(&frame_size)) => (start, frame_size),
            _ => return Err(RuntimeError::UnknownFunction { index, count }),
        };

        if self.call_stack.depth() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded(self.config.max_call_depth));
        }

        let pending = self.pending_args;
        if pending > self.stack.frame_len() {
            return Err(RuntimeError::ArgumentUnderflow {
                pending,
                available: self.stack.frame_len(),
            });
        }
        self.ensure_stack_room(frame_size)?;

        let top = self.stack.top();
        let callee_base = top - pending;

        self.call_stack.push(Frame {
            return_ip: self.next_ip,
            saved_base: self.stack.base(),
            saved_top: callee_base,
        });

        // arguments become the first slots of the callee frame, locals follow
        self.stack.set_frame(callee_base, top)?;
        self.stack.reserve(pending + frame_size);
        self.stack.expand(frame_size);

        debug!(
            "call fn {} @{:04}: base {} args {} locals {} depth {}",
            index,
            start,
            callee_base,
            pending,
            frame_size,
            self.call_stack.depth()
        );

        self.pending_args = 0;
        self.next_ip = start;
        Ok(())
    }

    fn ret(&mut self, live: usize) -> Result<(), RuntimeError> {
        let frame = *self
            .call_stack
            .frames()
            .last()
            .ok_or(RuntimeError::CallStackUnderflow)?;

        // kept slots come from the start of the callee frame
        let new_top = frame.saved_top + live;
        if new_top > self.stack.top() {
            return Err(RuntimeError::ReturnOutOfBounds {
                live,
                top: frame.saved_top,
                len: self.stack.top(),
            });
        }

        self.call_stack.pop()?;
        self.stack.set_frame(frame.saved_base, new_top)?;
        self.pending_args = 0;
        self.next_ip = frame.return_ip;

        debug!(
            "ret to @{:04}: base {} top {} depth {}",
            frame.return_ip,
            frame.saved_base,
            new_top,
            self.call_stack.depth()
        );
        Ok(())
    }

    // =========================================================================
    // Code construction
    // =========================================================================

    pub fn push_instruction(&mut self, instruction: Bytecode) {
        self.program.code.push(instruction);
    }

    /// Emit a CALL to an already defined label.
    pub fn push_call_instruction(&mut self, label: &str) -> Result<(), BuildError> {
        let index = *self
            .labels
            .get(label)
            .ok_or_else(|| BuildError::UnknownLabel(label.to_string()))?;
        self.push_instruction(Bytecode::new(Opcode::Call, call_operand(index)?));
        Ok(())
    }

    /// Start a labeled function at the end of the code buffer and return
    /// its function-table index.
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

        let index = self.program.register_function(label, frame_size)?;
        self.labels.insert(label.to_string(), index);
        self.open_label = Some(label.to_string());

        debug!(
            "label '{}' -> function {} at {} (frame {})",
            label,
            index,
            self.program.functions[index],
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

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn print_next_instruction(&self, out: &mut impl Write) -> io::Result<()> {
        match self.program.code.get(self.next_ip) {
            Some(bc) => writeln!(out, "  {} | {}", self.next_ip, bc),
            None => writeln!(out, "  {} | <end of code>", self.next_ip),
        }
    }

    pub fn print_registers(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "--- ACC ---")?;
        write_register(self.accumulator, out)?;

        writeln!(out, "--- REGISTERS ---")?;
        writeln!(
            out,
            "sbp: {} stp: {} args: {}",
            self.stack.base(),
            self.stack.top(),
            self.pending_args
        )?;
        let live = self.stack.live();
        for i in self.stack.base()..self.stack.top() {
            write!(out, "{:2} | ", i)?;
            write_register(live[i], out)?;
        }
        Ok(())
    }

    pub fn print_function_table(&self, out: &mut impl Write) -> io::Result<()> {
        write_function_table(&self.program, out)
    }

    pub fn print_call_stack(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "--- CALL STACK ---")?;
        for (depth, frame) in self.call_stack.frames().iter().enumerate().rev() {
            writeln!(
                out,
                "{:2} | ret @{:04} sbp {} stp {}",
                depth, frame.return_ip, frame.saved_base, frame.saved_top
            )?;
        }
        Ok(())
    }

    pub fn print_current_state(&self, out: &mut impl Write) -> io::Result<()> {
        self.print_next_instruction(out)?;
        self.print_registers(out)?;
        self.print_call_stack(out)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn write_register(reg: Register, out: &mut impl Write) -> io::Result<()> {
    write_hex_spaced(&reg.to_bytes(), out)?;
    writeln!(out, "    {}", reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ProgramBuilder;
    use crate::runtime::runtime_error::ErrorKind;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn bc(op: Opcode, arg: u8) -> Bytecode {
        Bytecode::new(op, arg)
    }

    fn vm_with_stack(code: Vec<Bytecode>, stack: &[i32]) -> Vm {
        let mut vm = Vm::with_code(code);
        for &v in stack {
            vm.push_data(Register::new(v));
        }
        vm
    }

    /// Run every instruction and return the accumulator
    fn run_ops(code: Vec<Bytecode>, stack: &[i32]) -> Result<i32, RuntimeError> {
        let mut vm = vm_with_stack(code, stack);
        vm.run_to_end()?;
        Ok(vm.accumulator().i32())
    }

    fn assert_acc(code: Vec<Bytecode>, stack: &[i32], expected: i32) {
        let acc = run_ops(code, stack).expect("execution should succeed");
        assert_eq!(acc, expected, "accumulator mismatch");
    }

    fn assert_error(code: Vec<Bytecode>, stack: &[i32], kind: ErrorKind) {
        match run_ops(code, stack) {
            Ok(acc) => panic!("expected {:?} error, got accumulator {}", kind, acc),
            Err(e) => assert_eq!(e.kind(), kind, "unexpected error: {}", e),
        }
    }

    fn live(vm: &Vm) -> Vec<i32> {
        vm.stack().live().iter().map(|r| r.i32()).collect()
    }

    // ============================================================
    // Accumulator opcodes
    // ============================================================

    #[test]
    fn test_add_from_stack() {
        let mut vm = vm_with_stack(vec![bc(Opcode::Add, 0), bc(Opcode::Add, 1)], &[123, 9]);
        vm.set_accumulator(Register::new(456));
        vm.execute_next_instruction().unwrap();
        assert_eq!(vm.accumulator().i32(), 579);
        vm.execute_next_instruction().unwrap();
        assert_eq!(vm.accumulator().i32(), 588);
    }

    #[test]
    fn test_add_imm() {
        assert_acc(vec![bc(Opcode::AddImm, 200), bc(Opcode::AddImm, 55)], &[], 255);
    }

    #[test]
    fn test_load_store_compose() {
        // acc = s0; acc += s1; s2 = acc; acc = 0; acc += s2 + 1
        assert_acc(
            vec![
                bc(Opcode::Load, 0),
                bc(Opcode::Add, 1),
                bc(Opcode::Store, 2),
                bc(Opcode::ZeroAcc, 0),
                bc(Opcode::Add, 2),
                bc(Opcode::AddImm, 1),
            ],
            &[4, 5, 0],
            10,
        );
    }

    #[test]
    fn test_store_writes_slot() {
        let mut vm = vm_with_stack(vec![bc(Opcode::AddImm, 7), bc(Opcode::Store, 1)], &[1, 2]);
        vm.run_to_end().unwrap();
        assert_eq!(live(&vm), vec![1, 7]);
    }

    #[test]
    fn test_zero_acc_resets() {
        for start in [0, -1, i32::MAX, i32::MIN] {
            let mut vm = Vm::with_code(vec![bc(Opcode::ZeroAcc, 0)]);
            vm.set_accumulator(Register::new(start));
            vm.execute_next_instruction().unwrap();
            assert_eq!(vm.accumulator(), Register::ZERO);
        }
    }

    #[test]
    fn test_add_wraps_on_overflow() {
        let mut vm = vm_with_stack(vec![bc(Opcode::Add, 0)], &[1]);
        vm.set_accumulator(Register::new(i32::MAX));
        vm.execute_next_instruction().unwrap();
        assert_eq!(vm.accumulator().i32(), i32::MIN);
    }

    // ============================================================
    // Calling convention
    // ============================================================

    /// ZERO_ACC; ARG 0; ARG 1; CALL foo  with foo = LOAD 0; ADD 1; RET 0
    fn arg_passing_program() -> Program {
        let mut b = ProgramBuilder::new();
        b.push(Opcode::ZeroAcc, 0)
            .push(Opcode::Arg, 0)
            .push(Opcode::Arg, 1)
            .push_call("foo");

        b.begin_label("foo", 0).unwrap();
        b.push(Opcode::Load, 0)
            .push(Opcode::Add, 1)
            .push(Opcode::Ret, 0);
        b.end_label().unwrap();

        b.finish().unwrap()
    }

    #[test]
    fn test_arg_passing_round_trip() {
        let mut vm = Vm::from_program(arg_passing_program());
        vm.push_data(Register::new(1));
        vm.push_data(Register::new(2));

        vm.step(6).unwrap();
        assert_eq!(vm.accumulator().i32(), 3);
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.stack().base(), 2);
    }

    #[test]
    fn test_arg_does_not_touch_accumulator() {
        let mut vm = vm_with_stack(vec![bc(Opcode::Arg, 0), bc(Opcode::ArgImm, 9)], &[5]);
        vm.set_accumulator(Register::new(40));
        vm.step(2).unwrap();
        assert_eq!(vm.accumulator().i32(), 40);
        assert_eq!(vm.pending_args(), 2);
        assert_eq!(live(&vm), vec![5, 5, 9]);
    }

    #[test]
    fn test_call_then_ret_restores_context() {
        let mut vm = Vm::from_program(arg_passing_program());
        vm.push_data(Register::new(1));
        vm.push_data(Register::new(2));

        vm.step(4).unwrap();
        assert_eq!(vm.next_instruction_index(), 4);
        assert_eq!(vm.stack().base(), 2);
        assert_eq!(vm.stack().top(), 4);
        assert_eq!(vm.pending_args(), 0);

        vm.step(3).unwrap();
        assert_eq!(vm.next_instruction_index(), 4);
        assert_eq!(vm.stack().base(), 0);
        assert_eq!(vm.stack().top(), 2);
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.accumulator().i32(), 3);
    }

    #[test]
    fn test_ret_keeps_return_slot() {
        // callee stores its result into its first slot and keeps it live
        let mut b = ProgramBuilder::new();
        b.begin_label("double", 0).unwrap();
        b.push(Opcode::Load, 0)
            .push(Opcode::Add, 0)
            .push(Opcode::Store, 0)
            .push(Opcode::Ret, 1);
        b.end_label().unwrap();
        b.mark_entry().push(Opcode::ArgImm, 21).push_call("double");

        let mut vm = Vm::from_program(b.finish().unwrap());
        vm.push_data(Register::new(-1));
        let steps = vm.run_to_end().unwrap();

        assert_eq!(steps, 6);
        assert_eq!(live(&vm), vec![-1, 42]);
        assert_eq!(vm.stack().base(), 0);
        assert_eq!(vm.accumulator().i32(), 42);
    }

    #[test]
    fn test_locals_are_zeroed_frame_slots() {
        let mut b = ProgramBuilder::new();
        b.begin_label("f", 2).unwrap();
        b.push(Opcode::Load, 0)
            .push(Opcode::Store, 2)
            .push(Opcode::ZeroAcc, 0)
            .push(Opcode::Add, 1)
            .push(Opcode::Add, 2)
            .push(Opcode::Ret, 0);
        b.end_label().unwrap();
        b.mark_entry().push(Opcode::ArgImm, 3).push_call("f");

        let mut vm = Vm::from_program(b.finish().unwrap());
        vm.run_to_end().unwrap();
        // local 1 starts at zero, local 2 received the argument
        assert_eq!(vm.accumulator().i32(), 3);
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_nested_calls_unwind_lifo() {
        let mut b = ProgramBuilder::new();
        b.begin_label("inner", 0).unwrap();
        b.push(Opcode::Load, 0).push(Opcode::AddImm, 1).push(Opcode::Ret, 0);
        b.end_label().unwrap();

        b.begin_label("outer", 0).unwrap();
        b.push(Opcode::Arg, 0).push_call("inner").push(Opcode::Ret, 0);
        b.end_label().unwrap();

        b.mark_entry().push(Opcode::ArgImm, 10).push_call("outer");
        let mut vm = Vm::from_program(b.finish().unwrap());

        vm.step(4).unwrap();
        assert_eq!(vm.call_depth(), 2);
        let frames = vm.call_frames().to_vec();
        assert_eq!(frames[0].saved_base, 0);
        assert_eq!(frames[0].saved_top, 0);
        assert_eq!(frames[1].saved_base, 0);
        assert_eq!(frames[1].saved_top, 1);

        vm.step(3).unwrap();
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.stack().base(), 0);
        assert_eq!(vm.stack().top(), 1);

        vm.step(1).unwrap();
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.stack().top(), 0);
        assert_eq!(vm.accumulator().i32(), 11);
        assert_eq!(vm.next_instruction_index(), vm.code().len());
    }

    // ============================================================
    // Direct construction API
    // ============================================================

    #[test]
    fn test_labels_on_vm() {
        let mut vm = Vm::new();
        let foo = vm.begin_label("foo", 0).unwrap();
        vm.push_instruction(bc(Opcode::Load, 0));
        vm.push_instruction(bc(Opcode::Add, 1));
        vm.push_instruction(bc(Opcode::Ret, 0));
        vm.end_label().unwrap();

        let bar = vm.begin_label("bar", 1).unwrap();
        vm.push_instruction(bc(Opcode::Ret, 0));
        vm.end_label().unwrap();

        assert_ne!(foo, bar);
        assert_eq!(vm.function_table(), &[0, 3]);

        let main = vm.code().len();
        vm.push_instruction(bc(Opcode::ZeroAcc, 0));
        vm.push_instruction(bc(Opcode::Arg, 0));
        vm.push_instruction(bc(Opcode::Arg, 1));
        vm.push_call_instruction("foo").unwrap();
        assert_eq!(vm.code()[main + 3], bc(Opcode::Call, foo as u8));

        vm.push_data(Register::new(1));
        vm.push_data(Register::new(2));
        vm.set_next_instruction_index(main);
        vm.step(6).unwrap();
        assert_eq!(vm.accumulator().i32(), 3);
    }

    #[test]
    fn test_call_to_unknown_label() {
        let mut vm = Vm::new();
        assert_eq!(
            vm.push_call_instruction("nope"),
            Err(BuildError::UnknownLabel("nope".to_string()))
        );
        assert!(vm.code().is_empty());
    }

    #[test]
    fn test_call_to_label_past_operand_range() {
        let mut program = Program::new();
        program.code.push(bc(Opcode::Ret, 0));
        for i in 0..300 {
            program.functions.push(0);
            program.frame_sizes.push(0);
            program.names.push(format!("f{}", i));
        }

        let mut vm = Vm::from_program(program);
        assert_eq!(
            vm.push_call_instruction("f299"),
            Err(BuildError::FunctionTableFull(299))
        );
        assert_eq!(vm.code().len(), 1);

        vm.push_call_instruction("f255").unwrap();
        assert_eq!(vm.code()[1], bc(Opcode::Call, 255));
    }

    #[test]
    fn test_vm_label_nesting_and_duplicates() {
        let mut vm = Vm::new();
        vm.begin_label("a", 0).unwrap();
        assert!(matches!(
            vm.begin_label("b", 0),
            Err(BuildError::NestedLabel { .. })
        ));
        vm.end_label().unwrap();
        assert_eq!(vm.end_label(), Err(BuildError::NoOpenLabel));
        assert_eq!(
            vm.begin_label("a", 0),
            Err(BuildError::DuplicateLabel("a".to_string()))
        );
    }

    #[test]
    fn test_load_raw() {
        let mut vm = Vm::new();
        vm.load_raw(&[1, 5, 1, 6]).unwrap();
        vm.run_to_end().unwrap();
        assert_eq!(vm.accumulator().i32(), 11);

        assert_eq!(vm.load_raw(&[1]), Err(RuntimeError::TruncatedBytecode(1)));
        assert_eq!(vm.load_raw(&[1, 0, 99, 0]), Err(RuntimeError::UnknownOpcode(99)));
        assert_eq!(vm.code().len(), 2);
    }

    #[test]
    fn test_execute_instructions_outside_buffer() {
        let mut vm = vm_with_stack(vec![], &[3, 4]);
        vm.execute_instructions(&[bc(Opcode::Load, 1), bc(Opcode::Add, 0)])
            .unwrap();
        assert_eq!(vm.accumulator().i32(), 7);
        assert_eq!(vm.next_instruction_index(), 0);
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_error_read_past_frame() {
        assert_error(vec![bc(Opcode::Load, 2)], &[1, 2], ErrorKind::StackDiscipline);
        assert_error(vec![bc(Opcode::Store, 0)], &[], ErrorKind::StackDiscipline);
        assert_error(vec![bc(Opcode::Arg, 1)], &[1], ErrorKind::StackDiscipline);
    }

    #[test]
    fn test_error_ret_without_call() {
        let err = run_ops(vec![bc(Opcode::Ret, 0)], &[]).unwrap_err();
        assert_eq!(err, RuntimeError::CallStackUnderflow);
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_error_unregistered_function() {
        let err = run_ops(vec![bc(Opcode::Call, 3)], &[]).unwrap_err();
        assert_eq!(err, RuntimeError::UnknownFunction { index: 3, count: 0 });
    }

    #[test]
    fn test_error_running_off_the_end() {
        let mut vm = Vm::with_code(vec![bc(Opcode::ZeroAcc, 0)]);
        vm.step(1).unwrap();
        assert_eq!(
            vm.execute_next_instruction(),
            Err(RuntimeError::InstructionOutOfRange { ip: 1, len: 1 })
        );
    }

    #[test]
    fn test_error_ret_keeps_too_many_slots() {
        let mut b = ProgramBuilder::new();
        b.begin_label("f", 0).unwrap();
        b.push(Opcode::Ret, 2);
        b.end_label().unwrap();
        b.mark_entry().push(Opcode::ArgImm, 1).push_call("f");

        let mut vm = Vm::from_program(b.finish().unwrap());
        let err = vm.run_to_end().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackDiscipline);
        // the frame is still in place
        assert_eq!(vm.call_depth(), 1);
    }

    #[test]
    fn test_error_call_depth_limit() {
        let mut b = ProgramBuilder::new();
        b.begin_label("forever", 0).unwrap();
        b.push_call("forever");
        b.end_label().unwrap();
        b.mark_entry().push_call("forever");

        let mut vm = Vm::from_program(b.finish().unwrap());
        let err = vm.run_to_end().unwrap_err();
        assert_eq!(err, RuntimeError::CallDepthExceeded(1000));
        assert_eq!(err.kind(), ErrorKind::Limit);
    }

    #[test]
    fn test_error_step_limit() {
        let config = VmConfig {
            max_steps: Some(2),
            ..VmConfig::default()
        };
        let mut vm = Vm::with_config(config);
        for _ in 0..3 {
            vm.push_instruction(bc(Opcode::AddImm, 1));
        }
        assert_eq!(vm.run_to_end(), Err(RuntimeError::StepLimitExceeded(2)));
        assert_eq!(vm.accumulator().i32(), 2);
    }

    #[test]
    fn test_error_stack_limit() {
        let config = VmConfig {
            max_stack_size: 2,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_config(config);
        for _ in 0..3 {
            vm.push_instruction(bc(Opcode::ArgImm, 1));
        }
        assert_eq!(vm.run_to_end(), Err(RuntimeError::StackOverflow(2)));
    }

    // ============================================================
    // Diagnostics
    // ============================================================

    #[test]
    fn test_print_registers() {
        let mut vm = vm_with_stack(vec![], &[1, 2]);
        vm.set_accumulator(Register::new(3));

        let mut out = Vec::new();
        vm.print_registers(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("--- ACC ---"));
        assert!(text.contains("<Register i32(3)>"));
        assert!(text.contains("sbp: 0 stp: 2"));
        assert!(text.contains(" 1 | "));
    }

    #[test]
    fn test_print_next_instruction() {
        let vm = Vm::with_code(vec![bc(Opcode::AddImm, 4)]);
        let mut out = Vec::new();
        vm.print_next_instruction(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  0 | ADD_IMM 4\n");
    }

    #[test]
    fn test_print_current_state_includes_call_stack() {
        let mut vm = Vm::from_program(arg_passing_program());
        vm.push_data(Register::new(1));
        vm.push_data(Register::new(2));
        vm.step(4).unwrap();

        let mut out = Vec::new();
        vm.print_current_state(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("--- CALL STACK ---"));
        assert!(text.contains(" 0 | ret @0004 sbp 0 stp 2"));
    }
}
