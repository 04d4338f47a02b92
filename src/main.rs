use std::io::{self, Write};
use std::{env, fs, path::Path};

use thiserror::Error;
use vesper::bytecode::disasm::print_program;
use vesper::{BuildError, Opcode, Program, ProgramBuilder, Register, RuntimeError, Vm};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let trace = args.contains(&"--trace".to_string());
    let disasm = args.contains(&"--dis".to_string());
    let emit = args
        .iter()
        .position(|a| a == "--emit")
        .map(|i| args.get(i + 1).cloned());

    // first non-flag argument that isn't the --emit target is the filename
    let emit_target = emit.clone().flatten();
    let filename = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with('-') && Some(*a) != emit_target.as_ref());

    match filename {
        Some(filename) => {
            ensure_extension(filename);
            match fs::read(filename) {
                Ok(bytes) => match Program::from_bytes(&bytes) {
                    Ok(program) => run_program(program, &[], disasm, trace),
                    Err(e) => {
                        eprintln!("Load error: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            let program = demo_program();

            if let Some(target) = emit {
                let Some(target) = target else {
                    eprintln!("Error: --emit needs a path");
                    std::process::exit(1);
                };
                emit_program(&program, &target);
                return;
            }

            println!("demo mode: foo(1, 2) = LOAD 0; ADD 1");
            run_program(program, &[1, 2], disasm, trace);
        }
    }
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("vbc") {
        eprintln!("Error: expected a .vbc file, got {}", filename);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("VESPER - accumulator bytecode VM");
    println!();
    println!("Usage:");
    println!("  vesper                      Run the argument-passing demo");
    println!("  vesper <file.vbc>           Run a serialized program");
    println!("  vesper --emit <file.vbc>    Write the demo program to a file");
    println!("  vesper --dis ...            Disassemble before running");
    println!("  vesper --trace ...          Dump VM state after every step");
    println!("  vesper --help, -h           Show this help");
}

/// `ZERO_ACC; ARG 0; ARG 1; CALL foo` with `foo = LOAD 0; ADD 1; RET 0`.
fn build_demo() -> Result<Program, BuildError> {
    let mut b = ProgramBuilder::new();
    b.push(Opcode::ZeroAcc, 0)
        .push(Opcode::Arg, 0)
        .push(Opcode::Arg, 1)
        .push_call("foo");

    b.begin_label("foo", 0)?;
    b.push(Opcode::Load, 0)
        .push(Opcode::Add, 1)
        .push(Opcode::Ret, 0);
    b.end_label()?;

    b.finish()
}

fn demo_program() -> Program {
    match build_demo() {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Build error: {}", e);
            std::process::exit(1);
        }
    }
}

fn emit_program(program: &Program, target: &str) {
    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Encode error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = fs::write(target, &bytes) {
        eprintln!("Failed to write '{}': {}", target, e);
        std::process::exit(1);
    }
    println!("wrote {} bytes to {}", bytes.len(), target);
}

#[derive(Debug, Error)]
enum RunError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Trace output failed: {0}")]
    Io(#[from] io::Error),
}

fn run_program(program: Program, stack: &[i32], disasm: bool, trace: bool) {
    if disasm {
        if let Err(e) = print_program(&program) {
            eprintln!("Failed to print program: {}", e);
            std::process::exit(1);
        }
    }

    let mut vm = Vm::from_program(program);
    for &v in stack {
        vm.push_data(Register::new(v));
    }

    let result = if trace {
        run_traced(&mut vm, &mut io::stdout().lock())
    } else {
        vm.run_to_end().map_err(RunError::from)
    };

    match result {
        Ok(steps) => {
            println!("{} steps, accumulator = {}", steps, vm.accumulator().i32());
        }
        Err(e) => {
            eprintln!("{}", e);
            if let RunError::Runtime(_) = e {
                if let Err(io) = vm.print_current_state(&mut io::stderr().lock()) {
                    eprintln!("Failed to dump VM state: {}", io);
                }
            }
            std::process::exit(1);
        }
    }
}

/// Run to the end, dumping state after every step. Stops at the first
/// failed write.
fn run_traced(vm: &mut Vm, out: &mut impl Write) -> Result<usize, RunError> {
    let mut steps = 0;

    vm.print_current_state(out)?;
    while !vm.is_finished() {
        vm.execute_next_instruction()?;
        steps += 1;
        writeln!(out)?;
        vm.print_current_state(out)?;
    }

    Ok(steps)
}
