use crate::bytecode::{Bytecode, Opcode, Program};
use std::io::{self, Write};

/// Print disassembly of a bytecode program
pub fn print_program(program: &Program) -> io::Result<()> {
    disassemble(program, &mut io::stdout().lock())
}

/// Write disassembly of a bytecode program
pub fn disassemble(program: &Program, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "════════════════════════════════════════")?;
    writeln!(out, " {} instructions, {} functions", program.code.len(), program.function_count())?;
    writeln!(out, "════════════════════════════════════════")?;

    for (ip, bc) in program.code.iter().enumerate() {
        let starts = function_starting_at(program, ip);

        if let Some(index) = starts {
            let name = program.function_name(index).unwrap_or("?");
            let frame = program.frame_sizes.get(index).copied().unwrap_or(0);
            writeln!(out, "      ┌── {} (fn {}, frame {})", name, index, frame)?;
        }

        write!(out, "{:04} ", ip)?;
        if ip == program.entry {
            write!(out, "→ ")?;
        } else if starts.is_some() {
            write!(out, "► ")?;
        } else {
            write!(out, "  ")?;
        }

        writeln!(out, "{}", format_instruction(program, bc))?;
    }

    Ok(())
}

/// Write the function table: index, entry point, frame size, name.
pub fn write_function_table(program: &Program, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "--- FUNCTIONS ---")?;
    for (index, &start) in program.functions.iter().enumerate() {
        writeln!(
            out,
            "{:3} | @{:04} frame {:<3} {}",
            index,
            start,
            program.frame_sizes.get(index).copied().unwrap_or(0),
            program.function_name(index).unwrap_or("")
        )?;
    }
    Ok(())
}

pub fn format_instruction(program: &Program, bc: &Bytecode) -> String {
    let mnemonic = format!("{:<10}", bc.op.mnemonic());
    match bc.op {
        Opcode::ZeroAcc => bc.op.mnemonic().to_string(),
        Opcode::Add | Opcode::Load | Opcode::Store | Opcode::Arg => {
            format!("{}[{}]", mnemonic, bc.arg)
        }
        Opcode::AddImm | Opcode::ArgImm => format!("{}#{}", mnemonic, bc.arg),
        Opcode::Call => match program.function_name(bc.arg as usize) {
            Some(name) => format!("{}{}  ; {}", mnemonic, bc.arg, name),
            None => format!("{}{}  ; <unregistered>", mnemonic, bc.arg),
        },
        Opcode::Ret => format!("{}{}", mnemonic, bc.arg),
    }
}

/// Function index whose body starts at `ip`, if any.
fn function_starting_at(program: &Program, ip: usize) -> Option<usize> {
    program.functions.iter().position(|&start| start == ip)
}
