use std::collections::HashSet;

use crate::bytecode::decode::{ArgKind, Instruction, OperandValue, decode_instruction};
use crate::bytecode::ir::{CompiledProgram, ProcDefinition};
use crate::bytecode::op::{FORMAT_MARKER, Opcode};

/// Print every proc of a program.
pub fn print_program(program: &CompiledProgram) {
    println!("=== BYTECODE PROGRAM ===\n");

    for (id, def) in program.procs.iter().enumerate() {
        println!("════════════════════════════════════════");
        println!(" [{}] {}", id, def.qualified_name());
        println!(
            " {} params, {} locals, {} bytes",
            def.parameters.len(),
            def.max_locals,
            def.bytecode.len()
        );
        println!("════════════════════════════════════════");
        print!("{}", disassemble_to_string(program, def));
        println!();
    }
}

fn collect_jump_targets(instructions: &[Instruction]) -> HashSet<usize> {
    instructions
        .iter()
        .flat_map(|ins| ins.jump_targets())
        .collect()
}

/// Return the listing of one proc as a String.
///
/// A stream that fails to decode is listed up to the bad byte, followed by
/// an `; error:` line.
pub fn disassemble_to_string(program: &CompiledProgram, def: &ProcDefinition) -> String {
    let mut instructions = Vec::new();
    let mut failure = None;
    let mut offset = 0;
    while offset < def.bytecode.len() {
        match decode_instruction(&def.bytecode, offset) {
            Ok(ins) => {
                offset += ins.len;
                instructions.push(ins);
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let jump_targets = collect_jump_targets(&instructions);
    let mut output = String::new();

    for ins in &instructions {
        if jump_targets.contains(&ins.offset) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", ins.offset));
        if jump_targets.contains(&ins.offset) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_instruction(program, ins));
        output.push('\n');
    }

    if let Some(err) = failure {
        output.push_str(&format!("; error: {}\n", err));
    }
    output
}

fn format_instruction(program: &CompiledProgram, ins: &Instruction) -> String {
    let operands: Vec<String> = ins
        .operands
        .iter()
        .map(|operand| format_operand(program, ins, operand))
        .collect();

    if operands.is_empty() {
        ins.opcode.mnemonic().to_string()
    } else {
        format!("{:<14}{}", ins.opcode.mnemonic(), operands.join(", "))
    }
}

fn format_operand(program: &CompiledProgram, ins: &Instruction, operand: &OperandValue) -> String {
    match operand {
        OperandValue::Int(n) => format!("{}", n),
        OperandValue::Float(n) => format!("{:?}", n),
        OperandValue::Str(id) => format_string(program, *id),
        OperandValue::Slot(slot) => format!("local{}", slot),
        OperandValue::Jump(target) => {
            let direction = if *target <= ins.offset { "↑" } else { "↓" };
            format!("{} (→ {:04})", direction, target)
        }
        OperandValue::Args(args) => {
            let parts: Vec<String> = args
                .iter()
                .map(|arg| match arg {
                    ArgKind::Positional => "_".to_string(),
                    ArgKind::Named(id) => format!("{}=", lookup(program, *id)),
                })
                .collect();
            format!("({})", parts.join(" "))
        }
    }
}

fn lookup(program: &CompiledProgram, id: u32) -> String {
    program
        .strings
        .get(id as usize)
        .cloned()
        .unwrap_or_else(|| format!("<string {}>", id))
}

fn format_string(program: &CompiledProgram, id: u32) -> String {
    let text = lookup(program, id).replace(FORMAT_MARKER, "[]");
    format!("{:?}", text)
}

/// Opcode frequency of one proc, most frequent first.
pub fn opcode_counts(def: &ProcDefinition) -> Vec<(Opcode, usize)> {
    let mut counts: Vec<(Opcode, usize)> = Vec::new();
    let mut offset = 0;
    while let Ok(ins) = decode_instruction(&def.bytecode, offset) {
        offset += ins.len;
        match counts.iter_mut().find(|(op, _)| *op == ins.opcode) {
            Some((_, n)) => *n += 1,
            None => counts.push((ins.opcode, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::emit::ProgramBuilder;

    fn looping_program() -> CompiledProgram {
        let mut builder = ProgramBuilder::new();
        builder
            .proc("/mob", "count", vec![], |e| {
                let top = e.label();
                let done = e.label();
                e.push_int(0).set_local(0);
                e.mark(top);
                e.push_local(0).push_int(3).op(Opcode::CompareLessThan);
                e.jump_to(Opcode::JumpIfFalse, done);
                e.push_local(0).push_int(1).op(Opcode::Add).set_local(0);
                e.jump_to(Opcode::Jump, top);
                e.mark(done);
                e.push_string("done").op(Opcode::Return);
            })
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_listing_marks_jump_targets() {
        let program = looping_program();
        let text = disassemble_to_string(&program, &program.procs[0]);
        assert_eq!(text.matches('►').count(), 2);
        assert!(text.contains("JUMP_FALSE"));
        assert!(text.contains("\"done\""));
        assert!(text.contains("↑"));
    }

    #[test]
    fn test_listing_reports_decode_error() {
        let mut program = looping_program();
        program.procs[0].bytecode.push(0xEE);
        let text = disassemble_to_string(&program, &program.procs[0]);
        assert!(text.contains("; error: unknown opcode 0xEE"));
    }

    #[test]
    fn test_named_args_rendered() {
        let mut builder = ProgramBuilder::new();
        builder
            .proc("", "main", vec![], |e| {
                e.push_int(1).push_int(2).push_args(&[None, Some("b")]);
            })
            .unwrap();
        let program = builder.finish();
        let text = disassemble_to_string(&program, &program.procs[0]);
        assert!(text.contains("(_ b=)"));
    }

    #[test]
    fn test_opcode_counts() {
        let program = looping_program();
        let counts = opcode_counts(&program.procs[0]);
        assert_eq!(counts[0].0, Opcode::PushInt);
    }
}
