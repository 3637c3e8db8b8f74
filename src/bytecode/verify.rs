use std::collections::HashSet;

use thiserror::Error;

use crate::bytecode::decode::{ArgKind, DecodeError, OperandValue, decode_all};
use crate::bytecode::ir::{CompiledProgram, ProcDefinition};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("{proc}: {source}")]
    Decode {
        proc: String,
        #[source]
        source: DecodeError,
    },

    #[error("{proc}: string id {id} out of range at offset {offset}")]
    StringId { proc: String, offset: usize, id: u32 },

    #[error("{proc}: local slot {slot} out of range (max {max}) at offset {offset}")]
    Slot {
        proc: String,
        offset: usize,
        slot: u8,
        max: u8,
    },

    #[error("{proc}: jump target {target} is not an instruction boundary at offset {offset}")]
    JumpTarget {
        proc: String,
        offset: usize,
        target: usize,
    },

    #[error("{proc}: super proc {id} does not exist")]
    SuperProc { proc: String, id: u32 },

    #[error("{proc}: {params} parameters do not fit in {max} local slots")]
    Parameters { proc: String, params: usize, max: u8 },
}

/// Check every proc of a program once, before anything runs.
pub fn verify_program(program: &CompiledProgram) -> Result<(), VerifyError> {
    for def in &program.procs {
        verify_proc(program, def)?;
    }
    Ok(())
}

pub fn verify_proc(program: &CompiledProgram, def: &ProcDefinition) -> Result<(), VerifyError> {
    let name = || def.qualified_name();

    if def.parameters.len() > def.max_locals as usize {
        return Err(VerifyError::Parameters {
            proc: name(),
            params: def.parameters.len(),
            max: def.max_locals,
        });
    }
    if let Some(id) = def.super_proc
        && program.proc(id).is_none()
    {
        return Err(VerifyError::SuperProc {
            proc: name(),
            id: id.0,
        });
    }

    let instructions = decode_all(&def.bytecode).map_err(|source| VerifyError::Decode {
        proc: name(),
        source,
    })?;

    let mut boundaries: HashSet<usize> = instructions.iter().map(|i| i.offset).collect();
    // Jumping to the end runs off the proc, which returns its result.
    boundaries.insert(def.bytecode.len());

    let string_count = program.strings.len();
    for ins in &instructions {
        for operand in &ins.operands {
            match operand {
                OperandValue::Str(id) if *id as usize >= string_count => {
                    return Err(VerifyError::StringId {
                        proc: name(),
                        offset: ins.offset,
                        id: *id,
                    });
                }
                OperandValue::Slot(slot) if *slot >= def.max_locals => {
                    return Err(VerifyError::Slot {
                        proc: name(),
                        offset: ins.offset,
                        slot: *slot,
                        max: def.max_locals,
                    });
                }
                OperandValue::Jump(target) if !boundaries.contains(target) => {
                    return Err(VerifyError::JumpTarget {
                        proc: name(),
                        offset: ins.offset,
                        target: *target,
                    });
                }
                OperandValue::Args(args) => {
                    for arg in args {
                        if let ArgKind::Named(id) = arg
                            && *id as usize >= string_count
                        {
                            return Err(VerifyError::StringId {
                                proc: name(),
                                offset: ins.offset,
                                id: *id,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::emit::ProgramBuilder;
    use crate::bytecode::op::Opcode;

    fn single(bytecode: Vec<u8>, max_locals: u8) -> CompiledProgram {
        let mut builder = ProgramBuilder::new();
        builder.proc("", "main", vec![], |_| {}).unwrap();
        let mut program = builder.finish();
        program.procs[0].bytecode = bytecode;
        program.procs[0].max_locals = max_locals;
        program
    }

    #[test]
    fn test_accepts_emitted_program() {
        let mut builder = ProgramBuilder::new();
        builder
            .proc("", "main", vec![], |e| {
                let done = e.label();
                e.push_int(1).jump_to(Opcode::JumpIfFalse, done);
                e.push_string("yes").set_local(0);
                e.mark(done);
                e.push_local(0).op(Opcode::Return);
            })
            .unwrap();
        assert_eq!(verify_program(&builder.finish()), Ok(()));
    }

    #[test]
    fn test_rejects_unknown_opcode() {
        let program = single(vec![0xEE], 0);
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::Decode { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_string_id() {
        let mut bytes = vec![Opcode::PushString as u8];
        bytes.extend_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            verify_program(&single(bytes, 0)),
            Err(VerifyError::StringId { id: 9, .. })
        ));
    }

    #[test]
    fn test_rejects_slot_past_max_locals() {
        let bytes = vec![Opcode::PushLocal as u8, 2];
        assert!(matches!(
            verify_program(&single(bytes, 2)),
            Err(VerifyError::Slot { slot: 2, max: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_jump_into_operand() {
        let mut bytes = vec![Opcode::Jump as u8];
        bytes.extend_from_slice(&2i32.to_le_bytes());
        assert!(matches!(
            verify_program(&single(bytes, 0)),
            Err(VerifyError::JumpTarget { target: 2, .. })
        ));
    }

    #[test]
    fn test_jump_to_end_allowed() {
        let mut bytes = vec![Opcode::Jump as u8];
        bytes.extend_from_slice(&5i32.to_le_bytes());
        assert_eq!(verify_program(&single(bytes, 0)), Ok(()));
    }
}
