use thiserror::Error;

use crate::bytecode::op::{ARG_NAMED, ARG_POSITIONAL, Opcode, Operand};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{byte:02X} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    /// The stream ended inside an operand.
    #[error("truncated operand at offset {offset}")]
    Truncated { offset: usize },

    #[error("bad argument kind {kind} at offset {offset}")]
    BadArgumentKind { kind: u8, offset: usize },

    #[error("negative jump target {target} at offset {offset}")]
    NegativeJump { target: i32, offset: usize },

    #[error("negative argument count {count} at offset {offset}")]
    NegativeCount { count: i32, offset: usize },
}

/// One argument descriptor of a `PushArguments` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    /// Named argument; the payload is the name's string id.
    Named(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperandValue {
    Int(i32),
    Float(f32),
    Str(u32),
    Slot(u8),
    Jump(usize),
    Args(Vec<ArgKind>),
}

/// A fully decoded instruction, for the verifier and the disassembler.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<OperandValue>,
    /// Encoded length in bytes, opcode included.
    pub len: usize,
}

impl Instruction {
    pub fn jump_targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.operands.iter().filter_map(|operand| match operand {
            OperandValue::Jump(target) => Some(*target),
            _ => None,
        })
    }
}

/// Cursor over a proc's byte stream.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        Reader { bytes, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let bytes = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, offset })
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_str(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_slot(&mut self) -> Result<u8, DecodeError> {
        self.read_u8()
    }

    pub fn read_jump(&mut self) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let target = self.read_i32()?;
        usize::try_from(target).map_err(|_| DecodeError::NegativeJump { target, offset })
    }

    pub fn read_args(&mut self) -> Result<Vec<ArgKind>, DecodeError> {
        let offset = self.pos;
        let count = self.read_i32()?;
        let count =
            usize::try_from(count).map_err(|_| DecodeError::NegativeCount { count, offset })?;

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let offset = self.pos;
            match self.read_u8()? {
                ARG_POSITIONAL => args.push(ArgKind::Positional),
                ARG_NAMED => args.push(ArgKind::Named(self.read_str()?)),
                kind => return Err(DecodeError::BadArgumentKind { kind, offset }),
            }
        }
        Ok(args)
    }

    pub fn read_operand(&mut self, kind: Operand) -> Result<OperandValue, DecodeError> {
        Ok(match kind {
            Operand::Int => OperandValue::Int(self.read_i32()?),
            Operand::Float => OperandValue::Float(self.read_f32()?),
            Operand::Str => OperandValue::Str(self.read_str()?),
            Operand::Slot => OperandValue::Slot(self.read_slot()?),
            Operand::Jump => OperandValue::Jump(self.read_jump()?),
            Operand::ArgList => OperandValue::Args(self.read_args()?),
        })
    }
}

pub fn decode_instruction(bytes: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    let mut reader = Reader::new(bytes, offset);
    let opcode = reader.read_opcode()?;
    let operands = opcode
        .operands()
        .iter()
        .map(|kind| reader.read_operand(*kind))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Instruction {
        offset,
        opcode,
        operands,
        len: reader.pos() - offset,
    })
}

/// Decode a whole stream front to back.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let instruction = decode_instruction(bytes, offset)?;
        offset += instruction.len;
        out.push(instruction);
    }
    Ok(out)
}
