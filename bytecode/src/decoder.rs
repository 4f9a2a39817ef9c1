use crate::instruction::Instruction;
use crate::op::{Family, FreqFunc, SimpleOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("pc {pc} is outside the instruction stream")]
    OutOfRange { pc: usize },
    #[error("truncated operand at pc {pc}")]
    Truncated { pc: usize },
    #[error("unknown opcode family {family} at pc {pc}")]
    UnknownFamily { pc: usize, family: u8 },
    #[error("unknown simple operation {operand} at pc {pc}")]
    UnknownSimple { pc: usize, operand: u16 },
    #[error("unknown frequent primitive {operand} at pc {pc}")]
    UnknownFreqFunc { pc: usize, operand: u16 },
}

/// Decode the instruction at `pc`, returning it with the pc that follows.
pub fn decode_at(bytes: &[u8], pc: usize) -> Result<(Instruction, usize), DecodeError> {
    let &byte = bytes.get(pc).ok_or(DecodeError::OutOfRange { pc })?;
    let family = Family::try_from(byte >> 3)
        .map_err(|family| DecodeError::UnknownFamily { pc, family })?;

    let mut next = pc + 1;
    let mut operand = (byte & 0b111) as u16;
    if operand == Family::EXTENDED as u16 {
        let hi = *bytes.get(pc + 1).ok_or(DecodeError::Truncated { pc })?;
        let lo = *bytes.get(pc + 2).ok_or(DecodeError::Truncated { pc })?;
        operand = u16::from_be_bytes([hi, lo]);
        next = pc + 3;
    }

    let instr = match family {
        Family::Simple => {
            // The extended form of operand 1 is pop-handlers, not dup.
            if next == pc + 3 && operand == SimpleOp::POP_HANDLERS {
                Instruction::PopHandlers
            } else {
                match SimpleOp::try_from(operand) {
                    Ok(SimpleOp::Pop) => Instruction::Pop,
                    Ok(SimpleOp::Dup) => Instruction::Dup,
                    Ok(SimpleOp::Return) => Instruction::Return,
                    Ok(SimpleOp::PushSelf) => Instruction::PushSelf,
                    Ok(SimpleOp::SetLexScope) => Instruction::SetLexScope,
                    Ok(SimpleOp::IterNext) => Instruction::IterNext,
                    Ok(SimpleOp::IterDone) => Instruction::IterDone,
                    Err(operand) => {
                        return Err(DecodeError::UnknownSimple { pc, operand });
                    }
                }
            }
        }
        Family::Push => Instruction::Push { literal: operand },
        Family::PushConstant => Instruction::PushConstant { word: operand },
        Family::Call => Instruction::Call { argc: operand },
        Family::Invoke => Instruction::Invoke { argc: operand },
        Family::Send => Instruction::Send { argc: operand },
        Family::SendIfDefined => Instruction::SendIfDefined { argc: operand },
        Family::Resend => Instruction::Resend { argc: operand },
        Family::ResendIfDefined => Instruction::ResendIfDefined { argc: operand },
        Family::Branch => Instruction::Branch { target: operand },
        Family::BranchIfTrue => Instruction::BranchIfTrue { target: operand },
        Family::BranchIfFalse => Instruction::BranchIfFalse { target: operand },
        Family::FindVar => Instruction::FindVar { literal: operand },
        Family::GetVar => Instruction::GetVar { index: operand },
        Family::MakeFrame => Instruction::MakeFrame { count: operand },
        Family::MakeArray => Instruction::MakeArray { count: operand },
        Family::GetPath => Instruction::GetPath {
            strict: operand != 0,
        },
        Family::SetPath => Instruction::SetPath {
            push_value: operand != 0,
        },
        Family::SetVar => Instruction::SetVar { index: operand },
        Family::FindAndSetVar => Instruction::FindAndSetVar { literal: operand },
        Family::IncrVar => Instruction::IncrVar { index: operand },
        Family::BranchIfLoopNotDone => {
            Instruction::BranchIfLoopNotDone { target: operand }
        }
        Family::FreqFunc => Instruction::FreqFunc(
            FreqFunc::try_from(operand)
                .map_err(|operand| DecodeError::UnknownFreqFunc { pc, operand })?,
        ),
        Family::NewHandlers => Instruction::NewHandlers { count: operand },
    };
    Ok((instr, next))
}

/// Walks an instruction stream from the start.
///
/// Yields `(pc, instruction)` pairs; stops after the first error.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the stream.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the decoder has reached the end of the bytecode.
    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_at_end() {
            return None;
        }
        let pc = self.pos;
        match decode_at(self.bytes, pc) {
            Ok((instr, next)) => {
                self.pos = next;
                Some(Ok((pc, instr)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// One line per instruction: `pc: mnemonic`.
pub fn disassemble(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for item in BytecodeDecoder::new(bytes) {
        let _ = match item {
            Ok((pc, instr)) => writeln!(out, "{pc:>5}: {instr}"),
            Err(err) => writeln!(out, "  ???: {err}"),
        };
    }
    out
}
