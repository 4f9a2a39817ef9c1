use core::fmt;

use crate::op::{Family, FreqFunc, SimpleOp};

/// A decoded instruction. Operands are always widened to `u16`, whether they
/// were encoded inline or in the extended form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Pop,
    Dup,
    Return,
    PushSelf,
    SetLexScope,
    IterNext,
    IterDone,
    PopHandlers,
    Push { literal: u16 },
    /// Raw reference word, sign-extended from 16 bits when executed.
    PushConstant { word: u16 },
    Call { argc: u16 },
    Invoke { argc: u16 },
    Send { argc: u16 },
    SendIfDefined { argc: u16 },
    Resend { argc: u16 },
    ResendIfDefined { argc: u16 },
    Branch { target: u16 },
    BranchIfTrue { target: u16 },
    BranchIfFalse { target: u16 },
    FindVar { literal: u16 },
    GetVar { index: u16 },
    MakeFrame { count: u16 },
    /// `count == MakeArray::SIZED` takes size and class from the stack.
    MakeArray { count: u16 },
    GetPath { strict: bool },
    SetPath { push_value: bool },
    SetVar { index: u16 },
    FindAndSetVar { literal: u16 },
    IncrVar { index: u16 },
    BranchIfLoopNotDone { target: u16 },
    FreqFunc(FreqFunc),
    NewHandlers { count: u16 },
}

impl Instruction {
    /// `MakeArray` operand meaning "size and class are on the stack".
    pub const SIZED_ARRAY: u16 = 0xFFFF;

    /// Family and operand this instruction encodes to.
    pub fn encoding(self) -> (Family, u16) {
        match self {
            Self::Pop => (Family::Simple, SimpleOp::Pop as u16),
            Self::Dup => (Family::Simple, SimpleOp::Dup as u16),
            Self::Return => (Family::Simple, SimpleOp::Return as u16),
            Self::PushSelf => (Family::Simple, SimpleOp::PushSelf as u16),
            Self::SetLexScope => (Family::Simple, SimpleOp::SetLexScope as u16),
            Self::IterNext => (Family::Simple, SimpleOp::IterNext as u16),
            Self::IterDone => (Family::Simple, SimpleOp::IterDone as u16),
            Self::PopHandlers => (Family::Simple, SimpleOp::POP_HANDLERS),
            Self::Push { literal } => (Family::Push, literal),
            Self::PushConstant { word } => (Family::PushConstant, word),
            Self::Call { argc } => (Family::Call, argc),
            Self::Invoke { argc } => (Family::Invoke, argc),
            Self::Send { argc } => (Family::Send, argc),
            Self::SendIfDefined { argc } => (Family::SendIfDefined, argc),
            Self::Resend { argc } => (Family::Resend, argc),
            Self::ResendIfDefined { argc } => (Family::ResendIfDefined, argc),
            Self::Branch { target } => (Family::Branch, target),
            Self::BranchIfTrue { target } => (Family::BranchIfTrue, target),
            Self::BranchIfFalse { target } => (Family::BranchIfFalse, target),
            Self::FindVar { literal } => (Family::FindVar, literal),
            Self::GetVar { index } => (Family::GetVar, index),
            Self::MakeFrame { count } => (Family::MakeFrame, count),
            Self::MakeArray { count } => (Family::MakeArray, count),
            Self::GetPath { strict } => (Family::GetPath, strict as u16),
            Self::SetPath { push_value } => (Family::SetPath, push_value as u16),
            Self::SetVar { index } => (Family::SetVar, index),
            Self::FindAndSetVar { literal } => (Family::FindAndSetVar, literal),
            Self::IncrVar { index } => (Family::IncrVar, index),
            Self::BranchIfLoopNotDone { target } => {
                (Family::BranchIfLoopNotDone, target)
            }
            Self::FreqFunc(func) => (Family::FreqFunc, func as u16),
            Self::NewHandlers { count } => (Family::NewHandlers, count),
        }
    }

    /// Whether this instruction may transfer control to its operand.
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Branch { .. }
                | Self::BranchIfTrue { .. }
                | Self::BranchIfFalse { .. }
                | Self::BranchIfLoopNotDone { .. }
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Pop => write!(f, "pop"),
            Self::Dup => write!(f, "dup"),
            Self::Return => write!(f, "return"),
            Self::PushSelf => write!(f, "push-self"),
            Self::SetLexScope => write!(f, "set-lex-scope"),
            Self::IterNext => write!(f, "iter-next"),
            Self::IterDone => write!(f, "iter-done"),
            Self::PopHandlers => write!(f, "pop-handlers"),
            Self::Push { literal } => write!(f, "push lit#{literal}"),
            Self::PushConstant { word } => {
                write!(f, "push-constant 0x{word:04x}")
            }
            Self::Call { argc } => write!(f, "call {argc}"),
            Self::Invoke { argc } => write!(f, "invoke {argc}"),
            Self::Send { argc } => write!(f, "send {argc}"),
            Self::SendIfDefined { argc } => write!(f, "send-if-defined {argc}"),
            Self::Resend { argc } => write!(f, "resend {argc}"),
            Self::ResendIfDefined { argc } => {
                write!(f, "resend-if-defined {argc}")
            }
            Self::Branch { target } => write!(f, "branch @{target}"),
            Self::BranchIfTrue { target } => write!(f, "branch-t @{target}"),
            Self::BranchIfFalse { target } => write!(f, "branch-f @{target}"),
            Self::FindVar { literal } => write!(f, "find-var lit#{literal}"),
            Self::GetVar { index } => write!(f, "get-var {index}"),
            Self::MakeFrame { count } => write!(f, "make-frame {count}"),
            Self::MakeArray { count: Self::SIZED_ARRAY } => {
                write!(f, "make-array sized")
            }
            Self::MakeArray { count } => write!(f, "make-array {count}"),
            Self::GetPath { strict } => write!(f, "get-path {}", strict as u8),
            Self::SetPath { push_value } => {
                write!(f, "set-path {}", push_value as u8)
            }
            Self::SetVar { index } => write!(f, "set-var {index}"),
            Self::FindAndSetVar { literal } => {
                write!(f, "find-and-set-var lit#{literal}")
            }
            Self::IncrVar { index } => write!(f, "incr-var {index}"),
            Self::BranchIfLoopNotDone { target } => {
                write!(f, "branch-if-loop-not-done @{target}")
            }
            Self::FreqFunc(func) => write!(f, "freq-func {}", func.name()),
            Self::NewHandlers { count } => write!(f, "new-handlers {count}"),
        }
    }
}
