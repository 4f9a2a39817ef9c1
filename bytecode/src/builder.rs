use crate::instruction::Instruction;
use crate::op::{Family, FreqFunc};

/// A forward reference whose pc has not yet been resolved.
///
/// Created by the `*_label` methods and resolved with
/// [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use]
pub struct Label {
    /// Position of the 16-bit operand in the buffer.
    operand_pos: usize,
    /// The operand holds a pc as an integer reference word rather than a
    /// raw branch target.
    as_int: bool,
}

/// Builds an instruction stream.
///
/// Operands below 7 are packed into the opcode byte; everything else uses the
/// extended form. Forward labels always use the extended form so they can be
/// patched in place.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    buf: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current byte offset in the stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_extended(&mut self, family: Family, operand: u16) {
        self.buf.push(((family as u8) << 3) | Family::EXTENDED);
        self.buf.extend_from_slice(&operand.to_be_bytes());
    }

    fn emit_raw(&mut self, family: Family, operand: u16) {
        if operand < Family::EXTENDED as u16 {
            self.buf.push(((family as u8) << 3) | operand as u8);
        } else {
            self.emit_extended(family, operand);
        }
    }

    /// Append `instr` in its shortest encoding.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        let (family, operand) = instr.encoding();
        if instr == Instruction::PopHandlers {
            self.emit_extended(family, operand);
        } else {
            self.emit_raw(family, operand);
        }
        self
    }

    // ── common instructions ────────────────────────────────────────

    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.emit(Instruction::Dup)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Instruction::Return)
    }

    pub fn push_self(&mut self) -> &mut Self {
        self.emit(Instruction::PushSelf)
    }

    pub fn push(&mut self, literal: u16) -> &mut Self {
        self.emit(Instruction::Push { literal })
    }

    /// Push a raw reference word.
    pub fn push_constant(&mut self, word: u16) -> &mut Self {
        self.emit(Instruction::PushConstant { word })
    }

    /// Push a small integer via push-constant.
    ///
    /// # Panics
    ///
    /// When `n` does not fit a 16-bit reference word (`-8192..=8191`).
    pub fn push_int(&mut self, n: i32) -> &mut Self {
        assert!((-8192..=8191).contains(&n), "{n} does not fit push-constant");
        self.push_constant(((n << 2) as i16) as u16)
    }

    pub fn push_nil(&mut self) -> &mut Self {
        self.push_constant(0x2)
    }

    pub fn push_true(&mut self) -> &mut Self {
        self.push_constant(0x1A)
    }

    pub fn get_var(&mut self, index: u16) -> &mut Self {
        self.emit(Instruction::GetVar { index })
    }

    pub fn set_var(&mut self, index: u16) -> &mut Self {
        self.emit(Instruction::SetVar { index })
    }

    pub fn find_var(&mut self, literal: u16) -> &mut Self {
        self.emit(Instruction::FindVar { literal })
    }

    pub fn find_and_set_var(&mut self, literal: u16) -> &mut Self {
        self.emit(Instruction::FindAndSetVar { literal })
    }

    pub fn call(&mut self, argc: u16) -> &mut Self {
        self.emit(Instruction::Call { argc })
    }

    pub fn invoke(&mut self, argc: u16) -> &mut Self {
        self.emit(Instruction::Invoke { argc })
    }

    pub fn send(&mut self, argc: u16) -> &mut Self {
        self.emit(Instruction::Send { argc })
    }

    pub fn resend(&mut self, argc: u16) -> &mut Self {
        self.emit(Instruction::Resend { argc })
    }

    pub fn freq(&mut self, func: FreqFunc) -> &mut Self {
        self.emit(Instruction::FreqFunc(func))
    }

    // ── labels ─────────────────────────────────────────────────────

    fn emit_label(&mut self, family: Family, as_int: bool) -> Label {
        self.emit_extended(family, 0);
        Label {
            operand_pos: self.buf.len() - 2,
            as_int,
        }
    }

    pub fn branch_label(&mut self) -> Label {
        self.emit_label(Family::Branch, false)
    }

    pub fn branch_if_true_label(&mut self) -> Label {
        self.emit_label(Family::BranchIfTrue, false)
    }

    pub fn branch_if_false_label(&mut self) -> Label {
        self.emit_label(Family::BranchIfFalse, false)
    }

    pub fn branch_if_loop_not_done_label(&mut self) -> Label {
        self.emit_label(Family::BranchIfLoopNotDone, false)
    }

    /// Push the bound pc as an integer, e.g. for an exception handler.
    pub fn push_pc_label(&mut self) -> Label {
        self.emit_label(Family::PushConstant, true)
    }

    /// Resolve `label` to the current offset.
    pub fn bind(&mut self, label: Label) {
        let target = self.current_offset();
        self.bind_to(label, target);
    }

    /// Resolve `label` to `target`.
    ///
    /// # Panics
    ///
    /// When `target` does not fit the label's operand.
    pub fn bind_to(&mut self, label: Label, target: usize) {
        let operand = if label.as_int {
            assert!(target <= 8191, "pc {target} does not fit push-constant");
            (target as u16) << 2
        } else {
            u16::try_from(target).expect("branch target exceeds 16 bits")
        };
        self.buf[label.operand_pos..label.operand_pos + 2]
            .copy_from_slice(&operand.to_be_bytes());
    }
}
