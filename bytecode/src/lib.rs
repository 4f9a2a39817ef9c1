mod builder;
mod decoder;
mod instruction;
mod op;

pub use builder::{BytecodeBuilder, Label};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at, disassemble};
pub use instruction::Instruction;
pub use op::{Family, FreqFunc, SimpleOp};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        BytecodeDecoder::new(bytes)
            .map(|item| item.unwrap().1)
            .collect()
    }

    #[test]
    fn short_and_extended_operands() {
        let mut b = BytecodeBuilder::new();
        b.push(0).push(6).push(7).push(300).call(2).send(1).ret();

        assert_eq!(b.as_bytes(), &[
            0x18,
            0x1E,
            0x1F, 0x00, 0x07,
            0x1F, 0x01, 0x2C,
            0x2A,
            0x39,
            0x02,
        ]);
        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::Push { literal: 0 },
            Instruction::Push { literal: 6 },
            Instruction::Push { literal: 7 },
            Instruction::Push { literal: 300 },
            Instruction::Call { argc: 2 },
            Instruction::Send { argc: 1 },
            Instruction::Return,
        ]);
    }

    #[test]
    fn simple_operations() {
        let mut b = BytecodeBuilder::new();
        b.pop().dup().push_self();
        b.emit(Instruction::SetLexScope)
            .emit(Instruction::IterNext)
            .emit(Instruction::IterDone)
            .emit(Instruction::PopHandlers);

        assert_eq!(b.as_bytes(), &[0x00, 0x01, 0x03, 0x04, 0x05, 0x06, 0x07, 0x00, 0x01]);
        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::Pop,
            Instruction::Dup,
            Instruction::PushSelf,
            Instruction::SetLexScope,
            Instruction::IterNext,
            Instruction::IterDone,
            Instruction::PopHandlers,
        ]);
    }

    #[test]
    fn push_constant_words() {
        let mut b = BytecodeBuilder::new();
        b.push_nil().push_true().push_int(1).push_int(-1);
        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::PushConstant { word: 0x0002 },
            Instruction::PushConstant { word: 0x001A },
            Instruction::PushConstant { word: 0x0004 },
            Instruction::PushConstant { word: 0xFFFC },
        ]);
        assert_eq!(b.as_bytes()[0], 0x22);
    }

    #[test]
    fn frequent_primitives() {
        let mut b = BytecodeBuilder::new();
        b.freq(FreqFunc::Add).freq(FreqFunc::ClassOf);
        assert_eq!(b.as_bytes(), &[0xC0, 0xC7, 0x00, 0x18]);
        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::FreqFunc(FreqFunc::Add),
            Instruction::FreqFunc(FreqFunc::ClassOf),
        ]);
        assert_eq!(FreqFunc::SetAref.arity(), 3);
        assert_eq!(FreqFunc::Not.arity(), 1);
        assert_eq!(FreqFunc::try_from(25), Err(25));
    }

    #[test]
    fn forward_labels() {
        let mut b = BytecodeBuilder::new();
        b.push_true();
        let label = b.branch_if_false_label();
        b.push_int(1);
        b.bind(label);
        let handler = b.push_pc_label();
        b.bind_to(handler, 100);
        b.ret();

        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::PushConstant { word: 0x1A },
            Instruction::BranchIfFalse { target: 7 },
            Instruction::PushConstant { word: 0x4 },
            Instruction::PushConstant { word: 100 << 2 },
            Instruction::Return,
        ]);
    }

    #[test]
    fn sized_make_array() {
        let mut b = BytecodeBuilder::new();
        b.emit(Instruction::MakeArray { count: Instruction::SIZED_ARRAY });
        assert_eq!(b.as_bytes(), &[0x8F, 0xFF, 0xFF]);
        let instr = decode_all(b.as_bytes())[0];
        assert_eq!(instr.to_string(), "make-array sized");
    }

    #[test]
    fn malformed_streams_are_rejected() {
        assert_eq!(
            decode_at(&[0x08], 0),
            Err(DecodeError::UnknownFamily { pc: 0, family: 1 })
        );
        assert_eq!(decode_at(&[0x1F, 0x00], 0), Err(DecodeError::Truncated { pc: 0 }));
        assert_eq!(
            decode_at(&[0xC7, 0x00, 0x40], 0),
            Err(DecodeError::UnknownFreqFunc { pc: 0, operand: 0x40 })
        );
        assert_eq!(decode_at(&[], 0), Err(DecodeError::OutOfRange { pc: 0 }));

        let items: Vec<_> = BytecodeDecoder::new(&[0x02, 0xF8, 0x02]).collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[test]
    fn disassembly_lists_pcs() {
        let mut b = BytecodeBuilder::new();
        b.get_var(3).push(300).freq(FreqFunc::Subtract).ret();
        let text = disassemble(b.as_bytes());
        assert_eq!(
            text,
            "    0: get-var 3\n    1: push lit#300\n    4: freq-func -\n    5: return\n"
        );
    }
}
