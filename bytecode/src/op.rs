/// Opcode families: the high five bits of an opcode byte.
///
/// The low three bits carry the operand `B`. `B == 7` means the real operand
/// is the big-endian 16-bit value following the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Family {
    /// `B` selects a [`SimpleOp`].
    Simple = 0,
    /// Push `literals[B]`.
    Push = 3,
    /// Push `B` read as a reference word (sign-extended from 16 bits).
    PushConstant = 4,
    /// Call the global function named on top of the stack with `B` args.
    Call = 5,
    /// Call the function value on top of the stack with `B` args.
    Invoke = 6,
    /// Send `name` to `receiver` with `B` args.
    Send = 7,
    /// Like [`Family::Send`], but a missing method yields NIL.
    SendIfDefined = 8,
    /// Re-dispatch from the implementor's `_proto` with `B` args.
    Resend = 9,
    /// Like [`Family::Resend`], but a missing method yields NIL.
    ResendIfDefined = 10,
    /// Jump to absolute pc `B`.
    Branch = 11,
    /// Pop; jump if not NIL.
    BranchIfTrue = 12,
    /// Pop; jump if NIL.
    BranchIfFalse = 13,
    /// Push the variable named `literals[B]`.
    FindVar = 14,
    /// Push locals slot `B`.
    GetVar = 15,
    /// Build a frame from a map and `B` values.
    MakeFrame = 16,
    /// Build an array from a class and `B` values (`0xFFFF`: size + class).
    MakeArray = 17,
    /// Pop path and object, push the value at the path.
    GetPath = 18,
    /// Pop value, path and object; store the value at the path.
    SetPath = 19,
    /// Pop into locals slot `B`.
    SetVar = 20,
    /// Pop into the variable named `literals[B]`.
    FindAndSetVar = 21,
    /// Add the increment on top of the stack to locals slot `B`.
    IncrVar = 22,
    /// Loop test of a `for` loop; jump to `B` while not done.
    BranchIfLoopNotDone = 23,
    /// `B` selects a [`FreqFunc`].
    FreqFunc = 24,
    /// Arm `B` exception handlers.
    NewHandlers = 25,
}

impl Family {
    /// Operand value that announces a 16-bit operand.
    pub const EXTENDED: u8 = 7;
}

impl TryFrom<u8> for Family {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, u8> {
        let family = match bits {
            0 => Family::Simple,
            3 => Family::Push,
            4 => Family::PushConstant,
            5 => Family::Call,
            6 => Family::Invoke,
            7 => Family::Send,
            8 => Family::SendIfDefined,
            9 => Family::Resend,
            10 => Family::ResendIfDefined,
            11 => Family::Branch,
            12 => Family::BranchIfTrue,
            13 => Family::BranchIfFalse,
            14 => Family::FindVar,
            15 => Family::GetVar,
            16 => Family::MakeFrame,
            17 => Family::MakeArray,
            18 => Family::GetPath,
            19 => Family::SetPath,
            20 => Family::SetVar,
            21 => Family::FindAndSetVar,
            22 => Family::IncrVar,
            23 => Family::BranchIfLoopNotDone,
            24 => Family::FreqFunc,
            25 => Family::NewHandlers,
            other => return Err(other),
        };
        Ok(family)
    }
}

/// Operand-less instructions of [`Family::Simple`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SimpleOp {
    Pop = 0,
    Dup = 1,
    Return = 2,
    PushSelf = 3,
    SetLexScope = 4,
    IterNext = 5,
    IterDone = 6,
}

impl SimpleOp {
    /// Extended simple operand that pops the top handler group.
    pub const POP_HANDLERS: u16 = 1;
}

impl TryFrom<u16> for SimpleOp {
    type Error = u16;

    fn try_from(operand: u16) -> Result<Self, u16> {
        let op = match operand {
            0 => SimpleOp::Pop,
            1 => SimpleOp::Dup,
            2 => SimpleOp::Return,
            3 => SimpleOp::PushSelf,
            4 => SimpleOp::SetLexScope,
            5 => SimpleOp::IterNext,
            6 => SimpleOp::IterDone,
            other => return Err(other),
        };
        Ok(op)
    }
}

/// Frequently used primitives, dispatched without a symbol lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FreqFunc {
    Add = 0,
    Subtract,
    Aref,
    SetAref,
    Equals,
    Not,
    NotEquals,
    Multiply,
    Divide,
    Div,
    LessThan,
    GreaterThan,
    GreaterOrEqual,
    LessOrEqual,
    BitAnd,
    BitOr,
    BitNot,
    NewIterator,
    Length,
    Clone,
    SetClass,
    AddArraySlot,
    Stringer,
    HasPath,
    ClassOf,
}

impl FreqFunc {
    pub const COUNT: u16 = FreqFunc::ClassOf as u16 + 1;

    const ALL: [FreqFunc; FreqFunc::COUNT as usize] = [
        FreqFunc::Add,
        FreqFunc::Subtract,
        FreqFunc::Aref,
        FreqFunc::SetAref,
        FreqFunc::Equals,
        FreqFunc::Not,
        FreqFunc::NotEquals,
        FreqFunc::Multiply,
        FreqFunc::Divide,
        FreqFunc::Div,
        FreqFunc::LessThan,
        FreqFunc::GreaterThan,
        FreqFunc::GreaterOrEqual,
        FreqFunc::LessOrEqual,
        FreqFunc::BitAnd,
        FreqFunc::BitOr,
        FreqFunc::BitNot,
        FreqFunc::NewIterator,
        FreqFunc::Length,
        FreqFunc::Clone,
        FreqFunc::SetClass,
        FreqFunc::AddArraySlot,
        FreqFunc::Stringer,
        FreqFunc::HasPath,
        FreqFunc::ClassOf,
    ];

    /// Number of stack arguments the primitive consumes.
    pub const fn arity(self) -> usize {
        match self {
            FreqFunc::Not
            | FreqFunc::BitNot
            | FreqFunc::Length
            | FreqFunc::Clone
            | FreqFunc::Stringer
            | FreqFunc::ClassOf => 1,
            FreqFunc::SetAref => 3,
            _ => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FreqFunc::Add => "+",
            FreqFunc::Subtract => "-",
            FreqFunc::Aref => "aref",
            FreqFunc::SetAref => "setAref",
            FreqFunc::Equals => "=",
            FreqFunc::Not => "not",
            FreqFunc::NotEquals => "<>",
            FreqFunc::Multiply => "*",
            FreqFunc::Divide => "/",
            FreqFunc::Div => "div",
            FreqFunc::LessThan => "<",
            FreqFunc::GreaterThan => ">",
            FreqFunc::GreaterOrEqual => ">=",
            FreqFunc::LessOrEqual => "<=",
            FreqFunc::BitAnd => "band",
            FreqFunc::BitOr => "bor",
            FreqFunc::BitNot => "bnot",
            FreqFunc::NewIterator => "newIterator",
            FreqFunc::Length => "length",
            FreqFunc::Clone => "clone",
            FreqFunc::SetClass => "setClass",
            FreqFunc::AddArraySlot => "addArraySlot",
            FreqFunc::Stringer => "stringer",
            FreqFunc::HasPath => "hasPath",
            FreqFunc::ClassOf => "classOf",
        }
    }
}

impl TryFrom<u16> for FreqFunc {
    type Error = u16;

    fn try_from(operand: u16) -> Result<Self, u16> {
        FreqFunc::ALL
            .get(operand as usize)
            .copied()
            .ok_or(operand)
    }
}
