use core::fmt;

use object::{Symbol, Value};

/// Broad category of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A value of the wrong kind reached an operation.
    TypeMismatch,
    /// Variable, global function or method not found.
    UndefinedReference,
    /// Argument-shape errors: argument count, zero for-loop increment,
    /// division by zero.
    Arity,
    /// Index outside an array, binary or path.
    Bounds,
    /// Mutation of a literal object.
    ReadOnly,
    /// A native, file or library could not be found or opened.
    Resource,
    /// Undecodable serialised data.
    MalformedData,
    /// Instruction stream or function object that cannot be executed.
    BadBytecode,
}

impl ErrorKind {
    /// Exception class raised for errors of this kind.
    pub const fn exception_name(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "evt.ex.fr.type",
            ErrorKind::UndefinedReference
            | ErrorKind::Arity
            | ErrorKind::BadBytecode => "evt.ex.fr.intrp",
            ErrorKind::Bounds | ErrorKind::ReadOnly => "evt.ex.fr.obj",
            ErrorKind::Resource => "evt.ex.fr.rsrc",
            ErrorKind::MalformedData => "evt.ex.fr.nsof",
        }
    }
}

/// Concrete runtime errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ExpectedFrame,
    ExpectedArray,
    ExpectedString,
    ExpectedNumber,
    ExpectedReal,
    ExpectedInteger,
    ExpectedCharacter,
    ExpectedBinary,
    ExpectedPath,
    ExpectedSymbol,
    ExpectedFunction,
    ExpectedFrameOrArray,

    UndefinedVariable,
    UndefinedGlobalFunction,
    UndefinedMethod,
    NoProtoForResend,
    PathFailed,

    WrongNumberOfArgs,
    ZeroForLoopIncrement,
    DivisionByZero,
    NoCurrentException,

    OutOfBounds,
    EmptyPath,
    ReadOnly,

    NativeNotFound,
    FileNotFound,

    NsofTruncated,
    NsofUnknownTag,
    NsofBadPrecedent,
    NsofBadVersion,
    NsofBadValue,

    BadBytecode,
    BadLiteral,
    BadLocal,
    StackUnderflow,
}

impl ErrorCode {
    /// Numeric error code, NewtonScript style.
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::ExpectedFrame => -48400,
            ErrorCode::ExpectedArray => -48401,
            ErrorCode::ExpectedString => -48402,
            ErrorCode::ExpectedNumber => -48404,
            ErrorCode::ExpectedReal => -48405,
            ErrorCode::ExpectedInteger => -48406,
            ErrorCode::ExpectedCharacter => -48407,
            ErrorCode::ExpectedBinary => -48408,
            ErrorCode::ExpectedPath => -48409,
            ErrorCode::ExpectedSymbol => -48410,
            ErrorCode::ExpectedFunction => -48411,
            ErrorCode::ExpectedFrameOrArray => -48412,

            ErrorCode::UndefinedVariable => -48807,
            ErrorCode::UndefinedGlobalFunction => -48808,
            ErrorCode::UndefinedMethod => -48809,
            ErrorCode::NoProtoForResend => -48810,
            ErrorCode::PathFailed => -48204,

            ErrorCode::WrongNumberOfArgs => -48803,
            ErrorCode::ZeroForLoopIncrement => -48804,
            ErrorCode::DivisionByZero => -48805,
            ErrorCode::NoCurrentException => -48806,

            ErrorCode::OutOfBounds => -48205,
            ErrorCode::EmptyPath => -48202,
            ErrorCode::ReadOnly => -48214,

            ErrorCode::NativeNotFound => -48300,
            ErrorCode::FileNotFound => -48301,

            ErrorCode::NsofTruncated => -48500,
            ErrorCode::NsofUnknownTag => -48501,
            ErrorCode::NsofBadPrecedent => -48502,
            ErrorCode::NsofBadVersion => -48503,
            ErrorCode::NsofBadValue => -48504,

            ErrorCode::BadBytecode => -48800,
            ErrorCode::BadLiteral => -48801,
            ErrorCode::BadLocal => -48802,
            ErrorCode::StackUnderflow => -48811,
        }
    }

    pub const fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            ExpectedFrame | ExpectedArray | ExpectedString | ExpectedNumber
            | ExpectedReal | ExpectedInteger | ExpectedCharacter
            | ExpectedBinary | ExpectedPath | ExpectedSymbol
            | ExpectedFunction | ExpectedFrameOrArray => ErrorKind::TypeMismatch,
            UndefinedVariable | UndefinedGlobalFunction | UndefinedMethod
            | NoProtoForResend | PathFailed => ErrorKind::UndefinedReference,
            WrongNumberOfArgs | ZeroForLoopIncrement | DivisionByZero
            | NoCurrentException => ErrorKind::Arity,
            OutOfBounds | EmptyPath => ErrorKind::Bounds,
            ReadOnly => ErrorKind::ReadOnly,
            NativeNotFound | FileNotFound => ErrorKind::Resource,
            NsofTruncated | NsofUnknownTag | NsofBadPrecedent | NsofBadVersion
            | NsofBadValue => ErrorKind::MalformedData,
            BadBytecode | BadLiteral | BadLocal | StackUnderflow => {
                ErrorKind::BadBytecode
            }
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            ErrorCode::ExpectedFrame => "expected a frame",
            ErrorCode::ExpectedArray => "expected an array",
            ErrorCode::ExpectedString => "expected a string",
            ErrorCode::ExpectedNumber => "expected a number",
            ErrorCode::ExpectedReal => "expected a real",
            ErrorCode::ExpectedInteger => "expected an integer",
            ErrorCode::ExpectedCharacter => "expected a character",
            ErrorCode::ExpectedBinary => "expected a binary object",
            ErrorCode::ExpectedPath => "expected a path expression",
            ErrorCode::ExpectedSymbol => "expected a symbol",
            ErrorCode::ExpectedFunction => "expected a function",
            ErrorCode::ExpectedFrameOrArray => "expected a frame or an array",
            ErrorCode::UndefinedVariable => "undefined variable",
            ErrorCode::UndefinedGlobalFunction => "undefined global function",
            ErrorCode::UndefinedMethod => "undefined method",
            ErrorCode::NoProtoForResend => "implementor has no _proto to resend to",
            ErrorCode::PathFailed => "path failed",
            ErrorCode::WrongNumberOfArgs => "wrong number of arguments",
            ErrorCode::ZeroForLoopIncrement => "for loop increment is zero",
            ErrorCode::DivisionByZero => "division by zero",
            ErrorCode::NoCurrentException => "no current exception",
            ErrorCode::OutOfBounds => "index out of bounds",
            ErrorCode::EmptyPath => "empty path expression",
            ErrorCode::ReadOnly => "object is read-only",
            ErrorCode::NativeNotFound => "native function not found",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::NsofTruncated => "truncated object stream",
            ErrorCode::NsofUnknownTag => "unknown object stream tag",
            ErrorCode::NsofBadPrecedent => "bad back-reference in object stream",
            ErrorCode::NsofBadVersion => "unsupported object stream version",
            ErrorCode::NsofBadValue => "invalid value in object stream",
            ErrorCode::BadBytecode => "invalid instruction",
            ErrorCode::BadLiteral => "literal index out of range",
            ErrorCode::BadLocal => "local variable index out of range",
            ErrorCode::StackUnderflow => "value stack underflow",
        }
    }

    pub const fn exception_name(self) -> &'static str {
        self.kind().exception_name()
    }
}

/// Payload of a structured runtime error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    /// The offending value, if any.
    pub value: Option<Value>,
    /// The offending index, if any.
    pub index: Option<i64>,
    pub detail: Option<String>,
}

impl ErrorInfo {
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {detail}", self.code.description()),
            None => self.code.description().to_owned(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code.code())?;
        if let Some(index) = self.index {
            write!(f, " at index {index}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Catchable error raised by the runtime.
    #[error("{0}")]
    Error(ErrorInfo),
    /// Catchable exception raised by `Throw`.
    #[error("uncaught exception |{name}|")]
    Exception {
        name: String,
        symbol: Symbol,
        data: Value,
    },
    /// Call depth limit reached. Not catchable.
    #[error("stack overflow at call depth {depth}")]
    StackOverflow { depth: usize },
    /// Nested interpreter limit reached. Not catchable.
    #[error("interpreter nesting exceeded {depth} levels")]
    NestingTooDeep { depth: usize },
}

impl RuntimeError {
    pub fn new(code: ErrorCode) -> Self {
        RuntimeError::Error(ErrorInfo {
            code,
            value: None,
            index: None,
            detail: None,
        })
    }

    pub fn with_value(code: ErrorCode, value: Value) -> Self {
        Self::new(code).value(value)
    }

    pub fn value(mut self, v: Value) -> Self {
        if let RuntimeError::Error(info) = &mut self {
            info.value = Some(v);
        }
        self
    }

    pub fn index(mut self, i: i64) -> Self {
        if let RuntimeError::Error(info) = &mut self {
            info.index = Some(i);
        }
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        if let RuntimeError::Error(info) = &mut self {
            info.detail = Some(detail.into());
        }
        self
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RuntimeError::Error(info) => Some(info.code),
            _ => None,
        }
    }

    /// Fatal errors bypass exception handlers.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::StackOverflow { .. } | RuntimeError::NestingTooDeep { .. }
        )
    }
}

impl From<bytecode::DecodeError> for RuntimeError {
    fn from(err: bytecode::DecodeError) -> Self {
        RuntimeError::new(ErrorCode::BadBytecode).detail(err.to_string())
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
