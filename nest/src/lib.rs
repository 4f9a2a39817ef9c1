pub mod alloc;
pub mod error;
pub mod exception;
pub mod function;
pub mod gc;
pub mod interpreter;
pub mod iterator;
pub mod lookup;
pub mod nsof;
pub mod package;
pub mod path;
pub mod primitives;
pub mod print;
pub mod special;
pub mod store;

use heap::{Heap, HeapSettings};
use object::{MagicPointer, Symbol, SymbolTable, Value};

pub use error::{ErrorCode, ErrorInfo, ErrorKind, Result, RuntimeError};
pub use function::{ARG_FRAME_FIXED_SLOTS, FunctionKind};
pub use lookup::Found;
pub use primitives::{NativeDesc, NativeFn};
pub use special::Names;

use interpreter::Env;

/// Interpreter limits and the heap policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub heap: HeapSettings,
    /// Saved register sets per invocation before the call is refused.
    pub max_call_depth: usize,
    /// Nested invocations (native -> script -> native ...) allowed at once.
    pub max_nesting: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            max_call_depth: 1024,
            max_nesting: 64,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        self.heap.validate()?;
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be > 0");
        }
        if self.max_nesting == 0 {
            return Err("max_nesting must be > 0");
        }
        Ok(())
    }
}

/// One runtime: heap, symbols, global tables and the execution state.
pub struct Interpreter {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub names: Names,
    /// Global variables (a frame).
    pub(crate) globals: Value,
    /// Global functions (a frame).
    pub(crate) functions: Value,
    /// Numbered magic-pointer table (an array).
    pub(crate) magic: Value,
    /// Named magic-pointer table (a frame).
    pub(crate) named_magic: Value,
    pub(crate) natives: Vec<NativeDesc>,
    /// The running invocation.
    pub(crate) env: Env,
    /// Suspended outer invocations, innermost last.
    pub(crate) saved: Vec<Env>,
    /// Temporaries held alive by natives.
    pub(crate) pins: Vec<Value>,
    settings: Settings,
}

impl Interpreter {
    pub fn new(settings: Settings) -> Self {
        settings.validate().expect("Invalid Interpreter Settings");
        let mut symbols = SymbolTable::new();
        let names = Names::new(&mut symbols);
        let mut interp = Self {
            heap: Heap::new(settings.heap),
            symbols,
            names,
            globals: Value::NIL,
            functions: Value::NIL,
            magic: Value::NIL,
            named_magic: Value::NIL,
            natives: Vec::new(),
            env: Env::default(),
            saved: Vec::new(),
            pins: Vec::new(),
            settings,
        };
        interp.globals = interp.new_frame();
        interp.functions = interp.new_frame();
        interp.magic = interp.new_array(Vec::new());
        interp.named_magic = interp.new_frame();
        for desc in primitives::default_natives() {
            interp.register_native(desc);
        }
        interp
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Add a native and bind it as a global function under its name.
    pub fn register_native(&mut self, desc: NativeDesc) -> Value {
        let index = self.natives.len();
        let name = self.intern(desc.name);
        self.natives.push(desc);
        let f = self.new_native_function(index);
        self.define_global_function(name, f);
        f
    }

    // ── Globals ────────────────────────────────────────────────────

    pub fn define_global(&mut self, name: Symbol, value: Value) {
        let globals = self.globals;
        // The global tables are private mutable frames; this cannot fail.
        let _ = self.set_slot(globals, name, value);
    }

    pub fn global(&self, name: Symbol) -> Option<Value> {
        self.get_slot(self.globals, name)
    }

    pub fn define_global_function(&mut self, name: Symbol, f: Value) {
        let functions = self.functions;
        let _ = self.set_slot(functions, name, f);
    }

    pub fn global_function(&self, name: Symbol) -> Option<Value> {
        self.get_slot(self.functions, name)
    }

    pub fn global_function_names(&self) -> Vec<Symbol> {
        self.map_names(self.frame(self.functions).map_or(Value::NIL, |f| f.map))
    }

    // ── Magic pointers ─────────────────────────────────────────────

    /// Bind numbered magic pointer `index`, growing the table with NILs.
    pub fn set_magic_pointer(&mut self, index: u32, target: Value) {
        let table = self.magic;
        let len = self.array_len(table).unwrap_or(0);
        if index as usize >= len {
            let _ = self.set_length(table, index as i64 + 1);
        }
        let _ = self.array_set(table, index as i64, target);
    }

    pub fn set_named_magic_pointer(&mut self, name: Symbol, target: Value) {
        let table = self.named_magic;
        let _ = self.set_slot(table, name, target);
    }

    pub fn magic_pointer(&self, pointer: MagicPointer) -> Value {
        self.resolve_magic(Value::Magic(pointer))
    }

    // ── Exceptions ─────────────────────────────────────────────────

    /// Exception frame of the running invocation, NIL outside a handler.
    pub fn current_exception(&self) -> Value {
        self.env.exception
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
