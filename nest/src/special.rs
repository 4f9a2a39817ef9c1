use object::{Symbol, SymbolTable};

macro_rules! well_known_names {
    ($($field:ident = $text:literal),* $(,)?) => {
        /// Symbols the runtime itself refers to, interned at start-up.
        #[derive(Debug, Clone)]
        pub struct Names {
            $(pub $field: Symbol,)*
        }

        impl Names {
            pub fn new(symbols: &mut SymbolTable) -> Self {
                Self {
                    $($field: symbols.intern($text),)*
                }
            }
        }
    };
}

well_known_names! {
    // ── Inheritance ────────────────────────────────────────────────
    proto = "_proto",
    parent = "_parent",
    next_arg_frame = "_nextArgFrame",
    implementor = "_implementor",

    // ── Function objects ───────────────────────────────────────────
    class = "class",
    instructions = "instructions",
    literals = "literals",
    arg_frame = "argFrame",
    num_args = "numArgs",
    func_ptr = "funcPtr",
    indefinite = "indefinite",
    code_block = "CodeBlock",
    c_function = "CFunction",

    // ── Classes ────────────────────────────────────────────────────
    string = "string",
    real = "real",
    int = "int",
    char_ = "char",
    boolean = "boolean",
    symbol = "symbol",
    array = "array",
    frame = "frame",
    binary = "binary",
    path_expr = "pathExpr",
    for_each_state = "forEachState",
    weird_immediate = "weird_immediate",

    // ── Exceptions ─────────────────────────────────────────────────
    name = "name",
    data = "data",
    error_code = "errorCode",
    message = "message",
    value = "value",
    index = "index",

    // ── Small rects ────────────────────────────────────────────────
    top = "top",
    left = "left",
    bottom = "bottom",
    right = "right",

    // ── Packages ───────────────────────────────────────────────────
    main = "main",
    functions = "functions",
    globals = "globals",
}
