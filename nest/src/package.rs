//! Loading NSOF packages.
//!
//! A package root is either a single function, run as `main`, or a frame
//! `{main, functions, globals}` whose `functions` and `globals` frames are
//! installed into the global tables before `main` runs.

use std::fmt::Write as _;
use std::path::Path;

use object::{Symbol, Value};

use crate::error::{ErrorCode, Result, RuntimeError};
use crate::{ARG_FRAME_FIXED_SLOTS, FunctionKind, Interpreter};

/// A decoded package. Its root stays pinned for the life of the interpreter.
#[derive(Debug, Clone)]
pub struct Package {
    pub root: Value,
    pub main: Option<Value>,
    pub functions: Vec<(Symbol, Value)>,
    pub globals: Vec<(Symbol, Value)>,
}

impl Interpreter {
    pub fn load_package_file(&mut self, path: &Path) -> Result<Package> {
        let bytes = std::fs::read(path).map_err(|e| {
            RuntimeError::new(ErrorCode::FileNotFound).detail(format!("{}: {e}", path.display()))
        })?;
        log::debug!("loading package {} ({} bytes)", path.display(), bytes.len());
        self.load_package(&bytes)
    }

    /// Decode a package, freeze it and install its functions and globals.
    pub fn load_package(&mut self, bytes: &[u8]) -> Result<Package> {
        let root = self.decode_nsof(bytes)?;
        self.pin(root);
        self.freeze(root);

        let package = if self.is_function(root) {
            Package {
                root,
                main: Some(root),
                functions: Vec::new(),
                globals: Vec::new(),
            }
        } else if self.is_frame(root) {
            let main = self
                .get_slot(root, self.names.main)
                .filter(|v| !v.is_nil());
            if let Some(main) = main
                && !self.is_function(main)
            {
                return Err(RuntimeError::with_value(ErrorCode::ExpectedFunction, main)
                    .detail("package main is not a function"));
            }
            Package {
                root,
                main,
                functions: self.package_table(root, self.names.functions)?,
                globals: self.package_table(root, self.names.globals)?,
            }
        } else {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedFrame, root)
                .detail("package root must be a function or a frame"));
        };

        for &(name, f) in &package.functions {
            if !self.is_function(f) {
                return Err(RuntimeError::with_value(ErrorCode::ExpectedFunction, f)
                    .detail(format!("global function |{}|", self.symbol_name(name))));
            }
            self.define_global_function(name, f);
        }
        for &(name, value) in &package.globals {
            self.define_global(name, value);
        }
        log::debug!(
            "package installed: {} functions, {} globals, main {}",
            package.functions.len(),
            package.globals.len(),
            if package.main.is_some() { "present" } else { "absent" }
        );
        Ok(package)
    }

    /// Slots of `root.<table>`, empty when the slot is missing or NIL.
    fn package_table(&self, root: Value, table: Symbol) -> Result<Vec<(Symbol, Value)>> {
        match self.get_slot(root, table) {
            None => Ok(Vec::new()),
            Some(v) if v.is_nil() => Ok(Vec::new()),
            Some(v) => self.frame_slots(v),
        }
    }

    pub fn run_package(&mut self, package: &Package) -> Result<Value> {
        let main = package.main.ok_or_else(|| {
            RuntimeError::with_value(ErrorCode::UndefinedGlobalFunction, Value::Symbol(self.names.main))
                .detail("package has no main function")
        })?;
        self.interpret(main)
    }

    /// Every function in the package, `main` first.
    pub fn package_functions(&self, package: &Package) -> Vec<(Symbol, Value)> {
        let mut all = Vec::with_capacity(package.functions.len() + 1);
        if let Some(main) = package.main {
            all.push((self.names.main, main));
        }
        all.extend(package.functions.iter().copied());
        all
    }

    /// Bytecode listing of a function.
    pub fn disassemble_function(&self, f: Value) -> Result<String> {
        match self.function_kind(f)? {
            FunctionKind::Native(index) => Ok(format!("<native {}>\n", self.native_name(index))),
            FunctionKind::Bytecode => {
                let block = self.code_block(f)?;
                let code = self
                    .binary(block.instructions)
                    .map(|b| b.data.as_slice())
                    .unwrap_or_default();
                let mut out = bytecode::disassemble(code);
                if let Ok(literals) = self.array(block.literals) {
                    for (i, &literal) in literals.elements.iter().enumerate() {
                        let _ = writeln!(out, "  literal {i}: {}", self.format_value(literal));
                    }
                }
                Ok(out)
            }
        }
    }

    /// Human-readable summary of a function's shape.
    pub fn function_info(&self, f: Value) -> Result<String> {
        let mut out = String::new();
        match self.function_kind(f)? {
            FunctionKind::Native(index) => {
                let indefinite = self
                    .natives
                    .get(index)
                    .is_some_and(|desc| desc.indefinite);
                let _ = writeln!(out, "kind: native {}", self.native_name(index));
                let _ = writeln!(out, "args: {}{}", self.num_args(f)?, if indefinite { "+" } else { "" });
            }
            FunctionKind::Bytecode => {
                let block = self.code_block(f)?;
                let names = self.slot_names(block.arg_frame).unwrap_or_default();
                let vars: Vec<&str> = names
                    .iter()
                    .skip(ARG_FRAME_FIXED_SLOTS)
                    .map(|&n| self.symbol_name(n))
                    .collect();
                let split = block.num_args.min(vars.len());
                let (params, locals) = vars.split_at(split);
                let code_len = self.binary(block.instructions).map_or(0, |b| b.data.len());
                let literal_count = self.array_len(block.literals).unwrap_or(0);
                let _ = writeln!(out, "kind: bytecode");
                let _ = writeln!(out, "args: {} ({})", block.num_args, params.join(", "));
                let _ = writeln!(out, "locals: {} ({})", locals.len(), locals.join(", "));
                let _ = writeln!(out, "literals: {literal_count}");
                let _ = writeln!(out, "code: {code_len} bytes");
            }
        }
        Ok(out)
    }

    fn native_name(&self, index: usize) -> &'static str {
        self.natives.get(index).map_or("?", |desc| desc.name)
    }
}

#[cfg(test)]
mod tests {
    use bytecode::FreqFunc;

    use super::*;
    use crate::testing::function;

    /// `{main, functions: {Double}, globals: {base}}` where main returns
    /// `Double(base)`.
    fn package_bytes() -> Vec<u8> {
        let mut interp = Interpreter::default();
        let double_name = interp.intern("Double");
        let base = interp.intern("base");
        let double = function(&mut interp, &["x"], &[], vec![], |b| {
            let x = ARG_FRAME_FIXED_SLOTS as u16;
            b.get_var(x).get_var(x).freq(FreqFunc::Add).ret();
        });
        let main = function(
            &mut interp,
            &[],
            &[],
            vec![Value::Symbol(base), Value::Symbol(double_name)],
            |b| {
                b.find_var(0).push(1).call(1).ret();
            },
        );
        let functions = interp.new_frame_with(&[(double_name, double)]);
        let globals = interp.new_frame_with(&[(base, Value::Int(21))]);
        let n = interp.names.clone();
        let root = interp.new_frame_with(&[
            (n.main, main),
            (n.functions, functions),
            (n.globals, globals),
        ]);
        interp.encode_nsof(root, 2).unwrap()
    }

    #[test]
    fn package_frames_install_and_run() {
        let mut interp = Interpreter::default();
        let package = interp.load_package(&package_bytes()).unwrap();
        assert_eq!(package.functions.len(), 1);
        let base = interp.intern("base");
        assert_eq!(interp.global(base), Some(Value::Int(21)));
        assert_eq!(interp.run_package(&package).unwrap(), Value::Int(42));
        assert!(interp.is_read_only(package.root));
    }

    #[test]
    fn bare_functions_are_main() {
        let mut interp = Interpreter::default();
        let f = function(&mut interp, &[], &[], vec![], |b| {
            b.push_int(7).ret();
        });
        let bytes = interp.encode_nsof(f, 2).unwrap();

        let mut fresh = Interpreter::default();
        let package = fresh.load_package(&bytes).unwrap();
        assert_eq!(fresh.run_package(&package).unwrap(), Value::Int(7));
        let listed = fresh.package_functions(&package);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, fresh.names.main);
    }

    #[test]
    fn packages_without_main_cannot_run() {
        let mut interp = Interpreter::default();
        let root = interp.new_frame();
        let bytes = interp.encode_nsof(root, 2).unwrap();
        let package = interp.load_package(&bytes).unwrap();
        let err = interp.run_package(&package).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UndefinedGlobalFunction));
    }

    #[test]
    fn bad_roots_are_rejected() {
        let mut interp = Interpreter::default();
        let bytes = interp.encode_nsof(Value::Int(3), 2).unwrap();
        let err = interp.load_package(&bytes).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpectedFrame));

        let err = interp.load_package(&[2, 77]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NsofUnknownTag));

        let err = interp
            .load_package_file(Path::new("/nonexistent/package.nsof"))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FileNotFound));
    }

    #[test]
    fn listings_and_info() {
        let mut interp = Interpreter::default();
        let package = interp.load_package(&package_bytes()).unwrap();
        let double = package.functions[0].1;

        let info = interp.function_info(double).unwrap();
        assert!(info.contains("kind: bytecode"), "{info}");
        assert!(info.contains("args: 1 (x)"), "{info}");

        let listing = interp.disassemble_function(package.main.unwrap()).unwrap();
        assert!(listing.contains("literal 1: 'Double"), "{listing}");

        let throw = interp.intern("Throw");
        let native = interp.global_function(throw).unwrap();
        assert!(interp.function_info(native).unwrap().contains("native Throw"));
        assert_eq!(interp.disassemble_function(native).unwrap(), "<native Throw>\n");
    }
}
