//! Printed forms of values.

use std::fmt::Write;

use object::{HeapObject, MagicPointer, ObjRef, Value};

use crate::Interpreter;

/// Nesting below which structures are elided as `...`.
const MAX_DEPTH: usize = 12;

fn real_text(x: f64) -> String {
    format!("{x:?}")
}

fn needs_bars(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_string(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl Interpreter {
    /// Source-like rendering of `v`. Cycles print as `<cycle>`.
    pub fn format_value(&self, v: Value) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        self.write_value(&mut out, v, &mut path);
        out
    }

    /// Text of a value as it appears when concatenated into a string:
    /// strings unquoted, numbers, characters and symbol names.
    pub fn display_text(&self, v: Value) -> Option<String> {
        match v {
            Value::Int(n) => Some(n.to_string()),
            Value::Char(c) => Some(c.to_string()),
            Value::Symbol(s) => Some(self.symbol_name(s).to_owned()),
            _ if v.is_nil() => Some(String::new()),
            _ => self
                .string_text(v)
                .or_else(|| self.real_value(v).map(real_text)),
        }
    }

    fn write_symbol(&self, out: &mut String, name: &str) {
        if needs_bars(name) {
            let _ = write!(out, "|{name}|");
        } else {
            out.push_str(name);
        }
    }

    fn write_value(&self, out: &mut String, v: Value, path: &mut Vec<ObjRef>) {
        match v {
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Char(c) => {
                let _ = write!(out, "${c}");
            }
            Value::Symbol(s) => {
                out.push('\'');
                self.write_symbol(out, self.symbol_name(s));
            }
            Value::Magic(MagicPointer::Numbered(n)) => {
                let _ = write!(out, "@{n}");
            }
            Value::Magic(MagicPointer::Named(s)) => {
                out.push('@');
                self.write_symbol(out, self.symbol_name(s));
            }
            Value::Special(_) if v.is_nil() => out.push_str("nil"),
            Value::Special(_) if v == Value::TRUE => out.push_str("true"),
            Value::Special(_) if v == Value::UNBOUND => out.push_str("#unbound"),
            Value::Special(raw) => {
                let _ = write!(out, "#{raw:x}");
            }
            Value::Ref(r) => self.write_object(out, v, r, path),
        }
    }

    fn write_object(&self, out: &mut String, v: Value, r: ObjRef, path: &mut Vec<ObjRef>) {
        if path.contains(&r) {
            out.push_str("<cycle>");
            return;
        }
        if path.len() >= MAX_DEPTH {
            out.push_str("...");
            return;
        }
        let Some(object) = self.heap.get(r) else {
            let _ = write!(out, "<dangling #{}>", r.raw());
            return;
        };
        match object {
            HeapObject::Binary(b) => {
                if let Some(text) = self.string_text(v) {
                    quote_string(out, &text);
                } else if let Some(x) = self.real_value(v) {
                    out.push_str(&real_text(x));
                } else {
                    out.push_str("<binary, class ");
                    self.write_value(out, b.class, path);
                    let _ = write!(out, ", {} bytes>", b.data.len());
                }
            }
            HeapObject::Array(a) => {
                path.push(r);
                out.push('[');
                if a.class != Value::Symbol(self.names.array) {
                    match a.class.as_symbol() {
                        Some(class) => self.write_symbol(out, self.symbol_name(class)),
                        None => self.write_value(out, a.class, path),
                    }
                    out.push_str(": ");
                }
                for (i, &element) in a.elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_value(out, element, path);
                }
                out.push(']');
                path.pop();
            }
            HeapObject::Frame(_) => {
                if self.is_function(v) {
                    let argc = self.num_args(v).unwrap_or(0);
                    let _ = write!(out, "<function, {argc} arg(s) #{}>", r.raw());
                    return;
                }
                path.push(r);
                out.push('{');
                let slots = self.frame_slots(v).unwrap_or_default();
                for (i, (name, value)) in slots.into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_symbol(out, self.symbol_name(name));
                    out.push_str(": ");
                    self.write_value(out, value, path);
                }
                out.push('}');
                path.pop();
            }
        }
    }
}
