//! Slot resolution along `_proto`, `_parent` and `_nextArgFrame` chains.
//!
//! Every hop resolves magic pointers first. A hop that still yields a magic
//! pointer, a non-frame, or a frame already visited on this walk ends the
//! walk as "not found".

use object::{MagicPointer, ObjRef, Symbol, Value};

use crate::Interpreter;

/// Result of a full lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    /// Frame on the `_parent` chain whose proto chain held the slot.
    pub owner: Value,
    /// Frame that actually holds the slot.
    pub holder: Value,
    pub value: Value,
}

impl Interpreter {
    /// Resolve a magic pointer through the magic tables. Anything else, and
    /// pointers with no table entry, come back unchanged.
    pub fn resolve_magic(&self, v: Value) -> Value {
        match v {
            Value::Magic(MagicPointer::Numbered(index)) => self
                .array(self.magic)
                .ok()
                .and_then(|table| table.elements.get(index as usize).copied())
                .filter(|target| !target.is_nil())
                .unwrap_or(v),
            Value::Magic(MagicPointer::Named(name)) => {
                self.get_slot(self.named_magic, name).unwrap_or(v)
            }
            _ => v,
        }
    }

    /// Visit `start` and the frames reachable through `link`, stopping at the
    /// first frame for which `visit` returns `Some`.
    fn walk<T>(
        &self,
        start: Value,
        link: Symbol,
        mut visit: impl FnMut(Value) -> Option<T>,
    ) -> Option<T> {
        let mut seen: Vec<ObjRef> = Vec::new();
        let mut current = self.resolve_magic(start);
        loop {
            let r = current.as_ref()?;
            if seen.contains(&r) || !self.is_frame(current) {
                return None;
            }
            seen.push(r);
            if let Some(found) = visit(current) {
                return Some(found);
            }
            current = self.resolve_magic(self.get_slot(current, link)?);
        }
    }

    /// Search `frame`, then `frame._proto`, and so on.
    ///
    /// Returns the holder and the value.
    pub fn proto_lookup(&self, frame: Value, name: Symbol) -> Option<(Value, Value)> {
        self.walk(frame, self.names.proto, |f| {
            self.get_slot(f, name).map(|value| (f, value))
        })
    }

    /// Proto lookup on `frame`, then on `frame._parent`, and so on.
    pub fn full_lookup(&self, frame: Value, name: Symbol) -> Option<Found> {
        self.walk(frame, self.names.parent, |owner| {
            self.proto_lookup(owner, name).map(|(holder, value)| Found {
                owner,
                holder,
                value,
            })
        })
    }

    /// Own slots of `locals`, then of `locals._nextArgFrame`, and so on.
    ///
    /// Returns the frame holding the variable and its value.
    pub fn lexical_lookup(&self, locals: Value, name: Symbol) -> Option<(Value, Value)> {
        self.walk(locals, self.names.next_arg_frame, |f| {
            self.get_slot(f, name).map(|value| (f, value))
        })
    }

    /// `frame` and its `_proto` ancestors, nearest first.
    pub fn proto_chain(&self, frame: Value) -> Vec<Value> {
        let mut chain = Vec::new();
        self.walk(frame, self.names.proto, |f| {
            chain.push(f);
            None::<()>
        });
        chain
    }

    /// Value of `name` inherited through `_proto`, NIL when missing.
    pub fn inherited_slot(&self, frame: Value, name: Symbol) -> Value {
        self.proto_lookup(frame, name)
            .map_or(Value::NIL, |(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chain {
        interp: Interpreter,
        f1: Value,
        f2: Value,
        f3: Value,
        x: Symbol,
    }

    // F1 -> _proto -> F2 -> _proto -> F3 { x: 3 }
    fn proto_chain() -> Chain {
        let mut interp = Interpreter::default();
        let x = interp.intern("x");
        let proto = interp.names.proto;
        let f3 = interp.new_frame_with(&[(x, Value::Int(3))]);
        let f2 = interp.new_frame_with(&[(proto, f3)]);
        let f1 = interp.new_frame_with(&[(proto, f2)]);
        Chain {
            interp,
            f1,
            f2,
            f3,
            x,
        }
    }

    // ── Proto lookup ───────────────────────────────────────────────

    #[test]
    fn proto_lookup_reports_the_holder() {
        let Chain { interp, f1, f3, x, .. } = proto_chain();
        assert_eq!(interp.proto_lookup(f1, x), Some((f3, Value::Int(3))));
        assert_eq!(interp.get_slot(f1, x), None);
    }

    #[test]
    fn nearer_slots_shadow_farther_ones() {
        let Chain { mut interp, f1, f2, x, .. } = proto_chain();
        interp.set_slot(f2, x, Value::Int(2)).unwrap();
        assert_eq!(interp.proto_lookup(f1, x), Some((f2, Value::Int(2))));
    }

    #[test]
    fn proto_chain_lists_each_frame_once() {
        let Chain { mut interp, f1, f2, f3, .. } = proto_chain();
        assert_eq!(interp.proto_chain(f1), vec![f1, f2, f3]);
        let proto = interp.names.proto;
        interp.set_slot(f3, proto, f2).unwrap();
        assert_eq!(interp.proto_chain(f1), vec![f1, f2, f3]);
        assert!(interp.proto_chain(Value::Int(1)).is_empty());
    }

    #[test]
    fn proto_cycles_end_as_not_found() {
        let Chain { mut interp, f1, f3, .. } = proto_chain();
        let proto = interp.names.proto;
        interp.set_slot(f3, proto, f1).unwrap();
        let missing = interp.intern("missing");
        assert_eq!(interp.proto_lookup(f1, missing), None);
        assert_eq!(interp.full_lookup(f1, missing), None);
    }

    // ── Full lookup ────────────────────────────────────────────────

    #[test]
    fn full_lookup_climbs_parents_after_protos() {
        let Chain { mut interp, f1, f3, x, .. } = proto_chain();
        let parent = interp.names.parent;
        let y = interp.intern("y");
        let outer_proto = interp.new_frame_with(&[(y, Value::Int(10))]);
        let proto = interp.names.proto;
        let outer = interp.new_frame_with(&[(proto, outer_proto)]);
        interp.set_slot(f1, parent, outer).unwrap();

        let found = interp.full_lookup(f1, y).unwrap();
        assert_eq!(found.owner, outer);
        assert_eq!(found.holder, outer_proto);
        assert_eq!(found.value, Value::Int(10));

        // The proto chain of the receiver wins over its parents.
        interp.set_slot(outer, x, Value::Int(99)).unwrap();
        let found = interp.full_lookup(f1, x).unwrap();
        assert_eq!((found.owner, found.holder), (f1, f3));
    }

    // ── Lexical lookup ─────────────────────────────────────────────

    #[test]
    fn lexical_lookup_ignores_protos() {
        let mut interp = Interpreter::default();
        let v = interp.intern("v");
        let next = interp.names.next_arg_frame;
        let proto = interp.names.proto;
        let with_proto = interp.new_frame_with(&[(v, Value::Int(1))]);
        let outer = interp.new_frame_with(&[(v, Value::Int(2))]);
        let inner = interp.new_frame_with(&[(next, outer), (proto, with_proto)]);

        assert_eq!(interp.lexical_lookup(inner, v), Some((outer, Value::Int(2))));
        let w = interp.intern("w");
        assert_eq!(interp.lexical_lookup(inner, w), None);
    }

    // ── Magic pointers ─────────────────────────────────────────────

    #[test]
    fn magic_hops_resolve_through_the_tables() {
        let Chain { mut interp, f2, f3, x, .. } = proto_chain();
        let proto = interp.names.proto;
        interp.set_magic_pointer(4, f3);
        let start = interp.new_frame_with(&[(proto, Value::Magic(MagicPointer::Numbered(4)))]);
        assert_eq!(interp.proto_lookup(start, x), Some((f3, Value::Int(3))));

        let named = interp.intern("shared");
        interp.set_named_magic_pointer(named, f2);
        let via_name = Value::Magic(MagicPointer::Named(named));
        assert_eq!(interp.resolve_magic(via_name), f2);
        assert_eq!(interp.proto_lookup(via_name, x), Some((f3, Value::Int(3))));
    }

    #[test]
    fn unresolved_magic_ends_the_walk() {
        let mut interp = Interpreter::default();
        let x = interp.intern("x");
        let proto = interp.names.proto;
        let dangling = Value::Magic(MagicPointer::Numbered(77));
        let f = interp.new_frame_with(&[(proto, dangling)]);
        assert_eq!(interp.resolve_magic(dangling), dangling);
        assert_eq!(interp.proto_lookup(f, x), None);
    }
}
