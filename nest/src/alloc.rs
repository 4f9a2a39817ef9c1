//! Allocation helpers and text/number views of binary objects.

use object::{Array, Binary, FIRST_NAME_INDEX, Frame, MapFlags, Symbol, Value};

use crate::Interpreter;

/// Encode text as a NUL-terminated UTF-16BE string payload.
pub fn encode_string(text: &str) -> Vec<u8> {
    let mut data: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    data.extend_from_slice(&[0, 0]);
    data
}

/// Decode a UTF-16BE payload, stopping at the first NUL.
pub fn decode_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

impl Interpreter {
    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    /// Interned symbol as a value.
    pub fn sym(&mut self, name: &str) -> Value {
        Value::Symbol(self.symbols.intern(name))
    }

    pub fn symbol_name(&self, sym: Symbol) -> &str {
        self.symbols.name(sym)
    }

    // ── Raw objects ────────────────────────────────────────────────

    pub fn alloc_binary(&mut self, class: Value, data: Vec<u8>) -> Value {
        Value::Ref(self.heap.alloc(Binary { class, data }))
    }

    pub fn alloc_array(&mut self, class: Value, elements: Vec<Value>) -> Value {
        Value::Ref(self.heap.alloc(Array { class, elements }))
    }

    /// Frame over an existing map. `values` must match the map's length.
    pub fn alloc_frame(&mut self, map: Value, values: Vec<Value>) -> Value {
        Value::Ref(self.heap.alloc(Frame { map, values }))
    }

    // ── Typed constructors ─────────────────────────────────────────

    pub fn new_string(&mut self, text: &str) -> Value {
        let class = Value::Symbol(self.names.string);
        self.alloc_binary(class, encode_string(text))
    }

    pub fn new_real(&mut self, x: f64) -> Value {
        let class = Value::Symbol(self.names.real);
        self.alloc_binary(class, x.to_be_bytes().to_vec())
    }

    pub fn new_array(&mut self, elements: Vec<Value>) -> Value {
        let class = Value::Symbol(self.names.array);
        self.alloc_array(class, elements)
    }

    /// Map without a super-map.
    pub fn new_map(&mut self, names: &[Symbol], mut flags: MapFlags) -> Value {
        if names.contains(&self.names.proto) {
            flags |= MapFlags::PROTO;
        }
        let mut elements = Vec::with_capacity(names.len() + FIRST_NAME_INDEX);
        elements.push(Value::NIL);
        if flags.contains(MapFlags::SORTED) {
            let mut sorted = names.to_vec();
            sorted.sort();
            elements.extend(sorted.into_iter().map(Value::Symbol));
        } else {
            elements.extend(names.iter().copied().map(Value::Symbol));
        }
        self.alloc_array(flags.to_class(), elements)
    }

    pub fn new_frame(&mut self) -> Value {
        let map = self.new_map(&[], MapFlags::empty());
        self.alloc_frame(map, Vec::new())
    }

    /// Frame with the given slots, in order.
    pub fn new_frame_with(&mut self, slots: &[(Symbol, Value)]) -> Value {
        let names: Vec<Symbol> = slots.iter().map(|&(name, _)| name).collect();
        let map = self.new_map(&names, MapFlags::empty());
        let values = slots.iter().map(|&(_, v)| v).collect();
        self.alloc_frame(map, values)
    }

    // ── Views ──────────────────────────────────────────────────────

    pub fn binary(&self, v: Value) -> Option<&Binary> {
        self.heap.get(v.as_ref()?)?.as_binary()
    }

    pub fn class_of_binary(&self, v: Value) -> Option<Symbol> {
        self.binary(v)?.class.as_symbol()
    }

    /// Whether `v` is a binary whose class is `string` or a subclass of it.
    pub fn is_string(&self, v: Value) -> bool {
        self.class_of_binary(v)
            .is_some_and(|class| self.symbols.is_subclass(class, self.names.string))
    }

    pub fn string_text(&self, v: Value) -> Option<String> {
        if !self.is_string(v) {
            return None;
        }
        self.binary(v).map(|b| decode_string(&b.data))
    }

    pub fn is_real(&self, v: Value) -> bool {
        self.binary(v).is_some_and(|b| {
            b.class == Value::Symbol(self.names.real) && b.data.len() == 8
        })
    }

    pub fn real_value(&self, v: Value) -> Option<f64> {
        if !self.is_real(v) {
            return None;
        }
        let data = &self.binary(v)?.data;
        let bytes: [u8; 8] = data.as_slice().try_into().ok()?;
        Some(f64::from_be_bytes(bytes))
    }
}
