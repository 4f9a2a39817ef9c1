//! Newton Streamed Object Format.
//!
//! A stream is a version byte followed by one object. Every object other
//! than immediates, characters and NIL takes the next precedent index in
//! encounter order, assigned before its children are written, so shared
//! objects and cycles are written once and referenced afterwards.

use ahash::AHashMap;
use object::{HeapObject, MagicPointer, MapFlags, ObjRef, Symbol, Value, tagged};

use crate::Interpreter;
use crate::error::{ErrorCode, RuntimeError};

/// Strings are written as binaries of class `string`.
pub const VERSION_1: u8 = 1;
pub const VERSION_2: u8 = 2;

const TAG_IMMEDIATE: u8 = 0;
const TAG_CHARACTER: u8 = 1;
const TAG_UNICODE_CHARACTER: u8 = 2;
const TAG_BINARY: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_PLAIN_ARRAY: u8 = 5;
const TAG_FRAME: u8 = 6;
const TAG_SYMBOL: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_PRECEDENT: u8 = 9;
const TAG_NIL: u8 = 10;
const TAG_SMALL_RECT: u8 = 11;

const XLONG_ESCAPE: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NsofError {
    #[error("stream truncated at byte {0}")]
    Truncated(usize),
    #[error("unknown tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("precedent {index} refers past the {count} objects read")]
    BadPrecedent { index: usize, count: usize },
    #[error("unsupported version {0}")]
    BadVersion(u8),
    #[error("{0}")]
    BadValue(String),
}

impl From<NsofError> for RuntimeError {
    fn from(err: NsofError) -> Self {
        let code = match err {
            NsofError::Truncated(_) => ErrorCode::NsofTruncated,
            NsofError::UnknownTag { .. } => ErrorCode::NsofUnknownTag,
            NsofError::BadPrecedent { .. } => ErrorCode::NsofBadPrecedent,
            NsofError::BadVersion(_) => ErrorCode::NsofBadVersion,
            NsofError::BadValue(_) => ErrorCode::NsofBadValue,
        };
        RuntimeError::new(code).detail(err.to_string())
    }
}

fn write_xlong(out: &mut Vec<u8>, v: usize) -> Result<(), NsofError> {
    if v < XLONG_ESCAPE as usize {
        out.push(v as u8);
        return Ok(());
    }
    let v = u32::try_from(v)
        .map_err(|_| NsofError::BadValue(format!("length {v} does not fit an xlong")))?;
    out.push(XLONG_ESCAPE);
    out.extend_from_slice(&v.to_be_bytes());
    Ok(())
}

// ── Encoding ───────────────────────────────────────────────────────

struct Encoder<'a> {
    interp: &'a Interpreter,
    version: u8,
    out: Vec<u8>,
    objects: AHashMap<ObjRef, usize>,
    symbols: AHashMap<Symbol, usize>,
    next: usize,
}

impl Encoder<'_> {
    fn precedent(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }

    fn write_precedent(&mut self, index: usize) -> Result<(), NsofError> {
        self.out.push(TAG_PRECEDENT);
        write_xlong(&mut self.out, index)
    }

    fn write(&mut self, v: Value) -> Result<(), NsofError> {
        match v {
            _ if v.is_nil() => self.out.push(TAG_NIL),
            Value::Char(c) if (c as u32) <= 0xFF => {
                self.out.push(TAG_CHARACTER);
                self.out.push(c as u32 as u8);
            }
            Value::Char(c) if (c as u32) <= 0xFFFF => {
                self.out.push(TAG_UNICODE_CHARACTER);
                self.out.extend_from_slice(&(c as u32 as u16).to_be_bytes());
            }
            Value::Symbol(s) => self.write_symbol(s)?,
            Value::Ref(r) => self.write_object(v, r)?,
            Value::Magic(MagicPointer::Named(_)) => {
                return Err(NsofError::BadValue(
                    "named magic pointers cannot be streamed".into(),
                ));
            }
            Value::Int(_) | Value::Char(_) | Value::Special(_) | Value::Magic(_) => {
                let word = tagged::encode(v)
                    .map_err(|e| NsofError::BadValue(e.to_string()))?;
                self.out.push(TAG_IMMEDIATE);
                write_xlong(&mut self.out, word as usize)?;
            }
        }
        Ok(())
    }

    fn write_symbol(&mut self, s: Symbol) -> Result<(), NsofError> {
        if let Some(&index) = self.symbols.get(&s) {
            return self.write_precedent(index);
        }
        let index = self.precedent();
        self.symbols.insert(s, index);
        let interp = self.interp;
        let name = interp.symbol_name(s).as_bytes();
        self.out.push(TAG_SYMBOL);
        write_xlong(&mut self.out, name.len())?;
        self.out.extend_from_slice(name);
        Ok(())
    }

    fn write_object(&mut self, v: Value, r: ObjRef) -> Result<(), NsofError> {
        if let Some(&index) = self.objects.get(&r) {
            return self.write_precedent(index);
        }
        let interp = self.interp;
        let object = interp
            .heap
            .get(r)
            .ok_or_else(|| NsofError::BadValue(format!("dangling reference #{}", r.raw())))?;
        let index = self.precedent();
        self.objects.insert(r, index);
        let names = &interp.names;

        match object {
            HeapObject::Binary(b) => {
                if self.version >= VERSION_2 && b.class == Value::Symbol(names.string) {
                    self.out.push(TAG_STRING);
                    write_xlong(&mut self.out, b.data.len())?;
                    self.out.extend_from_slice(&b.data);
                } else {
                    self.out.push(TAG_BINARY);
                    write_xlong(&mut self.out, b.data.len())?;
                    self.write(b.class)?;
                    self.out.extend_from_slice(&b.data);
                }
            }
            HeapObject::Array(a) => {
                if a.class == Value::Symbol(names.array) {
                    self.out.push(TAG_PLAIN_ARRAY);
                    write_xlong(&mut self.out, a.elements.len())?;
                } else {
                    self.out.push(TAG_ARRAY);
                    write_xlong(&mut self.out, a.elements.len())?;
                    self.write(a.class)?;
                }
                for &element in &a.elements {
                    self.write(element)?;
                }
            }
            HeapObject::Frame(_) => {
                let slots = interp
                    .frame_slots(v)
                    .map_err(|e| NsofError::BadValue(e.to_string()))?;
                if let Some(rect) = self.small_rect(&slots) {
                    self.out.push(TAG_SMALL_RECT);
                    self.out.extend_from_slice(&rect);
                    return Ok(());
                }
                self.out.push(TAG_FRAME);
                write_xlong(&mut self.out, slots.len())?;
                for &(name, _) in &slots {
                    self.write_symbol(name)?;
                }
                for &(_, value) in &slots {
                    self.write(value)?;
                }
            }
        }
        Ok(())
    }

    /// `{top, left, bottom, right}` with byte-sized integer values.
    fn small_rect(&self, slots: &[(Symbol, Value)]) -> Option<[u8; 4]> {
        if slots.len() != 4 {
            return None;
        }
        let names = &self.interp.names;
        let side = |name: Symbol| {
            let value = slots.iter().find(|&&(n, _)| n == name)?.1;
            u8::try_from(value.as_int()?).ok()
        };
        Some([
            side(names.top)?,
            side(names.left)?,
            side(names.bottom)?,
            side(names.right)?,
        ])
    }
}

// ── Decoding ───────────────────────────────────────────────────────

struct Decoder<'a> {
    interp: &'a mut Interpreter,
    bytes: &'a [u8],
    pos: usize,
    precedents: Vec<Value>,
}

impl<'a> Decoder<'a> {
    fn byte(&mut self) -> Result<u8, NsofError> {
        let b = *self.bytes.get(self.pos).ok_or(NsofError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NsofError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(NsofError::Truncated(self.bytes.len()))?;
        let bytes: &'a [u8] = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn xlong(&mut self) -> Result<usize, NsofError> {
        let first = self.byte()?;
        if first < XLONG_ESCAPE {
            return Ok(first as usize);
        }
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    /// Element count, bounded by the bytes left (each element takes one).
    fn count(&mut self) -> Result<usize, NsofError> {
        let n = self.xlong()?;
        if n > self.bytes.len() - self.pos {
            return Err(NsofError::Truncated(self.bytes.len()));
        }
        Ok(n)
    }

    fn register(&mut self, v: Value) {
        self.precedents.push(v);
    }

    fn fill(&mut self, placeholder: Value, fill: impl FnOnce(&mut HeapObject)) {
        if let Some(object) = placeholder.as_ref().and_then(|r| self.interp.heap.get_mut(r)) {
            fill(object);
        }
        if let Some(r) = placeholder.as_ref() {
            self.interp.heap.note_resize(r);
        }
    }

    fn read(&mut self) -> Result<Value, NsofError> {
        let offset = self.pos;
        let tag = self.byte()?;
        match tag {
            TAG_IMMEDIATE => {
                let word = self.xlong()? as u32;
                match tagged::decode(word) {
                    v @ (Value::Ref(_)
                    | Value::Symbol(_)
                    | Value::Magic(MagicPointer::Named(_))) => Err(NsofError::BadValue(
                        format!("immediate 0x{word:08x} is a reference ({v:?})"),
                    )),
                    v => Ok(v),
                }
            }
            TAG_CHARACTER => Ok(Value::Char(self.byte()? as char)),
            TAG_UNICODE_CHARACTER => {
                let b = self.take(2)?;
                let code = u16::from_be_bytes([b[0], b[1]]);
                char::from_u32(code.into())
                    .map(Value::Char)
                    .ok_or_else(|| NsofError::BadValue(format!("bad character 0x{code:04x}")))
            }
            TAG_BINARY => {
                let len = self.count()?;
                let binary = self.interp.alloc_binary(Value::NIL, Vec::new());
                self.register(binary);
                let class = self.read()?;
                let data = self.take(len)?.to_vec();
                self.fill(binary, |object| {
                    if let HeapObject::Binary(b) = object {
                        b.class = class;
                        b.data = data;
                    }
                });
                Ok(binary)
            }
            TAG_STRING => {
                let len = self.count()?;
                let data = self.take(len)?.to_vec();
                let class = Value::Symbol(self.interp.names.string);
                let string = self.interp.alloc_binary(class, data);
                self.register(string);
                Ok(string)
            }
            TAG_ARRAY | TAG_PLAIN_ARRAY => {
                let len = self.count()?;
                let array = self.interp.alloc_array(Value::NIL, vec![Value::NIL; len]);
                self.register(array);
                let class = if tag == TAG_ARRAY {
                    self.read()?
                } else {
                    Value::Symbol(self.interp.names.array)
                };
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.read()?);
                }
                self.fill(array, |object| {
                    if let HeapObject::Array(a) = object {
                        a.class = class;
                        a.elements = elements;
                    }
                });
                Ok(array)
            }
            TAG_FRAME => {
                let len = self.count()?;
                let frame = self.interp.alloc_frame(Value::NIL, Vec::new());
                self.register(frame);
                let mut keys = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.read()?;
                    let name = key.as_symbol().ok_or_else(|| {
                        NsofError::BadValue(format!("frame key is not a symbol: {key:?}"))
                    })?;
                    if keys.contains(&name) {
                        return Err(NsofError::BadValue(format!(
                            "duplicate slot |{}|",
                            self.interp.symbol_name(name)
                        )));
                    }
                    keys.push(name);
                }
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.read()?);
                }
                let map = self.interp.new_map(&keys, MapFlags::empty());
                self.fill(frame, |object| {
                    if let HeapObject::Frame(f) = object {
                        f.map = map;
                        f.values = values;
                    }
                });
                Ok(frame)
            }
            TAG_SYMBOL => {
                let len = self.count()?;
                let name = String::from_utf8_lossy(self.take(len)?).into_owned();
                let sym = self.interp.sym(&name);
                self.register(sym);
                Ok(sym)
            }
            TAG_PRECEDENT => {
                let index = self.xlong()?;
                self.precedents
                    .get(index)
                    .copied()
                    .ok_or(NsofError::BadPrecedent {
                        index,
                        count: self.precedents.len(),
                    })
            }
            TAG_NIL => Ok(Value::NIL),
            TAG_SMALL_RECT => {
                let b = self.take(4)?;
                let [top, left, bottom, right] = [b[0], b[1], b[2], b[3]].map(|x| Value::Int(x.into()));
                let names = &self.interp.names;
                let slots = [
                    (names.top, top),
                    (names.left, left),
                    (names.bottom, bottom),
                    (names.right, right),
                ];
                let rect = self.interp.new_frame_with(&slots);
                self.register(rect);
                Ok(rect)
            }
            tag => Err(NsofError::UnknownTag { tag, offset }),
        }
    }
}

impl Interpreter {
    /// Serialise `root` and everything reachable from it.
    pub fn encode_nsof(&self, root: Value, version: u8) -> Result<Vec<u8>, NsofError> {
        if !(VERSION_1..=VERSION_2).contains(&version) {
            return Err(NsofError::BadVersion(version));
        }
        let mut encoder = Encoder {
            interp: self,
            version,
            out: vec![version],
            objects: AHashMap::new(),
            symbols: AHashMap::new(),
            next: 0,
        };
        encoder.write(root)?;
        Ok(encoder.out)
    }

    /// Rebuild the object graph of a stream. The result is not rooted.
    pub fn decode_nsof(&mut self, bytes: &[u8]) -> Result<Value, NsofError> {
        let version = *bytes.first().ok_or(NsofError::Truncated(0))?;
        if !(VERSION_1..=VERSION_2).contains(&version) {
            return Err(NsofError::BadVersion(version));
        }
        let mut decoder = Decoder {
            interp: self,
            bytes,
            pos: 1,
            precedents: Vec::new(),
        };
        let root = decoder.read()?;
        if decoder.pos != bytes.len() {
            return Err(NsofError::BadValue(format!(
                "{} trailing bytes",
                bytes.len() - decoder.pos
            )));
        }
        log::debug!(
            "decoded {} byte stream, {} objects",
            bytes.len(),
            decoder.precedents.len()
        );
        Ok(root)
    }
}
