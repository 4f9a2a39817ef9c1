use crate::header::{Header, ObjectKind};
use crate::value::Value;

/// Bytes charged for every object in addition to its payload: header word,
/// class or map word, and the size word.
pub const OBJECT_OVERHEAD: usize = 12;
const WORD: usize = 4;

/// Raw bytes plus a class.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub class: Value,
    pub data: Vec<u8>,
}

/// Indexed values plus a class.
///
/// A map is an array whose slot 0 is the super-map, whose remaining slots are
/// the slot names, and whose class is an integer of [`crate::MapFlags`].
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub class: Value,
    pub elements: Vec<Value>,
}

/// Slot values laid out in the order of the frame's map.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub map: Value,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Binary(Binary),
    Array(Array),
    Frame(Frame),
}

impl HeapObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Binary(_) => ObjectKind::Binary,
            HeapObject::Array(_) => ObjectKind::Array,
            HeapObject::Frame(_) => ObjectKind::Frame,
        }
    }

    /// Payload size in bytes.
    pub fn payload_size(&self) -> usize {
        match self {
            HeapObject::Binary(b) => b.data.len(),
            HeapObject::Array(a) => a.elements.len() * WORD,
            HeapObject::Frame(f) => f.values.len() * WORD,
        }
    }

    /// Bytes charged to the owning pool.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        OBJECT_OVERHEAD + self.payload_size()
    }

    pub fn header(&self) -> Header {
        Header::new(self.kind(), self.payload_size() as u32)
    }

    /// Calls `visitor` for every value the object holds.
    pub fn trace(&self, visitor: &mut dyn FnMut(Value)) {
        match self {
            HeapObject::Binary(b) => visitor(b.class),
            HeapObject::Array(a) => {
                visitor(a.class);
                for &v in &a.elements {
                    visitor(v);
                }
            }
            HeapObject::Frame(f) => {
                visitor(f.map);
                for &v in &f.values {
                    visitor(v);
                }
            }
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            HeapObject::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_binary_mut(&mut self) -> Option<&mut Binary> {
        match self {
            HeapObject::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            HeapObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            HeapObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            HeapObject::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_frame_mut(&mut self) -> Option<&mut Frame> {
        match self {
            HeapObject::Frame(f) => Some(f),
            _ => None,
        }
    }
}

impl From<Binary> for HeapObject {
    fn from(b: Binary) -> Self {
        HeapObject::Binary(b)
    }
}

impl From<Array> for HeapObject {
    fn from(a: Array) -> Self {
        HeapObject::Array(a)
    }
}

impl From<Frame> for HeapObject {
    fn from(f: Frame) -> Self {
        HeapObject::Frame(f)
    }
}
