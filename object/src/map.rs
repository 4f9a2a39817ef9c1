use crate::symbol::Symbol;
use crate::value::Value;

/// Index of the super-map in a map array.
pub const SUPERMAP_INDEX: usize = 0;
/// Index of the first slot name in a map array.
pub const FIRST_NAME_INDEX: usize = 1;

bitflags::bitflags! {
    /// Map flags, stored as the integer class of the map array.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MapFlags: u32 {
        /// Names are kept in ascending symbol order.
        const SORTED = 1 << 0;
        /// Referenced by more than one frame or as a super-map; never
        /// mutated in place.
        const SHARED = 1 << 1;
        /// Some map in the chain holds a `_proto` name.
        const PROTO = 1 << 2;
    }
}

impl MapFlags {
    pub fn from_class(class: Value) -> Self {
        match class {
            Value::Int(n) => Self::from_bits_truncate(n as u32),
            _ => Self::empty(),
        }
    }

    pub fn to_class(self) -> Value {
        Value::Int(self.bits() as i32)
    }
}

/// Find `name` among a map's own names (slot 0 excluded).
pub fn search_names(names: &[Value], name: Symbol, sorted: bool) -> Option<usize> {
    if sorted {
        names
            .binary_search_by(|probe| sort_key(*probe).cmp(&name.raw()))
            .ok()
    } else {
        names.iter().position(|&n| n == Value::Symbol(name))
    }
}

/// Position at which `name` keeps a sorted name list ordered.
pub fn sorted_insert_position(names: &[Value], name: Symbol) -> usize {
    names.partition_point(|probe| sort_key(*probe) < name.raw())
}

fn sort_key(v: Value) -> u32 {
    match v {
        Value::Symbol(s) => s.raw(),
        _ => u32::MAX,
    }
}
