mod header;
mod map;
mod objects;
mod symbol;
pub mod tagged;
mod value;

pub use header::{Header, HeaderFlags, ObjectKind};
pub use map::{
    FIRST_NAME_INDEX, MapFlags, SUPERMAP_INDEX, search_names,
    sorted_insert_position,
};
pub use objects::{Array, Binary, Frame, HeapObject, OBJECT_OVERHEAD};
pub use symbol::{Symbol, SymbolTable, compare_names, is_subclass, symbol_hash};
pub use value::{MagicPointer, ObjRef, Value};
