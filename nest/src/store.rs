//! Frame, map and array operations.
//!
//! Frames keep their values in map order. A map's slot positions start after
//! the positions of its super-map chain, so lookups recurse into the
//! super-map with an accumulated offset.

use ahash::AHashMap;
use object::{
    Array, Binary, FIRST_NAME_INDEX, Frame, HeapObject, MapFlags, ObjRef, SUPERMAP_INDEX,
    Symbol, Value, search_names, sorted_insert_position,
};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

impl Interpreter {
    // ── Maps ───────────────────────────────────────────────────────

    fn map_array(&self, map: Value) -> Option<&Array> {
        self.heap.get(map.as_ref()?)?.as_array()
    }

    pub(crate) fn map_flags(&self, map: Value) -> MapFlags {
        self.map_array(map)
            .map_or(MapFlags::empty(), |a| MapFlags::from_class(a.class))
    }

    fn supermap(&self, map: Value) -> Value {
        self.map_array(map)
            .and_then(|a| a.elements.get(SUPERMAP_INDEX).copied())
            .unwrap_or(Value::NIL)
    }

    /// Number of slots a map describes, super-maps included.
    pub(crate) fn map_len(&self, map: Value) -> usize {
        let Some(array) = self.map_array(map) else {
            return 0;
        };
        let own = array.elements.len().saturating_sub(FIRST_NAME_INDEX);
        own + self.map_len(self.supermap(map))
    }

    /// Slot position of `name` in frames using `map`.
    pub(crate) fn map_position(&self, map: Value, name: Symbol) -> Option<usize> {
        let array = self.map_array(map)?;
        let supermap = array.elements.get(SUPERMAP_INDEX).copied()?;
        let names = &array.elements[FIRST_NAME_INDEX..];
        let sorted = MapFlags::from_class(array.class).contains(MapFlags::SORTED);
        match search_names(names, name, sorted) {
            Some(i) => Some(self.map_len(supermap) + i),
            None => self.map_position(supermap, name),
        }
    }

    /// Slot names in slot order.
    pub(crate) fn map_names(&self, map: Value) -> Vec<Symbol> {
        let Some(array) = self.map_array(map) else {
            return Vec::new();
        };
        let mut names = self.map_names(self.supermap(map));
        names.extend(
            array.elements[FIRST_NAME_INDEX.min(array.elements.len())..]
                .iter()
                .filter_map(|v| v.as_symbol()),
        );
        names
    }

    fn set_map_flags(&mut self, map: Value, flags: MapFlags) {
        if let Some(r) = map.as_ref() {
            if let Some(array) = self.heap.get_mut(r).and_then(HeapObject::as_array_mut) {
                array.class = flags.to_class();
            }
        }
    }

    /// Mark a map as referenced from more than one place.
    pub(crate) fn share_map(&mut self, map: Value) {
        let Some(r) = map.as_ref() else { return };
        if !self.heap.is_literal(r) {
            let flags = self.map_flags(map);
            self.set_map_flags(map, flags | MapFlags::SHARED);
        }
    }

    fn map_is_shared(&self, map: Value) -> bool {
        map.as_ref().is_some_and(|r| self.heap.is_literal(r))
            || self.map_flags(map).contains(MapFlags::SHARED)
    }

    // ── Frames ─────────────────────────────────────────────────────

    pub fn is_frame(&self, v: Value) -> bool {
        self.frame(v).is_ok()
    }

    pub fn frame(&self, v: Value) -> Result<&Frame> {
        v.as_ref()
            .and_then(|r| self.heap.get(r))
            .and_then(HeapObject::as_frame)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedFrame, v))
    }

    fn frame_mut(&mut self, r: ObjRef) -> Option<&mut Frame> {
        self.heap.get_mut(r).and_then(HeapObject::as_frame_mut)
    }

    fn writable(&self, v: Value) -> Result<ObjRef> {
        let r = v
            .as_ref()
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedFrameOrArray, v))?;
        if self.heap.is_literal(r) {
            return Err(RuntimeError::with_value(ErrorCode::ReadOnly, v));
        }
        Ok(r)
    }

    pub fn is_read_only(&self, v: Value) -> bool {
        v.as_ref().is_some_and(|r| self.heap.is_literal(r))
    }

    /// Own slot value (no inheritance). NIL-safe: non-frames have no slots.
    pub fn get_slot(&self, frame: Value, name: Symbol) -> Option<Value> {
        let f = self.frame(frame).ok()?;
        let pos = self.map_position(f.map, name)?;
        f.values.get(pos).copied()
    }

    pub fn has_slot(&self, frame: Value, name: Symbol) -> bool {
        self.get_slot(frame, name).is_some()
    }

    pub fn frame_len(&self, frame: Value) -> Result<usize> {
        Ok(self.frame(frame)?.values.len())
    }

    pub fn slot_names(&self, frame: Value) -> Result<Vec<Symbol>> {
        Ok(self.map_names(self.frame(frame)?.map))
    }

    pub fn frame_slots(&self, frame: Value) -> Result<Vec<(Symbol, Value)>> {
        let f = self.frame(frame)?;
        let names = self.map_names(f.map);
        Ok(names.into_iter().zip(f.values.iter().copied()).collect())
    }

    /// Write a slot, adding it when missing.
    ///
    /// Adding to a literal or shared map derives a private map whose
    /// super-map is the shared one; frames sharing the old map are not
    /// affected.
    pub fn set_slot(&mut self, frame: Value, name: Symbol, value: Value) -> Result<()> {
        let map = self.frame(frame)?.map;
        let r = self.writable(frame)?;

        if let Some(pos) = self.map_position(map, name) {
            if let Some(slot) = self.frame_mut(r).and_then(|f| f.values.get_mut(pos)) {
                *slot = value;
            }
            return Ok(());
        }

        let mut flags = self.map_flags(map);
        if name == self.names.proto {
            flags |= MapFlags::PROTO;
        }

        if self.map_is_shared(map) {
            self.share_map(map);
            let derived = (flags & MapFlags::PROTO).to_class();
            let new_map = self.alloc_array(derived, vec![map, Value::Symbol(name)]);
            if let Some(f) = self.frame_mut(r) {
                f.map = new_map;
                f.values.push(value);
            }
        } else {
            let map_ref = map
                .as_ref()
                .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedArray, map))?;
            let base = self.map_len(self.supermap(map));
            let Some(array) = self.heap.get_mut(map_ref).and_then(HeapObject::as_array_mut)
            else {
                return Err(RuntimeError::with_value(ErrorCode::ExpectedArray, map));
            };
            let own = if flags.contains(MapFlags::SORTED) {
                sorted_insert_position(&array.elements[FIRST_NAME_INDEX..], name)
            } else {
                array.elements.len() - FIRST_NAME_INDEX
            };
            array.elements.insert(FIRST_NAME_INDEX + own, Value::Symbol(name));
            array.class = flags.to_class();
            self.heap.note_resize(map_ref);
            if let Some(f) = self.frame_mut(r) {
                f.values.insert(base + own, value);
            }
        }
        self.heap.note_resize(r);
        Ok(())
    }

    /// Remove an own slot. Removing a missing slot is a no-op.
    pub fn remove_slot(&mut self, frame: Value, name: Symbol) -> Result<()> {
        let map = self.frame(frame)?.map;
        let r = self.writable(frame)?;
        let Some(pos) = self.map_position(map, name) else {
            return Ok(());
        };

        if self.map_is_shared(map) || !self.supermap(map).is_nil() {
            let names: Vec<Symbol> = self
                .map_names(map)
                .into_iter()
                .filter(|&n| n != name)
                .collect();
            let new_map = self.new_map(&names, MapFlags::empty());
            if let Some(f) = self.frame_mut(r) {
                f.map = new_map;
            }
        } else if let Some(map_ref) = map.as_ref() {
            let mut flags = self.map_flags(map);
            if name == self.names.proto {
                flags.remove(MapFlags::PROTO);
            }
            if let Some(array) = self.heap.get_mut(map_ref).and_then(HeapObject::as_array_mut) {
                array.elements.remove(FIRST_NAME_INDEX + pos);
                array.class = flags.to_class();
            }
            self.heap.note_resize(map_ref);
        }
        if let Some(f) = self.frame_mut(r) {
            f.values.remove(pos);
        }
        self.heap.note_resize(r);
        Ok(())
    }

    // ── Arrays ─────────────────────────────────────────────────────

    pub fn is_array(&self, v: Value) -> bool {
        self.array(v).is_ok()
    }

    pub fn array(&self, v: Value) -> Result<&Array> {
        v.as_ref()
            .and_then(|r| self.heap.get(r))
            .and_then(HeapObject::as_array)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedArray, v))
    }

    fn array_mut(&mut self, v: Value) -> Result<&mut Array> {
        let r = self.writable(v)?;
        self.heap
            .get_mut(r)
            .and_then(HeapObject::as_array_mut)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedArray, v))
    }

    pub fn array_len(&self, v: Value) -> Result<usize> {
        Ok(self.array(v)?.elements.len())
    }

    fn check_index(v: Value, index: i64, len: usize) -> Result<usize> {
        if index < 0 || index as u64 >= len as u64 {
            return Err(RuntimeError::with_value(ErrorCode::OutOfBounds, v).index(index));
        }
        Ok(index as usize)
    }

    pub fn array_get(&self, v: Value, index: i64) -> Result<Value> {
        let array = self.array(v)?;
        let i = Self::check_index(v, index, array.elements.len())?;
        Ok(array.elements[i])
    }

    pub fn array_set(&mut self, v: Value, index: i64, value: Value) -> Result<()> {
        self.array(v)?;
        let array = self.array_mut(v)?;
        let i = Self::check_index(v, index, array.elements.len())?;
        array.elements[i] = value;
        Ok(())
    }

    pub fn array_append(&mut self, v: Value, value: Value) -> Result<()> {
        self.array(v)?;
        self.array_mut(v)?.elements.push(value);
        self.note_resize(v);
        Ok(())
    }

    /// Insert before `index`; `index == len` appends.
    pub fn array_insert(&mut self, v: Value, index: i64, value: Value) -> Result<()> {
        let len = self.array_len(v)?;
        let i = Self::check_index(v, index, len + 1)?;
        self.array_mut(v)?.elements.insert(i, value);
        self.note_resize(v);
        Ok(())
    }

    pub fn array_remove(&mut self, v: Value, index: i64) -> Result<Value> {
        let len = self.array_len(v)?;
        let i = Self::check_index(v, index, len)?;
        let removed = self.array_mut(v)?.elements.remove(i);
        self.note_resize(v);
        Ok(removed)
    }

    /// Resize an array (new slots are NIL) or a binary (new bytes are 0).
    pub fn set_length(&mut self, v: Value, len: i64) -> Result<()> {
        if len < 0 {
            return Err(RuntimeError::with_value(ErrorCode::OutOfBounds, v).index(len));
        }
        let r = self.writable(v)?;
        match self.heap.get_mut(r) {
            Some(HeapObject::Array(a)) => a.elements.resize(len as usize, Value::NIL),
            Some(HeapObject::Binary(b)) => b.data.resize(len as usize, 0),
            _ => return Err(RuntimeError::with_value(ErrorCode::ExpectedArray, v)),
        }
        self.heap.note_resize(r);
        Ok(())
    }

    /// Mutable bytes of a binary object.
    pub(crate) fn binary_mut(&mut self, v: Value) -> Result<&mut Binary> {
        if self.binary(v).is_none() {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedBinary, v));
        }
        let r = self.writable(v)?;
        self.heap
            .get_mut(r)
            .and_then(HeapObject::as_binary_mut)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedBinary, v))
    }

    fn note_resize(&mut self, v: Value) {
        if let Some(r) = v.as_ref() {
            self.heap.note_resize(r);
        }
    }

    // ── Objects ────────────────────────────────────────────────────

    /// Class of a binary or array, or the `class` slot of a frame.
    pub fn set_class(&mut self, v: Value, class: Value) -> Result<()> {
        let r = self.writable(v)?;
        if self.is_frame(v) {
            let name = self.names.class;
            return self.set_slot(v, name, class);
        }
        match self.heap.get_mut(r) {
            Some(HeapObject::Array(a)) => a.class = class,
            Some(HeapObject::Binary(b)) => b.class = class,
            _ => return Err(RuntimeError::with_value(ErrorCode::ExpectedFrameOrArray, v)),
        }
        Ok(())
    }

    /// Shallow copy. Immediates are returned unchanged; the copy of a
    /// literal is mutable. Frame copies share the original's map.
    pub fn clone_value(&mut self, v: Value) -> Value {
        let Some(object) = v.as_ref().and_then(|r| self.heap.get(r)).cloned() else {
            return v;
        };
        if let HeapObject::Frame(f) = &object {
            self.share_map(f.map);
        }
        Value::Ref(self.heap.alloc(object))
    }

    /// Recursive copy preserving shared structure and cycles. Maps are
    /// shared, not copied.
    pub fn deep_clone(&mut self, v: Value) -> Value {
        let mut copies = AHashMap::new();
        self.deep_clone_into(v, &mut copies)
    }

    fn deep_clone_into(&mut self, v: Value, copies: &mut AHashMap<ObjRef, Value>) -> Value {
        let Some(r) = v.as_ref() else { return v };
        if let Some(&copy) = copies.get(&r) {
            return copy;
        }
        let Some(object) = self.heap.get(r).cloned() else {
            return v;
        };
        let copy = match &object {
            HeapObject::Frame(f) => {
                self.share_map(f.map);
                self.alloc_frame(f.map, vec![Value::NIL; f.values.len()])
            }
            HeapObject::Array(a) => {
                self.alloc_array(a.class, vec![Value::NIL; a.elements.len()])
            }
            HeapObject::Binary(_) => Value::Ref(self.heap.alloc(object.clone())),
        };
        copies.insert(r, copy);

        let children: Vec<Value> = match &object {
            HeapObject::Frame(f) => f.values.clone(),
            HeapObject::Array(a) => a.elements.clone(),
            HeapObject::Binary(_) => return copy,
        };
        let cloned: Vec<Value> = children
            .into_iter()
            .map(|child| self.deep_clone_into(child, copies))
            .collect();
        if let Some(target) = copy.as_ref().and_then(|c| self.heap.get_mut(c)) {
            match target {
                HeapObject::Frame(f) => f.values = cloned,
                HeapObject::Array(a) => a.elements = cloned,
                HeapObject::Binary(_) => {}
            }
        }
        copy
    }

    /// Make `v` and everything reachable from it read-only.
    pub fn freeze(&mut self, v: Value) {
        let mut work = vec![v];
        while let Some(v) = work.pop() {
            let Some(r) = v.as_ref() else { continue };
            if self.heap.is_literal(r) {
                continue;
            }
            let Some(object) = self.heap.get(r) else { continue };
            object.trace(&mut |child| work.push(child));
            self.heap.set_literal(r);
        }
    }
}
