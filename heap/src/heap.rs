//! Object arena with a stop-the-world mark-sweep collector.
//!
//! This crate is decoupled from any interpreter. Consumers provide a
//! [`RootProvider`] at collection time; object edges come from
//! [`HeapObject::trace`].
//!
//! Objects live on one of two chains. The mutable chain is swept every
//! cycle. Objects flagged literal (read-only) are moved onto the literal
//! chain the first time a sweep sees them and are never swept again; they
//! act as permanent roots.

use std::ops::{Index, IndexMut};

use object::{Header, HeaderFlags, HeapObject, ObjRef, Value};

// ── Public API types ──────────────────────────────────────────────────

/// Consumers implement this to provide GC roots.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value));
}

/// A set of roots gathered for one collection.
#[derive(Debug, Default)]
pub struct RootSet {
    pub roots: Vec<Value>,
}

impl RootProvider for RootSet {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        for &root in &self.roots {
            visitor(root);
        }
    }
}

// ── Heap settings ─────────────────────────────────────────────────────

/// Allocation ceiling policy of a memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSettings {
    /// Live bytes above which the next safepoint collects.
    pub initial_ceiling: usize,
    /// Step by which the ceiling grows when a collection cannot get the
    /// live bytes back under it.
    pub ceiling_increment: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            initial_ceiling: 512 * 1024,   // 512 KB
            ceiling_increment: 128 * 1024, // 128 KB
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.initial_ceiling == 0 {
            return Err("initial_ceiling must be > 0");
        }
        if self.ceiling_increment == 0 {
            return Err("ceiling_increment must be > 0");
        }
        Ok(())
    }
}

// ── Statistics ────────────────────────────────────────────────────────

/// Result of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub marked: usize,
    pub freed_objects: usize,
    pub freed_bytes: usize,
    /// Objects moved from the mutable chain to the literal chain.
    pub promoted_literals: usize,
    pub live_bytes: usize,
    pub ceiling: usize,
}

/// Running totals of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub collections: u64,
    pub allocated_objects: u64,
    pub allocated_bytes: u64,
    pub freed_objects: u64,
    pub live_objects: usize,
    pub literal_objects: usize,
    pub live_bytes: usize,
    pub ceiling: usize,
}

// ── Mark bitset ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MarkBits(Vec<u64>);

impl MarkBits {
    fn get(&self, index: usize) -> bool {
        self.0
            .get(index / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }

    fn set(&mut self, index: usize, value: bool) {
        let word = index / 64;
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        if value {
            self.0[word] |= 1 << (index % 64);
        } else {
            self.0[word] &= !(1 << (index % 64));
        }
    }
}

// ── Heap ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Cell {
    object: HeapObject,
    /// Bytes currently charged for this object.
    bytes: usize,
    literal: bool,
}

/// One memory pool.
#[derive(Debug)]
pub struct Heap {
    settings: HeapSettings,
    cells: Vec<Option<Cell>>,
    free: Vec<u32>,
    mutable_chain: Vec<ObjRef>,
    literal_chain: Vec<ObjRef>,
    marks: MarkBits,
    /// Mark value meaning "reached" in the current cycle. Flipped at the
    /// start of every collection so survivors never need unmarking.
    polarity: bool,
    live_bytes: usize,
    ceiling: usize,
    collect_requested: bool,
    stats: HeapStats,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        settings.validate().expect("Invalid Heap Settings");
        Self {
            settings,
            cells: Vec::new(),
            free: Vec::new(),
            mutable_chain: Vec::new(),
            literal_chain: Vec::new(),
            marks: MarkBits::default(),
            polarity: false,
            live_bytes: 0,
            ceiling: settings.initial_ceiling,
            collect_requested: false,
            stats: HeapStats::default(),
        }
    }

    pub fn settings(&self) -> HeapSettings {
        self.settings
    }

    // ── Allocation ─────────────────────────────────────────────────

    fn place(&mut self, object: HeapObject, literal: bool) -> ObjRef {
        let bytes = object.size_in_bytes();
        let cell = Cell {
            object,
            bytes,
            literal,
        };
        let r = match self.free.pop() {
            Some(index) => {
                self.cells[index as usize] = Some(cell);
                ObjRef::from_index(index)
            }
            None => {
                self.cells.push(Some(cell));
                ObjRef::from_index((self.cells.len() - 1) as u32)
            }
        };
        // Fresh objects start unmarked for the next cycle.
        self.marks.set(r.index(), self.polarity);
        if literal {
            self.literal_chain.push(r);
        } else {
            self.mutable_chain.push(r);
        }

        self.live_bytes += bytes;
        self.stats.allocated_objects += 1;
        self.stats.allocated_bytes += bytes as u64;
        if self.live_bytes > self.ceiling {
            self.collect_requested = true;
        }
        r
    }

    /// Allocate a mutable object.
    pub fn alloc(&mut self, object: impl Into<HeapObject>) -> ObjRef {
        self.place(object.into(), false)
    }

    /// Allocate a read-only object directly on the literal chain.
    pub fn alloc_literal(&mut self, object: impl Into<HeapObject>) -> ObjRef {
        self.place(object.into(), true)
    }

    // ── Access ─────────────────────────────────────────────────────

    pub fn get(&self, r: ObjRef) -> Option<&HeapObject> {
        self.cells
            .get(r.index())
            .and_then(Option::as_ref)
            .map(|cell| &cell.object)
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut HeapObject> {
        self.cells
            .get_mut(r.index())
            .and_then(Option::as_mut)
            .map(|cell| &mut cell.object)
    }

    pub fn contains(&self, r: ObjRef) -> bool {
        self.get(r).is_some()
    }

    pub fn is_literal(&self, r: ObjRef) -> bool {
        self.cells
            .get(r.index())
            .and_then(Option::as_ref)
            .is_some_and(|cell| cell.literal)
    }

    /// Make an object read-only. It moves to the literal chain at the next
    /// sweep.
    pub fn set_literal(&mut self, r: ObjRef) {
        if let Some(Some(cell)) = self.cells.get_mut(r.index()) {
            cell.literal = true;
        }
    }

    pub fn header(&self, r: ObjRef) -> Option<Header> {
        let cell = self.cells.get(r.index())?.as_ref()?;
        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::LITERAL, cell.literal);
        flags.set(HeaderFlags::MARK, self.marks.get(r.index()));
        Some(cell.object.header().with_flags(flags))
    }

    /// Re-charge an object whose payload changed size.
    pub fn note_resize(&mut self, r: ObjRef) {
        let Some(Some(cell)) = self.cells.get_mut(r.index()) else {
            return;
        };
        let bytes = cell.object.size_in_bytes();
        if bytes > cell.bytes {
            let grown = bytes - cell.bytes;
            self.live_bytes += grown;
            self.stats.allocated_bytes += grown as u64;
        } else {
            self.live_bytes -= cell.bytes - bytes;
        }
        cell.bytes = bytes;
        if self.live_bytes > self.ceiling {
            self.collect_requested = true;
        }
    }

    // ── Accounting ─────────────────────────────────────────────────

    /// Whether the allocator has crossed the ceiling since the last cycle.
    #[inline]
    pub fn needs_collection(&self) -> bool {
        self.collect_requested
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn object_count(&self) -> usize {
        self.mutable_chain.len() + self.literal_chain.len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.object_count(),
            literal_objects: self.literal_chain.len(),
            live_bytes: self.live_bytes,
            ceiling: self.ceiling,
            ..self.stats
        }
    }

    // ── Collection ─────────────────────────────────────────────────

    fn mark_value(&mut self, value: Value, work: &mut Vec<ObjRef>) -> bool {
        let Value::Ref(r) = value else {
            return false;
        };
        if !self.contains(r) || self.marks.get(r.index()) == self.polarity {
            return false;
        }
        self.marks.set(r.index(), self.polarity);
        work.push(r);
        true
    }

    fn mark(&mut self, roots: &dyn RootProvider) -> usize {
        let mut work = Vec::new();
        let mut marked = 0;

        let mut root_values = Vec::new();
        roots.visit_roots(&mut |v| root_values.push(v));
        for r in self.literal_chain.clone() {
            root_values.push(Value::Ref(r));
        }
        // Flagged literals still on the mutable chain are promoted by this
        // sweep, so their children must survive it.
        for &r in &self.mutable_chain {
            if self.cells[r.index()].as_ref().is_some_and(|cell| cell.literal) {
                root_values.push(Value::Ref(r));
            }
        }
        for v in root_values {
            marked += self.mark_value(v, &mut work) as usize;
        }

        let mut edges = Vec::new();
        while let Some(r) = work.pop() {
            edges.clear();
            if let Some(object) = self.get(r) {
                object.trace(&mut |v| edges.push(v));
            }
            for &v in &edges {
                marked += self.mark_value(v, &mut work) as usize;
            }
        }
        marked
    }

    fn sweep(&mut self, stats: &mut GcStats) {
        let chain = std::mem::take(&mut self.mutable_chain);
        let mut survivors = Vec::with_capacity(chain.len());
        for r in chain {
            let Some(cell) = self.cells[r.index()].as_ref() else {
                continue;
            };
            if cell.literal {
                self.literal_chain.push(r);
                stats.promoted_literals += 1;
            } else if self.marks.get(r.index()) == self.polarity {
                survivors.push(r);
            } else {
                stats.freed_objects += 1;
                stats.freed_bytes += cell.bytes;
                self.live_bytes -= cell.bytes;
                self.cells[r.index()] = None;
                self.free.push(r.raw());
            }
        }
        self.mutable_chain = survivors;
    }

    /// Run one full mark-sweep cycle.
    pub fn collect(&mut self, roots: &dyn RootProvider) -> GcStats {
        self.polarity = !self.polarity;

        let mut stats = GcStats {
            marked: self.mark(roots),
            ..GcStats::default()
        };
        self.sweep(&mut stats);

        while self.live_bytes >= self.ceiling {
            self.ceiling += self.settings.ceiling_increment;
            log::debug!("gc: ceiling raised to {} bytes", self.ceiling);
        }
        self.collect_requested = false;

        self.stats.collections += 1;
        self.stats.freed_objects += stats.freed_objects as u64;
        stats.live_bytes = self.live_bytes;
        stats.ceiling = self.ceiling;

        log::debug!(
            "gc #{}: marked {}, freed {} objects ({} bytes), {} literal(s) promoted, {} bytes live",
            self.stats.collections,
            stats.marked,
            stats.freed_objects,
            stats.freed_bytes,
            stats.promoted_literals,
            stats.live_bytes
        );
        stats
    }
}

impl Index<ObjRef> for Heap {
    type Output = HeapObject;

    /// Panics on a handle that no longer names a live object.
    fn index(&self, r: ObjRef) -> &HeapObject {
        match self.get(r) {
            Some(object) => object,
            None => panic!("dangling object reference #{}", r.raw()),
        }
    }
}

impl IndexMut<ObjRef> for Heap {
    fn index_mut(&mut self, r: ObjRef) -> &mut HeapObject {
        match self.get_mut(r) {
            Some(object) => object,
            None => panic!("dangling object reference #{}", r.raw()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
