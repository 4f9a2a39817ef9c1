use std::cmp::Ordering;

/// Handle of an interned symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    #[inline(always)]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Case-insensitive symbol hash: the sum of the upper-cased bytes scaled by
/// the 32-bit golden ratio.
pub fn symbol_hash(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |acc, b| acc.wrapping_add(b.to_ascii_uppercase() as u32))
        .wrapping_mul(0x9E37_79B9)
}

/// Case-insensitive lexicographic order.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a = a.bytes().map(|c| c.to_ascii_lowercase());
    let b = b.bytes().map(|c| c.to_ascii_lowercase());
    a.cmp(b)
}

/// Whether `sub` names `sup` or one of its subclasses.
///
/// Class names are dot-separated paths (`evt.ex.fr.intrp` is a subclass of
/// `evt.ex`). A `sub` holding several names separated by `;` matches when any
/// of them does. Comparison ignores ASCII case.
pub fn is_subclass(sub: &str, sup: &str) -> bool {
    let sup = sup.as_bytes();
    sub.split(';').any(|part| {
        let part = part.trim().as_bytes();
        part.len() >= sup.len()
            && part[..sup.len()].eq_ignore_ascii_case(sup)
            && (part.len() == sup.len() || part[sup.len()] == b'.')
    })
}

#[derive(Debug)]
struct SymbolEntry {
    name: Box<str>,
    hash: u32,
}

/// Interning table.
///
/// Symbols compare equal regardless of case; the first spelling wins. The
/// `order` index is kept sorted by `(hash, name)` so lookups and insertions
/// use binary search.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    order: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search(&self, name: &str, hash: u32) -> Result<usize, usize> {
        self.order.binary_search_by(|probe| {
            let entry = &self.entries[probe.index()];
            entry
                .hash
                .cmp(&hash)
                .then_with(|| compare_names(&entry.name, name))
        })
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        let hash = symbol_hash(name);
        match self.search(name, hash) {
            Ok(pos) => self.order[pos],
            Err(pos) => {
                let sym = Symbol(self.entries.len() as u32);
                self.entries.push(SymbolEntry {
                    name: name.into(),
                    hash,
                });
                self.order.insert(pos, sym);
                sym
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        let hash = symbol_hash(name);
        self.search(name, hash).ok().map(|pos| self.order[pos])
    }

    pub fn name(&self, sym: Symbol) -> &str {
        self.entries.get(sym.index()).map_or("", |e| &e.name)
    }

    pub fn hash(&self, sym: Symbol) -> u32 {
        self.entries.get(sym.index()).map_or(0, |e| e.hash)
    }

    /// Symbols in table order.
    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.order.iter().copied()
    }

    pub fn is_subclass(&self, sub: Symbol, sup: Symbol) -> bool {
        sub == sup || is_subclass(self.name(sub), self.name(sup))
    }
}
