/// Object kind, stored in the low two bits of the header word.
///
/// Bit 0 means "has slots", bit 1 means "is a frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Binary = 0b00,
    Array = 0b01,
    Frame = 0b11,
}

impl ObjectKind {
    pub const SLOTTED: u8 = 0b01;
    pub const FRAME: u8 = 0b10;

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Binary),
            0b01 => Some(Self::Array),
            0b11 => Some(Self::Frame),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn is_slotted(self) -> bool {
        self as u8 & Self::SLOTTED != 0
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderFlags: u8 {
        /// Read-only; lives on the literal chain.
        const LITERAL = 1 << 0;
        /// Mark polarity seen by the last collection.
        const MARK = 1 << 1;
    }
}

/// Header word of a heap object.
///
/// ```text
/// [0..2  kind]
/// [2     literal]
/// [3     mark polarity]
/// [8..32 payload size]
/// ```
///
/// Objects in the arena carry their kind in the enum variant and their flags
/// in the heap's side tables; the packed form exists for dumps and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: ObjectKind,
    pub flags: HeaderFlags,
    pub size: u32,
}

impl Header {
    pub const MAX_SIZE: u32 = (1 << 24) - 1;

    pub fn new(kind: ObjectKind, size: u32) -> Self {
        Self {
            kind,
            flags: HeaderFlags::empty(),
            size: size.min(Self::MAX_SIZE),
        }
    }

    pub fn with_flags(self, flags: HeaderFlags) -> Self {
        Self { flags, ..self }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        self.flags.contains(HeaderFlags::LITERAL)
    }

    pub fn pack(self) -> u32 {
        (self.kind as u32) | ((self.flags.bits() as u32) << 2) | (self.size << 8)
    }

    pub fn unpack(word: u32) -> Option<Self> {
        let kind = ObjectKind::from_bits(word as u8)?;
        let flags = HeaderFlags::from_bits_truncate(((word >> 2) & 0b11) as u8);
        Some(Self {
            kind,
            flags,
            size: word >> 8,
        })
    }
}
