//! The varnode data model: the address-space tags p-code uses to denote a
//! read/write site, and the (space, offset, size) triple itself.

/// A p-code address space. `Other` covers any space the core does not model
/// directly (`const_pool`, `fspec`, ...); resolving a varnode in `Other`
/// space is a fatal condition (see [`crate::varnode_resolver`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Ram,
    Register,
    Const,
    Unique,
    Other,
}

/// A varnode: a triple `(address space, offset, byte size)` denoting a
/// read/write site. Valid sizes are 1, 2, 4, 8, 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Varnode {
    pub space: AddressSpace,
    pub offset: u64,
    pub size: u8,
}

impl Varnode {
    pub fn new(space: AddressSpace, offset: u64, size: u8) -> Self {
        Self {
            space,
            offset,
            size,
        }
    }

    pub fn constant(offset: u64, size: u8) -> Self {
        Self::new(AddressSpace::Const, offset, size)
    }

    /// Declared width in bits (`8 * size`).
    pub fn bits(&self) -> u32 {
        u32::from(self.size) * 8
    }
}
