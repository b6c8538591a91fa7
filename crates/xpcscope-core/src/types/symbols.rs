//! Symbol table records and resolved symbols.

use std::fmt;

use super::address::Address;

/// Size in bytes of one `nlist_64` record.
pub const SYMBOL_ENTRY_SIZE: usize = 16;

/// One `nlist_64` record from a local symbol table.
///
/// Layout (native endianness, no padding):
///
/// | offset | field         | type  |
/// |--------|---------------|-------|
/// | 0      | `name_offset` | `u32` |
/// | 4      | `type_flag`   | `u8`  |
/// | 5      | `section`     | `u8`  |
/// | 6      | `descriptor`  | `u16` |
/// | 8      | `value`       | `u64` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableEntry
{
    /// Offset of the NUL-terminated name inside the string table.
    pub name_offset: u32,
    /// `n_type` bits.
    pub type_flag: u8,
    /// Section ordinal, or 0 for `NO_SECT`.
    pub section: u8,
    /// `n_desc` bits.
    pub descriptor: u16,
    /// Cache-relative (pre-slide) value.
    pub value: u64,
}

impl SymbolTableEntry
{
    /// Decode a record from exactly [`SYMBOL_ENTRY_SIZE`] bytes.
    pub fn from_bytes(raw: &[u8; SYMBOL_ENTRY_SIZE]) -> Self
    {
        Self {
            name_offset: u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
            type_flag: raw[4],
            section: raw[5],
            descriptor: u16::from_ne_bytes([raw[6], raw[7]]),
            value: u64::from_ne_bytes([raw[8], raw[9], raw[10], raw[11], raw[12], raw[13], raw[14], raw[15]]),
        }
    }

    /// Encode back into the on-disk layout.
    pub fn to_bytes(&self) -> [u8; SYMBOL_ENTRY_SIZE]
    {
        let mut raw = [0u8; SYMBOL_ENTRY_SIZE];
        raw[0..4].copy_from_slice(&self.name_offset.to_ne_bytes());
        raw[4] = self.type_flag;
        raw[5] = self.section;
        raw[6..8].copy_from_slice(&self.descriptor.to_ne_bytes());
        raw[8..16].copy_from_slice(&self.value.to_ne_bytes());
        raw
    }

    /// Debugger (stab) entry rather than a real symbol.
    pub fn is_stab(&self) -> bool
    {
        self.type_flag & object::macho::N_STAB != 0
    }

    /// External symbol defined in one of the image's sections.
    pub fn is_exported_definition(&self) -> bool
    {
        use object::macho::{N_EXT, N_SECT, N_TYPE};
        !self.is_stab() && self.type_flag & N_EXT != 0 && self.type_flag & N_TYPE == N_SECT
    }
}

/// Which lookup path produced a [`ResolvedSymbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSource
{
    /// Found by scanning the shared cache's local symbol table.
    SharedCache,
    /// Found by the generic whole-process search after the cache path failed.
    Fallback,
}

impl fmt::Display for SymbolSource
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolSource::SharedCache => "shared-cache",
            SymbolSource::Fallback => "fallback",
        };
        write!(f, "{label}")
    }
}

/// A symbol located in the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol
{
    /// Linkage name as it appeared in the table that produced it.
    pub name: String,
    /// Static value recorded in the symbol table.
    pub base_value: u64,
    /// Load bias of the owning module in this process.
    pub slide: i64,
    /// Lookup path that produced the symbol.
    pub source: SymbolSource,
}

impl ResolvedSymbol
{
    /// Runtime address: `base_value + slide`.
    pub fn address(&self) -> Address
    {
        Address::new(self.base_value).slid(self.slide)
    }
}

impl fmt::Display for ResolvedSymbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {} ({})", self.address(), self.name, self.source)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_entry_layout()
    {
        let entry = SymbolTableEntry {
            name_offset: 0x0102_0304,
            type_flag: 0x0f,
            section: 1,
            descriptor: 0x0506,
            value: 0x1122_3344_5566_7788,
        };
        let raw = entry.to_bytes();
        assert_eq!(&raw[0..4], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(raw[4], 0x0f);
        assert_eq!(raw[5], 1);
        assert_eq!(&raw[8..16], &0x1122_3344_5566_7788u64.to_ne_bytes());
        assert_eq!(SymbolTableEntry::from_bytes(&raw), entry);
        assert!(!entry.is_stab());
        assert!(entry.is_exported_definition());
    }

    #[test]
    fn test_entry_kinds()
    {
        let with_type = |type_flag| SymbolTableEntry {
            name_offset: 1,
            type_flag,
            section: 1,
            descriptor: 0,
            value: 0,
        };
        // N_FUN stab, private N_SECT, undefined external, N_SECT|N_EXT
        assert!(with_type(0x24).is_stab());
        assert!(!with_type(0x24).is_exported_definition());
        assert!(!with_type(0x0e).is_exported_definition());
        assert!(!with_type(0x01).is_exported_definition());
        assert!(with_type(0x0f).is_exported_definition());
    }

    #[test]
    fn test_negative_slide()
    {
        let symbol = ResolvedSymbol {
            name: "_foo".to_string(),
            base_value: 0x1_8000_0000,
            slide: -0x1000,
            source: SymbolSource::SharedCache,
        };
        assert_eq!(symbol.address().value(), 0x1_7fff_f000);
    }
}
