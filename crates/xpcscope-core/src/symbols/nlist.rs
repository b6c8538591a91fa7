//! Symbol table streaming.
//!
//! The shared cache hands out each image's local symbols as a pointer to
//! `count` packed `nlist_64` records plus the base of a string table. Names are
//! NUL-terminated strings found at `string_table + name_offset`; the string
//! table's length is not reported, so the raw form has to trust the offsets.
//!
//! An image's regular (`LC_SYMTAB`) table is found through its own load
//! commands instead; see [`mapped_image_symbols`].

use std::ffi::{c_char, CStr};
use std::marker::PhantomData;
use std::mem;

use object::macho::MachHeader64;
use object::read::macho::{MachHeader, Segment};
use object::Endianness;

use crate::error::{ScopeError, ScopeResult};
use crate::types::{SymbolTableEntry, SYMBOL_ENTRY_SIZE};

/// String table backing a [`LocalSymbols`] block.
#[derive(Clone, Copy, Debug)]
pub enum StringTable<'a>
{
    /// Bounds-checked table (files, tests).
    Bounded(&'a [u8]),
    /// Table living in mapped cache memory with no known end.
    Unbounded
    {
        base: *const c_char,
        _marker: PhantomData<&'a [u8]>,
    },
}

impl<'a> StringTable<'a>
{
    /// Wrap a string table that only exists as a base pointer.
    ///
    /// ## Safety
    ///
    /// Every `name_offset` later looked up must point at a NUL-terminated
    /// string that stays mapped for `'a`.
    pub unsafe fn from_raw(base: *const c_char) -> Self
    {
        StringTable::Unbounded {
            base,
            _marker: PhantomData,
        }
    }

    /// Name bytes (without the terminator) at `offset`.
    ///
    /// For bounded tables a name running off the end is cut at the end of the
    /// table; an offset outside the table yields `None`.
    pub fn name_at(&self, offset: u32) -> Option<&'a [u8]>
    {
        match *self {
            StringTable::Bounded(bytes) => {
                let tail = bytes.get(offset as usize..)?;
                let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
                Some(&tail[..end])
            }
            StringTable::Unbounded { base, .. } => {
                if base.is_null() {
                    return None;
                }
                // SAFETY: guaranteed by the contract of `from_raw`.
                unsafe { Some(CStr::from_ptr(base.add(offset as usize)).to_bytes()) }
            }
        }
    }
}

/// One image's symbol table block, borrowed for the duration of a scan.
#[derive(Clone, Copy, Debug)]
pub struct LocalSymbols<'a>
{
    entries: &'a [u8],
    strings: StringTable<'a>,
}

impl<'a> LocalSymbols<'a>
{
    /// Build a block from packed records and a string table.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` when `entries` is not a whole number of records.
    pub fn new(entries: &'a [u8], strings: StringTable<'a>) -> ScopeResult<Self>
    {
        if entries.len() % SYMBOL_ENTRY_SIZE != 0 {
            return Err(ScopeError::InvalidArgument(format!(
                "symbol table of {} bytes is not a multiple of {SYMBOL_ENTRY_SIZE}",
                entries.len()
            )));
        }
        Ok(Self { entries, strings })
    }

    /// Build a block straight from the pointers the cache API reports.
    ///
    /// ## Safety
    ///
    /// `start` must point at `count` readable records and `string_table` must
    /// satisfy [`StringTable::from_raw`], both for `'a`.
    pub unsafe fn from_raw(start: *const u8, count: u64, string_table: *const c_char) -> Self
    {
        let entries: &'a [u8] = if start.is_null() || count == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(start, count as usize * SYMBOL_ENTRY_SIZE)
        };
        Self {
            entries,
            strings: StringTable::from_raw(string_table),
        }
    }

    /// Number of records in the block.
    pub fn len(&self) -> usize
    {
        self.entries.len() / SYMBOL_ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Records paired with their names, in table order.
    ///
    /// Records whose name cannot be located are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolTableEntry, &'a [u8])> + 'a
    {
        let strings = self.strings;
        self.entries.chunks_exact(SYMBOL_ENTRY_SIZE).filter_map(move |chunk| {
            let raw: &[u8; SYMBOL_ENTRY_SIZE] = chunk.try_into().ok()?;
            let entry = SymbolTableEntry::from_bytes(raw);
            let name = strings.name_at(entry.name_offset)?;
            Some((entry, name))
        })
    }
}

/// The `LC_SYMTAB` table of a 64-bit Mach-O image mapped in this process.
///
/// Table offsets are file offsets into `__LINKEDIT`, so they are rebased onto
/// where that segment is mapped (`vmaddr + slide`). Images inside the shared
/// cache work the same way: their offsets index the cache's shared linkedit
/// region, which holds their external symbols.
///
/// ## Safety
///
/// `header` must point at a mapped Mach-O header whose load commands and
/// `__LINKEDIT` contents stay mapped and unmodified for `'a`, and `slide` must
/// be that image's load bias.
///
/// ## Errors
///
/// `InvalidArgument` if the header or load commands do not parse, or the image
/// has no `__LINKEDIT` segment or symbol table.
pub unsafe fn mapped_image_symbols<'a>(header: *const u8, slide: i64) -> ScopeResult<LocalSymbols<'a>>
{
    let malformed = |err: object::read::Error| ScopeError::InvalidArgument(format!("mapped Mach-O image: {err}"));
    if header.is_null() {
        return Err(ScopeError::InvalidArgument("mapped Mach-O image: NULL header".to_string()));
    }

    let fixed: &[u8] = std::slice::from_raw_parts(header, mem::size_of::<MachHeader64<Endianness>>());
    let fixed_header = MachHeader64::<Endianness>::parse(fixed, 0).map_err(malformed)?;
    let endian = fixed_header.endian().map_err(malformed)?;
    let commands_len = fixed_header.sizeofcmds(endian) as usize;

    let data: &[u8] = std::slice::from_raw_parts(header, fixed.len() + commands_len);
    let parsed = MachHeader64::<Endianness>::parse(data, 0).map_err(malformed)?;
    let mut commands = parsed.load_commands(endian, data, 0).map_err(malformed)?;

    let mut linkedit = None;
    let mut symtab = None;
    while let Some(command) = commands.next().map_err(malformed)? {
        if let Some((segment, _)) = command.segment_64().map_err(malformed)? {
            if segment.name() == b"__LINKEDIT" {
                linkedit = Some((segment.vmaddr.get(endian), segment.fileoff.get(endian)));
            }
        } else if let Some(table) = command.symtab().map_err(malformed)? {
            symtab = Some((
                table.symoff.get(endian),
                table.nsyms.get(endian),
                table.stroff.get(endian),
                table.strsize.get(endian),
            ));
        }
    }

    let (vmaddr, fileoff) =
        linkedit.ok_or_else(|| ScopeError::InvalidArgument("mapped Mach-O image has no __LINKEDIT".to_string()))?;
    let (symoff, nsyms, stroff, strsize) =
        symtab.ok_or_else(|| ScopeError::InvalidArgument("mapped Mach-O image has no symbol table".to_string()))?;

    // Address of file offset 0 as seen through the mapped __LINKEDIT.
    let base = vmaddr.wrapping_add_signed(slide).wrapping_sub(fileoff) as usize as *const u8;
    let entries = std::slice::from_raw_parts(base.wrapping_add(symoff as usize), nsyms as usize * SYMBOL_ENTRY_SIZE);
    let strings = std::slice::from_raw_parts(base.wrapping_add(stroff as usize), strsize as usize);
    LocalSymbols::new(entries, StringTable::Bounded(strings))
}
