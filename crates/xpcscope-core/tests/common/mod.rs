//! Shared fixtures: an in-memory message runtime and shared-cache host.

#![allow(dead_code)]

use std::fs::File;
use std::ops::ControlFlow;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xpcscope_core::error::{ScopeError, ScopeResult};
use xpcscope_core::message::{DescriptorHandle, ExportedSymbol, MessageRuntime, TypeRegistry, DEFAULT_TYPE_PREFIX};
use xpcscope_core::symbols::{CacheImage, CacheView, LoadedImage, LocalSymbols, SharedCacheHost, StringTable};
use xpcscope_core::types::SymbolTableEntry;

// ---------------------------------------------------------------------------
// Message runtime
// ---------------------------------------------------------------------------

/// Descriptor addresses of the fake runtime's types.
pub const TYPES: &[(&str, u64)] = &[
    ("dictionary", 0x1000),
    ("array", 0x1010),
    ("string", 0x1020),
    ("data", 0x1030),
    ("uuid", 0x1040),
    ("double", 0x1050),
    ("bool", 0x1060),
    ("int64", 0x1070),
    ("uint64", 0x1080),
    ("fd", 0x1090),
    ("null", 0x10a0),
    ("endpoint", 0x10b0),
    ("error", 0x10c0),
];

/// Descriptor no export refers to.
pub const UNREGISTERED_TYPE: u64 = 0x9999;

fn descriptor(name: &str) -> u64
{
    TYPES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, address)| *address)
        .unwrap()
}

/// A message value tree to load into a [`FakeRuntime`].
#[derive(Debug)]
pub enum Value
{
    Dict(Vec<(&'static str, Value)>),
    Array(Vec<Value>),
    Str(Vec<u8>),
    Data(Vec<u8>),
    Uuid([u8; 16]),
    Double(f64),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    /// A descriptor value; `None` makes duplication fail.
    Fd(Option<File>),
    /// A registered type without a decoder (`null`, `endpoint`, ...).
    Other(&'static str),
    /// A type descriptor no export refers to.
    Unregistered,
    /// A handle with no type descriptor at all.
    Broken,
}

impl Value
{
    pub fn string(text: &str) -> Self
    {
        Value::Str(text.as_bytes().to_vec())
    }
}

enum Node
{
    Dict(Vec<(Vec<u8>, usize)>),
    Array(Vec<usize>),
    Str(Vec<u8>),
    Data(Vec<u8>),
    Uuid([u8; 16]),
    Double(f64),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Fd(Option<File>),
    Other(&'static str),
    Unregistered,
    Broken,
}

/// Index into a [`FakeRuntime`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub usize);

/// Description buffer that counts its own release.
pub struct FakeDescription
{
    text: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for FakeDescription
{
    fn as_ref(&self) -> &[u8]
    {
        &self.text
    }
}

impl Drop for FakeDescription
{
    fn drop(&mut self)
    {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Arena-backed [`MessageRuntime`].
pub struct FakeRuntime
{
    nodes: Vec<Node>,
    copied: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakeRuntime
{
    pub fn new() -> Self
    {
        Self {
            nodes: Vec::new(),
            copied: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load a tree, returning its root handle.
    pub fn add(&mut self, value: Value) -> Handle
    {
        let node = match value {
            Value::Dict(entries) => Node::Dict(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.as_bytes().to_vec(), self.add(value).0))
                    .collect(),
            ),
            Value::Array(values) => Node::Array(values.into_iter().map(|value| self.add(value).0).collect()),
            Value::Str(bytes) => Node::Str(bytes),
            Value::Data(bytes) => Node::Data(bytes),
            Value::Uuid(bytes) => Node::Uuid(bytes),
            Value::Double(value) => Node::Double(value),
            Value::Bool(value) => Node::Bool(value),
            Value::Int64(value) => Node::Int64(value),
            Value::UInt64(value) => Node::UInt64(value),
            Value::Fd(file) => Node::Fd(file),
            Value::Other(name) => Node::Other(name),
            Value::Unregistered => Node::Unregistered,
            Value::Broken => Node::Broken,
        };
        self.nodes.push(node);
        Handle(self.nodes.len() - 1)
    }

    /// The registry matching this runtime's exports.
    pub fn registry(&self) -> TypeRegistry
    {
        TypeRegistry::from_runtime(self, DEFAULT_TYPE_PREFIX).unwrap()
    }

    /// Descriptions handed out so far.
    pub fn descriptions_copied(&self) -> usize
    {
        self.copied.load(Ordering::SeqCst)
    }

    /// Descriptions released so far.
    pub fn descriptions_released(&self) -> usize
    {
        self.released.load(Ordering::SeqCst)
    }

    fn node(&self, handle: Handle) -> &Node
    {
        &self.nodes[handle.0]
    }

    fn type_name(&self, handle: Handle) -> Option<&'static str>
    {
        Some(match self.node(handle) {
            Node::Dict(_) => "dictionary",
            Node::Array(_) => "array",
            Node::Str(_) => "string",
            Node::Data(_) => "data",
            Node::Uuid(_) => "uuid",
            Node::Double(_) => "double",
            Node::Bool(_) => "bool",
            Node::Int64(_) => "int64",
            Node::UInt64(_) => "uint64",
            Node::Fd(_) => "fd",
            Node::Other(name) => name,
            Node::Unregistered | Node::Broken => return None,
        })
    }
}

impl MessageRuntime for FakeRuntime
{
    type Handle = Handle;
    type Description = FakeDescription;

    fn exported_symbols(&self) -> ScopeResult<Vec<ExportedSymbol>>
    {
        let mut exports: Vec<ExportedSymbol> = TYPES
            .iter()
            .map(|(name, address)| ExportedSymbol::new(format!("{DEFAULT_TYPE_PREFIX}{name}"), *address))
            .collect();
        exports.push(ExportedSymbol::new("xpc_dictionary_apply", 0x2000));
        Ok(exports)
    }

    fn type_of(&self, value: Handle) -> Option<DescriptorHandle>
    {
        match self.node(value) {
            Node::Broken => None,
            Node::Unregistered => Some(DescriptorHandle::new(UNREGISTERED_TYPE)),
            _ => self.type_name(value).map(|name| DescriptorHandle::new(descriptor(name))),
        }
    }

    fn copy_description(&self, value: Handle) -> Option<FakeDescription>
    {
        if matches!(self.node(value), Node::Broken) {
            return None;
        }
        self.copied.fetch_add(1, Ordering::SeqCst);
        let label = self.type_name(value).unwrap_or("?");
        Some(FakeDescription {
            text: format!("<{label} #{}>", value.0).into_bytes(),
            released: Arc::clone(&self.released),
        })
    }

    fn dictionary_apply(&self, value: Handle, visitor: &mut dyn FnMut(&[u8], Handle) -> bool) -> bool
    {
        let Node::Dict(entries) = self.node(value) else {
            return false;
        };
        for (key, child) in entries {
            if !visitor(key, Handle(*child)) {
                return false;
            }
        }
        true
    }

    fn array_apply(&self, value: Handle, visitor: &mut dyn FnMut(usize, Handle) -> bool) -> bool
    {
        let Node::Array(values) = self.node(value) else {
            return false;
        };
        for (index, child) in values.iter().enumerate() {
            if !visitor(index, Handle(*child)) {
                return false;
            }
        }
        true
    }

    fn string_bytes(&self, value: Handle) -> Vec<u8>
    {
        match self.node(value) {
            Node::Str(bytes) => bytes.clone(),
            _ => Vec::new(),
        }
    }

    fn data_bytes(&self, value: Handle) -> Vec<u8>
    {
        match self.node(value) {
            Node::Data(bytes) => bytes.clone(),
            _ => Vec::new(),
        }
    }

    fn uuid_bytes(&self, value: Handle) -> [u8; 16]
    {
        match self.node(value) {
            Node::Uuid(bytes) => *bytes,
            _ => [0; 16],
        }
    }

    fn double_value(&self, value: Handle) -> f64
    {
        match self.node(value) {
            Node::Double(value) => *value,
            _ => 0.0,
        }
    }

    fn bool_value(&self, value: Handle) -> bool
    {
        matches!(self.node(value), Node::Bool(true))
    }

    fn int64_value(&self, value: Handle) -> i64
    {
        match self.node(value) {
            Node::Int64(value) => *value,
            _ => 0,
        }
    }

    fn uint64_value(&self, value: Handle) -> u64
    {
        match self.node(value) {
            Node::UInt64(value) => *value,
            _ => 0,
        }
    }

    fn dup_descriptor(&self, value: Handle) -> Option<OwnedFd>
    {
        match self.node(value) {
            Node::Fd(Some(file)) => file.try_clone().ok().map(OwnedFd::from),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared cache host
// ---------------------------------------------------------------------------

/// Builds a packed local symbol table plus string table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTableBuilder
{
    entries: Vec<u8>,
    strings: Vec<u8>,
}

impl SymbolTableBuilder
{
    pub fn new() -> Self
    {
        // Offset 0 is the empty name, as in real tables.
        Self {
            entries: Vec::new(),
            strings: vec![0],
        }
    }

    pub fn symbol(self, name: &str, value: u64) -> Self
    {
        self.entry(name, 0x0e, value)
    }

    /// A debugger (`N_FUN`) record carrying `name`.
    pub fn stab(self, name: &str, value: u64) -> Self
    {
        self.entry(name, 0x24, value)
    }

    fn entry(mut self, name: &str, type_flag: u8, value: u64) -> Self
    {
        let entry = SymbolTableEntry {
            name_offset: self.strings.len() as u32,
            type_flag,
            section: 1,
            descriptor: 0,
            value,
        };
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.entries.extend_from_slice(&entry.to_bytes());
        self
    }
}

/// One image of a [`FakeCache`].
#[derive(Debug, Clone)]
pub struct FakeImage
{
    pub install_name: String,
    pub symbols: Option<SymbolTableBuilder>,
}

impl FakeImage
{
    pub fn new(install_name: &str, symbols: SymbolTableBuilder) -> Self
    {
        Self {
            install_name: install_name.to_string(),
            symbols: Some(symbols),
        }
    }

    /// An image whose cache keeps no local symbols.
    pub fn stripped(install_name: &str) -> Self
    {
        Self {
            install_name: install_name.to_string(),
            symbols: None,
        }
    }
}

impl CacheImage for FakeImage
{
    fn install_name(&self) -> Option<String>
    {
        Some(self.install_name.clone())
    }

    fn read_local_symbols(&self, reader: &mut dyn FnMut(LocalSymbols<'_>)) -> bool
    {
        let Some(table) = &self.symbols else {
            return false;
        };
        reader(LocalSymbols::new(&table.entries, StringTable::Bounded(&table.strings)).unwrap());
        true
    }
}

/// One installed cache.
#[derive(Debug, Clone, Default)]
pub struct FakeCache
{
    pub images: Vec<FakeImage>,
}

impl FakeCache
{
    pub fn new(images: Vec<FakeImage>) -> Self
    {
        Self { images }
    }
}

impl CacheView for FakeCache
{
    fn for_each_image(&self, visit: &mut dyn FnMut(&dyn CacheImage) -> ControlFlow<()>)
    {
        for image in &self.images {
            if visit(image).is_break() {
                break;
            }
        }
    }
}

/// In-memory [`SharedCacheHost`].
#[derive(Debug, Default)]
pub struct FakeCacheHost
{
    pub caches: Vec<FakeCache>,
    pub loaded: Vec<LoadedImage>,
    /// Report the enumeration API as missing.
    pub unavailable: bool,
    /// Caches visited so far.
    pub caches_visited: AtomicUsize,
}

impl FakeCacheHost
{
    pub fn new(caches: Vec<FakeCache>) -> Self
    {
        Self {
            caches,
            ..Self::default()
        }
    }

    /// Add a loaded image at `header` with `slide`.
    pub fn loaded(mut self, path: &str, header: u64, slide: i64) -> Self
    {
        self.loaded.push(LoadedImage {
            path: path.to_string(),
            header,
            slide,
        });
        self
    }
}

impl SharedCacheHost for FakeCacheHost
{
    fn for_each_cache(&self, visit: &mut dyn FnMut(&dyn CacheView) -> ControlFlow<()>) -> ScopeResult<()>
    {
        if self.unavailable {
            return Err(ScopeError::Setup("dyld_for_each_installed_shared_cache not found".to_string()));
        }
        for cache in &self.caches {
            self.caches_visited.fetch_add(1, Ordering::SeqCst);
            if visit(cache).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn module_base(&self, module: &str) -> Option<u64>
    {
        self.loaded
            .iter()
            .find(|image| xpcscope_core::symbols::install_name_matches(&image.path, module))
            .map(|image| image.header)
    }

    fn loaded_images(&self) -> Vec<LoadedImage>
    {
        self.loaded.clone()
    }
}

/// Host sharing state with the test through an `Arc`.
pub struct SharedHost(pub Arc<FakeCacheHost>);

impl SharedCacheHost for SharedHost
{
    fn for_each_cache(&self, visit: &mut dyn FnMut(&dyn CacheView) -> ControlFlow<()>) -> ScopeResult<()>
    {
        self.0.for_each_cache(visit)
    }

    fn module_base(&self, module: &str) -> Option<u64>
    {
        self.0.module_base(module)
    }

    fn loaded_images(&self) -> Vec<LoadedImage>
    {
        self.0.loaded_images()
    }
}
