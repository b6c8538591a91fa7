//! # Type Registry
//!
//! Maps value type descriptors to the decoder the codec should use.
//!
//! The runtime exports one descriptor object per value type under a common
//! prefix (`_xpc_type_dictionary`, `_xpc_type_string`, ...). The registry is
//! built once from those exports, is read-only afterwards, and is passed by
//! reference to whoever needs it.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::runtime::{DescriptorHandle, ExportedSymbol, MessageRuntime};
use crate::error::{ScopeError, ScopeResult};

/// Default export prefix of value type descriptors.
pub const DEFAULT_TYPE_PREFIX: &str = "_xpc_type_";

/// Decoder selected for a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    Dictionary,
    Array,
    String,
    Data,
    Uuid,
    Double,
    Bool,
    Int64,
    UInt64,
    FileDescriptor,
    /// Registered but without a decoder; decodes as `Unknown`.
    Other,
}

impl TypeKind
{
    /// Leaf decoder for a bare type name.
    ///
    /// Containers are not chosen by name; see [`TypeRegistry::resolve`].
    pub fn leaf_from_name(name: &str) -> Self
    {
        match name {
            "string" => TypeKind::String,
            "data" => TypeKind::Data,
            "uuid" => TypeKind::Uuid,
            "double" => TypeKind::Double,
            "bool" => TypeKind::Bool,
            "int64" => TypeKind::Int64,
            "uint64" => TypeKind::UInt64,
            "fd" => TypeKind::FileDescriptor,
            _ => TypeKind::Other,
        }
    }

    pub fn is_container(self) -> bool
    {
        matches!(self, TypeKind::Dictionary | TypeKind::Array)
    }
}

/// A registered type: bare name plus decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredType
{
    pub name: String,
    pub kind: TypeKind,
}

/// Descriptor → type table.
#[derive(Debug, Clone)]
pub struct TypeRegistry
{
    types: HashMap<DescriptorHandle, RegisteredType>,
    dictionary: DescriptorHandle,
    array: DescriptorHandle,
}

impl TypeRegistry
{
    /// Build the table from the runtime's exports.
    ///
    /// Every export starting with `prefix` is registered under its name with
    /// the prefix stripped. The dictionary and array descriptors are pinned
    /// by handle so the codec can dispatch containers by identity. When
    /// several names share one descriptor (aliases), the first in export
    /// order names it.
    ///
    /// ## Errors
    ///
    /// `Setup` if either container descriptor is missing, which means the
    /// runtime is not loaded (or exports nothing under `prefix`).
    pub fn resolve(exports: &[ExportedSymbol], prefix: &str) -> ScopeResult<Self>
    {
        let mut named: Vec<(&str, DescriptorHandle)> = Vec::new();
        for export in exports {
            let Some(name) = export.name.strip_prefix(prefix) else {
                continue;
            };
            if name.is_empty() || named.iter().any(|(seen, _)| *seen == name) {
                continue;
            }
            named.push((name, DescriptorHandle::new(export.address.value())));
        }

        let handle_of = |wanted: &str| named.iter().find(|(name, _)| *name == wanted).map(|(_, handle)| *handle);
        let dictionary = handle_of("dictionary")
            .ok_or_else(|| ScopeError::Setup(format!("{prefix}dictionary is not exported by the messaging runtime")))?;
        let array = handle_of("array")
            .ok_or_else(|| ScopeError::Setup(format!("{prefix}array is not exported by the messaging runtime")))?;

        let mut types = HashMap::with_capacity(named.len());
        for (name, handle) in &named {
            let kind = if *handle == dictionary {
                TypeKind::Dictionary
            } else if *handle == array {
                TypeKind::Array
            } else {
                TypeKind::leaf_from_name(name)
            };
            types.entry(*handle).or_insert_with(|| RegisteredType {
                name: (*name).to_string(),
                kind,
            });
        }

        debug!(types = types.len(), "type registry built");
        Ok(Self {
            types,
            dictionary,
            array,
        })
    }

    /// Build the table straight from a runtime.
    ///
    /// ## Errors
    ///
    /// See [`MessageRuntime::exported_symbols`] and [`TypeRegistry::resolve`].
    pub fn from_runtime<R: MessageRuntime + ?Sized>(runtime: &R, prefix: &str) -> ScopeResult<Self>
    {
        let exports = runtime.exported_symbols()?;
        Self::resolve(&exports, prefix)
    }

    pub fn lookup(&self, descriptor: DescriptorHandle) -> Option<&RegisteredType>
    {
        self.types.get(&descriptor)
    }

    pub fn dictionary(&self) -> DescriptorHandle
    {
        self.dictionary
    }

    pub fn array(&self) -> DescriptorHandle
    {
        self.array
    }

    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    /// Registered types sorted by name.
    pub fn entries(&self) -> Vec<(DescriptorHandle, &RegisteredType)>
    {
        let mut entries: Vec<_> = self.types.iter().map(|(handle, ty)| (*handle, ty)).collect();
        entries.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        entries
    }
}

impl fmt::Display for TypeRegistry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (handle, ty) in self.entries() {
            writeln!(f, "{handle} {:<12} {:?}", ty.name, ty.kind)?;
        }
        Ok(())
    }
}

/// A registry built on first use.
///
/// Concurrent first callers race into one initialisation; everyone gets the
/// same table afterwards.
#[derive(Debug, Default)]
pub struct SharedTypeRegistry
{
    cell: OnceCell<TypeRegistry>,
}

impl SharedTypeRegistry
{
    #[must_use]
    pub fn new() -> Self
    {
        Self { cell: OnceCell::new() }
    }

    /// The registry, building it from `runtime` if this is the first call.
    ///
    /// ## Errors
    ///
    /// Propagates the build failure; a later call retries.
    pub fn get_or_resolve<R: MessageRuntime + ?Sized>(&self, runtime: &R, prefix: &str) -> ScopeResult<&TypeRegistry>
    {
        self.cell.get_or_try_init(|| TypeRegistry::from_runtime(runtime, prefix))
    }

    pub fn get(&self) -> Option<&TypeRegistry>
    {
        self.cell.get()
    }
}
