//! Bridge to the native messaging runtime.
//!
//! The codec reads message values only through [`MessageRuntime`]. On macOS
//! [`XpcRuntime`](crate::platform::macos::XpcRuntime) implements it over
//! libxpc; tests implement it over plain Rust trees.

use std::fmt;
use std::os::fd::OwnedFd;

use crate::error::ScopeResult;
use crate::types::Address;

/// Identity of a value type descriptor (the address of its type object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle(Address);

impl DescriptorHandle
{
    pub const fn new(address: u64) -> Self
    {
        DescriptorHandle(Address::new(address))
    }

    pub fn address(self) -> Address
    {
        self.0
    }
}

impl fmt::Display for DescriptorHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// An exported symbol of the messaging runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol
{
    /// C-level name, e.g. `_xpc_type_dictionary`.
    pub name: String,
    /// Runtime address.
    pub address: Address,
}

impl ExportedSymbol
{
    pub fn new(name: impl Into<String>, address: u64) -> Self
    {
        Self {
            name: name.into(),
            address: Address::new(address),
        }
    }
}

/// Read access to native message values.
///
/// Handles are borrowed from the observed call: the runtime never retains or
/// releases them. Scalar accessors are only called after the registry has
/// classified the value, so implementations may assume the type matches.
pub trait MessageRuntime: Sync
{
    /// Native value handle.
    type Handle: Copy;

    /// Text returned by the self-description entry point.
    ///
    /// Dropping it must release whatever buffer the runtime allocated.
    type Description: AsRef<[u8]>;

    /// Exported symbols of the runtime, used to discover type descriptors.
    ///
    /// ## Errors
    ///
    /// `Setup` when the runtime library is not loaded.
    fn exported_symbols(&self) -> ScopeResult<Vec<ExportedSymbol>>;

    /// Type descriptor of `value`; `None` for a structurally invalid handle.
    fn type_of(&self, value: Self::Handle) -> Option<DescriptorHandle>;

    /// Debug rendering of `value`; `None` for a structurally invalid handle.
    fn copy_description(&self, value: Self::Handle) -> Option<Self::Description>;

    /// Call `visitor` once per entry in insertion order until it returns
    /// `false`. Returns `false` if iteration was cut short.
    fn dictionary_apply(&self, value: Self::Handle, visitor: &mut dyn FnMut(&[u8], Self::Handle) -> bool) -> bool;

    /// Call `visitor` once per element in index order until it returns
    /// `false`. Returns `false` if iteration was cut short.
    fn array_apply(&self, value: Self::Handle, visitor: &mut dyn FnMut(usize, Self::Handle) -> bool) -> bool;

    /// String bytes bounded by the value's own length (NULs included).
    fn string_bytes(&self, value: Self::Handle) -> Vec<u8>;

    /// Copy of a data value's bytes.
    fn data_bytes(&self, value: Self::Handle) -> Vec<u8>;

    /// The 16 raw bytes of a UUID value.
    fn uuid_bytes(&self, value: Self::Handle) -> [u8; 16];

    fn double_value(&self, value: Self::Handle) -> f64;

    fn bool_value(&self, value: Self::Handle) -> bool;

    fn int64_value(&self, value: Self::Handle) -> i64;

    fn uint64_value(&self, value: Self::Handle) -> u64;

    /// Duplicate a descriptor value into this process.
    ///
    /// The returned descriptor is closed when dropped.
    fn dup_descriptor(&self, value: Self::Handle) -> Option<OwnedFd>;
}
