//! # Error Types
//!
//! General error handling for xpcscope.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// Main error type for capture and symbol resolution
///
/// ## Error Categories
///
/// 1. **Setup errors**: Setup (a required host capability is missing)
/// 2. **Lookup errors**: SymbolNotFound (exact lookups only)
/// 3. **Codec errors**: UnknownType (structurally invalid message handle)
/// 4. **Transport errors**: Transport, Io, Json
///
/// A lookup that had to leave the shared-cache path is *not* an error: it is
/// logged and marked on the returned symbol with
/// [`SymbolSource::Fallback`](crate::types::SymbolSource::Fallback).
#[derive(Error, Debug)]
pub enum ScopeError
{
    /// A host capability required at startup is not available
    ///
    /// This happens when:
    /// - The messaging runtime does not export its value type descriptors
    /// - The dyld shared cache enumeration APIs are missing on this OS version
    /// - The current platform has no live backend at all
    ///
    /// There is no degraded mode for these; startup aborts.
    #[error("Setup failed: {0}")]
    Setup(String),

    /// An exact symbol lookup found nothing on either lookup path
    ///
    /// Only [`SymbolResolver::find_exact`](crate::symbols::SymbolResolver::find_exact)
    /// produces this. It is fatal to the hook that asked for the symbol and to
    /// nothing else.
    #[error("Symbol {symbol} not found in {module}")]
    SymbolNotFound
    {
        /// Module (final install-name component) that was searched
        module: String,
        /// Undecorated symbol name that was requested
        symbol: String,
    },

    /// A message handle reached the codec without a usable type or description
    ///
    /// Every well-formed value decodes to at least the `Unknown` shape, so this
    /// indicates a broken handle rather than an unsupported type.
    #[error("Structurally invalid message value: {0}")]
    UnknownType(String),

    /// Invalid argument passed to an xpcscope function
    ///
    /// Examples:
    /// - A glob pattern that does not compile
    /// - A symbol table blob whose length is not a multiple of the record size
    /// - An unparseable configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The event transport refused or failed to deliver an event
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error (pcap output, descriptor queries, reading image files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event metadata could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for `Result<T, ScopeError>`
///
/// ```rust
/// use xpcscope_core::error::ScopeResult;
/// fn foo() -> ScopeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type ScopeResult<T> = std::result::Result<T, ScopeError>;
