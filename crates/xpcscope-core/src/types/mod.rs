//! # Types
//!
//! Plain data types shared by the resolver, the codec and the capture layer.

pub mod address;
pub mod endpoint;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use endpoint::{Direction, Endpoint, EventKind};
pub use symbols::{ResolvedSymbol, SymbolSource, SymbolTableEntry, SYMBOL_ENTRY_SIZE};
