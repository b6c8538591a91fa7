//! # xpcscope-core
//!
//! Capture plumbing for XPC traffic.
//!
//! This crate provides the two pieces an XPC sniffer cannot do without:
//! - A **message tree codec** that turns a native message value into a JSON
//!   metadata tree plus a binary side buffer
//! - A **symbol resolver** that finds private functions by reading the dyld
//!   shared cache's local symbol tables directly, with a slow generic search
//!   behind it
//!
//! Around them sit the capture assembler and its sinks (channel, pcap), hook
//! planning and configuration.
//!
//! ## Platform Support
//!
//! - **macOS**: live backends over libdyld and libxpc (see [`platform::macos`])
//! - **Other Unix**: the resolver's generic search and everything that runs on
//!   the host traits; there is no message runtime to capture from
//!
//! ## Why unsafe code is needed
//!
//! The macOS backends call libdyld and libxpc through hand-declared FFI and
//! pass Clang blocks to them. Everything above `platform` is safe and written
//! against traits, which is also how the tests drive it.

#![allow(unsafe_code)] // Required for libdyld/libxpc FFI and block literals

pub mod capture;
pub mod config;
pub mod error;
pub mod hooks;
pub mod message;
pub mod platform;
pub mod prelude;
pub mod symbols;
pub mod types;

pub use capture::{CaptureAssembler, CaptureEvent, CaptureSession, EventSink};
pub use config::ScopeConfig;
// Re-export commonly used types
pub use error::{ScopeError, ScopeResult};
pub use hooks::HookPlan;
pub use message::{serialize, MessageNode, MessageRuntime, SerializedMessage, TypeRegistry};
pub use symbols::SymbolResolver;
pub use types::{Address, Direction, Endpoint, ResolvedSymbol};
