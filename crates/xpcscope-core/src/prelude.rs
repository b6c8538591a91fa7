//! Common module for library exports

pub use crate::capture::{
    CaptureAssembler, CaptureEvent, CaptureSession, ChannelSink, EventMessage, EventSink, PcapSink, ProxyCall,
};
pub use crate::config::ScopeConfig;
pub use crate::error::{ScopeError, ScopeResult};
pub use crate::hooks::{HookPlan, HookRole};
pub use crate::message::{
    serialize, DescriptorHandle, MessageNode, MessageRuntime, NodeValue, SerializedMessage, SharedTypeRegistry,
    TypeRegistry,
};
#[cfg(target_os = "macos")]
pub use crate::platform::macos::{DyldCacheHost, XpcObject, XpcRuntime};
pub use crate::symbols::{NamingPolicy, SymbolResolver};
pub use crate::types::{Address, Direction, Endpoint, EventKind, ResolvedSymbol, SymbolSource};
