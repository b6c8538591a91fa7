//! # macOS Backends
//!
//! Live implementations of the host interfaces:
//!
//! - [`DyldCacheHost`]: installed dyld shared caches, their images and local
//!   symbol tables, plus the loaded-image list used for slides
//! - [`XpcRuntime`]: libxpc value access for the codec
//! - [`LoadedImageSearch`]: the slow symbol search (`dlsym` exports, then
//!   on-disk images)
//!
//! ## Dependencies
//!
//! - **libc**: `dlsym`, `fcntl`, `free` and C type definitions
//! - **extern "C"**: libdyld and libxpc entry points (see [`ffi`])
//! - **blocks**: a minimal stack-block ABI for the iteration callbacks (see
//!   [`block`])
//!
//! ## References
//!
//! - [dyld source](https://github.com/apple-oss-distributions/dyld)
//! - [libxpc headers](https://developer.apple.com/documentation/xpc)

pub mod block;
pub mod dyld;
pub mod ffi;
pub mod xpc;

pub use dyld::{loaded_images, DlsymSearch, DyldCacheHost, LoadedImageSearch};
pub use xpc::{XpcDescription, XpcObject, XpcRuntime};
