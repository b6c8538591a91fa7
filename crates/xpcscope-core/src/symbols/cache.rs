//! # Shared Cache Host Interface
//!
//! The resolver never talks to dyld directly. It walks installed caches, their
//! images and each image's local symbol block through the traits below, and it
//! reads the current process's loaded-image list to compute slides.
//!
//! On macOS [`DyldCacheHost`](crate::platform::macos::DyldCacheHost) backs
//! these with `dyld_for_each_installed_shared_cache` and friends; tests use
//! in-memory tables.

use std::ops::ControlFlow;

use super::nlist::LocalSymbols;
use crate::error::{ScopeError, ScopeResult};

/// One entry of the current process's loaded-image list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage
{
    /// Install name or path the image was loaded from.
    pub path: String,
    /// Address of the image's Mach-O header in this process.
    pub header: u64,
    /// Load bias applied by dyld.
    pub slide: i64,
}

/// Enumerates installed shared caches and the current process's images.
pub trait SharedCacheHost: Send + Sync
{
    /// Visit every installed cache in the order the host reports them.
    ///
    /// Returning `ControlFlow::Break` from the visitor ends the walk.
    ///
    /// ## Errors
    ///
    /// `Setup` when the host has no shared-cache enumeration API.
    fn for_each_cache(&self, visit: &mut dyn FnMut(&dyn CacheView) -> ControlFlow<()>) -> ScopeResult<()>;

    /// Base (header) address of `module` in the current process, if loaded.
    fn module_base(&self, module: &str) -> Option<u64>;

    /// The current process's loaded-image list.
    fn loaded_images(&self) -> Vec<LoadedImage>;
}

/// One installed shared cache.
pub trait CacheView
{
    /// Visit the cache's images; `Break` stops the walk.
    fn for_each_image(&self, visit: &mut dyn FnMut(&dyn CacheImage) -> ControlFlow<()>);
}

/// One image inside a shared cache.
pub trait CacheImage
{
    /// Install name, e.g. `/usr/lib/system/libxpc.dylib`.
    fn install_name(&self) -> Option<String>;

    /// Hand the image's local symbol table to `reader`.
    ///
    /// Returns `false` when the cache keeps no local symbols for this image.
    fn read_local_symbols(&self, reader: &mut dyn FnMut(LocalSymbols<'_>)) -> bool;
}

/// Final path component of an install name.
pub fn install_name_leaf(install_name: &str) -> &str
{
    install_name.rsplit('/').next().unwrap_or(install_name)
}

/// Whether `install_name` names `module` (compared on the final component).
pub fn install_name_matches(install_name: &str, module: &str) -> bool
{
    install_name_leaf(install_name) == module
}

/// Load bias of `module` in the current process.
///
/// Finds the module's base address first, then scans the loaded-image list
/// for the entry whose header sits at that base and reads its slide.
///
/// ## Errors
///
/// `InvalidArgument` if the module is not loaded or no loaded image starts at
/// its base.
pub fn module_slide(host: &dyn SharedCacheHost, module: &str) -> ScopeResult<i64>
{
    let base = host
        .module_base(module)
        .ok_or_else(|| ScopeError::InvalidArgument(format!("module {module} not found in current process")))?;

    host.loaded_images()
        .into_iter()
        .find(|image| image.header == base)
        .map(|image| image.slide)
        .ok_or_else(|| ScopeError::InvalidArgument(format!("no loaded image header at 0x{base:x} for {module}")))
}
