//! # dyld Shared Cache Host
//!
//! [`SharedCacheHost`] over libdyld: installed caches and their images come
//! from the shared-cache SPI, the loaded-image list and slides from the public
//! `_dyld_*` calls.

use std::ffi::{c_char, c_void, CStr};
use std::ops::ControlFlow;

use tracing::{debug, trace};

use super::block::StackBlock;
use super::ffi::{self, DyldCacheApi};
use crate::error::{ScopeError, ScopeResult};
use crate::symbols::{
    install_name_matches, CacheImage, CacheView, ChainedSearch, LoadedImage, LocalSymbols, ObjectSymbolSearch,
    SharedCacheHost, SymbolMatcher, SymbolSearch,
};
use crate::types::{ResolvedSymbol, SymbolSource};

/// Live shared-cache host for the current process.
pub struct DyldCacheHost
{
    api: DyldCacheApi,
}

impl DyldCacheHost
{
    /// Resolve the shared-cache SPI.
    ///
    /// ## Errors
    ///
    /// `Setup` if this OS release does not export one of the entry points.
    pub fn new() -> ScopeResult<Self>
    {
        let api = DyldCacheApi::load().map_err(|missing| ScopeError::Setup(format!("{missing} not found in libdyld")))?;
        debug!("dyld shared cache API resolved");
        Ok(Self { api })
    }
}

impl SharedCacheHost for DyldCacheHost
{
    fn for_each_cache(&self, visit: &mut dyn FnMut(&dyn CacheView) -> ControlFlow<()>) -> ScopeResult<()>
    {
        let api = &self.api;
        let mut done = false;
        let mut block = StackBlock::unary(|raw: *const c_void| {
            if done {
                return;
            }
            let cache = DyldCache { api, raw };
            if visit(&cache).is_break() {
                done = true;
            }
        });

        // SAFETY: the block outlives the synchronous call.
        unsafe { (api.for_each_installed_shared_cache)(block.as_ptr()) };
        Ok(())
    }

    fn module_base(&self, module: &str) -> Option<u64>
    {
        self.loaded_images()
            .into_iter()
            .find(|image| install_name_matches(&image.path, module))
            .map(|image| image.header)
    }

    fn loaded_images(&self) -> Vec<LoadedImage>
    {
        loaded_images()
    }
}

/// The current process's loaded-image list.
pub fn loaded_images() -> Vec<LoadedImage>
{
    // SAFETY: the `_dyld_*` calls accept any index and return NULL past the
    // end; the list can shrink concurrently, so NULL headers are skipped.
    unsafe {
        let count = ffi::_dyld_image_count();
        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            let header = ffi::_dyld_get_image_header(index);
            if header.is_null() {
                continue;
            }
            images.push(LoadedImage {
                path: c_string(ffi::_dyld_get_image_name(index)).unwrap_or_default(),
                header: header as u64,
                slide: ffi::_dyld_get_image_vmaddr_slide(index) as i64,
            });
        }
        images
    }
}

struct DyldCache<'a>
{
    api: &'a DyldCacheApi,
    raw: ffi::dyld_shared_cache_t,
}

impl CacheView for DyldCache<'_>
{
    fn for_each_image(&self, visit: &mut dyn FnMut(&dyn CacheImage) -> ControlFlow<()>)
    {
        let api = self.api;
        let mut done = false;
        let mut block = StackBlock::unary(|raw: *const c_void| {
            if done {
                return;
            }
            let image = DyldImage { api, raw };
            if visit(&image).is_break() {
                done = true;
            }
        });

        // SAFETY: `raw` came from the enclosing cache walk, which is still on
        // the stack; the block outlives the synchronous call.
        unsafe { (api.shared_cache_for_each_image)(self.raw, block.as_ptr()) };
    }
}

struct DyldImage<'a>
{
    api: &'a DyldCacheApi,
    raw: ffi::dyld_image_t,
}

impl CacheImage for DyldImage<'_>
{
    fn install_name(&self) -> Option<String>
    {
        // SAFETY: `raw` is a live image handle from the enclosing walk.
        unsafe { c_string((self.api.image_get_installname)(self.raw)) }
    }

    fn read_local_symbols(&self, reader: &mut dyn FnMut(LocalSymbols<'_>)) -> bool
    {
        let mut block = StackBlock::nlist_reader(|start: *const c_void, count: u64, strings: *const c_char| {
            trace!(count, "local symbol block");
            // SAFETY: dyld hands out `count` packed nlist_64 records and the
            // matching string table, mapped for the lifetime of the cache.
            let symbols = unsafe { LocalSymbols::from_raw(start.cast(), count, strings) };
            reader(symbols);
        });

        // SAFETY: `raw` is a live image handle; the block outlives the call.
        unsafe { (self.api.image_local_nlist_content)(self.raw, block.as_ptr()) }
    }
}

/// Owned copy of a C string, `None` for NULL.
unsafe fn c_string(ptr: *const c_char) -> Option<String>
{
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Exported-symbol lookup through `dlsym`.
///
/// Only answers exact lookups; addresses come back already slid. Linkage
/// names lose their leading underscore before the call, matching what
/// `dlsym` expects.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlsymSearch;

impl SymbolSearch for DlsymSearch
{
    fn find_matching(&self, matcher: &SymbolMatcher) -> Vec<ResolvedSymbol>
    {
        let SymbolMatcher::Exact(name) = matcher else {
            return Vec::new();
        };
        let Ok(name) = std::str::from_utf8(name) else {
            return Vec::new();
        };
        let c_name = name.strip_prefix('_').unwrap_or(name);

        match ffi::lookup_owned(c_name) {
            Some(address) => vec![ResolvedSymbol {
                name: name.to_string(),
                base_value: address as u64,
                slide: 0,
                source: SymbolSource::Fallback,
            }],
            None => Vec::new(),
        }
    }
}

/// The slow search for this process: exported symbols first, then every
/// loaded image that has an on-disk file.
pub struct LoadedImageSearch;

impl LoadedImageSearch
{
    /// Snapshot the current loaded-image list.
    ///
    /// Images that only exist inside the shared cache have no file and are
    /// skipped by the file scan.
    pub fn current() -> ChainedSearch
    {
        ChainedSearch::new()
            .with(DlsymSearch)
            .with(ObjectSymbolSearch::from_loaded_images(&loaded_images()))
    }
}
