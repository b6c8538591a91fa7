//! # macOS FFI Declarations
//!
//! Raw declarations for the libdyld, libxpc and blocks-runtime entry points
//! the macOS backends call. Nothing here is safe to call directly; the
//! wrappers in [`dyld`](super::dyld) and [`xpc`](super::xpc) uphold the
//! contracts.
//!
//! The dyld shared-cache walk uses private SPI (`dyld_priv.h`) that is not
//! guaranteed on every OS release, so those functions are looked up with
//! `dlsym` at runtime instead of being linked; see [`DyldCacheApi`].
//!
//! ## References
//!
//! - [dyld(3) man page](https://developer.apple.com/library/archive/documentation/System/Conceptual/ManPages_iPhoneOS/man3/dyld.3.html)
//! - [XPC Services API](https://developer.apple.com/documentation/xpc)
//! - [Block ABI](https://clang.llvm.org/docs/Block-ABI-Apple.html)

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void, CStr};

/// Opaque libxpc object (`xpc_object_t`).
pub type xpc_object_t = *mut c_void;

/// Opaque libxpc type descriptor (`xpc_type_t`).
pub type xpc_type_t = *const c_void;

/// Opaque shared-cache handle (`dyld_shared_cache_t`).
pub type dyld_shared_cache_t = *const c_void;

/// Opaque shared-cache image handle (`dyld_image_t`).
pub type dyld_image_t = *const c_void;

// Loaded-image introspection. Public and always present.
#[link(name = "System", kind = "dylib")]
extern "C" {
    pub fn _dyld_image_count() -> u32;

    /// Mach-O header of the image at `index`, or NULL past the end.
    pub fn _dyld_get_image_header(index: u32) -> *const c_void;

    /// Load bias of the image at `index`.
    pub fn _dyld_get_image_vmaddr_slide(index: u32) -> isize;

    /// Path of the image at `index`; owned by dyld.
    pub fn _dyld_get_image_name(index: u32) -> *const c_char;

    /// Stack block class used as `isa` for blocks built on the stack.
    pub static _NSConcreteStackBlock: [*const c_void; 32];
}

// libxpc. Linked through libSystem.
#[link(name = "System", kind = "dylib")]
extern "C" {
    pub fn xpc_get_type(object: xpc_object_t) -> xpc_type_t;

    /// Heap-allocated description; the caller frees it with `free`.
    pub fn xpc_copy_description(object: xpc_object_t) -> *mut c_char;

    pub fn xpc_dictionary_apply(xdict: xpc_object_t, applier: *mut c_void) -> bool;
    pub fn xpc_array_apply(xarray: xpc_object_t, applier: *mut c_void) -> bool;

    pub fn xpc_string_get_string_ptr(xstring: xpc_object_t) -> *const c_char;
    pub fn xpc_string_get_length(xstring: xpc_object_t) -> usize;

    pub fn xpc_data_get_bytes_ptr(xdata: xpc_object_t) -> *const c_void;
    pub fn xpc_data_get_length(xdata: xpc_object_t) -> usize;

    /// Pointer to the 16 UUID bytes, owned by the object.
    pub fn xpc_uuid_get_bytes(xuuid: xpc_object_t) -> *const u8;

    pub fn xpc_double_get_value(xdouble: xpc_object_t) -> f64;
    pub fn xpc_bool_get_value(xbool: xpc_object_t) -> bool;
    pub fn xpc_int64_get_value(xint: xpc_object_t) -> i64;
    pub fn xpc_uint64_get_value(xuint: xpc_object_t) -> u64;

    /// New descriptor referring to the same open file, or -1.
    pub fn xpc_fd_dup(xfd: xpc_object_t) -> c_int;

    pub fn xpc_connection_get_name(connection: xpc_object_t) -> *const c_char;
    pub fn xpc_connection_get_pid(connection: xpc_object_t) -> libc::pid_t;
}

/// `void dyld_for_each_installed_shared_cache(void (^)(dyld_shared_cache_t))`
pub type ForEachInstalledCacheFn = unsafe extern "C" fn(block: *mut c_void);

/// `void dyld_shared_cache_for_each_image(dyld_shared_cache_t, void (^)(dyld_image_t))`
pub type SharedCacheForEachImageFn = unsafe extern "C" fn(cache: dyld_shared_cache_t, block: *mut c_void);

/// `const char* dyld_image_get_installname(dyld_image_t)`
pub type ImageGetInstallNameFn = unsafe extern "C" fn(image: dyld_image_t) -> *const c_char;

/// `bool dyld_image_local_nlist_content_4Symbolication(dyld_image_t,
/// void (^)(const void* nlistStart, uint64_t nlistCount, const char* stringTable))`
pub type ImageLocalNlistContentFn = unsafe extern "C" fn(image: dyld_image_t, block: *mut c_void) -> bool;

/// Shared-cache SPI resolved at runtime.
#[derive(Clone, Copy)]
pub struct DyldCacheApi
{
    pub for_each_installed_shared_cache: ForEachInstalledCacheFn,
    pub shared_cache_for_each_image: SharedCacheForEachImageFn,
    pub image_get_installname: ImageGetInstallNameFn,
    pub image_local_nlist_content: ImageLocalNlistContentFn,
}

impl DyldCacheApi
{
    /// Look every entry point up in the already-loaded images.
    ///
    /// Returns the name of the first missing symbol on failure.
    pub fn load() -> Result<Self, &'static str>
    {
        // SAFETY: each symbol is transmuted to the signature declared in
        // dyld_priv.h for that name.
        unsafe {
            Ok(Self {
                for_each_installed_shared_cache: std::mem::transmute::<*mut c_void, ForEachInstalledCacheFn>(
                    lookup(c"dyld_for_each_installed_shared_cache")?,
                ),
                shared_cache_for_each_image: std::mem::transmute::<*mut c_void, SharedCacheForEachImageFn>(lookup(
                    c"dyld_shared_cache_for_each_image",
                )?),
                image_get_installname: std::mem::transmute::<*mut c_void, ImageGetInstallNameFn>(lookup(
                    c"dyld_image_get_installname",
                )?),
                image_local_nlist_content: std::mem::transmute::<*mut c_void, ImageLocalNlistContentFn>(lookup(
                    c"dyld_image_local_nlist_content_4Symbolication",
                )?),
            })
        }
    }
}

/// `dlsym(RTLD_DEFAULT, name)`, failing with the name on NULL.
pub fn lookup(name: &'static CStr) -> Result<*mut c_void, &'static str>
{
    // SAFETY: `name` is NUL-terminated; RTLD_DEFAULT searches loaded images.
    let symbol = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    if symbol.is_null() {
        Err(name.to_str().unwrap_or("<non-utf8 symbol>"))
    } else {
        Ok(symbol)
    }
}

/// `dlsym(RTLD_DEFAULT, name)` for a runtime-built name.
pub fn lookup_owned(name: &str) -> Option<*mut c_void>
{
    let name = std::ffi::CString::new(name).ok()?;
    // SAFETY: `name` is NUL-terminated; RTLD_DEFAULT searches loaded images.
    let symbol = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    (!symbol.is_null()).then_some(symbol)
}
