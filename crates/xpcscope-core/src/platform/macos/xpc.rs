//! # libxpc Runtime
//!
//! [`MessageRuntime`] over live libxpc objects. Handles are the raw
//! `xpc_object_t` pointers the intercepted call received; they are borrowed
//! for the duration of that call and never retained.

use std::ffi::{c_char, CStr};
use std::os::fd::{FromRawFd, OwnedFd};

use tracing::debug;

use super::block::StackBlock;
use super::dyld::loaded_images;
use super::ffi::{self, xpc_object_t};
use crate::error::{ScopeError, ScopeResult};
use crate::message::{DescriptorHandle, ExportedSymbol, MessageRuntime};
use crate::symbols::{install_name_matches, nlist};
use crate::types::Endpoint;

/// Install-name leaf of the runtime library.
const LIBXPC: &str = "libxpc.dylib";

/// A borrowed `xpc_object_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpcObject(xpc_object_t);

impl XpcObject
{
    /// Wrap a raw object pointer.
    ///
    /// ## Safety
    ///
    /// `raw` must be a live libxpc object for as long as the wrapper is used.
    pub unsafe fn from_raw(raw: xpc_object_t) -> Self
    {
        XpcObject(raw)
    }

    pub fn as_raw(self) -> xpc_object_t
    {
        self.0
    }
}

/// Description text from `xpc_copy_description`, freed on drop.
pub struct XpcDescription
{
    ptr: *mut c_char,
}

impl AsRef<[u8]> for XpcDescription
{
    fn as_ref(&self) -> &[u8]
    {
        // SAFETY: non-NULL, NUL-terminated and owned until drop.
        unsafe { CStr::from_ptr(self.ptr).to_bytes() }
    }
}

impl Drop for XpcDescription
{
    fn drop(&mut self)
    {
        // SAFETY: allocated with malloc by libxpc and released exactly once.
        unsafe { libc::free(self.ptr.cast()) };
    }
}

/// The live libxpc bridge.
#[derive(Debug)]
pub struct XpcRuntime
{
    _private: (),
}

impl XpcRuntime
{
    /// Attach to the libxpc loaded in this process.
    ///
    /// ## Errors
    ///
    /// `Setup` if libxpc is not loaded.
    pub fn new() -> ScopeResult<Self>
    {
        ffi::lookup(c"xpc_get_type").map_err(|missing| ScopeError::Setup(format!("{missing}: libxpc is not loaded")))?;
        Ok(Self { _private: () })
    }

    /// Service name and pid on the other end of `connection`.
    ///
    /// Anonymous connections report an empty name.
    ///
    /// ## Safety
    ///
    /// `connection` must be a live `xpc_connection_t`.
    pub unsafe fn connection_peer(&self, connection: XpcObject) -> Endpoint
    {
        let name = ffi::xpc_connection_get_name(connection.0);
        let name = if name.is_null() {
            String::new()
        } else {
            CStr::from_ptr(name).to_string_lossy().into_owned()
        };
        Endpoint::new(name, ffi::xpc_connection_get_pid(connection.0))
    }
}

impl MessageRuntime for XpcRuntime
{
    type Handle = XpcObject;
    type Description = XpcDescription;

    /// Every external symbol libxpc defines, read from its mapped symbol
    /// table. Names are C-level: the Mach-O leading underscore is dropped.
    fn exported_symbols(&self) -> ScopeResult<Vec<ExportedSymbol>>
    {
        let image = loaded_images()
            .into_iter()
            .find(|image| install_name_matches(&image.path, LIBXPC))
            .ok_or_else(|| ScopeError::Setup(format!("{LIBXPC} is not loaded")))?;

        // SAFETY: dyld reported this header and slide for an image that stays
        // loaded; libxpc is never unloaded.
        let table = unsafe { nlist::mapped_image_symbols(image.header as *const u8, image.slide) }
            .map_err(|err| ScopeError::Setup(format!("cannot read {LIBXPC} symbols: {err}")))?;

        let exports: Vec<ExportedSymbol> = table
            .iter()
            .filter(|(entry, _)| entry.is_exported_definition())
            .map(|(entry, name)| {
                let name = name.strip_prefix(b"_").unwrap_or(name);
                ExportedSymbol::new(String::from_utf8_lossy(name), entry.value.wrapping_add_signed(image.slide))
            })
            .collect();

        if exports.is_empty() {
            return Err(ScopeError::Setup(format!("{LIBXPC} symbol table has no exports")));
        }
        debug!(count = exports.len(), path = %image.path, "libxpc exports read");
        Ok(exports)
    }

    fn type_of(&self, value: XpcObject) -> Option<DescriptorHandle>
    {
        if value.0.is_null() {
            return None;
        }
        // SAFETY: live object per the handle contract.
        let descriptor = unsafe { ffi::xpc_get_type(value.0) };
        (!descriptor.is_null()).then(|| DescriptorHandle::new(descriptor as u64))
    }

    fn copy_description(&self, value: XpcObject) -> Option<XpcDescription>
    {
        if value.0.is_null() {
            return None;
        }
        // SAFETY: live object per the handle contract.
        let ptr = unsafe { ffi::xpc_copy_description(value.0) };
        (!ptr.is_null()).then_some(XpcDescription { ptr })
    }

    fn dictionary_apply(&self, value: XpcObject, visitor: &mut dyn FnMut(&[u8], XpcObject) -> bool) -> bool
    {
        let mut block = StackBlock::dictionary_applier(|key: *const c_char, child: xpc_object_t| {
            let key: &[u8] = if key.is_null() {
                &[]
            } else {
                // SAFETY: keys are NUL-terminated and live during the apply.
                unsafe { CStr::from_ptr(key) }.to_bytes()
            };
            visitor(key, XpcObject(child))
        });
        // SAFETY: `value` is a dictionary (checked by the caller's dispatch).
        unsafe { ffi::xpc_dictionary_apply(value.0, block.as_ptr()) }
    }

    fn array_apply(&self, value: XpcObject, visitor: &mut dyn FnMut(usize, XpcObject) -> bool) -> bool
    {
        let mut block =
            StackBlock::array_applier(|index: usize, child: xpc_object_t| visitor(index, XpcObject(child)));
        // SAFETY: `value` is an array (checked by the caller's dispatch).
        unsafe { ffi::xpc_array_apply(value.0, block.as_ptr()) }
    }

    fn string_bytes(&self, value: XpcObject) -> Vec<u8>
    {
        // SAFETY: the pointer covers `length` bytes owned by the object.
        unsafe { copy_bytes(ffi::xpc_string_get_string_ptr(value.0).cast(), ffi::xpc_string_get_length(value.0)) }
    }

    fn data_bytes(&self, value: XpcObject) -> Vec<u8>
    {
        // SAFETY: the pointer covers `length` bytes owned by the object.
        unsafe { copy_bytes(ffi::xpc_data_get_bytes_ptr(value.0).cast(), ffi::xpc_data_get_length(value.0)) }
    }

    fn uuid_bytes(&self, value: XpcObject) -> [u8; 16]
    {
        let mut bytes = [0u8; 16];
        // SAFETY: a UUID object always holds 16 bytes.
        unsafe {
            let ptr = ffi::xpc_uuid_get_bytes(value.0);
            if !ptr.is_null() {
                bytes.copy_from_slice(std::slice::from_raw_parts(ptr, 16));
            }
        }
        bytes
    }

    fn double_value(&self, value: XpcObject) -> f64
    {
        unsafe { ffi::xpc_double_get_value(value.0) }
    }

    fn bool_value(&self, value: XpcObject) -> bool
    {
        unsafe { ffi::xpc_bool_get_value(value.0) }
    }

    fn int64_value(&self, value: XpcObject) -> i64
    {
        unsafe { ffi::xpc_int64_get_value(value.0) }
    }

    fn uint64_value(&self, value: XpcObject) -> u64
    {
        unsafe { ffi::xpc_uint64_get_value(value.0) }
    }

    fn dup_descriptor(&self, value: XpcObject) -> Option<OwnedFd>
    {
        // SAFETY: a non-negative result is a fresh descriptor we now own.
        unsafe {
            let fd = ffi::xpc_fd_dup(value.0);
            (fd >= 0).then(|| OwnedFd::from_raw_fd(fd))
        }
    }
}

unsafe fn copy_bytes(ptr: *const u8, length: usize) -> Vec<u8>
{
    if ptr.is_null() || length == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, length).to_vec()
    }
}
