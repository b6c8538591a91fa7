//! Minimal stack blocks.
//!
//! libdyld and libxpc take Clang blocks for their iteration callbacks. The
//! callees here invoke the block synchronously and never copy it, so a
//! stack-allocated literal without copy/dispose helpers is enough: `isa`
//! points at `_NSConcreteStackBlock`, `flags` is zero and the descriptor only
//! carries the literal's size.

use std::ffi::{c_char, c_int, c_ulong, c_void};
use std::mem;

use super::ffi;

#[repr(C)]
struct BlockDescriptor
{
    reserved: c_ulong,
    size: c_ulong,
}

#[repr(C)]
struct BlockLiteral<F>
{
    isa: *const c_void,
    flags: c_int,
    reserved: c_int,
    invoke: *const c_void,
    descriptor: *const BlockDescriptor,
    closure: F,
}

/// A block literal wrapping a Rust closure.
///
/// Build it with the constructor matching the callee's block signature, keep
/// it on the stack and pass [`StackBlock::as_ptr`] for the duration of one
/// call.
pub struct StackBlock<F>
{
    literal: BlockLiteral<F>,
    descriptor: BlockDescriptor,
}

impl<F> StackBlock<F>
{
    fn with_invoke(invoke: *const c_void, closure: F) -> Self
    {
        Self {
            literal: BlockLiteral {
                // SAFETY: only the address of the class object is taken.
                isa: unsafe { std::ptr::addr_of!(ffi::_NSConcreteStackBlock) }.cast(),
                flags: 0,
                reserved: 0,
                invoke,
                descriptor: std::ptr::null(),
                closure,
            },
            descriptor: BlockDescriptor {
                reserved: 0,
                size: mem::size_of::<BlockLiteral<F>>() as c_ulong,
            },
        }
    }

    /// Pointer to pass as a block argument.
    ///
    /// Valid while `self` is neither moved nor dropped.
    pub fn as_ptr(&mut self) -> *mut c_void
    {
        self.literal.descriptor = &self.descriptor;
        std::ptr::addr_of_mut!(self.literal).cast()
    }
}

impl<F: FnMut(*const c_void)> StackBlock<F>
{
    /// `void (^)(void *)`, e.g. the cache and image visitors.
    pub fn unary(closure: F) -> Self
    {
        let invoke: unsafe extern "C" fn(*mut BlockLiteral<F>, *const c_void) = invoke_unary::<F>;
        Self::with_invoke(invoke as *const c_void, closure)
    }
}

impl<F: FnMut(*const c_void, u64, *const c_char)> StackBlock<F>
{
    /// `void (^)(const void *, uint64_t, const char *)`, the local nlist reader.
    pub fn nlist_reader(closure: F) -> Self
    {
        let invoke: unsafe extern "C" fn(*mut BlockLiteral<F>, *const c_void, u64, *const c_char) =
            invoke_nlist_reader::<F>;
        Self::with_invoke(invoke as *const c_void, closure)
    }
}

impl<F: FnMut(*const c_char, ffi::xpc_object_t) -> bool> StackBlock<F>
{
    /// `bool (^)(const char *, xpc_object_t)`, `xpc_dictionary_applier_t`.
    pub fn dictionary_applier(closure: F) -> Self
    {
        let invoke: unsafe extern "C" fn(*mut BlockLiteral<F>, *const c_char, ffi::xpc_object_t) -> bool =
            invoke_dictionary_applier::<F>;
        Self::with_invoke(invoke as *const c_void, closure)
    }
}

impl<F: FnMut(usize, ffi::xpc_object_t) -> bool> StackBlock<F>
{
    /// `bool (^)(size_t, xpc_object_t)`, `xpc_array_applier_t`.
    pub fn array_applier(closure: F) -> Self
    {
        let invoke: unsafe extern "C" fn(*mut BlockLiteral<F>, usize, ffi::xpc_object_t) -> bool =
            invoke_array_applier::<F>;
        Self::with_invoke(invoke as *const c_void, closure)
    }
}

unsafe extern "C" fn invoke_unary<F: FnMut(*const c_void)>(block: *mut BlockLiteral<F>, arg: *const c_void)
{
    ((*block).closure)(arg);
}

unsafe extern "C" fn invoke_nlist_reader<F: FnMut(*const c_void, u64, *const c_char)>(
    block: *mut BlockLiteral<F>,
    start: *const c_void,
    count: u64,
    strings: *const c_char,
)
{
    ((*block).closure)(start, count, strings);
}

unsafe extern "C" fn invoke_dictionary_applier<F: FnMut(*const c_char, ffi::xpc_object_t) -> bool>(
    block: *mut BlockLiteral<F>,
    key: *const c_char,
    value: ffi::xpc_object_t,
) -> bool
{
    ((*block).closure)(key, value)
}

unsafe extern "C" fn invoke_array_applier<F: FnMut(usize, ffi::xpc_object_t) -> bool>(
    block: *mut BlockLiteral<F>,
    index: usize,
    value: ffi::xpc_object_t,
) -> bool
{
    ((*block).closure)(index, value)
}
