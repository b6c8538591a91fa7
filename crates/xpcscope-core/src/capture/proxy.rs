//! NSXPC proxy call payloads.
//!
//! NSXPC calls are captured as the selector plus a rendering of each
//! argument instead of a message tree. Two entry points produce them:
//!
//! - exported-object call-outs (`__NSXPCCONNECTION_IS_CALLING_OUT_TO_EXPORTED_OBJECT__*`),
//!   where the arguments can be formatted as objects, and
//! - the `_NSXPCDistantObjectSimpleMessageSend<N>` family, where only raw
//!   register values are available and `N` is the argument count including
//!   `self` and `_cmd`.

use serde::Serialize;

/// Symbol prefix of the simple-send family.
pub const SIMPLE_SEND_PREFIX: &str = "_NSXPCDistantObjectSimpleMessageSend";

/// One NSXPC method call, serialized as `{"type": "nsxpc", sel, args, description}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "nsxpc")]
pub struct ProxyCall
{
    /// Selector name.
    pub sel: String,
    /// Formatted arguments after `self` and `_cmd`.
    pub args: Vec<String>,
    pub description: String,
}

impl ProxyCall
{
    /// A call delivered to an exported object; described by its selector.
    pub fn exported(sel: impl Into<String>, args: Vec<String>) -> Self
    {
        let sel = sel.into();
        Self {
            description: sel.clone(),
            sel,
            args,
        }
    }

    /// A call sent through a remote proxy of class `class_name`.
    pub fn remote(class_name: &str, sel: impl Into<String>, args: Vec<String>) -> Self
    {
        let sel = sel.into();
        Self {
            description: format!("{class_name} {sel}"),
            sel,
            args,
        }
    }
}

/// Argument count (including `self` and `_cmd`) encoded in a simple-send
/// symbol name, taken from its final digit.
///
/// Works on linkage or C-level names, with or without the family prefix.
pub fn simple_send_arity(name: &str) -> Option<usize>
{
    name.chars().last()?.to_digit(10).map(|digit| digit as usize)
}

/// Render the raw register arguments of a simple-send call.
///
/// `registers` holds the argument registers in order, `self` and `_cmd`
/// first; the values from index 2 up to `arity` are formatted as bare hex.
pub fn raw_arguments(arity: usize, registers: &[u64]) -> Vec<String>
{
    registers
        .iter()
        .take(arity)
        .skip(2)
        .map(|value| format!("{value:x}"))
        .collect()
}
