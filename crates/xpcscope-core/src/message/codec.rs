//! Message tree codec.
//!
//! Walks a native message value depth-first, pre-order, producing a
//! [`MessageNode`] tree plus one contiguous side buffer. Every call owns its
//! own accumulator, so concurrent calls from different threads never share
//! mutable state.

use std::os::fd::{AsFd, AsRawFd};

use tracing::{debug, trace};

use super::registry::{TypeKind, TypeRegistry};
use super::runtime::MessageRuntime;
use super::{MessageNode, NodeValue, SerializedMessage, UNKNOWN_TYPE_TAG};
use crate::error::{ScopeError, ScopeResult};
use crate::platform;

/// Encode `root` and everything reachable from it.
///
/// Slices of the returned side buffer are laid out in the order their nodes
/// are discovered by the walk.
///
/// ## Errors
///
/// `UnknownType` if some handle in the tree has no type descriptor or no
/// description. Unregistered but well-formed values decode as `Unknown`.
pub fn serialize<R>(runtime: &R, registry: &TypeRegistry, root: R::Handle) -> ScopeResult<SerializedMessage>
where
    R: MessageRuntime + ?Sized,
{
    let mut encoder = Encoder {
        runtime,
        registry,
        side_buffer: Vec::new(),
    };
    let root = encoder.encode(root)?;
    trace!(side_buffer = encoder.side_buffer.len(), "message encoded");

    Ok(SerializedMessage {
        root,
        side_buffer: encoder.side_buffer,
    })
}

struct Encoder<'a, R: MessageRuntime + ?Sized>
{
    runtime: &'a R,
    registry: &'a TypeRegistry,
    side_buffer: Vec<u8>,
}

impl<R: MessageRuntime + ?Sized> Encoder<'_, R>
{
    fn encode(&mut self, value: R::Handle) -> ScopeResult<MessageNode>
    {
        let runtime = self.runtime;

        let descriptor = runtime
            .type_of(value)
            .ok_or_else(|| ScopeError::UnknownType("value has no type descriptor".to_string()))?;
        let description = runtime
            .copy_description(value)
            .map(|text| String::from_utf8_lossy(text.as_ref()).into_owned())
            .ok_or_else(|| ScopeError::UnknownType(format!("value of type {descriptor} has no description")))?;

        let Some(registered) = self.registry.lookup(descriptor) else {
            return Ok(MessageNode::new(description, UNKNOWN_TYPE_TAG, NodeValue::Unknown {}));
        };
        let type_tag = registered.name.clone();

        let value = match registered.kind {
            TypeKind::Dictionary => self.encode_dictionary(value)?,
            TypeKind::Array => self.encode_array(value)?,
            TypeKind::String => NodeValue::String {
                value: String::from_utf8_lossy(&runtime.string_bytes(value)).into_owned(),
            },
            TypeKind::Data => {
                let bytes = runtime.data_bytes(value);
                let length = bytes.len() as u64;
                NodeValue::Data {
                    offset: self.append(&bytes),
                    length,
                }
            }
            TypeKind::Uuid => {
                let bytes = runtime.uuid_bytes(value);
                NodeValue::Uuid {
                    offset: self.append(&bytes),
                    value: hex::encode(bytes),
                }
            }
            TypeKind::Double => NodeValue::Double {
                value: runtime.double_value(value),
            },
            TypeKind::Bool => NodeValue::Bool {
                value: runtime.bool_value(value),
            },
            TypeKind::Int64 => NodeValue::Int64 {
                value: runtime.int64_value(value).to_string(),
            },
            TypeKind::UInt64 => NodeValue::UInt64 {
                value: runtime.uint64_value(value).to_string(),
            },
            TypeKind::FileDescriptor => encode_descriptor(runtime, value),
            TypeKind::Other => NodeValue::Unknown {},
        };

        Ok(MessageNode::new(description, type_tag, value))
    }

    fn encode_dictionary(&mut self, value: R::Handle) -> ScopeResult<NodeValue>
    {
        let runtime = self.runtime;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        let mut failure = None;

        runtime.dictionary_apply(value, &mut |key, child| {
            match self.encode(child) {
                Ok(node) => {
                    keys.push(String::from_utf8_lossy(key).into_owned());
                    values.push(node);
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
            true
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(NodeValue::Dictionary { keys, values }),
        }
    }

    fn encode_array(&mut self, value: R::Handle) -> ScopeResult<NodeValue>
    {
        let runtime = self.runtime;
        let mut values = Vec::new();
        let mut failure = None;

        runtime.array_apply(value, &mut |_, child| {
            match self.encode(child) {
                Ok(node) => values.push(node),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
            true
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(NodeValue::Array { values }),
        }
    }

    /// Append a chunk, returning the offset it starts at.
    fn append(&mut self, bytes: &[u8]) -> u64
    {
        let offset = self.side_buffer.len() as u64;
        self.side_buffer.extend_from_slice(bytes);
        offset
    }
}

/// Duplicate the descriptor and look up its path; the duplicate is closed
/// when this returns.
///
/// The reported `value` is the number of that transient duplicate, not the
/// descriptor carried by the message.
fn encode_descriptor<R: MessageRuntime + ?Sized>(runtime: &R, value: R::Handle) -> NodeValue
{
    let Some(fd) = runtime.dup_descriptor(value) else {
        debug!("descriptor duplication failed");
        return NodeValue::Unknown {};
    };

    let path = match platform::descriptor_path(fd.as_fd()) {
        Ok(path) => Some(path),
        Err(err) => {
            debug!(fd = fd.as_raw_fd(), error = %err, "descriptor has no path");
            None
        }
    };

    NodeValue::FileDescriptor {
        value: fd.as_raw_fd(),
        path,
    }
}
