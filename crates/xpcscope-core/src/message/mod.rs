//! # Message Trees
//!
//! A captured message is split into two channels:
//!
//! - a metadata tree of [`MessageNode`]s, serialized as JSON, and
//! - a side buffer holding raw bytes (data and UUID payloads) that the tree
//!   refers to by `offset`/`length`.
//!
//! ## Modules
//!
//! - [`runtime`]: the [`MessageRuntime`] bridge the codec reads values through
//! - [`registry`]: descriptor → decoder table
//! - [`codec`]: the depth-first encoder producing a [`SerializedMessage`]
//!
//! ## Wire shape
//!
//! Each node is a flat JSON object whose `"type"` field holds the tag:
//!
//! ```json
//! {"description": "<data: 0x...>: { length = 4 bytes }", "type": "data", "offset": 0, "length": 4}
//! ```

pub mod codec;
pub mod registry;
pub mod runtime;

use serde::Serialize;

pub use self::codec::serialize;
pub use self::registry::{RegisteredType, SharedTypeRegistry, TypeKind, TypeRegistry, DEFAULT_TYPE_PREFIX};
pub use self::runtime::{DescriptorHandle, ExportedSymbol, MessageRuntime};

/// Tag used for values whose descriptor is not registered.
pub const UNKNOWN_TYPE_TAG: &str = "unknown";

/// One decoded message value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageNode
{
    /// The runtime's own rendering of the value.
    pub description: String,
    /// Bare type name (`dictionary`, `string`, `fd`, ...).
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(flatten)]
    pub value: NodeValue,
}

/// Per-tag payload of a [`MessageNode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeValue
{
    /// `keys[i]` maps to `values[i]`, in insertion order.
    Dictionary
    {
        keys: Vec<String>,
        values: Vec<MessageNode>,
    },
    Array
    {
        values: Vec<MessageNode>,
    },
    String
    {
        value: String,
    },
    /// Bytes live in the side buffer.
    Data
    {
        offset: u64,
        length: u64,
    },
    /// 16 bytes in the side buffer plus a lowercase hex mirror.
    Uuid
    {
        offset: u64,
        value: String,
    },
    Double
    {
        value: f64,
    },
    Bool
    {
        value: bool,
    },
    /// Decimal text; JSON numbers cannot carry every 64-bit value.
    Int64
    {
        value: String,
    },
    UInt64
    {
        value: String,
    },
    FileDescriptor
    {
        /// Number of the short-lived duplicate used for the path lookup;
        /// already closed by the time the node is seen.
        value: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Tag and description only.
    Unknown {},
}

impl MessageNode
{
    pub fn new(description: impl Into<String>, type_tag: impl Into<String>, value: NodeValue) -> Self
    {
        Self {
            description: description.into(),
            type_tag: type_tag.into(),
            value,
        }
    }

    pub fn is_unknown(&self) -> bool
    {
        matches!(self.value, NodeValue::Unknown {})
    }

    /// Direct children in order (empty for leaves).
    pub fn children(&self) -> &[MessageNode]
    {
        match &self.value {
            NodeValue::Dictionary { values, .. } | NodeValue::Array { values } => values,
            _ => &[],
        }
    }

    /// Value stored under `key`, for dictionary nodes.
    pub fn get(&self, key: &str) -> Option<&MessageNode>
    {
        match &self.value {
            NodeValue::Dictionary { keys, values } => keys.iter().position(|k| k == key).map(|i| &values[i]),
            _ => None,
        }
    }

    /// `(offset, length)` of the side-buffer slice this node owns, if any.
    pub fn side_buffer_slice(&self) -> Option<(u64, u64)>
    {
        match &self.value {
            NodeValue::Data { offset, length } => Some((*offset, *length)),
            NodeValue::Uuid { offset, .. } => Some((*offset, 16)),
            _ => None,
        }
    }

    /// Pre-order walk over this node and all descendants.
    pub fn walk(&self, visit: &mut dyn FnMut(&MessageNode))
    {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

/// Output of one [`serialize`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedMessage
{
    pub root: MessageNode,
    pub side_buffer: Vec<u8>,
}

impl SerializedMessage
{
    /// The side-buffer bytes owned by `node`, if it owns any and the slice is
    /// in range.
    pub fn bytes_for(&self, node: &MessageNode) -> Option<&[u8]>
    {
        let (offset, length) = node.side_buffer_slice()?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(length).ok()?)?;
        self.side_buffer.get(start..end)
    }

    /// Every side-buffer slice in discovery order.
    pub fn slices(&self) -> Vec<(u64, u64)>
    {
        let mut slices = Vec::new();
        self.root.walk(&mut |node| {
            if let Some(slice) = node.side_buffer_slice() {
                slices.push(slice);
            }
        });
        slices
    }
}

#[cfg(test)]
mod tests
{
    use serde_json::json;

    use super::*;

    #[test]
    fn test_node_serializes_flat()
    {
        let node = MessageNode::new("<data>", "data", NodeValue::Data { offset: 4, length: 2 });
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"description": "<data>", "type": "data", "offset": 4, "length": 2})
        );

        let unknown = MessageNode::new("<endpoint>", "endpoint", NodeValue::Unknown {});
        assert_eq!(
            serde_json::to_value(&unknown).unwrap(),
            json!({"description": "<endpoint>", "type": "endpoint"})
        );
    }

    #[test]
    fn test_fd_path_omitted_when_absent()
    {
        let node = MessageNode::new("<fd>", "fd", NodeValue::FileDescriptor { value: 7, path: None });
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"description": "<fd>", "type": "fd", "value": 7})
        );
    }

    #[test]
    fn test_dictionary_get_and_walk()
    {
        let child = MessageNode::new("1", "int64", NodeValue::Int64 { value: "1".into() });
        let root = MessageNode::new(
            "<dict>",
            "dictionary",
            NodeValue::Dictionary {
                keys: vec!["a".into()],
                values: vec![child.clone()],
            },
        );
        assert_eq!(root.get("a"), Some(&child));
        assert_eq!(root.get("b"), None);

        let mut tags = Vec::new();
        root.walk(&mut |node| tags.push(node.type_tag.clone()));
        assert_eq!(tags, vec!["dictionary", "int64"]);
    }
}
