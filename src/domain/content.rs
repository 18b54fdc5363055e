//! Content tree data model
//!
//! A mock host serves a nested mapping: keys are path segments, leaves are
//! file contents and nested mappings are directories. Insertion order is
//! preserved so listings come back in the order entries were declared.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One directory level: entry name to node.
pub type ContentTree = IndexMap<String, ContentNode>;

/// Hostname to the root directory served for that host.
pub type HostContentMap = IndexMap<String, ContentTree>;

/// File payload.
///
/// Integers are served as their decimal representation. Text is served as
/// its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Bytes a client reading this file receives.
    #[must_use]
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Integer(value) => Cow::Owned(value.to_string().into_bytes()),
            Self::Text(text) => Cow::Borrowed(text.as_bytes()),
            Self::Bytes(bytes) => Cow::Borrowed(bytes),
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Integer(value) => value.to_string().into_bytes(),
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Size in bytes as reported by `stat`.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Content {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// A node in the content tree: a file or a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentNode {
    File(Content),
    Dir(ContentTree),
}

impl ContentNode {
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    /// Size reported for this node. Directories report zero.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::File(content) => content.len(),
            Self::Dir(_) => 0,
        }
    }
}

impl From<Content> for ContentNode {
    fn from(content: Content) -> Self {
        Self::File(content)
    }
}

impl From<ContentTree> for ContentNode {
    fn from(tree: ContentTree) -> Self {
        Self::Dir(tree)
    }
}

impl From<&str> for ContentNode {
    fn from(text: &str) -> Self {
        Self::File(text.into())
    }
}

impl From<String> for ContentNode {
    fn from(text: String) -> Self {
        Self::File(text.into())
    }
}

impl From<Vec<u8>> for ContentNode {
    fn from(bytes: Vec<u8>) -> Self {
        Self::File(bytes.into())
    }
}

impl From<&[u8]> for ContentNode {
    fn from(bytes: &[u8]) -> Self {
        Self::File(bytes.into())
    }
}

impl<const N: usize> From<&[u8; N]> for ContentNode {
    fn from(bytes: &[u8; N]) -> Self {
        Self::File(bytes.into())
    }
}

impl From<i64> for ContentNode {
    fn from(value: i64) -> Self {
        Self::File(value.into())
    }
}

/// Build a [`ContentTree`] literal.
///
/// Braces open a directory. Any other single token tree is converted into a
/// file node; wrap longer expressions in parentheses.
///
/// ```
/// use sftpmock::content_tree;
///
/// let tree = content_tree! {
///     "a_file.txt" => "content",
///     "data.bin" => (vec![0u8, 1, 2]),
///     "folder" => {
///         "nested.txt" => "more",
///         "empty" => {},
///     },
/// };
/// assert_eq!(tree.len(), 3);
/// ```
#[macro_export]
macro_rules! content_tree {
    (@node { $($inner:tt)* }) => {
        $crate::domain::ContentNode::Dir($crate::content_tree!($($inner)*))
    };
    (@node $value:tt) => {
        $crate::domain::ContentNode::from($value)
    };
    () => {
        $crate::domain::ContentTree::new()
    };
    ($($name:literal => $value:tt),+ $(,)?) => {{
        let mut tree = $crate::domain::ContentTree::new();
        $(
            tree.insert(
                ::std::string::String::from($name),
                $crate::content_tree!(@node $value),
            );
        )+
        tree
    }};
}

/// Build a [`HostContentMap`] literal, one `content_tree!` body per host.
///
/// ```
/// use sftpmock::host_contents;
///
/// let hosts = host_contents! {
///     "sftp.example.com" => { "readme.txt" => "hi" },
///     "backup.example.com" => {},
/// };
/// assert_eq!(hosts.len(), 2);
/// ```
#[macro_export]
macro_rules! host_contents {
    ($($host:literal => { $($tree:tt)* }),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut hosts = $crate::domain::HostContentMap::new();
        $(
            hosts.insert(
                ::std::string::String::from($host),
                $crate::content_tree!($($tree)*),
            );
        )*
        hosts
    }};
}
