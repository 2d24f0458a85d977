//! Hierarchical metadata tree shared by one pipeline run.
//!
//! [`MetadataNode`] is a cheap-to-clone handle onto a shared tree node.
//! Every stage owns a subtree rooted under the table's metadata root,
//! created exactly once during the first prepare pass.

use std::sync::Arc;

use parking_lot::RwLock;

struct NodeInner {
    name: String,
    value: RwLock<String>,
    description: RwLock<String>,
    children: RwLock<Vec<MetadataNode>>,
}

/// A named node in the metadata tree.
///
/// Clones share the same underlying node; mutations through any clone are
/// visible to all of them.
#[derive(Clone)]
pub struct MetadataNode {
    inner: Arc<NodeInner>,
}

impl MetadataNode {
    /// Creates a detached root node with an empty name.
    #[must_use]
    pub fn root() -> Self {
        Self::named("")
    }

    fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                name: name.into(),
                value: RwLock::new(String::new()),
                description: RwLock::new(String::new()),
                children: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the node value.
    #[must_use]
    pub fn value(&self) -> String {
        self.inner.value.read().clone()
    }

    /// Sets the node value.
    pub fn set_value(&self, value: impl ToString) {
        *self.inner.value.write() = value.to_string();
    }

    /// Returns the node description.
    #[must_use]
    pub fn description(&self) -> String {
        self.inner.description.read().clone()
    }

    /// Adds an empty child node and returns its handle.
    pub fn add(&self, name: impl Into<String>) -> MetadataNode {
        let child = Self::named(name);
        self.inner.children.write().push(child.clone());
        child
    }

    /// Adds a child node carrying a value and description.
    pub fn add_value(
        &self,
        name: impl Into<String>,
        value: impl ToString,
        description: impl Into<String>,
    ) -> MetadataNode {
        let child = Self::named(name);
        *child.inner.value.write() = value.to_string();
        *child.inner.description.write() = description.into();
        self.inner.children.write().push(child.clone());
        child
    }

    /// Returns the first direct child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<MetadataNode> {
        self.find_child(|c| c.name() == name)
    }

    /// Returns the first direct child matching the predicate.
    pub fn find_child<P>(&self, predicate: P) -> Option<MetadataNode>
    where
        P: Fn(&MetadataNode) -> bool,
    {
        self.inner.children.read().iter().find(|c| predicate(c)).cloned()
    }

    /// Returns handles to every direct child, in insertion order.
    #[must_use]
    pub fn children(&self) -> Vec<MetadataNode> {
        self.inner.children.read().clone()
    }

    /// Renders the subtree rooted at this node as JSON.
    ///
    /// Leaf nodes render as their value string; interior nodes render as an
    /// object of child name to subtree, with the node's own value under
    /// `"value"` when both are present.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let children = self.inner.children.read();
        if children.is_empty() {
            return serde_json::Value::String(self.value());
        }
        let mut map = serde_json::Map::new();
        let value = self.value();
        if !value.is_empty() {
            map.insert("value".to_string(), serde_json::Value::String(value));
        }
        for child in children.iter() {
            map.insert(child.name().to_string(), child.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl std::fmt::Debug for MetadataNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataNode")
            .field("name", &self.name())
            .field("value", &self.value())
            .field("children", &self.inner.children.read().len())
            .finish()
    }
}
