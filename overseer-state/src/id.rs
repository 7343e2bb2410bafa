//! Hierarchical identifiers for state items.
//!
//! An identifier is the path from the root of a snapshot to a node: field
//! names, list indices and map keys, each rendered as `/segment`. Two items
//! from different snapshots with equal identifiers occupy the same structural
//! position.
//!
//! Identifiers are assembled in an [`IdTree`] while a snapshot is built. The
//! tree may still be rewritten at that point (see [`IdTree::inject`]), so the
//! rendered strings are only available after [`IdTree::freeze`].

use std::{fmt::Display, sync::Arc};

/// A frozen, cheaply cloneable identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(Arc<str>);

impl Identifier {
    /// The identifier of the root, which has no segments.
    pub fn root() -> Self {
        Identifier(Arc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier(Arc::from(s))
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier(Arc::from(s))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A node handle in an [`IdTree`]. Only meaningful for the tree that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct IdNode {
    parent: Option<NodeId>,
    segment: String,
    /// The segment is a list index and may be replaced by [`IdTree::inject`].
    list_member: bool,
    children: Vec<NodeId>,
}

/// The mutable phase of identifier construction.
pub struct IdTree {
    nodes: Vec<IdNode>,
}

impl Default for IdTree {
    fn default() -> Self {
        Self::new()
    }
}

impl IdTree {
    /// Create a tree containing only the root.
    pub fn new() -> Self {
        IdTree {
            nodes: vec![IdNode {
                parent: None,
                segment: String::new(),
                list_member: false,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Register a new node below `parent`.
    pub fn child(&mut self, parent: NodeId, segment: impl Into<String>) -> NodeId {
        self.push(parent, segment.into(), false)
    }

    /// Register a new node below `parent` for a list element. Its segment may
    /// later be replaced by an identity value.
    pub fn child_by_index(&mut self, parent: NodeId, index: usize) -> NodeId {
        self.push(parent, index.to_string(), true)
    }

    /// Fold an identity value into the identifier of `id`.
    ///
    /// If `id` is a list element, its index segment is replaced and `id` is
    /// returned. Otherwise a new node is inserted directly beneath `id`, all
    /// nodes registered under `id` so far are moved beneath it, and the new
    /// node is returned. Either way, nodes built before the injection render
    /// under the identity value.
    pub fn inject(&mut self, id: NodeId, segment: impl Into<String>) -> NodeId {
        let segment = segment.into();
        let node = &mut self.nodes[id.0];
        if node.list_member {
            node.segment = segment;
            node.list_member = false;
            return id;
        }

        let adopted = std::mem::take(&mut node.children);
        let injected = self.push(id, segment, false);
        for child in &adopted {
            self.nodes[child.0].parent = Some(injected);
        }
        self.nodes[injected.0].children = adopted;
        injected
    }

    /// End the mutable phase and render every identifier.
    pub fn freeze(self) -> FrozenIds {
        let mut rendered: Vec<Option<Identifier>> = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            render(&self.nodes, i, &mut rendered);
        }
        FrozenIds {
            ids: rendered.into_iter().flatten().collect(),
        }
    }

    fn push(&mut self, parent: NodeId, segment: String, list_member: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(IdNode {
            parent: Some(parent),
            segment,
            list_member,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }
}

// Injection can give a node a parent that was registered after it, so render
// on demand instead of in index order.
fn render(nodes: &[IdNode], i: usize, rendered: &mut [Option<Identifier>]) -> Identifier {
    if let Some(id) = &rendered[i] {
        return id.clone();
    }
    let node = &nodes[i];
    let id = match node.parent {
        None => Identifier::from(node.segment.as_str()),
        Some(parent) => {
            let parent = render(nodes, parent.0, rendered);
            Identifier::from(format!("{}/{}", parent, node.segment))
        }
    };
    rendered[i] = Some(id.clone());
    id
}

/// The rendered identifiers of a frozen [`IdTree`].
pub struct FrozenIds {
    ids: Vec<Identifier>,
}

impl FrozenIds {
    pub fn get(&self, id: NodeId) -> &Identifier {
        &self.ids[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_segments() {
        let tree = IdTree::new();
        let root = tree.root();
        let ids = tree.freeze();
        assert_eq!(ids.get(root), &Identifier::root());
        assert_eq!(ids.get(root).as_str(), "");
    }

    #[test]
    fn child_segments() {
        let mut tree = IdTree::new();
        let root = tree.root();
        let a = tree.child(root, "A");
        let a0 = tree.child_by_index(a, 0);
        let key = tree.child(a0, "key");
        let ids = tree.freeze();
        assert_eq!(ids.get(a).as_str(), "/A");
        assert_eq!(ids.get(a0).as_str(), "/A/0");
        assert_eq!(ids.get(key).as_str(), "/A/0/key");
    }

    #[test]
    fn inject_replaces_index() {
        let mut tree = IdTree::new();
        let root = tree.root();
        let rooms = tree.child(root, "Rooms");
        let room = tree.child_by_index(rooms, 1);
        let space = tree.child(room, "Space");
        let room2 = tree.inject(room, "bedroom 1");
        assert_eq!(room, room2);
        let color = tree.child(room2, "Color");
        let ids = tree.freeze();
        assert_eq!(ids.get(room).as_str(), "/Rooms/bedroom 1");
        assert_eq!(ids.get(space).as_str(), "/Rooms/bedroom 1/Space");
        assert_eq!(ids.get(color).as_str(), "/Rooms/bedroom 1/Color");
    }

    #[test]
    fn inject_reparents_descendants() {
        let mut tree = IdTree::new();
        let root = tree.root();
        let house = tree.child(root, "House");
        let space = tree.child(house, "Space");
        let color = tree.child(space, "Color");
        let injected = tree.inject(house, "house A");
        let address = tree.child(injected, "Address");
        let ids = tree.freeze();
        assert_eq!(ids.get(house).as_str(), "/House");
        assert_eq!(ids.get(injected).as_str(), "/House/house A");
        assert_eq!(ids.get(space).as_str(), "/House/house A/Space");
        assert_eq!(ids.get(color).as_str(), "/House/house A/Space/Color");
        assert_eq!(ids.get(address).as_str(), "/House/house A/Address");
    }

    #[test]
    fn inject_at_root() {
        let mut tree = IdTree::new();
        let root = tree.root();
        let value = tree.child(root, "Value");
        let id1 = tree.inject(root, "id1");
        let bool_value = tree.child(id1, "BoolValue");
        let ids = tree.freeze();
        assert_eq!(ids.get(value).as_str(), "/id1/Value");
        assert_eq!(ids.get(bool_value).as_str(), "/id1/BoolValue");
    }

    #[test]
    fn identifiers_from_strings() {
        let a = Identifier::from("room-1");
        let b = Identifier::from(String::from("room-1"));
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "room-1");
        assert_eq!(format!("{:?}", a), "\"room-1\"");
    }
}
