//! # Document Tree
//!
//! Mutable, ordered, attributed tree backed by an `indextree` arena.
//!
//! `NodeId` handles are live references: they are only valid until the
//! next structural edit and are never stored in history. Anything that
//! must survive across edits is addressed with a [`NodePath`](crate::NodePath)
//! instead, or carried as a [`SerializedNode`].

use crate::css::Declarations;
use crate::ids::IdGenerator;
use crate::EditorError;
use indextree::{Arena, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Payload of one arena node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementData {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Inline style declarations (always win the cascade)
    pub style: Declarations,
}

impl ElementData {
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

/// Owned, position-independent form of a subtree
///
/// This is what structure records and snapshots carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SerializedNode {
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Declarations::is_empty")]
        style: Declarations,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SerializedNode>,
    },
    Text {
        content: String,
    },
}

impl SerializedNode {
    pub fn element(tag: impl Into<String>) -> Self {
        SerializedNode::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            style: Declarations::default(),
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        SerializedNode::Text {
            content: content.into(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let SerializedNode::Element {
            ref mut attributes, ..
        } = self
        {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        if let SerializedNode::Element { ref mut style, .. } = self {
            style.set(property, value);
        }
        self
    }

    /// Stable identifiers carried by this subtree, in document order
    pub fn stable_ids<'a>(&'a self, id_attribute: &str, out: &mut Vec<&'a str>) {
        if let SerializedNode::Element {
            attributes,
            children,
            ..
        } = self
        {
            if let Some(id) = attributes.get(id_attribute) {
                out.push(id);
            }
            for child in children {
                child.stable_ids(id_attribute, out);
            }
        }
    }

    pub fn with_child(mut self, child: SerializedNode) -> Self {
        if let SerializedNode::Element {
            ref mut children, ..
        } = self
        {
            children.push(child);
        }
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            SerializedNode::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            SerializedNode::Text { .. } => None,
        }
    }
}

/// Editable document tree
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    arena: Arena<NodeKind>,
    root: NodeId,
    ids: IdGenerator,
    id_attribute: String,
    /// Stable identifier to node, for every live element carrying one
    by_id: HashMap<String, NodeId>,
}

impl Document {
    /// Create an empty document with a `body` root
    pub fn new(name: impl Into<String>, id_attribute: impl Into<String>) -> Self {
        let name = name.into();
        let mut arena = Arena::new();
        let root = arena.new_node(NodeKind::Element(ElementData {
            tag: "body".to_string(),
            ..ElementData::default()
        }));

        Self {
            ids: IdGenerator::new(&name),
            name,
            arena,
            root,
            id_attribute: id_attribute.into(),
            by_id: HashMap::new(),
        }
    }

    /// Build a document from a serialized body
    pub fn from_serialized(
        name: impl Into<String>,
        id_attribute: impl Into<String>,
        body: &SerializedNode,
    ) -> Result<Self, EditorError> {
        let mut doc = Self::new(name, id_attribute);
        doc.replace_body(body)?;
        Ok(doc)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Whether the handle still refers to a node of this arena
    fn is_live(&self, id: NodeId) -> bool {
        self.arena.get(id).map(|n| !n.is_removed()).unwrap_or(false)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeKind> {
        self.arena
            .get(id)
            .filter(|n| !n.is_removed())
            .map(|n| n.get())
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.get(id)? {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, EditorError> {
        match self.arena.get_mut(id).filter(|n| !n.is_removed()).map(|n| n.get_mut()) {
            Some(NodeKind::Element(data)) => Ok(data),
            Some(NodeKind::Text(_)) => Err(EditorError::Tree("node is not an element".to_string())),
            None => Err(EditorError::DetachedNode),
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.get(id)? {
            NodeKind::Text(content) => Some(content),
            NodeKind::Element(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).filter(|n| !n.is_removed())?.parent()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if !self.is_live(id) {
            return Vec::new();
        }
        id.children(&self.arena).collect()
    }

    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        if !self.is_live(parent) {
            return None;
        }
        parent.children(&self.arena).nth(index)
    }

    /// Position of a node among its siblings
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        parent.children(&self.arena).position(|c| c == id)
    }

    /// Ancestors of a node, nearest first, excluding the node itself
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        if !self.is_live(id) {
            return Vec::new();
        }
        id.ancestors(&self.arena).skip(1).collect()
    }

    /// Whether a node is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_live(id) && id.ancestors(&self.arena).last() == Some(self.root)
    }

    /// All nodes reachable from the root, in document order
    pub fn descendants(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.root.descendants(&self.arena)
    }

    /// All attached elements in document order
    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &ElementData)> + '_ {
        self.descendants()
            .filter_map(move |id| self.element(id).map(|data| (id, data)))
    }

    /// Find an attached element by its stable identifier
    pub fn find_by_id(&self, stable_id: &str) -> Option<NodeId> {
        self.by_id
            .get(stable_id)
            .copied()
            .filter(|id| self.is_attached(*id))
    }

    fn unindex(&mut self, stable_id: &str, node: NodeId) {
        if self.by_id.get(stable_id) == Some(&node) {
            self.by_id.remove(stable_id);
        }
    }

    pub fn stable_id(&self, id: NodeId) -> Option<&str> {
        self.attribute(id, &self.id_attribute)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attributes.get(name).map(String::as_str)
    }

    /// Set or remove an attribute, returning the previous value
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<String>, EditorError> {
        let element = self.element_mut(id)?;
        let old = match value {
            Some(v) => element.attributes.insert(name.to_string(), v.to_string()),
            None => element.attributes.remove(name),
        };
        if name == self.id_attribute {
            if let Some(previous) = &old {
                self.unindex(previous, id);
            }
            if let Some(v) = value {
                self.by_id.insert(v.to_string(), id);
            }
        }
        Ok(old)
    }

    pub fn inline_style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.element(id)?.style.get(property)
    }

    /// Set or remove an inline style declaration, returning the previous value
    pub fn set_inline_style(
        &mut self,
        id: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> Result<Option<String>, EditorError> {
        let element = self.element_mut(id)?;
        let old = match value {
            Some(v) => element.style.set(property, v),
            None => element.style.remove(property),
        };
        Ok(old)
    }

    /// Replace a text node's content, returning the previous content
    pub fn set_text(&mut self, id: NodeId, content: &str) -> Result<String, EditorError> {
        match self.arena.get_mut(id).filter(|n| !n.is_removed()).map(|n| n.get_mut()) {
            Some(NodeKind::Text(text)) => Ok(std::mem::replace(text, content.to_string())),
            Some(NodeKind::Element(_)) => Err(EditorError::Tree("node is not text".to_string())),
            None => Err(EditorError::DetachedNode),
        }
    }

    /// Create a detached element carrying a fresh stable identifier
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let mut data = ElementData {
            tag: tag.into(),
            ..ElementData::default()
        };
        let stable_id = self.ids.new_id();
        data.attributes
            .insert(self.id_attribute.clone(), stable_id.clone());
        let id = self.arena.new_node(NodeKind::Element(data));
        self.by_id.insert(stable_id, id);
        id
    }

    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.arena.new_node(NodeKind::Text(content.into()))
    }

    /// Give every element of a serialized subtree a unique stable identifier
    ///
    /// Elements lacking one get a fresh identifier, and so does every
    /// repeat of an identifier already seen earlier in the subtree.
    pub fn assign_ids(&mut self, node: &mut SerializedNode) {
        let mut carried = Vec::new();
        node.stable_ids(&self.id_attribute, &mut carried);
        for stable_id in carried {
            self.ids.observe(stable_id);
        }
        let mut seen = HashSet::new();
        self.assign_unique_ids(node, &mut seen);
    }

    fn assign_unique_ids(&mut self, node: &mut SerializedNode, seen: &mut HashSet<String>) {
        if let SerializedNode::Element {
            attributes,
            children,
            ..
        } = node
        {
            let fresh = match attributes.get(&self.id_attribute) {
                Some(stable_id) if seen.contains(stable_id) => {
                    warn!(id = %stable_id, "Reassigning duplicate stable identifier");
                    true
                }
                Some(_) => false,
                None => true,
            };
            if fresh {
                attributes.insert(self.id_attribute.clone(), self.ids.new_id());
            }
            if let Some(stable_id) = attributes.get(&self.id_attribute) {
                seen.insert(stable_id.clone());
            }
            for child in children {
                self.assign_unique_ids(child, seen);
            }
        }
    }

    /// Materialize a serialized subtree as a detached node
    pub fn instantiate(&mut self, node: &SerializedNode) -> NodeId {
        match node {
            SerializedNode::Text { content } => self.create_text(content.clone()),
            SerializedNode::Element {
                tag,
                attributes,
                style,
                children,
            } => {
                let id = self.arena.new_node(NodeKind::Element(ElementData {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    style: style.clone(),
                }));
                if let Some(stable_id) = attributes.get(&self.id_attribute) {
                    self.ids.observe(stable_id);
                    self.by_id.insert(stable_id.clone(), id);
                }
                for child in children {
                    let child_id = self.instantiate(child);
                    id.append(child_id, &mut self.arena);
                }
                id
            }
        }
    }

    /// Insert a detached node as the `index`-th child of `parent`
    ///
    /// An index past the end appends.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), EditorError> {
        if !self.is_live(parent) {
            return Err(EditorError::DetachedNode);
        }
        if self.element(parent).is_none() {
            return Err(EditorError::Tree("text nodes cannot have children".to_string()));
        }

        match self.child_at(parent, index) {
            Some(sibling) => sibling.checked_insert_before(child, &mut self.arena)?,
            None => parent.checked_append(child, &mut self.arena)?,
        }
        Ok(())
    }

    /// Unlink a node (and its subtree) from its parent without freeing it
    pub fn detach(&mut self, id: NodeId) -> Result<(), EditorError> {
        if !self.is_live(id) {
            return Err(EditorError::DetachedNode);
        }
        if id == self.root {
            return Err(EditorError::Tree("cannot detach the document root".to_string()));
        }
        id.detach(&mut self.arena);
        Ok(())
    }

    /// Remove a node and its subtree, returning its serialized form
    pub fn remove(&mut self, id: NodeId) -> Result<SerializedNode, EditorError> {
        if id == self.root {
            return Err(EditorError::Tree("cannot remove the document root".to_string()));
        }
        let serialized = self.serialize(id).ok_or(EditorError::DetachedNode)?;
        let mut removed = Vec::new();
        serialized.stable_ids(&self.id_attribute, &mut removed);
        let removed: Vec<String> = removed.into_iter().map(str::to_string).collect();
        let nodes: Vec<NodeId> = id.descendants(&self.arena).collect();
        for stable_id in &removed {
            if let Some(node) = self.by_id.get(stable_id).copied() {
                if nodes.contains(&node) {
                    self.by_id.remove(stable_id);
                }
            }
        }
        id.remove_subtree(&mut self.arena);
        Ok(serialized)
    }

    pub fn serialize(&self, id: NodeId) -> Option<SerializedNode> {
        match self.get(id)? {
            NodeKind::Text(content) => Some(SerializedNode::text(content.clone())),
            NodeKind::Element(data) => Some(SerializedNode::Element {
                tag: data.tag.clone(),
                attributes: data.attributes.clone(),
                style: data.style.clone(),
                children: id
                    .children(&self.arena)
                    .filter_map(|c| self.serialize(c))
                    .collect(),
            }),
        }
    }

    /// Serialized form of the whole body
    pub fn snapshot(&self) -> SerializedNode {
        self.serialize(self.root)
            .unwrap_or_else(|| SerializedNode::element("body"))
    }

    /// Replace the whole body with a serialized one
    ///
    /// Every outstanding `NodeId` becomes invalid.
    pub fn replace_body(&mut self, body: &SerializedNode) -> Result<(), EditorError> {
        if !matches!(body, SerializedNode::Element { .. }) {
            return Err(EditorError::Tree("document body must be an element".to_string()));
        }
        self.arena = Arena::new();
        self.by_id.clear();
        self.root = self.instantiate(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SerializedNode {
        SerializedNode::element("body")
            .with_child(
                SerializedNode::element("div")
                    .with_attr("class", "card")
                    .with_attr("data-tr-id", "a")
                    .with_child(SerializedNode::text("Hello")),
            )
            .with_child(
                SerializedNode::element("div")
                    .with_attr("class", "card wide")
                    .with_attr("data-tr-id", "b"),
            )
    }

    #[test]
    fn test_round_trip_snapshot() {
        let doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        assert_eq!(doc.snapshot(), sample());
    }

    #[test]
    fn test_find_by_id_and_classes() {
        let doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        let b = doc.find_by_id("b").unwrap();
        let element = doc.element(b).unwrap();
        assert!(element.has_class("wide"));
        assert_eq!(element.classes().collect::<Vec<_>>(), vec!["card", "wide"]);
        assert!(doc.find_by_id("missing").is_none());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        let root = doc.root();
        let span = doc.create_element("span");
        doc.insert_child(root, 1, span).unwrap();

        assert_eq!(doc.index_in_parent(span), Some(1));
        assert_eq!(doc.children(root).len(), 3);
        assert!(doc.is_attached(span));

        let removed = doc.remove(span).unwrap();
        assert!(matches!(removed, SerializedNode::Element { ref tag, .. } if tag == "span"));
        assert!(!doc.is_attached(span));
        assert!(doc.get(span).is_none());
        assert_eq!(doc.snapshot(), sample());
    }

    #[test]
    fn test_detached_node_is_not_attached() {
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        let a = doc.find_by_id("a").unwrap();
        doc.detach(a).unwrap();
        assert!(!doc.is_attached(a));
        assert!(doc.find_by_id("a").is_none());
    }

    #[test]
    fn test_text_and_attribute_edits_return_old_values() {
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        let a = doc.find_by_id("a").unwrap();
        let text = doc.children(a)[0];

        assert_eq!(doc.set_text(text, "Bye").unwrap(), "Hello");
        assert_eq!(
            doc.set_attribute(a, "title", Some("hi")).unwrap(),
            None
        );
        assert_eq!(
            doc.set_attribute(a, "title", None).unwrap(),
            Some("hi".to_string())
        );
        assert!(doc.set_text(a, "nope").is_err());
    }

    #[test]
    fn test_created_ids_do_not_collide_with_loaded_ones() {
        let mut gen_doc = Document::new("index.html", "data-tr-id");
        let first = gen_doc.create_element("div");
        let issued = gen_doc.stable_id(first).unwrap().to_string();

        let body = SerializedNode::element("body")
            .with_child(SerializedNode::element("div").with_attr("data-tr-id", issued.clone()));
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &body).unwrap();
        let fresh = doc.create_element("div");
        assert_ne!(doc.stable_id(fresh).unwrap(), issued);
    }

    #[test]
    fn test_id_index_follows_edits() {
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &sample()).unwrap();
        let a = doc.find_by_id("a").unwrap();

        doc.set_attribute(a, "data-tr-id", Some("renamed")).unwrap();
        assert!(doc.find_by_id("a").is_none());
        assert_eq!(doc.find_by_id("renamed"), Some(a));

        let removed = doc.remove(a).unwrap();
        assert!(doc.find_by_id("renamed").is_none());

        let restored = doc.instantiate(&removed);
        let root = doc.root();
        doc.insert_child(root, 0, restored).unwrap();
        assert_eq!(doc.find_by_id("renamed"), Some(restored));
        assert_eq!(doc.find_by_id("b"), doc.child_at(root, 1));
    }

    #[test]
    fn test_assign_ids_replaces_repeated_ones() {
        let mut doc = Document::new("index.html", "data-tr-id");
        let mut body = SerializedNode::element("body").with_child(
            SerializedNode::element("section")
                .with_attr("data-tr-id", "a")
                .with_child(SerializedNode::element("span").with_attr("data-tr-id", "a"))
                .with_child(SerializedNode::element("em")),
        );
        doc.assign_ids(&mut body);

        let mut ids = Vec::new();
        body.stable_ids("data-tr-id", &mut ids);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[1], "a");
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_cannot_remove_root() {
        let mut doc = Document::new("index.html", "data-tr-id");
        let root = doc.root();
        assert!(doc.remove(root).is_err());
        assert!(doc.detach(root).is_err());
    }
}
