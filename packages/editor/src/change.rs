//! # Change Records
//!
//! Reversible descriptions of one edit each.
//!
//! ## Design
//!
//! - Records address nodes by [`NodePath`], never by live handle, so they
//!   stay meaningful after unrelated structural edits.
//! - Removed subtrees travel as [`SerializedNode`]s so they can be rebuilt.
//! - `inverse()` is pure: it swaps old and new state, it never reads the tree.
//! - A rule edit is one record: the class promotion, every touched rule set
//!   and the inline cleanup are undone together.
//!
//! ## Apply order of a rule edit
//!
//! Additive node state first, then the rules, then subtractive node state.
//! Forward that is: add class, write rules, drop inline value. Undo runs the
//! inverse record through the same ordering: restore inline value, restore
//! rules, drop class. Neither direction shows an unstyled intermediate.

use crate::css::{Breakpoint, Breakpoints, Declarations, StyleSheet};
use crate::dom::{Document, SerializedNode};
use crate::path::{NodePath, PathResolver};
use crate::EditorError;
use indextree::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleChange {
    pub path: NodePath,
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeChange {
    pub path: NodePath,
    pub name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    pub path: NodePath,
    pub old_text: String,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StructureChange {
    /// `subtree` was inserted as child `index` of `parent`
    Add {
        parent: NodePath,
        index: usize,
        subtree: SerializedNode,
    },

    /// `subtree` was removed from child `index` of `parent`
    Delete {
        parent: NodePath,
        index: usize,
        subtree: SerializedNode,
    },

    /// A node moved; `to_parent` is addressed as seen after the node left
    #[serde(rename_all = "camelCase")]
    Move {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        from_parent: NodePath,
        from_index: usize,
        to_parent: NodePath,
        to_index: usize,
    },
}

/// Before and after value of one optional string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl ValueChange {
    pub fn new(old: Option<String>, new: Option<String>) -> Self {
        Self { old, new }
    }

    pub fn inverse(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }

    /// New class list keeps every old class
    fn adds_classes(&self) -> bool {
        let new: Vec<&str> = self.new.iter().flat_map(|c| c.split_whitespace()).collect();
        self.old
            .iter()
            .flat_map(|c| c.split_whitespace())
            .all(|c| new.contains(&c))
    }
}

/// A property edit routed through a unique selector's rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssRuleChange {
    pub selector: String,
    pub property: String,

    /// Node the edit was made for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NodePath>,

    /// Whole declaration list of the selector's rule, per breakpoint
    pub before: BTreeMap<Breakpoint, Option<Declarations>>,
    pub after: BTreeMap<Breakpoint, Option<Declarations>>,

    /// `class` attribute change that made the selector unique to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_change: Option<ValueChange>,

    /// Inline value of `property` moved into the rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_change: Option<ValueChange>,
}

impl CssRuleChange {
    pub fn inverse(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            property: self.property.clone(),
            target: self.target.clone(),
            before: self.after.clone(),
            after: self.before.clone(),
            class_change: self.class_change.as_ref().map(ValueChange::inverse),
            inline_change: self.inline_change.as_ref().map(ValueChange::inverse),
        }
    }

    /// Node edits that add state
    pub fn apply_leading(&self, doc: &mut Document, node: NodeId) -> Result<(), EditorError> {
        if let Some(change) = self.class_change.as_ref().filter(|c| c.adds_classes()) {
            doc.set_attribute(node, "class", change.new.as_deref())?;
        }
        if let Some(change) = self.inline_change.as_ref().filter(|c| c.new.is_some()) {
            doc.set_inline_style(node, &self.property, change.new.as_deref())?;
        }
        Ok(())
    }

    /// Node edits that remove state
    pub fn apply_trailing(&self, doc: &mut Document, node: NodeId) -> Result<(), EditorError> {
        if let Some(change) = self.class_change.as_ref().filter(|c| !c.adds_classes()) {
            doc.set_attribute(node, "class", change.new.as_deref())?;
        }
        if self.inline_change.as_ref().is_some_and(|c| c.new.is_none()) {
            doc.set_inline_style(node, &self.property, None)?;
        }
        Ok(())
    }

    /// Install the `after` declaration lists
    pub fn apply_rules(&self, sheet: &mut StyleSheet, breakpoints: &Breakpoints) {
        let mut pending: Vec<(&Breakpoint, &Option<Declarations>)> = self.after.iter().collect();
        pending.sort_by_key(|(bp, _)| breakpoints.rank(bp));
        for (breakpoint, declarations) in pending {
            if !breakpoints.set_rule(sheet, breakpoint, &self.selector, declarations.clone()) {
                warn!(breakpoint = %breakpoint, selector = %self.selector, "Skipping rules for unknown breakpoint");
            }
        }
    }

    /// Breakpoints whose rule changes
    pub fn touched_breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.after
            .iter()
            .filter(|(bp, after)| self.before.get(*bp) != Some(*after))
            .map(|(bp, _)| bp)
    }
}

/// Full document state, for bulk operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub body: SerializedNode,
    pub stylesheet: StyleSheet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChange {
    pub before: Box<DocumentSnapshot>,
    pub after: Box<DocumentSnapshot>,
}

/// One reversible edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "change", rename_all = "camelCase")]
pub enum ChangeRecord {
    /// Inline style declaration
    Style(StyleChange),
    Attribute(AttributeChange),
    /// Text node content
    Content(ContentChange),
    Structure(StructureChange),
    CssRule(CssRuleChange),
    /// Whole-document replacement
    Snapshot(SnapshotChange),
}

/// Everything a record may touch
pub struct ApplyContext<'a> {
    pub doc: &'a mut Document,
    pub sheet: &'a mut StyleSheet,
    pub breakpoints: &'a Breakpoints,
    pub resolver: &'a PathResolver,
}

impl ChangeRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeRecord::Style(_) => "style",
            ChangeRecord::Attribute(_) => "attribute",
            ChangeRecord::Content(_) => "content",
            ChangeRecord::Structure(_) => "structure",
            ChangeRecord::CssRule(_) => "cssRule",
            ChangeRecord::Snapshot(_) => "snapshot",
        }
    }

    /// Node the record is about, where there is one
    pub fn target(&self) -> Option<&NodePath> {
        match self {
            ChangeRecord::Style(c) => Some(&c.path),
            ChangeRecord::Attribute(c) => Some(&c.path),
            ChangeRecord::Content(c) => Some(&c.path),
            ChangeRecord::Structure(StructureChange::Add { parent, .. })
            | ChangeRecord::Structure(StructureChange::Delete { parent, .. }) => Some(parent),
            ChangeRecord::Structure(StructureChange::Move { to_parent, .. }) => Some(to_parent),
            ChangeRecord::CssRule(c) => c.target.as_ref(),
            ChangeRecord::Snapshot(_) => None,
        }
    }

    /// Whether the record rearranges the tree
    pub fn is_structural(&self) -> bool {
        matches!(self, ChangeRecord::Structure(_) | ChangeRecord::Snapshot(_))
    }

    /// Whether applying the record changes nothing
    pub fn is_noop(&self) -> bool {
        match self {
            ChangeRecord::Style(c) => c.old_value == c.new_value,
            ChangeRecord::Attribute(c) => c.old_value == c.new_value,
            ChangeRecord::Content(c) => c.old_text == c.new_text,
            ChangeRecord::Structure(_) => false,
            ChangeRecord::CssRule(c) => {
                c.before == c.after && c.class_change.is_none() && c.inline_change.is_none()
            }
            ChangeRecord::Snapshot(c) => c.before == c.after,
        }
    }

    pub fn inverse(&self) -> ChangeRecord {
        match self {
            ChangeRecord::Style(c) => ChangeRecord::Style(StyleChange {
                path: c.path.clone(),
                property: c.property.clone(),
                old_value: c.new_value.clone(),
                new_value: c.old_value.clone(),
            }),
            ChangeRecord::Attribute(c) => ChangeRecord::Attribute(AttributeChange {
                path: c.path.clone(),
                name: c.name.clone(),
                old_value: c.new_value.clone(),
                new_value: c.old_value.clone(),
            }),
            ChangeRecord::Content(c) => ChangeRecord::Content(ContentChange {
                path: c.path.clone(),
                old_text: c.new_text.clone(),
                new_text: c.old_text.clone(),
            }),
            ChangeRecord::Structure(c) => ChangeRecord::Structure(c.inverse()),
            ChangeRecord::CssRule(c) => ChangeRecord::CssRule(c.inverse()),
            ChangeRecord::Snapshot(c) => ChangeRecord::Snapshot(SnapshotChange {
                before: c.after.clone(),
                after: c.before.clone(),
            }),
        }
    }

    /// Apply the record's `new` side
    pub fn apply(&self, cx: &mut ApplyContext<'_>) -> Result<(), EditorError> {
        match self {
            ChangeRecord::CssRule(change) => {
                let node = change
                    .target
                    .as_ref()
                    .and_then(|path| cx.resolver.resolve(cx.doc, path));
                if let (Some(path), None) = (&change.target, node) {
                    warn!(path = %path, selector = %change.selector, "Rule edit target did not resolve, applying rules only");
                }

                if let Some(node) = node {
                    change.apply_leading(cx.doc, node)?;
                }
                change.apply_rules(cx.sheet, cx.breakpoints);
                if let Some(node) = node {
                    change.apply_trailing(cx.doc, node)?;
                }
                Ok(())
            }
            ChangeRecord::Snapshot(change) => {
                cx.doc.replace_body(&change.after.body)?;
                *cx.sheet = change.after.stylesheet.clone();
                Ok(())
            }
            _ => self.apply_to_tree(cx.doc, cx.resolver),
        }
    }

    /// Apply a record that only touches the tree
    ///
    /// Rule and snapshot records need the stylesheet and are rejected here.
    pub fn apply_to_tree(&self, doc: &mut Document, resolver: &PathResolver) -> Result<(), EditorError> {
        match self {
            ChangeRecord::Style(c) => {
                let node = resolve(doc, resolver, &c.path)?;
                doc.set_inline_style(node, &c.property, c.new_value.as_deref())?;
            }
            ChangeRecord::Attribute(c) => {
                let node = resolve(doc, resolver, &c.path)?;
                doc.set_attribute(node, &c.name, c.new_value.as_deref())?;
            }
            ChangeRecord::Content(c) => {
                let node = resolve(doc, resolver, &c.path)?;
                doc.set_text(node, &c.new_text)?;
            }
            ChangeRecord::Structure(c) => c.apply(doc, resolver)?,
            ChangeRecord::CssRule(_) | ChangeRecord::Snapshot(_) => {
                return Err(EditorError::Tree(format!(
                    "{} records need the stylesheet",
                    self.kind()
                )))
            }
        }
        Ok(())
    }
}

impl StructureChange {
    pub fn inverse(&self) -> StructureChange {
        match self {
            StructureChange::Add {
                parent,
                index,
                subtree,
            } => StructureChange::Delete {
                parent: parent.clone(),
                index: *index,
                subtree: subtree.clone(),
            },
            StructureChange::Delete {
                parent,
                index,
                subtree,
            } => StructureChange::Add {
                parent: parent.clone(),
                index: *index,
                subtree: subtree.clone(),
            },
            StructureChange::Move {
                node_id,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => StructureChange::Move {
                node_id: node_id.clone(),
                from_parent: to_parent.clone(),
                from_index: *to_index,
                to_parent: from_parent.clone(),
                to_index: *from_index,
            },
        }
    }

    fn apply(&self, doc: &mut Document, resolver: &PathResolver) -> Result<(), EditorError> {
        match self {
            StructureChange::Add {
                parent,
                index,
                subtree,
            } => {
                let parent = resolve(doc, resolver, parent)?;
                let mut carried = Vec::new();
                subtree.stable_ids(doc.id_attribute(), &mut carried);
                for (i, id) in carried.iter().enumerate() {
                    if carried[..i].contains(id) || doc.find_by_id(id).is_some() {
                        return Err(EditorError::Tree(format!("node {} is already present", id)));
                    }
                }
                let child = doc.instantiate(subtree);
                doc.insert_child(parent, *index, child)
            }
            StructureChange::Delete {
                parent,
                index,
                subtree,
            } => {
                let parent_id = resolve(doc, resolver, parent)?;
                let node = locate_child(doc, parent_id, *index, subtree.attribute(doc.id_attribute()))
                    .ok_or_else(|| EditorError::AddressResolution(parent.clone()))?;
                doc.remove(node)?;
                Ok(())
            }
            StructureChange::Move {
                node_id,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => {
                let from = resolve(doc, resolver, from_parent)?;
                let node = locate_child(doc, from, *from_index, node_id.as_deref())
                    .ok_or_else(|| EditorError::AddressResolution(from_parent.clone()))?;
                let origin = doc.parent(node).zip(doc.index_in_parent(node));

                doc.detach(node)?;
                match resolver.resolve(doc, to_parent) {
                    Some(destination) => doc.insert_child(destination, *to_index, node),
                    None => {
                        // Put it back where it was
                        if let Some((parent, index)) = origin {
                            doc.insert_child(parent, index, node)?;
                        }
                        Err(EditorError::AddressResolution(to_parent.clone()))
                    }
                }
            }
        }
    }
}

fn resolve(doc: &Document, resolver: &PathResolver, path: &NodePath) -> Result<NodeId, EditorError> {
    resolver
        .resolve(doc, path)
        .ok_or_else(|| EditorError::AddressResolution(path.clone()))
}

/// A child by stable id when known, otherwise by position
fn locate_child(doc: &Document, parent: NodeId, index: usize, stable_id: Option<&str>) -> Option<NodeId> {
    match stable_id {
        Some(id) => doc.find_by_id(id),
        None => doc.child_at(parent, index),
    }
}
