//! # Editor Session
//!
//! One editable document with its stylesheet, history, mirrors and
//! listeners.
//!
//! Every edit follows the same order:
//!
//! 1. resolve the target path (an unresolvable path is logged and skipped)
//! 2. apply to the primary
//! 3. propagate to mirrors (rule edits before the primary's inline cleanup)
//! 4. record in history and notify subscribers
//!
//! Undo and redo replay through the same propagation step and then
//! re-resolve the selection.

use crate::change::{
    AttributeChange, ChangeRecord, ContentChange, DocumentSnapshot, SnapshotChange, StructureChange,
    StyleChange,
};
use crate::config::EngineConfig;
use crate::css::{Breakpoint, Breakpoints, EffectiveValue, StyleSheet};
use crate::dom::{Document, SerializedNode};
use crate::events::{EditorEvent, EventBus, SubscriptionId};
use crate::gesture::StyleGesture;
use crate::history::{ChangeHistory, HistoryEntry, RecordOutcome, Replay};
use crate::mirrors::ViewportMirrorSync;
use crate::path::{NodePath, PathResolver};
use crate::persistence;
use crate::style_engine::StyleRuleEngine;
use crate::validation::{ValidationJob, ValidationWarning};
use crate::EditorError;
use indextree::NodeId;
use tracing::{debug, info, instrument, warn};
use trellis_common::FileStore;

#[derive(Debug)]
pub struct EditorSession {
    config: EngineConfig,
    document: Document,
    engine: StyleRuleEngine,
    history: ChangeHistory,
    mirrors: ViewportMirrorSync,
    resolver: PathResolver,
    events: EventBus,
    selection: Option<NodePath>,
    gesture: Option<StyleGesture>,
}

impl EditorSession {
    /// Open a document; elements without a stable identifier are given one
    pub fn new(
        config: EngineConfig,
        name: &str,
        body: &SerializedNode,
        stylesheet: StyleSheet,
    ) -> Result<Self, EditorError> {
        let mut document = Document::from_serialized(name, config.id_attribute.clone(), body)?;
        let mut body = document.snapshot();
        document.assign_ids(&mut body);
        document.replace_body(&body)?;

        let breakpoints = Breakpoints::new(&config.breakpoints);
        info!(document = name, breakpoints = config.breakpoints.len(), "Opened session");

        Ok(Self {
            engine: StyleRuleEngine::new(stylesheet, breakpoints.clone(), config.selector_prefix.clone()),
            history: ChangeHistory::with_max_levels(config.max_history_levels),
            mirrors: ViewportMirrorSync::new(breakpoints),
            resolver: PathResolver::new(),
            events: EventBus::new(),
            selection: None,
            gesture: None,
            document,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn stylesheet(&self) -> &StyleSheet {
        self.engine.sheet()
    }

    pub fn engine(&self) -> &StyleRuleEngine {
        &self.engine
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        self.engine.breakpoints()
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    pub fn mirrors(&self) -> &ViewportMirrorSync {
        &self.mirrors
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn selection(&self) -> Option<&NodePath> {
        self.selection.as_ref()
    }

    pub fn gesture(&self) -> Option<&StyleGesture> {
        self.gesture.as_ref()
    }

    pub fn resolve(&self, path: &NodePath) -> Option<NodeId> {
        self.resolver.resolve(&self.document, path)
    }

    pub fn path_of(&self, node: NodeId) -> Option<NodePath> {
        self.resolver.compute_path(&self.document, node)
    }

    /// Path of the attached element carrying `stable_id`
    pub fn path_of_id(&self, stable_id: &str) -> Option<NodePath> {
        self.path_of(self.document.find_by_id(stable_id)?)
    }

    /// What the primary shows for `property` at `viewport`
    pub fn effective_value(
        &self,
        path: &NodePath,
        property: &str,
        viewport: &Breakpoint,
    ) -> Option<EffectiveValue> {
        let node = self.resolve(path)?;
        self.engine.effective_value(&self.document, node, property, viewport)
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EditorEvent) + Send + 'static) -> SubscriptionId {
        self.events.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Select a node, or clear the selection with `None`
    ///
    /// Returns false (and leaves the selection alone) if the path does not resolve.
    pub fn select(&mut self, path: Option<NodePath>) -> bool {
        let canonical = match path {
            Some(path) => match self.resolve(&path).and_then(|node| self.path_of(node)) {
                Some(canonical) => Some(canonical),
                None => {
                    warn!(path = %path, "Selection target did not resolve");
                    return false;
                }
            },
            None => None,
        };
        if canonical != self.selection {
            self.selection = canonical.clone();
            self.events.emit(EditorEvent::SelectionChanged(canonical));
        }
        true
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        if self.history.is_replaying() {
            return Err(EditorError::Busy);
        }
        Ok(())
    }

    fn resolve_or_skip(&self, path: &NodePath, operation: &str) -> Option<NodeId> {
        let node = self.resolve(path);
        if node.is_none() {
            warn!(path = %path, operation, "Edit target did not resolve, skipping");
        }
        node
    }

    /// Propagate an applied record and record it
    fn finish(&mut self, record: ChangeRecord) -> Option<ChangeRecord> {
        if record.is_noop() {
            debug!(kind = record.kind(), "Edit changed nothing, not recording");
            return None;
        }
        self.mirrors.propagate(&record, &self.document, self.engine.sheet());
        self.commit(record.clone());
        Some(record)
    }

    fn commit(&mut self, record: ChangeRecord) {
        self.engine.note_touched(&record);
        if let RecordOutcome::Pushed(entry) = self.history.record(record) {
            self.events.emit(EditorEvent::ChangeRecorded(entry));
        }
    }

    /// Set a property through the node's unique rule at the armed breakpoints
    ///
    /// An empty `armed` set edits base.
    #[instrument(skip(self, path, armed), fields(path = %path))]
    pub fn set_style(
        &mut self,
        path: &NodePath,
        property: &str,
        value: &str,
        armed: &[Breakpoint],
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "set_style") else {
            return Ok(None);
        };

        let edit = self
            .engine
            .apply_change(&mut self.document, &self.resolver, node, property, value, armed)?;
        if edit.record().is_noop() {
            debug!(property, "Style edit changed nothing, not recording");
            return Ok(None);
        }

        self.mirrors.propagate(edit.record(), &self.document, self.engine.sheet());
        let record = self
            .engine
            .finish_inline_cleanup(&mut self.document, &self.resolver, edit)?;
        self.commit(record.clone());
        Ok(Some(record))
    }

    /// Set or remove an inline declaration directly
    pub fn set_inline_style(
        &mut self,
        path: &NodePath,
        property: &str,
        value: Option<&str>,
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "set_inline_style") else {
            return Ok(None);
        };
        let old_value = self.document.set_inline_style(node, property, value)?;
        let record = ChangeRecord::Style(StyleChange {
            path: self.path_or(node, path),
            property: property.to_string(),
            old_value,
            new_value: value.map(str::to_string),
        });
        Ok(self.finish(record))
    }

    pub fn set_attribute(
        &mut self,
        path: &NodePath,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "set_attribute") else {
            return Ok(None);
        };
        if name == self.config.id_attribute {
            return Err(EditorError::Tree(format!("{} is managed by the editor", name)));
        }
        let old_value = self.document.set_attribute(node, name, value)?;
        let record = ChangeRecord::Attribute(AttributeChange {
            path: self.path_or(node, path),
            name: name.to_string(),
            old_value,
            new_value: value.map(str::to_string),
        });
        Ok(self.finish(record))
    }

    pub fn set_text(&mut self, path: &NodePath, text: &str) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "set_text") else {
            return Ok(None);
        };
        let old_text = self.document.set_text(node, text)?;
        let record = ChangeRecord::Content(ContentChange {
            path: self.path_or(node, path),
            old_text,
            new_text: text.to_string(),
        });
        Ok(self.finish(record))
    }

    /// Insert a subtree as child `index` of `parent` (past the end appends)
    pub fn insert_node(
        &mut self,
        parent: &NodePath,
        index: usize,
        mut subtree: SerializedNode,
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(parent_id) = self.resolve_or_skip(parent, "insert_node") else {
            return Ok(None);
        };
        self.document.assign_ids(&mut subtree);
        let mut carried = Vec::new();
        subtree.stable_ids(self.document.id_attribute(), &mut carried);
        if let Some(id) = carried.into_iter().find(|id| self.document.find_by_id(id).is_some()) {
            return Err(EditorError::Tree(format!("node {} is already present", id)));
        }

        let index = index.min(self.document.children(parent_id).len());
        let child = self.document.instantiate(&subtree);
        self.document.insert_child(parent_id, index, child)?;

        let record = ChangeRecord::Structure(StructureChange::Add {
            parent: self.path_or(parent_id, parent),
            index,
            subtree,
        });
        Ok(self.finish(record))
    }

    pub fn delete_node(&mut self, path: &NodePath) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "delete_node") else {
            return Ok(None);
        };
        let (parent, index) = self
            .document
            .parent(node)
            .zip(self.document.index_in_parent(node))
            .ok_or_else(|| EditorError::Tree("cannot delete the document root".to_string()))?;
        let parent_path = self
            .path_of(parent)
            .ok_or(EditorError::DetachedNode)?;

        let subtree = self.document.remove(node)?;
        let record = ChangeRecord::Structure(StructureChange::Delete {
            parent: parent_path,
            index,
            subtree,
        });
        let record = self.finish(record);
        self.retarget_selection();
        Ok(record)
    }

    /// Move a node to child `index` of `new_parent`
    ///
    /// `index` counts the destination's children without the moved node.
    pub fn move_node(
        &mut self,
        path: &NodePath,
        new_parent: &NodePath,
        index: usize,
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let Some(node) = self.resolve_or_skip(path, "move_node") else {
            return Ok(None);
        };
        let Some(destination) = self.resolve_or_skip(new_parent, "move_node") else {
            return Ok(None);
        };
        if destination == node || self.document.ancestors(destination).contains(&node) {
            return Err(EditorError::Tree("cannot move a node into itself".to_string()));
        }
        let (from, from_index) = self
            .document
            .parent(node)
            .zip(self.document.index_in_parent(node))
            .ok_or_else(|| EditorError::Tree("cannot move the document root".to_string()))?;
        let from_parent = self.path_of(from).ok_or(EditorError::DetachedNode)?;

        self.document.detach(node)?;
        let to_index = index.min(self.document.children(destination).len());
        self.document.insert_child(destination, to_index, node)?;
        let to_parent = self.path_of(destination).ok_or(EditorError::DetachedNode)?;

        let record = ChangeRecord::Structure(StructureChange::Move {
            node_id: self.document.stable_id(node).map(str::to_string),
            from_parent,
            from_index,
            to_parent,
            to_index,
        });
        let record = self.finish(record);
        self.retarget_selection();
        Ok(record)
    }

    /// Replace body and stylesheet in one recorded step
    pub fn replace_document(
        &mut self,
        body: &SerializedNode,
        stylesheet: StyleSheet,
    ) -> Result<Option<ChangeRecord>, EditorError> {
        self.ensure_idle()?;
        let before = DocumentSnapshot {
            body: self.document.snapshot(),
            stylesheet: self.engine.sheet().clone(),
        };
        let mut body = body.clone();
        self.document.assign_ids(&mut body);
        let record = ChangeRecord::Snapshot(SnapshotChange {
            before: Box::new(before),
            after: Box::new(DocumentSnapshot { body, stylesheet }),
        });

        {
            let mut cx = self.engine.apply_context(&mut self.document, &self.resolver);
            record.apply(&mut cx)?;
        }
        let record = self.finish(record);
        self.retarget_selection();
        Ok(record)
    }

    fn path_or(&self, node: NodeId, fallback: &NodePath) -> NodePath {
        self.path_of(node).unwrap_or_else(|| fallback.clone())
    }

    pub fn begin_batch(&mut self, description: Option<String>) {
        self.history.begin_batch(description);
    }

    /// Close the open batch; subscribers hear about it as one entry
    pub fn end_batch(&mut self) -> Option<HistoryEntry> {
        let entry = self.history.end_batch()?;
        self.events.emit(EditorEvent::ChangeRecorded(entry.clone()));
        Some(entry)
    }

    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Result<Option<Replay>, EditorError> {
        self.replay(true)
    }

    #[instrument(skip(self))]
    pub fn redo(&mut self) -> Result<Option<Replay>, EditorError> {
        self.replay(false)
    }

    fn replay(&mut self, undo: bool) -> Result<Option<Replay>, EditorError> {
        if self.gesture.is_some() {
            return Err(EditorError::Busy);
        }
        if self.history.is_batching() {
            self.end_batch();
        }

        let replay = {
            let mut cx = self.engine.apply_context(&mut self.document, &self.resolver);
            if undo {
                self.history.undo(&mut cx)
            } else {
                self.history.redo(&mut cx)
            }
        };
        let Some(replay) = replay else {
            return Ok(None);
        };

        for change in &replay.applied.changes {
            self.engine.note_touched(change);
            self.mirrors.propagate(change, &self.document, self.engine.sheet());
        }
        self.retarget_selection();

        let event = if undo {
            EditorEvent::Undo(replay.applied.clone())
        } else {
            EditorEvent::Redo(replay.applied.clone())
        };
        self.events.emit(event);
        Ok(Some(replay))
    }

    /// Re-resolve the selection after a structural change
    fn retarget_selection(&mut self) {
        let Some(selected) = self.selection.clone() else {
            return;
        };
        let current = self.resolve(&selected).and_then(|node| self.path_of(node));
        if current.is_none() {
            debug!(path = %selected, "Selected node is gone, clearing selection");
        }
        if current.as_ref() != Some(&selected) {
            self.selection = current.clone();
            self.events.emit(EditorEvent::SelectionChanged(current));
        }
    }

    /// Start a continuous edit of `property` on the node at `path`
    pub fn begin_gesture(
        &mut self,
        path: &NodePath,
        property: &str,
        armed: &[Breakpoint],
    ) -> Result<(), EditorError> {
        self.ensure_idle()?;
        if self.gesture.is_some() {
            return Err(EditorError::Busy);
        }
        let gesture = StyleGesture::begin(&self.document, &self.resolver, path.clone(), property, armed.to_vec())?;
        self.mirrors
            .suppress_during_gesture(true, &self.document, self.engine.sheet());
        self.gesture = Some(gesture);
        Ok(())
    }

    /// Show an intermediate value; nothing is recorded
    pub fn update_gesture(&mut self, value: &str) -> Result<(), EditorError> {
        let gesture = self.gesture.as_mut().ok_or(EditorError::NoGesture)?;
        gesture.update(&mut self.document, &self.resolver, value)
    }

    /// Record the gesture as one edit from its start state to the last frame
    pub fn commit_gesture(&mut self) -> Result<Option<ChangeRecord>, EditorError> {
        let gesture = self.end_gesture()?;
        match gesture.last_value() {
            Some(value) => {
                let value = value.to_string();
                self.set_style(gesture.target(), gesture.property(), &value, gesture.armed())
            }
            None => Ok(None),
        }
    }

    /// Drop the gesture and restore the pre-gesture state
    pub fn cancel_gesture(&mut self) -> Result<(), EditorError> {
        self.end_gesture()?;
        Ok(())
    }

    fn end_gesture(&mut self) -> Result<StyleGesture, EditorError> {
        let gesture = self.gesture.take().ok_or(EditorError::NoGesture)?;
        if let Err(e) = gesture.restore(&mut self.document, &self.resolver) {
            warn!(error = %e, "Could not restore pre-gesture value");
        }
        self.mirrors
            .suppress_during_gesture(false, &self.document, self.engine.sheet());
        Ok(gesture)
    }

    /// Open a mirror for `breakpoint` and load it from the primary
    pub fn activate_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), EditorError> {
        self.mirrors
            .activate_and_load(breakpoint, &self.document, self.engine.sheet())
    }

    /// Open a mirror whose load finishes later with [`finish_breakpoint_load`](Self::finish_breakpoint_load)
    pub fn begin_breakpoint_load(&mut self, breakpoint: Breakpoint) -> Result<(), EditorError> {
        self.mirrors.activate(breakpoint.clone())?;
        self.mirrors
            .begin_load(&breakpoint, &self.document, self.engine.sheet())
    }

    pub fn finish_breakpoint_load(&mut self, breakpoint: &Breakpoint) -> Result<(), EditorError> {
        self.mirrors
            .finish_load(breakpoint, &self.document, self.engine.sheet())
    }

    pub fn deactivate_breakpoint(&mut self, breakpoint: &Breakpoint) -> bool {
        self.mirrors.deactivate(breakpoint)
    }

    /// Merge rule edits since the last save into the durable stylesheet
    ///
    /// On failure nothing in memory changes, so the save can be retried.
    pub fn save_styles(&mut self, store: &mut dyn FileStore, file: &str) -> Result<String, EditorError> {
        match persistence::save_styles(store, file, self.engine.sheet(), self.engine.touched()) {
            Ok(text) => {
                self.engine.clear_touched();
                self.events.emit(EditorEvent::Saved {
                    file: file.to_string(),
                });
                Ok(text)
            }
            Err(e) => {
                warn!(file, error = %e, "Saving styles failed");
                self.events.emit(EditorEvent::PersistenceFailed {
                    file: file.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Snapshot the document for an off-thread validation pass
    pub fn validation_job(&self, store: &dyn FileStore) -> ValidationJob {
        ValidationJob::prepare(&self.document, store, &self.config.validation)
    }

    /// Validate references and apply safe corrections
    ///
    /// Returns the number of corrections applied.
    pub async fn validate(&mut self, store: &dyn FileStore) -> Result<usize, EditorError> {
        let job = self.validation_job(store);
        let warnings = job.run().await?;
        self.apply_validation(warnings)
    }

    /// Report findings and apply the corrections that still fit the document
    ///
    /// A finding is stale when its node is gone or the attribute no longer
    /// holds the value that was checked; stale findings are skipped.
    pub fn apply_validation(&mut self, warnings: Vec<ValidationWarning>) -> Result<usize, EditorError> {
        let owns_batch = !self.history.is_batching();
        if owns_batch {
            self.begin_batch(Some("Validation fixes".to_string()));
        }

        let mut fixed = 0;
        for warning in warnings {
            self.events.emit(EditorEvent::ValidationWarning(warning.clone()));

            let Some(correction) = &warning.correction else {
                warn!(path = %warning.path, kind = ?warning.kind, value = %warning.value, "Reference has no safe substitute");
                continue;
            };
            let current = self
                .resolve(&warning.path)
                .and_then(|node| self.document.attribute(node, &warning.attribute));
            if current != Some(warning.value.as_str()) {
                debug!(path = %warning.path, "Validation finding is stale, skipping");
                continue;
            }
            if self
                .set_attribute(&warning.path, &warning.attribute, Some(correction.as_str()))?
                .is_some()
            {
                fixed += 1;
            }
        }

        if owns_batch {
            self.end_batch();
        }
        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;
    use std::sync::{Arc, Mutex};

    fn session() -> EditorSession {
        let body = SerializedNode::element("body")
            .with_child(
                SerializedNode::element("div")
                    .with_attr("class", "card")
                    .with_attr("data-tr-id", "a")
                    .with_child(SerializedNode::text("first")),
            )
            .with_child(
                SerializedNode::element("div")
                    .with_attr("class", "card")
                    .with_attr("data-tr-id", "b"),
            );
        let sheet = parse_stylesheet(".card { width: 200px; }").unwrap();
        EditorSession::new(EngineConfig::default(), "index.html", &body, sheet).unwrap()
    }

    fn base() -> Breakpoint {
        Breakpoint::base()
    }

    fn width(session: &EditorSession, id: &str) -> Option<String> {
        session
            .effective_value(&NodePath::from_id(id), "width", &base())
            .map(|v| v.value)
    }

    #[test]
    fn test_card_resize_and_undo() {
        let mut session = session();
        let record = session
            .set_style(&NodePath::from_id("a"), "width", "350px", &[base()])
            .unwrap()
            .unwrap();

        assert_eq!(record.kind(), "cssRule");
        assert_eq!(session.history().undo_levels(), 1);
        assert_eq!(width(&session, "a").as_deref(), Some("350px"));
        assert_eq!(width(&session, "b").as_deref(), Some("200px"));

        session.undo().unwrap().unwrap();
        assert_eq!(width(&session, "a").as_deref(), Some("200px"));
        assert_eq!(width(&session, "b").as_deref(), Some("200px"));
        let a = session.document().find_by_id("a").unwrap();
        assert_eq!(session.document().attribute(a, "class"), Some("card"));

        session.redo().unwrap().unwrap();
        assert_eq!(width(&session, "a").as_deref(), Some("350px"));
    }

    #[test]
    fn test_unresolvable_path_is_skipped() {
        let mut session = session();
        let result = session
            .set_attribute(&NodePath::from_id("ghost"), "title", Some("x"))
            .unwrap();
        assert!(result.is_none());
        assert!(!session.history().can_undo());
    }

    #[test]
    fn test_noop_edit_is_not_recorded() {
        let mut session = session();
        session
            .set_attribute(&NodePath::from_id("a"), "title", Some("x"))
            .unwrap();
        let again = session
            .set_attribute(&NodePath::from_id("a"), "title", Some("x"))
            .unwrap();
        assert!(again.is_none());
        assert_eq!(session.history().undo_levels(), 1);
    }

    #[test]
    fn test_undo_of_insert_clears_selection() {
        let mut session = session();
        let record = session
            .insert_node(&NodePath::root(), 9, SerializedNode::element("section"))
            .unwrap()
            .unwrap();
        let ChangeRecord::Structure(StructureChange::Add { index, subtree, .. }) = &record else {
            panic!("expected an add record");
        };
        assert_eq!(*index, 2);
        let id = subtree.attribute("data-tr-id").unwrap().to_string();

        assert!(session.select(Some(NodePath::from_id(id.clone()))));
        session.undo().unwrap();
        assert!(session.selection().is_none());
        assert!(session.document().find_by_id(&id).is_none());
    }

    #[test]
    fn test_insert_refuses_nested_id_already_present() {
        let mut session = session();
        let subtree = SerializedNode::element("section")
            .with_child(SerializedNode::element("span").with_attr("data-tr-id", "a"));
        let result = session.insert_node(&NodePath::root(), 0, subtree);

        assert!(matches!(result, Err(EditorError::Tree(_))));
        assert!(!session.history().can_undo());
        assert_eq!(session.document().children(session.document().root()).len(), 2);
    }

    #[test]
    fn test_duplicate_ids_are_reassigned_on_open() {
        let body = SerializedNode::element("body")
            .with_child(SerializedNode::element("div").with_attr("data-tr-id", "a"))
            .with_child(
                SerializedNode::element("section")
                    .with_child(SerializedNode::element("span").with_attr("data-tr-id", "a")),
            );
        let session =
            EditorSession::new(EngineConfig::default(), "index.html", &body, StyleSheet::new()).unwrap();

        let doc = session.document();
        let first = doc.find_by_id("a").unwrap();
        assert_eq!(doc.index_in_parent(first), Some(0));
        let carrying_a = doc
            .elements()
            .filter(|(_, e)| e.attributes.get("data-tr-id").map(String::as_str) == Some("a"))
            .count();
        assert_eq!(carrying_a, 1);
    }

    #[test]
    fn test_move_into_own_descendant_is_rejected() {
        let mut session = session();
        let result = session.move_node(&NodePath::root(), &NodePath::from_id("a"), 0);
        assert!(result.is_err());

        let inner = session
            .insert_node(&NodePath::from_id("a"), 0, SerializedNode::element("span"))
            .unwrap()
            .unwrap();
        let ChangeRecord::Structure(StructureChange::Add { subtree, .. }) = inner else {
            panic!("expected an add record");
        };
        let span = NodePath::from_id(subtree.attribute("data-tr-id").unwrap());
        assert!(matches!(
            session.move_node(&NodePath::from_id("a"), &span, 0),
            Err(EditorError::Tree(_))
        ));
    }

    #[test]
    fn test_move_and_undo() {
        let mut session = session();
        session
            .move_node(&NodePath::from_id("b"), &NodePath::root(), 0)
            .unwrap()
            .unwrap();
        let root = session.document().root();
        let order: Vec<_> = session
            .document()
            .children(root)
            .into_iter()
            .map(|n| session.document().stable_id(n).unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);

        session.undo().unwrap().unwrap();
        let a = session.document().find_by_id("a").unwrap();
        assert_eq!(session.document().index_in_parent(a), Some(0));
    }

    #[test]
    fn test_gesture_records_once() {
        let mut session = session();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        session.subscribe(move |e| {
            if matches!(e, EditorEvent::ChangeRecorded(_)) {
                *counter.lock().unwrap() += 1;
            }
        });

        let a = NodePath::from_id("a");
        session.begin_gesture(&a, "width", &[]).unwrap();
        for px in 0..50 {
            session.update_gesture(&format!("{}px", 200 + px * 3)).unwrap();
        }
        assert!(session.undo().is_err());
        session.commit_gesture().unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(session.history().undo_levels(), 1);
        assert_eq!(width(&session, "a").as_deref(), Some("347px"));
        let node = session.resolve(&a).unwrap();
        assert_eq!(session.document().inline_style(node, "width"), None);
    }

    #[test]
    fn test_cancelled_gesture_leaves_no_trace() {
        let mut session = session();
        let a = NodePath::from_id("a");
        session.begin_gesture(&a, "width", &[]).unwrap();
        session.update_gesture("999px").unwrap();
        session.cancel_gesture().unwrap();

        assert!(!session.history().can_undo());
        assert_eq!(width(&session, "a").as_deref(), Some("200px"));
        assert!(matches!(session.cancel_gesture(), Err(EditorError::NoGesture)));
    }

    #[test]
    fn test_batch_is_one_entry() {
        let mut session = session();
        session.begin_batch(Some("Rename".to_string()));
        session.set_attribute(&NodePath::from_id("a"), "title", Some("x")).unwrap();
        session.set_attribute(&NodePath::from_id("b"), "title", Some("y")).unwrap();
        let entry = session.end_batch().unwrap();

        assert_eq!(entry.changes.len(), 2);
        assert_eq!(session.history().undo_description(), Some("Rename"));
        session.undo().unwrap();
        let b = session.document().find_by_id("b").unwrap();
        assert_eq!(session.document().attribute(b, "title"), None);
    }
}
