//! # Viewport Mirrors
//!
//! One secondary document per active breakpoint, kept identical to the
//! primary by replaying its change records.
//!
//! ## Lifecycle
//!
//! ```text
//! activate ─▶ Uninitialized ─▶ begin_load ─▶ Loading ─▶ finish_load ─▶ Synced
//!                                   (records queued)               │   ▲
//!                                                      gesture start ▼   │ gesture end
//!                                                               Desynced ─┘ (full resync)
//! ```
//!
//! A mirror is only ever mutated through [`ViewportMirrorSync::propagate`]
//! or a full resync. Records are dispatched by variant:
//!
//! | record      | mirror action                                     |
//! |-------------|---------------------------------------------------|
//! | style, attribute, content, structure | same forward edit at the resolved path |
//! | cssRule     | class/inline node edits plus the primary's rules wholesale |
//! | snapshot    | install body and stylesheet                       |
//!
//! Any record that fails to apply triggers a resync from the primary.

use crate::change::{ChangeRecord, DocumentSnapshot};
use crate::css::{effective_value, Breakpoint, Breakpoints, EffectiveValue, StyleSheet};
use crate::dom::Document;
use crate::path::{NodePath, PathResolver};
use crate::EditorError;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Uninitialized,
    Loading,
    Synced,
    /// Behind the primary until the running gesture ends
    Desynced,
}

/// Render target for one breakpoint
#[derive(Debug, Clone)]
pub struct Mirror {
    breakpoint: Breakpoint,
    document: Option<Document>,
    stylesheet: StyleSheet,
    state: MirrorState,

    /// Primary state captured when loading began
    pending_load: Option<DocumentSnapshot>,

    /// Records that arrived while loading
    queued: Vec<ChangeRecord>,
}

impl Mirror {
    fn new(breakpoint: Breakpoint) -> Self {
        Self {
            breakpoint,
            document: None,
            stylesheet: StyleSheet::default(),
            state: MirrorState::Uninitialized,
            pending_load: None,
            queued: Vec::new(),
        }
    }

    pub fn breakpoint(&self) -> &Breakpoint {
        &self.breakpoint
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    /// The mirror's tree, once loaded
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn stylesheet(&self) -> &StyleSheet {
        &self.stylesheet
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// What this mirror renders for `property` on the node at `path`
    pub fn effective_value(
        &self,
        breakpoints: &Breakpoints,
        resolver: &PathResolver,
        path: &NodePath,
        property: &str,
    ) -> Option<EffectiveValue> {
        let doc = self.document.as_ref()?;
        let node = resolver.resolve(doc, path)?;
        effective_value(&self.stylesheet, breakpoints, doc, node, property, &self.breakpoint, true)
    }

    fn install(&mut self, template: &Document, snapshot: &DocumentSnapshot) -> Result<(), EditorError> {
        let document = Document::from_serialized(template.name(), template.id_attribute(), &snapshot.body)?;
        self.document = Some(document);
        self.stylesheet = snapshot.stylesheet.clone();
        Ok(())
    }

    fn apply(&mut self, record: &ChangeRecord, primary_sheet: &StyleSheet, resolver: &PathResolver) -> Result<(), EditorError> {
        let doc = self
            .document
            .as_mut()
            .ok_or_else(|| EditorError::Tree("mirror has no document".to_string()))?;

        match record {
            ChangeRecord::CssRule(change) => {
                let node = change.target.as_ref().and_then(|path| resolver.resolve(doc, path));
                if let Some(node) = node {
                    change.apply_leading(doc, node)?;
                }
                self.stylesheet = primary_sheet.clone();
                if let Some(node) = node {
                    change.apply_trailing(doc, node)?;
                }
            }
            ChangeRecord::Snapshot(change) => {
                doc.replace_body(&change.after.body)?;
                self.stylesheet = change.after.stylesheet.clone();
            }
            _ => record.apply_to_tree(doc, resolver)?,
        }
        Ok(())
    }
}

/// Owner of every mirror
#[derive(Debug)]
pub struct ViewportMirrorSync {
    mirrors: Vec<Mirror>,
    breakpoints: Breakpoints,
    resolver: PathResolver,
    gesture_active: bool,
    resyncs: usize,
}

impl ViewportMirrorSync {
    pub fn new(breakpoints: Breakpoints) -> Self {
        Self {
            mirrors: Vec::new(),
            breakpoints,
            resolver: PathResolver::new(),
            gesture_active: false,
            resyncs: 0,
        }
    }

    pub fn mirror(&self, breakpoint: &Breakpoint) -> Option<&Mirror> {
        self.mirrors.iter().find(|m| &m.breakpoint == breakpoint)
    }

    pub fn mirrors(&self) -> impl Iterator<Item = &Mirror> {
        self.mirrors.iter()
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture_active
    }

    /// Full resyncs performed so far
    pub fn resync_count(&self) -> usize {
        self.resyncs
    }

    fn mirror_mut(&mut self, breakpoint: &Breakpoint) -> Result<&mut Mirror, EditorError> {
        self.mirrors
            .iter_mut()
            .find(|m| &m.breakpoint == breakpoint)
            .ok_or_else(|| EditorError::UnknownBreakpoint(breakpoint.to_string()))
    }

    /// Register a mirror for `breakpoint`; activating twice is a no-op
    pub fn activate(&mut self, breakpoint: Breakpoint) -> Result<(), EditorError> {
        if !self.breakpoints.contains(&breakpoint) {
            return Err(EditorError::UnknownBreakpoint(breakpoint.to_string()));
        }
        if self.mirror(&breakpoint).is_none() {
            debug!(breakpoint = %breakpoint, "Activating mirror");
            self.mirrors.push(Mirror::new(breakpoint));
        }
        Ok(())
    }

    /// Capture the primary state the mirror will load
    pub fn begin_load(
        &mut self,
        breakpoint: &Breakpoint,
        primary: &Document,
        primary_sheet: &StyleSheet,
    ) -> Result<(), EditorError> {
        let mirror = self.mirror_mut(breakpoint)?;
        mirror.pending_load = Some(DocumentSnapshot {
            body: primary.snapshot(),
            stylesheet: primary_sheet.clone(),
        });
        mirror.queued.clear();
        mirror.state = MirrorState::Loading;
        Ok(())
    }

    /// Install the captured state and replay what arrived meanwhile
    pub fn finish_load(
        &mut self,
        breakpoint: &Breakpoint,
        primary: &Document,
        primary_sheet: &StyleSheet,
    ) -> Result<(), EditorError> {
        let resolver = self.resolver.clone();
        let mirror = self.mirror_mut(breakpoint)?;
        if mirror.state != MirrorState::Loading {
            return Err(EditorError::Tree(format!("mirror {} is not loading", breakpoint)));
        }
        let snapshot = mirror.pending_load.take().ok_or_else(|| {
            EditorError::Tree(format!("mirror {} has no pending load", breakpoint))
        })?;
        mirror.install(primary, &snapshot)?;

        let queued = std::mem::take(&mut mirror.queued);
        let mut failed = false;
        for record in &queued {
            if let Err(e) = mirror.apply(record, primary_sheet, &resolver) {
                warn!(breakpoint = %breakpoint, kind = record.kind(), error = %e, "Queued record failed on mirror");
                failed = true;
                break;
            }
        }
        // Rule records carry only the latest sheet, so always end on it
        mirror.stylesheet = primary_sheet.clone();
        mirror.state = MirrorState::Synced;

        if failed {
            self.resync(breakpoint, primary, primary_sheet)?;
        }
        info!(breakpoint = %breakpoint, replayed = queued.len(), "Mirror loaded");
        Ok(())
    }

    /// Activate and load in one step
    pub fn activate_and_load(
        &mut self,
        breakpoint: Breakpoint,
        primary: &Document,
        primary_sheet: &StyleSheet,
    ) -> Result<(), EditorError> {
        self.activate(breakpoint.clone())?;
        if self.mirror(&breakpoint).map(Mirror::state) == Some(MirrorState::Uninitialized) {
            self.begin_load(&breakpoint, primary, primary_sheet)?;
            self.finish_load(&breakpoint, primary, primary_sheet)?;
        }
        Ok(())
    }

    /// Drop a mirror and its tree
    pub fn deactivate(&mut self, breakpoint: &Breakpoint) -> bool {
        let before = self.mirrors.len();
        self.mirrors.retain(|m| &m.breakpoint != breakpoint);
        self.mirrors.len() != before
    }

    /// Replay a record already applied to the primary on every mirror
    ///
    /// For rule records this must run before the primary's inline cleanup.
    #[instrument(skip(self, record, primary, primary_sheet), fields(kind = record.kind(), mirrors = self.mirrors.len()))]
    pub fn propagate(&mut self, record: &ChangeRecord, primary: &Document, primary_sheet: &StyleSheet) {
        let mut stale = Vec::new();

        for mirror in &mut self.mirrors {
            match mirror.state {
                MirrorState::Uninitialized => {}
                MirrorState::Loading => mirror.queued.push(record.clone()),
                MirrorState::Desynced => {
                    debug!(breakpoint = %mirror.breakpoint, "Mirror desynced, deferring to resync");
                }
                MirrorState::Synced if self.gesture_active && record.is_structural() => {
                    debug!(breakpoint = %mirror.breakpoint, "Structural record during gesture, deferring");
                    mirror.state = MirrorState::Desynced;
                }
                MirrorState::Synced => {
                    if let Err(e) = mirror.apply(record, primary_sheet, &self.resolver) {
                        warn!(breakpoint = %mirror.breakpoint, error = %e, "Propagation failed, resyncing mirror");
                        stale.push(mirror.breakpoint.clone());
                    }
                }
            }
        }

        for breakpoint in stale {
            if let Err(e) = self.resync(&breakpoint, primary, primary_sheet) {
                warn!(breakpoint = %breakpoint, error = %e, "Mirror resync failed");
            }
        }
    }

    /// Hold mirrors still while a gesture runs; resync them once when it ends
    pub fn suppress_during_gesture(&mut self, active: bool, primary: &Document, primary_sheet: &StyleSheet) {
        if active == self.gesture_active {
            return;
        }
        self.gesture_active = active;

        if active {
            for mirror in &mut self.mirrors {
                if mirror.state == MirrorState::Synced {
                    mirror.state = MirrorState::Desynced;
                }
            }
            return;
        }

        let desynced: Vec<Breakpoint> = self
            .mirrors
            .iter()
            .filter(|m| m.state == MirrorState::Desynced)
            .map(|m| m.breakpoint.clone())
            .collect();
        for breakpoint in desynced {
            if let Err(e) = self.resync(&breakpoint, primary, primary_sheet) {
                warn!(breakpoint = %breakpoint, error = %e, "Mirror resync failed");
            }
        }
    }

    /// Replace a mirror's state with the primary's
    pub fn resync(
        &mut self,
        breakpoint: &Breakpoint,
        primary: &Document,
        primary_sheet: &StyleSheet,
    ) -> Result<(), EditorError> {
        let snapshot = DocumentSnapshot {
            body: primary.snapshot(),
            stylesheet: primary_sheet.clone(),
        };
        let mirror = self.mirror_mut(breakpoint)?;
        mirror.install(primary, &snapshot)?;
        mirror.queued.clear();
        mirror.pending_load = None;
        mirror.state = MirrorState::Synced;
        self.resyncs += 1;
        debug!(breakpoint = %breakpoint, "Mirror resynced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{AttributeChange, StructureChange};
    use crate::config::EngineConfig;
    use crate::dom::SerializedNode;

    fn primary() -> Document {
        let body = SerializedNode::element("body")
            .with_child(SerializedNode::element("div").with_attr("data-tr-id", "a"))
            .with_child(SerializedNode::element("div").with_attr("data-tr-id", "b"));
        Document::from_serialized("index.html", "data-tr-id", &body).unwrap()
    }

    fn sync() -> ViewportMirrorSync {
        ViewportMirrorSync::new(Breakpoints::new(&EngineConfig::default().breakpoints))
    }

    fn set_title(doc: &mut Document, id: &str, title: &str) -> ChangeRecord {
        let resolver = PathResolver::new();
        let node = doc.find_by_id(id).unwrap();
        let old = doc.set_attribute(node, "title", Some(title)).unwrap();
        ChangeRecord::Attribute(AttributeChange {
            path: resolver.compute_path(doc, node).unwrap(),
            name: "title".to_string(),
            old_value: old,
            new_value: Some(title.to_string()),
        })
    }

    fn title_in(mirror: &Mirror, id: &str) -> Option<String> {
        let doc = mirror.document()?;
        doc.attribute(doc.find_by_id(id)?, "title").map(str::to_string)
    }

    #[test]
    fn test_propagate_to_synced_mirror() {
        let mut doc = primary();
        let sheet = StyleSheet::new();
        let mut sync = sync();
        let tablet = Breakpoint::named("tablet");
        sync.activate_and_load(tablet.clone(), &doc, &sheet).unwrap();

        let record = set_title(&mut doc, "b", "hello");
        sync.propagate(&record, &doc, &sheet);

        let mirror = sync.mirror(&tablet).unwrap();
        assert_eq!(mirror.state(), MirrorState::Synced);
        assert_eq!(title_in(mirror, "b").as_deref(), Some("hello"));
    }

    #[test]
    fn test_records_queue_while_loading() {
        let mut doc = primary();
        let sheet = StyleSheet::new();
        let mut sync = sync();
        let mobile = Breakpoint::named("mobile");

        sync.activate(mobile.clone()).unwrap();
        assert_eq!(sync.mirror(&mobile).unwrap().state(), MirrorState::Uninitialized);
        sync.begin_load(&mobile, &doc, &sheet).unwrap();

        let record = set_title(&mut doc, "a", "queued");
        sync.propagate(&record, &doc, &sheet);
        assert_eq!(sync.mirror(&mobile).unwrap().queued(), 1);

        sync.finish_load(&mobile, &doc, &sheet).unwrap();
        let mirror = sync.mirror(&mobile).unwrap();
        assert_eq!(mirror.state(), MirrorState::Synced);
        assert_eq!(title_in(mirror, "a").as_deref(), Some("queued"));
        assert_eq!(mirror.queued(), 0);
    }

    #[test]
    fn test_gesture_defers_until_one_resync() {
        let mut doc = primary();
        let sheet = StyleSheet::new();
        let mut sync = sync();
        let tablet = Breakpoint::named("tablet");
        sync.activate_and_load(tablet.clone(), &doc, &sheet).unwrap();

        sync.suppress_during_gesture(true, &doc, &sheet);
        assert_eq!(sync.mirror(&tablet).unwrap().state(), MirrorState::Desynced);

        let resolver = PathResolver::new();
        let root = doc.root();
        let b = doc.find_by_id("b").unwrap();
        let subtree = doc.remove(b).unwrap();
        let record = ChangeRecord::Structure(StructureChange::Delete {
            parent: resolver.compute_path(&doc, root).unwrap(),
            index: 1,
            subtree,
        });
        sync.propagate(&record, &doc, &sheet);
        assert!(sync.mirror(&tablet).unwrap().document().unwrap().find_by_id("b").is_some());

        sync.suppress_during_gesture(false, &doc, &sheet);
        let mirror = sync.mirror(&tablet).unwrap();
        assert_eq!(mirror.state(), MirrorState::Synced);
        assert!(mirror.document().unwrap().find_by_id("b").is_none());
        assert_eq!(sync.resync_count(), 1);
    }

    #[test]
    fn test_failed_record_resyncs_mirror() {
        let mut doc = primary();
        let sheet = StyleSheet::new();
        let mut sync = sync();
        let tablet = Breakpoint::named("tablet");
        sync.activate_and_load(tablet.clone(), &doc, &sheet).unwrap();

        let record = set_title(&mut doc, "a", "x");
        // The mirror never saw this node, so the path cannot resolve there
        let ChangeRecord::Attribute(mut change) = record else { unreachable!() };
        change.path = NodePath::from_id("ghost");
        sync.propagate(&ChangeRecord::Attribute(change), &doc, &sheet);

        let mirror = sync.mirror(&tablet).unwrap();
        assert_eq!(sync.resync_count(), 1);
        assert_eq!(title_in(mirror, "a").as_deref(), Some("x"));
    }

    #[test]
    fn test_unknown_breakpoint_and_deactivate() {
        let doc = primary();
        let sheet = StyleSheet::new();
        let mut sync = sync();
        assert!(sync.activate(Breakpoint::named("watch")).is_err());

        let tablet = Breakpoint::named("tablet");
        sync.activate_and_load(tablet.clone(), &doc, &sheet).unwrap();
        assert!(sync.deactivate(&tablet));
        assert!(sync.mirror(&tablet).is_none());
        assert!(!sync.deactivate(&tablet));
    }
}
