//! # Change History
//!
//! Undo/redo stacks of [`HistoryEntry`]s.
//!
//! ## Design
//!
//! - Each entry holds the records of one user action, in application order
//! - Undo applies the inverses in reverse order and moves the entry to redo
//! - Redo reapplies the records and moves the entry back
//! - New entries clear the redo stack
//! - Batches group several records into one entry
//! - While suppressed, nothing is recorded (used for replays and previews)
//! - Records arriving while an undo/redo is replaying are held back and
//!   pushed once the replay is over
//!
//! A record whose address no longer resolves is skipped with a warning. An
//! entry that could not be applied completely is dropped rather than moved
//! to the other stack, since replaying it again would not restore the same
//! state.

use crate::change::{ApplyContext, ChangeRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Records that are undone/redone together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The records in this entry (in application order)
    pub changes: Vec<ChangeRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HistoryEntry {
    pub fn single(change: ChangeRecord) -> Self {
        Self {
            changes: vec![change],
            description: None,
        }
    }

    pub fn from_changes(changes: Vec<ChangeRecord>) -> Self {
        Self {
            changes,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Inverse records in reverse order
    pub fn inverse(&self) -> HistoryEntry {
        HistoryEntry {
            changes: self.changes.iter().rev().map(ChangeRecord::inverse).collect(),
            description: self.description.clone(),
        }
    }
}

/// What happened to a recorded change
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Pushed as its own entry
    Pushed(HistoryEntry),
    /// Added to the open batch
    Batched,
    /// Held until the running replay finishes
    Deferred,
    /// Dropped because recording is suppressed
    Suppressed,
}

/// Result of an undo or redo
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    /// Records that were applied, in the order they were applied
    pub applied: HistoryEntry,
    /// Records that did not apply
    pub skipped: usize,
}

impl Replay {
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

#[derive(Debug)]
pub struct ChangeHistory {
    /// Stack of applied entries (most recent last)
    undo_stack: Vec<HistoryEntry>,

    /// Stack of undone entries (most recent last)
    redo_stack: Vec<HistoryEntry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<HistoryEntry>,

    suppress_depth: usize,

    replaying: bool,

    /// Entries recorded during a replay
    deferred: Vec<HistoryEntry>,
}

impl ChangeHistory {
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
            suppress_depth: 0,
            replaying: false,
            deferred: Vec::new(),
        }
    }

    /// Record a change that has already been applied
    pub fn record(&mut self, change: ChangeRecord) -> RecordOutcome {
        if self.suppress_depth > 0 {
            debug!(kind = change.kind(), "History suppressed, not recording");
            return RecordOutcome::Suppressed;
        }

        if self.replaying {
            self.deferred.push(HistoryEntry::single(change));
            return RecordOutcome::Deferred;
        }

        if let Some(batch) = &mut self.current_batch {
            batch.changes.push(change);
            return RecordOutcome::Batched;
        }

        let entry = HistoryEntry::single(change);
        self.push_entry(entry.clone());
        RecordOutcome::Pushed(entry)
    }

    /// Start grouping records into one entry
    ///
    /// An already open batch keeps collecting; nested batches flatten.
    pub fn begin_batch(&mut self, description: Option<String>) {
        if self.current_batch.is_none() {
            self.current_batch = Some(HistoryEntry {
                changes: Vec::new(),
                description,
            });
        }
    }

    /// Close the batch, pushing it if it holds anything
    pub fn end_batch(&mut self) -> Option<HistoryEntry> {
        let batch = self.current_batch.take()?;
        if batch.changes.is_empty() {
            return None;
        }
        self.push_entry(batch.clone());
        Some(batch)
    }

    pub fn is_batching(&self) -> bool {
        self.current_batch.is_some()
    }

    /// Stop recording until the matching [`resume`](Self::resume)
    pub fn suppress(&mut self) {
        self.suppress_depth += 1;
    }

    pub fn resume(&mut self) {
        self.suppress_depth = self.suppress_depth.saturating_sub(1);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth > 0
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // New action invalidates the future
        self.redo_stack.clear();
    }

    /// Undo the most recent entry
    pub fn undo(&mut self, cx: &mut ApplyContext<'_>) -> Option<Replay> {
        let entry = self.undo_stack.pop()?;
        let replay = self.replay(&entry.inverse(), cx);

        if replay.is_complete() {
            self.redo_stack.push(entry);
        } else {
            warn!(skipped = replay.skipped, "Undo was partial, dropping entry");
        }
        self.flush_deferred();
        Some(replay)
    }

    /// Redo the most recently undone entry
    pub fn redo(&mut self, cx: &mut ApplyContext<'_>) -> Option<Replay> {
        let entry = self.redo_stack.pop()?;
        let replay = self.replay(&entry, cx);

        if replay.is_complete() {
            self.undo_stack.push(entry);
        } else {
            warn!(skipped = replay.skipped, "Redo was partial, dropping entry");
        }
        self.flush_deferred();
        Some(replay)
    }

    fn replay(&mut self, entry: &HistoryEntry, cx: &mut ApplyContext<'_>) -> Replay {
        self.replaying = true;
        let mut applied = Vec::with_capacity(entry.changes.len());
        let mut skipped = 0;

        for change in &entry.changes {
            match change.apply(cx) {
                Ok(()) => applied.push(change.clone()),
                Err(e) => {
                    warn!(kind = change.kind(), error = %e, "Skipping change during replay");
                    skipped += 1;
                }
            }
        }

        self.replaying = false;
        Replay {
            applied: HistoryEntry {
                changes: applied,
                description: entry.description.clone(),
            },
            skipped,
        }
    }

    fn flush_deferred(&mut self) {
        for entry in std::mem::take(&mut self.deferred) {
            self.push_entry(entry);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Entry the next undo would revert
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
        self.deferred.clear();
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ContentChange;
    use crate::config::EngineConfig;
    use crate::css::{Breakpoints, StyleSheet};
    use crate::dom::{Document, SerializedNode};
    use crate::path::{NodePath, PathResolver};

    struct Fixture {
        doc: Document,
        sheet: StyleSheet,
        breakpoints: Breakpoints,
        resolver: PathResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let body = SerializedNode::element("body").with_child(SerializedNode::text("Hello"));
            Self {
                doc: Document::from_serialized("index.html", "data-tr-id", &body).unwrap(),
                sheet: StyleSheet::new(),
                breakpoints: Breakpoints::new(&EngineConfig::default().breakpoints),
                resolver: PathResolver::new(),
            }
        }

        fn cx(&mut self) -> ApplyContext<'_> {
            ApplyContext {
                doc: &mut self.doc,
                sheet: &mut self.sheet,
                breakpoints: &self.breakpoints,
                resolver: &self.resolver,
            }
        }

        fn text(&self) -> String {
            let node = self.resolver.resolve_indices(&self.doc, &[0]).unwrap();
            self.doc.text(node).unwrap().to_string()
        }

        /// Edit the text node and return its record
        fn edit(&mut self, text: &str) -> ChangeRecord {
            let node = self.resolver.resolve_indices(&self.doc, &[0]).unwrap();
            let old = self.doc.set_text(node, text).unwrap();
            ChangeRecord::Content(ContentChange {
                path: NodePath::from_indices(vec![0]),
                old_text: old,
                new_text: text.to_string(),
            })
        }
    }

    #[test]
    fn test_history_creation() {
        let history = ChangeHistory::new();
        assert_eq!(history.undo_levels(), 0);
        assert_eq!(history.redo_levels(), 0);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_record_undo_redo() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();

        let record = fx.edit("World");
        assert!(matches!(history.record(record), RecordOutcome::Pushed(_)));

        let replay = history.undo(&mut fx.cx()).unwrap();
        assert!(replay.is_complete());
        assert_eq!(fx.text(), "Hello");
        assert_eq!(history.redo_levels(), 1);

        history.redo(&mut fx.cx()).unwrap();
        assert_eq!(fx.text(), "World");
        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_batched_records() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();

        history.begin_batch(Some("Update greeting".to_string()));
        let r1 = fx.edit("World");
        assert_eq!(history.record(r1), RecordOutcome::Batched);
        let r2 = fx.edit("Everyone!");
        history.record(r2);
        let entry = history.end_batch().unwrap();

        assert_eq!(entry.changes.len(), 2);
        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.undo_description(), Some("Update greeting"));

        history.undo(&mut fx.cx()).unwrap();
        assert_eq!(fx.text(), "Hello");
    }

    #[test]
    fn test_empty_batch_is_not_pushed() {
        let mut history = ChangeHistory::new();
        history.begin_batch(None);
        assert!(history.end_batch().is_none());
        assert_eq!(history.undo_levels(), 0);
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();

        let r = fx.edit("World");
        history.record(r);
        history.undo(&mut fx.cx()).unwrap();
        assert_eq!(history.redo_levels(), 1);

        let r = fx.edit("Everyone");
        history.record(r);
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::with_max_levels(2);
        for i in 0..3 {
            let r = fx.edit(&format!("Text {}", i));
            history.record(r);
        }
        assert_eq!(history.undo_levels(), 2);
    }

    #[test]
    fn test_suppressed_records_are_dropped() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();

        history.suppress();
        history.suppress();
        let r = fx.edit("preview");
        assert_eq!(history.record(r.clone()), RecordOutcome::Suppressed);
        history.resume();
        assert_eq!(history.record(r.clone()), RecordOutcome::Suppressed);
        history.resume();
        assert!(matches!(history.record(r), RecordOutcome::Pushed(_)));
    }

    #[test]
    fn test_records_during_replay_are_deferred() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();
        let first = fx.edit("World");
        history.record(first);

        history.replaying = true;
        let late = fx.edit("Late");
        assert_eq!(history.record(late), RecordOutcome::Deferred);
        assert_eq!(history.undo_levels(), 1);
        history.replaying = false;

        history.flush_deferred();
        assert_eq!(history.undo_levels(), 2);
    }

    #[test]
    fn test_unresolvable_record_is_skipped_and_entry_dropped() {
        let mut fx = Fixture::new();
        let mut history = ChangeHistory::new();

        let good = fx.edit("World");
        let stale = ChangeRecord::Content(ContentChange {
            path: NodePath::from_indices(vec![9]),
            old_text: "a".to_string(),
            new_text: "b".to_string(),
        });
        history.begin_batch(None);
        history.record(stale);
        history.record(good);
        history.end_batch();

        let replay = history.undo(&mut fx.cx()).unwrap();
        assert_eq!(replay.skipped, 1);
        assert_eq!(replay.applied.changes.len(), 1);
        assert_eq!(fx.text(), "Hello");
        assert!(!history.can_redo());
    }
}
