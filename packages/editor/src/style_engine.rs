//! # Style Rule Engine
//!
//! Routes property edits into stylesheet rules owned by exactly one node.
//!
//! ## Edit pipeline
//!
//! ```text
//! ensure_unique_selector ─▶ capture before ─▶ write armed breakpoints
//!         │                                          │
//!         │                                   pin other breakpoints
//!         │                                          │
//!         ▼                                          ▼
//!   class promotion                       confirm ─┬─▶ cssRule record
//!                                                  └─▶ restore, inline record
//! ```
//!
//! Breakpoints that are not armed must look the same after the edit as
//! before it. Where the new rules (or the inline value about to be dropped)
//! would change what such a breakpoint shows, its old value is written
//! explicitly; `unset` stands for "no value".

use crate::change::{ApplyContext, ChangeRecord, CssRuleChange, StyleChange, ValueChange};
use crate::css::{
    diff_declarations, diff_sheets, effective_value, shorthand, Breakpoint,
    Breakpoints, Declaration, Declarations, EffectiveValue, RuleKey, SelectorList, StyleSheet,
    UNSET,
};
use crate::dom::Document;
use crate::path::{NodePath, PathResolver};
use crate::EditorError;
use indextree::NodeId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// A selector that matches exactly one node
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueSelector {
    pub selector: String,

    /// Class attribute edit made to obtain the selector
    pub class_change: Option<ValueChange>,

    /// Whether the selector was derived by the engine rather than authored
    pub synthesized: bool,
}

/// A finished rule edit whose inline cleanup may still be pending
///
/// Mirrors must receive the record before [`StyleRuleEngine::finish_inline_cleanup`]
/// drops the primary's inline value.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleEdit {
    record: ChangeRecord,
    cleanup_pending: bool,
}

impl StyleEdit {
    pub fn record(&self) -> &ChangeRecord {
        &self.record
    }

    pub fn cleanup_pending(&self) -> bool {
        self.cleanup_pending
    }
}

#[derive(Debug)]
pub struct StyleRuleEngine {
    sheet: StyleSheet,
    breakpoints: Breakpoints,
    selector_prefix: String,

    /// Rule keys changed since the last successful save
    touched: BTreeSet<RuleKey>,
}

impl StyleRuleEngine {
    pub fn new(sheet: StyleSheet, breakpoints: Breakpoints, selector_prefix: impl Into<String>) -> Self {
        Self {
            sheet,
            breakpoints,
            selector_prefix: selector_prefix.into(),
            touched: BTreeSet::new(),
        }
    }

    pub fn sheet(&self) -> &StyleSheet {
        &self.sheet
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn touched(&self) -> &BTreeSet<RuleKey> {
        &self.touched
    }

    pub fn clear_touched(&mut self) {
        self.touched.clear();
    }

    /// Context for applying records to `doc` and this engine's sheet
    pub fn apply_context<'a>(
        &'a mut self,
        doc: &'a mut Document,
        resolver: &'a PathResolver,
    ) -> ApplyContext<'a> {
        ApplyContext {
            doc,
            sheet: &mut self.sheet,
            breakpoints: &self.breakpoints,
            resolver,
        }
    }

    /// Winning value for `property` at `viewport`, inline style included
    pub fn effective_value(
        &self,
        doc: &Document,
        node: NodeId,
        property: &str,
        viewport: &Breakpoint,
    ) -> Option<EffectiveValue> {
        effective_value(&self.sheet, &self.breakpoints, doc, node, property, viewport, true)
    }

    fn value_at(
        &self,
        doc: &Document,
        node: NodeId,
        property: &str,
        viewport: &Breakpoint,
        include_inline: bool,
    ) -> Option<String> {
        effective_value(&self.sheet, &self.breakpoints, doc, node, property, viewport, include_inline)
            .map(|v| v.value)
    }

    /// Selector matching only `node`, attaching a synthesized class if needed
    ///
    /// Idempotent: a node that already owns a unique class gets it back and
    /// the document is left untouched. No rule is created here.
    pub fn ensure_unique_selector(
        &self,
        doc: &mut Document,
        node: NodeId,
    ) -> Result<UniqueSelector, EditorError> {
        if !doc.is_attached(node) {
            return Err(EditorError::DetachedNode);
        }
        let element = doc.element(node).ok_or_else(|| {
            EditorError::SelectorConflict("text nodes cannot own a selector".to_string())
        })?;

        let own_class = self.synthesized_class(doc, node);
        let mut candidates: Vec<String> = own_class
            .iter()
            .filter(|c| element.has_class(c))
            .cloned()
            .collect();
        candidates.extend(
            element
                .classes()
                .filter(|c| is_plain_ident(c) && Some(*c) != own_class.as_deref())
                .map(str::to_string),
        );

        for class in candidates {
            if class_count(doc, &class) == 1 {
                return Ok(UniqueSelector {
                    synthesized: Some(&class) == own_class.as_ref(),
                    selector: format!(".{}", class),
                    class_change: None,
                });
            }
        }

        self.promote(doc, node)
    }

    /// Attach a fresh engine-owned class to `node`
    fn promote(&self, doc: &mut Document, node: NodeId) -> Result<UniqueSelector, EditorError> {
        let class = match self.synthesized_class(doc, node) {
            Some(class) if class_count(doc, &class) == 0 => class,
            _ => (1..)
                .map(|n| format!("{}-n{}", self.selector_prefix, n))
                .find(|c| {
                    class_count(doc, c) == 0
                        && !self.sheet.selectors().any(|s| s == format!(".{}", c))
                })
                .ok_or_else(|| EditorError::SelectorConflict("no free class name".to_string()))?,
        };

        let old = doc.attribute(node, "class").map(str::to_string);
        let new = match old.as_deref().map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.clone(),
        };
        doc.set_attribute(node, "class", Some(&new))?;
        debug!(class = %class, "Promoted node to unique selector");

        Ok(UniqueSelector {
            selector: format!(".{}", class),
            class_change: Some(ValueChange::new(old, Some(new))),
            synthesized: true,
        })
    }

    /// `{prefix}-{stable id}`, for nodes that carry an id
    fn synthesized_class(&self, doc: &Document, node: NodeId) -> Option<String> {
        let id = doc.stable_id(node)?;
        let id: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        Some(format!("{}-{}", self.selector_prefix, id))
    }

    /// Set `property` to `value` on `node` at the armed breakpoints
    ///
    /// An empty `armed` set means base. The returned edit still has the
    /// inline cleanup pending; see [`finish_inline_cleanup`](Self::finish_inline_cleanup).
    pub fn apply_change(
        &mut self,
        doc: &mut Document,
        resolver: &PathResolver,
        node: NodeId,
        property: &str,
        value: &str,
        armed: &[Breakpoint],
    ) -> Result<StyleEdit, EditorError> {
        let path = resolver
            .compute_path(doc, node)
            .ok_or(EditorError::DetachedNode)?;
        if doc.element(node).is_none() {
            return Err(EditorError::Tree("only elements can be styled".to_string()));
        }

        let mut armed: Vec<Breakpoint> = if armed.is_empty() {
            vec![Breakpoint::base()]
        } else {
            armed.to_vec()
        };
        if let Some(unknown) = armed.iter().find(|bp| !self.breakpoints.contains(bp)) {
            return Err(EditorError::UnknownBreakpoint(unknown.to_string()));
        }
        armed.sort_by_key(|bp| self.breakpoints.rank(bp));
        armed.dedup();

        if self.inline_blocks_migration(doc, node, property) {
            warn!(property, path = %path, "Inline shorthand overlaps property, editing inline");
            return self.inline_edit(doc, node, path, property, value);
        }

        let old_effective: BTreeMap<Breakpoint, Option<String>> = self
            .breakpoints
            .all()
            .into_iter()
            .map(|bp| {
                let value = self.value_at(doc, node, property, &bp, true);
                (bp, value)
            })
            .collect();
        let old_inline = doc.inline_style(node, property).map(str::to_string);

        let unique = match self.ensure_unique_selector(doc, node) {
            Ok(unique) => unique,
            Err(EditorError::SelectorConflict(reason)) => {
                warn!(reason = %reason, path = %path, "Selector synthesis failed, editing inline");
                return self.inline_edit(doc, node, path, property, value);
            }
            Err(e) => return Err(e),
        };
        let retry = !unique.synthesized;

        let attempt = RuleAttempt {
            node,
            path: &path,
            property,
            value,
            armed: &armed,
            old_effective: &old_effective,
            old_inline: &old_inline,
        };

        if let Some(edit) = self.try_rule_edit(doc, &attempt, unique)? {
            return Ok(edit);
        }
        if retry {
            // The authored class lost the cascade; an engine-owned one sorts last
            let forced = self.promote(doc, node)?;
            if let Some(edit) = self.try_rule_edit(doc, &attempt, forced)? {
                return Ok(edit);
            }
        }

        warn!(property, path = %path, "Rule value cannot win the cascade, editing inline");
        self.inline_edit(doc, node, path, property, value)
    }

    fn try_rule_edit(
        &mut self,
        doc: &mut Document,
        attempt: &RuleAttempt<'_>,
        unique: UniqueSelector,
    ) -> Result<Option<StyleEdit>, EditorError> {
        let selector = unique.selector.clone();
        let before = self.capture(&selector);

        for bp in attempt.armed {
            self.write(bp, &selector, attempt.property, attempt.value)?;
        }

        // Pin breakpoints that would otherwise change, in cascade order
        for bp in self.breakpoints.all() {
            if attempt.armed.contains(&bp) {
                continue;
            }
            let was = attempt.old_effective.get(&bp).cloned().flatten();
            let now = self.value_at(doc, attempt.node, attempt.property, &bp, false);
            if now != was {
                let pinned = was.as_deref().unwrap_or(UNSET);
                debug!(breakpoint = %bp, value = pinned, "Pinning pre-edit value");
                self.write(&bp, &selector, attempt.property, pinned)?;
            }
        }

        if !self.confirm(doc, attempt) {
            self.restore(&selector, &before);
            if let Some(change) = &unique.class_change {
                doc.set_attribute(attempt.node, "class", change.old.as_deref())?;
            }
            debug!(selector = %selector, "Rule edit did not take effect, rolled back");
            return Ok(None);
        }

        let after = self.capture(&selector);
        let inline_change = attempt
            .old_inline
            .as_ref()
            .map(|old| ValueChange::new(Some(old.clone()), None));
        let cleanup_pending = inline_change.is_some();

        let record = ChangeRecord::CssRule(CssRuleChange {
            selector,
            property: attempt.property.to_string(),
            target: Some(attempt.path.clone()),
            before,
            after,
            class_change: unique.class_change,
            inline_change,
        });
        self.note_touched(&record);
        info!(property = attempt.property, value = attempt.value, "Applied rule edit");

        Ok(Some(StyleEdit {
            record,
            cleanup_pending,
        }))
    }

    /// Rules alone (inline ignored) now give every breakpoint its intended value
    fn confirm(&self, doc: &Document, attempt: &RuleAttempt<'_>) -> bool {
        let target = if attempt.value == UNSET {
            None
        } else {
            Some(attempt.value.to_string())
        };
        self.breakpoints.all().iter().all(|bp| {
            let now = self.value_at(doc, attempt.node, attempt.property, bp, false);
            if attempt.armed.contains(bp) {
                now == target
            } else {
                now == attempt.old_effective.get(bp).cloned().flatten()
            }
        })
    }

    /// Drop the inline value a rule edit migrated, if it is still pending
    pub fn finish_inline_cleanup(
        &self,
        doc: &mut Document,
        resolver: &PathResolver,
        edit: StyleEdit,
    ) -> Result<ChangeRecord, EditorError> {
        if edit.cleanup_pending {
            if let ChangeRecord::CssRule(change) = &edit.record {
                match change.target.as_ref().and_then(|p| resolver.resolve(doc, p)) {
                    Some(node) => change.apply_trailing(doc, node)?,
                    None => warn!(selector = %change.selector, "Inline cleanup target vanished"),
                }
            }
        }
        Ok(edit.record)
    }

    fn inline_edit(
        &self,
        doc: &mut Document,
        node: NodeId,
        path: NodePath,
        property: &str,
        value: &str,
    ) -> Result<StyleEdit, EditorError> {
        let old = doc.set_inline_style(node, property, Some(value))?;
        Ok(StyleEdit {
            record: ChangeRecord::Style(StyleChange {
                path,
                property: property.to_string(),
                old_value: old,
                new_value: Some(value.to_string()),
            }),
            cleanup_pending: false,
        })
    }

    /// Inline declarations of the same shorthand family that a rule cannot override
    fn inline_blocks_migration(&self, doc: &Document, node: NodeId, property: &str) -> bool {
        let Some(element) = doc.element(node) else {
            return false;
        };
        let covering_shorthand = shorthand::shorthand_of(property)
            .map(|f| element.style.get(f.shorthand).is_some())
            .unwrap_or(false);
        let inline_longhands = shorthand::family(property)
            .map(|f| f.longhands.iter().any(|l| element.style.get(l).is_some()))
            .unwrap_or(false);
        covering_shorthand || inline_longhands
    }

    /// Write one declaration into the selector's rule at `breakpoint`
    fn write(
        &mut self,
        breakpoint: &Breakpoint,
        selector: &str,
        property: &str,
        value: &str,
    ) -> Result<(), EditorError> {
        let declarations = self
            .breakpoints
            .rule_declarations_mut(&mut self.sheet, breakpoint, selector)
            .ok_or_else(|| EditorError::RuleContainerMissing(breakpoint.to_string()))?;
        write_declaration(declarations, property, value);
        Ok(())
    }

    /// Every breakpoint's declaration list for `selector`
    fn capture(&self, selector: &str) -> BTreeMap<Breakpoint, Option<Declarations>> {
        self.breakpoints
            .all()
            .into_iter()
            .map(|bp| {
                let declarations = self
                    .breakpoints
                    .rule_declarations(&self.sheet, &bp, selector)
                    .cloned();
                (bp, declarations)
            })
            .collect()
    }

    fn restore(&mut self, selector: &str, state: &BTreeMap<Breakpoint, Option<Declarations>>) {
        for bp in self.breakpoints.all() {
            if let Some(declarations) = state.get(&bp) {
                self.breakpoints
                    .set_rule(&mut self.sheet, &bp, selector, declarations.clone());
            }
        }
    }

    /// Remember which durable keys a record changed
    pub fn note_touched(&mut self, record: &ChangeRecord) {
        match record {
            ChangeRecord::CssRule(change) => {
                let breakpoints: BTreeSet<&Breakpoint> =
                    change.before.keys().chain(change.after.keys()).collect();
                for bp in breakpoints {
                    let Some(condition) = self.breakpoints.condition_in(&self.sheet, bp) else {
                        continue;
                    };
                    self.touched.extend(diff_declarations(
                        condition.as_deref(),
                        &change.selector,
                        change.before.get(bp).and_then(Option::as_ref),
                        change.after.get(bp).and_then(Option::as_ref),
                    ));
                }
            }
            ChangeRecord::Snapshot(change) => {
                self.touched
                    .extend(diff_sheets(&change.before.stylesheet, &change.after.stylesheet));
            }
            _ => {}
        }
    }
}

struct RuleAttempt<'a> {
    node: NodeId,
    path: &'a NodePath,
    property: &'a str,
    value: &'a str,
    armed: &'a [Breakpoint],
    old_effective: &'a BTreeMap<Breakpoint, Option<String>>,
    old_inline: &'a Option<String>,
}

/// Set a declaration, keeping shorthand families consistent
///
/// A longhand whose shorthand is present splits the shorthand in place so
/// sibling longhands keep their values. A shorthand replaces any longhands
/// of its family.
pub fn write_declaration(declarations: &mut Declarations, property: &str, value: &str) {
    if let Some(family) = shorthand::shorthand_of(property) {
        if let Some(index) = declarations.position(family.shorthand) {
            let current = declarations
                .iter()
                .nth(index)
                .map(|d| d.value.clone())
                .unwrap_or_default();
            if let Some(expanded) = shorthand::expand(family.shorthand, &current) {
                declarations.splice(
                    index,
                    expanded
                        .into_iter()
                        .map(|(longhand, v)| Declaration::new(longhand, v))
                        .collect(),
                );
            }
        }
    }

    if let Some(family) = shorthand::family(property) {
        for longhand in family.longhands {
            declarations.remove(longhand);
        }
    }

    declarations.set(property, value);
}

fn class_count(doc: &Document, class: &str) -> usize {
    doc.elements().filter(|(_, el)| el.has_class(class)).count()
}

/// Class names that can be used as a selector without escaping
fn is_plain_ident(class: &str) -> bool {
    let mut chars = class.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && SelectorList::parse(&format!(".{}", class)).is_ok()
}
