//! Style rule object model
//!
//! A [`StyleSheet`] is an ordered list of [`RuleSet`] segments in source
//! order: runs of base rules (no condition) and conditional groups such as
//! `@media (...)`. A condition may occur in several segments; segment order
//! is cascade order. Each segment holds ordered [`StyleRule`]s whose
//! [`Declarations`] keep source order.

use crate::config::BreakpointConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const BASE_BREAKPOINT: &str = "base";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// Ordered `property: value` list
///
/// Later declarations of the same property win, as in CSS.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Declarations(Vec<Declaration>);

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.0.iter()
    }

    /// Value of the last declaration of `property`
    pub fn get(&self, property: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|d| d.property == property)
            .map(|d| d.value.as_str())
    }

    /// Index of the last declaration of `property`
    pub fn position(&self, property: &str) -> Option<usize> {
        self.0.iter().rposition(|d| d.property == property)
    }

    /// Update the last declaration in place, or append a new one
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let property = property.into();
        let value = value.into();
        match self.position(&property) {
            Some(i) => Some(std::mem::replace(&mut self.0[i].value, value)),
            None => {
                self.0.push(Declaration { property, value });
                None
            }
        }
    }

    /// Remove every declaration of `property`, returning the winning value
    pub fn remove(&mut self, property: &str) -> Option<String> {
        let old = self.get(property).map(str::to_string);
        self.0.retain(|d| d.property != property);
        old
    }

    /// Replace the declaration at `index` with several, in place
    pub fn splice(&mut self, index: usize, replacement: Vec<Declaration>) {
        if index < self.0.len() {
            self.0.splice(index..=index, replacement);
        }
    }

    pub fn push(&mut self, declaration: Declaration) {
        self.0.push(declaration);
    }
}

impl FromIterator<Declaration> for Declarations {
    fn from_iter<I: IntoIterator<Item = Declaration>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub selector: String,
    #[serde(default)]
    pub declarations: Declarations,
}

impl StyleRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            declarations: Declarations::new(),
        }
    }
}

/// One segment of consecutive rules sharing a condition (`None` = base)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Full at-rule prelude, e.g. `@media (max-width: 991px)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub rules: Vec<StyleRule>,
}

impl RuleSet {
    pub fn new(condition: Option<String>) -> Self {
        Self {
            condition,
            rules: Vec::new(),
        }
    }

    pub fn rule(&self, selector: &str) -> Option<&StyleRule> {
        self.rules.iter().find(|r| r.selector == selector)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleSheet {
    /// Statement at-rules such as `@import`, kept verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(default)]
    pub rule_sets: Vec<RuleSet>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segment and rule index of the last occurrence of a rule
    pub fn locate(&self, condition: Option<&str>, selector: &str) -> Option<(usize, usize)> {
        self.locate_where(|c| c == condition, selector)
    }

    fn locate_where(&self, matches: impl Fn(Option<&str>) -> bool, selector: &str) -> Option<(usize, usize)> {
        self.rule_sets
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, s)| matches(s.condition.as_deref()))
            .find_map(|(i, s)| {
                s.rules
                    .iter()
                    .rposition(|r| r.selector == selector)
                    .map(|j| (i, j))
            })
    }

    pub fn rule(&self, condition: Option<&str>, selector: &str) -> Option<&StyleRule> {
        let (i, j) = self.locate(condition, selector)?;
        Some(&self.rule_sets[i].rules[j])
    }

    /// Declarations of a rule, creating the rule as needed
    ///
    /// A new rule is appended to the last segment with its condition. With
    /// no such segment, a base segment goes first so conditional groups keep
    /// overriding it, and any other condition goes last.
    pub fn declarations_or_create(&mut self, condition: Option<&str>, selector: &str) -> &mut Declarations {
        let (i, j) = match self.locate(condition, selector) {
            Some(found) => found,
            None => {
                let i = match self
                    .rule_sets
                    .iter()
                    .rposition(|s| s.condition.as_deref() == condition)
                {
                    Some(i) => i,
                    None => {
                        let i = if condition.is_none() { 0 } else { self.rule_sets.len() };
                        self.insert_segment(i, condition.map(str::to_string));
                        i
                    }
                };
                self.rule_sets[i].rules.push(StyleRule::new(selector));
                (i, self.rule_sets[i].rules.len() - 1)
            }
        };
        &mut self.rule_sets[i].rules[j].declarations
    }

    fn insert_segment(&mut self, index: usize, condition: Option<String>) {
        debug!(condition = ?condition, index, "Creating rule set");
        self.rule_sets.insert(index, RuleSet::new(condition));
    }

    /// Install (or with `None`, delete) a rule's declarations wholesale
    ///
    /// Only the last occurrence is touched. Deleting the last rule of a
    /// segment removes the segment too.
    pub fn set_rule_declarations(
        &mut self,
        condition: Option<&str>,
        selector: &str,
        declarations: Option<Declarations>,
    ) {
        match declarations {
            Some(decls) => *self.declarations_or_create(condition, selector) = decls,
            None => {
                if let Some(at) = self.locate(condition, selector) {
                    self.remove_rule(at);
                }
            }
        }
    }

    fn remove_rule(&mut self, (i, j): (usize, usize)) {
        self.rule_sets[i].rules.remove(j);
        if self.rule_sets[i].rules.is_empty() {
            self.rule_sets.remove(i);
        }
    }

    /// Every selector used anywhere in the sheet
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.rule_sets
            .iter()
            .flat_map(|s| s.rules.iter())
            .map(|r| r.selector.as_str())
    }
}

/// A responsive breakpoint name; `base` is the unconditional scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Breakpoint(String);

impl Breakpoint {
    pub fn base() -> Self {
        Self(BASE_BREAKPOINT.to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_base(&self) -> bool {
        self.0 == BASE_BREAKPOINT
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered breakpoint registry
///
/// Breakpoints are desktop-first: the viewport of breakpoint *k* sees the
/// base rule set and every breakpoint set up to and including *k*.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoints {
    named: Vec<(Breakpoint, String)>,
}

impl Breakpoints {
    pub fn new(config: &[BreakpointConfig]) -> Self {
        Self {
            named: config
                .iter()
                .map(|bp| (Breakpoint::named(bp.name.clone()), format!("@media {}", bp.media.trim())))
                .collect(),
        }
    }

    /// Base first, then every named breakpoint in cascade order
    pub fn all(&self) -> Vec<Breakpoint> {
        std::iter::once(Breakpoint::base())
            .chain(self.named.iter().map(|(bp, _)| bp.clone()))
            .collect()
    }

    pub fn contains(&self, breakpoint: &Breakpoint) -> bool {
        self.rank(breakpoint).is_some()
    }

    /// Position in cascade order; base is 0
    pub fn rank(&self, breakpoint: &Breakpoint) -> Option<usize> {
        if breakpoint.is_base() {
            return Some(0);
        }
        self.named
            .iter()
            .position(|(bp, _)| bp == breakpoint)
            .map(|i| i + 1)
    }

    /// Rule-set condition for a breakpoint; `Some(None)` is the base set
    pub fn condition(&self, breakpoint: &Breakpoint) -> Option<Option<&str>> {
        if breakpoint.is_base() {
            return Some(None);
        }
        self.named
            .iter()
            .find(|(bp, _)| bp == breakpoint)
            .map(|(_, condition)| Some(condition.as_str()))
    }

    pub fn by_condition(&self, condition: Option<&str>) -> Option<Breakpoint> {
        match condition {
            None => Some(Breakpoint::base()),
            Some(c) => self
                .named
                .iter()
                .find(|(_, cond)| normalize(cond) == normalize(c))
                .map(|(bp, _)| bp.clone()),
        }
    }

    /// Whether a rule set with `condition` applies in `viewport`
    ///
    /// Conditions that are not breakpoints (`@media print`, `@supports`)
    /// never apply.
    pub fn is_visible(&self, viewport: &Breakpoint, condition: Option<&str>) -> bool {
        match (self.by_condition(condition), self.rank(viewport)) {
            (Some(bp), Some(limit)) => self.rank(&bp).map(|r| r <= limit).unwrap_or(false),
            _ => false,
        }
    }

    /// Condition text for `breakpoint` as spelled in `sheet`, or the canonical one
    pub fn condition_in(&self, sheet: &StyleSheet, breakpoint: &Breakpoint) -> Option<Option<String>> {
        let canonical = self.condition(breakpoint)?;
        let Some(canonical) = canonical else {
            return Some(None);
        };
        let spelled = sheet
            .rule_sets
            .iter()
            .filter_map(|s| s.condition.as_deref())
            .find(|c| normalize(c) == normalize(canonical))
            .unwrap_or(canonical);
        Some(Some(spelled.to_string()))
    }

    fn segment_rank(&self, set: &RuleSet) -> Option<usize> {
        self.by_condition(set.condition.as_deref())
            .and_then(|bp| self.rank(&bp))
    }

    fn locate_rule(&self, sheet: &StyleSheet, breakpoint: &Breakpoint, selector: &str) -> Option<(usize, usize)> {
        let target = self.rank(breakpoint)?;
        sheet.locate_where(
            |c| {
                self.by_condition(c)
                    .and_then(|bp| self.rank(&bp))
                    == Some(target)
            },
            selector,
        )
    }

    /// The rule for `selector` at `breakpoint`, in whichever segment spells it
    pub fn rule_declarations<'s>(
        &self,
        sheet: &'s StyleSheet,
        breakpoint: &Breakpoint,
        selector: &str,
    ) -> Option<&'s Declarations> {
        let (i, j) = self.locate_rule(sheet, breakpoint, selector)?;
        Some(&sheet.rule_sets[i].rules[j].declarations)
    }

    /// The rule for `selector` at `breakpoint`, created where it wins the cascade
    ///
    /// A new rule goes after every segment visible at `breakpoint`, so it
    /// beats equally specific rules there, but before any rule for the same
    /// selector at a later breakpoint. It joins the segment already in that
    /// spot when there is one. `None` for an unknown breakpoint.
    pub fn rule_declarations_mut<'s>(
        &self,
        sheet: &'s mut StyleSheet,
        breakpoint: &Breakpoint,
        selector: &str,
    ) -> Option<&'s mut Declarations> {
        if let Some((i, j)) = self.locate_rule(sheet, breakpoint, selector) {
            return Some(&mut sheet.rule_sets[i].rules[j].declarations);
        }
        let rank = self.rank(breakpoint)?;
        let condition = self.condition_in(sheet, breakpoint)?;
        let ranks: Vec<Option<usize>> = sheet.rule_sets.iter().map(|s| self.segment_rank(s)).collect();
        let holds = |i: usize| sheet.rule_sets[i].rule(selector).is_some();

        let after_own = (0..ranks.len())
            .filter(|&i| ranks[i].is_some_and(|r| r < rank) && holds(i))
            .map(|i| i + 1)
            .max()
            .unwrap_or(0);
        let before_own = (0..ranks.len())
            .find(|&i| ranks[i].is_some_and(|r| r > rank) && holds(i))
            .unwrap_or(ranks.len());
        let last_visible = (0..ranks.len()).rev().find(|&i| ranks[i].is_some_and(|r| r <= rank));

        let wanted = match last_visible {
            Some(i) => i + 1,
            None => ranks
                .iter()
                .position(|r| r.is_some_and(|r| r > rank))
                .unwrap_or(ranks.len()),
        };
        let index = if after_own > before_own {
            after_own
        } else {
            wanted.max(after_own).min(before_own)
        };

        let i = match last_visible {
            Some(i) if ranks[i] == Some(rank) && i + 1 == index => i,
            _ => {
                sheet.insert_segment(index, condition);
                index
            }
        };
        let set = &mut sheet.rule_sets[i];
        set.rules.push(StyleRule::new(selector));
        set.rules.last_mut().map(|r| &mut r.declarations)
    }

    /// Install (or with `None`, delete) the rule for `selector` at `breakpoint`
    ///
    /// Returns `false` for an unknown breakpoint.
    pub fn set_rule(
        &self,
        sheet: &mut StyleSheet,
        breakpoint: &Breakpoint,
        selector: &str,
        declarations: Option<Declarations>,
    ) -> bool {
        if !self.contains(breakpoint) {
            return false;
        }
        match declarations {
            Some(decls) => {
                if let Some(slot) = self.rule_declarations_mut(sheet, breakpoint, selector) {
                    *slot = decls;
                }
            }
            None => {
                if let Some(at) = self.locate_rule(sheet, breakpoint, selector) {
                    sheet.remove_rule(at);
                }
            }
        }
        true
    }

    /// Conditions visible from a breakpoint's viewport
    pub fn visible_conditions(&self, viewport: &Breakpoint) -> Vec<Option<&str>> {
        let rank = self.rank(viewport).unwrap_or(0);
        std::iter::once(None)
            .chain(
                self.named
                    .iter()
                    .take(rank)
                    .map(|(_, condition)| Some(condition.as_str())),
            )
            .collect()
    }
}

fn normalize(condition: &str) -> String {
    condition
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakpoints() -> Breakpoints {
        Breakpoints::new(&[
            BreakpointConfig {
                name: "tablet".to_string(),
                media: "(max-width: 991px)".to_string(),
            },
            BreakpointConfig {
                name: "mobile".to_string(),
                media: "(max-width: 767px)".to_string(),
            },
        ])
    }

    #[test]
    fn test_declarations_preserve_order() {
        let mut decls = Declarations::new();
        decls.set("color", "red");
        decls.set("width", "10px");
        assert_eq!(decls.set("color", "blue"), Some("red".to_string()));

        let order: Vec<_> = decls.iter().map(|d| d.property.as_str()).collect();
        assert_eq!(order, vec!["color", "width"]);
        assert_eq!(decls.get("color"), Some("blue"));
    }

    #[test]
    fn test_declarations_last_duplicate_wins() {
        let decls: Declarations = vec![
            Declaration::new("color", "red"),
            Declaration::new("color", "green"),
        ]
        .into_iter()
        .collect();
        assert_eq!(decls.get("color"), Some("green"));
    }

    #[test]
    fn test_lazy_rule_set_creation_puts_base_first() {
        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(Some("@media (max-width: 991px)"), ".a").set("color", "red");
        sheet.declarations_or_create(None, ".a").set("color", "blue");

        assert_eq!(sheet.rule_sets.len(), 2);
        assert_eq!(sheet.rule_sets[0].condition, None);
    }

    #[test]
    fn test_removing_last_rule_drops_the_set() {
        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(Some("@media print"), ".a").set("color", "red");
        sheet.set_rule_declarations(Some("@media print"), ".a", None);
        assert!(sheet.rule_sets.is_empty());
    }

    #[test]
    fn test_breakpoint_visibility() {
        let bps = breakpoints();
        assert_eq!(bps.visible_conditions(&Breakpoint::base()), vec![None]);
        assert_eq!(
            bps.visible_conditions(&Breakpoint::named("mobile")),
            vec![
                None,
                Some("@media (max-width: 991px)"),
                Some("@media (max-width: 767px)")
            ]
        );
        assert_eq!(bps.rank(&Breakpoint::named("tablet")), Some(1));
        assert_eq!(bps.rank(&Breakpoint::named("watch")), None);
    }

    #[test]
    fn test_breakpoint_lookup_by_condition_ignores_spacing() {
        let bps = breakpoints();
        assert_eq!(
            bps.by_condition(Some("@media  (max-width:991px)")),
            Some(Breakpoint::named("tablet"))
        );
        assert_eq!(bps.by_condition(None), Some(Breakpoint::base()));
    }

    fn conditions(sheet: &StyleSheet) -> Vec<Option<&str>> {
        sheet.rule_sets.iter().map(|s| s.condition.as_deref()).collect()
    }

    #[test]
    fn test_rule_sets_created_in_cascade_order() {
        let bps = breakpoints();
        let mut sheet = StyleSheet::new();
        bps.rule_declarations_mut(&mut sheet, &Breakpoint::named("mobile"), ".a").unwrap();
        bps.rule_declarations_mut(&mut sheet, &Breakpoint::named("tablet"), ".a").unwrap();
        bps.rule_declarations_mut(&mut sheet, &Breakpoint::base(), ".a").unwrap();

        assert_eq!(
            conditions(&sheet),
            vec![
                None,
                Some("@media (max-width: 991px)"),
                Some("@media (max-width: 767px)")
            ]
        );
        assert!(bps
            .rule_declarations_mut(&mut sheet, &Breakpoint::named("watch"), ".a")
            .is_none());
    }

    #[test]
    fn test_new_rules_join_the_trailing_segment() {
        let bps = breakpoints();
        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(None, ".card").set("width", "200px");
        sheet
            .declarations_or_create(Some("@media (max-width: 991px)"), ".card")
            .set("width", "100px");

        bps.rule_declarations_mut(&mut sheet, &Breakpoint::named("tablet"), ".b")
            .unwrap()
            .set("color", "red");
        bps.rule_declarations_mut(&mut sheet, &Breakpoint::base(), ".b")
            .unwrap()
            .set("color", "blue");

        assert_eq!(conditions(&sheet), vec![None, Some("@media (max-width: 991px)")]);
        assert_eq!(sheet.rule_sets[0].rules[1].selector, ".b");
        assert_eq!(sheet.rule_sets[1].rules[1].selector, ".b");
    }

    #[test]
    fn test_new_rule_follows_later_base_segment() {
        let bps = breakpoints();
        let tablet = Breakpoint::named("tablet");
        let mut sheet = StyleSheet::new();
        sheet.rule_sets.push(RuleSet::new(Some("@media (max-width: 991px)".to_string())));
        sheet.rule_sets[0].rules.push(StyleRule::new(".card"));
        sheet.rule_sets.push(RuleSet::new(None));
        sheet.rule_sets[1].rules.push(StyleRule::new(".card"));

        bps.rule_declarations_mut(&mut sheet, &tablet, ".b").unwrap().set("width", "1px");
        assert_eq!(
            conditions(&sheet),
            vec![
                Some("@media (max-width: 991px)"),
                None,
                Some("@media (max-width: 991px)")
            ]
        );

        assert!(bps.set_rule(&mut sheet, &tablet, ".b", None));
        assert_eq!(sheet.rule_sets.len(), 2);
        assert!(bps.rule_declarations(&sheet, &tablet, ".card").is_some());
        assert!(!bps.set_rule(&mut sheet, &Breakpoint::named("watch"), ".b", None));
    }

    #[test]
    fn test_repeated_conditions_resolve_to_last_occurrence() {
        let mut sheet = StyleSheet::new();
        for width in ["1px", "2px"] {
            let mut set = RuleSet::new(None);
            set.rules.push(StyleRule::new(".a"));
            set.rules[0].declarations.set("width", width);
            sheet.rule_sets.push(set);
        }

        assert_eq!(sheet.locate(None, ".a"), Some((1, 0)));
        assert_eq!(sheet.rule(None, ".a").unwrap().declarations.get("width"), Some("2px"));
        sheet.set_rule_declarations(None, ".a", None);
        assert_eq!(sheet.rule_sets.len(), 1);
        assert_eq!(sheet.rule(None, ".a").unwrap().declarations.get("width"), Some("1px"));
    }

    #[test]
    fn test_visibility_and_spelling() {
        let bps = breakpoints();
        let tablet = Breakpoint::named("tablet");
        assert!(bps.is_visible(&tablet, None));
        assert!(bps.is_visible(&tablet, Some("@media (max-width: 991px)")));
        assert!(!bps.is_visible(&tablet, Some("@media (max-width: 767px)")));
        assert!(!bps.is_visible(&tablet, Some("@media print")));

        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(Some("@media (max-width:991px)"), ".a");
        assert_eq!(
            bps.condition_in(&sheet, &tablet),
            Some(Some("@media (max-width:991px)".to_string()))
        );
        assert_eq!(
            bps.condition_in(&sheet, &Breakpoint::named("mobile")),
            Some(Some("@media (max-width: 767px)".to_string()))
        );
    }
}
