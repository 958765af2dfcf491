//! Merging live rule edits into durable stylesheet text
//!
//! Only touched `(condition, selector, property)` keys are written back.
//! Everything else in the durable sheet, including declarations the editor
//! never parsed as meaningful, is left exactly where it was.

use super::stylesheet::{Declarations, RuleSet, StyleRule, StyleSheet};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey {
    pub condition: Option<String>,
    pub selector: String,
    pub property: String,
}

impl RuleKey {
    pub fn new(condition: Option<&str>, selector: &str, property: &str) -> Self {
        Self {
            condition: condition.map(str::to_string),
            selector: selector.to_string(),
            property: property.to_string(),
        }
    }
}

/// Keys whose values differ between two declaration lists of one rule
pub fn diff_declarations(
    condition: Option<&str>,
    selector: &str,
    before: Option<&Declarations>,
    after: Option<&Declarations>,
) -> Vec<RuleKey> {
    let properties: BTreeSet<&str> = before
        .into_iter()
        .chain(after)
        .flat_map(|d| d.iter().map(|decl| decl.property.as_str()))
        .collect();

    properties
        .into_iter()
        .filter(|p| before.and_then(|d| d.get(p)) != after.and_then(|d| d.get(p)))
        .map(|p| RuleKey::new(condition, selector, p))
        .collect()
}

/// Keys whose values differ between two whole sheets
pub fn diff_sheets(before: &StyleSheet, after: &StyleSheet) -> Vec<RuleKey> {
    let index = |sheet: &StyleSheet| {
        let mut rules: BTreeMap<(Option<String>, String), Declarations> = BTreeMap::new();
        for set in &sheet.rule_sets {
            for rule in &set.rules {
                let entry = rules
                    .entry((set.condition.clone(), rule.selector.clone()))
                    .or_default();
                for decl in rule.declarations.iter() {
                    entry.set(decl.property.clone(), decl.value.clone());
                }
            }
        }
        rules
    };

    let before = index(before);
    let after = index(after);
    let rules: BTreeSet<&(Option<String>, String)> = before.keys().chain(after.keys()).collect();

    rules
        .into_iter()
        .flat_map(|key| {
            diff_declarations(key.0.as_deref(), &key.1, before.get(key), after.get(key))
        })
        .collect()
}

/// Write touched keys from `live` into `durable`
///
/// Existing declarations are updated in place, new ones are appended in
/// live order, and keys missing from `live` are removed. A durable rule
/// left empty by removals is dropped. A rule the durable sheet lacks is
/// placed right after the rule preceding it in `live`.
pub fn merge_touched(durable: &mut StyleSheet, live: &StyleSheet, touched: &BTreeSet<RuleKey>) {
    let mut by_rule: BTreeMap<(Option<&str>, &str), BTreeSet<&str>> = BTreeMap::new();
    for key in touched {
        by_rule
            .entry((key.condition.as_deref(), key.selector.as_str()))
            .or_default()
            .insert(key.property.as_str());
    }

    // Live order first so every new rule finds its live predecessor already placed
    let live_keys = live.rule_sets.iter().flat_map(|set| {
        set.rules
            .iter()
            .map(move |rule| (set.condition.as_deref(), rule.selector.as_str()))
    });
    let mut order: Vec<(Option<&str>, &str)> = Vec::new();
    for key in live_keys.chain(by_rule.keys().copied()) {
        if by_rule.contains_key(&key) && !order.contains(&key) {
            order.push(key);
        }
    }

    for (condition, selector) in order {
        let properties = &by_rule[&(condition, selector)];
        let live_decls = live
            .rule(condition, selector)
            .map(|r| r.declarations.clone())
            .unwrap_or_default();

        let present: Vec<(&str, &str)> = live_decls
            .iter()
            .filter(|d| properties.contains(d.property.as_str()))
            .map(|d| (d.property.as_str(), d.value.as_str()))
            .collect();
        let removed: Vec<&str> = properties
            .iter()
            .copied()
            .filter(|p| live_decls.get(p).is_none())
            .collect();

        if !present.is_empty() {
            let decls = match durable.locate(condition, selector) {
                Some(_) => durable.declarations_or_create(condition, selector),
                None => create_rule(durable, live, condition, selector),
            };
            for (property, _) in &present {
                // Take the winning value once, even if live repeats it
                if let Some(value) = live_decls.get(property) {
                    decls.set(*property, value);
                }
            }
        }

        if !removed.is_empty() && durable.rule(condition, selector).is_some() {
            let decls = durable.declarations_or_create(condition, selector);
            for property in &removed {
                decls.remove(property);
            }
            if decls.is_empty() {
                durable.set_rule_declarations(condition, selector, None);
            }
        }
    }
}

/// Insert an empty rule into `durable` after the rule preceding it in `live`
fn create_rule<'d>(
    durable: &'d mut StyleSheet,
    live: &StyleSheet,
    condition: Option<&str>,
    selector: &str,
) -> &'d mut Declarations {
    let flat: Vec<(Option<&str>, &str)> = live
        .rule_sets
        .iter()
        .flat_map(|set| {
            set.rules
                .iter()
                .map(move |rule| (set.condition.as_deref(), rule.selector.as_str()))
        })
        .collect();
    let anchor = flat
        .iter()
        .rposition(|key| *key == (condition, selector))
        .and_then(|p| {
            flat[..p]
                .iter()
                .rev()
                .find_map(|(c, s)| durable.locate(*c, s))
        });
    let has_condition = |sheet: &StyleSheet, i: usize| {
        sheet
            .rule_sets
            .get(i)
            .is_some_and(|set| set.condition.as_deref() == condition)
    };

    let (i, j) = match anchor {
        Some((i, j)) if has_condition(&*durable, i) => (i, j + 1),
        Some((i, j)) => {
            let tail = durable.rule_sets[i].rules.split_off(j + 1);
            if !tail.is_empty() {
                let rest = RuleSet {
                    condition: durable.rule_sets[i].condition.clone(),
                    rules: tail,
                };
                durable.rule_sets.insert(i + 1, rest);
            }
            if !has_condition(&*durable, i + 1) {
                durable
                    .rule_sets
                    .insert(i + 1, RuleSet::new(condition.map(str::to_string)));
            }
            (i + 1, 0)
        }
        None if has_condition(&*durable, 0) => (0, 0),
        None => {
            durable
                .rule_sets
                .insert(0, RuleSet::new(condition.map(str::to_string)));
            (0, 0)
        }
    };
    durable.rule_sets[i].rules.insert(j, StyleRule::new(selector));
    &mut durable.rule_sets[i].rules[j].declarations
}
