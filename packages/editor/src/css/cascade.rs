//! Effective value computation
//!
//! Inline declarations win. Otherwise the matching rule with the highest
//! specificity wins, ties going to the later rule in sheet order, and only
//! rule sets visible from the viewport take part. A declared `unset` means
//! no value.

use super::selector::{SelectorList, Specificity};
use super::shorthand;
use super::stylesheet::{Breakpoint, Breakpoints, Declarations, StyleSheet};
use crate::dom::Document;
use indextree::NodeId;
use serde::Serialize;

pub const UNSET: &str = "unset";

/// Where an effective value came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValueSource {
    Inline,
    Rule {
        condition: Option<String>,
        selector: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveValue {
    pub value: String,
    pub source: ValueSource,
}

/// Value a declaration list gives `property`, looking through shorthands
pub fn declared_value(declarations: &Declarations, property: &str) -> Option<String> {
    let family = shorthand::shorthand_of(property);
    declarations
        .iter()
        .filter_map(|d| {
            if d.property == property {
                Some(d.value.clone())
            } else if family.map(|f| f.shorthand) == Some(d.property.as_str()) {
                shorthand::longhand_value(&d.property, &d.value, property)
            } else {
                None
            }
        })
        .last()
}

/// Winning value for `property` on `node` as seen from `viewport`
pub fn effective_value(
    sheet: &StyleSheet,
    breakpoints: &Breakpoints,
    doc: &Document,
    node: NodeId,
    property: &str,
    viewport: &Breakpoint,
    include_inline: bool,
) -> Option<EffectiveValue> {
    if include_inline {
        if let Some(value) = doc
            .element(node)
            .and_then(|el| declared_value(&el.style, property))
        {
            return unset_to_none(EffectiveValue {
                value,
                source: ValueSource::Inline,
            });
        }
    }

    let mut best: Option<((Specificity, usize, usize), EffectiveValue)> = None;

    for (set_index, set) in sheet.rule_sets.iter().enumerate() {
        if !breakpoints.is_visible(viewport, set.condition.as_deref()) {
            continue;
        }
        for (rule_index, rule) in set.rules.iter().enumerate() {
            let Some(value) = declared_value(&rule.declarations, property) else {
                continue;
            };
            let Ok(selector) = SelectorList::parse(&rule.selector) else {
                continue;
            };
            let Some(specificity) = selector.matches(doc, node) else {
                continue;
            };

            let rank = (specificity, set_index, rule_index);
            if best.as_ref().map(|(r, _)| rank >= *r).unwrap_or(true) {
                best = Some((
                    rank,
                    EffectiveValue {
                        value,
                        source: ValueSource::Rule {
                            condition: set.condition.clone(),
                            selector: rule.selector.clone(),
                        },
                    },
                ));
            }
        }
    }

    best.and_then(|(_, v)| unset_to_none(v))
}

fn unset_to_none(value: EffectiveValue) -> Option<EffectiveValue> {
    if value.value == UNSET {
        None
    } else {
        Some(value)
    }
}
