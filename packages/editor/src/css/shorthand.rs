//! Positional shorthand families
//!
//! Only shorthands whose components map positionally onto longhands are
//! expanded (`gap`, box edges, corner radii). Heterogeneous shorthands such
//! as `border` or `font` are treated as opaque properties.

/// How a shorthand value spreads over its longhands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// One or two components: `row column`
    Pair,
    /// One to four components: `top right bottom left`
    Box,
}

#[derive(Debug)]
pub struct ShorthandFamily {
    pub shorthand: &'static str,
    pub longhands: &'static [&'static str],
    pub expansion: Expansion,
}

static FAMILIES: &[ShorthandFamily] = &[
    ShorthandFamily {
        shorthand: "gap",
        longhands: &["row-gap", "column-gap"],
        expansion: Expansion::Pair,
    },
    ShorthandFamily {
        shorthand: "padding",
        longhands: &["padding-top", "padding-right", "padding-bottom", "padding-left"],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "margin",
        longhands: &["margin-top", "margin-right", "margin-bottom", "margin-left"],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "inset",
        longhands: &["top", "right", "bottom", "left"],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "border-width",
        longhands: &[
            "border-top-width",
            "border-right-width",
            "border-bottom-width",
            "border-left-width",
        ],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "border-style",
        longhands: &[
            "border-top-style",
            "border-right-style",
            "border-bottom-style",
            "border-left-style",
        ],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "border-color",
        longhands: &[
            "border-top-color",
            "border-right-color",
            "border-bottom-color",
            "border-left-color",
        ],
        expansion: Expansion::Box,
    },
    ShorthandFamily {
        shorthand: "border-radius",
        longhands: &[
            "border-top-left-radius",
            "border-top-right-radius",
            "border-bottom-right-radius",
            "border-bottom-left-radius",
        ],
        expansion: Expansion::Box,
    },
];

/// Family for a shorthand property name
pub fn family(shorthand: &str) -> Option<&'static ShorthandFamily> {
    FAMILIES.iter().find(|f| f.shorthand == shorthand)
}

/// Family a longhand belongs to
pub fn shorthand_of(longhand: &str) -> Option<&'static ShorthandFamily> {
    FAMILIES.iter().find(|f| f.longhands.contains(&longhand))
}

/// Expand a shorthand value into `(longhand, value)` pairs
///
/// Returns `None` for non-shorthands and for values that cannot be split
/// positionally (wrong component count, `/` in a radius, `var()` that may
/// stand for several components).
pub fn expand(property: &str, value: &str) -> Option<Vec<(&'static str, String)>> {
    let family = family(property)?;
    if value.contains("var(") || value.contains('/') {
        return None;
    }

    let parts = split_components(value);
    let values: Vec<String> = match (family.expansion, parts.as_slice()) {
        (Expansion::Pair, [a]) => vec![a.clone(), a.clone()],
        (Expansion::Pair, [a, b]) => vec![a.clone(), b.clone()],
        (Expansion::Box, [a]) => vec![a.clone(); 4],
        (Expansion::Box, [v, h]) => vec![v.clone(), h.clone(), v.clone(), h.clone()],
        (Expansion::Box, [t, h, b]) => vec![t.clone(), h.clone(), b.clone(), h.clone()],
        (Expansion::Box, [t, r, b, l]) => vec![t.clone(), r.clone(), b.clone(), l.clone()],
        _ => return None,
    };

    Some(family.longhands.iter().copied().zip(values).collect())
}

/// Longhand value carried by a shorthand declaration, if any
pub fn longhand_value(shorthand: &str, value: &str, longhand: &str) -> Option<String> {
    expand(shorthand, value)?
        .into_iter()
        .find(|(name, _)| *name == longhand)
        .map(|(_, v)| v)
}

/// Split on whitespace outside parentheses
pub fn split_components(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in value.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
