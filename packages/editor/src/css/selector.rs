//! Selector matching
//!
//! Supports compound selectors built from type, universal, class, id and
//! attribute parts, joined by descendant and child combinators, in
//! comma-separated lists. Pseudo-classes are parsed and counted for
//! specificity but never match: the edited tree has no interaction state.

use super::CssParseError;
use crate::dom::{Document, ElementData};
use indextree::NodeId;

/// `(ids, classes, types)`, compared lexicographically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Specificity(pub u32, pub u32, pub u32);

#[derive(Debug, Clone, PartialEq)]
enum AttributeMatch {
    Exists,
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, AttributeMatch)>,
    pseudo: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// Compounds left to right; `links[i]` joins `compounds[i]` and `compounds[i + 1]`
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: Vec<Compound>,
    links: Vec<Combinator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

impl SelectorList {
    pub fn parse(text: &str) -> Result<Self, CssParseError> {
        let invalid = |message: &str| CssParseError::InvalidSelector {
            selector: text.to_string(),
            message: message.to_string(),
        };

        let mut selectors = Vec::new();
        for part in split_top_level(text, ',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty selector in list"));
            }
            selectors.push(parse_complex(part).map_err(|m| invalid(&m))?);
        }
        if selectors.is_empty() {
            return Err(invalid("empty selector"));
        }
        Ok(Self { selectors })
    }

    /// Highest specificity among the alternatives that match `node`
    pub fn matches(&self, doc: &Document, node: NodeId) -> Option<Specificity> {
        self.selectors
            .iter()
            .filter(|s| s.matches(doc, node))
            .map(Complex::specificity)
            .max()
    }

    /// Highest specificity of any alternative
    pub fn specificity(&self) -> Specificity {
        self.selectors
            .iter()
            .map(Complex::specificity)
            .max()
            .unwrap_or_default()
    }
}

/// Number of attached elements a selector matches
pub fn match_count(doc: &Document, selector: &SelectorList) -> usize {
    doc.elements()
        .filter(|(id, _)| selector.matches(doc, *id).is_some())
        .count()
}

impl Complex {
    fn specificity(&self) -> Specificity {
        self.compounds.iter().fold(Specificity::default(), |acc, c| {
            let s = c.specificity();
            Specificity(acc.0 + s.0, acc.1 + s.1, acc.2 + s.2)
        })
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self.compounds.len() {
            0 => false,
            n => self.matches_at(doc, node, n - 1),
        }
    }

    /// Whether `compounds[index]` matches `node` with everything left of it satisfied
    fn matches_at(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        let matched = doc
            .element(node)
            .map(|el| self.compounds[index].matches(el))
            .unwrap_or(false);
        if !matched {
            return false;
        }
        if index == 0 {
            return true;
        }

        let ancestors = doc.ancestors(node);
        match self.links[index - 1] {
            Combinator::Child => ancestors
                .first()
                .map(|parent| self.matches_at(doc, *parent, index - 1))
                .unwrap_or(false),
            Combinator::Descendant => ancestors
                .iter()
                .any(|ancestor| self.matches_at(doc, *ancestor, index - 1)),
        }
    }
}

impl Compound {
    fn specificity(&self) -> Specificity {
        Specificity(
            self.id.iter().count() as u32,
            (self.classes.len() + self.attributes.len() + self.pseudo.len()) as u32,
            self.tag.iter().count() as u32,
        )
    }

    fn matches(&self, element: &ElementData) -> bool {
        if !self.pseudo.is_empty() {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(&element.tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|(name, m)| match m {
            AttributeMatch::Exists => element.attributes.contains_key(name),
            AttributeMatch::Equals(v) => element.attributes.get(name) == Some(v),
        })
    }
}

fn parse_complex(text: &str) -> Result<Complex, String> {
    let mut compounds = Vec::new();
    let mut links = Vec::new();
    let mut pending_child = false;

    for token in tokenize_complex(text) {
        if token == ">" {
            if compounds.is_empty() || pending_child {
                return Err("misplaced '>'".to_string());
            }
            pending_child = true;
            continue;
        }
        if token == "+" || token == "~" {
            return Err(format!("unsupported combinator '{}'", token));
        }
        let compound = parse_compound(&token)?;
        if !compounds.is_empty() {
            links.push(if pending_child {
                Combinator::Child
            } else {
                Combinator::Descendant
            });
        }
        pending_child = false;
        compounds.push(compound);
    }

    if pending_child || compounds.is_empty() {
        return Err("selector ends with a combinator".to_string());
    }
    Ok(Complex { compounds, links })
}

/// Split into compound texts and `>`/`+`/`~` combinator tokens
fn tokenize_complex(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;

    for c in text.chars() {
        match c {
            '[' => {
                in_brackets = true;
                current.push(c);
            }
            ']' => {
                in_brackets = false;
                current.push(c);
            }
            '>' | '+' | '~' if !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_compound(text: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    if chars.first() == Some(&'*') {
        i = 1;
    } else {
        let tag = take_ident(&chars, &mut i);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let class = take_ident(&chars, &mut i);
                if class.is_empty() {
                    return Err("empty class name".to_string());
                }
                compound.classes.push(class);
            }
            '#' => {
                i += 1;
                let id = take_ident(&chars, &mut i);
                if id.is_empty() {
                    return Err("empty id".to_string());
                }
                compound.id = Some(id);
            }
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| "unterminated attribute selector".to_string())?;
                let inner: String = chars[i + 1..i + end].iter().collect();
                compound.attributes.push(parse_attribute(&inner)?);
                i += end + 1;
            }
            ':' => {
                i += 1;
                if chars.get(i) == Some(&':') {
                    i += 1;
                }
                let name = take_ident(&chars, &mut i);
                if name.is_empty() {
                    return Err("empty pseudo-class".to_string());
                }
                if chars.get(i) == Some(&'(') {
                    let mut depth = 0;
                    while i < chars.len() {
                        match chars[i] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    i += 1;
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
                compound.pseudo.push(name);
            }
            c => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(compound)
}

fn parse_attribute(inner: &str) -> Result<(String, AttributeMatch), String> {
    match inner.split_once('=') {
        None => {
            let name = inner.trim();
            if name.is_empty() {
                return Err("empty attribute selector".to_string());
            }
            Ok((name.to_string(), AttributeMatch::Exists))
        }
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() || name.ends_with(['~', '|', '^', '$', '*']) {
                return Err(format!("unsupported attribute selector [{}]", inner));
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            Ok((name.to_string(), AttributeMatch::Equals(value.to_string())))
        }
    }
}

fn take_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() {
        let c = chars[*i];
        if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            *i += 1;
        } else if c == '\\' && *i + 1 < chars.len() {
            *i += 2;
        } else {
            break;
        }
    }
    chars[start..*i].iter().filter(|c| **c != '\\').collect()
}

/// Split on `sep` outside brackets and parentheses
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
