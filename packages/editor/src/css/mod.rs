//! # Style Rules
//!
//! Object model, text codec and cascade for the document's stylesheet.
//!
//! ```text
//! text ──tokenizer──▶ parser ──▶ StyleSheet ──serializer──▶ text
//!                                    │
//!                       selector + shorthand + cascade
//!                                    │
//!                                    ▼
//!                             EffectiveValue
//! ```

pub mod cascade;
pub mod merge;
pub mod parser;
pub mod selector;
pub mod serializer;
pub mod shorthand;
pub mod stylesheet;
pub mod tokenizer;

pub use cascade::{declared_value, effective_value, EffectiveValue, ValueSource, UNSET};
pub use merge::{diff_declarations, diff_sheets, merge_touched, RuleKey};
pub use parser::{parse_stylesheet, CssParseError};
pub use selector::{match_count, SelectorList, Specificity};
pub use serializer::{serialize_inline, serialize_stylesheet};
pub use stylesheet::{
    Breakpoint, Breakpoints, Declaration, Declarations, RuleSet, StyleRule, StyleSheet,
    BASE_BREAKPOINT,
};
