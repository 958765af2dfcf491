//! Stylesheet persistence
//!
//! The durable text is never overwritten with a fresh serialization of the
//! live sheet. Saving re-reads it, writes back only the keys edited since
//! the last save, and keeps everything else where it was.

use crate::css::{merge_touched, parse_stylesheet, serialize_stylesheet, RuleKey, StyleSheet};
use crate::EditorError;
use std::collections::BTreeSet;
use tracing::{info, instrument};
use trellis_common::{CommonError, FileStore};

/// Read and parse a stylesheet; a missing file is an empty sheet
pub fn load_styles(store: &dyn FileStore, file: &str) -> Result<StyleSheet, EditorError> {
    match read(store, file)? {
        Some(text) => Ok(parse_stylesheet(&text)?),
        None => Ok(StyleSheet::new()),
    }
}

/// Merge touched keys of `live` into the durable file and write it
///
/// Returns the text that was written.
#[instrument(skip(store, live, touched), fields(touched = touched.len()))]
pub fn save_styles(
    store: &mut dyn FileStore,
    file: &str,
    live: &StyleSheet,
    touched: &BTreeSet<RuleKey>,
) -> Result<String, EditorError> {
    let mut durable = match read(store, file)? {
        Some(text) => parse_stylesheet(&text)?,
        None => StyleSheet::new(),
    };
    merge_touched(&mut durable, live, touched);

    let text = serialize_stylesheet(&durable);
    store
        .save_file(file, &text)
        .map_err(|source| EditorError::Persistence {
            file: file.to_string(),
            source,
        })?;
    info!(file, bytes = text.len(), "Saved stylesheet");
    Ok(text)
}

fn read(store: &dyn FileStore, file: &str) -> Result<Option<String>, EditorError> {
    match store.get_file_content(file) {
        Ok(text) => Ok(Some(text)),
        Err(CommonError::NotFound(_)) => Ok(None),
        Err(source) => Err(EditorError::Persistence {
            file: file.to_string(),
            source,
        }),
    }
}
