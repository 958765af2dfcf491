//! # Reference Validation
//!
//! Checks external references (`src`, `href`) after edits land.
//!
//! ## Design
//!
//! Validation runs off the edit path:
//! - References are collected from a snapshot of the body, so the live
//!   tree is never held while checks run
//! - Checks are pure functions of (reference, context) and run inside
//!   `spawn_blocking` under a timeout
//! - Findings carry the node's path and the value that was checked; the
//!   session re-resolves both before applying any correction
//!
//! Each check is a [`ReferenceCheck`]; [`Validator`] runs all registered
//! checks against every reference.

use crate::config::ValidationConfig;
use crate::dom::{Document, SerializedNode};
use crate::path::NodePath;
use crate::EditorError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, instrument};
use trellis_common::FileStore;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    /// Local file that does not exist
    BrokenReference,
    /// External host not on the allow-list
    DisallowedDependency,
    /// Plain `http` to a host that serves `https`
    InsecureReference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub path: NodePath,
    pub attribute: String,

    /// Value the check saw
    pub value: String,
    pub kind: WarningKind,

    /// Safe substitute, when one exists
    pub correction: Option<String>,
}

/// One `src`/`href` occurrence in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub path: NodePath,
    pub tag: String,
    pub attribute: String,
    pub value: String,
}

impl Reference {
    fn warning(&self, kind: WarningKind, correction: Option<String>) -> ValidationWarning {
        ValidationWarning {
            path: self.path.clone(),
            attribute: self.attribute.clone(),
            value: self.value.clone(),
            kind,
            correction,
        }
    }

    fn is_image(&self) -> bool {
        self.tag == "img" && self.attribute == "src"
    }
}

/// Everything a check may consult
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    /// Local assets known to exist
    pub known_assets: BTreeSet<String>,
    pub allowed_hosts: Vec<String>,
    pub placeholder_image: Option<String>,
}

impl CheckContext {
    /// An empty allow-list permits every host
    fn host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    fn placeholder_for(&self, reference: &Reference) -> Option<String> {
        if reference.is_image() {
            self.placeholder_image.clone()
        } else {
            None
        }
    }
}

pub trait ReferenceCheck: std::fmt::Debug + Send + Sync {
    fn check(&self, reference: &Reference, cx: &CheckContext) -> Option<ValidationWarning>;
}

/// Local references must name an existing asset
#[derive(Debug)]
pub struct BrokenReference;

impl ReferenceCheck for BrokenReference {
    fn check(&self, reference: &Reference, cx: &CheckContext) -> Option<ValidationWarning> {
        let asset = local_asset(&reference.value)?;
        if cx.known_assets.contains(&asset) {
            return None;
        }
        Some(reference.warning(WarningKind::BrokenReference, cx.placeholder_for(reference)))
    }
}

/// External references must point at an allowed host
#[derive(Debug)]
pub struct DisallowedDependency;

impl ReferenceCheck for DisallowedDependency {
    fn check(&self, reference: &Reference, cx: &CheckContext) -> Option<ValidationWarning> {
        let url = external_url(&reference.value)?;
        let host = url.host_str()?;
        if cx.host_allowed(host) {
            return None;
        }
        Some(reference.warning(WarningKind::DisallowedDependency, cx.placeholder_for(reference)))
    }
}

/// Plain-http references to allowed hosts are upgraded
#[derive(Debug)]
pub struct InsecureReference;

impl ReferenceCheck for InsecureReference {
    fn check(&self, reference: &Reference, cx: &CheckContext) -> Option<ValidationWarning> {
        let mut url = external_url(&reference.value)?;
        if url.scheme() != "http" || !url.host_str().map(|h| cx.host_allowed(h)).unwrap_or(false) {
            return None;
        }
        url.set_scheme("https").ok()?;
        Some(reference.warning(WarningKind::InsecureReference, Some(url.to_string())))
    }
}

#[derive(Debug)]
pub struct Validator {
    checks: Vec<Box<dyn ReferenceCheck>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(BrokenReference),
                Box::new(DisallowedDependency),
                Box::new(InsecureReference),
            ],
        }
    }

    pub fn check_all(&self, references: &[Reference], cx: &CheckContext) -> Vec<ValidationWarning> {
        references
            .iter()
            .flat_map(|reference| self.checks.iter().filter_map(move |c| c.check(reference, cx)))
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// A validation pass ready to run off the edit path
#[derive(Debug, Clone)]
pub struct ValidationJob {
    references: Vec<Reference>,
    context: CheckContext,
    timeout: Duration,
}

impl ValidationJob {
    /// Snapshot the references and look up which local assets exist
    pub fn prepare(doc: &Document, store: &dyn FileStore, config: &ValidationConfig) -> Self {
        let references = collect_references(&doc.snapshot(), doc.id_attribute());
        let known_assets = references
            .iter()
            .filter_map(|r| local_asset(&r.value))
            .filter(|asset| store.exists(asset))
            .collect();

        Self {
            references,
            context: CheckContext {
                known_assets,
                allowed_hosts: config.allowed_hosts.clone(),
                placeholder_image: config.placeholder_image.clone(),
            },
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Run the checks on the current thread
    pub fn run_blocking(&self) -> Vec<ValidationWarning> {
        Validator::new().check_all(&self.references, &self.context)
    }

    /// Run the checks on the blocking pool, bounded by the configured timeout
    #[instrument(skip(self), fields(references = self.references.len()))]
    pub async fn run(self) -> Result<Vec<ValidationWarning>, EditorError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || self.run_blocking());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(warnings)) => {
                debug!(warnings = warnings.len(), "Validation finished");
                Ok(warnings)
            }
            Ok(Err(e)) => Err(EditorError::Validation(e.to_string())),
            Err(_) => Err(EditorError::ValidationTimeout(timeout_ms)),
        }
    }
}

/// Every `src` and `link[href]` in a serialized body, with its path
pub fn collect_references(body: &SerializedNode, id_attribute: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    collect_into(body, id_attribute, &mut Vec::new(), &mut references);
    references
}

fn collect_into(
    node: &SerializedNode,
    id_attribute: &str,
    indices: &mut Vec<usize>,
    out: &mut Vec<Reference>,
) {
    let SerializedNode::Element {
        tag,
        attributes,
        children,
        ..
    } = node
    else {
        return;
    };

    let path = NodePath {
        indices: indices.clone(),
        id: attributes.get(id_attribute).cloned(),
    };
    for (name, value) in attributes {
        let is_reference = name == "src" || (name == "href" && tag == "link");
        if is_reference && !value.trim().is_empty() {
            out.push(Reference {
                path: path.clone(),
                tag: tag.clone(),
                attribute: name.clone(),
                value: value.clone(),
            });
        }
    }

    for (index, child) in children.iter().enumerate() {
        indices.push(index);
        collect_into(child, id_attribute, indices, out);
        indices.pop();
    }
}

/// Absolute `http(s)` URL, including protocol-relative ones
fn external_url(value: &str) -> Option<Url> {
    let value = value.trim();
    let url = if value.starts_with("//") {
        Url::parse(&format!("https:{}", value)).ok()?
    } else {
        Url::parse(value).ok()?
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Store name of a relative reference
///
/// Absolute URLs (any scheme), protocol-relative URLs and fragments are not
/// local assets.
pub fn local_asset(value: &str) -> Option<String> {
    let value = value.trim();
    if value.starts_with("//") || value.starts_with('#') {
        return None;
    }
    match Url::parse(value) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        _ => return None,
    }
    let end = value.find(|c| c == '?' || c == '#').unwrap_or(value.len());
    let asset = value[..end].trim_start_matches("./").trim_start_matches('/');
    (!asset.is_empty()).then(|| asset.to_string())
}
