//! Error types for the editor

use crate::css::CssParseError;
use crate::path::NodePath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// A path or identifier did not resolve in the target tree
    #[error("Address did not resolve: {0}")]
    AddressResolution(NodePath),

    /// A live node handle points at a node that is no longer in the tree
    #[error("Node is detached from the document")]
    DetachedNode,

    #[error("Selector conflict: {0}")]
    SelectorConflict(String),

    #[error("No rule container for breakpoint {0}")]
    RuleContainerMissing(String),

    #[error("Invalid tree operation: {0}")]
    Tree(String),

    #[error("Unknown breakpoint: {0}")]
    UnknownBreakpoint(String),

    #[error("History is replaying; edit must wait")]
    Busy,

    #[error("No gesture in progress")]
    NoGesture,

    #[error("Persistence failed for {file}: {source}")]
    Persistence {
        file: String,
        #[source]
        source: trellis_common::CommonError,
    },

    #[error("Stylesheet error: {0}")]
    Css(#[from] CssParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation did not finish within {0}ms")]
    ValidationTimeout(u64),

    #[error("Validation task failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<indextree::NodeError> for EditorError {
    fn from(e: indextree::NodeError) -> Self {
        EditorError::Tree(format!("{:?}", e))
    }
}
