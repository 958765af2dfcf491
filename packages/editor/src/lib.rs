//! # Trellis Editor
//!
//! Change history and multi-viewport synchronization for a visual
//! document editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ session: one entry point per user action    │
//! │  - resolve target paths                     │
//! │  - gestures, batching, selection, events    │
//! └─────────────────────────────────────────────┘
//!          ↓                         ↓
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │ style_engine         │  │ dom                  │
//! │  unique selectors,   │  │  tree edits on the   │
//! │  breakpoint pinning  │  │  primary document    │
//! └──────────────────────┘  └──────────────────────┘
//!          ↓                         ↓
//! ┌─────────────────────────────────────────────┐
//! │ change + history: reversible records        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ mirrors: one document per active breakpoint │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Addresses, not handles**: history stores [`NodePath`]s and resolves
//!    them at the moment of use; live `NodeId`s never outlive an edit
//! 2. **One record per action**: a rule edit carries its class promotion and
//!    inline clean-up, and a drag gesture commits once
//! 3. **Breakpoints are explicit**: every per-breakpoint operation takes the
//!    armed set as an argument
//! 4. **Mirrors only replay**: they never receive input of their own
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trellis_editor::{Breakpoint, EditorSession, EngineConfig, NodePath};
//!
//! let mut session = EditorSession::new(EngineConfig::default(), "index.html", &body, sheet)?;
//! session.activate_breakpoint(Breakpoint::named("tablet"))?;
//!
//! // Resize one card without touching the others
//! session.set_style(&NodePath::from_id("card-1"), "width", "350px", &[Breakpoint::base()])?;
//!
//! session.undo()?;
//! session.save_styles(&mut store, "styles.css")?;
//! ```

pub mod change;
pub mod config;
pub mod css;
pub mod dom;
mod errors;
pub mod events;
pub mod gesture;
pub mod history;
pub mod ids;
pub mod mirrors;
pub mod path;
pub mod persistence;
pub mod session;
pub mod style_engine;
pub mod validation;

pub use change::{
    ApplyContext, AttributeChange, ChangeRecord, ContentChange, CssRuleChange, DocumentSnapshot,
    SnapshotChange, StructureChange, StyleChange, ValueChange,
};
pub use config::{BreakpointConfig, EngineConfig, ValidationConfig};
pub use css::{
    parse_stylesheet, serialize_stylesheet, Breakpoint, Breakpoints, Declarations, EffectiveValue,
    StyleSheet,
};
pub use dom::{Document, SerializedNode};
pub use errors::EditorError;
pub use events::{EditorEvent, SubscriptionId};
pub use gesture::StyleGesture;
pub use history::{ChangeHistory, HistoryEntry, RecordOutcome, Replay};
pub use mirrors::{Mirror, MirrorState, ViewportMirrorSync};
pub use path::{NodePath, PathResolver};
pub use session::EditorSession;
pub use style_engine::{StyleEdit, StyleRuleEngine, UniqueSelector};
pub use validation::{ValidationJob, ValidationWarning, WarningKind};

// Re-export common types for convenience
pub use trellis_common::{CommonError, FileStore, MockFileSystem, RealFileSystem};
