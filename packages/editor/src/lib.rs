//! # vlatex Editor
//!
//! Keeps a LaTeX source, its document tree and its visual projection in sync
//! while either side is edited.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: source → tokens → document tree     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ projector: document tree → visual tree      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document lifecycle + mutations      │
//! │  - Translate visual edits to mutations      │
//! │  - Emit, rescan and reparse incrementally   │
//! │  - Map positions between source and view    │
//! │  - Undo/redo as invertible transactions     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The tree is the source of truth**: source text and visual tree are
//!    derived from it, and the tree always equals a parse of its source
//! 2. **Edits never break structure silently**: a visual edit that would create
//!    a new error node is rejected and nothing changes
//! 3. **Bounded work per event**: each event only rescans, reparses and
//!    reprojects the region it touched
//! 4. **Single writer**: only the editing thread mutates the tree; background
//!    parses are installed only while still current
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vlatex_editor::{Document, EditorConfig, VisualEdit};
//!
//! let mut doc = Document::load("paper.tex", "\\textbf{Hi} $x$", EditorConfig::default());
//!
//! // Delete "Hi" as seen on screen
//! let region = doc.apply_edit(&VisualEdit::DeleteRange { start: 0, end: 2 })?;
//! assert_eq!(doc.source(), "\\textbf{} $x$");
//!
//! doc.undo()?;
//! assert_eq!(doc.source(), "\\textbf{Hi} $x$");
//! ```

mod background;
mod config;
mod document;
mod errors;
mod mutations;
mod pipeline;
mod position_map;
mod translator;
mod undo_stack;

pub use background::{BackgroundParser, BackgroundResult};
pub use config::EditorConfig;
pub use document::{ChangedRegion, Diagnostic, Document};
pub use errors::{EditError, EditorError};
pub use mutations::{apply_all, diff_children, Applied, Mutation, MutationError};
pub use pipeline::{EditorEvent, Pipeline};
pub use position_map::{PositionMap, SlotKind, VisualSlot};
pub use translator::{translate, FormatKind, VisualEdit};
pub use undo_stack::{EditOrigin, MutationTarget, Transaction, UndoStack};

// Re-export common types for convenience
pub use vlatex_parser::{Node, NodeId, NodeKind, TextEdit};
pub use vlatex_projector::{VisualBox, VisualTree};
