//! # Document
//!
//! One LaTeX source kept in sync with its tree, visual projection and
//! position map.
//!
//! Every change goes through the same commit path:
//!
//! ```text
//! mutations ─→ incremental emit ─→ source edit ─→ rescan ─→ reparse
//!                                                             │
//!   position map ←─ incremental projection ←─ canonical diff ←┘
//! ```
//!
//! The reparse step makes the tree agree with what a full parse of the new
//! source would produce; its difference from the mutated tree is appended to
//! the transaction, so undo restores the exact previous tree.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vlatex_parser::{
    emit_incremental, parse_source, reconcile_document, refresh_spans, rescan, reparse, IdGenerator,
    Node, NodeId, NodeKind, ParseOptions, Shift, Span, TextEdit, Token,
};
use vlatex_projector::{CachedMathLayout, MathLayout, PlainMathLayout, Projector, VisualTree};

use crate::background::BackgroundResult;
use crate::config::EditorConfig;
use crate::errors::{EditError, EditorError};
use crate::mutations::{apply_all, diff_children, Mutation};
use crate::position_map::PositionMap;
use crate::translator::{translate, VisualEdit};
use crate::undo_stack::{EditOrigin, MutationTarget, Transaction, UndoStack};

/// What a processed edit changed, for the UI to redraw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedRegion {
    /// The source text change, if the text changed
    pub edit: Option<TextEdit>,
    /// Visual coordinates of the redrawn region, in the new projection
    pub visual_range: (usize, usize),
    /// Nodes whose boxes were rebuilt
    pub rebuilt: Vec<NodeId>,
    pub generation: u64,
}

impl ChangedRegion {
    pub fn unchanged(generation: u64) -> Self {
        Self {
            edit: None,
            visual_range: (0, 0),
            rebuilt: Vec::new(),
            generation,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edit.is_none() && self.rebuilt.is_empty()
    }
}

/// A structural error found in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub id: NodeId,
    pub message: String,
    pub span: Option<Span>,
}

/// Editable LaTeX document
#[derive(Debug)]
pub struct Document {
    name: String,
    config: EditorConfig,
    state: SyncState,
    history: UndoStack,
}

/// Everything undo and redo need to mutate, apart from the history itself.
#[derive(Debug)]
struct SyncState {
    source: String,
    tokens: Vec<Token>,
    tree: Node,
    visual: VisualTree,
    positions: PositionMap,
    projector: Projector,
    options: ParseOptions,
    ids: IdGenerator,
    /// Bumped by every committed change
    generation: u64,
}

impl Document {
    /// Empty document
    pub fn new(name: &str, config: EditorConfig) -> Self {
        Self::load(name, "", config)
    }

    #[instrument(skip(source, config), fields(bytes = source.len()))]
    pub fn load(name: &str, source: &str, config: EditorConfig) -> Self {
        let options = config.parse_options();
        let mut ids = IdGenerator::new(name);
        let (tokens, tree) = parse_source(source, &mut ids, &options);
        let math: Arc<dyn MathLayout> = Arc::new(CachedMathLayout::new(PlainMathLayout));
        let projector = Projector::new(config.layout_rules(), math);
        let visual = projector.project(&tree);
        let positions = PositionMap::build(&tree, &visual);
        info!(
            tokens = tokens.len(),
            nodes = tree.node_count(),
            extent = visual.extent(),
            "Loaded document"
        );

        let history = UndoStack::with_max_levels(config.max_undo_levels)
            .with_coalescing(config.coalesce_edits.then_some(config.coalesce_window_ms));
        Self {
            name: name.to_string(),
            config,
            state: SyncState {
                source: source.to_string(),
                tokens,
                tree,
                visual,
                positions,
                projector,
                options,
                ids,
                generation: 0,
            },
            history,
        }
    }

    /// Use another math typesetter and project again.
    pub fn with_math_layout(mut self, math: Arc<dyn MathLayout>) -> Self {
        let state = &mut self.state;
        state.projector = Projector::new(self.config.layout_rules(), math);
        state.visual = state.projector.project(&state.tree);
        state.positions.rebuild(&state.tree, &state.visual);
        self
    }

    /// Apply an edit made on the visual document.
    ///
    /// The edit is rejected, and nothing changes, if it cannot be expressed as
    /// a well-formed transaction or would create a new structural error.
    pub fn apply_edit(&mut self, edit: &VisualEdit) -> Result<ChangedRegion, EditorError> {
        let result = self.state.commit_visual(edit);
        match result {
            Ok(Some((transaction, region))) => {
                self.history.record(transaction);
                Ok(region)
            }
            Ok(None) => Ok(ChangedRegion::unchanged(self.state.generation)),
            Err(err) => {
                warn!(error = %err, edit = %edit.description(), "Rejected visual edit");
                Err(err)
            }
        }
    }

    /// Apply a direct edit of the source text. Structural errors it creates
    /// are kept as error nodes.
    pub fn apply_source_edit(&mut self, edit: &TextEdit) -> Result<ChangedRegion, EditorError> {
        if !edit.fits(&self.state.source) {
            return Err(EditError::InvalidSourceEdit.into());
        }
        match self.state.commit_source(edit)? {
            Some((transaction, region)) => {
                self.history.record(transaction);
                Ok(region)
            }
            None => Ok(ChangedRegion::unchanged(self.state.generation)),
        }
    }

    pub fn undo(&mut self) -> Result<Option<ChangedRegion>, EditorError> {
        let region = self.history.undo(&mut self.state)?;
        if region.is_some() {
            info!(generation = self.state.generation, "Undo");
        }
        Ok(region)
    }

    pub fn redo(&mut self) -> Result<Option<ChangedRegion>, EditorError> {
        let region = self.history.redo(&mut self.state)?;
        if region.is_some() {
            info!(generation = self.state.generation, "Redo");
        }
        Ok(region)
    }

    /// End the current undo step
    pub fn seal(&mut self) {
        self.history.seal();
    }

    /// Install a full parse made off the editing thread. Returns `None` if
    /// the document changed since the parse was requested.
    pub fn accept_parse(&mut self, result: BackgroundResult) -> Option<ChangedRegion> {
        let state = &mut self.state;
        if result.generation != state.generation {
            debug!(
                requested = result.generation,
                current = state.generation,
                "Discarding stale background parse"
            );
            return None;
        }
        let tree = reconcile_document(&state.tree, result.tree);
        let changed = !tree.same_content(&state.tree);
        state.tree = tree;
        state.tokens = result.tokens;
        if !changed {
            debug!("Background parse matches the current tree");
            return Some(ChangedRegion::unchanged(state.generation));
        }
        let previous = state.visual.extent();
        state.visual = state.projector.project(&state.tree);
        state.positions.rebuild(&state.tree, &state.visual);
        info!(generation = state.generation, "Installed background parse");
        Some(ChangedRegion {
            edit: None,
            visual_range: (0, previous.max(state.visual.extent())),
            rebuilt: state.tree.ids().into_iter().collect(),
            generation: state.generation,
        })
    }

    /// Every error node, in document order
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut found = Vec::new();
        self.state.tree.walk(&mut |node| {
            if let NodeKind::Error { error, .. } = &node.kind {
                found.push(Diagnostic {
                    id: node.id,
                    message: error.to_string(),
                    span: node.span,
                });
            }
        });
        found
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn source(&self) -> &str {
        &self.state.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.state.tokens
    }

    pub fn tree(&self) -> &Node {
        &self.state.tree
    }

    pub fn visual(&self) -> &VisualTree {
        &self.state.visual
    }

    pub fn positions(&self) -> &PositionMap {
        &self.state.positions
    }

    pub fn projector(&self) -> &Projector {
        &self.state.projector
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.state.options
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}

impl SyncState {
    fn commit_visual(
        &mut self,
        edit: &VisualEdit,
    ) -> Result<Option<(Transaction, ChangedRegion)>, EditorError> {
        let transaction = translate(edit, &self.tree, &self.visual, &self.positions, &mut self.ids)?;
        if transaction.is_empty() {
            return Ok(None);
        }

        let mut work = self.tree.clone();
        let applied = apply_all(&transaction.mutations, &mut work)?;
        let Some(patch) = emit_incremental(&mut work, &self.source, &applied.touched) else {
            return Ok(None);
        };
        let patch = patch.trimmed(&self.source);
        let mut source = self.source.clone();
        patch.apply(&mut source);
        let rescanned = rescan(&self.tokens, &source, &patch);
        refresh_spans(&mut work);

        let reparsed = reparse(
            &work,
            &source,
            &rescanned,
            &Shift::identity(),
            &mut self.ids,
            &self.options,
        );
        let known = self.tree.error_ids();
        let mut introduced = None;
        for node in &reparsed.content {
            node.walk(&mut |n| {
                if let NodeKind::Error { error, .. } = &n.kind {
                    if introduced.is_none() && !known.contains(&n.id) {
                        introduced = Some(error.to_string());
                    }
                }
            });
        }
        if let Some(message) = introduced {
            return Err(EditError::IntroducesError { message }.into());
        }

        let container = reparsed.container;
        let canonical = canonical_diff(&work, container, &reparsed.content);
        let settled = apply_all(&canonical, &mut work)?;
        for id in &settled.touched {
            work.invalidate_path(*id);
        }
        refresh_spans(&mut work);
        if !canonical.is_empty() {
            debug!(mutations = canonical.len(), "Reparse adjusted the edited tree");
        }

        let Transaction {
            mut mutations,
            inverse,
            description,
            coalesce_key,
            ..
        } = transaction;
        mutations.extend(canonical);
        let mut undo = settled.inverse;
        undo.extend(inverse);
        let mut committed = Transaction::new(mutations, undo, EditOrigin::Visual)
            .with_coalesce_key(coalesce_key);
        committed.description = description;

        let region = self.install(work, source, rescanned.tokens, Some(patch), &[container]);
        Ok(Some((committed, region)))
    }

    fn commit_source(
        &mut self,
        edit: &TextEdit,
    ) -> Result<Option<(Transaction, ChangedRegion)>, EditorError> {
        let edit = edit.trimmed(&self.source);
        if edit.is_noop() {
            return Ok(None);
        }
        let mut source = self.source.clone();
        edit.apply(&mut source);
        let rescanned = rescan(&self.tokens, &source, &edit);
        let reparsed = reparse(
            &self.tree,
            &source,
            &rescanned,
            &Shift::from_edit(&edit),
            &mut self.ids,
            &self.options,
        );

        let container = reparsed.container;
        let mutations = canonical_diff(&self.tree, container, &reparsed.content);
        let mut work = self.tree.clone();
        let (transaction, applied) = Transaction::apply(&mut work, mutations, EditOrigin::Source)?;
        work.invalidate_path(container);
        for id in &applied.touched {
            work.invalidate_path(*id);
        }
        refresh_spans(&mut work);
        debug!(
            container = %container,
            widened = reparsed.widened,
            mutations = transaction.mutations.len(),
            "Applied source edit"
        );

        let transaction = transaction.with_description("Edit source");
        let region = self.install(work, source, rescanned.tokens, Some(edit), &[container]);
        Ok(Some((transaction, region)))
    }

    /// Make `tree` and `source` current and bring the derived views up to
    /// date for the subtrees rooted at `dirty`.
    fn install(
        &mut self,
        tree: Node,
        source: String,
        tokens: Vec<Token>,
        edit: Option<TextEdit>,
        dirty: &[NodeId],
    ) -> ChangedRegion {
        debug_assert_eq!(vlatex_parser::emit(&tree), source);
        let projection = self.projector.project_incremental(&tree, dirty, &self.visual);
        self.positions.rebuild_partial(&tree, &projection.tree, dirty);
        self.tree = tree;
        self.source = source;
        self.tokens = tokens;
        self.visual = projection.tree;
        self.generation += 1;

        ChangedRegion {
            edit,
            visual_range: self.visual_range(dirty),
            rebuilt: projection.rebuilt,
            generation: self.generation,
        }
    }

    /// Union of the boxes drawing `dirty`, or of their nearest boxed ancestors
    fn visual_range(&self, dirty: &[NodeId]) -> (usize, usize) {
        let mut range: Option<(usize, usize)> = None;
        for id in dirty {
            let Some(mut chain) = self.tree.ancestors_of(*id) else {
                continue;
            };
            chain.push(*id);
            let Some(slot) = chain.iter().rev().find_map(|c| self.positions.slot(*c)) else {
                continue;
            };
            range = Some(match range {
                Some((start, end)) => (start.min(slot.start), end.max(slot.end)),
                None => (slot.start, slot.end),
            });
        }
        range.unwrap_or((0, self.positions.extent()))
    }
}

impl MutationTarget for SyncState {
    type Output = ChangedRegion;
    type Error = EditorError;

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<ChangedRegion, EditorError> {
        let mut work = self.tree.clone();
        let applied = apply_all(mutations, &mut work)?;
        let patch = emit_incremental(&mut work, &self.source, &applied.touched)
            .map(|patch| patch.trimmed(&self.source))
            .filter(|patch| !patch.is_noop());
        let mut source = self.source.clone();
        let tokens = match &patch {
            Some(patch) => {
                patch.apply(&mut source);
                rescan(&self.tokens, &source, patch).tokens
            }
            None => self.tokens.clone(),
        };
        refresh_spans(&mut work);
        Ok(self.install(work, source, tokens, patch, &applied.touched))
    }
}

/// Mutations turning the content of `container` in `tree` into `content`
fn canonical_diff(tree: &Node, container: NodeId, content: &[Node]) -> Vec<Mutation> {
    let mut out = Vec::new();
    if let Some(node) = tree.find(container) {
        let body = node.body_start();
        diff_children(container, body, &node.children[body..], content, &mut out);
    }
    out
}
