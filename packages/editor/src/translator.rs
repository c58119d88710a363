//! Edit translator
//!
//! Turns an edit expressed in visual caret coordinates into a transaction of
//! tree mutations. Mutations are applied to a working copy as they are
//! planned, so later steps see the effect of earlier ones (split runs, moved
//! nodes) while coordinates are still resolved against the visual layout the
//! edit was made on.

use crate::errors::EditError;
use crate::mutations::{Mutation, MutationError};
use crate::position_map::{PositionMap, SlotKind, VisualSlot};
use crate::undo_stack::{EditOrigin, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use vlatex_parser::text::{escape_text, raw_offset};
use vlatex_parser::{GroupDelim, IdGenerator, Node, NodeId, NodeKind};
use vlatex_projector::{BoxKind, VisualBox, VisualTree};

/// An edit made on the rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VisualEdit {
    /// Typed text. Always escaped, never read as markup.
    InsertText { at: usize, text: String },
    DeleteRange { start: usize, end: usize },
    ApplyFormat { start: usize, end: usize, format: FormatKind },
    MoveBlock { start: usize, end: usize, target: usize },
}

impl VisualEdit {
    pub fn description(&self) -> String {
        match self {
            VisualEdit::InsertText { .. } => "Insert text".to_string(),
            VisualEdit::DeleteRange { .. } => "Delete".to_string(),
            VisualEdit::ApplyFormat { format, .. } => format!("Format {}", format.command()),
            VisualEdit::MoveBlock { .. } => "Move".to_string(),
        }
    }
}

/// Inline formats that map to a single-argument text command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatKind {
    Bold,
    Italic,
    Emphasis,
    Underline,
    Monospace,
    SmallCaps,
}

impl FormatKind {
    pub fn command(&self) -> &'static str {
        match self {
            FormatKind::Bold => "textbf",
            FormatKind::Italic => "textit",
            FormatKind::Emphasis => "emph",
            FormatKind::Underline => "underline",
            FormatKind::Monospace => "texttt",
            FormatKind::SmallCaps => "textsc",
        }
    }

    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "textbf" => Some(FormatKind::Bold),
            "textit" => Some(FormatKind::Italic),
            "emph" => Some(FormatKind::Emphasis),
            "underline" => Some(FormatKind::Underline),
            "texttt" => Some(FormatKind::Monospace),
            "textsc" => Some(FormatKind::SmallCaps),
            _ => None,
        }
    }
}

/// Where new or moved content goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Before(NodeId),
    After(NodeId),
    /// Appended to the children of a container
    Into(NodeId),
}

/// A box touched by a range: a node, or a text run cut at the range ends
#[derive(Debug, Clone, Copy)]
struct Covered {
    id: NodeId,
    start: usize,
    end: usize,
    text: bool,
}

/// Translate a visual edit into a transaction against `tree`.
///
/// `visual` and `positions` must describe `tree`. Fresh node ids are drawn
/// from `ids`. The tree itself is not modified.
pub fn translate(
    edit: &VisualEdit,
    tree: &Node,
    visual: &VisualTree,
    positions: &PositionMap,
    ids: &mut IdGenerator,
) -> Result<Transaction, EditError> {
    let mut translator = Translator::new(tree, visual, positions, ids);
    match edit {
        VisualEdit::InsertText { at, text } => translator.insert_text(*at, text)?,
        VisualEdit::DeleteRange { start, end } => translator.delete_range(*start, *end)?,
        VisualEdit::ApplyFormat { start, end, format } => {
            translator.apply_format(*start, *end, *format)?
        }
        VisualEdit::MoveBlock { start, end, target } => {
            translator.move_block(*start, *end, *target)?
        }
    }
    debug!(
        edit = %edit.description(),
        mutations = translator.mutations.len(),
        "Translated visual edit"
    );
    Ok(translator.finish(edit.description()))
}

struct Translator<'a> {
    work: Node,
    visual: &'a VisualTree,
    positions: &'a PositionMap,
    ids: &'a mut IdGenerator,
    mutations: Vec<Mutation>,
    inverse: Vec<Mutation>,
    coalesce_key: Option<NodeId>,
    /// Pieces of split text runs: original id to (visual offset, piece id)
    pieces: HashMap<NodeId, Vec<(usize, NodeId)>>,
}

impl<'a> Translator<'a> {
    fn new(
        tree: &Node,
        visual: &'a VisualTree,
        positions: &'a PositionMap,
        ids: &'a mut IdGenerator,
    ) -> Self {
        Self {
            work: tree.clone(),
            visual,
            positions,
            ids,
            mutations: Vec::new(),
            inverse: Vec::new(),
            coalesce_key: None,
            pieces: HashMap::new(),
        }
    }

    fn finish(mut self, description: String) -> Transaction {
        self.inverse.reverse();
        Transaction::new(self.mutations, self.inverse, EditOrigin::Visual)
            .with_description(description)
            .with_coalesce_key(self.coalesce_key)
    }

    fn push(&mut self, mutation: Mutation) -> Result<(), EditError> {
        let inverse = mutation.inverse(&self.work)?;
        mutation.apply(&mut self.work)?;
        self.mutations.push(mutation);
        self.inverse.push(inverse);
        Ok(())
    }

    fn check(&self, position: usize) -> Result<(), EditError> {
        let extent = self.positions.extent();
        if position > extent {
            return Err(EditError::OutOfRange { position, extent });
        }
        Ok(())
    }

    fn raw_text(&self, id: NodeId) -> Result<String, EditError> {
        self.work
            .find(id)
            .and_then(Node::text)
            .map(str::to_string)
            .ok_or(EditError::Mutation(MutationError::NotText(id)))
    }

    fn parent_of(&self, id: NodeId) -> Result<(NodeId, usize), EditError> {
        self.work
            .parent_of(id)
            .ok_or(EditError::Mutation(MutationError::ParentNotFound(id)))
    }

    // ----- insert -----

    /// Insert `text` as literal characters. It is always escaped, so markup
    /// such as `\end{itemize}` typed here shows up verbatim in the rendered
    /// document; structural text has to come in as a source edit.
    fn insert_text(&mut self, at: usize, text: &str) -> Result<(), EditError> {
        self.check(at)?;
        if text.is_empty() {
            return Ok(());
        }
        let raw = escape_text(text);
        let positions = self.positions;
        let slots = positions.slots();

        if let Some(inner) = deepest(slots, |s| s.splits_at(at)) {
            match inner.kind {
                SlotKind::Text => return self.insert_into_run(*inner, at - inner.start, &raw),
                SlotKind::Atomic => return Err(EditError::SplitsAtomic { position: at }),
                SlotKind::Container if at < inner.start + inner.lead => {
                    return Err(EditError::SplitsAtomic { position: at })
                }
                SlotKind::Container => {}
            }
        }
        if let Some(container) = self.empty_container(at) {
            let node = Node::text_run(self.ids.new_id(), raw);
            let (parent, index) = self.resolve(Anchor::Into(container), None)?;
            return self.push(Mutation::InsertNode {
                parent,
                index,
                node,
            });
        }
        let left = deepest(slots, |s| s.kind == SlotKind::Text && s.end == at);
        if let Some(run) = left {
            return self.insert_into_run(*run, run.extent(), &raw);
        }
        let right = deepest(slots, |s| s.kind == SlotKind::Text && s.start == at);
        if let Some(run) = right {
            return self.insert_into_run(*run, 0, &raw);
        }

        let node = Node::text_run(self.ids.new_id(), raw);
        let anchor = self.anchor_at(at);
        let (parent, index) = self.resolve(anchor, None)?;
        self.push(Mutation::InsertNode {
            parent,
            index,
            node,
        })
    }

    fn insert_into_run(&mut self, run: VisualSlot, offset: usize, raw: &str) -> Result<(), EditError> {
        let text = self.raw_text(run.id)?;
        let at = raw_offset(&text, offset);
        let mut updated = String::with_capacity(text.len() + raw.len());
        updated.push_str(&text[..at]);
        updated.push_str(raw);
        updated.push_str(&text[at..]);
        self.coalesce_key = Some(run.id);
        self.push(Mutation::ReplaceText {
            id: run.id,
            text: updated,
        })
    }

    /// The innermost empty box at `at` that can take content
    fn empty_container(&self, at: usize) -> Option<NodeId> {
        deepest(self.positions.slots(), |s| {
            s.start == at
                && s.extent() == 0
                && s.kind == SlotKind::Container
                && self.work.find(s.id).map_or(false, accepts_content)
        })
        .map(|slot| slot.id)
    }

    /// Insertion anchor for a caret position between boxes
    fn anchor_at(&self, at: usize) -> Anchor {
        let slots = self.positions.slots();
        let root = self.work.id;
        if let Some(container) = self.empty_container(at) {
            return Anchor::Into(container);
        }
        if let Some(slot) = deepest(slots, |s| s.start == at && s.extent() > 0 && s.id != root) {
            return Anchor::Before(self.content_level(slot.id));
        }
        if let Some(slot) = deepest(slots, |s| s.end == at && s.extent() > 0 && s.id != root) {
            return Anchor::After(self.content_level(slot.id));
        }
        Anchor::Into(root)
    }

    /// Walk out of argument positions, where free content cannot go.
    fn content_level(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some((parent, index)) = self.work.parent_of(current) {
            let in_argument = self
                .work
                .find(parent)
                .map_or(false, |node| index < node.body_start());
            if !in_argument {
                break;
            }
            current = parent;
        }
        current
    }

    /// Parent and index for an anchor; `moving` is detached first.
    fn resolve(&self, anchor: Anchor, moving: Option<NodeId>) -> Result<(NodeId, usize), EditError> {
        let detached = moving.and_then(|id| self.work.parent_of(id));
        match anchor {
            Anchor::Before(id) | Anchor::After(id) => {
                let (parent, at) = self.parent_of(id)?;
                let mut index = if matches!(anchor, Anchor::After(_)) { at + 1 } else { at };
                if let Some((from, old)) = detached {
                    if from == parent && old < index {
                        index -= 1;
                    }
                }
                Ok((parent, index))
            }
            Anchor::Into(id) => {
                let node = self
                    .work
                    .find(id)
                    .ok_or(EditError::Mutation(MutationError::ParentNotFound(id)))?;
                let mut index = node.children.len();
                if detached.map_or(false, |(from, _)| from == id) {
                    index -= 1;
                }
                Ok((id, index))
            }
        }
    }

    // ----- delete -----

    fn delete_range(&mut self, start: usize, end: usize) -> Result<(), EditError> {
        let (start, end) = ordered(start, end);
        self.check(end)?;
        if start == end {
            return Ok(());
        }
        let visual = self.visual;
        self.delete_children(&visual.root, visual.root.lead, start, end)
    }

    fn delete_children(&mut self, parent: &VisualBox, first: usize, start: usize, end: usize) -> Result<(), EditError> {
        let mut cursor = first;
        for child in &parent.children {
            let child_start = cursor;
            cursor += child.extent;
            self.delete_box(child, child_start, cursor, start, end)?;
        }
        Ok(())
    }

    fn delete_box(
        &mut self,
        visual: &VisualBox,
        box_start: usize,
        box_end: usize,
        start: usize,
        end: usize,
    ) -> Result<(), EditError> {
        let overlaps = box_start < end && start < box_end;
        let empty_inside = box_start == box_end && start < box_start && box_end < end;
        if !overlaps && !empty_inside {
            return Ok(());
        }
        let Some(id) = visual.node else {
            return self.delete_children(visual, box_start + visual.lead, start, end);
        };
        let covers = start <= box_start && box_end <= end;

        if visual.is_atomic() {
            return self.push(Mutation::DeleteNode { id });
        }
        if let BoxKind::GlyphRun { .. } = visual.kind {
            if covers {
                return self.push(Mutation::DeleteNode { id });
            }
            let text = self.raw_text(id)?;
            let from = raw_offset(&text, start.max(box_start) - box_start);
            let to = raw_offset(&text, end.min(box_end) - box_start);
            let mut updated = String::with_capacity(text.len());
            updated.push_str(&text[..from]);
            updated.push_str(&text[to..]);
            return self.push(Mutation::ReplaceText { id, text: updated });
        }
        if covers && (start < box_start || box_end < end) {
            return self.push(Mutation::DeleteNode { id });
        }

        // The range cuts an error marker: drop the marker, keep what's left.
        let unwrap = matches!(visual.kind, BoxKind::Error { .. })
            && start < box_start + visual.lead
            && box_start < end;
        self.delete_children(visual, box_start + visual.lead, start, end)?;
        if unwrap {
            self.unwrap(id)?;
        }
        Ok(())
    }

    /// Replace a node by `children` of its own, then remove it.
    fn hoist(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<(), EditError> {
        let (parent, index) = self.parent_of(id)?;
        for (offset, child) in children.into_iter().enumerate() {
            self.push(Mutation::MoveNode {
                id: child,
                parent,
                index: index + offset,
            })?;
        }
        self.push(Mutation::DeleteNode { id })
    }

    fn unwrap(&mut self, id: NodeId) -> Result<(), EditError> {
        let children = self
            .work
            .find(id)
            .map(|node| node.children.iter().map(|c| c.id).collect())
            .unwrap_or_default();
        self.hoist(id, children)
    }

    // ----- format -----

    fn apply_format(&mut self, start: usize, end: usize, format: FormatKind) -> Result<(), EditError> {
        let (start, end) = ordered(start, end);
        self.check(end)?;
        if start == end {
            return Ok(());
        }

        let existing = deepest(self.positions.slots(), |s| {
            s.start == start
                && s.end == end
                && s.kind == SlotKind::Container
                && self.format_of(s.id).is_some()
        })
        .map(|slot| slot.id);
        if let Some(command) = existing {
            if self.format_of(command) == Some(format) {
                return self.remove_format(command);
            }
            return self.push(Mutation::SetAttribute {
                id: command,
                kind: NodeKind::Command {
                    name: format.command().to_string(),
                },
            });
        }

        let covered = self.cover(start, end)?;
        self.split_at(start)?;
        self.split_at(end)?;
        let nodes = self.covered_nodes(&covered, start, end);
        let Some(&first) = nodes.first() else {
            return Ok(());
        };
        let (parent, index) = self.parent_of(first)?;

        let group = Node::new(
            self.ids.new_id(),
            NodeKind::Group {
                delim: GroupDelim::Brace,
            },
        );
        let group_id = group.id;
        let command = Node::new(
            self.ids.new_id(),
            NodeKind::Command {
                name: format.command().to_string(),
            },
        )
        .with_children(vec![group]);
        self.push(Mutation::InsertNode {
            parent,
            index,
            node: command,
        })?;
        for (offset, id) in nodes.into_iter().enumerate() {
            self.push(Mutation::MoveNode {
                id,
                parent: group_id,
                index: offset,
            })?;
        }
        Ok(())
    }

    fn format_of(&self, id: NodeId) -> Option<FormatKind> {
        match &self.work.find(id)?.kind {
            NodeKind::Command { name } => FormatKind::from_command(name),
            _ => None,
        }
    }

    fn remove_format(&mut self, command: NodeId) -> Result<(), EditError> {
        let content = self
            .work
            .find(command)
            .and_then(|node| node.children.iter().rev().find(|arg| is_brace_group(arg)))
            .map(|group| group.children.iter().map(|c| c.id).collect())
            .unwrap_or_default();
        self.hoist(command, content)
    }

    // ----- move -----

    fn move_block(&mut self, start: usize, end: usize, target: usize) -> Result<(), EditError> {
        let (start, end) = ordered(start, end);
        self.check(end)?;
        self.check(target)?;
        if start < target && target < end {
            return Err(EditError::TargetInsideRange { target });
        }
        if start == end || target == start || target == end {
            return Ok(());
        }

        let covered = self.cover(start, end)?;
        let target_run = deepest(self.positions.slots(), |s| s.splits_at(target)).copied();
        let anchor = match target_run {
            Some(slot) if slot.kind == SlotKind::Text => None,
            Some(slot) if slot.kind == SlotKind::Atomic || target < slot.start + slot.lead => {
                return Err(EditError::SplitsAtomic { position: target })
            }
            _ => Some(self.anchor_at(target)),
        };

        self.split_at(start)?;
        self.split_at(end)?;
        let anchor = match anchor {
            Some(Anchor::After(id)) => Anchor::After(self.last_piece(id)),
            Some(other) => other,
            None => match self.split_at(target)? {
                Some(piece) => Anchor::Before(piece),
                None => self.anchor_at(target),
            },
        };

        let nodes = self.covered_nodes(&covered, start, end);
        let mut anchor = anchor;
        for id in nodes {
            let (parent, index) = self.resolve(anchor, Some(id))?;
            self.push(Mutation::MoveNode { id, parent, index })?;
            anchor = Anchor::After(id);
        }
        Ok(())
    }

    // ----- ranges -----

    /// Boxes covered by `start..end`, all children of one tree node.
    fn cover(&self, start: usize, end: usize) -> Result<Vec<Covered>, EditError> {
        let crosses = EditError::CrossesStructure { start, end };
        let (container, first) = innermost_container(&self.visual.root, 0, start, end);
        let mut boxes = Vec::new();
        flatten(container, first, start, end, &mut boxes);

        let mut covered = Vec::new();
        for (visual, box_start, box_end) in boxes {
            let Some(id) = visual.node else { continue };
            let whole = start <= box_start && box_end <= end;
            let text = matches!(visual.kind, BoxKind::GlyphRun { .. });
            if !whole && !text {
                if visual.is_atomic() {
                    let position = if box_start < start { start } else { end };
                    return Err(EditError::SplitsAtomic { position });
                }
                return Err(crosses);
            }
            covered.push(Covered {
                id,
                start: box_start,
                end: box_end,
                text,
            });
        }

        let mut parents = covered.iter().map(|c| self.work.parent_of(c.id).map(|(p, _)| p));
        if let Some(first) = parents.next() {
            if first.is_none() || parents.any(|p| p != first) {
                return Err(crosses);
            }
        }
        Ok(covered)
    }

    /// Split the text run strictly containing `coord`, returning the piece
    /// that starts there.
    fn split_at(&mut self, coord: usize) -> Result<Option<NodeId>, EditError> {
        let Some(run) = deepest(self.positions.slots(), |s| {
            s.kind == SlotKind::Text && s.splits_at(coord)
        })
        .copied() else {
            return Ok(None);
        };
        let local = coord - run.start;
        let pieces = self
            .pieces
            .get(&run.id)
            .cloned()
            .unwrap_or_else(|| vec![(0, run.id)]);
        let slot = pieces.partition_point(|(offset, _)| *offset <= local) - 1;
        let (piece_start, piece) = pieces[slot];
        if piece_start == local {
            return Ok(Some(piece));
        }

        let text = self.raw_text(piece)?;
        let at = raw_offset(&text, local - piece_start);
        let (parent, index) = self.parent_of(piece)?;
        let right = self.ids.new_id();
        self.push(Mutation::ReplaceText {
            id: piece,
            text: text[..at].to_string(),
        })?;
        self.push(Mutation::InsertNode {
            parent,
            index: index + 1,
            node: Node::text_run(right, &text[at..]),
        })?;

        let mut pieces = pieces;
        pieces.insert(slot + 1, (local, right));
        self.pieces.insert(run.id, pieces);
        Ok(Some(right))
    }

    fn last_piece(&self, id: NodeId) -> NodeId {
        self.pieces
            .get(&id)
            .and_then(|pieces| pieces.last())
            .map_or(id, |(_, piece)| *piece)
    }

    /// Node ids covering the range, after the boundary runs were split.
    fn covered_nodes(&self, covered: &[Covered], start: usize, end: usize) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        for box_ in covered {
            if !box_.text {
                nodes.push(box_.id);
                continue;
            }
            let from = start.max(box_.start) - box_.start;
            let to = end.min(box_.end) - box_.start;
            match self.pieces.get(&box_.id) {
                Some(pieces) => nodes.extend(
                    pieces
                        .iter()
                        .filter(|(offset, _)| from <= *offset && *offset < to)
                        .map(|(_, piece)| *piece),
                ),
                None => nodes.push(box_.id),
            }
        }
        nodes
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn deepest<'s>(slots: &'s [VisualSlot], pred: impl Fn(&VisualSlot) -> bool) -> Option<&'s VisualSlot> {
    slots.iter().filter(|slot| pred(slot)).max_by_key(|slot| slot.depth)
}

fn is_brace_group(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Group {
            delim: GroupDelim::Brace
        }
    )
}

/// Nodes whose children are free content
fn accepts_content(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Document | NodeKind::Group { .. } | NodeKind::Environment { .. }
    )
}

/// The deepest non-atomic box whose content holds `start..end`, with the
/// coordinate of its first child.
fn innermost_container(visual: &VisualBox, box_start: usize, start: usize, end: usize) -> (&VisualBox, usize) {
    let first = box_start + visual.lead;
    let mut cursor = first;
    for child in &visual.children {
        let child_start = cursor;
        cursor += child.extent;
        let opens = child_start + child.lead;
        let descend = !child.is_atomic()
            && !matches!(child.kind, BoxKind::GlyphRun { .. })
            && opens <= start
            && end <= cursor
            && child.extent > 0;
        if descend {
            return innermost_container(child, child_start, start, end);
        }
    }
    (visual, first)
}

/// Children of `visual` touched by the range, with synthetic boxes replaced
/// by their own children.
fn flatten<'v>(
    visual: &'v VisualBox,
    first: usize,
    start: usize,
    end: usize,
    out: &mut Vec<(&'v VisualBox, usize, usize)>,
) {
    let mut cursor = first;
    for child in &visual.children {
        let child_start = cursor;
        cursor += child.extent;
        let overlaps = child_start < end && start < cursor;
        let empty_inside = child_start == cursor && start < child_start && cursor < end;
        if !overlaps && !empty_inside {
            continue;
        }
        if child.node.is_none() {
            flatten(child, child_start + child.lead, start, end, out);
        } else {
            out.push((child, child_start, cursor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::apply_all;
    use vlatex_parser::{emit, parse_source, ParseOptions};
    use vlatex_projector::Projector;

    struct Fixture {
        tree: Node,
        visual: VisualTree,
        positions: PositionMap,
        ids: IdGenerator,
    }

    fn fixture(source: &str) -> Fixture {
        let mut ids = IdGenerator::new("translate.tex");
        let (_, tree) = parse_source(source, &mut ids, &ParseOptions::default());
        let visual = Projector::default().project(&tree);
        let positions = PositionMap::build(&tree, &visual);
        Fixture {
            tree,
            visual,
            positions,
            ids,
        }
    }

    fn run(source: &str, edit: VisualEdit) -> Result<(Transaction, String), EditError> {
        let mut f = fixture(source);
        let transaction = translate(&edit, &f.tree, &f.visual, &f.positions, &mut f.ids)?;
        let mut tree = f.tree.clone();
        apply_all(&transaction.mutations, &mut tree)?;
        Ok((transaction, emit(&tree)))
    }

    fn names(transaction: &Transaction) -> Vec<&'static str> {
        transaction.mutations.iter().map(Mutation::name).collect()
    }

    #[test]
    fn test_insert_inside_run() {
        let (transaction, source) = run(
            "Hello world",
            VisualEdit::InsertText {
                at: 5,
                text: ",".to_string(),
            },
        )
        .unwrap();
        assert_eq!(source, "Hello, world");
        assert_eq!(names(&transaction), vec!["replace-text"]);
        assert!(transaction.coalesce_key.is_some());
    }

    #[test]
    fn test_insert_escapes_special_characters() {
        let (_, source) = run(
            "Cost",
            VisualEdit::InsertText {
                at: 4,
                text: " 50%".to_string(),
            },
        )
        .unwrap();
        assert_eq!(source, "Cost 50\\%");

        let (_, source) = run(
            "A",
            VisualEdit::InsertText {
                at: 1,
                text: "\\end{itemize}".to_string(),
            },
        )
        .unwrap();
        assert_eq!(source, "A\\textbackslash{}end\\{itemize\\}");
    }

    #[test]
    fn test_insert_into_empty_group() {
        let (transaction, source) = run(
            "\\textbf{} x",
            VisualEdit::InsertText {
                at: 0,
                text: "Hi".to_string(),
            },
        )
        .unwrap();
        assert_eq!(source, "\\textbf{Hi} x");
        assert_eq!(names(&transaction), vec!["insert-node"]);
    }

    #[test]
    fn test_insert_inside_atomic_box_fails() {
        let result = run(
            "a $xy$ b",
            VisualEdit::InsertText {
                at: 3,
                text: "!".to_string(),
            },
        );
        assert!(matches!(result, Err(EditError::SplitsAtomic { position: 3 })));
    }

    #[test]
    fn test_out_of_range() {
        let result = run(
            "abc",
            VisualEdit::DeleteRange { start: 1, end: 9 },
        );
        assert_eq!(
            result.err(),
            Some(EditError::OutOfRange {
                position: 9,
                extent: 3
            })
        );
    }

    #[test]
    fn test_delete_bold_content_keeps_command() {
        let (transaction, source) =
            run("\\textbf{Hi} $x$", VisualEdit::DeleteRange { start: 0, end: 2 }).unwrap();
        assert_eq!(names(&transaction), vec!["delete-node"]);
        assert_eq!(source, "\\textbf{} $x$");
    }

    #[test]
    fn test_delete_partial_runs_and_atomic() {
        let (_, source) =
            run("ab $x$ cd", VisualEdit::DeleteRange { start: 1, end: 5 }).unwrap();
        assert_eq!(source, "acd");
    }

    #[test]
    fn test_delete_whole_command_inside_range() {
        let (_, source) = run(
            "a \\emph{b} c",
            VisualEdit::DeleteRange { start: 1, end: 4 },
        )
        .unwrap();
        assert_eq!(source, "ac");
    }

    #[test]
    fn test_delete_error_marker_hoists_content() {
        let (_, source) = run("x {abc", VisualEdit::DeleteRange { start: 2, end: 3 }).unwrap();
        assert_eq!(source, "x abc");
    }

    #[test]
    fn test_format_wraps_part_of_run() {
        let (_, source) = run(
            "Hello world",
            VisualEdit::ApplyFormat {
                start: 6,
                end: 11,
                format: FormatKind::Bold,
            },
        )
        .unwrap();
        assert_eq!(source, "Hello \\textbf{world}");
    }

    #[test]
    fn test_format_middle_of_run() {
        let (transaction, source) = run(
            "abcde",
            VisualEdit::ApplyFormat {
                start: 1,
                end: 3,
                format: FormatKind::Italic,
            },
        )
        .unwrap();
        assert_eq!(source, "a\\textit{bc}de");
        assert_eq!(
            names(&transaction),
            vec![
                "replace-text",
                "insert-node",
                "replace-text",
                "insert-node",
                "insert-node",
                "move-node"
            ]
        );
    }

    #[test]
    fn test_format_toggle_removes_and_changes() {
        let (_, removed) = run(
            "a \\textbf{bc} d",
            VisualEdit::ApplyFormat {
                start: 2,
                end: 4,
                format: FormatKind::Bold,
            },
        )
        .unwrap();
        assert_eq!(removed, "a bc d");

        let (transaction, changed) = run(
            "a \\textbf{bc} d",
            VisualEdit::ApplyFormat {
                start: 2,
                end: 4,
                format: FormatKind::Emphasis,
            },
        )
        .unwrap();
        assert_eq!(names(&transaction), vec!["set-attribute"]);
        assert_eq!(changed, "a \\emph{bc} d");
    }

    #[test]
    fn test_format_across_structure_fails() {
        let result = run(
            "ab \\emph{cd} ef",
            VisualEdit::ApplyFormat {
                start: 1,
                end: 4,
                format: FormatKind::Bold,
            },
        );
        assert!(matches!(result, Err(EditError::CrossesStructure { .. })));
    }

    #[test]
    fn test_move_block_forward() {
        let (_, source) = run(
            "ab $x$ cd",
            VisualEdit::MoveBlock {
                start: 3,
                end: 4,
                target: 7,
            },
        )
        .unwrap();
        assert_eq!(source, "ab  cd$x$");

        let (_, source) = run(
            "ab $x$ cd",
            VisualEdit::MoveBlock {
                start: 3,
                end: 4,
                target: 6,
            },
        )
        .unwrap();
        assert_eq!(source, "ab  c$x$d");
    }

    #[test]
    fn test_move_within_one_run() {
        let (_, source) = run(
            "abcdef",
            VisualEdit::MoveBlock {
                start: 2,
                end: 4,
                target: 5,
            },
        )
        .unwrap();
        assert_eq!(source, "abecdf");

        let (_, source) = run(
            "abcdef",
            VisualEdit::MoveBlock {
                start: 3,
                end: 5,
                target: 1,
            },
        )
        .unwrap();
        assert_eq!(source, "adebcf");
    }

    #[test]
    fn test_move_target_inside_range() {
        let result = run(
            "abcdef",
            VisualEdit::MoveBlock {
                start: 1,
                end: 4,
                target: 2,
            },
        );
        assert_eq!(result.err(), Some(EditError::TargetInsideRange { target: 2 }));
    }

    #[test]
    fn test_edits_serialize() {
        let edit = VisualEdit::ApplyFormat {
            start: 0,
            end: 2,
            format: FormatKind::SmallCaps,
        };
        let json = serde_json::to_value(&edit).unwrap();
        assert_eq!(json["type"], "applyFormat");
        assert_eq!(json["format"], "smallCaps");
        let back: VisualEdit = serde_json::from_value(json).unwrap();
        assert_eq!(back, edit);
    }
}
