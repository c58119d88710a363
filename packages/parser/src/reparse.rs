//! Incremental reparse.
//!
//! After an edit only the smallest enclosing container whose delimiters were
//! left alone is parsed again. The candidate is parsed with the frames of its
//! ancestors on the stack; if its content no longer ends at its own closer,
//! the next enclosing container is tried, up to the whole document.
//!
//! Nodes of the new content take over the id of the old node that started at
//! the same (shifted) offset and has the same identity class, so typing inside
//! a paragraph keeps every surrounding node's identity.

use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

use crate::ast::{GroupDelim, Node, NodeId, NodeKind, Span};
use crate::emitter::{closer_len, opener_len};
use crate::error::StructuralError;
use crate::id_generator::IdGenerator;
use crate::parser::{argument_math, Frame, ParseOptions, Parser, Stop};
use crate::text::TextEdit;
use crate::tokenizer::{Rescan, Token};

/// Offset mapping from the coordinates the tree's cached spans are in to the
/// coordinates of the new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    start: usize,
    old_end: usize,
    new_end: usize,
}

impl Shift {
    /// Spans are already in new coordinates.
    pub fn identity() -> Self {
        Self {
            start: 0,
            old_end: 0,
            new_end: 0,
        }
    }

    pub fn from_edit(edit: &TextEdit) -> Self {
        Self {
            start: edit.start,
            old_end: edit.old_end(),
            new_end: edit.new_end(),
        }
    }

    /// New offset of an old offset outside the replaced range. Text inserted
    /// exactly at `offset` ends up after it.
    pub fn forward(&self, offset: usize) -> Option<usize> {
        if offset <= self.start {
            Some(offset)
        } else if offset >= self.old_end {
            Some(offset - self.old_end + self.new_end)
        } else {
            None
        }
    }

    /// Like [`Shift::forward`], but text inserted exactly at `offset` ends up
    /// before it.
    pub fn forward_end(&self, offset: usize) -> Option<usize> {
        if offset >= self.old_end {
            Some(offset - self.old_end + self.new_end)
        } else if offset <= self.start {
            Some(offset)
        } else {
            None
        }
    }

    /// New offsets an old node starting at `offset` may start at. A node
    /// starting exactly at a pure insertion may end up before or after it.
    fn node_starts(&self, offset: usize) -> [Option<usize>; 2] {
        if offset < self.start {
            [Some(offset), None]
        } else if offset == self.start {
            let after = (self.old_end == self.start && self.new_end != self.start)
                .then_some(self.new_end);
            [Some(offset), after]
        } else if offset >= self.old_end {
            [Some(offset - self.old_end + self.new_end), None]
        } else {
            [None, None]
        }
    }

    fn back_start(&self, offset: usize) -> usize {
        if offset <= self.start {
            offset
        } else if offset >= self.new_end {
            offset - self.new_end + self.old_end
        } else {
            self.start
        }
    }

    fn back_end(&self, offset: usize) -> usize {
        if offset >= self.new_end {
            offset - self.new_end + self.old_end
        } else {
            offset.max(self.old_end)
        }
    }
}

/// Outcome of an incremental reparse
#[derive(Debug, Clone)]
pub struct Reparse {
    /// The container whose content was parsed again
    pub container: NodeId,
    /// New content of the container; arguments of an environment are not part
    /// of it and stay as they are
    pub content: Vec<Node>,
    /// How many enclosing containers were tried and rejected first
    pub widened: usize,
}

impl Reparse {
    /// Replace the container's content in `tree`. Cached spans along the
    /// container's path are dropped; later siblings keep stale spans until
    /// [`refresh_spans`](crate::emitter::refresh_spans) runs.
    pub fn splice(self, tree: &mut Node) -> bool {
        let Some(container) = tree.find_mut(self.container) else {
            return false;
        };
        let body = container.body_start();
        container.children.truncate(body);
        container.children.extend(self.content);
        tree.invalidate_path(self.container)
    }
}

/// Reparse the region of `tree` touched by `rescan`.
///
/// `tree` holds spans in the coordinates `shift` maps from; `source` and
/// `rescan.tokens` are the new text and its tokens.
#[instrument(skip_all, fields(dirty = ?rescan.dirty, structural = rescan.structural))]
pub fn reparse(
    tree: &Node,
    source: &str,
    rescan: &Rescan,
    shift: &Shift,
    ids: &mut IdGenerator,
    options: &ParseOptions,
) -> Reparse {
    let dirty = rescan.dirty_span();
    let region = Span::new(shift.back_start(dirty.start), shift.back_end(dirty.end));
    let candidates = containers(tree, region, rescan.structural);

    for (widened, path) in candidates.iter().rev().enumerate() {
        let Some(container) = node_at_path(tree, path) else {
            continue;
        };
        let is_root = path.is_empty();
        let Some(mut content) =
            parse_content(tree, path, source, &rescan.tokens, shift, ids, options, is_root)
        else {
            debug!(container = %container.id, "Container no longer closes in place, widening");
            continue;
        };
        let old = &container.children[container.body_start()..];
        let reused = reconcile(old, &mut content, shift);
        debug!(
            container = %container.id,
            widened,
            nodes = content.iter().map(Node::node_count).sum::<usize>(),
            reused,
            "Reparsed region"
        );
        return Reparse {
            container: container.id,
            content,
            widened,
        };
    }

    // Only reachable if the tree has no cached spans at all
    let mut parser = Parser::new(source, &rescan.tokens, ids, options, vec![Frame::document()], 0);
    let (mut content, _) = parser.parse_sequence();
    reconcile(&tree.children, &mut content, shift);
    Reparse {
        container: tree.id,
        content,
        widened: candidates.len(),
    }
}

/// Carry the identities of `old` over to a freshly parsed tree of the same
/// source, as delivered by a background parse.
pub fn reconcile_document(old: &Node, mut new: Node) -> Node {
    new.id = old.id;
    reconcile(&old.children, &mut new.children, &Shift::identity());
    new
}

/// Paths (root first) to every container enclosing `region` that may be
/// parsed on its own.
fn containers(tree: &Node, region: Span, structural: bool) -> Vec<Vec<usize>> {
    let mut found = vec![Vec::new()];
    let mut path = Vec::new();
    let mut node = tree;
    loop {
        let next = node.children.iter().position(|child| {
            child
                .span
                .map_or(false, |s| s.start <= region.start && region.end <= s.end)
        });
        let Some(index) = next else {
            break;
        };
        node = &node.children[index];
        path.push(index);
        // Error regions are unstable; reparse them from an enclosing container
        if node.is_error() {
            break;
        }
        let encloses = content_span(node)
            .map_or(false, |c| c.start <= region.start && region.end <= c.end);
        if encloses && is_container(node, structural) {
            found.push(path.clone());
        }
    }
    found
}

/// Brace groups can always be parsed in isolation. Brackets, math and
/// environments take part in closer lookahead and mode decisions outside
/// their content, so a structural edit skips them.
fn is_container(node: &Node, structural: bool) -> bool {
    match &node.kind {
        NodeKind::Document => true,
        NodeKind::Group {
            delim: GroupDelim::Brace,
        } => true,
        NodeKind::Group {
            delim: GroupDelim::Bracket,
        }
        | NodeKind::MathSpan { .. }
        | NodeKind::Environment { .. } => !structural,
        _ => false,
    }
}

/// Span between a node's opener (and arguments) and its closer.
fn content_span(node: &Node) -> Option<Span> {
    let span = node.span?;
    let start = match &node.kind {
        NodeKind::Environment { .. } => node.children[..node.body_start()]
            .last()
            .and_then(|arg| arg.span)
            .map_or(span.start + opener_len(node), |arg| arg.end),
        _ => span.start + opener_len(node),
    };
    let end = span.end.checked_sub(closer_len(node))?;
    (start <= end).then(|| Span::new(start, end))
}

fn node_at_path<'a>(tree: &'a Node, path: &[usize]) -> Option<&'a Node> {
    path.iter()
        .try_fold(tree, |node, index| node.children.get(*index))
}

/// Parse the content of the container at `path`, or `None` if it no longer
/// ends exactly at the container's closer.
#[allow(clippy::too_many_arguments)]
fn parse_content(
    tree: &Node,
    path: &[usize],
    source: &str,
    tokens: &[Token],
    shift: &Shift,
    ids: &mut IdGenerator,
    options: &ParseOptions,
    is_root: bool,
) -> Option<Vec<Node>> {
    let mut frames = Vec::new();
    let mut math = false;
    let mut node = tree;
    for depth in 0..=path.len() {
        let next = path.get(depth).copied();
        match &node.kind {
            NodeKind::Command { name } => math = argument_math(name, math),
            // Environment arguments are read outside the environment's frame
            NodeKind::Environment { .. } if next.map_or(false, |i| i < node.body_start()) => {}
            _ => {
                if let Some(frame) = Frame::for_node(node, math, options) {
                    math = frame.math;
                    frames.push(frame);
                }
            }
        }
        if let Some(index) = next {
            node = node.children.get(index)?;
        }
    }

    let content = content_span(node)?;
    let start = shift.forward(content.start)?;
    let end = shift.forward_end(content.end)?;
    let first = tokens.partition_point(|t| t.span.start < start);
    let closer = tokens.partition_point(|t| t.span.start < end);
    if !starts_at(tokens, first, start, source.len()) || !starts_at(tokens, closer, end, source.len())
    {
        return None;
    }

    let mut parser = Parser::new(source, tokens, ids, options, frames, first);
    let (children, stop) = parser.parse_sequence();
    let closed_in_place = match stop {
        Stop::Eof => is_root,
        Stop::Own(_) => !is_root && parser.pos() == closer,
        Stop::Outer => false,
    };
    closed_in_place.then_some(children)
}

fn starts_at(tokens: &[Token], index: usize, offset: usize, len: usize) -> bool {
    tokens
        .get(index)
        .map_or(offset == len, |token| token.span.start == offset)
}

/// Identity class: what must agree, besides the start offset, for a new node
/// to inherit an old node's id. Error nodes share the class of the construct
/// they failed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Class {
    Text,
    Comment,
    Command,
    Brace,
    Bracket,
    Math,
    Environment,
    Unmatched,
}

impl Class {
    fn of(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Document => Class::Unmatched,
            NodeKind::TextRun { .. } => Class::Text,
            NodeKind::Comment { .. } => Class::Comment,
            NodeKind::Command { .. } => Class::Command,
            NodeKind::Group {
                delim: GroupDelim::Brace,
            } => Class::Brace,
            NodeKind::Group {
                delim: GroupDelim::Bracket,
            } => Class::Bracket,
            NodeKind::MathSpan { .. } => Class::Math,
            NodeKind::Environment { .. } => Class::Environment,
            NodeKind::Error { error, .. } => match error {
                StructuralError::UnclosedGroup { closer: ']' } => Class::Bracket,
                StructuralError::UnclosedGroup { .. } => Class::Brace,
                StructuralError::UnclosedEnvironment { .. } => Class::Environment,
                StructuralError::UnclosedMath { .. } => Class::Math,
                StructuralError::UnmatchedClose { .. } => Class::Unmatched,
            },
        }
    }
}

/// Give new nodes the ids of their old counterparts; returns how many were
/// matched. Unmatched nodes keep the fresh ids the parser gave them.
fn reconcile(old: &[Node], new: &mut [Node], shift: &Shift) -> usize {
    let mut index: HashMap<(usize, Class), NodeId> = HashMap::new();
    for node in old {
        node.walk(&mut |n| {
            let Some(span) = n.span else {
                return;
            };
            for start in shift.node_starts(span.start).into_iter().flatten() {
                index.entry((start, Class::of(&n.kind))).or_insert(n.id);
            }
        });
    }

    let mut used = HashSet::new();
    new.iter_mut()
        .map(|node| assign_ids(node, &index, &mut used))
        .sum()
}

fn assign_ids(
    node: &mut Node,
    index: &HashMap<(usize, Class), NodeId>,
    used: &mut HashSet<NodeId>,
) -> usize {
    let mut matched = 0;
    if let Some(span) = node.span {
        if let Some(id) = index.get(&(span.start, Class::of(&node.kind))) {
            if used.insert(*id) {
                node.id = *id;
                matched += 1;
            }
        }
    }
    for child in &mut node.children {
        matched += assign_ids(child, index, used);
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{emit_incremental, refresh_spans};
    use crate::parser::parse;
    use crate::tokenizer::{rescan, scan};

    fn spans(node: &Node) -> Vec<Option<Span>> {
        let mut out = Vec::new();
        node.walk(&mut |n| out.push(n.span));
        out
    }

    struct Outcome {
        before: Node,
        after: Node,
        result: Reparse,
    }

    /// Apply `edit` to `source`, reparse incrementally and check the spliced
    /// tree against a full parse of the new text.
    fn edit(source: &str, edit: TextEdit) -> Outcome {
        let tokens = scan(source);
        let mut ids = IdGenerator::default();
        let before = parse(source, &tokens, &mut ids);

        let mut text = source.to_string();
        edit.apply(&mut text);
        let rescanned = rescan(&tokens, &text, &edit);
        let result = reparse(
            &before,
            &text,
            &rescanned,
            &Shift::from_edit(&edit),
            &mut ids,
            &ParseOptions::default(),
        );

        let mut after = before.clone();
        assert!(result.clone().splice(&mut after));
        refresh_spans(&mut after);

        let full = parse(&text, &scan(&text), &mut IdGenerator::default());
        assert!(after.same_shape(&full), "{:?} vs {:?}", after, full);
        assert_eq!(spans(&after), spans(&full));
        Outcome {
            before,
            after,
            result,
        }
    }

    #[test]
    fn test_typing_in_group_reparses_group() {
        let out = edit("a {b} c", TextEdit::insert(4, "x"));
        let group = out.before.children[1].id;
        assert_eq!(out.result.container, group);
        assert_eq!(out.result.widened, 0);
        assert_eq!(out.after.children[1].children[0].text(), Some("bx"));
        assert_eq!(
            out.after.children[1].children[0].id,
            out.before.children[1].children[0].id
        );
        assert_eq!(out.after.children[2].id, out.before.children[2].id);
    }

    #[test]
    fn test_typing_in_math() {
        let out = edit("$ab$ c", TextEdit::insert(3, "c"));
        assert_eq!(out.result.container, out.before.children[0].id);
    }

    #[test]
    fn test_environment_keeps_arguments() {
        let source = "\\begin{tabular}{ll}a\\end{tabular}";
        let out = edit(source, TextEdit::insert(20, "b"));
        let env = &out.after.children[0];
        assert_eq!(out.result.container, env.id);
        assert_eq!(env.children[0].id, out.before.children[0].children[0].id);
        assert_eq!(env.children[1].text(), Some("ab"));
    }

    #[test]
    fn test_stray_closer_widens() {
        let out = edit("x {ab} y", TextEdit::insert(4, "}"));
        assert_eq!(out.result.container, out.before.id);
        assert_eq!(out.result.widened, 1);
        assert!(out.after.children.iter().any(Node::is_error));
    }

    #[test]
    fn test_structural_edit_skips_math() {
        let out = edit("{$a b$}", TextEdit::insert(3, "$$"));
        assert_eq!(out.result.container, out.before.children[0].id);
    }

    #[test]
    fn test_opening_environment_widens_to_document() {
        let out = edit("a\n\nb", TextEdit::insert(4, "\\begin{itemize}"));
        assert_eq!(out.result.container, out.before.id);
        assert!(out.after.children.last().map_or(false, Node::is_error));
    }

    #[test]
    fn test_deleting_everything() {
        let out = edit("\\textbf{Hi}", TextEdit::delete(0, 11));
        assert!(out.after.children.is_empty());
    }

    #[test]
    fn test_insert_before_node_keeps_its_id() {
        let out = edit("\\foo{a}", TextEdit::insert(0, "x "));
        assert_eq!(out.after.children[1].id, out.before.children[0].id);
    }

    #[test]
    fn test_identity_shift_after_tree_mutation() {
        let source = "{a}";
        let tokens = scan(source);
        let mut ids = IdGenerator::default();
        let before = parse(source, &tokens, &mut ids);

        let mut mutated = before.clone();
        let inserted = ids.new_id();
        mutated.children[0]
            .children
            .push(Node::text_run(inserted, "z"));
        let patch = emit_incremental(&mut mutated, source, &[inserted]).expect("patch");
        let mut text = source.to_string();
        patch.apply(&mut text);
        assert_eq!(text, "{az}");

        let rescanned = rescan(&tokens, &text, &patch);
        refresh_spans(&mut mutated);
        let result = reparse(
            &mutated,
            &text,
            &rescanned,
            &Shift::identity(),
            &mut ids,
            &ParseOptions::default(),
        );
        let mut after = mutated.clone();
        result.splice(&mut after);
        refresh_spans(&mut after);

        assert_eq!(after.children[0].id, before.children[0].id);
        assert_eq!(after.children[0].children.len(), 1);
        assert_eq!(after.children[0].children[0].id, before.children[0].children[0].id);
        assert_eq!(after.children[0].children[0].text(), Some("az"));
    }

    #[test]
    fn test_reconcile_document() {
        let source = "\\emph{x} $y$";
        let old = parse(source, &scan(source), &mut IdGenerator::from_seed(1));
        let new = parse(source, &scan(source), &mut IdGenerator::from_seed(2));
        let merged = reconcile_document(&old, new);
        assert!(merged.same_content(&old));
    }
}
