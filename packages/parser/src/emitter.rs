//! Source emitter.
//!
//! Every node has one canonical textual form, and because whitespace, comments
//! and malformed openers are all kept as nodes, the canonical form of a parsed
//! tree is exactly the text it was parsed from.

use std::cmp::Reverse;
use tracing::debug;

use crate::ast::{Node, NodeId, NodeKind, Span};
use crate::text::TextEdit;

/// Serialize a whole tree.
pub fn emit(tree: &Node) -> String {
    let mut out = String::with_capacity(emitted_len(tree));
    write_node(tree, &mut out);
    out
}

/// Canonical text of a single node and its subtree.
pub fn node_text(node: &Node) -> String {
    emit(node)
}

pub fn write_node(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Document => write_children(node, out),
        NodeKind::TextRun { text } | NodeKind::Comment { text } => out.push_str(text),
        NodeKind::Command { name } => {
            out.push('\\');
            out.push_str(name);
            write_children(node, out);
        }
        NodeKind::Group { delim } => {
            out.push_str(delim.open());
            write_children(node, out);
            out.push_str(delim.close());
        }
        NodeKind::MathSpan { delim } => {
            out.push_str(delim.open());
            write_children(node, out);
            out.push_str(delim.close());
        }
        NodeKind::Environment { name, .. } => {
            out.push_str("\\begin{");
            out.push_str(name);
            out.push('}');
            write_children(node, out);
            out.push_str("\\end{");
            out.push_str(name);
            out.push('}');
        }
        NodeKind::Error { open, .. } => {
            out.push_str(open);
            write_children(node, out);
        }
    }
}

fn write_children(node: &Node, out: &mut String) {
    for child in &node.children {
        write_node(child, out);
    }
}

/// Byte length of the canonical text, without building it.
pub fn emitted_len(node: &Node) -> usize {
    opener_len(node) + node.children.iter().map(emitted_len).sum::<usize>() + closer_len(node)
}

/// Length of the text a node emits before its first child.
pub fn opener_len(node: &Node) -> usize {
    match &node.kind {
        NodeKind::Document => 0,
        NodeKind::TextRun { text } | NodeKind::Comment { text } => text.len(),
        NodeKind::Command { name } => 1 + name.len(),
        NodeKind::Group { delim } => delim.open().len(),
        NodeKind::MathSpan { delim } => delim.open().len(),
        NodeKind::Environment { name, .. } => "\\begin{}".len() + name.len(),
        NodeKind::Error { open, .. } => open.len(),
    }
}

/// Length of the text a node emits after its last child.
pub fn closer_len(node: &Node) -> usize {
    match &node.kind {
        NodeKind::Group { delim } => delim.close().len(),
        NodeKind::MathSpan { delim } => delim.close().len(),
        NodeKind::Environment { name, .. } => "\\end{}".len() + name.len(),
        _ => 0,
    }
}

/// Re-emit only the dirty parts of a mutated tree and patch the previous text.
///
/// Each dirty id is widened to its nearest ancestor-or-self that still carries
/// a cached span from before the mutation; those regions are re-rendered and
/// merged into one edit against `source`. Cached spans of every dirty node
/// and its ancestors are dropped, including dirty nodes whose region was
/// merged into an enclosing patch; recomputing them is left to
/// [`refresh_spans`].
pub fn emit_incremental(tree: &mut Node, source: &str, dirty: &[NodeId]) -> Option<TextEdit> {
    let mut roots: Vec<(Span, usize, NodeId)> = Vec::new();
    for id in dirty {
        let Some(path) = tree.path_to(*id) else {
            continue;
        };
        let mut chain = Vec::with_capacity(path.len() + 1);
        let mut node: &Node = tree;
        chain.push(node);
        for index in &path {
            node = &node.children[*index];
            chain.push(node);
        }
        if let Some((depth, anchor)) = chain
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, n)| n.span.map(|span| (depth, (span, n.id))))
        {
            roots.push((anchor.0, depth, anchor.1));
        }
    }
    for id in dirty {
        tree.invalidate_path(*id);
    }
    if roots.is_empty() {
        return None;
    }

    roots.sort_by_key(|(span, depth, _)| (span.start, Reverse(span.end), *depth));
    let mut patches: Vec<(Span, NodeId)> = Vec::new();
    for (span, _, id) in roots {
        match patches.last() {
            Some((last, _)) if span.start < last.end || span == *last => continue,
            _ => patches.push((span, id)),
        }
    }

    let start = patches[0].0.start;
    let end = patches[patches.len() - 1].0.end;
    let mut new_text = String::new();
    let mut cursor = start;
    for (span, id) in &patches {
        new_text.push_str(&source[cursor..span.start]);
        if let Some(node) = tree.find(*id) {
            write_node(node, &mut new_text);
        }
        cursor = span.end;
    }
    for (_, id) in &patches {
        tree.invalidate_path(*id);
    }
    debug!(patches = patches.len(), start, old_len = end - start, "Emitted incremental patch");
    if source[start..end] == new_text {
        return None;
    }
    Some(TextEdit::new(start, end - start, new_text))
}

/// Fill in missing or stale cached spans, starting the tree at offset 0.
///
/// A subtree whose cached span starts where it should is trusted as a whole,
/// so every mutated node must have had its path invalidated first (see
/// [`emit_incremental`]); everything else is recomputed from canonical text
/// lengths.
pub fn refresh_spans(tree: &mut Node) {
    assign_spans(tree, 0);
}

fn assign_spans(node: &mut Node, start: usize) -> usize {
    if let Some(span) = node.span {
        if span.start == start {
            return span.end;
        }
    }
    let mut cursor = start + opener_len(node);
    for child in &mut node.children {
        cursor = assign_spans(child, cursor);
    }
    let end = cursor + closer_len(node);
    node.span = Some(Span::new(start, end));
    end
}

/// Drop every cached span below and including `node`, then recompute.
pub fn recompute_spans(node: &mut Node, start: usize) -> usize {
    node.clear_spans();
    assign_spans(node, start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::GroupDelim;
    use crate::id_generator::IdGenerator;
    use crate::parser::parse;
    use crate::tokenizer::scan;

    fn parse_str(source: &str) -> Node {
        parse(source, &scan(source), &mut IdGenerator::default())
    }

    #[test]
    fn test_round_trip() {
        let sources = [
            "\\textbf{Hi} $x$",
            "\\begin{itemize}\\item A",
            "a}b{c",
            "% comment\n\\section[s]{T}\n\n\\[ x^2 \\] and $$y$$ \\(z\\)",
            "\\begin{tabular}{ll}a & b \\\\ \\hline\\end{tabular}",
            "\\begin{a}{\\end{a}}\\end{a}\\end{b}",
            "$a$$b$ \\{ \\} \\$ 100\\% \\",
        ];
        for source in sources {
            assert_eq!(emit(&parse_str(source)), source);
        }
    }

    #[test]
    fn test_emitted_len_matches_emit() {
        let tree = parse_str("\\begin{x}[o]{$a$}\\end{x} \\foo{");
        assert_eq!(emitted_len(&tree), emit(&tree).len());
    }

    #[test]
    fn test_incremental_patch_of_group() {
        let source = "\\textbf{Hi} $x$";
        let mut tree = parse_str(source);
        let group_id = tree.children[0].children[0].id;
        tree.children[0].children[0].children.clear();

        let edit = emit_incremental(&mut tree, source, &[group_id]).expect("patch");
        assert_eq!(edit, TextEdit::new(7, 4, "{}"));
        assert_eq!(tree.span, None);
        assert_eq!(tree.children[0].span, None);

        let mut patched = source.to_string();
        edit.apply(&mut patched);
        assert_eq!(patched, "\\textbf{} $x$");

        refresh_spans(&mut tree);
        assert_eq!(tree.span, Some(Span::new(0, patched.len())));
        assert_eq!(tree.children[2].span, Some(Span::new(10, 13)));
    }

    #[test]
    fn test_incremental_merges_disjoint_patches() {
        let source = "{a} mid {b}";
        let mut tree = parse_str(source);
        let first = tree.children[0].id;
        let last = tree.children[2].id;
        tree.children[0].kind = NodeKind::Group {
            delim: GroupDelim::Bracket,
        };
        if let NodeKind::TextRun { text } = &mut tree.children[2].children[0].kind {
            *text = "B".to_string();
        }

        let edit = emit_incremental(&mut tree, source, &[last, first]).expect("patch");
        assert_eq!(edit, TextEdit::new(0, source.len(), "[a] mid {B}"));
    }

    #[test]
    fn test_merged_patch_invalidates_inner_dirty_paths() {
        let source = "\\section{Intro} {y}";
        let mut tree = parse_str(source);
        let run = tree.children[0].children[0].children[0].id;
        // Shorten the heading and drop the space after it
        if let NodeKind::TextRun { text } = &mut tree.children[0].children[0].children[0].kind {
            *text = "In".to_string();
        }
        tree.children.remove(1);

        let root = tree.id;
        let edit = emit_incremental(&mut tree, source, &[run, root]).expect("patch");
        let mut patched = source.to_string();
        edit.apply(&mut patched);
        assert_eq!(patched, "\\section{In}{y}");
        assert_eq!(tree.children[0].span, None);
        assert_eq!(tree.children[0].children[0].children[0].span, None);
        assert_eq!(tree.children[0].children[0].span, None);

        refresh_spans(&mut tree);
        let fresh = parse_str(&patched);
        let spans = |node: &Node| {
            let mut out = Vec::new();
            node.walk(&mut |n| out.push(n.span));
            out
        };
        assert_eq!(spans(&tree), spans(&fresh));
        assert_eq!(tree.children[1].span, Some(Span::new(12, 15)));
    }

    #[test]
    fn test_new_nodes_widen_to_known_ancestor() {
        let source = "x {y}";
        let mut tree = parse_str(source);
        let mut inserted = Node::text_run(NodeId(999), "z");
        inserted.span = None;
        tree.children[1].children.push(inserted);
        tree.children[1].children[1].span = None;

        let edit = emit_incremental(&mut tree, source, &[NodeId(999)]).expect("patch");
        assert_eq!(edit, TextEdit::new(2, 3, "{yz}"));
    }
}
