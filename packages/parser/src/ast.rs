use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use crate::error::StructuralError;

/// Stable node identity, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}-{}", self.0 >> 32, self.0 & 0xffff_ffff)
    }
}

/// Half-open byte range in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Delimiters of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupDelim {
    /// `{...}`
    Brace,
    /// `[...]`, only as an optional argument
    Bracket,
}

impl GroupDelim {
    pub fn open(&self) -> &'static str {
        match self {
            GroupDelim::Brace => "{",
            GroupDelim::Bracket => "[",
        }
    }

    pub fn close(&self) -> &'static str {
        match self {
            GroupDelim::Brace => "}",
            GroupDelim::Bracket => "]",
        }
    }
}

/// Delimiters of a math span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathDelim {
    /// `$...$`
    Dollar,
    /// `$$...$$`
    DoubleDollar,
    /// `\[...\]`
    Bracket,
    /// `\(...\)`
    Paren,
}

impl MathDelim {
    pub fn open(&self) -> &'static str {
        match self {
            MathDelim::Dollar => "$",
            MathDelim::DoubleDollar => "$$",
            MathDelim::Bracket => "\\[",
            MathDelim::Paren => "\\(",
        }
    }

    pub fn close(&self) -> &'static str {
        match self {
            MathDelim::Dollar => "$",
            MathDelim::DoubleDollar => "$$",
            MathDelim::Bracket => "\\]",
            MathDelim::Paren => "\\)",
        }
    }

    pub fn is_display(&self) -> bool {
        matches!(self, MathDelim::DoubleDollar | MathDelim::Bracket)
    }
}

/// Node variants of the document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    /// Root of the tree
    Document,

    /// Raw text and whitespace, escapes kept as written
    TextRun { text: String },

    /// A `%` comment, without its line break
    Comment { text: String },

    /// `\name`; children are its attached arguments
    Command { name: String },

    Group { delim: GroupDelim },

    MathSpan { delim: MathDelim },

    /// `\begin{name}...\end{name}`; the first `args` children are arguments,
    /// the rest is the body
    Environment { name: String, args: usize },

    /// A malformed region. `open` is the raw text that starts it (an unclosed
    /// opener, or the stray closer itself).
    Error {
        error: StructuralError,
        open: String,
    },
}

/// A node of the document tree. Nodes own their children; there are no parent
/// links (see the position map for ancestor queries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    /// Cached source span; `None` once the node or an ancestor has been mutated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            children: Vec::new(),
            span: None,
        }
    }

    pub fn text_run(id: NodeId, text: impl Into<String>) -> Self {
        Self::new(id, NodeKind::TextRun { text: text.into() })
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NodeKind::Error { .. })
    }

    pub fn is_text_run(&self) -> bool {
        matches!(self.kind, NodeKind::TextRun { .. })
    }

    /// Raw text of a text run or comment
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::TextRun { text } | NodeKind::Comment { text } => Some(text),
            _ => None,
        }
    }

    /// Command or environment name
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Command { name } | NodeKind::Environment { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Index of the first child that is content rather than an argument.
    pub fn body_start(&self) -> usize {
        match &self.kind {
            NodeKind::Environment { args, .. } => (*args).min(self.children.len()),
            NodeKind::Command { .. } => self.children.len(),
            _ => 0,
        }
    }

    pub fn find(&self, id: NodeId) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Child indices leading from this node to `id`.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<usize>> {
        if self.id == id {
            return Some(Vec::new());
        }
        for (index, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.path_to(id) {
                path.insert(0, index);
                return Some(path);
            }
        }
        None
    }

    /// Ids from this node down to (excluding) `id`.
    pub fn ancestors_of(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let path = self.path_to(id)?;
        let mut ids = Vec::with_capacity(path.len());
        let mut node = self;
        for index in path {
            ids.push(node.id);
            node = &node.children[index];
        }
        Some(ids)
    }

    /// Parent id and child index of `id`.
    pub fn parent_of(&self, id: NodeId) -> Option<(NodeId, usize)> {
        for (index, child) in self.children.iter().enumerate() {
            if child.id == id {
                return Some((self.id, index));
            }
            if let Some(found) = child.parent_of(id) {
                return Some(found);
            }
        }
        None
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn ids(&self) -> HashSet<NodeId> {
        let mut ids = HashSet::new();
        self.walk(&mut |node| {
            ids.insert(node.id);
        });
        ids
    }

    pub fn error_ids(&self) -> HashSet<NodeId> {
        let mut ids = HashSet::new();
        self.walk(&mut |node| {
            if node.is_error() {
                ids.insert(node.id);
            }
        });
        ids
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Structural equality ignoring cached spans.
    pub fn same_content(&self, other: &Node) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_content(b))
    }

    /// Structural equality ignoring spans and identities.
    pub fn same_shape(&self, other: &Node) -> bool {
        self.kind == other.kind
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_shape(b))
    }

    pub fn clear_spans(&mut self) {
        self.span = None;
        for child in &mut self.children {
            child.clear_spans();
        }
    }

    /// Drop the cached span of `id` and of every ancestor.
    pub fn invalidate_path(&mut self, id: NodeId) -> bool {
        if self.id == id {
            self.span = None;
            return true;
        }
        for child in &mut self.children {
            if child.invalidate_path(id) {
                self.span = None;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::new(NodeId(1), NodeKind::Document).with_children(vec![
            Node::new(
                NodeId(2),
                NodeKind::Command {
                    name: "textbf".to_string(),
                },
            )
            .with_children(vec![Node::new(
                NodeId(3),
                NodeKind::Group {
                    delim: GroupDelim::Brace,
                },
            )
            .with_children(vec![Node::text_run(NodeId(4), "Hi")])]),
            Node::text_run(NodeId(5), " "),
        ])
    }

    #[test]
    fn test_lookup_helpers() {
        let tree = sample();
        assert_eq!(tree.path_to(NodeId(4)), Some(vec![0, 0, 0]));
        assert_eq!(
            tree.ancestors_of(NodeId(4)),
            Some(vec![NodeId(1), NodeId(2), NodeId(3)])
        );
        assert_eq!(tree.parent_of(NodeId(5)), Some((NodeId(1), 1)));
        assert_eq!(tree.parent_of(NodeId(1)), None);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.find(NodeId(4)).and_then(Node::text), Some("Hi"));
    }

    #[test]
    fn test_invalidate_path() {
        let mut tree = sample();
        tree.walk_mut_spans();
        assert!(tree.invalidate_path(NodeId(4)));
        assert_eq!(tree.span, None);
        assert_eq!(tree.children[0].span, None);
        assert!(tree.children[1].span.is_some());
    }

    #[test]
    fn test_same_content_ignores_spans() {
        let a = sample();
        let mut b = sample();
        b.children[1].span = Some(Span::new(11, 12));
        assert!(a.same_content(&b));
        b.children[1].id = NodeId(9);
        assert!(!a.same_content(&b));
        assert!(a.same_shape(&b));
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId((0xab << 32) | 7).to_string(), "000000ab-7");
    }

    impl Node {
        fn walk_mut_spans(&mut self) {
            self.span = Some(Span::new(0, 1));
            for child in &mut self.children {
                child.walk_mut_spans();
            }
        }
    }
}
