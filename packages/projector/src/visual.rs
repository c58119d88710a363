use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use vlatex_parser::NodeId;

/// Layout role of a box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoxRole {
    Block,
    Inline,
}

/// Inline text styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    Bold,
    Italic,
    Emphasis,
    Underline,
    Monospace,
    SmallCaps,
    SansSerif,
    Slanted,
    Plain,
    Footnote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoxKind {
    Document,
    /// Run of inline content between block boxes; has no node of its own
    Paragraph,
    /// Visible characters of a text run, escapes resolved
    GlyphRun { text: String },
    /// A blank line between paragraphs
    ParagraphBreak,
    /// Transparent inline wrapper of a brace group
    Group,
    Styled { style: Style },
    Heading { level: u8 },
    /// A command rendered as a fixed glyph sequence
    Symbol { text: String },
    LineBreak,
    /// Literal text of a command with no visual substitution
    Placeholder { text: String },
    Math {
        display: bool,
        source: String,
        glyphs: String,
    },
    List { ordered: bool },
    /// One `\item` and the content up to the next one; has no node of its own
    ListItem,
    ListMarker { label: String },
    /// Plain vertical stack for environments without a layout rule
    Stack { environment: String },
    /// A malformed region: its raw opener followed by its content
    Error { message: String, marker: String },
}

/// A box of the visual tree.
///
/// Widths are in caret units: a caret can sit before any of the `extent`
/// units of a box and after the last one. `lead` units are drawn before the
/// children (error markers). Atomic boxes are selected and deleted as a
/// whole and have no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualBox {
    pub node: Option<NodeId>,
    pub role: BoxRole,
    pub kind: BoxKind,
    pub lead: usize,
    pub extent: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<VisualBox>>,
}

impl VisualBox {
    /// Box whose extent is the sum of its children plus `lead`.
    pub fn container(
        node: Option<NodeId>,
        role: BoxRole,
        kind: BoxKind,
        lead: usize,
        children: Vec<Arc<VisualBox>>,
    ) -> Self {
        let extent = lead + children.iter().map(|c| c.extent).sum::<usize>();
        Self {
            node,
            role,
            kind,
            lead,
            extent,
            children,
        }
    }

    pub fn leaf(node: Option<NodeId>, role: BoxRole, kind: BoxKind, extent: usize) -> Self {
        Self {
            node,
            role,
            kind,
            lead: 0,
            extent,
            children: Vec::new(),
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind,
            BoxKind::Symbol { .. }
                | BoxKind::LineBreak
                | BoxKind::Placeholder { .. }
                | BoxKind::Math { .. }
                | BoxKind::ListMarker { .. }
                | BoxKind::ParagraphBreak
        )
    }

    pub fn is_block(&self) -> bool {
        self.role == BoxRole::Block
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a VisualBox)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Visible text of the box, with one character per unit where possible.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match &self.kind {
            BoxKind::GlyphRun { text } | BoxKind::Symbol { text } => out.push_str(text),
            BoxKind::Placeholder { text } => out.push_str(text),
            BoxKind::Math { glyphs, .. } => out.push_str(glyphs),
            BoxKind::ListMarker { label } => out.push_str(label),
            BoxKind::Error { marker, .. } => out.push_str(marker),
            BoxKind::ParagraphBreak | BoxKind::LineBreak => out.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.write_text(out);
        }
    }
}

/// Read-only snapshot handed to the UI after each render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualTree {
    pub root: Arc<VisualBox>,
}

impl VisualTree {
    pub fn new(root: VisualBox) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn extent(&self) -> usize {
        self.root.extent
    }

    /// Boxes by the node they render. Synthetic boxes are not indexed.
    pub fn index(&self) -> HashMap<NodeId, Arc<VisualBox>> {
        let mut index = HashMap::new();
        collect(&self.root, &mut index);
        index
    }

    pub fn find(&self, id: NodeId) -> Option<&VisualBox> {
        fn find_in(node: &VisualBox, id: NodeId) -> Option<&VisualBox> {
            if node.node == Some(id) {
                return Some(node);
            }
            node.children.iter().find_map(|child| find_in(child, id))
        }
        find_in(&self.root, id)
    }

    /// Visual range `[start, end)` of the box rendering `id`.
    pub fn range_of(&self, id: NodeId) -> Option<(usize, usize)> {
        fn range_in(node: &VisualBox, id: NodeId, start: usize) -> Option<(usize, usize)> {
            if node.node == Some(id) {
                return Some((start, start + node.extent));
            }
            let mut cursor = start + node.lead;
            for child in &node.children {
                if let Some(found) = range_in(child, id, cursor) {
                    return Some(found);
                }
                cursor += child.extent;
            }
            None
        }
        range_in(&self.root, id, 0)
    }

    pub fn box_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |_| count += 1);
        count
    }
}

fn collect(node: &Arc<VisualBox>, index: &mut HashMap<NodeId, Arc<VisualBox>>) {
    if let Some(id) = node.node {
        index.insert(id, Arc::clone(node));
    }
    for child in &node.children {
        collect(child, index);
    }
}
