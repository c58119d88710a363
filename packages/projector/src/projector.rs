//! Document tree to visual tree projection.
//!
//! Incremental projection reuses the prior box of every node outside the
//! dirty subtrees and their ancestor chains, so the UI can keep its own state
//! for untouched regions (compared by pointer, the reused `Arc`s are the same).

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use vlatex_parser::emitter::write_node;
use vlatex_parser::text::{is_paragraph_break, unescape, visual_len};
use vlatex_parser::{Node, NodeId, NodeKind};

use crate::math::{CachedMathLayout, MathLayout, PlainMathLayout};
use crate::rules::{combining_mark, command_substitution, EnvironmentLayout, LayoutRules, Substitution};
use crate::visual::{BoxKind, BoxRole, VisualBox, VisualTree};

/// Result of an incremental projection
#[derive(Debug, Clone)]
pub struct IncrementalProjection {
    pub tree: VisualTree,
    /// Nodes whose boxes were built anew
    pub rebuilt: Vec<NodeId>,
    pub reused: usize,
}

#[derive(Clone)]
pub struct Projector {
    rules: LayoutRules,
    math: Arc<dyn MathLayout>,
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(
            LayoutRules::default(),
            Arc::new(CachedMathLayout::new(PlainMathLayout)),
        )
    }
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector").field("rules", &self.rules).finish()
    }
}

impl Projector {
    pub fn new(rules: LayoutRules, math: Arc<dyn MathLayout>) -> Self {
        Self { rules, math }
    }

    pub fn rules(&self) -> &LayoutRules {
        &self.rules
    }

    #[instrument(skip_all, fields(nodes = tree.node_count()))]
    pub fn project(&self, tree: &Node) -> VisualTree {
        let mut builder = Builder::new(self, None);
        let root = builder.document(tree);
        let tree = VisualTree::new(root);
        info!(boxes = tree.box_count(), extent = tree.extent(), "Projected document");
        tree
    }

    /// Re-project after the subtrees rooted at `dirty` changed.
    pub fn project_incremental(
        &self,
        tree: &Node,
        dirty: &[NodeId],
        prior: &VisualTree,
    ) -> IncrementalProjection {
        let mut ancestors = HashSet::new();
        for id in dirty {
            if let Some(path) = tree.ancestors_of(*id) {
                ancestors.extend(path);
            }
        }
        let reuse = Reuse {
            prior: prior.index(),
            dirty: dirty.iter().copied().collect(),
            ancestors,
        };
        let mut builder = Builder::new(self, Some(reuse));
        let root = builder.document(tree);
        debug!(
            dirty = dirty.len(),
            rebuilt = builder.rebuilt.len(),
            reused = builder.reused,
            "Projected incrementally"
        );
        IncrementalProjection {
            tree: VisualTree::new(root),
            rebuilt: builder.rebuilt,
            reused: builder.reused,
        }
    }
}

struct Reuse {
    prior: HashMap<NodeId, Arc<VisualBox>>,
    dirty: HashSet<NodeId>,
    ancestors: HashSet<NodeId>,
}

struct Builder<'a> {
    projector: &'a Projector,
    reuse: Option<Reuse>,
    rebuilt: Vec<NodeId>,
    reused: usize,
}

impl<'a> Builder<'a> {
    fn new(projector: &'a Projector, reuse: Option<Reuse>) -> Self {
        Self {
            projector,
            reuse,
            rebuilt: Vec::new(),
            reused: 0,
        }
    }

    fn document(&mut self, tree: &Node) -> VisualBox {
        self.rebuilt.push(tree.id);
        let fresh = self.is_dirty(tree.id);
        let children = self.sequence(&tree.children, fresh);
        VisualBox::container(
            Some(tree.id),
            BoxRole::Block,
            BoxKind::Document,
            0,
            paragraphs(children),
        )
    }

    fn is_dirty(&self, id: NodeId) -> bool {
        self.reuse
            .as_ref()
            .map_or(true, |reuse| reuse.dirty.contains(&id))
    }

    fn sequence(&mut self, nodes: &[Node], fresh: bool) -> Vec<Arc<VisualBox>> {
        nodes
            .iter()
            .filter_map(|node| self.node(node, fresh))
            .collect()
    }

    /// Box for `node`, reusing the prior one when nothing below it changed.
    /// `fresh` is set inside dirty subtrees, where nothing can be reused.
    fn node(&mut self, node: &Node, fresh: bool) -> Option<Arc<VisualBox>> {
        let mut fresh = fresh;
        if !fresh {
            if let Some(reuse) = &self.reuse {
                if reuse.dirty.contains(&node.id) {
                    fresh = true;
                } else if !reuse.ancestors.contains(&node.id) {
                    if let Some(prior) = reuse.prior.get(&node.id) {
                        self.reused += 1;
                        return Some(Arc::clone(prior));
                    }
                }
            }
        }
        self.rebuilt.push(node.id);
        self.build(node, fresh).map(Arc::new)
    }

    fn build(&mut self, node: &Node, fresh: bool) -> Option<VisualBox> {
        let id = Some(node.id);
        let built = match &node.kind {
            NodeKind::Document => self.document(node),
            NodeKind::TextRun { text } if is_paragraph_break(text) => {
                VisualBox::leaf(id, BoxRole::Block, BoxKind::ParagraphBreak, 1)
            }
            NodeKind::TextRun { text } => VisualBox::leaf(
                id,
                BoxRole::Inline,
                BoxKind::GlyphRun {
                    text: unescape(text),
                },
                visual_len(text),
            ),
            NodeKind::Comment { .. } => return None,
            NodeKind::Command { name } => return self.command(node, name, fresh),
            NodeKind::Group { .. } => {
                let children = self.sequence(&node.children, fresh);
                VisualBox::container(id, BoxRole::Inline, BoxKind::Group, 0, children)
            }
            NodeKind::MathSpan { delim } => self.math(node, &node.children, delim.is_display()),
            NodeKind::Environment { name, .. } => self.environment(node, name, fresh),
            NodeKind::Error { error, open } => {
                let children = self.sequence(&node.children, fresh);
                VisualBox::container(
                    id,
                    BoxRole::Inline,
                    BoxKind::Error {
                        message: error.to_string(),
                        marker: open.clone(),
                    },
                    open.chars().count(),
                    children,
                )
            }
        };
        Some(built)
    }

    fn command(&mut self, node: &Node, name: &str, fresh: bool) -> Option<VisualBox> {
        let id = Some(node.id);
        let built = match command_substitution(name) {
            Substitution::Heading { level } => VisualBox::container(
                id,
                BoxRole::Block,
                BoxKind::Heading { level },
                0,
                self.visible_argument(node, fresh),
            ),
            Substitution::Styled(style) => VisualBox::container(
                id,
                BoxRole::Inline,
                BoxKind::Styled { style },
                0,
                self.visible_argument(node, fresh),
            ),
            Substitution::Symbol(text) => symbol(node.id, text.to_string()),
            Substitution::Accent(mark) => {
                let base = node.children.last().map(plain_text).unwrap_or_default();
                let text = if base.is_empty() {
                    mark.to_string()
                } else {
                    format!("{}{}", base, combining_mark(mark))
                };
                symbol(node.id, text)
            }
            Substitution::LineBreak => VisualBox::leaf(id, BoxRole::Inline, BoxKind::LineBreak, 1),
            Substitution::Item => list_marker(node, "\u{2022}".to_string()),
            Substitution::Hidden => return None,
            Substitution::Placeholder => {
                let mut text = String::new();
                write_node(node, &mut text);
                let width = text.chars().count();
                VisualBox::leaf(id, BoxRole::Inline, BoxKind::Placeholder { text }, width)
            }
        };
        Some(built)
    }

    /// The last brace argument is shown; optional arguments are not.
    fn visible_argument(&mut self, node: &Node, fresh: bool) -> Vec<Arc<VisualBox>> {
        node.children
            .iter()
            .rev()
            .find(|arg| {
                matches!(
                    arg.kind,
                    NodeKind::Group {
                        delim: vlatex_parser::GroupDelim::Brace
                    }
                )
            })
            .and_then(|arg| self.node(arg, fresh))
            .into_iter()
            .collect()
    }

    fn math(&mut self, node: &Node, content: &[Node], display: bool) -> VisualBox {
        let mut source = String::new();
        for child in content {
            write_node(child, &mut source);
        }
        let render = self.projector.math.layout_math(&source, display);
        let role = if display {
            BoxRole::Block
        } else {
            BoxRole::Inline
        };
        VisualBox::leaf(
            Some(node.id),
            role,
            BoxKind::Math {
                display,
                source,
                glyphs: render.glyphs,
            },
            render.width.max(1),
        )
    }

    fn environment(&mut self, node: &Node, name: &str, fresh: bool) -> VisualBox {
        let body = &node.children[node.body_start()..];
        match self.projector.rules.environment_layout(name) {
            EnvironmentLayout::Math => self.math(node, body, true),
            EnvironmentLayout::List { ordered } => self.list(node, body, ordered, fresh),
            EnvironmentLayout::Stack => {
                let children = self.sequence(body, fresh);
                VisualBox::container(
                    Some(node.id),
                    BoxRole::Block,
                    BoxKind::Stack {
                        environment: name.to_string(),
                    },
                    0,
                    paragraphs(children),
                )
            }
        }
    }

    /// Split a list body at its `\item`s. Markers depend on their position,
    /// so they are always rebuilt.
    fn list(&mut self, node: &Node, body: &[Node], ordered: bool, fresh: bool) -> VisualBox {
        let mut children = Vec::new();
        let mut current: Vec<Arc<VisualBox>> = Vec::new();
        let mut started = false;
        let mut counter = 0;
        for child in body {
            if is_item(child) {
                flush_item(&mut children, &mut current, started);
                started = true;
                counter += 1;
                let label = child
                    .children
                    .first()
                    .map(plain_text)
                    .unwrap_or_else(|| {
                        if ordered {
                            format!("{}.", counter)
                        } else {
                            "\u{2022}".to_string()
                        }
                    });
                self.rebuilt.push(child.id);
                current.push(Arc::new(list_marker(child, label)));
            } else if let Some(built) = self.node(child, fresh) {
                current.push(built);
            }
        }
        flush_item(&mut children, &mut current, started);
        VisualBox::container(
            Some(node.id),
            BoxRole::Block,
            BoxKind::List { ordered },
            0,
            children,
        )
    }
}

fn is_item(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::Command { name } if name == "item")
}

fn flush_item(children: &mut Vec<Arc<VisualBox>>, current: &mut Vec<Arc<VisualBox>>, started: bool) {
    let content = mem::take(current);
    if started {
        children.push(Arc::new(VisualBox::container(
            None,
            BoxRole::Block,
            BoxKind::ListItem,
            0,
            paragraphs(content),
        )));
    } else {
        children.extend(paragraphs(content));
    }
}

fn symbol(id: NodeId, text: String) -> VisualBox {
    let width = text.chars().count();
    VisualBox::leaf(Some(id), BoxRole::Inline, BoxKind::Symbol { text }, width)
}

fn list_marker(node: &Node, label: String) -> VisualBox {
    let width = label.chars().count();
    VisualBox::leaf(
        Some(node.id),
        BoxRole::Inline,
        BoxKind::ListMarker { label },
        width,
    )
}

/// Wrap runs of inline boxes into paragraph boxes between block boxes.
fn paragraphs(boxes: Vec<Arc<VisualBox>>) -> Vec<Arc<VisualBox>> {
    let mut out = Vec::new();
    let mut inline = Vec::new();
    for visual in boxes {
        if visual.is_block() {
            flush_paragraph(&mut out, &mut inline);
            out.push(visual);
        } else {
            inline.push(visual);
        }
    }
    flush_paragraph(&mut out, &mut inline);
    out
}

fn flush_paragraph(out: &mut Vec<Arc<VisualBox>>, inline: &mut Vec<Arc<VisualBox>>) {
    if !inline.is_empty() {
        out.push(Arc::new(VisualBox::container(
            None,
            BoxRole::Block,
            BoxKind::Paragraph,
            0,
            mem::take(inline),
        )));
    }
}

/// Visible text of a subtree, escapes resolved.
fn plain_text(node: &Node) -> String {
    let mut out = String::new();
    node.walk(&mut |n| {
        if let NodeKind::TextRun { text } = &n.kind {
            out.push_str(&unescape(text));
        }
    });
    out
}
