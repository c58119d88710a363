//! Primitive document tree mutations.
//!
//! Every change to a document, whether typed visually or edited as source, is
//! recorded as a sequence of these. A mutation validates against the tree
//! before touching it and can compute its exact inverse from the tree it is
//! about to be applied to.
//!
//! Mutations only drop the cached spans of the nodes they create or change in
//! place. Ancestors keep their spans so the emitter can still locate the region
//! to patch; it invalidates them once the patch is made.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vlatex_parser::{Node, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    /// Insert `node` as child `index` of `parent`
    InsertNode {
        parent: NodeId,
        index: usize,
        node: Node,
    },

    /// Remove a node with its subtree
    DeleteNode { id: NodeId },

    /// Replace the raw text of a text run or comment
    ReplaceText { id: NodeId, text: String },

    /// Detach `id` and insert it as child `index` of `parent`. The index counts
    /// the children after the detach.
    MoveNode {
        id: NodeId,
        parent: NodeId,
        index: usize,
    },

    /// Replace the attributes of a structural node: command or environment
    /// name, argument count, delimiters, error state
    SetAttribute { id: NodeId, kind: NodeKind },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeId),

    #[error("Operation would create a cycle")]
    CycleDetected,

    #[error("Node {0} is not a text run")]
    NotText(NodeId),

    #[error("Index {index} is out of bounds for the children of {parent}")]
    InvalidIndex { parent: NodeId, index: usize },

    #[error("Cannot remove the document root")]
    CannotRemoveRoot,

    #[error("Node id {0} is already in the tree")]
    DuplicateId(NodeId),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

/// Outcome of applying a sequence of mutations
#[derive(Debug, Clone, Default)]
pub struct Applied {
    /// Mutations restoring the tree, in the order to apply them
    pub inverse: Vec<Mutation>,
    /// Nodes whose rendering changed: parents of inserted, moved and deleted
    /// nodes, and nodes changed in place
    pub touched: Vec<NodeId>,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::InsertNode { .. } => "insert-node",
            Mutation::DeleteNode { .. } => "delete-node",
            Mutation::ReplaceText { .. } => "replace-text",
            Mutation::MoveNode { .. } => "move-node",
            Mutation::SetAttribute { .. } => "set-attribute",
        }
    }

    /// Apply the mutation to a tree, returning the ids whose rendering changed.
    pub fn apply(&self, tree: &mut Node) -> Result<Vec<NodeId>, MutationError> {
        self.validate(tree)?;

        match self {
            Mutation::InsertNode {
                parent,
                index,
                node,
            } => Self::apply_insert(tree, *parent, *index, node),
            Mutation::DeleteNode { id } => Self::apply_delete(tree, *id),
            Mutation::ReplaceText { id, text } => Self::apply_replace_text(tree, *id, text),
            Mutation::MoveNode { id, parent, index } => {
                Self::apply_move(tree, *id, *parent, *index)
            }
            Mutation::SetAttribute { id, kind } => Self::apply_set_attribute(tree, *id, kind),
        }
    }

    /// The mutation that undoes this one, computed against the tree it is
    /// about to be applied to.
    pub fn inverse(&self, tree: &Node) -> Result<Mutation, MutationError> {
        self.validate(tree)?;

        match self {
            Mutation::InsertNode { node, .. } => Ok(Mutation::DeleteNode { id: node.id }),
            Mutation::DeleteNode { id } => {
                let (parent, index) = tree
                    .parent_of(*id)
                    .ok_or(MutationError::NodeNotFound(*id))?;
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                Ok(Mutation::InsertNode {
                    parent,
                    index,
                    node: node.clone(),
                })
            }
            Mutation::ReplaceText { id, .. } => {
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                let text = node.text().ok_or(MutationError::NotText(*id))?;
                Ok(Mutation::ReplaceText {
                    id: *id,
                    text: text.to_string(),
                })
            }
            Mutation::MoveNode { id, .. } => {
                let (parent, index) = tree
                    .parent_of(*id)
                    .ok_or(MutationError::NodeNotFound(*id))?;
                Ok(Mutation::MoveNode {
                    id: *id,
                    parent,
                    index,
                })
            }
            Mutation::SetAttribute { id, .. } => {
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                Ok(Mutation::SetAttribute {
                    id: *id,
                    kind: node.kind.clone(),
                })
            }
        }
    }

    /// Validate without applying
    pub fn validate(&self, tree: &Node) -> Result<(), MutationError> {
        match self {
            Mutation::InsertNode {
                parent,
                index,
                node,
            } => {
                let parent_node = tree
                    .find(*parent)
                    .ok_or(MutationError::ParentNotFound(*parent))?;
                if is_leaf_kind(&parent_node.kind) {
                    return Err(MutationError::InvalidStructure(
                        "Text cannot have children".to_string(),
                    ));
                }
                if *index > parent_node.children.len() {
                    return Err(MutationError::InvalidIndex {
                        parent: *parent,
                        index: *index,
                    });
                }
                if matches!(node.kind, NodeKind::Document) {
                    return Err(MutationError::InvalidStructure(
                        "A document cannot be nested".to_string(),
                    ));
                }
                let existing = tree.ids();
                let mut duplicate = None;
                node.walk(&mut |n| {
                    if duplicate.is_none() && existing.contains(&n.id) {
                        duplicate = Some(n.id);
                    }
                });
                match duplicate {
                    Some(id) => Err(MutationError::DuplicateId(id)),
                    None => Ok(()),
                }
            }

            Mutation::DeleteNode { id } => {
                if *id == tree.id {
                    return Err(MutationError::CannotRemoveRoot);
                }
                tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                Ok(())
            }

            Mutation::ReplaceText { id, .. } => {
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                match node.kind {
                    NodeKind::TextRun { .. } | NodeKind::Comment { .. } => Ok(()),
                    _ => Err(MutationError::NotText(*id)),
                }
            }

            Mutation::MoveNode { id, parent, index } => {
                if *id == tree.id {
                    return Err(MutationError::CannotRemoveRoot);
                }
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                if node.contains(*parent) {
                    return Err(MutationError::CycleDetected);
                }
                let parent_node = tree
                    .find(*parent)
                    .ok_or(MutationError::ParentNotFound(*parent))?;
                if is_leaf_kind(&parent_node.kind) {
                    return Err(MutationError::InvalidStructure(
                        "Text cannot have children".to_string(),
                    ));
                }
                let detached = parent_node.children.iter().any(|c| c.id == *id);
                let len = parent_node.children.len() - usize::from(detached);
                if *index > len {
                    return Err(MutationError::InvalidIndex {
                        parent: *parent,
                        index: *index,
                    });
                }
                Ok(())
            }

            Mutation::SetAttribute { id, kind } => {
                let node = tree.find(*id).ok_or(MutationError::NodeNotFound(*id))?;
                if is_leaf_kind(&node.kind)
                    || is_leaf_kind(kind)
                    || matches!(node.kind, NodeKind::Document)
                    || matches!(kind, NodeKind::Document)
                {
                    return Err(MutationError::InvalidStructure(
                        "Attributes can only be set on structural nodes".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn apply_insert(
        tree: &mut Node,
        parent: NodeId,
        index: usize,
        node: &Node,
    ) -> Result<Vec<NodeId>, MutationError> {
        let parent_node = tree
            .find_mut(parent)
            .ok_or(MutationError::ParentNotFound(parent))?;
        let mut node = node.clone();
        node.clear_spans();
        parent_node.children.insert(index, node);
        Ok(vec![parent])
    }

    fn apply_delete(tree: &mut Node, id: NodeId) -> Result<Vec<NodeId>, MutationError> {
        let (parent, _) = detach(tree, id)?;
        Ok(vec![parent])
    }

    fn apply_replace_text(
        tree: &mut Node,
        id: NodeId,
        new_text: &str,
    ) -> Result<Vec<NodeId>, MutationError> {
        let node = tree.find_mut(id).ok_or(MutationError::NodeNotFound(id))?;
        match &mut node.kind {
            NodeKind::TextRun { text } | NodeKind::Comment { text } => {
                *text = new_text.to_string();
                node.span = None;
                Ok(vec![id])
            }
            _ => Err(MutationError::NotText(id)),
        }
    }

    fn apply_move(
        tree: &mut Node,
        id: NodeId,
        parent: NodeId,
        index: usize,
    ) -> Result<Vec<NodeId>, MutationError> {
        let (old_parent, mut node) = detach(tree, id)?;
        node.clear_spans();
        let parent_node = tree
            .find_mut(parent)
            .ok_or(MutationError::ParentNotFound(parent))?;
        parent_node.children.insert(index, node);
        Ok(vec![old_parent, parent])
    }

    fn apply_set_attribute(
        tree: &mut Node,
        id: NodeId,
        kind: &NodeKind,
    ) -> Result<Vec<NodeId>, MutationError> {
        let node = tree.find_mut(id).ok_or(MutationError::NodeNotFound(id))?;
        node.kind = kind.clone();
        node.span = None;
        Ok(vec![id])
    }
}

/// Apply `mutations` in order. If one fails, the ones already applied are
/// rolled back and the tree is structurally as it was.
pub fn apply_all(mutations: &[Mutation], tree: &mut Node) -> Result<Applied, MutationError> {
    let mut applied = Applied::default();
    for mutation in mutations {
        let step = mutation
            .inverse(tree)
            .and_then(|inverse| mutation.apply(tree).map(|touched| (inverse, touched)));
        match step {
            Ok((inverse, touched)) => {
                applied.inverse.push(inverse);
                applied.touched.extend(touched);
            }
            Err(err) => {
                for undo in applied.inverse.iter().rev() {
                    if undo.apply(tree).is_err() {
                        break;
                    }
                }
                return Err(err);
            }
        }
    }
    applied.inverse.reverse();
    Ok(applied)
}

/// Mutations turning `old`, the children of `parent` starting at child index
/// `offset`, into `new`. Nodes that kept their identity are diffed in place;
/// the rest of the changed middle is deleted and inserted again.
pub fn diff_children(
    parent: NodeId,
    offset: usize,
    old: &[Node],
    new: &[Node],
    out: &mut Vec<Mutation>,
) {
    let prefix = old
        .iter()
        .zip(new)
        .take_while(|(a, b)| a.same_content(b))
        .count();
    let (old, new) = (&old[prefix..], &new[prefix..]);
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take_while(|(a, b)| a.same_content(b))
        .count();
    let old = &old[..old.len() - suffix];
    let new = &new[..new.len() - suffix];

    let aligned = old.len() == new.len()
        && old
            .iter()
            .zip(new)
            .all(|(a, b)| a.id == b.id && same_family(&a.kind, &b.kind));
    if aligned {
        for (a, b) in old.iter().zip(new) {
            diff_node(a, b, out);
        }
        return;
    }

    for node in old {
        out.push(Mutation::DeleteNode { id: node.id });
    }
    for (i, node) in new.iter().enumerate() {
        out.push(Mutation::InsertNode {
            parent,
            index: offset + prefix + i,
            node: node.clone(),
        });
    }
}

fn diff_node(old: &Node, new: &Node, out: &mut Vec<Mutation>) {
    if old.kind != new.kind {
        match &new.kind {
            NodeKind::TextRun { text } | NodeKind::Comment { text } => {
                out.push(Mutation::ReplaceText {
                    id: new.id,
                    text: text.clone(),
                });
            }
            kind => out.push(Mutation::SetAttribute {
                id: new.id,
                kind: kind.clone(),
            }),
        }
    }
    diff_children(old.id, 0, &old.children, &new.children, out);
}

/// Whether one node can be turned into the other in place.
fn same_family(a: &NodeKind, b: &NodeKind) -> bool {
    match (a, b) {
        (NodeKind::TextRun { .. }, NodeKind::TextRun { .. })
        | (NodeKind::Comment { .. }, NodeKind::Comment { .. }) => true,
        (a, b) => !is_leaf_kind(a) && !is_leaf_kind(b)
            && !matches!(a, NodeKind::Document)
            && !matches!(b, NodeKind::Document),
    }
}

fn is_leaf_kind(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::TextRun { .. } | NodeKind::Comment { .. })
}

/// Remove `id` from its parent, returning the parent id and the node.
fn detach(tree: &mut Node, id: NodeId) -> Result<(NodeId, Node), MutationError> {
    let (parent, index) = tree
        .parent_of(id)
        .ok_or(MutationError::NodeNotFound(id))?;
    let parent_node = tree
        .find_mut(parent)
        .ok_or(MutationError::ParentNotFound(parent))?;
    Ok((parent, parent_node.children.remove(index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlatex_parser::{emit, parse_source, GroupDelim, IdGenerator, ParseOptions};

    fn parse(source: &str) -> (Node, IdGenerator) {
        let mut ids = IdGenerator::new("test.tex");
        let (_, tree) = parse_source(source, &mut ids, &ParseOptions::default());
        (tree, ids)
    }

    #[test]
    fn test_mutation_serialization() {
        let mutation = Mutation::ReplaceText {
            id: NodeId(42),
            text: "Hello World".to_string(),
        };

        let json = serde_json::to_string(&mutation).unwrap();
        assert!(json.contains("\"type\":\"replaceText\""));
        let deserialized: Mutation = serde_json::from_str(&json).unwrap();

        assert_eq!(mutation, deserialized);
    }

    #[test]
    fn test_replace_text_and_inverse() {
        let (mut tree, _) = parse("\\textbf{Hi} $x$");
        let run = tree.children[0].children[0].children[0].id;
        let mutation = Mutation::ReplaceText {
            id: run,
            text: "Hello".to_string(),
        };

        let inverse = mutation.inverse(&tree).unwrap();
        assert_eq!(mutation.apply(&mut tree).unwrap(), vec![run]);
        assert_eq!(emit(&tree), "\\textbf{Hello} $x$");

        inverse.apply(&mut tree).unwrap();
        assert_eq!(emit(&tree), "\\textbf{Hi} $x$");
    }

    #[test]
    fn test_validation_errors() {
        let (tree, _) = parse("a {b}");
        let group = tree.children[1].id;

        assert_eq!(
            Mutation::DeleteNode { id: tree.id }.validate(&tree),
            Err(MutationError::CannotRemoveRoot)
        );
        assert_eq!(
            Mutation::ReplaceText {
                id: group,
                text: "x".to_string()
            }
            .validate(&tree),
            Err(MutationError::NotText(group))
        );
        assert_eq!(
            Mutation::MoveNode {
                id: group,
                parent: tree.children[1].children[0].id,
                index: 0
            }
            .validate(&tree),
            Err(MutationError::CycleDetected)
        );
        assert_eq!(
            Mutation::DeleteNode { id: NodeId(7) }.validate(&tree),
            Err(MutationError::NodeNotFound(NodeId(7)))
        );
        assert!(matches!(
            Mutation::InsertNode {
                parent: tree.id,
                index: 9,
                node: Node::text_run(NodeId(99), "z")
            }
            .validate(&tree),
            Err(MutationError::InvalidIndex { .. })
        ));
        assert_eq!(
            Mutation::InsertNode {
                parent: tree.id,
                index: 0,
                node: Node::text_run(group, "z")
            }
            .validate(&tree),
            Err(MutationError::DuplicateId(group))
        );
    }

    #[test]
    fn test_move_within_parent_and_back() {
        let (mut tree, _) = parse("a{b}c");
        let first = tree.children[0].id;
        let applied = apply_all(
            &[Mutation::MoveNode {
                id: first,
                parent: tree.id,
                index: 2,
            }],
            &mut tree,
        )
        .unwrap();
        assert_eq!(emit(&tree), "{b}ca");
        assert_eq!(applied.touched, vec![tree.id, tree.id]);

        apply_all(&applied.inverse, &mut tree).unwrap();
        assert_eq!(emit(&tree), "a{b}c");
        assert_eq!(tree.children[0].id, first);
    }

    #[test]
    fn test_apply_all_rolls_back_on_failure() {
        let (mut tree, _) = parse("a{b}c");
        let before = tree.clone();
        let result = apply_all(
            &[
                Mutation::DeleteNode {
                    id: tree.children[0].id,
                },
                Mutation::DeleteNode { id: NodeId(12345) },
            ],
            &mut tree,
        );
        assert_eq!(result.unwrap_err(), MutationError::NodeNotFound(NodeId(12345)));
        assert!(tree.same_content(&before));
    }

    #[test]
    fn test_delete_and_insert_inverse_restores_subtree() {
        let (mut tree, mut ids) = parse("x \\emph{y} z");
        let before = tree.clone();
        let emph = tree.children[1].id;
        let group = Node::new(
            ids.new_id(),
            NodeKind::Group {
                delim: GroupDelim::Brace,
            },
        );
        let applied = apply_all(
            &[
                Mutation::DeleteNode { id: emph },
                Mutation::InsertNode {
                    parent: tree.id,
                    index: 1,
                    node: group,
                },
            ],
            &mut tree,
        )
        .unwrap();
        assert_eq!(emit(&tree), "x {} z");

        apply_all(&applied.inverse, &mut tree).unwrap();
        assert!(tree.same_content(&before));
    }

    #[test]
    fn test_diff_children_reproduces_target() {
        let (old, _) = parse("a \\textbf{b} c");
        let mut target = old.clone();
        target.children[1].kind = NodeKind::Command {
            name: "emph".to_string(),
        };
        if let NodeKind::TextRun { text } = &mut target.children[1].children[0].children[0].kind {
            *text = "bee".to_string();
        }
        if let NodeKind::TextRun { text } = &mut target.children[2].kind {
            *text = " c!".to_string();
        }

        let mut mutations = Vec::new();
        diff_children(old.id, 0, &old.children, &target.children, &mut mutations);
        assert_eq!(
            mutations.iter().map(Mutation::name).collect::<Vec<_>>(),
            vec!["set-attribute", "replace-text", "replace-text"]
        );

        let mut tree = old.clone();
        apply_all(&mutations, &mut tree).unwrap();
        assert!(tree.same_content(&target));
        assert_eq!(emit(&tree), "a \\emph{bee} c!");
    }

    #[test]
    fn test_set_attribute_repairs_error_node() {
        let (mut tree, _) = parse("\\begin{itemize}\\item A");
        let error = tree.children[0].id;
        assert!(tree.children[0].is_error());

        Mutation::SetAttribute {
            id: error,
            kind: NodeKind::Environment {
                name: "itemize".to_string(),
                args: 0,
            },
        }
        .apply(&mut tree)
        .unwrap();
        assert_eq!(emit(&tree), "\\begin{itemize}\\item A\\end{itemize}");
    }
}
