//! Bidirectional position mapping between source offsets, tree nodes and
//! visual caret coordinates.
//!
//! Both sides are kept as pre-order entry lists, so a subtree is a contiguous
//! slice. A partial rebuild replaces the slices of the changed subtrees and
//! shifts everything after them.

use std::collections::HashMap;
use tracing::debug;
use vlatex_parser::{Node, NodeId, Span};
use vlatex_projector::{VisualBox, VisualTree};

/// How a visual box takes part in editing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Glyphs of a text run; the caret can stop between any two
    Text,
    /// Selected and deleted as a whole
    Atomic,
    /// Made of other boxes
    Container,
}

/// Visual range of a node's box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualSlot {
    pub id: NodeId,
    pub start: usize,
    pub end: usize,
    /// Units drawn before the children (error markers)
    pub lead: usize,
    pub depth: usize,
    pub kind: SlotKind,
    /// Slots in this box's subtree, itself included
    size: usize,
}

impl VisualSlot {
    pub fn extent(&self) -> usize {
        self.end - self.start
    }

    /// Whether `coord` lies strictly inside the box
    pub fn splits_at(&self, coord: usize) -> bool {
        self.start < coord && coord < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceEntry {
    id: NodeId,
    span: Span,
    size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMap {
    source: Vec<SourceEntry>,
    source_index: HashMap<NodeId, usize>,
    parents: HashMap<NodeId, NodeId>,
    visual: Vec<VisualSlot>,
    visual_index: HashMap<NodeId, usize>,
}

impl PositionMap {
    /// Build from a tree whose cached spans are all up to date, and its
    /// projection.
    pub fn build(tree: &Node, visual: &VisualTree) -> Self {
        let mut map = Self::default();
        map.rebuild(tree, visual);
        map
    }

    pub fn rebuild(&mut self, tree: &Node, visual: &VisualTree) {
        self.source.clear();
        self.parents.clear();
        collect_source(tree, &mut self.source, &mut self.parents);
        self.visual.clear();
        collect_slots(&visual.root, 0, 0, &mut self.visual);
        self.reindex();
    }

    /// Bring the map up to date after the subtrees rooted at `dirty` changed.
    /// Everything outside them is assumed unchanged apart from its position.
    pub fn rebuild_partial(&mut self, tree: &Node, visual: &VisualTree, dirty: &[NodeId]) {
        if dirty.is_empty() {
            return;
        }
        let Some(source_roots) = self.source_roots(tree, dirty) else {
            debug!("Dirty nodes unknown to the position map, rebuilding");
            self.rebuild(tree, visual);
            return;
        };
        for id in source_roots {
            if !self.splice_source(tree, id) {
                self.rebuild(tree, visual);
                return;
            }
        }

        let visual_roots = self.visual_roots(tree, visual, dirty);
        for id in visual_roots {
            if !self.splice_visual(visual, id) {
                self.visual.clear();
                collect_slots(&visual.root, 0, 0, &mut self.visual);
                break;
            }
        }
        self.reindex();
    }

    /// Source byte range of a node
    pub fn source_offset_of(&self, id: NodeId) -> Option<Span> {
        self.source_index.get(&id).map(|&i| self.source[i].span)
    }

    /// The innermost node whose range contains `offset`. A boundary between
    /// two nodes belongs to the one starting there; the end of the document
    /// belongs to the last node.
    pub fn node_at(&self, offset: usize) -> Option<NodeId> {
        let root = self.source.first()?;
        if offset > root.span.end {
            return None;
        }
        if offset == root.span.end {
            return self.source.last().map(|entry| entry.id);
        }
        let upto = self.source.partition_point(|e| e.span.start <= offset);
        self.source[..upto]
            .iter()
            .rev()
            .find(|e| e.span.contains(offset))
            .map(|e| e.id)
    }

    /// Visual caret range of a node's box
    pub fn visual_coord_of(&self, id: NodeId) -> Option<(usize, usize)> {
        self.slot(id).map(|slot| (slot.start, slot.end))
    }

    /// The innermost box containing `coord`, with the same boundary rule as
    /// [`PositionMap::node_at`].
    pub fn node_at_visual(&self, coord: usize) -> Option<NodeId> {
        let root = self.visual.first()?;
        if coord > root.end {
            return None;
        }
        if coord == root.end {
            return self
                .visual
                .iter()
                .rev()
                .find(|slot| slot.end == coord && slot.extent() > 0)
                .or(Some(root))
                .map(|slot| slot.id);
        }
        let upto = self.visual.partition_point(|s| s.start <= coord);
        self.visual[..upto]
            .iter()
            .rev()
            .find(|s| s.start <= coord && coord < s.end)
            .map(|s| s.id)
    }

    pub fn slot(&self, id: NodeId) -> Option<&VisualSlot> {
        self.visual_index.get(&id).map(|&i| &self.visual[i])
    }

    /// Visual slots in pre-order
    pub fn slots(&self) -> &[VisualSlot] {
        &self.visual
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Ids from the root down to the parent of `id`
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Nodes without children, in document order
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.source
            .iter()
            .filter(|entry| entry.size == 1)
            .map(|entry| entry.id)
    }

    pub fn source_len(&self) -> usize {
        self.source.first().map_or(0, |root| root.span.end)
    }

    /// Total caret units of the visual document
    pub fn extent(&self) -> usize {
        self.visual.first().map_or(0, |root| root.end)
    }

    fn reindex(&mut self) {
        self.source_index = self
            .source
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();
        self.visual_index = self
            .visual
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.id, i))
            .collect();
    }

    /// Outermost known ancestor-or-self of each dirty node, in document order,
    /// without roots nested in other roots.
    fn source_roots(&self, tree: &Node, dirty: &[NodeId]) -> Option<Vec<NodeId>> {
        let mut roots: Vec<usize> = Vec::new();
        for id in dirty {
            let Some(mut chain) = tree.ancestors_of(*id) else {
                continue;
            };
            chain.push(*id);
            let known = chain
                .iter()
                .rev()
                .find_map(|candidate| self.source_index.get(candidate).copied())?;
            roots.push(known);
        }
        Some(outermost(roots, |i| self.source[i].size)
            .into_iter()
            .map(|i| self.source[i].id)
            .collect())
    }

    fn visual_roots(&self, tree: &Node, visual: &VisualTree, dirty: &[NodeId]) -> Vec<NodeId> {
        let boxed = visual.index();
        let mut roots: Vec<usize> = Vec::new();
        for id in dirty {
            let Some(mut chain) = tree.ancestors_of(*id) else {
                continue;
            };
            chain.push(*id);
            let known = chain.iter().rev().find_map(|candidate| {
                self.visual_index
                    .get(candidate)
                    .copied()
                    .filter(|_| boxed.contains_key(candidate))
            });
            if let Some(index) = known {
                roots.push(index);
            }
        }
        outermost(roots, |i| self.visual[i].size)
            .into_iter()
            .map(|i| self.visual[i].id)
            .collect()
    }

    fn splice_source(&mut self, tree: &Node, id: NodeId) -> bool {
        let (Some(&index), Some(node)) = (self.source_index.get(&id), tree.find(id)) else {
            return false;
        };
        let Some(new_span) = node.span else {
            return false;
        };
        let old = self.source[index];
        let mut fresh = Vec::new();
        let mut links = HashMap::new();
        collect_source(node, &mut fresh, &mut links);

        for entry in &self.source[index..index + old.size] {
            self.parents.remove(&entry.id);
        }
        if let Some(parent) = tree.parent_of(id).map(|(parent, _)| parent) {
            links.insert(id, parent);
        }
        self.parents.extend(links);

        let size_delta = fresh.len() as isize - old.size as isize;
        let end_delta = new_span.end as isize - old.span.end as isize;
        let after = index + fresh.len();
        self.source.splice(index..index + old.size, fresh);

        for (i, entry) in self.source[..index].iter_mut().enumerate() {
            if i + entry.size > index {
                entry.size = (entry.size as isize + size_delta) as usize;
                entry.span.end = (entry.span.end as isize + end_delta) as usize;
            }
        }
        for entry in &mut self.source[after..] {
            entry.span.start = (entry.span.start as isize + end_delta) as usize;
            entry.span.end = (entry.span.end as isize + end_delta) as usize;
        }
        self.reindex();
        true
    }

    fn splice_visual(&mut self, visual: &VisualTree, id: NodeId) -> bool {
        let (Some(&index), Some((boxed, start, depth))) =
            (self.visual_index.get(&id), locate(&visual.root, id, 0, 0))
        else {
            return false;
        };
        let old = self.visual[index];
        let end = start + boxed.extent;
        let mut fresh = Vec::new();
        collect_slots(boxed, start, depth, &mut fresh);

        let size_delta = fresh.len() as isize - old.size as isize;
        let end_delta = end as isize - old.end as isize;
        let after = index + fresh.len();
        self.visual.splice(index..index + old.size, fresh);

        for (i, slot) in self.visual[..index].iter_mut().enumerate() {
            if i + slot.size > index {
                slot.size = (slot.size as isize + size_delta) as usize;
                slot.end = (slot.end as isize + end_delta) as usize;
            }
        }
        for slot in &mut self.visual[after..] {
            slot.start = (slot.start as isize + end_delta) as usize;
            slot.end = (slot.end as isize + end_delta) as usize;
        }
        self.reindex();
        true
    }
}

/// The box rendering `id`, with its start coordinate and depth.
fn locate(visual: &VisualBox, id: NodeId, start: usize, depth: usize) -> Option<(&VisualBox, usize, usize)> {
    if visual.node == Some(id) {
        return Some((visual, start, depth));
    }
    let mut cursor = start + visual.lead;
    for child in &visual.children {
        if let Some(found) = locate(child, id, cursor, depth + 1) {
            return Some(found);
        }
        cursor += child.extent;
    }
    None
}

/// Drop indices whose pre-order slice lies inside another one, and sort.
fn outermost(mut roots: Vec<usize>, size: impl Fn(usize) -> usize) -> Vec<usize> {
    roots.sort_by_key(|&i| (i, std::cmp::Reverse(size(i))));
    roots.dedup();
    let mut kept: Vec<usize> = Vec::new();
    for i in roots {
        match kept.last() {
            Some(&outer) if i < outer + size(outer) => {}
            _ => kept.push(i),
        }
    }
    kept
}

fn collect_source(node: &Node, out: &mut Vec<SourceEntry>, parents: &mut HashMap<NodeId, NodeId>) {
    let at = out.len();
    out.push(SourceEntry {
        id: node.id,
        span: node.span.unwrap_or_default(),
        size: 1,
    });
    for child in &node.children {
        parents.insert(child.id, node.id);
        collect_source(child, out, parents);
    }
    out[at].size = out.len() - at;
}

fn collect_slots(visual: &VisualBox, start: usize, depth: usize, out: &mut Vec<VisualSlot>) {
    let at = out.len();
    if let Some(id) = visual.node {
        let kind = if matches!(visual.kind, vlatex_projector::BoxKind::GlyphRun { .. }) {
            SlotKind::Text
        } else if visual.is_atomic() {
            SlotKind::Atomic
        } else {
            SlotKind::Container
        };
        out.push(VisualSlot {
            id,
            start,
            end: start + visual.extent,
            lead: visual.lead,
            depth,
            kind,
            size: 1,
        });
    }
    let mut cursor = start + visual.lead;
    for child in &visual.children {
        collect_slots(child, cursor, depth + 1, out);
        cursor += child.extent;
    }
    if visual.node.is_some() {
        out[at].size = out.len() - at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::Mutation;
    use vlatex_parser::{emit_incremental, parse_source, refresh_spans, IdGenerator, ParseOptions};
    use vlatex_projector::Projector;

    fn setup(source: &str) -> (Node, VisualTree, PositionMap) {
        let (_, tree) = parse_source(source, &mut IdGenerator::new("map.tex"), &ParseOptions::default());
        let visual = Projector::default().project(&tree);
        let map = PositionMap::build(&tree, &visual);
        (tree, visual, map)
    }

    #[test]
    fn test_every_leaf_maps_back_to_itself() {
        let (_, _, map) = setup("\\section{Intro} Text with $x^2$ and \\emph{more}.\n\n% note\nEnd");
        let leaves: Vec<_> = map.leaves().collect();
        assert!(!leaves.is_empty());
        for id in leaves {
            let span = map.source_offset_of(id).unwrap();
            assert_eq!(map.node_at(span.start), Some(id));
        }
    }

    #[test]
    fn test_boundary_belongs_to_later_node() {
        let source = "\\textbf{Hi} $x$";
        let (tree, _, map) = setup(source);
        let command = tree.children[0].id;
        let space = tree.children[1].id;
        let math_text = tree.children[2].children[0].id;

        assert_eq!(map.source_offset_of(command), Some(Span::new(0, 11)));
        assert_eq!(map.node_at(11), Some(space));
        assert_eq!(map.node_at(source.len()), Some(math_text));
        assert_eq!(map.node_at(source.len() + 1), None);
        assert_eq!(map.parent_of(math_text), Some(tree.children[2].id));
        assert_eq!(map.ancestors(math_text), vec![tree.id, tree.children[2].id]);
    }

    #[test]
    fn test_visual_lookup() {
        let (tree, _, map) = setup("\\textbf{Hi} $x$");
        let run = tree.children[0].children[0].children[0].id;
        let math = tree.children[2].id;

        assert_eq!(map.extent(), 4);
        assert_eq!(map.visual_coord_of(run), Some((0, 2)));
        assert_eq!(map.node_at_visual(0), Some(run));
        assert_eq!(map.node_at_visual(2), Some(tree.children[1].id));
        assert_eq!(map.node_at_visual(4), Some(math));
        assert_eq!(map.slot(math).map(|slot| slot.kind), Some(SlotKind::Atomic));
        assert_eq!(map.slot(run).map(|slot| slot.kind), Some(SlotKind::Text));
    }

    #[test]
    fn test_partial_rebuild_with_nothing_dirty_changes_nothing() {
        let (tree, visual, map) = setup("a {b} $c$");
        let mut again = map.clone();
        again.rebuild(&tree, &visual);
        again.rebuild_partial(&tree, &visual, &[]);
        assert_eq!(again, map);
    }

    #[test]
    fn test_partial_rebuild_matches_full_rebuild() {
        let source = "a {b} c \\emph{d}";
        let (mut tree, visual, mut map) = setup(source);
        let group = tree.children[1].id;
        let run = tree.children[1].children[0].id;

        Mutation::ReplaceText {
            id: run,
            text: "bbb".to_string(),
        }
        .apply(&mut tree)
        .unwrap();
        let edit = emit_incremental(&mut tree, source, &[run]).unwrap();
        let mut patched = source.to_string();
        edit.apply(&mut patched);
        refresh_spans(&mut tree);

        let projector = Projector::default();
        let visual = projector.project_incremental(&tree, &[group], &visual).tree;
        map.rebuild_partial(&tree, &visual, &[group]);

        assert_eq!(map, PositionMap::build(&tree, &visual));
        assert_eq!(map.source_len(), patched.len());
        assert_eq!(map.visual_coord_of(tree.children[3].id), Some((8, 9)));
    }
}
