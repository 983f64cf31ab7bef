//! Ranges over the tree: mutable boundary points with the standard
//! contents algorithms, and the immutable unvalidated `StaticRange`.

use std::cmp::Ordering;

use crate::chars;
use crate::dom::{
    Document, DomError, DomResult, NodeData, NodeId, StrTendril,
};

/// A boundary point: a container node and an offset into it, counted in
/// children for container nodes and UTF-16 code units for character data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Boundary {
    pub(crate) node: NodeId,
    pub(crate) offset: u32,
}

/// Which boundary pair [`Range::compare_boundary_points`] compares.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HowToCompare {
    StartToStart,
    StartToEnd,
    EndToEnd,
    EndToStart,
}

/// A live region of the tree delimited by two boundary points, start ≤
/// end in tree order.
///
/// A `Range` holds plain node ids: if a boundary node is removed from the
/// tree the range keeps its points and may become invalid, as the
/// single-writer model specifies. Re-set the boundaries to recover.
#[derive(Clone, Debug, PartialEq)]
pub struct Range {
    start: Boundary,
    end: Boundary,
}

impl Document {
    /// A new range collapsed at `(document node, 0)`.
    pub fn create_range(&self) -> Range {
        let b = Boundary { node: Document::DOCUMENT_NODE_ID, offset: 0 };
        Range { start: b, end: b }
    }

    /// The node's length: UTF-16 code units for character data, child
    /// count otherwise.
    pub fn node_length(&self, id: NodeId) -> u32 {
        match &self[id].data {
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::CData(t) =>
                chars::utf16_len(t),
            NodeData::Pi(pi) => chars::utf16_len(&pi.data),
            NodeData::DocType(_) | NodeData::Attr(_) => 0,
            _ => self.children(id).count() as u32,
        }
    }

    pub(crate) fn child_at(&self, parent: NodeId, index: u32)
        -> Option<NodeId>
    {
        self.children(parent).nth(index as usize)
    }

    // Tree-order comparison of two boundary points sharing a root.
    pub(crate) fn cmp_boundaries(&self, a: Boundary, b: Boundary)
        -> Ordering
    {
        if a.node == b.node {
            return a.offset.cmp(&b.offset);
        }
        if self.contains(a.node, b.node) {
            // The child of a.node on the path towards b.node.
            let child = self.node_and_ancestors(b.node)
                .find(|n| self[*n].parent == Some(a.node))
                .expect("ancestor path");
            let idx = self.child_index(child).expect("child index");
            return if idx < a.offset {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if self.contains(b.node, a.node) {
            return self.cmp_boundaries(b, a).reverse();
        }
        // Disjoint containers: document order of the containers decides.
        let pos = self.compare_document_position(a.node, b.node);
        if pos & crate::dom::position::FOLLOWING != 0 {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl Range {
    /// The start boundary `(container, offset)`.
    pub fn start(&self) -> (NodeId, u32) {
        (self.start.node, self.start.offset)
    }

    /// The end boundary `(container, offset)`.
    pub fn end(&self) -> (NodeId, u32) {
        (self.end.node, self.end.offset)
    }

    /// True when start equals end.
    pub fn collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Collapse to one boundary: the start when `to_start`, else the end.
    pub fn collapse(&mut self, to_start: bool) {
        if to_start {
            self.end = self.start;
        } else {
            self.start = self.end;
        }
    }

    fn check_container(doc: &Document, node: NodeId, offset: u32)
        -> DomResult<()>
    {
        if doc[node].is_doctype() {
            return Err(DomError::InvalidNodeType);
        }
        let len = doc.node_length(node);
        if offset > len {
            return Err(DomError::IndexSize);
        }
        Ok(())
    }

    /// Set the start boundary, collapsing the end forward when the new
    /// start would follow it (or sits in a different tree).
    pub fn set_start(&mut self, doc: &Document, node: NodeId, offset: u32)
        -> DomResult<()>
    {
        Range::check_container(doc, node, offset)?;
        let b = Boundary { node, offset };
        let same_root =
            doc.plain_root(node) == doc.plain_root(self.end.node);
        self.start = b;
        if !same_root || doc.cmp_boundaries(b, self.end) == Ordering::Greater
        {
            self.end = b;
        }
        Ok(())
    }

    /// Set the end boundary, collapsing the start backward when needed.
    pub fn set_end(&mut self, doc: &Document, node: NodeId, offset: u32)
        -> DomResult<()>
    {
        Range::check_container(doc, node, offset)?;
        let b = Boundary { node, offset };
        let same_root =
            doc.plain_root(node) == doc.plain_root(self.start.node);
        self.end = b;
        if !same_root || doc.cmp_boundaries(b, self.start) == Ordering::Less
        {
            self.start = b;
        }
        Ok(())
    }

    /// Select a node: boundaries at `(parent, index)` and
    /// `(parent, index + 1)`.
    pub fn select_node(&mut self, doc: &Document, node: NodeId)
        -> DomResult<()>
    {
        let parent = doc[node].parent.ok_or(DomError::InvalidNodeType)?;
        let idx = doc.child_index(node).ok_or(DomError::InvalidNodeType)?;
        self.start = Boundary { node: parent, offset: idx };
        self.end = Boundary { node: parent, offset: idx + 1 };
        Ok(())
    }

    /// Select a node's contents: `(node, 0)` to `(node, length)`.
    pub fn select_node_contents(&mut self, doc: &Document, node: NodeId)
        -> DomResult<()>
    {
        if doc[node].is_doctype() {
            return Err(DomError::InvalidNodeType);
        }
        self.start = Boundary { node, offset: 0 };
        self.end = Boundary { node, offset: doc.node_length(node) };
        Ok(())
    }

    /// The deepest node containing both boundaries.
    pub fn common_ancestor_container(&self, doc: &Document) -> NodeId {
        let mut cur = self.start.node;
        loop {
            if doc.contains(cur, self.end.node) {
                return cur;
            }
            match doc[cur].parent {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Compare a boundary pair against `other`, returning -1/0/1.
    pub fn compare_boundary_points(
        &self,
        doc: &Document,
        how: HowToCompare,
        other: &Range)
        -> DomResult<i8>
    {
        let (this, that) = match how {
            HowToCompare::StartToStart => (self.start, other.start),
            HowToCompare::StartToEnd => (self.end, other.start),
            HowToCompare::EndToEnd => (self.end, other.end),
            HowToCompare::EndToStart => (self.start, other.end),
        };
        if doc.plain_root(this.node) != doc.plain_root(that.node) {
            return Err(DomError::WrongDocument);
        }
        Ok(match doc.cmp_boundaries(this, that) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }

    // True if the node is fully contained: its start boundary at or after
    // range start, its end boundary at or before range end.
    fn contained(&self, doc: &Document, node: NodeId) -> bool {
        let parent = match doc[node].parent {
            Some(p) => p,
            None => return false,
        };
        let idx = match doc.child_index(node) {
            Some(i) => i,
            None => return false,
        };
        let ns = Boundary { node: parent, offset: idx };
        let ne = Boundary { node: parent, offset: idx + 1 };
        doc.cmp_boundaries(self.start, ns) != Ordering::Greater
            && doc.cmp_boundaries(ne, self.end) != Ordering::Greater
    }

    fn partially_contained(&self, doc: &Document, node: NodeId) -> bool {
        let a = doc.contains(node, self.start.node);
        let b = doc.contains(node, self.end.node);
        a != b
    }

    /// Remove the range's contents from the tree, collapsing the range.
    pub fn delete_contents(&mut self, doc: &mut Document) -> DomResult<()> {
        let frag = self.extract_contents(doc)?;
        doc.destroy(frag)
    }

    /// Move the range's contents into a new document fragment, splitting
    /// partially selected character data by UTF-16 offset. The range
    /// collapses to the extraction point.
    pub fn extract_contents(&mut self, doc: &mut Document)
        -> DomResult<NodeId>
    {
        self.contents(doc, true)
    }

    /// Copy the range's contents into a new document fragment; the range
    /// is unchanged.
    pub fn clone_contents(&self, doc: &mut Document) -> DomResult<NodeId> {
        let mut scratch = self.clone();
        scratch.contents(doc, false)
    }

    fn contents(&mut self, doc: &mut Document, extract: bool)
        -> DomResult<NodeId>
    {
        let frag = doc.create_document_fragment();
        if self.collapsed() {
            return Ok(frag);
        }
        let (start, end) = (self.start, self.end);

        // Single character-data container: substring, and for extraction
        // also delete the selected span.
        if start.node == end.node && doc[start.node].is_char_data() {
            let piece = doc.substring_data(
                start.node, start.offset, Some(end.offset - start.offset))?;
            let t = doc.create_text_like(start.node, &piece);
            doc.link_append(frag, t);
            if extract {
                doc.delete_data(
                    start.node, start.offset, end.offset - start.offset)?;
                self.end = self.start;
            }
            return Ok(frag);
        }

        let ca = self.common_ancestor_container(doc);

        // New position for an extracting range, computed before linkage
        // moves.
        let new_boundary = if doc.contains(start.node, end.node) {
            start
        } else {
            let anchor = doc.node_and_ancestors(start.node)
                .find(|n| {
                    doc[*n].parent
                        .map(|p| doc.contains(p, end.node))
                        .unwrap_or(false)
                });
            match anchor {
                Some(a) => {
                    let p = doc[a].parent.unwrap();
                    let idx = doc.child_index(a).unwrap();
                    Boundary { node: p, offset: idx + 1 }
                }
                None => start,
            }
        };

        // Classify against the pre-mutation tree: extraction shifts the
        // sibling indices the boundary offsets count.
        let mut plan: Vec<(NodeId, bool, bool)> = Vec::new();
        for (i, child) in doc.children(ca).enumerate() {
            let cs = Boundary { node: ca, offset: i as u32 };
            let ce = Boundary { node: ca, offset: i as u32 + 1 };
            // Wholly outside the range on either side.
            if doc.cmp_boundaries(ce, start) != Ordering::Greater
                || doc.cmp_boundaries(cs, end) == Ordering::Greater
            {
                continue;
            }
            let has_start =
                start.node != ca && doc.contains(child, start.node);
            let has_end = end.node != ca && doc.contains(child, end.node);
            plan.push((child, has_start, has_end));
        }
        for (child, has_start, has_end) in plan {
            if !has_start && !has_end {
                // Fully covered child.
                if extract {
                    let p = doc[child].parent.unwrap();
                    doc.remove_child(p, child)?;
                    doc.link_append(frag, child);
                } else {
                    let clone = doc.clone_node(child, true);
                    doc.link_append(frag, clone);
                }
            } else if has_start && doc[child].is_char_data() {
                // Boundary character data: the suffix is selected.
                let len = doc.node_length(child);
                if start.offset < len {
                    let piece = doc.substring_data(
                        child, start.offset, Some(len - start.offset))?;
                    let t = doc.create_text_like(child, &piece);
                    doc.link_append(frag, t);
                    if extract {
                        doc.delete_data(
                            child, start.offset, len - start.offset)?;
                    }
                }
            } else if has_end && doc[child].is_char_data() {
                if end.offset > 0 {
                    let piece =
                        doc.substring_data(child, 0, Some(end.offset))?;
                    let t = doc.create_text_like(child, &piece);
                    doc.link_append(frag, t);
                    if extract {
                        doc.delete_data(child, 0, end.offset)?;
                    }
                }
            } else if has_start {
                // The shell opened before the range: it stays; selected
                // tail contents go under a shallow shell copy.
                let shell = doc.clone_node(child, false);
                doc.link_append(frag, shell);
                self.take_tail(doc, child, shell, start, extract)?;
            } else {
                // The shell opened inside the range: it moves; the
                // unselected tail is evicted to a leftover shell kept in
                // the tree, created only when content remains.
                if extract {
                    let leftover = self.evict_tail(doc, child, end)?;
                    let p = doc[child].parent.unwrap();
                    if let Some(l) = leftover {
                        doc.insert_before(p, l, self.after_sibling(doc, child))?;
                    }
                    doc.remove_child(p, child)?;
                    doc.link_append(frag, child);
                } else {
                    let shell = doc.clone_node(child, false);
                    doc.link_append(frag, shell);
                    self.copy_head(doc, child, shell, end)?;
                }
            }
        }
        if extract {
            self.start = new_boundary;
            self.end = new_boundary;
        }
        doc.bump();
        Ok(frag)
    }

    fn after_sibling(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        doc[node].next_sibling()
    }

    // Move (or copy) the contents of `node` selected past the start
    // boundary into `dest`.
    fn take_tail(
        &self,
        doc: &mut Document,
        node: NodeId,
        dest: NodeId,
        start: Boundary,
        extract: bool)
        -> DomResult<()>
    {
        // Classify before mutating; see `contents`.
        let mut selected: Vec<NodeId> = Vec::new();
        for (i, g) in doc.children(node).enumerate() {
            let ge = Boundary { node, offset: i as u32 + 1 };
            if doc.cmp_boundaries(ge, start) == Ordering::Greater {
                selected.push(g);
            }
        }
        for g in selected {
            if g == start.node && doc[g].is_char_data() {
                let len = doc.node_length(g);
                if start.offset < len {
                    let piece = doc.substring_data(
                        g, start.offset, Some(len - start.offset))?;
                    let t = doc.create_text_like(g, &piece);
                    doc.link_append(dest, t);
                    if extract {
                        doc.delete_data(
                            g, start.offset, len - start.offset)?;
                    }
                }
            } else if doc.contains(g, start.node) {
                let shell = doc.clone_node(g, false);
                doc.link_append(dest, shell);
                self.take_tail(doc, g, shell, start, extract)?;
            } else if extract {
                doc.remove_child(node, g)?;
                doc.link_append(dest, g);
            } else {
                let clone = doc.clone_node(g, true);
                doc.link_append(dest, clone);
            }
        }
        Ok(())
    }

    // Remove the contents of `node` past the end boundary into a fresh
    // leftover shell, returning it when any content was evicted.
    fn evict_tail(
        &self,
        doc: &mut Document,
        node: NodeId,
        end: Boundary)
        -> DomResult<Option<NodeId>>
    {
        enum Evict {
            SplitText(NodeId),
            Recurse(NodeId),
            Whole(NodeId),
        }
        // Classify before mutating; see `contents`.
        let mut plan: Vec<Evict> = Vec::new();
        for (i, g) in doc.children(node).enumerate() {
            let gs = Boundary { node, offset: i as u32 };
            if g == end.node && doc[g].is_char_data() {
                plan.push(Evict::SplitText(g));
            } else if doc.contains(g, end.node) {
                plan.push(Evict::Recurse(g));
            } else if doc.cmp_boundaries(gs, end) != Ordering::Less {
                // Wholly after the end boundary.
                plan.push(Evict::Whole(g));
            }
        }

        let mut leftover = None;
        for step in plan {
            match step {
                Evict::SplitText(g) => {
                    let len = doc.node_length(g);
                    if end.offset < len {
                        let piece = doc.substring_data(
                            g, end.offset, Some(len - end.offset))?;
                        let t = doc.create_text_like(g, &piece);
                        let l = self.leftover_for(doc, node, &mut leftover);
                        doc.link_append(l, t);
                        doc.delete_data(g, end.offset, len - end.offset)?;
                    }
                }
                Evict::Recurse(g) => {
                    if let Some(inner) = self.evict_tail(doc, g, end)? {
                        let l = self.leftover_for(doc, node, &mut leftover);
                        doc.link_append(l, inner);
                    }
                }
                Evict::Whole(g) => {
                    doc.remove_child(node, g)?;
                    let l = self.leftover_for(doc, node, &mut leftover);
                    doc.link_append(l, g);
                }
            }
        }
        Ok(leftover)
    }

    fn leftover_for(
        &self,
        doc: &mut Document,
        like: NodeId,
        slot: &mut Option<NodeId>)
        -> NodeId
    {
        *slot.get_or_insert_with(|| doc.clone_node(like, false))
    }

    // Copy the contents of `node` selected before the end boundary into
    // `dest`.
    fn copy_head(
        &self,
        doc: &mut Document,
        node: NodeId,
        dest: NodeId,
        end: Boundary)
        -> DomResult<()>
    {
        let kids: Vec<NodeId> = doc.children(node).collect();
        for g in kids {
            let idx = doc.child_index(g).unwrap_or(0);
            let gs = Boundary { node, offset: idx };
            if doc.cmp_boundaries(gs, end) != Ordering::Less {
                break; // at or past the end boundary
            }
            if g == end.node && doc[g].is_char_data() {
                if end.offset > 0 {
                    let piece =
                        doc.substring_data(g, 0, Some(end.offset))?;
                    let t = doc.create_text_like(g, &piece);
                    doc.link_append(dest, t);
                }
            } else if doc.contains(g, end.node) {
                let shell = doc.clone_node(g, false);
                doc.link_append(dest, shell);
                self.copy_head(doc, g, shell, end)?;
            } else {
                let clone = doc.clone_node(g, true);
                doc.link_append(dest, clone);
            }
        }
        Ok(())
    }

    /// Insert a node at the range start; a start inside a text node
    /// splits it and places the node between the halves.
    pub fn insert_node(&mut self, doc: &mut Document, node: NodeId)
        -> DomResult<()>
    {
        let start = self.start;
        let (parent, reference) = match &doc[start.node].data {
            NodeData::Comment(_) | NodeData::Pi(_) =>
                return Err(DomError::HierarchyRequest),
            NodeData::Text(_) | NodeData::CData(_) => {
                let parent = doc[start.node].parent
                    .ok_or(DomError::HierarchyRequest)?;
                if start.node == node {
                    return Err(DomError::HierarchyRequest);
                }
                let tail = doc.split_text(start.node, start.offset)?;
                (parent, Some(tail))
            }
            _ => (start.node, doc.child_at(start.node, start.offset)),
        };
        let was_collapsed = self.collapsed();
        doc.insert_before(parent, node, reference)?;
        if was_collapsed {
            if let Some(idx) = doc.child_index(node) {
                let b = Boundary {
                    node: parent,
                    offset: idx + 1,
                };
                self.end = b;
            }
        }
        Ok(())
    }

    /// Wrap the range's contents in `wrapper`. Fails with `InvalidState`
    /// when a non-text node is partially selected.
    pub fn surround_contents(&mut self, doc: &mut Document, wrapper: NodeId)
        -> DomResult<()>
    {
        // Reject partially selected non-text nodes anywhere in range.
        let ca = self.common_ancestor_container(doc);
        let bad = doc.descendants(ca).any(|n| {
            self.partially_contained(doc, n) && !doc[n].is_char_data()
        });
        if bad {
            return Err(DomError::InvalidState);
        }
        match doc[wrapper].data {
            NodeData::Elem(_) => {}
            _ => return Err(DomError::InvalidNodeType),
        }
        let frag = self.extract_contents(doc)?;
        let kids: Vec<NodeId> = doc.children(wrapper).collect();
        for k in kids {
            let _ = doc.destroy(k);
        }
        self.insert_node(doc, wrapper)?;
        doc.append_child(wrapper, frag)?;
        self.select_node(doc, wrapper)
    }

    /// Concatenate the character data within the range, in tree order.
    pub fn to_text(&self, doc: &Document) -> StrTendril {
        let (start, end) = (self.start, self.end);
        if start.node == end.node && doc[start.node].is_text() {
            return doc.substring_data(
                start.node, start.offset, Some(end.offset - start.offset))
                .unwrap_or_else(|_| StrTendril::new());
        }
        let ca = self.common_ancestor_container(doc);
        let mut out = StrTendril::new();
        for n in doc.descendants(ca) {
            if !doc[n].is_text() {
                continue;
            }
            let len = doc.node_length(n);
            let (from, to) = if n == start.node {
                (start.offset, len)
            } else if n == end.node {
                (0, end.offset)
            } else if self.contained(doc, n) {
                (0, len)
            } else {
                continue;
            };
            if let Ok(piece) =
                doc.substring_data(n, from, Some(to - from))
            {
                out.push_tendril(&piece);
            }
        }
        out
    }
}

/// An immutable, unvalidated snapshot of two boundary points.
///
/// Out-of-range offsets are accepted at construction; [`StaticRange::
/// is_valid`] evaluates against the current tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticRange {
    start_container: NodeId,
    start_offset: u32,
    end_container: NodeId,
    end_offset: u32,
}

impl StaticRange {
    /// Construct from raw boundary points. `DocumentType` and `Attr`
    /// containers are rejected; offsets are not checked.
    pub fn new(
        doc: &Document,
        start_container: NodeId,
        start_offset: u32,
        end_container: NodeId,
        end_offset: u32)
        -> DomResult<StaticRange>
    {
        for n in [start_container, end_container].iter() {
            match doc[*n].data {
                NodeData::DocType(_) | NodeData::Attr(_) =>
                    return Err(DomError::InvalidNodeType),
                _ => {}
            }
        }
        Ok(StaticRange {
            start_container,
            start_offset,
            end_container,
            end_offset,
        })
    }

    pub fn start(&self) -> (NodeId, u32) {
        (self.start_container, self.start_offset)
    }

    pub fn end(&self) -> (NodeId, u32) {
        (self.end_container, self.end_offset)
    }

    pub fn collapsed(&self) -> bool {
        self.start_container == self.end_container
            && self.start_offset == self.end_offset
    }

    /// Both offsets within current node lengths, a shared root, and
    /// start ≤ end in tree order.
    pub fn is_valid(&self, doc: &Document) -> bool {
        if self.start_offset > doc.node_length(self.start_container)
            || self.end_offset > doc.node_length(self.end_container)
        {
            return false;
        }
        if doc.plain_root(self.start_container)
            != doc.plain_root(self.end_container)
        {
            return false;
        }
        let s = Boundary {
            node: self.start_container,
            offset: self.start_offset,
        };
        let e = Boundary {
            node: self.end_container,
            offset: self.end_offset,
        };
        doc.cmp_boundaries(s, e) != Ordering::Greater
    }
}
