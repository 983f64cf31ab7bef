//! The tree mutation engine: pre-insertion validity, insert/remove/
//! replace/move, cross-document adoption, normalization and textContent.
//!
//! Every mutation stages its checks before touching linkage, so a returned
//! error leaves no partial state visible to collections, ranges or event
//! paths.

use std::collections::HashMap;

use log::trace;

use crate::dom::{
    Document, DomError, DomResult, Node, NodeData, NodeFlags, NodeId,
    SlotAssignment,
};

/// Checked tree mutation.
impl Document {
    /// Append `child` (or a fragment's children) as the new last child of
    /// `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId)
        -> DomResult<NodeId>
    {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` (or a fragment's children) before `ref_child`, or at
    /// the end when `ref_child` is `None`.
    ///
    /// If `child` is already in a tree it is first removed. Connectivity
    /// flags, document indices and slot assignments are maintained.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        ref_child: Option<NodeId>)
        -> DomResult<NodeId>
    {
        self.validate_pre_insert(parent, child, ref_child)?;

        let mut reference = ref_child;
        if reference == Some(child) {
            reference = self[child].next_sibling;
        }

        let new_children: Vec<NodeId> = if self[child].is_fragment() {
            self.children(child).collect()
        } else {
            vec![child]
        };
        if new_children.is_empty() {
            return Ok(child);
        }
        trace!("insert {} node(s) under {:?}", new_children.len(), parent);

        let old_contexts: Vec<Option<NodeId>> = new_children.iter()
            .map(|n| self[*n].parent)
            .collect();

        let parent_conn = self[parent].flags.contains(NodeFlags::CONNECTED);
        let parent_shadow =
            self[parent].flags.contains(NodeFlags::IN_SHADOW_TREE)
            || self[parent].is_shadow_root();

        for n in &new_children {
            if self[*n].flags.contains(NodeFlags::CONNECTED) {
                self.refresh_subtree_state(*n, false, false);
            }
            self.clear_assigned_slot(*n);
            match reference {
                Some(r) => self.link_before(r, *n),
                None => self.link_append(parent, *n),
            }
            self.refresh_subtree_state(*n, parent_conn, parent_shadow);
        }

        // Old parents may have been shadow hosts or slots; their
        // assignments can change by this move.
        for old in old_contexts.into_iter().flatten() {
            self.reassign_around(old);
        }
        self.reassign_around(parent);
        self.bump();
        Ok(child)
    }

    /// Remove `child` from `parent`, leaving it detached but alive.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId)
        -> DomResult<NodeId>
    {
        if self[child].parent != Some(parent) {
            return Err(DomError::NotFound);
        }
        trace!("remove {:?} from {:?}", child, parent);
        if self[child].flags.contains(NodeFlags::CONNECTED)
            || self[child].flags.contains(NodeFlags::IN_SHADOW_TREE)
        {
            self.refresh_subtree_state(child, false, false);
        }
        self.unlink_only(child);
        self.clear_assigned_slot(child);
        self.reassign_around(parent);
        self.bump();
        Ok(child)
    }

    /// Replace `old` with `new` under `parent`, returning `old` detached.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new: NodeId,
        old: NodeId)
        -> DomResult<NodeId>
    {
        if self[old].parent != Some(parent) {
            return Err(DomError::NotFound);
        }
        self.validate_replace(parent, new, old)?;
        let reference = self[old].next_sibling;
        self.remove_child(parent, old)?;
        // insert_before resolves reference == new to new's next sibling.
        self.insert_before(parent, new, reference)?;
        Ok(old)
    }

    /// Relocate an existing child before `ref_child` within the same
    /// parent, without adoption or connect/disconnect transitions.
    ///
    /// A no-op when `node == ref_child`. Relinking is O(1).
    pub fn move_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        ref_child: Option<NodeId>)
        -> DomResult<()>
    {
        if self[node].parent != Some(parent) {
            return Err(DomError::NotFound);
        }
        if let Some(r) = ref_child {
            if self[r].parent != Some(parent) {
                return Err(DomError::NotFound);
            }
            if r == node {
                return Ok(());
            }
        }
        match ref_child {
            Some(r) => self.link_before(r, node),
            None => self.link_append(parent, node),
        }
        // Document order changed: duplicate-id winners may differ.
        self.refresh_moved_ids(node);
        self.bump();
        Ok(())
    }

    /// Remove the subtree at `id` from the tree and free its nodes.
    ///
    /// The slots remain as holes until [`Document::compact`]. The
    /// document node itself cannot be destroyed.
    pub fn destroy(&mut self, id: NodeId) -> DomResult<()> {
        if id == Document::DOCUMENT_NODE_ID {
            return Err(DomError::NotSupported);
        }
        if let Some(parent) = self[id].parent {
            self.remove_child(parent, id)?;
        } else if self[id].flags
            .intersects(NodeFlags::CONNECTED | NodeFlags::IN_SHADOW_TREE)
        {
            self.refresh_subtree_state(id, false, false);
        }
        // Destroying a shadow root directly unhooks its host.
        let host = match &self[id].data {
            NodeData::Shadow(s) => Some(s.host),
            _ => None,
        };
        if let Some(host) = host {
            if let Some(r) = self[host].rare.as_mut() {
                r.shadow_root = None;
            }
            self[host].flags.remove(NodeFlags::IS_HOST);
        }
        self.hole_out(id);
        self.bump();
        Ok(())
    }

    fn hole_out(&mut self, id: NodeId) {
        let kids: Vec<NodeId> = self.children(id).collect();
        for k in kids {
            self.hole_out(k);
        }
        if let Some(sid) = self[id].shadow_root_id() {
            self.hole_out(sid);
        }
        let node = &mut self[id];
        node.take_data();
        node.rare = None;
        node.first_child = None;
        node.last_child = None;
        node.flags = NodeFlags::default();
    }

    /// Replace the specified node with its children, freeing the node.
    ///
    /// The children keep their connectivity (same ancestors). Folding the
    /// document node is not supported.
    pub fn fold(&mut self, id: NodeId) -> DomResult<()> {
        if id == Document::DOCUMENT_NODE_ID {
            return Err(DomError::NotSupported);
        }
        let mut next_child = self[id].first_child;
        while let Some(child) = next_child {
            debug_assert_eq!(self[child].parent, Some(id));
            next_child = self[child].next_sibling;
            if self[id].parent.is_some() {
                self.link_before(id, child);
            } else {
                // Folding a detached root: children become detached roots
                // themselves is not meaningful; keep them under a hole-free
                // detachment by unlinking.
                self.unlink_only(child);
                self.refresh_subtree_state(child, false, false);
            }
        }
        self.destroy(id)
    }

    /// Move the subtree rooted at `id` out of `other` and into this
    /// document, returning its id here. The subtree arrives detached;
    /// slot assignments are cleared, listeners and shadow trees move
    /// along.
    pub fn adopt(&mut self, other: &mut Document, id: NodeId)
        -> DomResult<NodeId>
    {
        if id == Document::DOCUMENT_NODE_ID {
            return Err(DomError::NotSupported);
        }
        if matches!(other[id].data, NodeData::Hole) {
            return Err(DomError::NotFound);
        }
        if let Some(parent) = other[id].parent {
            other.remove_child(parent, id)?;
        }
        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        let nid = self.adopt_copy(other, &mut map, id);

        // Remap the surviving cross-tree pointers into this arena.
        for (_, &new_id) in &map {
            let node = &mut self[new_id];
            if let Some(r) = node.rare.as_mut() {
                r.assigned_slot = None;
                r.shadow_root =
                    r.shadow_root.and_then(|o| map.get(&o).copied());
            }
            if let NodeData::Shadow(s) = &mut node.data {
                if let Some(&nh) = map.get(&s.host) {
                    s.host = nh;
                }
            }
        }
        other.bump();
        self.bump();
        Ok(nid)
    }

    fn adopt_copy(
        &mut self,
        other: &mut Document,
        map: &mut HashMap<NodeId, NodeId>,
        oid: NodeId)
        -> NodeId
    {
        let (data, rare) = {
            let node = &mut other[oid];
            (node.take_data(), node.rare.take())
        };
        let shadow = rare.as_ref().and_then(|r| r.shadow_root);
        let mut nnode = Node::new(data);
        nnode.rare = rare;
        let nid = self.push_node(nnode);
        map.insert(oid, nid);

        let kids: Vec<NodeId> = other.children(oid).collect();
        for k in kids {
            let nk = self.adopt_copy(other, map, k);
            self.link_append(nid, nk);
        }
        if let Some(sid) = shadow {
            self.adopt_copy(other, map, sid);
        }
        nid
    }

    /// Coalesce contiguous text children throughout the subtree and drop
    /// empty text nodes. Does not cross element boundaries. Idempotent.
    pub fn normalize(&mut self, root: NodeId) {
        let mut parents = vec![root];
        let mut i = 0;
        while i < parents.len() {
            let p = parents[i];
            i += 1;
            let kids: Vec<NodeId> = self.children(p).collect();
            parents.extend(
                kids.iter().copied().filter(|k| self[*k].first_child.is_some())
            );
            if let Some(sid) = self[p].shadow_root_id() {
                parents.push(sid);
            }

            let mut run_head: Option<NodeId> = None;
            for k in kids {
                let is_text = matches!(self[k].data, NodeData::Text(_));
                if !is_text {
                    run_head = None;
                    continue;
                }
                let data = match &self[k].data {
                    NodeData::Text(t) => t.clone(),
                    _ => unreachable!(),
                };
                if data.is_empty() {
                    let _ = self.destroy(k);
                    continue;
                }
                match run_head {
                    None => run_head = Some(k),
                    Some(h) => {
                        if let NodeData::Text(t) = &mut self[h].data {
                            t.push_tendril(&data);
                        }
                        let _ = self.destroy(k);
                    }
                }
            }
        }
        self.bump();
    }

    /// Set `textContent`: for character data, replaces the data; for
    /// elements, fragments and shadow roots, replaces all children with a
    /// single text node (or nothing when `value` is empty or `None`).
    /// Documents and doctypes ignore the setter.
    pub fn set_text_content(&mut self, id: NodeId, value: Option<&str>) {
        match self[id].data {
            NodeData::Text(_) | NodeData::Comment(_) | NodeData::CData(_)
            | NodeData::Pi(_) | NodeData::Attr(_) => {
                self.set_node_value(id, value.unwrap_or(""));
                return;
            }
            NodeData::Elem(_) | NodeData::Fragment | NodeData::Shadow(_) => {}
            NodeData::Document | NodeData::DocType(_) | NodeData::Hole =>
                return,
        }
        let kids: Vec<NodeId> = self.children(id).collect();
        for k in kids {
            let _ = self.destroy(k);
        }
        if let Some(v) = value {
            if !v.is_empty() {
                let t = self.create_text_node(v);
                // The parent kind was vetted above.
                self.link_append(id, t);
                let conn = self[id].flags.contains(NodeFlags::CONNECTED);
                let shad = self[id].flags.contains(NodeFlags::IN_SHADOW_TREE)
                    || self[id].is_shadow_root();
                self.refresh_subtree_state(t, conn, shad);
            }
        }
        self.reassign_around(id);
        self.bump();
    }
}

/// Validity and state propagation internals.
impl Document {
    /// Pre-insertion validity per the standard's kind and cycle rules.
    pub(crate) fn validate_pre_insert(
        &self,
        parent: NodeId,
        child: NodeId,
        ref_child: Option<NodeId>)
        -> DomResult<()>
    {
        self.validate_parent_kind(parent)?;
        if self.is_host_including_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest);
        }
        if let Some(r) = ref_child {
            if self[r].parent != Some(parent) {
                return Err(DomError::NotFound);
            }
        }
        self.validate_child_kind(child)?;
        if matches!(self[parent].data, NodeData::Document) {
            self.validate_document_child(parent, child, ref_child, None)?;
        } else if self[child].is_doctype() {
            return Err(DomError::HierarchyRequest);
        }
        Ok(())
    }

    fn validate_replace(
        &self,
        parent: NodeId,
        new: NodeId,
        old: NodeId)
        -> DomResult<()>
    {
        self.validate_parent_kind(parent)?;
        if self.is_host_including_ancestor(new, parent) {
            return Err(DomError::HierarchyRequest);
        }
        self.validate_child_kind(new)?;
        if matches!(self[parent].data, NodeData::Document) {
            self.validate_document_child(
                parent, new, self[old].next_sibling, Some(old))?;
        } else if self[new].is_doctype() {
            return Err(DomError::HierarchyRequest);
        }
        Ok(())
    }

    fn validate_parent_kind(&self, parent: NodeId) -> DomResult<()> {
        match self[parent].data {
            NodeData::Document | NodeData::Elem(_) | NodeData::Fragment
            | NodeData::Shadow(_) => Ok(()),
            _ => Err(DomError::HierarchyRequest),
        }
    }

    fn validate_child_kind(&self, child: NodeId) -> DomResult<()> {
        match self[child].data {
            NodeData::Fragment | NodeData::DocType(_) | NodeData::Elem(_)
            | NodeData::Text(_) | NodeData::Comment(_) | NodeData::CData(_)
            | NodeData::Pi(_) => Ok(()),
            _ => Err(DomError::HierarchyRequest),
        }
    }

    // Kind rules for document parents: at most one element child, at most
    // one doctype, no text, and doctype-before-element ordering.
    // `excluded` is the child being replaced, ignored in the counts.
    fn validate_document_child(
        &self,
        parent: NodeId,
        child: NodeId,
        ref_child: Option<NodeId>,
        excluded: Option<NodeId>)
        -> DomResult<()>
    {
        let has_elem = self.children(parent).any(
            |c| Some(c) != excluded && self[c].is_element());
        let has_doctype = self.children(parent).any(
            |c| Some(c) != excluded && self[c].is_doctype());

        let err = Err(DomError::HierarchyRequest);
        match &self[child].data {
            NodeData::Text(_) | NodeData::CData(_) => return err,
            NodeData::Fragment => {
                let mut elems = 0;
                for c in self.children(child) {
                    match self[c].data {
                        NodeData::Elem(_) => elems += 1,
                        NodeData::Text(_) | NodeData::CData(_) => return err,
                        _ => {}
                    }
                }
                if elems > 1 {
                    return err;
                }
                if elems == 1 {
                    if has_elem {
                        return err;
                    }
                    if self.doctype_at_or_after(ref_child, excluded) {
                        return err;
                    }
                }
            }
            NodeData::Elem(_) => {
                if has_elem {
                    return err;
                }
                if self.doctype_at_or_after(ref_child, excluded) {
                    return err;
                }
            }
            NodeData::DocType(_) => {
                if has_doctype {
                    return err;
                }
                match ref_child {
                    Some(r) => {
                        if self.element_before(parent, r, excluded) {
                            return err;
                        }
                    }
                    None => {
                        if has_elem {
                            return err;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // True if ref_child is a doctype, or a doctype follows it; with a null
    // ref, false (append position).
    fn doctype_at_or_after(
        &self,
        ref_child: Option<NodeId>,
        excluded: Option<NodeId>)
        -> bool
    {
        let start = match ref_child {
            Some(r) => r,
            None => return false,
        };
        self.node_and_following_siblings(start)
            .any(|s| Some(s) != excluded && self[s].is_doctype())
    }

    // True if an element precedes `before` among parent's children.
    fn element_before(
        &self,
        parent: NodeId,
        before: NodeId,
        excluded: Option<NodeId>)
        -> bool
    {
        for c in self.children(parent) {
            if c == before {
                return false;
            }
            if Some(c) != excluded && self[c].is_element() {
                return true;
            }
        }
        false
    }

    /// True if `a` is a host-including inclusive ancestor of `b`: an
    /// ancestor in the plain tree, or the ancestor of a hosting element
    /// of a shadow tree containing `b`.
    pub(crate) fn is_host_including_ancestor(&self, a: NodeId, b: NodeId)
        -> bool
    {
        let mut cur = Some(b);
        while let Some(id) = cur {
            if id == a {
                return true;
            }
            cur = match self[id].parent {
                Some(p) => Some(p),
                None => match &self[id].data {
                    NodeData::Shadow(s) => Some(s.host),
                    _ => None,
                },
            };
        }
        false
    }

    /// Recompute `connected` and `in_shadow_tree` flags across the subtree
    /// (shadow trees included), registering or deregistering document ids
    /// on connectivity edges.
    pub(crate) fn refresh_subtree_state(
        &mut self,
        root: NodeId,
        connected: bool,
        in_shadow: bool)
    {
        let mut stack = vec![(root, connected, in_shadow)];
        while let Some((id, conn, shad)) = stack.pop() {
            let was = self[id].flags.contains(NodeFlags::CONNECTED);
            self[id].flags.set(NodeFlags::CONNECTED, conn);
            self[id].flags.set(NodeFlags::IN_SHADOW_TREE, shad);
            if was != conn && self[id].is_element() {
                if conn {
                    self.register_id(id);
                } else {
                    self.deregister_id(id);
                }
            }
            let mut c = self[id].first_child;
            while let Some(cid) = c {
                stack.push((cid, conn, shad));
                c = self[cid].next_sibling;
            }
            if let Some(sid) = self[id].shadow_root_id() {
                stack.push((sid, conn, true));
            }
        }
    }

    /// Recompute connectivity flags and the id index for the whole tree
    /// under `root` (the document node after a clone).
    pub(crate) fn refresh_all(&mut self, root: NodeId) {
        let conn = root == Document::DOCUMENT_NODE_ID
            || self[root].flags.contains(NodeFlags::CONNECTED);
        let kids: Vec<NodeId> = self.children(root).collect();
        for k in kids {
            self.refresh_subtree_state(k, conn, false);
        }
    }

    // Rerun slot assignment in the trees a mutation around `node` can
    // affect: the shadow tree hosted by `node`, and the shadow tree
    // containing `node`, when assignment is `named`.
    pub(crate) fn reassign_around(&mut self, node: NodeId) {
        if let Some(sr) = self[node].shadow_root_id() {
            if self.slot_mode(sr) == Some(SlotAssignment::Named) {
                self.assign_slottables(sr);
            }
        }
        let root = self.plain_root(node);
        if self[root].is_shadow_root()
            && self.slot_mode(root) == Some(SlotAssignment::Named)
        {
            self.assign_slottables(root);
        }
    }

    pub(crate) fn plain_root(&self, id: NodeId) -> NodeId {
        self.node_and_ancestors(id).last().unwrap_or(id)
    }
}
