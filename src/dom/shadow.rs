//! Shadow tree support: host/root coupling, open and closed modes, and
//! the named and manual slot assignment algorithms.

use log::debug;

use crate::dom::{
    Document, DomError, DomResult, Node, NodeData, NodeFlags, NodeId,
    ShadowData, StrTendril,
};

/// Shadow root visibility mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShadowMode {
    Open,
    Closed,
}

/// How slottables bind to slots in this tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotAssignment {
    Named,
    Manual,
}

/// Options for [`Document::attach_shadow`].
#[derive(Copy, Clone, Debug)]
pub struct ShadowRootInit {
    pub mode: ShadowMode,
    pub slot_assignment: SlotAssignment,
    pub delegates_focus: bool,
    pub clonable: bool,
    pub serializable: bool,
}

impl Default for ShadowRootInit {
    fn default() -> Self {
        ShadowRootInit {
            mode: ShadowMode::Open,
            slot_assignment: SlotAssignment::Named,
            delegates_focus: false,
            clonable: false,
            serializable: false,
        }
    }
}

/// Shadow tree operations.
impl Document {
    /// Attach a shadow root to a host element.
    ///
    /// `NotSupported` if the node is not an element or already hosts a
    /// shadow root. The root is returned regardless of mode; only the
    /// [`Document::shadow_root`] accessor hides closed roots.
    pub fn attach_shadow(&mut self, host: NodeId, init: ShadowRootInit)
        -> DomResult<NodeId>
    {
        if !self[host].is_element() {
            return Err(DomError::NotSupported);
        }
        if self[host].shadow_root_id().is_some() {
            return Err(DomError::NotSupported);
        }
        debug!("attach_shadow {:?} to {:?}", init.mode, host);
        let sid = self.push_node(Node::new(NodeData::Shadow(ShadowData {
            host,
            mode: init.mode,
            slot_assignment: init.slot_assignment,
            delegates_focus: init.delegates_focus,
            clonable: init.clonable,
            serializable: init.serializable,
            _priv: ()
        })));
        self[host].rare_mut().shadow_root = Some(sid);
        self[host].flags.insert(NodeFlags::IS_HOST);
        let conn = self[host].flags.contains(NodeFlags::CONNECTED);
        self.refresh_subtree_state(sid, conn, true);
        if init.slot_assignment == SlotAssignment::Named {
            self.assign_slottables(sid);
        }
        self.bump();
        Ok(sid)
    }

    /// The host's shadow root, or `None` when absent or `closed`.
    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        let sid = self[host].shadow_root_id()?;
        match &self[sid].data {
            NodeData::Shadow(s) if s.mode == ShadowMode::Open => Some(sid),
            _ => None,
        }
    }

    /// The host's shadow root regardless of mode, for engine traversal.
    pub(crate) fn shadow_root_internal(&self, host: NodeId)
        -> Option<NodeId>
    {
        self[host].shadow_root_id()
    }

    /// The host element of a shadow root node.
    pub fn host(&self, shadow: NodeId) -> Option<NodeId> {
        match &self[shadow].data {
            NodeData::Shadow(s) => Some(s.host),
            _ => None,
        }
    }

    /// The slot this node is assigned to, or `None`; slots inside closed
    /// shadow trees are not exposed.
    pub fn assigned_slot(&self, id: NodeId) -> Option<NodeId> {
        let slot = self[id].assigned_slot()?;
        let root = self.plain_root(slot);
        match &self[root].data {
            NodeData::Shadow(s) if s.mode == ShadowMode::Closed => None,
            _ => Some(slot),
        }
    }

    /// The slottables assigned to a slot, in light-tree order. With
    /// `flatten`, nested slots are replaced by their own assignees (or
    /// their fallback children when unassigned).
    pub fn assigned_nodes(&self, slot: NodeId, flatten: bool)
        -> Vec<NodeId>
    {
        let mut out = Vec::new();
        self.collect_assigned(slot, flatten, &mut out);
        out
    }

    fn collect_assigned(
        &self,
        slot: NodeId,
        flatten: bool,
        out: &mut Vec<NodeId>)
    {
        let assigned = self.direct_assignees(slot);
        if flatten && assigned.is_empty() {
            // Fallback content of the slot itself.
            for c in self.children(slot) {
                if self.is_slottable(c) {
                    out.push(c);
                }
            }
            return;
        }
        for n in assigned {
            if flatten && self[n].is_elem("slot") {
                self.collect_assigned(n, true, out);
            } else {
                out.push(n);
            }
        }
    }

    // Host light children with this slot as their assignment, in tree
    // order.
    fn direct_assignees(&self, slot: NodeId) -> Vec<NodeId> {
        let root = self.plain_root(slot);
        let host = match &self[root].data {
            NodeData::Shadow(s) => s.host,
            _ => return vec![],
        };
        self.children(host)
            .filter(|c| self[*c].assigned_slot() == Some(slot))
            .collect()
    }

    /// Manually assign slottables to a slot, replacing its previous
    /// manual assignment. The slot must live in a shadow tree with
    /// `manual` slot assignment.
    pub fn assign(&mut self, slot: NodeId, nodes: &[NodeId])
        -> DomResult<()>
    {
        if !self[slot].is_elem("slot") {
            return Err(DomError::NotSupported);
        }
        let root = self.plain_root(slot);
        match self.slot_mode(root) {
            Some(SlotAssignment::Manual) => {}
            _ => return Err(DomError::NotSupported),
        }
        // Clear this slot's previous assignees.
        let host = match &self[root].data {
            NodeData::Shadow(s) => s.host,
            _ => unreachable!(),
        };
        let prior: Vec<NodeId> = self.children(host)
            .filter(|c| self[*c].assigned_slot() == Some(slot))
            .collect();
        for p in prior {
            self.clear_assigned_slot(p);
        }
        for n in nodes {
            if self.is_slottable(*n) {
                self[*n].rare_mut().assigned_slot = Some(slot);
            }
        }
        self.bump();
        Ok(())
    }

    /// Recompute named slot assignment for every slottable child of the
    /// shadow root's host.
    pub(crate) fn assign_slottables(&mut self, shadow_root: NodeId) {
        let host = match &self[shadow_root].data {
            NodeData::Shadow(s) => s.host,
            _ => return,
        };
        // Slots in tree order within the shadow tree.
        let slots: Vec<(NodeId, StrTendril)> = self.descendants(shadow_root)
            .filter(|n| self[*n].is_elem("slot"))
            .map(|n| {
                let name = self[n].attr("name")
                    .cloned()
                    .unwrap_or_else(StrTendril::new);
                (n, name)
            })
            .collect();
        let slottables: Vec<NodeId> = self.children(host)
            .filter(|c| self.is_slottable(*c))
            .collect();
        for s in slottables {
            let want: StrTendril = self[s].attr("slot")
                .cloned()
                .unwrap_or_else(StrTendril::new);
            let found = slots.iter()
                .find(|(_, name)| *name == want)
                .map(|(id, _)| *id);
            match found {
                Some(slot) => {
                    self[s].rare_mut().assigned_slot = Some(slot);
                }
                None => self.clear_assigned_slot(s),
            }
        }
    }

    pub(crate) fn clear_assigned_slot(&mut self, id: NodeId) {
        if let Some(r) = self[id].rare.as_mut() {
            r.assigned_slot = None;
        }
    }

    // A slottable is an element or text node.
    pub(crate) fn is_slottable(&self, id: NodeId) -> bool {
        matches!(self[id].data, NodeData::Elem(_) | NodeData::Text(_))
    }

    pub(crate) fn slot_mode(&self, root: NodeId) -> Option<SlotAssignment> {
        match &self[root].data {
            NodeData::Shadow(s) => Some(s.slot_assignment),
            _ => None,
        }
    }

    // The slot attribute changed on a slottable: reassign within the
    // parent host's shadow tree, if any.
    pub(crate) fn reassign_for_slottable(&mut self, id: NodeId) {
        let parent = match self[id].parent {
            Some(p) => p,
            None => return,
        };
        if let Some(sr) = self.shadow_root_internal(parent) {
            if self.slot_mode(sr) == Some(SlotAssignment::Named) {
                self.assign_slottables(sr);
            }
        }
    }

    // A slot's name attribute changed: reassign in the shadow tree that
    // contains the slot, if named.
    pub(crate) fn reassign_containing_tree(&mut self, slot: NodeId) {
        let root = self.plain_root(slot);
        if self[root].is_shadow_root()
            && self.slot_mode(root) == Some(SlotAssignment::Named)
        {
            self.assign_slottables(root);
        }
    }
}
