//! Document-order traversal: `NodeIterator` with a kind bitmask and an
//! optional predicate filter.

use std::rc::Rc;

use crate::dom::{Document, NodeData, NodeId};

bitflags::bitflags! {
    /// Which node kinds a traversal yields.
    pub struct WhatToShow: u32 {
        const SHOW_ELEMENT                = 0x0001;
        const SHOW_ATTRIBUTE              = 0x0002;
        const SHOW_TEXT                   = 0x0004;
        const SHOW_CDATA_SECTION          = 0x0008;
        const SHOW_PROCESSING_INSTRUCTION = 0x0040;
        const SHOW_COMMENT                = 0x0080;
        const SHOW_DOCUMENT               = 0x0100;
        const SHOW_DOCUMENT_TYPE          = 0x0200;
        const SHOW_DOCUMENT_FRAGMENT      = 0x0400;
        const SHOW_ALL                    = 0xFFFF_FFFF;
    }
}

/// A filter verdict. For `NodeIterator`, `Reject` and `Skip` are
/// equivalent (both pass over the node only).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterResult {
    Accept,
    Reject,
    Skip,
}

/// An optional node predicate consulted after the kind mask.
pub type NodeFilterFn = Rc<dyn Fn(&Document, NodeId) -> FilterResult>;

/// Pre-order document traversal over a root's inclusive subtree.
///
/// The iterator holds plain ids and consults the tree on each call, so
/// it stays usable across mutations; `detach` is a no-op kept for
/// interface compatibility.
pub struct NodeIterator {
    root: NodeId,
    what_to_show: WhatToShow,
    filter: Option<NodeFilterFn>,
    reference: NodeId,
    pointer_before_reference: bool,
}

impl Document {
    /// Create an iterator rooted at `root`.
    pub fn create_node_iterator(
        &self,
        root: NodeId,
        what_to_show: WhatToShow,
        filter: Option<NodeFilterFn>)
        -> NodeIterator
    {
        NodeIterator {
            root,
            what_to_show,
            filter,
            reference: root,
            pointer_before_reference: true,
        }
    }
}

impl NodeIterator {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn reference_node(&self) -> NodeId {
        self.reference
    }

    pub fn pointer_before_reference_node(&self) -> bool {
        self.pointer_before_reference
    }

    /// Advance to and return the next accepted node in pre-order.
    pub fn next_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.reference;
        let mut before = self.pointer_before_reference;
        loop {
            if before {
                before = false;
            } else {
                node = preorder_next(doc, node, self.root)?;
            }
            if self.accepts(doc, node) {
                break;
            }
        }
        self.reference = node;
        self.pointer_before_reference = false;
        Some(node)
    }

    /// Step back to and return the previous accepted node.
    pub fn previous_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.reference;
        let mut before = self.pointer_before_reference;
        loop {
            if !before {
                before = true;
            } else {
                node = preorder_prev(doc, node, self.root)?;
            }
            if self.accepts(doc, node) {
                break;
            }
        }
        self.reference = node;
        self.pointer_before_reference = true;
        Some(node)
    }

    /// Historical interface artifact; does nothing.
    pub fn detach(&self) {}

    fn accepts(&self, doc: &Document, node: NodeId) -> bool {
        if !self.what_to_show.intersects(show_bit(doc, node)) {
            return false;
        }
        match &self.filter {
            Some(f) => f(doc, node) == FilterResult::Accept,
            None => true,
        }
    }
}

fn show_bit(doc: &Document, node: NodeId) -> WhatToShow {
    match &doc[node].data {
        NodeData::Elem(_) => WhatToShow::SHOW_ELEMENT,
        NodeData::Attr(_) => WhatToShow::SHOW_ATTRIBUTE,
        NodeData::Text(_) => WhatToShow::SHOW_TEXT,
        NodeData::CData(_) => WhatToShow::SHOW_CDATA_SECTION,
        NodeData::Pi(_) => WhatToShow::SHOW_PROCESSING_INSTRUCTION,
        NodeData::Comment(_) => WhatToShow::SHOW_COMMENT,
        NodeData::Document => WhatToShow::SHOW_DOCUMENT,
        NodeData::DocType(_) => WhatToShow::SHOW_DOCUMENT_TYPE,
        NodeData::Fragment | NodeData::Shadow(_) =>
            WhatToShow::SHOW_DOCUMENT_FRAGMENT,
        NodeData::Hole => WhatToShow::empty(),
    }
}

// Pre-order successor within root's subtree.
fn preorder_next(doc: &Document, node: NodeId, root: NodeId)
    -> Option<NodeId>
{
    if let Some(c) = doc[node].first_child() {
        return Some(c);
    }
    let mut cur = node;
    loop {
        if cur == root {
            return None;
        }
        if let Some(s) = doc[cur].next_sibling() {
            return Some(s);
        }
        cur = doc[cur].parent()?;
    }
}

// Pre-order predecessor within root's subtree.
fn preorder_prev(doc: &Document, node: NodeId, root: NodeId)
    -> Option<NodeId>
{
    if node == root {
        return None;
    }
    match doc[node].prev_sibling() {
        Some(mut cur) => {
            while let Some(last) = doc[cur].last_child() {
                cur = last;
            }
            Some(cur)
        }
        None => doc[node].parent(),
    }
}
