//! The core DOM tree container and associated tools.

use std::collections::HashMap;
use std::cell::RefCell;
use std::convert::TryInto;
use std::fmt;
use std::iter;
use std::mem;
use std::num::NonZeroU32;
use std::ops::{Deref, DerefMut};

#[doc(no_inline)]
pub use html5ever::{LocalName, Namespace, Prefix, QualName};

#[doc(no_inline)]
pub use tendril::StrTendril;

// custom ordering of these effects rustdoc for Document, etc.

mod node_ref;
mod attrs;
mod error;
#[macro_use] pub mod filter;
mod mutate;
mod index;
mod selector;
mod shadow;
mod event;
mod range;
mod traverse;
mod chardata;

#[cfg(test)]
mod tests;

pub use node_ref::{Ancestors, Children, Descender, NodeRef, Selecting};
pub use attrs::{Attr, AttrList, AttrName, ClassList, INLINE_ATTRS};
pub use error::{DomError, DomResult, SelectorError};
pub use event::{
    AbortController, AbortSignal, Event, EventInit, EventPhase, ListenerFn,
    ListenerOpts,
};
pub use index::LiveList;
pub use range::{HowToCompare, Range, StaticRange};
pub use selector::{classify, FastPath, SelectorList, SELECTOR_CACHE_CAPACITY};
pub use shadow::{ShadowMode, ShadowRootInit, SlotAssignment};
pub use traverse::{FilterResult, NodeFilterFn, NodeIterator, WhatToShow};

use crate::chars;

/// A DOM container for a tree of heterogeneous nodes.
///
/// Unlike reference-counted DOM containers, this uses a simple vector of
/// [`Node`]s and indexes for parent/child and sibling ordering. Character
/// data and attribute values are separately allocated. For memory
/// efficiency, a single document is limited to 4 billion (2^32 - 1) total
/// nodes.
///
/// All `Document` instances, even logically "empty" ones as freshly
/// constructed, contain a synthetic document node at the fixed
/// [`Document::DOCUMENT_NODE_ID`] that serves as the tree root. Factory
/// methods push new _detached_ nodes into the arena; the mutation methods
/// of the crate link, unlink and relocate them while maintaining the
/// connectivity flags and the id/tag/class indices.
pub struct Document {
    nodes: Vec<Node>,
    pub(crate) generation: u32,
    pub(crate) ids: HashMap<String, NodeId>,
    pub(crate) live: RefCell<index::LiveIndex>,
    pub(crate) selectors: RefCell<selector::SelectorCache>,
}

/// A `Node` identifier as a u32 index into a `Document`s `Node` vector.
///
/// Should only be used with the `Document` it was obtained from. Identifiers
/// are assigned monotonically and remain stable until
/// [`Document::compact`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(NonZeroU32);

bitflags::bitflags! {
    /// Per-node boolean state maintained by the mutation engine.
    #[derive(Default)]
    pub struct NodeFlags: u8 {
        /// The node's composed root is the document node.
        const CONNECTED      = 0b0000_0001;
        /// Some shadow-including ancestor is a shadow root.
        const IN_SHADOW_TREE = 0b0000_0010;
        /// The node is an element hosting a shadow root.
        const IS_HOST        = 0b0000_0100;
    }
}

/// A typed node (e.g. text, element, etc.) within a `Document` including
/// identifiers to parent, siblings and children.
#[derive(Clone, Debug)]
pub struct Node {
    data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) flags: NodeFlags,
    pub(crate) rare: Option<Box<RareData>>,
}

/// Lazily-allocated side storage for uncommon node state.
#[derive(Clone, Debug, Default)]
pub(crate) struct RareData {
    pub(crate) listeners: Vec<event::Listener>,
    pub(crate) shadow_root: Option<NodeId>,
    pub(crate) assigned_slot: Option<NodeId>,
}

/// The node kind and payload data associated with that kind.
#[derive(Clone, Debug)]
pub enum NodeData {
    /// A place holder value for nodes that have been removed.
    Hole,

    /// The document node which roots all connected nodes.
    Document,

    /// A document fragment: a lightweight container whose children are
    /// moved, not copied, by insertion.
    Fragment,

    /// The document type definition.
    DocType(DocumentType),

    /// Character data content.
    Text(StrTendril),

    /// A comment.
    Comment(StrTendril),

    /// A CDATA section.
    CData(StrTendril),

    /// A processing instruction node.
    Pi(ProcessingInstruction),

    /// An element. Boxed to keep the node header compact; the box also
    /// carries the inline attribute storage.
    Elem(Box<Element>),

    /// A shadow root bound to a host element.
    Shadow(ShadowData),

    /// An attribute in node form, created on demand.
    Attr(AttrData),
}

/// The discriminator for [`NodeData`], for kind checks without payload
/// access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentFragment,
    DocumentType,
    Text,
    Comment,
    CDataSection,
    ProcessingInstruction,
    Element,
    ShadowRoot,
    Attribute,
}

/// Document type definition details.
#[derive(Clone, Debug)]
pub struct DocumentType {
    pub name: StrTendril,
    pub public_id: StrTendril,
    pub system_id: StrTendril,
    _priv: ()
}

/// Processing instruction details.
#[derive(Clone, Debug)]
pub struct ProcessingInstruction {
    pub target: StrTendril,
    pub data: StrTendril,
    _priv: ()
}

/// A markup element with name and attributes.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: QualName,
    pub(crate) attrs: AttrList,
    pub(crate) bloom: attrs::ClassBloom,
    _priv: ()
}

/// Shadow root state carried by a `NodeData::Shadow` node.
#[derive(Clone, Debug)]
pub struct ShadowData {
    pub(crate) host: NodeId,
    pub mode: ShadowMode,
    pub slot_assignment: SlotAssignment,
    pub delegates_focus: bool,
    pub clonable: bool,
    pub serializable: bool,
    _priv: ()
}

/// An attribute reified as a node, created on demand.
#[derive(Clone, Debug)]
pub struct AttrData {
    pub name: AttrName,
    pub value: StrTendril,
    pub(crate) owner: Option<NodeId>,
    _priv: ()
}

/// `compareDocumentPosition` bitmask constants.
pub mod position {
    pub const DISCONNECTED: u8            = 0x01;
    pub const PRECEDING: u8               = 0x02;
    pub const FOLLOWING: u8               = 0x04;
    pub const CONTAINS: u8                = 0x08;
    pub const CONTAINED_BY: u8            = 0x10;
    pub const IMPLEMENTATION_SPECIFIC: u8 = 0x20;
}

/// Core implementation.
impl Document {
    /// The constant `NodeId` for the document node of all `Document`s.
    pub const DOCUMENT_NODE_ID: NodeId = NodeId(
        unsafe { NonZeroU32::new_unchecked(1) }
    );

    // An accepted amount of excess Vec<Node> capacity
    const WASTE_ALLOWANCE: usize = 1024;

    /// Construct a new `Document` with the single empty document node.
    pub fn new() -> Self {
        Document::with_capacity(8)
    }

    /// Construct a new `Document` with the single empty document node and
    /// specified capacity.
    pub fn with_capacity(count: u32) -> Self {
        let mut nodes = Vec::with_capacity(count as usize);
        nodes.push(Node::new(NodeData::Hole));     // Index 0: Padding
        let mut doc_node = Node::new(NodeData::Document);
        doc_node.flags.insert(NodeFlags::CONNECTED);
        nodes.push(doc_node);                      // Index 1: DOCUMENT_NODE_ID
        Document {
            nodes,
            generation: 0,
            ids: HashMap::new(),
            live: RefCell::new(index::LiveIndex::default()),
            selectors: RefCell::new(selector::SelectorCache::default()),
        }
    }

    /// Return total number of `Node`s.
    ///
    /// This includes the document node and all occupied nodes, some of which
    /// may not be reachable from the document node. The value returned may
    /// be more than the reachable nodes counted via `nodes().count()`,
    /// unless [`Document::compact`] or [`Document::deep_clone`] is first
    /// used.
    #[inline]
    pub fn len(&self) -> u32 {
        let nodes: u32 = self.nodes.len()
            .try_into()
            .expect("Document (u32) node index overflow");
        debug_assert!(nodes > 0);
        nodes - 1 // but don't include padding (index 0) in len
    }

    /// Return true if this document only contains the single, empty document
    /// node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() < 2
    }

    /// The structural generation of this document.
    ///
    /// Incremented by every mutation that can change the result of a query
    /// or the contents of a live collection. Live collections snapshot this
    /// value and revalidate against it on access.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub(crate) fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Reserve capacity for at least `additional` more nodes, reporting
    /// allocation failure as [`DomError::OutOfMemory`] rather than
    /// aborting.
    pub fn try_reserve(&mut self, additional: u32) -> DomResult<()> {
        self.nodes.try_reserve(additional as usize)
            .map_err(|_| DomError::OutOfMemory)
    }

    /// Return the root element `NodeId` for this Document, or None if there
    /// is no element child of the document node.
    pub fn root_element(&self) -> Option<NodeId> {
        let document_node = &self[Document::DOCUMENT_NODE_ID];
        debug_assert!(
            matches!(document_node.data, NodeData::Document),
            "not document node: {:?}", document_node);
        debug_assert!(document_node.parent.is_none());
        self.children(Document::DOCUMENT_NODE_ID)
            .find(|id| self[*id].is_element())
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        debug_assert!(
            !matches!(node.data, NodeData::Document | NodeData::Hole),
            "Invalid push {:?}", node.data);
        let next_index = self.nodes.len()
            .try_into()
            .expect("Document (u32) node index overflow");
        debug_assert!(next_index > 1);
        self.nodes.push(node);
        NodeId(unsafe { NonZeroU32::new_unchecked(next_index) })
    }

    /// Unlink the specified node from its parent and siblings, if any.
    ///
    /// This adjusts linkage only. Connectivity flags and indices are the
    /// caller's concern, see `mutate`.
    pub(crate) fn unlink_only(&mut self, id: NodeId) {
        assert!(
            id != Document::DOCUMENT_NODE_ID,
            "Can't unlink the synthetic document node");

        let (parent, prev_sibling, next_sibling) = {
            let node = &mut self[id];
            (node.parent.take(),
             node.prev_sibling.take(),
             node.next_sibling.take())
        };

        if let Some(next_sibling) = next_sibling {
            self[next_sibling].prev_sibling = prev_sibling
        } else if let Some(parent) = parent {
            self[parent].last_child = prev_sibling;
        }

        if let Some(prev_sibling) = prev_sibling {
            self[prev_sibling].next_sibling = next_sibling;
        } else if let Some(parent) = parent {
            self[parent].first_child = next_sibling;
        }
    }

    /// Link `new_child` as the new last child of `parent`.
    pub(crate) fn link_append(&mut self, parent: NodeId, new_child: NodeId) {
        self.unlink_only(new_child);
        self[new_child].parent = Some(parent);
        if let Some(last_child) = self[parent].last_child.take() {
            self[new_child].prev_sibling = Some(last_child);
            debug_assert!(self[last_child].next_sibling.is_none());
            self[last_child].next_sibling = Some(new_child);
        } else {
            debug_assert!(self[parent].first_child.is_none());
            self[parent].first_child = Some(new_child);
        }
        self[parent].last_child = Some(new_child);
    }

    /// Link `new_sibling` immediately before `sibling`.
    pub(crate) fn link_before(&mut self, sibling: NodeId, new_sibling: NodeId) {
        self.unlink_only(new_sibling);
        let parent = self[sibling].parent
            .expect("link_before sibling has no parent");
        self[new_sibling].parent = Some(parent);
        self[new_sibling].next_sibling = Some(sibling);
        if let Some(prev_sibling) = self[sibling].prev_sibling.take() {
            self[new_sibling].prev_sibling = Some(prev_sibling);
            debug_assert_eq!(
                self[prev_sibling].next_sibling,
                Some(sibling)
            );
            self[prev_sibling].next_sibling = Some(new_sibling);
        } else {
            debug_assert_eq!(self[parent].first_child, Some(sibling));
            self[parent].first_child = Some(new_sibling);
        }
        self[sibling].prev_sibling = Some(new_sibling);
    }

    /// Return an iterator over the given node's direct children.
    ///
    /// Will be empty if the node does not (or can not) have children.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        iter::successors(
            self[id].first_child,
            move |&id| self[id].next_sibling
        )
    }

    /// Return an iterator over the specified node and all its following,
    /// direct siblings, within the same parent.
    pub fn node_and_following_siblings(&self, id: NodeId)
        -> impl Iterator<Item = NodeId> + '_
    {
        iter::successors(Some(id), move |&id| self[id].next_sibling)
    }

    /// Return an iterator over the specified node and all its ancestors,
    /// terminating at the document node or other root.
    ///
    /// This does not cross shadow boundaries; see
    /// [`Document::get_root_node`] for composed ascent.
    pub fn node_and_ancestors(&self, id: NodeId)
        -> impl Iterator<Item = NodeId> + '_
    {
        iter::successors(Some(id), move |&id| self[id].parent)
    }

    /// Return an iterator over all nodes reachable from the document node,
    /// in tree order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(Document::DOCUMENT_NODE_ID)
    }

    /// Return an iterator over all descendants in tree order, starting with
    /// the specified node.
    #[inline]
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_
    {
        NodeRef::new(self, id).descendants().map(|nr| nr.id())
    }

    /// Compact in place, by removing `Node`s that are no longer reachable
    /// from the document node or one of its shadow trees.
    ///
    /// All outstanding `NodeId`s, [`Range`]s and [`NodeIterator`]s are
    /// invalidated, and detached subtrees are dropped. Indices are
    /// rebuilt.
    pub fn compact(&mut self) {
        let mut ndoc = Document::with_capacity(self.len() + 1);
        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        map.insert(Document::DOCUMENT_NODE_ID, Document::DOCUMENT_NODE_ID);

        let kids: Vec<NodeId> =
            self.children(Document::DOCUMENT_NODE_ID).collect();
        for k in kids {
            self.compact_copy(
                &mut ndoc, &mut map, k, Some(Document::DOCUMENT_NODE_ID));
        }

        // Remap the cross-tree pointers that survive in rare data and
        // shadow host back links.
        for node in &mut ndoc.nodes[1..] {
            if let Some(r) = node.rare.as_mut() {
                r.shadow_root =
                    r.shadow_root.and_then(|o| map.get(&o).copied());
                r.assigned_slot =
                    r.assigned_slot.and_then(|o| map.get(&o).copied());
            }
            if let NodeData::Shadow(s) = &mut node.data {
                if let Some(&nh) = map.get(&s.host) {
                    s.host = nh;
                }
            }
        }

        if (ndoc.nodes.capacity() - ndoc.nodes.len()) >
            Document::WASTE_ALLOWANCE
        {
            ndoc.nodes.shrink_to_fit();
        }

        self.nodes = ndoc.nodes;
        self.bump();
        self.rebuild_id_index();
        self.live.borrow_mut().clear();
    }

    /// Move the subtree at `oid` into `ndoc`, shadow trees included,
    /// recording old to new id assignments.
    fn compact_copy(
        &mut self,
        ndoc: &mut Document,
        map: &mut HashMap<NodeId, NodeId>,
        oid: NodeId,
        nparent: Option<NodeId>)
        -> NodeId
    {
        let (data, flags, rare) = {
            let node = &mut self[oid];
            (node.take_data(), node.flags, node.rare.take())
        };
        let shadow = rare.as_ref().and_then(|r| r.shadow_root);
        let mut nnode = Node::new(data);
        nnode.flags = flags;
        nnode.rare = rare;
        let nid = ndoc.push_node(nnode);
        if let Some(p) = nparent {
            ndoc.link_append(p, nid);
        }
        map.insert(oid, nid);

        let kids: Vec<NodeId> = self.children(oid).collect();
        for k in kids {
            self.compact_copy(ndoc, map, k, Some(nid));
        }
        if let Some(sid) = shadow {
            self.compact_copy(ndoc, map, sid, None);
        }
        nid
    }

    /// Return a clone of self by bulk clone of all `Node`s.
    ///
    /// This clone is performed without regard for what nodes are reachable
    /// from the document node. The [`Document::len`] of the clone will be
    /// the same as the original. As compared with
    /// [`Document::deep_clone`] of the document node, this is faster but
    /// potentially much less memory efficient.
    pub fn bulk_clone(&self) -> Document {
        Document {
            nodes: self.nodes.clone(),
            generation: self.generation,
            ids: self.ids.clone(),
            live: RefCell::new(index::LiveIndex::default()),
            selectors: RefCell::new(selector::SelectorCache::default()),
        }
    }

    /// Create a new `Document` from the ordered sub-tree rooted in the node
    /// referenced by ID.
    ///
    /// Event listeners, shadow roots and slot assignments are not cloned.
    pub fn deep_clone(&self, id: NodeId) -> Document {
        let guess_cap = std::cmp::max(8, (self.len() - id.0.get() + 2) / 8);
        let mut ndoc = Document::with_capacity(guess_cap);

        if id == Document::DOCUMENT_NODE_ID {
            for child in self.children(id) {
                ndoc.append_deep_clone(Document::DOCUMENT_NODE_ID, self, child);
            }
        } else {
            ndoc.append_deep_clone(Document::DOCUMENT_NODE_ID, self, id);
        }
        ndoc.refresh_all(Document::DOCUMENT_NODE_ID);
        ndoc
    }

    /// Clone node oid in odoc and all its descendants, appending to id in
    /// self.
    pub(crate) fn append_deep_clone(
        &mut self,
        id: NodeId,
        odoc: &Document,
        oid: NodeId)
    {
        let id = {
            let nid = self.push_node(Node::new(odoc[oid].data.clone()));
            self.link_append(id, nid);
            nid
        };
        for child in odoc.children(oid) {
            self.append_deep_clone(id, odoc, child);
        }
    }
}

/// Node factories.
impl Document {
    /// Create a detached element with the given local name and no
    /// namespace.
    ///
    /// The name is case-preserved; comparison elsewhere is case-sensitive.
    pub fn create_element(&mut self, local_name: &str) -> DomResult<NodeId> {
        validate_name(local_name)?;
        Ok(self.push_node(Node::new_elem(Element::new(local_name))))
    }

    /// Create a detached element from a namespace URI and qualified name,
    /// e.g. `("http://www.w3.org/2000/svg", "svg:rect")`.
    pub fn create_element_ns(&mut self, ns: Option<&str>, qualified_name: &str)
        -> DomResult<NodeId>
    {
        let (prefix, local) = validate_qualified_name(ns, qualified_name)?;
        let name = QualName::new(
            prefix.map(Prefix::from),
            ns.map(Namespace::from).unwrap_or(ns!()),
            LocalName::from(local));
        Ok(self.push_node(Node::new_elem(Element::with_name(name))))
    }

    /// Create a detached text node.
    pub fn create_text_node(&mut self, data: &str) -> NodeId {
        self.push_node(Node::new_text(data))
    }

    /// Create a detached comment node.
    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.push_node(Node::new(NodeData::Comment(data.into())))
    }

    /// Create a detached CDATA section node.
    pub fn create_cdata_section(&mut self, data: &str) -> NodeId {
        self.push_node(Node::new(NodeData::CData(data.into())))
    }

    /// Create a detached processing instruction node.
    pub fn create_processing_instruction(&mut self, target: &str, data: &str)
        -> DomResult<NodeId>
    {
        validate_name(target)?;
        Ok(self.push_node(Node::new(NodeData::Pi(ProcessingInstruction {
            target: target.into(),
            data: data.into(),
            _priv: ()
        }))))
    }

    /// Create a detached, empty document fragment.
    pub fn create_document_fragment(&mut self) -> NodeId {
        self.push_node(Node::new(NodeData::Fragment))
    }

    /// Create a detached document type node.
    pub fn create_document_type(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str)
        -> DomResult<NodeId>
    {
        validate_name(name)?;
        Ok(self.push_node(Node::new(NodeData::DocType(DocumentType {
            name: name.into(),
            public_id: public_id.into(),
            system_id: system_id.into(),
            _priv: ()
        }))))
    }

    /// Create a detached attribute node with an empty value.
    pub fn create_attribute_ns(&mut self, ns: Option<&str>, qualified_name: &str)
        -> DomResult<NodeId>
    {
        let (prefix, local) = validate_qualified_name(ns, qualified_name)?;
        let name = AttrName {
            ns: ns.map(Namespace::from),
            prefix: prefix.map(Prefix::from),
            local: LocalName::from(local),
        };
        Ok(self.push_node(Node::new(NodeData::Attr(AttrData {
            name,
            value: StrTendril::new(),
            owner: None,
            _priv: ()
        }))))
    }
}

/// Node accessors.
impl Document {
    /// Return the node's name, per its kind: the qualified name for
    /// elements and attributes, the target for processing instructions,
    /// `#text` and friends otherwise.
    pub fn node_name(&self, id: NodeId) -> StrTendril {
        match &self[id].data {
            NodeData::Document => "#document".into(),
            NodeData::Fragment | NodeData::Shadow(_) =>
                "#document-fragment".into(),
            NodeData::DocType(dt) => dt.name.clone(),
            NodeData::Text(_) => "#text".into(),
            NodeData::CData(_) => "#cdata-section".into(),
            NodeData::Comment(_) => "#comment".into(),
            NodeData::Pi(pi) => pi.target.clone(),
            NodeData::Elem(e) => e.tag_name(),
            NodeData::Attr(a) => {
                let mut t = StrTendril::new();
                if let Some(p) = &a.name.prefix {
                    t.push_slice(p);
                    t.push_char(':');
                }
                t.push_slice(&a.name.local);
                t
            }
            NodeData::Hole => "#hole".into(),
        }
    }

    /// Return the node's value: character data contents or attribute
    /// value, `None` for all other kinds.
    pub fn node_value(&self, id: NodeId) -> Option<StrTendril> {
        match &self[id].data {
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::CData(t) =>
                Some(t.clone()),
            NodeData::Pi(pi) => Some(pi.data.clone()),
            NodeData::Attr(a) => Some(a.value.clone()),
            _ => None,
        }
    }

    /// Set the node's value, for the kinds that carry one. A no-op for
    /// every other kind, as the setter is defined to ignore them.
    pub fn set_node_value(&mut self, id: NodeId, value: &str) {
        if matches!(self[id].data, NodeData::Attr(_)) {
            self.set_attr_node_value(id, value);
            return;
        }
        let changed = match &mut self[id].data {
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::CData(t) => {
                *t = value.into();
                true
            }
            NodeData::Pi(pi) => {
                pi.data = value.into();
                true
            }
            _ => false,
        };
        if changed {
            self.bump();
        }
    }

    /// Return true if the node's composed root is the document node.
    #[inline]
    pub fn is_connected(&self, id: NodeId) -> bool {
        self[id].flags.contains(NodeFlags::CONNECTED)
    }

    /// Return all descendant text content (character data) of the given
    /// node, per `textContent` semantics.
    ///
    /// For character data nodes, returns that data. For elements,
    /// fragments and shadow roots, returns the concatenation of all text
    /// (and CDATA) descendants in tree order, or the empty string. For
    /// documents and doctypes, returns `None`.
    pub fn text_content(&self, id: NodeId) -> Option<StrTendril> {
        match &self[id].data {
            NodeData::Text(t) | NodeData::CData(t) | NodeData::Comment(t) =>
                return Some(t.clone()),
            NodeData::Pi(pi) => return Some(pi.data.clone()),
            NodeData::Attr(a) => return Some(a.value.clone()),
            NodeData::Document | NodeData::DocType(_) | NodeData::Hole =>
                return None,
            NodeData::Elem(_) | NodeData::Fragment | NodeData::Shadow(_) => {}
        }
        let mut parts = Vec::new();
        let mut ns = NodeStack1::new();
        ns.push_if(self[id].first_child);
        while let Some(id) = ns.pop() {
            let node = &self[id];
            if let NodeData::Text(t) | NodeData::CData(t) = &node.data {
                parts.push(t.clone());
            }
            ns.push_if(node.next_sibling);
            if !matches!(node.data, NodeData::Text(_) | NodeData::CData(_)) {
                ns.push_if(node.first_child);
            }
        }
        Some(chars::concat(parts))
    }

    /// Return true if `other` is an inclusive descendant of `id`, without
    /// crossing shadow boundaries.
    pub fn contains(&self, id: NodeId, other: NodeId) -> bool {
        self.node_and_ancestors(other).any(|a| a == id)
    }

    /// Return true if the two ids name the same node.
    ///
    /// Trivial over arena ids; provided for symmetry with
    /// [`Document::is_equal_node`].
    #[inline]
    pub fn is_same_node(&self, a: NodeId, b: NodeId) -> bool {
        a == b
    }

    /// Structural equality: same kind, same names/values/attributes
    /// (attribute order ignored), and pairwise-equal children.
    pub fn is_equal_node(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (na, nb) = (&self[a], &self[b]);
        let data_eq = match (&na.data, &nb.data) {
            (NodeData::Document, NodeData::Document) => true,
            (NodeData::Fragment, NodeData::Fragment) => true,
            (NodeData::Shadow(_), NodeData::Shadow(_)) => true,
            (NodeData::DocType(x), NodeData::DocType(y)) =>
                x.name == y.name && x.public_id == y.public_id &&
                x.system_id == y.system_id,
            (NodeData::Text(x), NodeData::Text(y)) => x == y,
            (NodeData::CData(x), NodeData::CData(y)) => x == y,
            (NodeData::Comment(x), NodeData::Comment(y)) => x == y,
            (NodeData::Pi(x), NodeData::Pi(y)) =>
                x.target == y.target && x.data == y.data,
            (NodeData::Attr(x), NodeData::Attr(y)) =>
                x.name == y.name && x.value == y.value,
            (NodeData::Elem(x), NodeData::Elem(y)) =>
                x.name == y.name && x.attrs.set_eq(&y.attrs),
            _ => false,
        };
        if !data_eq {
            return false;
        }
        let mut ca = self[a].first_child;
        let mut cb = self[b].first_child;
        loop {
            match (ca, cb) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if !self.is_equal_node(x, y) {
                        return false;
                    }
                    ca = self[x].next_sibling;
                    cb = self[y].next_sibling;
                }
                _ => return false,
            }
        }
    }

    /// Clone the node, shallow or deep, within this document. The clone is
    /// detached. Shadow roots, listeners and slot assignments do not
    /// transfer.
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        let data = self[id].data.clone();
        let nid = self.push_node(Node::new(data));
        if deep {
            let children: Vec<NodeId> = self.children(id).collect();
            for child in children {
                let c = self.clone_node(child, true);
                self.link_append(nid, c);
            }
        }
        nid
    }

    /// Return the root of `id`: ascend parent links, and at a shadow root
    /// continue at its host iff `composed`.
    pub fn get_root_node(&self, id: NodeId, composed: bool) -> NodeId {
        let mut cur = id;
        loop {
            if let Some(p) = self[cur].parent {
                cur = p;
                continue;
            }
            if composed {
                if let NodeData::Shadow(s) = &self[cur].data {
                    cur = s.host;
                    continue;
                }
            }
            return cur;
        }
    }

    /// Compare tree positions, returning a `position` bitmask describing
    /// `other` relative to `id`.
    pub fn compare_document_position(&self, id: NodeId, other: NodeId) -> u8 {
        if id == other {
            return 0;
        }
        let chain_a: Vec<NodeId> = {
            let mut v: Vec<NodeId> = self.node_and_ancestors(id).collect();
            v.reverse();
            v
        };
        let chain_b: Vec<NodeId> = {
            let mut v: Vec<NodeId> = self.node_and_ancestors(other).collect();
            v.reverse();
            v
        };
        if chain_a[0] != chain_b[0] {
            // Different roots: disconnected, with a consistent arbitrary
            // order by id.
            let dir = if other.0 < id.0 {
                position::PRECEDING
            } else {
                position::FOLLOWING
            };
            return position::DISCONNECTED
                | position::IMPLEMENTATION_SPECIFIC
                | dir;
        }
        // Find the fork point.
        let mut i = 0;
        while i < chain_a.len() && i < chain_b.len() && chain_a[i] == chain_b[i]
        {
            i += 1;
        }
        if i == chain_a.len() {
            // id is an ancestor of other
            return position::CONTAINED_BY | position::FOLLOWING;
        }
        if i == chain_b.len() {
            return position::CONTAINS | position::PRECEDING;
        }
        // Siblings under chain[i-1]: document order decides.
        let (fa, fb) = (chain_a[i], chain_b[i]);
        for sib in self.node_and_following_siblings(fa) {
            if sib == fb {
                return position::FOLLOWING;
            }
        }
        position::PRECEDING
    }

    /// Return the zero-based index of the node among its parent's
    /// children.
    pub(crate) fn child_index(&self, id: NodeId) -> Option<u32> {
        self[id].parent?;
        let mut i = 0;
        let mut cur = self[id].prev_sibling;
        while let Some(p) = cur {
            i += 1;
            cur = self[p].prev_sibling;
        }
        Some(i)
    }
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.nodes[1..]).finish()
    }
}

impl std::ops::Index<NodeId> for Document {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0.get() as usize]
    }
}

impl std::ops::IndexMut<NodeId> for Document {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0.get() as usize]
    }
}

impl Element {
    /// Construct new element by local name, with no attributes and no
    /// namespace.
    pub fn new<LN>(lname: LN) -> Element
        where LN: Into<LocalName>
    {
        Element::with_name(QualName::new(
            None, ns!(), lname.into()))
    }

    pub(crate) fn with_name(name: QualName) -> Element {
        Element {
            name,
            attrs: AttrList::new(),
            bloom: attrs::ClassBloom::default(),
            _priv: ()
        }
    }

    /// Return true if this element has the given local name.
    pub fn is_elem<LN>(&self, lname: LN) -> bool
        where LN: Into<LocalName>
    {
        self.name.local == lname.into()
    }

    /// The element's qualified tag name, prefix included when present.
    /// Case-preserving, no normalization.
    pub fn tag_name(&self) -> StrTendril {
        let mut t = StrTendril::new();
        if let Some(p) = &self.name.prefix {
            t.push_slice(p);
            t.push_char(':');
        }
        t.push_slice(&self.name.local);
        t
    }

    /// The element's local name.
    #[inline]
    pub fn local_name(&self) -> &LocalName {
        &self.name.local
    }

    /// The element's namespace URI, or `None` when not namespaced.
    pub fn namespace_uri(&self) -> Option<&Namespace> {
        if self.name.ns.is_empty() {
            None
        } else {
            Some(&self.name.ns)
        }
    }

    /// The element's namespace prefix, if any.
    pub fn prefix(&self) -> Option<&Prefix> {
        self.name.prefix.as_ref()
    }
}

impl Node {
    /// Construct a new element node.
    pub fn new_elem(element: Element) -> Node {
        Node::new(NodeData::Elem(Box::new(element)))
    }

    /// Construct a new text node.
    pub fn new_text<T>(text: T) -> Node
        where T: Into<StrTendril>
    {
        Node::new(NodeData::Text(text.into()))
    }

    /// Replace this node's data with a `NodeData::Hole`, and return the
    /// original `NodeData`.
    pub(crate) fn take_data(&mut self) -> NodeData {
        mem::replace(&mut self.data, NodeData::Hole)
    }

    pub(crate) fn new(data: NodeData) -> Self {
        Node {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            flags: NodeFlags::default(),
            rare: None,
            data,
        }
    }

    /// Any parent node id.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Any first child node id.
    #[inline]
    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    /// Any last child node id.
    #[inline]
    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    /// Any next (right) sibling node id.
    #[inline]
    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    /// Any previous (left) sibling node id.
    #[inline]
    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }

    /// The node's flag bag.
    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub(crate) fn rare_mut(&mut self) -> &mut RareData {
        self.rare.get_or_insert_with(Default::default)
    }

    pub(crate) fn assigned_slot(&self) -> Option<NodeId> {
        self.rare.as_ref().and_then(|r| r.assigned_slot)
    }

    pub(crate) fn shadow_root_id(&self) -> Option<NodeId> {
        self.rare.as_ref().and_then(|r| r.shadow_root)
    }
}

impl Deref for Node {
    type Target = NodeData;

    #[inline]
    fn deref(&self) -> &NodeData {
        &self.data
    }
}

impl DerefMut for Node {
    #[inline]
    fn deref_mut(&mut self) -> &mut NodeData {
        &mut self.data
    }
}

impl NodeData {
    /// The kind discriminator, or `None` for a removed (hole) slot.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            NodeData::Hole => None,
            NodeData::Document => Some(NodeKind::Document),
            NodeData::Fragment => Some(NodeKind::DocumentFragment),
            NodeData::DocType(_) => Some(NodeKind::DocumentType),
            NodeData::Text(_) => Some(NodeKind::Text),
            NodeData::Comment(_) => Some(NodeKind::Comment),
            NodeData::CData(_) => Some(NodeKind::CDataSection),
            NodeData::Pi(_) => Some(NodeKind::ProcessingInstruction),
            NodeData::Elem(_) => Some(NodeKind::Element),
            NodeData::Shadow(_) => Some(NodeKind::ShadowRoot),
            NodeData::Attr(_) => Some(NodeKind::Attribute),
        }
    }

    /// Return `Element` if this is an element.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            NodeData::Elem(data) => Some(&**data),
            _ => None,
        }
    }

    /// Return mutable `Element` reference if this is an element.
    ///
    /// Crate-private: attribute mutation must route through the `Document`
    /// methods which maintain the id index and class state.
    pub(crate) fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            NodeData::Elem(data) => Some(&mut **data),
            _ => None,
        }
    }

    /// Return text (char data) if this is a text node.
    pub fn as_text(&self) -> Option<&StrTendril> {
        match self {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Return attribute value by given local attribute name, if this is an
    /// element with that attribute present.
    pub fn attr<LN>(&self, lname: LN) -> Option<&StrTendril>
        where LN: Into<LocalName>
    {
        if let Some(edata) = self.as_element() {
            edata.attr(lname)
        } else {
            None
        }
    }

    /// Return true if this Node is an element with the given local name.
    pub fn is_elem<LN>(&self, lname: LN) -> bool
        where LN: Into<LocalName>
    {
        if let Some(edata) = self.as_element() {
            edata.is_elem(lname)
        } else {
            false
        }
    }

    #[inline]
    pub(crate) fn is_element(&self) -> bool {
        matches!(self, NodeData::Elem(_))
    }

    #[inline]
    pub(crate) fn is_char_data(&self) -> bool {
        matches!(self,
            NodeData::Text(_) | NodeData::Comment(_) | NodeData::CData(_)
            | NodeData::Pi(_))
    }

    #[inline]
    pub(crate) fn is_text(&self) -> bool {
        matches!(self, NodeData::Text(_) | NodeData::CData(_))
    }

    #[inline]
    pub(crate) fn is_doctype(&self) -> bool {
        matches!(self, NodeData::DocType(_))
    }

    #[inline]
    pub(crate) fn is_fragment(&self) -> bool {
        matches!(self, NodeData::Fragment)
    }

    #[inline]
    pub(crate) fn is_shadow_root(&self) -> bool {
        matches!(self, NodeData::Shadow(_))
    }
}

/// Validate a local (or doctype, or PI target) name: an XML-style Name with
/// no colon.
pub(crate) fn validate_name(name: &str) -> DomResult<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(DomError::InvalidCharacter),
        Some(c) if !is_name_start(c) => return Err(DomError::InvalidCharacter),
        _ => {}
    }
    if chars.all(is_name_char) {
        Ok(())
    } else {
        Err(DomError::InvalidCharacter)
    }
}

/// Validate a qualified name against its namespace, returning
/// `(prefix, local)` parts.
///
/// The namespace rules: a prefix requires a namespace; the `xml` prefix
/// requires the XML namespace; `xmlns` (as prefix or whole name) requires
/// the XMLNS namespace, and vice-versa.
pub(crate) fn validate_qualified_name<'a>(
    ns: Option<&str>,
    qname: &'a str)
    -> DomResult<(Option<&'a str>, &'a str)>
{
    const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
    const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

    let (prefix, local) = match qname.find(':') {
        None => (None, qname),
        Some(i) => {
            let (p, rest) = qname.split_at(i);
            let l = &rest[1..];
            if p.is_empty() || l.is_empty() || l.contains(':') {
                return Err(DomError::InvalidCharacter);
            }
            (Some(p), l)
        }
    };
    if let Some(p) = prefix {
        validate_name(p)?;
    }
    validate_name(local)?;

    let ns = ns.filter(|n| !n.is_empty());
    match (prefix, ns) {
        (Some(_), None) => return Err(DomError::Namespace),
        (Some("xml"), Some(n)) if n != XML_NS =>
            return Err(DomError::Namespace),
        (Some("xmlns"), Some(n)) if n != XMLNS_NS =>
            return Err(DomError::Namespace),
        _ => {}
    }
    if qname == "xmlns" || prefix == Some("xmlns") {
        if ns != Some(XMLNS_NS) {
            return Err(DomError::Namespace);
        }
    } else if ns == Some(XMLNS_NS) {
        return Err(DomError::Namespace);
    }
    Ok((prefix, local))
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

pub(crate) struct NodeStack1(Vec<NodeId>);

impl NodeStack1 {
    #[inline]
    pub(crate) fn new() -> Self {
        NodeStack1(Vec::with_capacity(16))
    }

    #[inline]
    pub(crate) fn push_if(&mut self, id: Option<NodeId>) {
        if let Some(id) = id {
            self.0.push(id);
        }
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        self.0.pop()
    }
}

