use std::fmt;
use std::ops::Deref;

use crate::dom::{
    Document, DomResult, LiveList, Node, NodeFlags, NodeId, StrTendril,
};

/// A read-only cursor pairing a [`Document`] borrow with a [`NodeId`].
///
/// Everything reachable from a `NodeRef` is borrowed from its document,
/// so navigation hands out more `NodeRef`s at zero cost. Mutation goes
/// through `Document` methods with the plain id.
#[derive(Copy, Clone)]
pub struct NodeRef<'a>{
    doc: &'a Document,
    id: NodeId
}

impl<'a> NodeRef<'a> {
    /// Bind an id to its document.
    #[inline]
    pub fn new(doc: &'a Document, id: NodeId) -> Self {
        NodeRef { doc, id }
    }

    /// The underlying `NodeId`.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn wrap(&self, id: Option<NodeId>) -> Option<NodeRef<'a>> {
        id.map(|id| NodeRef::new(self.doc, id))
    }

    /// Iterate this node's direct children, in sibling order. Empty for
    /// childless (or child-incapable) nodes.
    pub fn children(&self) -> Children<'a> {
        Children {
            doc: self.doc,
            next: self.doc[self.id].first_child,
        }
    }

    /// Direct children that satisfy the predicate; shorthand for
    /// `children().filter(..)`.
    pub fn select_children<P>(&self, predicate: P)
        -> impl Iterator<Item = NodeRef<'a>> + 'a
        where P: FnMut(&NodeRef<'a>) -> bool + 'a
    {
        self.children().filter(predicate)
    }

    /// Scan the subtree for every node matching the predicate.
    ///
    /// Matches are not descended into: a matched node shadows its own
    /// subtree, and the scan resumes at its following sibling.
    pub fn select<P>(&self, predicate: P) -> Selecting<'a, P>
        where P: FnMut(&NodeRef<'a>) -> bool + 'a
    {
        Selecting {
            doc: self.doc,
            scope: self.id,
            next: self.doc[self.id].first_child,
            predicate,
        }
    }

    /// First direct child matching the predicate; shorthand for
    /// `children().find(..)`.
    pub fn find_child<P>(&self, predicate: P) -> Option<NodeRef<'a>>
        where P: FnMut(&NodeRef<'a>) -> bool
    {
        self.children().find(predicate)
    }

    /// First descendant matching the predicate, scanning as
    /// [`NodeRef::select`] does.
    pub fn find<P>(&self, predicate: P) -> Option<NodeRef<'a>>
        where P: FnMut(&NodeRef<'a>) -> bool + 'a
    {
        self.select(predicate).next()
    }

    /// Direct element children only.
    pub fn element_children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.children().filter(|n| n.is_element())
    }

    /// The first direct element child.
    pub fn first_element_child(&self) -> Option<NodeRef<'a>> {
        self.element_children().next()
    }

    /// The last direct element child.
    pub fn last_element_child(&self) -> Option<NodeRef<'a>> {
        let mut cur = self.wrap(self.last_child);
        while let Some(n) = cur {
            if n.is_element() {
                return Some(n);
            }
            cur = n.prev_sibling();
        }
        None
    }

    /// Count of direct element children.
    pub fn child_element_count(&self) -> usize {
        self.element_children().count()
    }

    /// This node and all its descendants, in tree order.
    pub fn descendants(&self) -> Descender<'a>
    {
        Descender {
            doc: self.doc,
            root: self.id,
            next: Some(self.id),
        }
    }

    /// This node and its ancestors up to the tree root. Stays within the
    /// plain tree; [`Document::get_root_node`] crosses shadow boundaries.
    pub fn node_and_ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            doc: self.doc,
            next: Some(self.id),
        }
    }

    /// Any parent node.
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.wrap(self.parent)
    }

    /// Any preceding sibling.
    pub fn prev_sibling(&self) -> Option<NodeRef<'a>> {
        self.wrap(self.prev_sibling)
    }

    /// Any following sibling.
    pub fn next_sibling(&self) -> Option<NodeRef<'a>> {
        self.wrap(self.next_sibling)
    }

    /// True if this node's composed root is the document node.
    pub fn is_connected(&self) -> bool {
        self.flags().contains(NodeFlags::CONNECTED)
    }

    /// The slot this node is assigned to, when it is a slottable in a
    /// host's light tree; hidden for slots inside closed shadow trees.
    pub fn assigned_slot(&self) -> Option<NodeRef<'a>> {
        self.wrap(self.doc.assigned_slot(self.id))
    }

    /// The shadow root hosted by this element, unless `closed`.
    pub fn shadow_root(&self) -> Option<NodeRef<'a>> {
        self.wrap(self.doc.shadow_root(self.id))
    }

    /// Descendant character data concatenated per `textContent`.
    pub fn text(&self) -> Option<StrTendril> {
        self.doc.text_content(self.id)
    }

    /// The node's name per its kind.
    pub fn node_name(&self) -> StrTendril {
        self.doc.node_name(self.id)
    }

    /// First element matching the selector within this node's subtree.
    pub fn query_selector(&self, selector: &str)
        -> DomResult<Option<NodeRef<'a>>>
    {
        Ok(self.doc.query_selector(self.id, selector)?
            .map(|id| NodeRef::new(self.doc, id)))
    }

    /// Static snapshot of all elements matching the selector within this
    /// node's subtree, in document order.
    pub fn query_selector_all(&self, selector: &str)
        -> DomResult<Vec<NodeRef<'a>>>
    {
        Ok(self.doc.query_selector_all(self.id, selector)?
            .into_iter()
            .map(|id| NodeRef::new(self.doc, id))
            .collect())
    }

    /// Live collection of descendant elements by local name.
    pub fn get_elements_by_tag_name(&self, name: &str) -> LiveList {
        self.doc.get_elements_by_tag_name(self.id, name)
    }

    /// Live collection of descendant elements by class token.
    pub fn get_elements_by_class_name(&self, token: &str) -> LiveList {
        self.doc.get_elements_by_class_name(self.id, token)
    }

    /// Copy this subtree into a new independent `Document`.
    pub fn deep_clone(&self) -> Document {
        self.doc.deep_clone(self.id)
    }
}

impl<'a> Deref for NodeRef<'a> {
    type Target = Node;

    #[inline]
    fn deref(&self) -> &Node {
        &self.doc[self.id]
    }
}

/// Two `NodeRef`s are equal when they name the same id in the same
/// `Document` instance; ids from different documents never compare
/// equal, whatever their numeric value.
impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?} in doc {:p})", self.id, self.doc)
    }
}

/// Sibling-order iterator over one node's direct children.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        self.next = self.doc[id].next_sibling;
        Some(NodeRef::new(self.doc, id))
    }
}

/// Upward iterator yielding a node and then each ancestor in turn.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        self.next = self.doc[id].parent;
        Some(NodeRef::new(self.doc, id))
    }
}

/// Pre-order iterator over a node and its subtree.
///
/// Advances without an auxiliary stack: first child when present,
/// otherwise the next sibling of the nearest ancestor still inside the
/// subtree. The start node bounds the climb.
pub struct Descender<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl<'a> Iterator for Descender<'a>
{
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        self.next = match self.doc[id].first_child {
            Some(c) => Some(c),
            None => following_in(self.doc, id, self.root),
        };
        Some(NodeRef::new(self.doc, id))
    }
}

/// Subtree scan driving [`NodeRef::select`]: matched nodes are yielded
/// and their subtrees passed over.
pub struct Selecting<'a, P> {
    doc: &'a Document,
    scope: NodeId,
    next: Option<NodeId>,
    predicate: P,
}

impl<'a, P> Iterator for Selecting<'a, P>
    where P: FnMut(&NodeRef<'a>) -> bool + 'a
{
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.next.take() {
            let node = NodeRef::new(self.doc, id);
            if (self.predicate)(&node) {
                self.next = following_in(self.doc, id, self.scope);
                return Some(node);
            }
            self.next = match self.doc[id].first_child {
                Some(c) => Some(c),
                None => following_in(self.doc, id, self.scope),
            };
        }
        None
    }
}

// The pre-order successor of `id` with its subtree skipped: the next
// sibling of `id` or of its nearest ancestor below `bound`.
fn following_in(doc: &Document, id: NodeId, bound: NodeId)
    -> Option<NodeId>
{
    let mut at = id;
    loop {
        if at == bound {
            return None;
        }
        if let Some(s) = doc[at].next_sibling {
            return Some(s);
        }
        at = doc[at].parent?;
    }
}

/// `NodeRef` entry points on the document.
impl Document {
    /// The synthetic document node as a `NodeRef`.
    pub fn document_node_ref(&self) -> NodeRef<'_> {
        NodeRef::new(self, Document::DOCUMENT_NODE_ID)
    }

    /// The root element as a `NodeRef`, when the document node has an
    /// element child.
    pub fn root_element_ref(&self) -> Option<NodeRef<'_>> {
        self.root_element().map(|r| NodeRef::new(self, r))
    }
}
