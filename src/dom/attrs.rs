//! The per-element attribute store and the document-level attribute
//! operations that keep the id index, class bloom and slot assignment
//! coherent.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::chars::split_ascii_ws;
use crate::dom::{
    AttrData, Document, DomError, DomResult, Element, LocalName, Namespace,
    Node, NodeData, NodeId, Prefix, StrTendril,
    validate_name, validate_qualified_name,
};

/// Attribute entries held inline per element before spilling to the heap.
pub const INLINE_ATTRS: usize = 4;

/// An attribute name: optional namespace and prefix, mandatory local name.
///
/// A `None` namespace and an empty-string namespace are distinct keys, and
/// remain distinct through all query surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrName {
    pub ns: Option<Namespace>,
    pub prefix: Option<Prefix>,
    pub local: LocalName,
}

impl AttrName {
    /// A non-namespaced name.
    pub fn local<LN>(lname: LN) -> AttrName
        where LN: Into<LocalName>
    {
        AttrName { ns: None, prefix: None, local: lname.into() }
    }

    #[inline]
    fn key_eq(&self, ns: Option<&str>, local: &str) -> bool {
        *self.local == *local && match (&self.ns, ns) {
            (None, None) => true,
            (Some(a), Some(b)) => **a == *b,
            _ => false,
        }
    }
}

/// A single attribute: name and value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    pub name: AttrName,
    pub value: StrTendril,
}

/// Ordered attribute container with inline storage for the first
/// [`INLINE_ATTRS`] entries.
///
/// Iteration yields entries in insertion order, inline entries first; the
/// order is stable under non-mutating access.
#[derive(Clone, Debug, Default)]
pub struct AttrList {
    entries: SmallVec<[Attr; INLINE_ATTRS]>,
}

impl AttrList {
    pub fn new() -> AttrList {
        AttrList { entries: SmallVec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.entries.iter()
    }

    pub(crate) fn position(&self, ns: Option<&str>, local: &str)
        -> Option<usize>
    {
        self.entries.iter().position(|a| a.name.key_eq(ns, local))
    }

    /// Return the value for an exact `(namespace, local)` key.
    pub fn get(&self, ns: Option<&str>, local: &str) -> Option<&StrTendril> {
        self.position(ns, local).map(|i| &self.entries[i].value)
    }

    /// Replace the value of a matching `(namespace, local)` entry, keeping
    /// its position, or append a new entry. Returns any prior value.
    pub(crate) fn set(&mut self, name: AttrName, value: StrTendril)
        -> Option<StrTendril>
    {
        let ns = name.ns.as_ref().map(|n| &**n);
        if let Some(i) = self.position(ns, &name.local) {
            Some(std::mem::replace(&mut self.entries[i].value, value))
        } else {
            self.entries.push(Attr { name, value });
            None
        }
    }

    /// Remove a matching entry, returning it.
    pub(crate) fn remove(&mut self, ns: Option<&str>, local: &str)
        -> Option<Attr>
    {
        self.position(ns, local).map(|i| self.entries.remove(i))
    }

    /// Order-insensitive equality on `(namespace, local, value)` triples.
    pub(crate) fn set_eq(&self, other: &AttrList) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.entries.iter().all(|a| {
            other.entries.iter().any(|b| {
                a.name.ns == b.name.ns
                    && a.name.local == b.name.local
                    && a.value == b.value
            })
        })
    }
}

/// A small Bloom filter over an element's class tokens.
///
/// May report false positives, never false negatives: it contains at least
/// every token present on the element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ClassBloom(u64);

impl ClassBloom {
    pub(crate) fn insert(&mut self, token: &str) {
        let h = token_hash(token);
        self.0 |= 1u64 << (h & 63);
        self.0 |= 1u64 << ((h >> 8) & 63);
    }

    #[inline]
    pub(crate) fn may_contain(&self, token: &str) -> bool {
        let h = token_hash(token);
        let mask = (1u64 << (h & 63)) | (1u64 << ((h >> 8) & 63));
        self.0 & mask == mask
    }

    pub(crate) fn rebuild(value: Option<&StrTendril>) -> ClassBloom {
        let mut bloom = ClassBloom::default();
        if let Some(v) = value {
            for tok in split_ascii_ws(v) {
                bloom.insert(tok);
            }
        }
        bloom
    }
}

fn token_hash(token: &str) -> u64 {
    let mut h = DefaultHasher::new();
    token.hash(&mut h);
    h.finish()
}

/// Attribute accessors on the element payload itself. Mutation is
/// crate-private: it routes through `Document` so indices stay coherent.
impl Element {
    /// Return attribute value by local name (any namespace), if present.
    pub fn attr<LN>(&self, lname: LN) -> Option<&StrTendril>
        where LN: Into<LocalName>
    {
        let lname = lname.into();
        self.attrs.iter()
            .find(|attr| attr.name.local == lname)
            .map(|attr| &attr.value)
    }

    /// Return attribute value by exact `(namespace, local)` key.
    pub fn attr_ns(&self, ns: Option<&str>, local: &str)
        -> Option<&StrTendril>
    {
        self.attrs.get(ns, local)
    }

    /// True if an attribute with the local name (any namespace) exists.
    pub fn has_attr<LN>(&self, lname: LN) -> bool
        where LN: Into<LocalName>
    {
        self.attr(lname).is_some()
    }

    /// The attribute list, in insertion order.
    pub fn attrs(&self) -> &AttrList {
        &self.attrs
    }

    /// The element's `id` attribute value, if any.
    pub fn id(&self) -> Option<&StrTendril> {
        self.attr_ns(None, "id")
    }

    /// Iterate the element's class tokens in attribute order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr_ns(None, "class")
            .map(|v| v.as_ref())
            .unwrap_or("")
            .split(crate::chars::is_ascii_ws)
            .filter(|t| !t.is_empty())
    }

    /// True if the element's class list contains the token.
    ///
    /// Consults the class bloom first to short-circuit negatives.
    pub fn has_class(&self, token: &str) -> bool {
        if !self.bloom.may_contain(token) {
            return false;
        }
        self.classes().any(|t| t == token)
    }

    pub(crate) fn set_attr_raw(&mut self, name: AttrName, value: StrTendril)
        -> Option<StrTendril>
    {
        let is_class = name.ns.is_none() && &*name.local == "class";
        let prior = self.attrs.set(name, value);
        if is_class {
            self.bloom = ClassBloom::rebuild(self.attr_ns(None, "class"));
        }
        prior
    }

    pub(crate) fn remove_attr_raw(&mut self, ns: Option<&str>, local: &str)
        -> Option<Attr>
    {
        let removed = self.attrs.remove(ns, local);
        if removed.is_some() && ns.is_none() && local == "class" {
            self.bloom = ClassBloom::default();
        }
        removed
    }
}

/// Document-level attribute operations: the only mutation surface, so the
/// id index, class bloom and slot assignments stay in sync.
impl Document {
    /// Return the value of the named non-namespaced attribute.
    pub fn get_attribute(&self, id: NodeId, local: &str)
        -> Option<StrTendril>
    {
        self[id].as_element()
            .and_then(|e| e.attr(local))
            .cloned()
    }

    /// Return the value by exact `(namespace, local)` key. `None` and
    /// empty-string namespaces are distinct.
    pub fn get_attribute_ns(&self, id: NodeId, ns: Option<&str>, local: &str)
        -> Option<StrTendril>
    {
        self[id].as_element()
            .and_then(|e| e.attr_ns(ns, local))
            .cloned()
    }

    /// True if the named non-namespaced attribute exists.
    pub fn has_attribute(&self, id: NodeId, local: &str) -> bool {
        self.get_attribute(id, local).is_some()
    }

    /// True if an attribute with the exact key exists.
    pub fn has_attribute_ns(&self, id: NodeId, ns: Option<&str>, local: &str)
        -> bool
    {
        self.get_attribute_ns(id, ns, local).is_some()
    }

    /// Set a non-namespaced attribute, returning any prior value.
    ///
    /// `NotSupported` if the node is not an element; `InvalidCharacter`
    /// for a malformed name.
    pub fn set_attribute(&mut self, id: NodeId, local: &str, value: &str)
        -> DomResult<Option<StrTendril>>
    {
        validate_name(local)?;
        self.set_attribute_inner(
            id,
            AttrName::local(local),
            value.into())
    }

    /// Set an attribute by namespace and qualified name.
    pub fn set_attribute_ns(
        &mut self,
        id: NodeId,
        ns: Option<&str>,
        qualified_name: &str,
        value: &str)
        -> DomResult<Option<StrTendril>>
    {
        let (prefix, local) = validate_qualified_name(ns, qualified_name)?;
        let name = AttrName {
            ns: ns.map(Namespace::from),
            prefix: prefix.map(Prefix::from),
            local: LocalName::from(local),
        };
        self.set_attribute_inner(id, name, value.into())
    }

    fn set_attribute_inner(
        &mut self,
        id: NodeId,
        name: AttrName,
        value: StrTendril)
        -> DomResult<Option<StrTendril>>
    {
        let local = name.local.clone();
        let non_ns = name.ns.is_none();
        let prior = {
            let elem = match self[id].as_element_mut() {
                Some(e) => e,
                None => return Err(DomError::NotSupported),
            };
            elem.set_attr_raw(name, value)
        };
        if non_ns {
            self.after_attr_change(id, &local, prior.as_ref());
        }
        self.bump();
        Ok(prior)
    }

    /// Remove a non-namespaced attribute, returning any removed value.
    pub fn remove_attribute(&mut self, id: NodeId, local: &str)
        -> Option<StrTendril>
    {
        self.remove_attribute_ns(id, None, local)
    }

    /// Remove by exact `(namespace, local)` key.
    pub fn remove_attribute_ns(
        &mut self,
        id: NodeId,
        ns: Option<&str>,
        local: &str)
        -> Option<StrTendril>
    {
        let removed = self[id].as_element_mut()?
            .remove_attr_raw(ns, local)
            .map(|a| a.value);
        if removed.is_some() {
            if ns.is_none() {
                let lname = LocalName::from(local);
                self.after_attr_change(id, &lname, removed.as_ref());
            }
            self.bump();
        }
        removed
    }

    /// Toggle presence of a boolean-style attribute. With `force`, make
    /// presence match it. Returns whether the attribute is present after.
    pub fn toggle_attribute(
        &mut self,
        id: NodeId,
        local: &str,
        force: Option<bool>)
        -> DomResult<bool>
    {
        validate_name(local)?;
        if !self[id].is_element() {
            return Err(DomError::NotSupported);
        }
        let present = self.has_attribute(id, local);
        let want = force.unwrap_or(!present);
        if want && !present {
            self.set_attribute(id, local, "")?;
        } else if !want && present {
            self.remove_attribute(id, local);
        }
        Ok(want)
    }

    /// The element's id attribute, if any.
    pub fn id_of(&self, id: NodeId) -> Option<StrTendril> {
        self.get_attribute(id, "id")
    }

    /// Set the element's id attribute.
    pub fn set_id(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        self.set_attribute(id, "id", value).map(|_| ())
    }

    /// The element's class attribute, or the empty string.
    pub fn class_name(&self, id: NodeId) -> StrTendril {
        self.get_attribute(id, "class").unwrap_or_else(StrTendril::new)
    }

    /// Set the element's class attribute wholesale.
    pub fn set_class_name(&mut self, id: NodeId, value: &str)
        -> DomResult<()>
    {
        self.set_attribute(id, "class", value).map(|_| ())
    }

    /// A token-list view over the element's class attribute.
    pub fn class_list(&self, id: NodeId) -> ClassList {
        ClassList { element: id }
    }

    // Post-set/remove hook for the non-namespaced attributes with engine
    // side effects: id, class, slot, and a slot element's name.
    fn after_attr_change(
        &mut self,
        id: NodeId,
        local: &LocalName,
        prior: Option<&StrTendril>)
    {
        match &**local {
            "id" => {
                self.refresh_id_entry(id, prior.map(|t| &t[..]));
            }
            "slot" => {
                self.reassign_for_slottable(id);
            }
            "name" => {
                if self[id].is_elem("slot") {
                    self.reassign_containing_tree(id);
                }
            }
            _ => {}
        }
    }
}

/// Attribute-as-node operations, created on demand.
impl Document {
    /// Return an `Attr` node for the named attribute, creating it on
    /// demand, or `None` when absent.
    pub fn get_attribute_node(&mut self, id: NodeId, local: &str)
        -> Option<NodeId>
    {
        self.get_attribute_node_ns(id, None, local)
    }

    /// Namespaced form of [`Document::get_attribute_node`].
    pub fn get_attribute_node_ns(
        &mut self,
        id: NodeId,
        ns: Option<&str>,
        local: &str)
        -> Option<NodeId>
    {
        let (name, value) = {
            let elem = self[id].as_element()?;
            let i = elem.attrs.position(ns, local)?;
            let a = &elem.attrs.entries[i];
            (a.name.clone(), a.value.clone())
        };
        Some(self.push_node(Node::new(NodeData::Attr(AttrData {
            name,
            value,
            owner: Some(id),
            _priv: ()
        }))))
    }

    /// Apply an `Attr` node to an element, replacing any same-key entry.
    /// Returns the prior value, if one was replaced.
    pub fn set_attribute_node(&mut self, id: NodeId, attr: NodeId)
        -> DomResult<Option<StrTendril>>
    {
        let (name, value) = match &self[attr].data {
            NodeData::Attr(a) => (a.name.clone(), a.value.clone()),
            _ => return Err(DomError::InvalidNodeType),
        };
        if !self[id].is_element() {
            return Err(DomError::NotSupported);
        }
        if let NodeData::Attr(a) = &mut self[attr].data {
            a.owner = Some(id);
        }
        self.set_attribute_inner(id, name, value)
    }

    /// Remove the attribute an `Attr` node names from its owner element.
    /// The node remains usable, detached from the element.
    pub fn remove_attribute_node(&mut self, id: NodeId, attr: NodeId)
        -> DomResult<StrTendril>
    {
        let (ns, local) = match &self[attr].data {
            NodeData::Attr(a) => (
                a.name.ns.as_ref().map(|n| n.to_string()),
                a.name.local.clone()),
            _ => return Err(DomError::InvalidNodeType),
        };
        let removed = self.remove_attribute_ns(id, ns.as_deref(), &local)
            .ok_or(DomError::NotFound)?;
        if let NodeData::Attr(a) = &mut self[attr].data {
            a.owner = None;
        }
        Ok(removed)
    }

    // nodeValue setter support for Attr nodes: write through to the owner
    // element when attached.
    pub(crate) fn set_attr_node_value(&mut self, attr: NodeId, value: &str) {
        let (owner, name) = match &mut self[attr].data {
            NodeData::Attr(a) => {
                a.value = value.into();
                (a.owner, a.name.clone())
            }
            _ => return,
        };
        if let Some(el) = owner {
            let _ = self.set_attribute_inner(el, name, value.into());
        } else {
            self.bump();
        }
    }
}

/// A live token-list view of an element's `class` attribute.
#[derive(Copy, Clone, Debug)]
pub struct ClassList {
    element: NodeId,
}

impl ClassList {
    /// Number of tokens.
    pub fn len(&self, doc: &Document) -> usize {
        doc[self.element].as_element()
            .map(|e| e.classes().count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, doc: &Document) -> bool {
        self.len(doc) == 0
    }

    /// The token at position `i`, in attribute order.
    pub fn item(&self, doc: &Document, i: usize) -> Option<StrTendril> {
        doc[self.element].as_element()
            .and_then(|e| e.classes().nth(i).map(StrTendril::from))
    }

    /// True if the token is present.
    pub fn contains(&self, doc: &Document, token: &str) -> bool {
        doc[self.element].as_element()
            .map(|e| e.has_class(token))
            .unwrap_or(false)
    }

    /// Add the token if absent.
    pub fn add(&self, doc: &mut Document, token: &str) -> DomResult<()> {
        validate_token(token)?;
        if self.contains(doc, token) {
            return Ok(());
        }
        let mut v = doc.class_name(self.element);
        if !v.is_empty() {
            v.push_char(' ');
        }
        v.push_slice(token);
        doc.set_class_name(self.element, &v)
    }

    /// Remove the token if present.
    pub fn remove(&self, doc: &mut Document, token: &str) -> DomResult<()> {
        validate_token(token)?;
        if !self.contains(doc, token) {
            return Ok(());
        }
        let v = doc.class_name(self.element);
        let out: Vec<&str> = split_ascii_ws(&v)
            .filter(|t| *t != token)
            .collect();
        doc.set_class_name(self.element, &out.join(" "))
    }

    /// Toggle the token, returning presence after. With `force`, make
    /// presence match it.
    pub fn toggle(
        &self,
        doc: &mut Document,
        token: &str,
        force: Option<bool>)
        -> DomResult<bool>
    {
        let present = self.contains(doc, token);
        let want = force.unwrap_or(!present);
        if want && !present {
            self.add(doc, token)?;
        } else if !want && present {
            self.remove(doc, token)?;
        }
        Ok(want)
    }
}

fn validate_token(token: &str) -> DomResult<()> {
    if token.is_empty() || token.chars().any(crate::chars::is_ascii_ws) {
        Err(DomError::InvalidCharacter)
    } else {
        Ok(())
    }
}
