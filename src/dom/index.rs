//! Document-scoped indices: the id map, the generation-validated tag and
//! class indices, and the live collections they back.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::{
    position, Document, LocalName, Namespace, NodeFlags, NodeId,
};

/// Per-key cached element lists, revalidated against the document
/// generation on access rather than maintained by observers.
#[derive(Default)]
pub(crate) struct LiveIndex {
    tags: HashMap<LocalName, CachedList>,
    classes: HashMap<LocalName, CachedList>,
}

struct CachedList {
    gen: u32,
    elems: Rc<Vec<NodeId>>,
}

impl LiveIndex {
    pub(crate) fn clear(&mut self) {
        self.tags.clear();
        self.classes.clear();
    }
}

/// Id index maintenance. Entries cover elements connected in the document
/// tree, not crossing shadow boundaries; the first element in document
/// order wins a duplicate id.
impl Document {
    pub(crate) fn register_id(&mut self, el: NodeId) {
        if !self[el].flags.contains(NodeFlags::CONNECTED)
            || self[el].flags.contains(NodeFlags::IN_SHADOW_TREE)
        {
            return;
        }
        let idv = match self[el].as_element().and_then(|e| e.id()) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return,
        };
        match self.ids.get(&idv).copied() {
            None => {
                self.ids.insert(idv, el);
            }
            Some(cur) => {
                if self.compare_document_position(cur, el)
                    & position::PRECEDING != 0
                {
                    self.ids.insert(idv, el);
                }
            }
        }
    }

    pub(crate) fn deregister_id(&mut self, el: NodeId) {
        let idv = match self[el].as_element().and_then(|e| e.id()) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return,
        };
        if self.ids.get(&idv) == Some(&el) {
            self.ids.remove(&idv);
            self.rescan_id(&idv);
        }
    }

    // An id attribute changed on `el`; `old` is the prior value.
    pub(crate) fn refresh_id_entry(&mut self, el: NodeId, old: Option<&str>) {
        if let Some(old) = old {
            if !old.is_empty() && self.ids.get(old) == Some(&el) {
                self.ids.remove(old);
                self.rescan_id(old);
            }
        }
        self.register_id(el);
    }

    // Refresh the mapping for a vacated key: the first remaining element
    // in document order with that id, if any.
    fn rescan_id(&mut self, key: &str) {
        let found = self.nodes().find(|n| {
            self[*n].as_element()
                .and_then(|e| e.id())
                .map(|v| &v[..] == key)
                .unwrap_or(false)
        });
        if let Some(el) = found {
            self.ids.insert(key.to_string(), el);
        }
    }

    pub(crate) fn rebuild_id_index(&mut self) {
        self.ids.clear();
        let all: Vec<NodeId> = self.nodes().collect();
        for n in all {
            if self[n].is_element() {
                self.register_id(n);
            }
        }
    }

    // After a same-parent relocation, recompute the entries for every id
    // carried by the moved subtree so document-order winners stay right.
    pub(crate) fn refresh_moved_ids(&mut self, node: NodeId) {
        if !self[node].flags.contains(NodeFlags::CONNECTED)
            || self[node].flags.contains(NodeFlags::IN_SHADOW_TREE)
        {
            return;
        }
        let keys: Vec<String> = self.descendants(node)
            .filter_map(|n| {
                self[n].as_element()
                    .and_then(|e| e.id())
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_string())
            })
            .collect();
        for k in keys {
            self.ids.remove(&k);
            self.rescan_id(&k);
        }
    }

    // True when the tag/class indices enumerate `root`'s subtree: the
    // indices cover the document tree only, not detached subtrees nor
    // shadow tree contents.
    pub(crate) fn index_covers(&self, root: NodeId) -> bool {
        root == Document::DOCUMENT_NODE_ID
            || (self[root].flags.contains(NodeFlags::CONNECTED)
                && !self[root].flags.contains(NodeFlags::IN_SHADOW_TREE)
                && !self[root].is_shadow_root())
    }
}

/// Index-backed lookups.
impl Document {
    /// Return the connected element whose id attribute equals `id`, the
    /// first in document order when duplicated. O(1) amortized.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// First element with the id within `root`'s inclusive subtree.
    ///
    /// Uses the id index when its entry falls inside the subtree, and
    /// falls back to a scan when a duplicate id shadows the entry.
    pub fn query_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        if let Some(el) = self.get_element_by_id(id) {
            if el != root && self.contains(root, el) {
                return Some(el);
            }
        }
        self.descendants(root)
            .filter(|n| *n != root)
            .find(|n| {
                self[*n].as_element()
                    .and_then(|e| e.id())
                    .map(|v| &v[..] == id)
                    .unwrap_or(false)
            })
    }

    /// First element with the local name within `root`'s subtree.
    pub fn query_by_tag_name(&self, root: NodeId, name: &str)
        -> Option<NodeId>
    {
        let lname = LocalName::from(name);
        self.descendants(root)
            .filter(|n| *n != root)
            .find(|n| self[*n].is_elem(lname.clone()))
    }

    /// First element carrying the class token within `root`'s subtree.
    pub fn query_by_class(&self, root: NodeId, token: &str)
        -> Option<NodeId>
    {
        self.descendants(root)
            .filter(|n| *n != root)
            .find(|n| {
                self[*n].as_element()
                    .map(|e| e.has_class(token))
                    .unwrap_or(false)
            })
    }

    /// A live collection of elements by local name under `root`.
    pub fn get_elements_by_tag_name(&self, root: NodeId, name: &str)
        -> LiveList
    {
        let local = if name == "*" {
            LocalFilter::Any
        } else {
            LocalFilter::Is(LocalName::from(name))
        };
        LiveList::new(root, LiveKey::Tag { ns: NsFilter::Any, local })
    }

    /// A live collection by namespace and local name; `"*"` is a wildcard
    /// for either. A `None` (or empty) namespace matches only
    /// non-namespaced elements.
    pub fn get_elements_by_tag_name_ns(
        &self,
        root: NodeId,
        ns: Option<&str>,
        local: &str)
        -> LiveList
    {
        let ns = match ns {
            Some("*") => NsFilter::Any,
            Some(n) if !n.is_empty() => NsFilter::Is(Namespace::from(n)),
            _ => NsFilter::None,
        };
        let local = if local == "*" {
            LocalFilter::Any
        } else {
            LocalFilter::Is(LocalName::from(local))
        };
        LiveList::new(root, LiveKey::Tag { ns, local })
    }

    /// A live collection of elements carrying the class token under
    /// `root`.
    pub fn get_elements_by_class_name(&self, root: NodeId, token: &str)
        -> LiveList
    {
        LiveList::new(root, LiveKey::Class(LocalName::from(token)))
    }

    // Document-tree element ids by local name, in tree order, lazily
    // recomputed when the generation moved.
    pub(crate) fn tag_ids(&self, name: &LocalName) -> Rc<Vec<NodeId>> {
        let gen = self.generation;
        let mut live = self.live.borrow_mut();
        let entry = live.tags.entry(name.clone()).or_insert_with(|| {
            CachedList { gen: gen.wrapping_sub(1), elems: Rc::new(vec![]) }
        });
        if entry.gen != gen {
            let v: Vec<NodeId> = self.nodes()
                .filter(|n| self[*n].is_elem(name.clone()))
                .collect();
            entry.elems = Rc::new(v);
            entry.gen = gen;
        }
        entry.elems.clone()
    }

    // Document-tree element ids by class token, in tree order.
    pub(crate) fn class_ids(&self, token: &LocalName) -> Rc<Vec<NodeId>> {
        let gen = self.generation;
        let mut live = self.live.borrow_mut();
        let entry = live.classes.entry(token.clone()).or_insert_with(|| {
            CachedList { gen: gen.wrapping_sub(1), elems: Rc::new(vec![]) }
        });
        if entry.gen != gen {
            let v: Vec<NodeId> = self.nodes()
                .filter(|n| {
                    self[*n].as_element()
                        .map(|e| e.has_class(token))
                        .unwrap_or(false)
                })
                .collect();
            entry.elems = Rc::new(v);
            entry.gen = gen;
        }
        entry.elems.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum NsFilter {
    Any,
    None,
    Is(Namespace),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LocalFilter {
    Any,
    Is(LocalName),
}

#[derive(Clone, Debug)]
enum LiveKey {
    Tag { ns: NsFilter, local: LocalFilter },
    Class(LocalName),
}

/// A live collection of elements, keyed on a document index and filtered
/// to a receiver subtree.
///
/// `len` and `item` revalidate a cached snapshot against the document
/// generation on every call, so the observable contents always reflect
/// the current tree.
#[derive(Debug)]
pub struct LiveList {
    root: NodeId,
    key: LiveKey,
    cache: RefCell<Option<(u32, Rc<Vec<NodeId>>)>>,
}

impl LiveList {
    fn new(root: NodeId, key: LiveKey) -> LiveList {
        LiveList { root, key, cache: RefCell::new(None) }
    }

    /// Current number of member elements.
    pub fn len(&self, doc: &Document) -> usize {
        self.ids(doc).len()
    }

    pub fn is_empty(&self, doc: &Document) -> bool {
        self.len(doc) == 0
    }

    /// The element at index `i` in document order, if present.
    pub fn item(&self, doc: &Document, i: usize) -> Option<NodeId> {
        self.ids(doc).get(i).copied()
    }

    /// Snapshot the current member ids in document order.
    pub fn ids(&self, doc: &Document) -> Rc<Vec<NodeId>> {
        let gen = doc.generation();
        if let Some((g, ids)) = &*self.cache.borrow() {
            if *g == gen {
                return ids.clone();
            }
        }
        let ids = Rc::new(self.compute(doc));
        *self.cache.borrow_mut() = Some((gen, ids.clone()));
        ids
    }

    fn compute(&self, doc: &Document) -> Vec<NodeId> {
        let in_root = |n: &NodeId| {
            self.root == Document::DOCUMENT_NODE_ID
                || (*n != self.root && doc.contains(self.root, *n))
        };
        let indexed = doc.index_covers(self.root);
        match &self.key {
            LiveKey::Class(token) if indexed => {
                doc.class_ids(token).iter()
                    .filter(|n| in_root(n))
                    .copied()
                    .collect()
            }
            LiveKey::Class(token) => {
                doc.descendants(self.root)
                    .filter(|n| {
                        *n != self.root
                            && doc[*n].as_element()
                                .map(|e| e.has_class(token))
                                .unwrap_or(false)
                    })
                    .collect()
            }
            LiveKey::Tag { ns, local: LocalFilter::Is(local) } if indexed => {
                doc.tag_ids(local).iter()
                    .filter(|n| in_root(n) && ns_matches(doc, **n, ns))
                    .copied()
                    .collect()
            }
            LiveKey::Tag { ns, local } => {
                doc.descendants(self.root)
                    .filter(|n| {
                        *n != self.root
                            && doc[*n].is_element()
                            && local_matches(doc, *n, local)
                            && ns_matches(doc, *n, ns)
                    })
                    .collect()
            }
        }
    }
}

fn local_matches(doc: &Document, el: NodeId, local: &LocalFilter) -> bool {
    match local {
        LocalFilter::Any => true,
        LocalFilter::Is(name) => doc[el].is_elem(name.clone()),
    }
}

fn ns_matches(doc: &Document, el: NodeId, ns: &NsFilter) -> bool {
    let elem = match doc[el].as_element() {
        Some(e) => e,
        None => return false,
    };
    match ns {
        NsFilter::Any => true,
        NsFilter::None => elem.namespace_uri().is_none(),
        NsFilter::Is(n) => elem.namespace_uri() == Some(n),
    }
}
