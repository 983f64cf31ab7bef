use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::{
    position, Document, DomError, Event, EventInit, HowToCompare,
    ListenerFn, ListenerOpts, Node, NodeData, NodeId, QualName,
    ShadowMode, ShadowRootInit, SlotAssignment, StaticRange, StrTendril,
    WhatToShow,
};
use crate::dom::filter::Action;
use crate::chain_filters;
use crate::logger::ensure_logger;

use rand::Rng;

const DOC: NodeId = Document::DOCUMENT_NODE_ID;

fn elem(doc: &mut Document, tag: &str) -> NodeId {
    doc.create_element(tag).expect("create_element")
}

// <root><a/><b/>...</root> under the document node.
fn doc_with_root(tag: &str) -> (Document, NodeId) {
    let mut doc = Document::new();
    let root = elem(&mut doc, tag);
    doc.append_child(DOC, root).expect("append root");
    (doc, root)
}

// Structural invariants of the sibling/child links and connectivity
// flags, checked over every node reachable from the document node.
fn check_invariants(doc: &Document) {
    for id in doc.nodes() {
        let fwd: Vec<NodeId> = doc.children(id).collect();
        let mut rev = Vec::new();
        let mut cur = doc[id].last_child();
        while let Some(c) = cur {
            rev.push(c);
            cur = doc[c].prev_sibling();
        }
        rev.reverse();
        assert_eq!(fwd, rev, "sibling links inconsistent under {:?}", id);
        for c in &fwd {
            assert_eq!(Some(id), doc[*c].parent(), "parent link of {:?}", c);
            assert!(doc.is_connected(*c), "reachable node not connected");
            assert_eq!(
                1,
                fwd.iter().filter(|x| *x == c).count(),
                "child {:?} linked more than once", c);
        }
    }
}

#[test]
#[cfg(target_pointer_width = "64")]
fn size_of() {
    use std::mem::size_of;
    assert_eq!(size_of::<NodeId>(), 4);
    assert_eq!(size_of::<Option<NodeId>>(), 4);
    assert_eq!(size_of::<StrTendril>(), 16);
    assert_eq!(size_of::<QualName>(), 24);
    // The node header stays within a cache line pair.
    assert!(size_of::<Node>() <= 104, "Node is {}", size_of::<Node>());
}

#[test]
fn empty_document() {
    ensure_logger();
    let doc = Document::default();
    assert_eq!(None, doc.root_element_ref(), "no root Element");
    assert_eq!(1, doc.nodes().count(), "one Document node");
    assert_eq!(1, doc.len());
    assert!(doc.is_empty());
}

#[test]
fn one_element() {
    ensure_logger();
    let mut doc = Document::new();
    let id = elem(&mut doc, "one");
    assert!(!doc.is_connected(id), "factory nodes are detached");
    doc.append_child(DOC, id).unwrap();
    assert!(doc.is_connected(id));
    assert!(doc.root_element_ref().is_some(), "pushed root Element");
    assert_eq!(id, doc.root_element_ref().unwrap().id());
    assert_eq!(2, doc.nodes().count(), "document node + 1 element");
}

#[test]
fn factory_name_validation() {
    ensure_logger();
    let mut doc = Document::new();
    assert_eq!(Err(DomError::InvalidCharacter), doc.create_element(""));
    assert_eq!(Err(DomError::InvalidCharacter), doc.create_element("1bad"));
    assert_eq!(
        Err(DomError::InvalidCharacter),
        doc.create_element("sp ace"));
    assert!(doc.create_element("x-widget").is_ok());
    assert!(doc.create_processing_instruction("1", "d").is_err());

    // Qualified names: a prefix requires a namespace, and the reserved
    // prefixes pin their namespaces.
    assert_eq!(
        Err(DomError::Namespace),
        doc.create_element_ns(None, "svg:rect"));
    assert_eq!(
        Err(DomError::Namespace),
        doc.create_element_ns(Some("http://example.com"), "xml:lang"));
    assert!(doc.create_element_ns(
        Some("http://www.w3.org/2000/svg"), "svg:rect").is_ok());
}

#[test]
fn attribute_round_trip() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("a");
    assert_eq!(None, doc.set_attribute(root, "href", "/where").unwrap());
    assert_eq!(
        "/where",
        &doc.set_attribute(root, "href", "/other").unwrap().unwrap()[..]);
    assert_eq!("/other", &doc.get_attribute(root, "href").unwrap()[..]);
    assert!(doc.has_attribute(root, "href"));
    assert_eq!("/other", &doc.remove_attribute(root, "href").unwrap()[..]);
    assert!(!doc.has_attribute(root, "href"));

    assert!(doc.toggle_attribute(root, "hidden", None).unwrap());
    assert!(doc.has_attribute(root, "hidden"));
    assert!(!doc.toggle_attribute(root, "hidden", None).unwrap());
    assert!(!doc.has_attribute(root, "hidden"));
    assert!(doc.toggle_attribute(root, "hidden", Some(true)).unwrap());
    assert!(doc.toggle_attribute(root, "hidden", Some(true)).unwrap());
}

#[test]
fn attribute_namespaces_distinct() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("r");
    doc.set_attribute(root, "x", "null-ns").unwrap();
    doc.set_attribute_ns(
        root, Some("http://example.com/ns"), "p:x", "with-ns").unwrap();
    assert_eq!("null-ns", &doc.get_attribute_ns(root, None, "x").unwrap()[..]);
    assert_eq!(
        "with-ns",
        &doc.get_attribute_ns(
            root, Some("http://example.com/ns"), "x").unwrap()[..]);
    // Local-name lookup sees the first in insertion order.
    assert_eq!("null-ns", &doc.get_attribute(root, "x").unwrap()[..]);
    doc.remove_attribute_ns(root, Some("http://example.com/ns"), "x");
    assert!(doc.get_attribute_ns(
        root, Some("http://example.com/ns"), "x").is_none());
    assert!(doc.has_attribute(root, "x"));
}

#[test]
fn attr_nodes() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("r");
    doc.set_attribute(root, "title", "hello").unwrap();
    let anode = doc.get_attribute_node(root, "title").unwrap();
    assert_eq!("title", &doc.node_name(anode)[..]);
    assert_eq!("hello", &doc.node_value(anode).unwrap()[..]);

    // Writing through the node updates the element.
    doc.set_node_value(anode, "world");
    assert_eq!("world", &doc.get_attribute(root, "title").unwrap()[..]);

    let created = doc.create_attribute_ns(None, "rel").unwrap();
    doc.set_node_value(created, "nofollow");
    doc.set_attribute_node(root, created).unwrap();
    assert_eq!("nofollow", &doc.get_attribute(root, "rel").unwrap()[..]);
    doc.remove_attribute_node(root, created).unwrap();
    assert!(!doc.has_attribute(root, "rel"));
}

// Scenario: element with id, lookup through index and selector.
#[test]
fn id_index_basics() {
    ensure_logger();
    let mut doc = Document::new();
    let e = elem(&mut doc, "btn");
    doc.set_attribute(e, "id", "submit").unwrap();
    assert_eq!(None, doc.get_element_by_id("submit"), "detached: no entry");
    doc.append_child(DOC, e).unwrap();
    assert_eq!(Some(e), doc.get_element_by_id("submit"));
    assert_eq!(Some(e), doc.query_selector(DOC, "#submit").unwrap());
    assert_eq!(1, doc.ids.len());

    doc.set_attribute(e, "id", "other").unwrap();
    assert_eq!(None, doc.get_element_by_id("submit"));
    assert_eq!(Some(e), doc.get_element_by_id("other"));

    doc.remove_child(DOC, e).unwrap();
    assert_eq!(None, doc.get_element_by_id("other"));
    assert_eq!(0, doc.ids.len());
}

#[test]
fn id_index_duplicates_document_order() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("r");
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    doc.append_child(root, a).unwrap();
    doc.append_child(root, b).unwrap();
    doc.set_attribute(b, "id", "dup").unwrap();
    doc.set_attribute(a, "id", "dup").unwrap();
    // First in document order wins, regardless of set order.
    assert_eq!(Some(a), doc.get_element_by_id("dup"));
    // Removing the winner refreshes to the next holder.
    doc.remove_child(root, a).unwrap();
    assert_eq!(Some(b), doc.get_element_by_id("dup"));
}

// Scenario: live class collection reflects removal on next access.
#[test]
fn live_class_collection() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let s1 = elem(&mut doc, "span");
    let s2 = elem(&mut doc, "span");
    doc.set_attribute(s1, "class", "btn primary").unwrap();
    doc.set_attribute(s2, "class", "btn").unwrap();
    doc.append_child(root, s1).unwrap();
    doc.append_child(root, s2).unwrap();

    let list = doc.get_elements_by_class_name(root, "btn");
    assert_eq!(2, list.len(&doc));
    assert_eq!(Some(s1), list.item(&doc, 0));

    doc.remove_child(root, s1).unwrap();
    assert_eq!(1, list.len(&doc), "stale snapshot revalidated");
    assert_eq!(Some(s2), list.item(&doc, 0));
}

#[test]
fn live_tag_collections() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let d1 = elem(&mut doc, "div");
    let d2 = elem(&mut doc, "div");
    let svg = doc.create_element_ns(
        Some("http://www.w3.org/2000/svg"), "svg:div").unwrap();
    doc.append_child(root, d1).unwrap();
    doc.append_child(d1, d2).unwrap();
    doc.append_child(root, svg).unwrap();

    assert_eq!(3, doc.get_elements_by_tag_name(root, "div").len(&doc));
    assert_eq!(
        3,
        doc.get_elements_by_tag_name(root, "*").len(&doc),
        "wildcard: both null-namespace divs plus the svg one");
    let ns_list = doc.get_elements_by_tag_name_ns(
        root, Some("http://www.w3.org/2000/svg"), "*");
    assert_eq!(vec![svg], *ns_list.ids(&doc));
    let null_ns = doc.get_elements_by_tag_name_ns(root, None, "div");
    assert_eq!(2, null_ns.len(&doc));

    // Tag names are case-sensitive, no normalization.
    assert_eq!(0, doc.get_elements_by_tag_name(root, "DIV").len(&doc));
}

#[test]
fn pre_insert_validity() {
    ensure_logger();
    let mut doc = Document::new();
    let root = elem(&mut doc, "root");
    doc.append_child(DOC, root).unwrap();
    let child = elem(&mut doc, "child");
    doc.append_child(root, child).unwrap();

    // Text directly under a document.
    let t = doc.create_text_node("x");
    assert_eq!(Err(DomError::HierarchyRequest), doc.append_child(DOC, t));

    // Second element child of the document.
    let extra = elem(&mut doc, "extra");
    assert_eq!(
        Err(DomError::HierarchyRequest), doc.append_child(DOC, extra));

    // A node must not become its own descendant.
    assert_eq!(
        Err(DomError::HierarchyRequest), doc.append_child(child, root));
    assert_eq!(
        Err(DomError::HierarchyRequest), doc.append_child(root, root));

    // Reference child must be a child of the parent.
    assert_eq!(
        Err(DomError::NotFound),
        doc.insert_before(root, extra, Some(t)));

    // Character data cannot parent anything.
    let t2 = doc.create_text_node("y");
    doc.append_child(root, t2).unwrap();
    let more = elem(&mut doc, "more");
    assert_eq!(Err(DomError::HierarchyRequest), doc.append_child(t2, more));

    // Doctype ordering under the document.
    let dt = doc.create_document_type("html", "", "").unwrap();
    assert_eq!(
        Err(DomError::HierarchyRequest),
        doc.append_child(DOC, dt),
        "doctype after the document element");
    assert!(doc.insert_before(DOC, dt, Some(root)).is_ok());
    let dt2 = doc.create_document_type("again", "", "").unwrap();
    assert_eq!(Err(DomError::HierarchyRequest), doc.append_child(DOC, dt2));

    // No partial mutation on the failure paths above.
    check_invariants(&doc);
}

#[test]
fn fragment_insertion_moves_children() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let frag = doc.create_document_fragment();
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    let t = doc.create_text_node("mid");
    doc.append_child(frag, a).unwrap();
    doc.append_child(frag, t).unwrap();
    doc.append_child(frag, b).unwrap();

    let marker = elem(&mut doc, "marker");
    doc.append_child(root, marker).unwrap();
    doc.insert_before(root, frag, Some(marker)).unwrap();

    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![a, t, b, marker], kids);
    assert_eq!(0, doc.children(frag).count(), "fragment emptied");
    assert!(doc.is_connected(a) && doc.is_connected(b));
    check_invariants(&doc);

    // A fragment with two element children cannot enter a document node.
    let mut bare = Document::new();
    let f3 = bare.create_document_fragment();
    let p = bare.create_element("p").unwrap();
    let q = bare.create_element("q").unwrap();
    bare.append_child(f3, p).unwrap();
    bare.append_child(f3, q).unwrap();
    assert_eq!(
        Err(DomError::HierarchyRequest), bare.append_child(DOC, f3));
}

#[test]
fn insert_moves_from_old_parent() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let left = elem(&mut doc, "left");
    let right = elem(&mut doc, "right");
    let item = elem(&mut doc, "item");
    doc.append_child(root, left).unwrap();
    doc.append_child(root, right).unwrap();
    doc.append_child(left, item).unwrap();

    doc.append_child(right, item).unwrap();
    assert_eq!(0, doc.children(left).count());
    assert_eq!(Some(right), doc[item].parent());
    check_invariants(&doc);
}

#[test]
fn replace_child_basics() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    let c = elem(&mut doc, "c");
    doc.append_child(root, a).unwrap();
    doc.append_child(root, c).unwrap();

    let old = doc.replace_child(root, b, a).unwrap();
    assert_eq!(a, old);
    assert!(doc[a].parent().is_none());
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![b, c], kids);
    assert_eq!(
        Err(DomError::NotFound), doc.replace_child(root, a, a));
    check_invariants(&doc);
}

#[test]
fn move_before_reorders() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    let c = elem(&mut doc, "c");
    for id in [a, b, c].iter() {
        doc.append_child(root, *id).unwrap();
    }
    doc.move_before(root, c, Some(a)).unwrap();
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![c, a, b], kids);

    // node == ref_child is a no-op.
    doc.move_before(root, a, Some(a)).unwrap();
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![c, a, b], kids);

    // To the end.
    doc.move_before(root, c, None).unwrap();
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![a, b, c], kids);

    let stray = elem(&mut doc, "stray");
    assert_eq!(
        Err(DomError::NotFound), doc.move_before(root, stray, None));
    assert_eq!(
        Err(DomError::NotFound), doc.move_before(root, a, Some(stray)));
    check_invariants(&doc);
}

#[test]
fn normalize_coalesces_text() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let inner = elem(&mut doc, "inner");
    let t1 = doc.create_text_node("He");
    let t2 = doc.create_text_node("llo");
    let t3 = doc.create_text_node("");
    let t4 = doc.create_text_node(" World");
    doc.append_child(root, t1).unwrap();
    doc.append_child(root, t2).unwrap();
    doc.append_child(root, inner).unwrap();
    doc.append_child(root, t3).unwrap();
    doc.append_child(root, t4).unwrap();
    let it = doc.create_text_node("in");
    let it2 = doc.create_text_node("side");
    doc.append_child(inner, it).unwrap();
    doc.append_child(inner, it2).unwrap();

    doc.normalize(root);
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(3, kids.len(), "two text runs and the element");
    assert_eq!("Hello", &doc.data(kids[0]).unwrap()[..]);
    assert_eq!(" World", &doc.data(kids[2]).unwrap()[..]);
    assert_eq!("inside", &doc.text_content(inner).unwrap()[..]);

    // Idempotent: a second pass yields a structurally equal tree.
    let mut snapshot = doc.deep_clone(root);
    doc.normalize(root);
    let mut again = doc.deep_clone(root);
    let one = snapshot.root_element().unwrap();
    let other_src = again.root_element().unwrap();
    let other = snapshot.adopt(&mut again, other_src).unwrap();
    assert!(snapshot.is_equal_node(one, other), "normalize is idempotent");
    assert_eq!(3, doc.children(root).count());
}

#[test]
fn text_content_get_set() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    doc.append_child(root, a).unwrap();
    let t1 = doc.create_text_node("foo");
    doc.append_child(a, t1).unwrap();
    let t2 = doc.create_text_node("bar");
    doc.append_child(root, t2).unwrap();
    assert_eq!("foobar", &doc.text_content(root).unwrap()[..]);
    assert_eq!(None, doc.text_content(DOC), "null for documents");

    doc.set_text_content(root, Some("rewritten"));
    assert_eq!(1, doc.children(root).count());
    assert_eq!("rewritten", &doc.text_content(root).unwrap()[..]);
    assert!(!doc.is_connected(a), "old children detached");

    doc.set_text_content(root, None);
    assert_eq!(0, doc.children(root).count());
    assert_eq!("", &doc.text_content(root).unwrap()[..]);
    check_invariants(&doc);
}

#[test]
fn clone_and_equality() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    doc.set_attribute(a, "class", "x y").unwrap();
    doc.set_attribute(a, "title", "t").unwrap();
    doc.append_child(root, a).unwrap();
    let t = doc.create_text_node("text");
    doc.append_child(a, t).unwrap();

    let copy = doc.clone_node(root, true);
    assert!(doc.is_equal_node(root, copy));
    assert!(!doc.is_same_node(root, copy));
    assert!(doc.is_same_node(root, root));
    assert!(doc[copy].parent().is_none(), "clone is detached");

    let shallow = doc.clone_node(root, false);
    assert!(!doc.is_equal_node(root, shallow), "children differ");

    // Attribute order does not affect equality.
    let b1 = elem(&mut doc, "b");
    let b2 = elem(&mut doc, "b");
    doc.set_attribute(b1, "p", "1").unwrap();
    doc.set_attribute(b1, "q", "2").unwrap();
    doc.set_attribute(b2, "q", "2").unwrap();
    doc.set_attribute(b2, "p", "1").unwrap();
    assert!(doc.is_equal_node(b1, b2));
}

#[test]
fn adopt_across_documents() {
    ensure_logger();
    let (mut d1, root1) = doc_with_root("one");
    let sub = elem(&mut d1, "sub");
    d1.set_attribute(sub, "id", "moved").unwrap();
    d1.append_child(root1, sub).unwrap();
    let t = d1.create_text_node("payload");
    d1.append_child(sub, t).unwrap();
    assert_eq!(Some(sub), d1.get_element_by_id("moved"));

    let (mut d2, root2) = doc_with_root("two");
    let here = d2.adopt(&mut d1, sub).unwrap();

    assert_eq!(None, d1.get_element_by_id("moved"), "index entry released");
    assert_eq!(0, d1.children(root1).count());
    assert!(!d2.is_connected(here), "adopted subtree arrives detached");
    assert_eq!("payload", &d2.text_content(here).unwrap()[..]);

    d2.append_child(root2, here).unwrap();
    assert_eq!(Some(here), d2.get_element_by_id("moved"));
    check_invariants(&d1);
    check_invariants(&d2);
}

#[test]
fn document_position() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    let inner = elem(&mut doc, "inner");
    doc.append_child(root, a).unwrap();
    doc.append_child(root, b).unwrap();
    doc.append_child(a, inner).unwrap();

    assert_eq!(0, doc.compare_document_position(a, a));
    assert_ne!(0, doc.compare_document_position(a, b) & position::FOLLOWING);
    assert_ne!(0, doc.compare_document_position(b, a) & position::PRECEDING);
    let down = doc.compare_document_position(a, inner);
    assert_ne!(0, down & position::CONTAINED_BY);
    assert_ne!(0, down & position::FOLLOWING);
    let up = doc.compare_document_position(inner, a);
    assert_ne!(0, up & position::CONTAINS);

    let detached = elem(&mut doc, "det");
    let rel = doc.compare_document_position(a, detached);
    assert_ne!(0, rel & position::DISCONNECTED);
    assert_ne!(0, rel & position::IMPLEMENTATION_SPECIFIC);

    assert!(doc.contains(root, inner));
    assert!(doc.contains(root, root));
    assert!(!doc.contains(a, b));
}

// Scenario: UTF-16 addressed character data.
#[test]
fn split_text_scenario() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let t = doc.create_text_node("Hello World");
    doc.append_child(root, t).unwrap();
    assert_eq!(11, doc.data_len(t).unwrap());

    let tail = doc.split_text(t, 6).unwrap();
    assert_eq!("Hello ", &doc.data(t).unwrap()[..]);
    assert_eq!("World", &doc.data(tail).unwrap()[..]);
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![t, tail], kids, "halves are siblings in order");
    assert_eq!("Hello World", &doc.whole_text(t).unwrap()[..]);
}

#[test]
fn chardata_utf16_ops() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    // One supplementary-plane char: 2 UTF-16 units.
    let t = doc.create_text_node("a\u{1F600}b");
    doc.append_child(root, t).unwrap();
    assert_eq!(4, doc.data_len(t).unwrap());
    assert_eq!("\u{1F600}", &doc.substring_data(t, 1, Some(2)).unwrap()[..]);
    assert_eq!("b", &doc.substring_data(t, 3, None).unwrap()[..]);
    // Count clamps to the end.
    assert_eq!("b", &doc.substring_data(t, 3, Some(99)).unwrap()[..]);
    // Offsets out of range report, data untouched.
    assert_eq!(
        Err(DomError::IndexOutOfBounds { offset: 5, len: 4 }),
        doc.substring_data(t, 5, None));

    doc.insert_data(t, 1, "X").unwrap();
    assert_eq!("aX\u{1F600}b", &doc.data(t).unwrap()[..]);
    doc.delete_data(t, 1, 1).unwrap();
    assert_eq!("a\u{1F600}b", &doc.data(t).unwrap()[..]);
    doc.replace_data(t, 1, 2, "Y").unwrap();
    assert_eq!("aYb", &doc.data(t).unwrap()[..]);
    doc.append_data(t, "!").unwrap();
    assert_eq!("aYb!", &doc.data(t).unwrap()[..]);

    // substring/insert round-trip property at a fixed offset.
    let u = doc.create_text_node("abcdef");
    doc.append_child(root, u).unwrap();
    let piece = doc.substring_data(u, 2, Some(3)).unwrap();
    doc.delete_data(u, 2, 3).unwrap();
    doc.insert_data(u, 2, &piece).unwrap();
    assert_eq!("abcdef", &doc.data(u).unwrap()[..]);
}

#[test]
fn selector_matching() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let list_el = elem(&mut doc, "ul");
    doc.append_child(root, list_el).unwrap();
    let mut items = Vec::new();
    for i in 0..5 {
        let li = elem(&mut doc, "li");
        doc.set_attribute(li, "data-i", &i.to_string()).unwrap();
        if i % 2 == 0 {
            doc.set_attribute(li, "class", "even").unwrap();
        }
        doc.append_child(list_el, li).unwrap();
        items.push(li);
    }
    let link = elem(&mut doc, "a");
    doc.set_attribute(link, "href", "https://example.com/x").unwrap();
    doc.append_child(items[0], link).unwrap();

    assert_eq!(
        items.clone(),
        doc.query_selector_all(DOC, "ul > li").unwrap());
    assert_eq!(
        vec![items[0]],
        doc.query_selector_all(DOC, "li:first-child").unwrap());
    assert_eq!(
        vec![items[4]],
        doc.query_selector_all(DOC, "li:last-child").unwrap());
    assert_eq!(
        vec![items[0], items[2], items[4]],
        doc.query_selector_all(DOC, "li:nth-child(odd)").unwrap());
    assert_eq!(
        vec![items[1], items[3]],
        doc.query_selector_all(DOC, "ul li:not(.even)").unwrap());
    assert_eq!(
        vec![items[1], items[2], items[3], items[4]],
        doc.query_selector_all(DOC, "li + li, li ~ li").unwrap()
            .into_iter().collect::<Vec<_>>());
    assert_eq!(
        Some(link),
        doc.query_selector(DOC, "[href^='https://']").unwrap());
    assert_eq!(
        Some(items[0]),
        doc.query_selector(DOC, "li:has(a)").unwrap());
    assert_eq!(
        Some(items[2]),
        doc.query_selector(DOC, "li[data-i='2']").unwrap());
    assert_eq!(
        None,
        doc.query_selector(DOC, "li:hover").unwrap(),
        "unknown pseudo-class matches nothing");
    assert!(doc.query_selector(DOC, "li[").is_err());

    // querySelectorAll is a static snapshot.
    let snap = doc.query_selector_all(DOC, "li").unwrap();
    doc.remove_child(list_el, items[0]).unwrap();
    assert_eq!(5, snap.len());
    assert_eq!(4, doc.query_selector_all(DOC, "li").unwrap().len());
}

#[test]
fn selector_fast_paths_agree() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "widget");
    doc.set_attribute(a, "id", "w1").unwrap();
    doc.set_attribute(a, "class", "fancy").unwrap();
    doc.append_child(root, a).unwrap();
    let b = elem(&mut doc, "widget");
    doc.set_attribute(b, "class", "fancy plain").unwrap();
    doc.append_child(a, b).unwrap();

    // Fast-path answers equal a full scan for simple selectors.
    for sel in ["#w1", ".fancy", "widget"].iter() {
        let fast = doc.query_selector(DOC, sel).unwrap();
        let scan = doc.descendants(DOC)
            .filter(|n| *n != DOC)
            .find(|n| doc.matches_selector(*n, sel).unwrap_or(false));
        assert_eq!(scan, fast, "for {}", sel);
    }
    // Id-filtered path roots the traversal at the id element.
    assert_eq!(
        Some(b),
        doc.query_selector(DOC, "#w1 .fancy").unwrap());

    // Cache: repeated generic selectors parse once.
    let before = doc.selectors.borrow().len();
    for _ in 0..3 {
        doc.query_selector(DOC, "widget .fancy").unwrap();
    }
    assert_eq!(before + 1, doc.selectors.borrow().len());
}

// Scenario: named slot assignment.
#[test]
fn shadow_slot_assignment() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let sr = doc.attach_shadow(host, ShadowRootInit::default()).unwrap();
    assert_eq!(Some(sr), doc.shadow_root(host));
    assert_eq!(Some(host), doc.host(sr));
    assert_eq!(
        Err(DomError::NotSupported),
        doc.attach_shadow(host, ShadowRootInit::default()));

    let slot = elem(&mut doc, "slot");
    doc.set_attribute(slot, "name", "h").unwrap();
    doc.append_child(sr, slot).unwrap();

    let c = elem(&mut doc, "c");
    doc.set_attribute(c, "slot", "h").unwrap();
    doc.append_child(host, c).unwrap();

    assert_eq!(Some(slot), doc.assigned_slot(c));
    assert_eq!(vec![c], doc.assigned_nodes(slot, false));

    // Changing the slot attribute clears the assignment.
    doc.set_attribute(c, "slot", "x").unwrap();
    assert_eq!(None, doc.assigned_slot(c));
    assert!(doc.assigned_nodes(slot, false).is_empty());

    // Renaming the slot to match reassigns.
    doc.set_attribute(slot, "name", "x").unwrap();
    assert_eq!(Some(slot), doc.assigned_slot(c));

    // The default slot takes un-named slottables, text included.
    let dslot = elem(&mut doc, "slot");
    doc.append_child(sr, dslot).unwrap();
    let txt = doc.create_text_node("loose");
    doc.append_child(host, txt).unwrap();
    assert_eq!(Some(dslot), doc.assigned_slot(txt));
}

#[test]
fn shadow_modes_and_flags() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let init = ShadowRootInit {
        mode: ShadowMode::Closed,
        ..ShadowRootInit::default()
    };
    let sr = doc.attach_shadow(host, init).unwrap();
    assert_eq!(None, doc.shadow_root(host), "closed root is hidden");

    let inner = elem(&mut doc, "inner");
    doc.append_child(sr, inner).unwrap();
    assert!(doc.is_connected(inner), "shadow content follows host");
    assert!(doc[inner].flags().contains(crate::dom::NodeFlags::IN_SHADOW_TREE));

    // Composed root-finding crosses the boundary only when asked.
    assert_eq!(sr, doc.get_root_node(inner, false));
    assert_eq!(DOC, doc.get_root_node(inner, true));

    // Disconnecting the host clears the subtree, shadow included.
    doc.remove_child(root, host).unwrap();
    assert!(!doc.is_connected(inner));
    // Indices never see shadow content.
    doc.set_attribute(inner, "id", "hidden").unwrap();
    doc.append_child(root, host).unwrap();
    assert!(doc.is_connected(inner));
    assert_eq!(None, doc.get_element_by_id("hidden"));
}

#[test]
fn split_text_reassigns_slots() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let sr = doc.attach_shadow(host, ShadowRootInit::default()).unwrap();
    let slot = elem(&mut doc, "slot");
    doc.append_child(sr, slot).unwrap();

    let t = doc.create_text_node("ab");
    doc.append_child(host, t).unwrap();
    assert_eq!(Some(slot), doc.assigned_slot(t));

    // Splitting creates a second slottable under the host; assignment
    // must pick it up like any other insertion.
    let tail = doc.split_text(t, 1).unwrap();
    assert_eq!(Some(slot), doc.assigned_slot(tail));
    assert_eq!(vec![t, tail], doc.assigned_nodes(slot, false));
}

#[test]
fn shadow_manual_assignment() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let init = ShadowRootInit {
        slot_assignment: SlotAssignment::Manual,
        ..ShadowRootInit::default()
    };
    let sr = doc.attach_shadow(host, init).unwrap();
    let slot = elem(&mut doc, "slot");
    doc.append_child(sr, slot).unwrap();

    let a = elem(&mut doc, "a");
    doc.set_attribute(a, "slot", "whatever").unwrap();
    doc.append_child(host, a).unwrap();
    assert_eq!(
        None, doc.assigned_slot(a),
        "manual trees perform no implicit assignment");

    doc.assign(slot, &[a]).unwrap();
    assert_eq!(Some(slot), doc.assigned_slot(a));
    assert_eq!(vec![a], doc.assigned_nodes(slot, false));

    doc.assign(slot, &[]).unwrap();
    assert_eq!(None, doc.assigned_slot(a));
}

#[test]
fn assigned_nodes_flatten() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let outer_host = elem(&mut doc, "outer");
    doc.append_child(root, outer_host).unwrap();
    let outer_sr =
        doc.attach_shadow(outer_host, ShadowRootInit::default()).unwrap();

    // Inner host lives inside the outer shadow tree, and its slot
    // receives the outer slot itself.
    let inner_host = elem(&mut doc, "inner");
    doc.append_child(outer_sr, inner_host).unwrap();
    let inner_sr =
        doc.attach_shadow(inner_host, ShadowRootInit::default()).unwrap();
    let inner_slot = elem(&mut doc, "slot");
    doc.append_child(inner_sr, inner_slot).unwrap();
    let outer_slot = elem(&mut doc, "slot");
    doc.append_child(inner_host, outer_slot).unwrap();

    let content = elem(&mut doc, "content");
    doc.append_child(outer_host, content).unwrap();

    assert_eq!(Some(outer_slot), doc.assigned_slot(content));
    assert_eq!(vec![outer_slot], doc.assigned_nodes(inner_slot, false));
    assert_eq!(
        vec![content],
        doc.assigned_nodes(inner_slot, true),
        "flatten replaces the nested slot with its assignees");
}

fn listener(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> ListenerFn {
    let log = log.clone();
    let tag = tag.to_string();
    Rc::new(move |_doc: &mut Document, _ev: &mut Event| {
        log.borrow_mut().push(tag.clone());
    })
}

#[test]
fn event_phases_and_order() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let mid = elem(&mut doc, "mid");
    let leaf = elem(&mut doc, "leaf");
    doc.append_child(root, mid).unwrap();
    doc.append_child(mid, leaf).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    doc.add_event_listener(
        root, "ping", listener(&log, "root-capture"),
        ListenerOpts { capture: true, ..Default::default() });
    doc.add_event_listener(
        root, "ping", listener(&log, "root-bubble"),
        ListenerOpts::default());
    doc.add_event_listener(
        mid, "ping", listener(&log, "mid-capture"),
        ListenerOpts { capture: true, ..Default::default() });
    doc.add_event_listener(
        mid, "ping", listener(&log, "mid-bubble"),
        ListenerOpts::default());
    doc.add_event_listener(
        leaf, "ping", listener(&log, "leaf-a"), ListenerOpts::default());
    doc.add_event_listener(
        leaf, "ping", listener(&log, "leaf-b"), ListenerOpts::default());
    doc.add_event_listener(
        leaf, "other", listener(&log, "wrong-type"),
        ListenerOpts::default());

    let mut ev = Event::new("ping", EventInit {
        bubbles: true, ..Default::default()
    });
    assert!(doc.dispatch_event(leaf, &mut ev).unwrap());
    assert_eq!(
        vec![
            "root-capture", "mid-capture",
            "leaf-a", "leaf-b",
            "mid-bubble", "root-bubble",
        ],
        *log.borrow());

    // Without bubbles, propagation stops at the target.
    log.borrow_mut().clear();
    let mut ev = Event::new("ping", EventInit::default());
    doc.dispatch_event(leaf, &mut ev).unwrap();
    assert_eq!(
        vec!["root-capture", "mid-capture", "leaf-a", "leaf-b"],
        *log.borrow());
}

#[test]
fn event_stop_and_cancel() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let leaf = elem(&mut doc, "leaf");
    doc.append_child(root, leaf).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let stopper: ListenerFn = {
        let log = log.clone();
        Rc::new(move |_d: &mut Document, ev: &mut Event| {
            log.borrow_mut().push("stopper".into());
            ev.stop_immediate_propagation();
        })
    };
    doc.add_event_listener(leaf, "ping", stopper, ListenerOpts::default());
    doc.add_event_listener(
        leaf, "ping", listener(&log, "after"), ListenerOpts::default());
    doc.add_event_listener(
        root, "ping", listener(&log, "bubble"), ListenerOpts::default());

    let mut ev = Event::new("ping", EventInit {
        bubbles: true, ..Default::default()
    });
    doc.dispatch_event(leaf, &mut ev).unwrap();
    assert_eq!(vec!["stopper"], *log.borrow());

    // prevent_default respects cancelable and passive.
    let canceler: ListenerFn = Rc::new(|_d: &mut Document, ev: &mut Event| {
        ev.prevent_default();
    });
    let t2 = elem(&mut doc, "t2");
    doc.append_child(root, t2).unwrap();
    doc.add_event_listener(
        t2, "go", canceler.clone(), ListenerOpts::default());
    let mut cancelable = Event::new("go", EventInit {
        cancelable: true, ..Default::default()
    });
    assert!(!doc.dispatch_event(t2, &mut cancelable).unwrap());
    let mut plain = Event::new("go", EventInit::default());
    assert!(doc.dispatch_event(t2, &mut plain).unwrap());

    let t3 = elem(&mut doc, "t3");
    doc.append_child(root, t3).unwrap();
    doc.add_event_listener(t3, "go", canceler, ListenerOpts {
        passive: true, ..Default::default()
    });
    let mut passive = Event::new("go", EventInit {
        cancelable: true, ..Default::default()
    });
    assert!(
        doc.dispatch_event(t3, &mut passive).unwrap(),
        "passive listeners cannot cancel");
}

#[test]
fn event_once_and_abort() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let log = Rc::new(RefCell::new(Vec::new()));

    doc.add_event_listener(root, "ping", listener(&log, "once"),
        ListenerOpts { once: true, ..Default::default() });
    let mut e1 = Event::new("ping", EventInit::default());
    doc.dispatch_event(root, &mut e1).unwrap();
    let mut e2 = Event::new("ping", EventInit::default());
    doc.dispatch_event(root, &mut e2).unwrap();
    assert_eq!(vec!["once"], *log.borrow());

    let controller = crate::dom::AbortController::new();
    doc.add_event_listener(root, "ping", listener(&log, "aborted"),
        ListenerOpts {
            signal: Some(controller.signal()),
            ..Default::default()
        });
    controller.abort();
    let mut e3 = Event::new("ping", EventInit::default());
    doc.dispatch_event(root, &mut e3).unwrap();
    assert_eq!(vec!["once"], *log.borrow(), "aborted before dispatch");

    // Explicit removal by identity.
    let cb = listener(&log, "removed");
    doc.add_event_listener(root, "ping", cb.clone(),
        ListenerOpts::default());
    doc.remove_event_listener(root, "ping", &cb, false);
    let mut e4 = Event::new("ping", EventInit::default());
    doc.dispatch_event(root, &mut e4).unwrap();
    assert_eq!(vec!["once"], *log.borrow());
}

// Scenario: shadow retargeting, composed and non-composed dispatch.
#[test]
fn event_shadow_retargeting() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let sr = doc.attach_shadow(host, ShadowRootInit::default()).unwrap();
    let inner = elem(&mut doc, "inner");
    doc.append_child(sr, inner).unwrap();

    let seen_at_host = Rc::new(RefCell::new(None));
    let seen_inside = Rc::new(RefCell::new(None));
    let host_count = Rc::new(RefCell::new(0));

    let host_cb: ListenerFn = {
        let seen = seen_at_host.clone();
        let count = host_count.clone();
        Rc::new(move |_d: &mut Document, ev: &mut Event| {
            *seen.borrow_mut() = ev.target();
            *count.borrow_mut() += 1;
        })
    };
    let inner_cb: ListenerFn = {
        let seen = seen_inside.clone();
        Rc::new(move |_d: &mut Document, ev: &mut Event| {
            *seen.borrow_mut() = ev.target();
            assert!(!ev.composed_path().is_empty());
        })
    };
    doc.add_event_listener(host, "click", host_cb, ListenerOpts::default());
    doc.add_event_listener(
        inner, "click", inner_cb, ListenerOpts::default());

    let mut ev = Event::new("click", EventInit {
        bubbles: true, composed: true, ..Default::default()
    });
    doc.dispatch_event(inner, &mut ev).unwrap();
    assert_eq!(
        Some(host), *seen_at_host.borrow(),
        "light-side listener sees the retargeted host");
    assert_eq!(
        Some(inner), *seen_inside.borrow(),
        "shadow-side listener sees the real target");
    assert_eq!(1, *host_count.borrow());

    // Non-composed dispatch never escapes the shadow tree.
    let mut ev = Event::new("click", EventInit {
        bubbles: true, composed: false, ..Default::default()
    });
    doc.dispatch_event(inner, &mut ev).unwrap();
    assert_eq!(1, *host_count.borrow(), "host not reached");
}

#[test]
fn event_redispatch_rejected() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let mut ev = Event::new("ping", EventInit::default());
    ev.dispatching = true;
    assert_eq!(
        Err(DomError::InvalidState), doc.dispatch_event(root, &mut ev));
}

// Scenario: range extraction over <a><b><c/></b></a>.
#[test]
fn range_extract_scenario() {
    ensure_logger();
    let (mut doc, a) = doc_with_root("a");
    let b = elem(&mut doc, "b");
    let c = elem(&mut doc, "c");
    doc.append_child(a, b).unwrap();
    doc.append_child(b, c).unwrap();

    let mut r = doc.create_range();
    r.set_start(&doc, a, 0).unwrap();
    r.set_end(&doc, c, 0).unwrap();
    assert_eq!(a, r.common_ancestor_container(&doc));

    let frag = r.extract_contents(&mut doc).unwrap();
    assert_eq!(0, doc.children(a).count(), "a emptied");
    let frag_kids: Vec<NodeId> = doc.children(frag).collect();
    assert_eq!(vec![b], frag_kids);
    assert_eq!(vec![c], doc.children(b).collect::<Vec<_>>());
    assert!(r.collapsed());
    assert_eq!((a, 0), r.start());
}

#[test]
fn range_text_boundaries() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let t1 = doc.create_text_node("Hello ");
    let mid = elem(&mut doc, "mid");
    let t2 = doc.create_text_node("World");
    doc.append_child(root, t1).unwrap();
    doc.append_child(root, mid).unwrap();
    doc.append_child(root, t2).unwrap();

    let mut r = doc.create_range();
    r.set_start(&doc, t1, 2).unwrap();
    r.set_end(&doc, t2, 3).unwrap();
    assert_eq!("llo Wor", &r.to_text(&doc)[..]);

    let frag = r.clone_contents(&mut doc).unwrap();
    assert_eq!("llo Wor", &doc.text_content(frag).unwrap()[..]);
    assert_eq!("Hello ", &doc.data(t1).unwrap()[..], "clone leaves data");

    let frag = r.extract_contents(&mut doc).unwrap();
    assert_eq!("llo Wor", &doc.text_content(frag).unwrap()[..]);
    assert_eq!("He", &doc.data(t1).unwrap()[..]);
    assert_eq!("ld", &doc.data(t2).unwrap()[..]);
    assert!(!doc.is_connected(mid), "covered element extracted");
    check_invariants(&doc);
}

#[test]
fn range_same_node_substring() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let t = doc.create_text_node("abcdef");
    doc.append_child(root, t).unwrap();
    let mut r = doc.create_range();
    r.set_start(&doc, t, 1).unwrap();
    r.set_end(&doc, t, 4).unwrap();
    assert!(!r.collapsed());

    let frag = r.extract_contents(&mut doc).unwrap();
    assert_eq!("bcd", &doc.text_content(frag).unwrap()[..]);
    assert_eq!("aef", &doc.data(t).unwrap()[..]);
    assert!(r.collapsed());
}

#[test]
fn range_boundary_comparison() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let b = elem(&mut doc, "b");
    doc.append_child(root, a).unwrap();
    doc.append_child(root, b).unwrap();

    let mut r1 = doc.create_range();
    r1.select_node(&doc, a).unwrap();
    let mut r2 = doc.create_range();
    r2.select_node(&doc, b).unwrap();

    // Matching ends compare equal against self.
    for how in [
        HowToCompare::StartToStart,
        HowToCompare::EndToEnd,
    ].iter() {
        assert_eq!(
            0, r1.compare_boundary_points(&doc, *how, &r1).unwrap());
    }
    assert_eq!(
        -1,
        r1.compare_boundary_points(
            &doc, HowToCompare::StartToStart, &r2).unwrap());
    assert_eq!(
        1,
        r2.compare_boundary_points(
            &doc, HowToCompare::StartToStart, &r1).unwrap());

    // Offsets past the node length are rejected at set time.
    assert_eq!(
        Err(DomError::IndexSize),
        r1.set_start(&doc, a, 5));
    // Doctype containers are rejected.
    let dt = doc.create_document_type("html", "", "").unwrap();
    assert_eq!(
        Err(DomError::InvalidNodeType), r1.set_start(&doc, dt, 0));
}

#[test]
fn range_insert_and_surround() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let t = doc.create_text_node("HelloWorld");
    doc.append_child(root, t).unwrap();

    let mut r = doc.create_range();
    r.set_start(&doc, t, 5).unwrap();
    r.collapse(true);
    let marker = elem(&mut doc, "marker");
    r.insert_node(&mut doc, marker).unwrap();
    // The text was split around the insertion.
    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(3, kids.len());
    assert_eq!("Hello", &doc.data(kids[0]).unwrap()[..]);
    assert_eq!(marker, kids[1]);
    assert_eq!("World", &doc.data(kids[2]).unwrap()[..]);

    // surround_contents wraps a clean selection.
    let mut r2 = doc.create_range();
    r2.select_node(&doc, marker).unwrap();
    let wrap = elem(&mut doc, "wrap");
    r2.surround_contents(&mut doc, wrap).unwrap();
    assert_eq!(Some(wrap), doc[marker].parent());
    assert_eq!(Some(root), doc[wrap].parent());

    // Partially selected elements refuse surround.
    let t2 = doc.create_text_node("tail");
    doc.append_child(wrap, t2).unwrap();
    let mut bad = doc.create_range();
    bad.set_start(&doc, t2, 1).unwrap();
    bad.set_end(&doc, root, doc.node_length(root)).unwrap();
    let w2 = elem(&mut doc, "w2");
    assert_eq!(
        Err(DomError::InvalidState),
        bad.surround_contents(&mut doc, w2));
}

#[test]
fn static_range_validity() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let t = doc.create_text_node("abc");
    doc.append_child(root, t).unwrap();

    // Out-of-bounds offsets are accepted at construction.
    let sr = StaticRange::new(&doc, t, 99, t, 120).unwrap();
    assert!(!sr.is_valid(&doc));
    let ok = StaticRange::new(&doc, t, 1, t, 3).unwrap();
    assert!(ok.is_valid(&doc));
    assert!(!ok.collapsed());

    // Reversed order is invalid but constructible.
    let rev = StaticRange::new(&doc, t, 3, t, 1).unwrap();
    assert!(!rev.is_valid(&doc));

    let dt = doc.create_document_type("d", "", "").unwrap();
    assert_eq!(
        Err(DomError::InvalidNodeType),
        StaticRange::new(&doc, dt, 0, t, 0));
}

#[test]
fn node_iterator_walk() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let t = doc.create_text_node("text");
    let b = elem(&mut doc, "b");
    doc.append_child(root, a).unwrap();
    doc.append_child(a, t).unwrap();
    doc.append_child(root, b).unwrap();

    let mut it = doc.create_node_iterator(
        root, WhatToShow::SHOW_ELEMENT, None);
    assert_eq!(Some(root), it.next_node(&doc));
    assert_eq!(Some(a), it.next_node(&doc));
    assert_eq!(Some(b), it.next_node(&doc));
    assert_eq!(None, it.next_node(&doc));
    // The pointer sits after the reference: stepping back yields it.
    assert_eq!(Some(b), it.previous_node(&doc));
    assert_eq!(Some(a), it.previous_node(&doc));
    it.detach();

    let mut texts = doc.create_node_iterator(
        root, WhatToShow::SHOW_TEXT, None);
    assert_eq!(Some(t), texts.next_node(&doc));
    assert_eq!(None, texts.next_node(&doc));

    // Filter predicate: skip the element named "a".
    let filt: crate::dom::NodeFilterFn =
        Rc::new(|d: &Document, n: NodeId| {
            if d[n].is_elem("a") {
                crate::dom::FilterResult::Skip
            } else {
                crate::dom::FilterResult::Accept
            }
        });
    let mut it = doc.create_node_iterator(
        root, WhatToShow::SHOW_ELEMENT, Some(filt));
    assert_eq!(Some(root), it.next_node(&doc));
    assert_eq!(Some(b), it.next_node(&doc));
}

#[test]
fn filter_walk() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let strike = elem(&mut doc, "strike");
    let keep = doc.create_text_node("keep");
    doc.append_child(root, strike).unwrap();
    doc.append_child(strike, keep).unwrap();
    let junk = elem(&mut doc, "junk");
    doc.append_child(root, junk).unwrap();

    doc.filter(chain_filters!(
        |_d: &Document, data: &mut NodeData| {
            if data.is_elem("strike") { Action::Fold }
            else { Action::Continue }
        },
        |_d: &Document, data: &mut NodeData| {
            if data.is_elem("junk") { Action::Detach }
            else { Action::Continue }
        },
    ));

    let kids: Vec<NodeId> = doc.children(root).collect();
    assert_eq!(vec![keep], kids, "strike folded, junk detached");
    assert!(doc.is_connected(keep));
    check_invariants(&doc);
}

#[test]
fn node_ref_navigation() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    let t = doc.create_text_node("x");
    let b = elem(&mut doc, "b");
    doc.append_child(root, a).unwrap();
    doc.append_child(root, t).unwrap();
    doc.append_child(root, b).unwrap();

    let r = doc.root_element_ref().unwrap();
    assert_eq!(2, r.child_element_count());
    assert_eq!(a, r.first_element_child().unwrap().id());
    assert_eq!(b, r.last_element_child().unwrap().id());
    assert_eq!(4, r.descendants().count(), "self plus three children");
    assert_eq!(
        Some(b),
        r.find(|n| n.is_elem("b")).map(|n| n.id()));
    assert_eq!("root", &r.node_name()[..]);
    assert_eq!(
        1,
        r.select(|n| n.as_text().is_some()).count());
    assert_eq!(DOC, r.node_and_ancestors().last().unwrap().id());
}

#[test]
fn deep_clone_and_compact() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let a = elem(&mut doc, "a");
    doc.set_attribute(a, "id", "kept").unwrap();
    doc.append_child(root, a).unwrap();
    let junk = elem(&mut doc, "junk");
    doc.append_child(root, junk).unwrap();
    doc.remove_child(root, junk).unwrap();
    let _ = doc.destroy(junk);

    let snap = doc.deep_clone(DOC);
    assert_eq!(
        doc.nodes().count(),
        snap.nodes().count());
    assert!(snap.get_element_by_id("kept").is_some(),
        "clone rebuilds indices");

    let len_before = doc.len();
    doc.compact();
    assert!(doc.len() < len_before, "holes reclaimed");
    assert!(doc.get_element_by_id("kept").is_some());
    check_invariants(&doc);

    let bulk = doc.bulk_clone();
    assert_eq!(doc.len(), bulk.len());
}

#[test]
fn compact_preserves_shadow() {
    ensure_logger();
    let (mut doc, root) = doc_with_root("root");
    let host = elem(&mut doc, "host");
    doc.append_child(root, host).unwrap();
    let sr = doc.attach_shadow(host, ShadowRootInit::default()).unwrap();
    let slot = elem(&mut doc, "slot");
    doc.append_child(sr, slot).unwrap();
    let c = elem(&mut doc, "c");
    doc.append_child(host, c).unwrap();
    assert!(doc.assigned_slot(c).is_some());

    let junk = elem(&mut doc, "junk");
    let _ = doc.destroy(junk);
    doc.compact();

    let host2 = doc.query_selector(DOC, "host").unwrap().unwrap();
    let sr2 = doc.shadow_root(host2).unwrap();
    assert_eq!(Some(host2), doc.host(sr2));
    let c2 = doc.children(host2).next().unwrap();
    assert_eq!(
        doc.assigned_slot(c2),
        doc.children(sr2).next(),
        "slot assignment survives renumbering");
}

#[test]
fn random_mutation_soak() {
    ensure_logger();
    let mut rng = rand::thread_rng();
    let mut doc = Document::new();
    let root = elem(&mut doc, "root");
    doc.append_child(DOC, root).unwrap();
    let mut pool = vec![root];

    for step in 0..400 {
        let op = rng.gen_range(0, 5);
        match op {
            0 => {
                let tag = ["a", "b", "c"][rng.gen_range(0, 3)];
                let n = elem(&mut doc, tag);
                pool.push(n);
            }
            1 => {
                let parent = pool[rng.gen_range(0, pool.len())];
                let child = pool[rng.gen_range(0, pool.len())];
                let _ = doc.append_child(parent, child);
            }
            2 => {
                let child = pool[rng.gen_range(0, pool.len())];
                if let Some(p) = doc[child].parent() {
                    let _ = doc.remove_child(p, child);
                }
            }
            3 => {
                let parent = pool[rng.gen_range(0, pool.len())];
                let a = pool[rng.gen_range(0, pool.len())];
                let b = pool[rng.gen_range(0, pool.len())];
                let _ = doc.move_before(parent, a, Some(b));
            }
            _ => {
                let el = pool[rng.gen_range(0, pool.len())];
                if doc[el].is_element() {
                    let _ = doc.set_attribute(
                        el, "id", &format!("n{}", step % 7));
                }
            }
        }
        check_invariants(&doc);
    }

    // The id index agrees with a full scan at the end.
    for key in (0..7).map(|i| format!("n{}", i)) {
        let scan = doc.nodes().find(|n| {
            doc[*n].attr("id").map(|v| &v[..] == &key[..]).unwrap_or(false)
        });
        assert_eq!(
            scan, doc.get_element_by_id(&key),
            "index vs scan for {}", key);
    }
}
