//! An embeddable, standards-conformant DOM tree engine: the node object
//! model, mutation algorithms, document indices, selector engine, shadow
//! trees, event dispatch and the range/traversal surface — with parsing,
//! styling and serialization left to the host.

#![warn(rust_2018_idioms)]

#[macro_use] extern crate html5ever;

mod chars;

mod dom;
pub use dom::{
    classify, filter, position,
    AbortController, AbortSignal, Ancestors, Attr, AttrData, AttrList,
    AttrName, Children, ClassList, Descender, Document, DocumentType,
    DomError, DomResult,
    Element, Event, EventInit, EventPhase, FastPath, FilterResult,
    HowToCompare, ListenerFn, ListenerOpts, LiveList, Node, NodeData,
    NodeFilterFn, NodeFlags, NodeId, NodeIterator, NodeKind, NodeRef,
    ProcessingInstruction, Range, Selecting, SelectorError, SelectorList,
    ShadowData, ShadowMode, ShadowRootInit, SlotAssignment, StaticRange,
    WhatToShow,
    LocalName, Namespace, Prefix, QualName, StrTendril,
    INLINE_ATTRS, SELECTOR_CACHE_CAPACITY,
};

#[doc(hidden)]
pub mod logger;
