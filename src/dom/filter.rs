//! Mutating visitor support for `Document`.

use crate::dom::{Document, NodeData, NodeId};

/// An instruction returned by the `Fn` closure used by
/// [`Document::filter`].
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Continue filtering, without further changes to this `Node`.
    Continue,

    /// Replace this `Node` with its children. Equivalent to `Detach` if
    /// returned for a `Node` with no children.
    Fold,

    /// Remove this `Node`, and any children, from the tree.
    Detach,
}

/// Mutating filter methods.
impl Document {
    /// Perform a depth-first (e.g. children before parent nodes) walk of
    /// the entire document, from the document node, allowing the provided
    /// function to make changes to each node's data.
    ///
    /// The function sees the document with the visited node temporarily
    /// vacated, so sibling and ancestor context reads are safe.
    pub fn filter<F>(&mut self, mut f: F)
        where F: Fn(&Document, &mut NodeData) -> Action
    {
        self.filter_at(Document::DOCUMENT_NODE_ID, &mut f);
        self.bump();
    }

    /// Perform a depth-first walk from the specified node ID, allowing
    /// the provided function to make changes to each node's data.
    pub fn filter_at<F>(&mut self, id: NodeId, f: &mut F) -> Action
        where F: Fn(&Document, &mut NodeData) -> Action
    {
        let mut next_child = self[id].first_child;
        while let Some(child) = next_child {
            next_child = self[child].next_sibling;
            match self.filter_at(child, f) {
                Action::Continue => {}
                Action::Fold => {
                    let _ = self.fold(child);
                }
                Action::Detach => {
                    let _ = self.destroy(child);
                }
            }
        }
        if id == Document::DOCUMENT_NODE_ID {
            return Action::Continue;
        }
        let mut data = self[id].take_data();
        let action = f(&*self, &mut data);
        self[id].data = data;
        action
    }
}

/// Compose a new filter closure, by chaining a list of closures or
/// function paths. Each is executed in order, while the return action
/// remains `Continue`.
#[macro_export]
macro_rules! chain_filters {
    ($first:expr $(, $subs:expr)* $(,)?) => (
        |doc: & $crate::Document, data: &mut $crate::NodeData| {
            let mut action: $crate::filter::Action = $first(doc, data);
        $(
            if action == $crate::filter::Action::Continue {
                action = $subs(doc, data);
            }
        )*
            action
        }
    );
}
