//! The error taxonomy surfaced by all fallible tree operations.

use std::error::Error as StdError;
use std::fmt;

/// Convenient result alias for fallible tree operations.
pub type DomResult<T> = Result<T, DomError>;

/// A discriminated error value for every recoverable failure class.
///
/// Operations returning one of these leave the tree untouched: validity is
/// staged before any linkage change, so no partial mutation is observable on
/// the failure path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomError {
    /// The requested insertion or move would violate the tree's kind rules,
    /// or create a cycle.
    HierarchyRequest,

    /// A reference child or removal target is not a child of the receiver.
    NotFound,

    /// The node belongs to a different `Document` than the receiver.
    WrongDocument,

    /// The operation is not supported on the receiver, e.g. attaching a
    /// second shadow root.
    NotSupported,

    /// The receiver is in a state that forbids the operation, e.g.
    /// re-dispatching an event mid-dispatch.
    InvalidState,

    /// The node kind is not usable here, e.g. a doctype as a range
    /// container.
    InvalidNodeType,

    /// A name (tag, attribute, qualified) contains a forbidden character.
    InvalidCharacter,

    /// A qualified name is inconsistent with the given namespace.
    Namespace,

    /// An index into a child list or boundary point is out of range.
    IndexSize,

    /// A UTF-16 code unit offset into character data is out of range.
    /// Carries the offending offset and the data length in code units.
    IndexOutOfBounds { offset: u32, len: u32 },

    /// Arena growth failed; the tree is unchanged.
    OutOfMemory,

    /// A selector string failed to parse.
    BadSelector(SelectorError),
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::HierarchyRequest =>
                write!(f, "HierarchyRequestError"),
            DomError::NotFound =>
                write!(f, "NotFoundError"),
            DomError::WrongDocument =>
                write!(f, "WrongDocumentError"),
            DomError::NotSupported =>
                write!(f, "NotSupportedError"),
            DomError::InvalidState =>
                write!(f, "InvalidStateError"),
            DomError::InvalidNodeType =>
                write!(f, "InvalidNodeTypeError"),
            DomError::InvalidCharacter =>
                write!(f, "InvalidCharacterError"),
            DomError::Namespace =>
                write!(f, "NamespaceError"),
            DomError::IndexSize =>
                write!(f, "IndexSizeError"),
            DomError::IndexOutOfBounds { offset, len } =>
                write!(f, "IndexOutOfBounds: offset {} in length {}",
                       offset, len),
            DomError::OutOfMemory =>
                write!(f, "OutOfMemory"),
            DomError::BadSelector(e) =>
                write!(f, "bad selector: {}", e),
        }
    }
}

impl StdError for DomError {}

impl From<SelectorError> for DomError {
    fn from(e: SelectorError) -> Self {
        DomError::BadSelector(e)
    }
}

/// A failure while tokenizing or parsing a selector string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorError {
    /// Input ended inside a string or other incomplete production.
    UnexpectedEof,

    /// An unexpected character or token, with its byte position.
    UnexpectedToken(usize),

    /// An `An+B` argument that did not parse.
    BadNth,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::UnexpectedEof =>
                write!(f, "unexpected end of selector"),
            SelectorError::UnexpectedToken(pos) =>
                write!(f, "unexpected token at byte {}", pos),
            SelectorError::BadNth =>
                write!(f, "malformed An+B argument"),
        }
    }
}

impl StdError for SelectorError {}
