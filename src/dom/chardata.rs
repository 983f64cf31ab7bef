//! CharacterData operations, addressed in UTF-16 code units over the
//! UTF-8 storage. Offsets are converted at the boundary; counts clamp to
//! the remaining length, offsets out of range report `IndexOutOfBounds`.

use crate::chars;
use crate::dom::{
    Document, DomError, DomResult, Node, NodeData, NodeId,
    ProcessingInstruction, StrTendril,
};

impl Document {
    /// The node's character data, or `None` for non-character-data kinds.
    pub fn data(&self, id: NodeId) -> Option<StrTendril> {
        self.node_value(id)
    }

    /// Replace the node's character data wholesale.
    pub fn set_data(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        if !self[id].is_char_data() {
            return Err(DomError::InvalidNodeType);
        }
        self.set_node_value(id, value);
        Ok(())
    }

    /// The character data length in UTF-16 code units.
    pub fn data_len(&self, id: NodeId) -> DomResult<u32> {
        self.with_data(id, |d| chars::utf16_len(d))
    }

    /// Substring by UTF-16 `(offset, count)`; a `None` count takes the
    /// rest. The count clamps to the end of the data.
    pub fn substring_data(
        &self,
        id: NodeId,
        offset: u32,
        count: Option<u32>)
        -> DomResult<StrTendril>
    {
        let data = self.char_data(id)?;
        let len = chars::utf16_len(&data);
        let count = count.unwrap_or(len.saturating_sub(offset));
        let (from, to) = chars::byte_range(&data, offset, count)
            .ok_or(DomError::IndexOutOfBounds { offset, len })?;
        Ok(data.subtendril(from as u32, (to - from) as u32))
    }

    /// Append to the end of the data.
    pub fn append_data(&mut self, id: NodeId, s: &str) -> DomResult<()> {
        let mut data = self.char_data(id)?;
        data.push_slice(s);
        self.store_data(id, data);
        Ok(())
    }

    /// Insert at a UTF-16 offset.
    pub fn insert_data(&mut self, id: NodeId, offset: u32, s: &str)
        -> DomResult<()>
    {
        self.replace_data(id, offset, 0, s)
    }

    /// Delete a UTF-16 `(offset, count)` span; the count clamps to the
    /// end.
    pub fn delete_data(&mut self, id: NodeId, offset: u32, count: u32)
        -> DomResult<()>
    {
        self.replace_data(id, offset, count, "")
    }

    /// Replace a UTF-16 `(offset, count)` span with `s`. The fundamental
    /// mutation the other operations reduce to.
    pub fn replace_data(
        &mut self,
        id: NodeId,
        offset: u32,
        count: u32,
        s: &str)
        -> DomResult<()>
    {
        let data = self.char_data(id)?;
        let len = chars::utf16_len(&data);
        let (from, to) = chars::byte_range(&data, offset, count)
            .ok_or(DomError::IndexOutOfBounds { offset, len })?;
        let mut out = StrTendril::with_capacity(
            (data.len() + s.len()) as u32);
        out.push_slice(&data[..from]);
        out.push_slice(s);
        out.push_slice(&data[to..]);
        self.store_data(id, out);
        Ok(())
    }

    /// Truncate a text node at a UTF-16 offset, returning a new text node
    /// holding the remainder, inserted after the original when attached.
    pub fn split_text(&mut self, id: NodeId, offset: u32)
        -> DomResult<NodeId>
    {
        match self[id].data {
            NodeData::Text(_) | NodeData::CData(_) => {}
            _ => return Err(DomError::InvalidNodeType),
        }
        let data = self.char_data(id)?;
        let len = chars::utf16_len(&data);
        let at = chars::byte_offset(&data, offset)
            .ok_or(DomError::IndexOutOfBounds { offset, len })?;
        let head = data.subtendril(0, at as u32);
        let tail = data.subtendril(at as u32, (data.len() - at) as u32);
        self.store_data(id, head);
        let new_node = self.create_text_like(id, &tail);
        self.clear_assigned_slot(new_node);
        if let Some(next) = self[id].next_sibling {
            self.link_before(next, new_node);
        } else if let Some(parent) = self[id].parent {
            self.link_append(parent, new_node);
        }
        if let Some(parent) = self[id].parent {
            let flags = self[id].flags;
            self[new_node].flags = flags;
            // The tail is a new slottable under the same parent; named
            // slot assignment must see it, as any insertion would.
            self.reassign_around(parent);
        }
        self.bump();
        Ok(new_node)
    }

    /// The concatenated data of this text node and its contiguous text
    /// node siblings, in tree order.
    pub fn whole_text(&self, id: NodeId) -> DomResult<StrTendril> {
        if !self[id].is_text() {
            return Err(DomError::InvalidNodeType);
        }
        let mut first = id;
        while let Some(prev) = self[first].prev_sibling {
            if self[prev].is_text() {
                first = prev;
            } else {
                break;
            }
        }
        let mut parts = Vec::new();
        let mut cur = Some(first);
        while let Some(n) = cur {
            if !self[n].is_text() {
                break;
            }
            if let Some(t) = self.data(n) {
                parts.push(t);
            }
            cur = self[n].next_sibling;
        }
        Ok(chars::concat(parts))
    }

    // A detached node of the same character-data kind, carrying `data`.
    pub(crate) fn create_text_like(&mut self, like: NodeId, data: &str)
        -> NodeId
    {
        let node = match &self[like].data {
            NodeData::Comment(_) =>
                Node::new(NodeData::Comment(data.into())),
            NodeData::CData(_) => Node::new(NodeData::CData(data.into())),
            NodeData::Pi(pi) => Node::new(NodeData::Pi(
                ProcessingInstruction {
                    target: pi.target.clone(),
                    data: data.into(),
                    _priv: (),
                })),
            _ => Node::new_text(data),
        };
        self.push_node(node)
    }

    fn char_data(&self, id: NodeId) -> DomResult<StrTendril> {
        self.node_value(id)
            .filter(|_| self[id].is_char_data())
            .ok_or(DomError::InvalidNodeType)
    }

    fn with_data<T>(
        &self,
        id: NodeId,
        f: impl FnOnce(&StrTendril) -> T)
        -> DomResult<T>
    {
        match &self[id].data {
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::CData(t) =>
                Ok(f(t)),
            NodeData::Pi(pi) => Ok(f(&pi.data)),
            _ => Err(DomError::InvalidNodeType),
        }
    }

    fn store_data(&mut self, id: NodeId, value: StrTendril) {
        match &mut self[id].data {
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::CData(t) =>
                *t = value,
            NodeData::Pi(pi) => pi.data = value,
            _ => unreachable!("store_data on non character data"),
        }
        self.bump();
    }
}
