//! The selector engine: tokenizer, parser, fast-path classifier, matcher
//! and the document's bounded parse cache.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use lazy_static::lazy_static;
use log::trace;

use crate::chars::split_ascii_ws;
use crate::dom::{
    Document, DomResult, LocalName, NodeId, SelectorError,
};

/// Maximum number of parsed selectors retained in a document's FIFO parse
/// cache.
pub const SELECTOR_CACHE_CAPACITY: usize = 128;

/// A parsed, comma-separated list of complex selectors.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorList {
    pub(crate) selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    /// Tokenize and parse a selector string.
    pub fn parse(input: &str) -> Result<SelectorList, SelectorError> {
        let mut parser = Parser::new(input);
        let list = parser.parse_list()?;
        parser.expect_eof()?;
        Ok(list)
    }
}

/// Compound selectors joined by combinators, stored rightmost-first for
/// right-to-left matching.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ComplexSelector {
    pub(crate) compounds: Vec<CompoundSelector>,
    // combinators[i] relates compounds[i] to the next compound leftward.
    pub(crate) combinators: Vec<Combinator>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

/// A run of simple selectors with no combinator between them.
#[derive(Clone, Debug, PartialEq, Default)]
pub(crate) struct CompoundSelector {
    pub(crate) simples: Vec<SimpleSelector>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SimpleSelector {
    Universal,
    Type(LocalName),
    Id(String),
    Class(String),
    Attr { local: String, matcher: AttrMatcher },
    Pseudo(PseudoClass),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AttrMatcher {
    Presence,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Includes(String),
    DashMatch(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    NthChild(i32, i32),
    Not(SelectorList),
    Is(SelectorList),
    Where(SelectorList),
    Has(SelectorList),
    /// Recognized syntax, unknown semantics: parses but matches nothing.
    Unknown,
}

// ---------------------------------------------------------------- tokens

#[derive(Clone, Debug, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Hash(&'a str),
    Str(&'a str),
    Dot,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Plus,
    Gt,
    Tilde,
    Asterisk,
    LParen,
    RParen,
    Equals,
    PrefixMatch,
    SuffixMatch,
    SubstringMatch,
    IncludesMatch,
    DashMatch,
    Whitespace,
    Eof,
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn next_token(&mut self) -> Result<Token<'a>, SelectorError> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        let (_, c) = match chars.next() {
            Some(x) => x,
            None => return Ok(Token::Eof),
        };
        if c.is_ascii_whitespace() {
            let n = rest.find(|ch: char| !ch.is_ascii_whitespace())
                .unwrap_or(rest.len());
            self.pos += n;
            return Ok(Token::Whitespace);
        }
        if is_ident_start(c) {
            let end = ident_end(rest);
            self.pos += end;
            return Ok(Token::Ident(&rest[..end]));
        }
        match c {
            '#' => {
                let tail = &rest[1..];
                let end = tail.find(|ch| !is_ident_char(ch))
                    .unwrap_or(tail.len());
                if end == 0 {
                    return Err(SelectorError::UnexpectedToken(self.pos));
                }
                self.pos += 1 + end;
                Ok(Token::Hash(&tail[..end]))
            }
            '"' | '\'' => {
                let tail = &rest[1..];
                match tail.find(c) {
                    Some(end) => {
                        self.pos += 2 + end;
                        Ok(Token::Str(&tail[..end]))
                    }
                    None => Err(SelectorError::UnexpectedEof),
                }
            }
            '.' => { self.pos += 1; Ok(Token::Dot) }
            '[' => { self.pos += 1; Ok(Token::LBracket) }
            ']' => { self.pos += 1; Ok(Token::RBracket) }
            ':' => { self.pos += 1; Ok(Token::Colon) }
            ',' => { self.pos += 1; Ok(Token::Comma) }
            '+' => { self.pos += 1; Ok(Token::Plus) }
            '>' => { self.pos += 1; Ok(Token::Gt) }
            '(' => { self.pos += 1; Ok(Token::LParen) }
            ')' => { self.pos += 1; Ok(Token::RParen) }
            '=' => { self.pos += 1; Ok(Token::Equals) }
            '~' => {
                if rest[1..].starts_with('=') {
                    self.pos += 2;
                    Ok(Token::IncludesMatch)
                } else {
                    self.pos += 1;
                    Ok(Token::Tilde)
                }
            }
            '*' => {
                if rest[1..].starts_with('=') {
                    self.pos += 2;
                    Ok(Token::SubstringMatch)
                } else {
                    self.pos += 1;
                    Ok(Token::Asterisk)
                }
            }
            '^' if rest[1..].starts_with('=') => {
                self.pos += 2;
                Ok(Token::PrefixMatch)
            }
            '$' if rest[1..].starts_with('=') => {
                self.pos += 2;
                Ok(Token::SuffixMatch)
            }
            '|' if rest[1..].starts_with('=') => {
                self.pos += 2;
                Ok(Token::DashMatch)
            }
            _ => Err(SelectorError::UnexpectedToken(self.pos)),
        }
    }

    // Consume raw text through the matching close paren, respecting
    // nested parens and quoted strings. The open paren has already been
    // consumed. Returns the inner text.
    fn capture_balanced(&mut self) -> Result<&'a str, SelectorError> {
        let rest = self.rest();
        let mut depth = 1usize;
        let mut in_str: Option<char> = None;
        for (i, c) in rest.char_indices() {
            match in_str {
                Some(q) => {
                    if c == q {
                        in_str = None;
                    }
                }
                None => match c {
                    '"' | '\'' => in_str = Some(c),
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            self.pos += i + 1;
                            return Ok(&rest[..i]);
                        }
                    }
                    _ => {}
                },
            }
        }
        Err(SelectorError::UnexpectedEof)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

fn ident_end(s: &str) -> usize {
    s.find(|ch| !is_ident_char(ch)).unwrap_or(s.len())
}

fn is_css_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(is_ident_start).unwrap_or(false)
        && s.chars().all(is_ident_char)
}

// ---------------------------------------------------------------- parser

enum PseudoKind {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    NthChild,
    Not,
    Is,
    Where,
    Has,
}

lazy_static! {
    /// Recognized pseudo-class names; anything else parses as `Unknown`.
    static ref PSEUDO_KINDS: HashMap<&'static str, PseudoKind> = {
        let mut m = HashMap::new();
        m.insert("first-child", PseudoKind::FirstChild);
        m.insert("last-child", PseudoKind::LastChild);
        m.insert("only-child", PseudoKind::OnlyChild);
        m.insert("first-of-type", PseudoKind::FirstOfType);
        m.insert("last-of-type", PseudoKind::LastOfType);
        m.insert("nth-child", PseudoKind::NthChild);
        m.insert("not", PseudoKind::Not);
        m.insert("is", PseudoKind::Is);
        m.insert("where", PseudoKind::Where);
        m.insert("has", PseudoKind::Has);
        m
    };
}

struct Parser<'a> {
    tok: Tokenizer<'a>,
    peeked: Option<Token<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { tok: Tokenizer::new(input), peeked: None }
    }

    fn peek(&mut self) -> Result<&Token<'a>, SelectorError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.tok.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn bump(&mut self) -> Result<Token<'a>, SelectorError> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.tok.next_token(),
        }
    }

    fn skip_ws(&mut self) -> Result<bool, SelectorError> {
        let mut saw = false;
        while *self.peek()? == Token::Whitespace {
            self.bump()?;
            saw = true;
        }
        Ok(saw)
    }

    fn expect_eof(&mut self) -> Result<(), SelectorError> {
        self.skip_ws()?;
        match self.peek()? {
            Token::Eof => Ok(()),
            _ => Err(SelectorError::UnexpectedToken(self.tok.pos)),
        }
    }

    fn parse_list(&mut self) -> Result<SelectorList, SelectorError> {
        let mut selectors = vec![];
        loop {
            self.skip_ws()?;
            selectors.push(self.parse_complex()?);
            self.skip_ws()?;
            if *self.peek()? == Token::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = vec![];
        loop {
            let saw_ws = self.skip_ws()?;
            let comb = match self.peek()? {
                Token::Comma | Token::Eof => break,
                Token::Gt => {
                    self.bump()?;
                    self.skip_ws()?;
                    Combinator::Child
                }
                Token::Plus => {
                    self.bump()?;
                    self.skip_ws()?;
                    Combinator::AdjacentSibling
                }
                Token::Tilde => {
                    self.bump()?;
                    self.skip_ws()?;
                    Combinator::GeneralSibling
                }
                _ if saw_ws => Combinator::Descendant,
                _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
            };
            compounds.push(self.parse_compound()?);
            combinators.push(comb);
        }
        // Stored rightmost-first for the matcher.
        compounds.reverse();
        combinators.reverse();
        Ok(ComplexSelector { compounds, combinators })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut simples = vec![];
        match self.peek()? {
            Token::Ident(name) => {
                let s = SimpleSelector::Type(LocalName::from(*name));
                simples.push(s);
                self.bump()?;
            }
            Token::Asterisk => {
                simples.push(SimpleSelector::Universal);
                self.bump()?;
            }
            _ => {}
        }
        loop {
            match self.peek()? {
                Token::Hash(v) => {
                    simples.push(SimpleSelector::Id((*v).to_string()));
                    self.bump()?;
                }
                Token::Dot => {
                    self.bump()?;
                    match self.bump()? {
                        Token::Ident(v) =>
                            simples.push(SimpleSelector::Class(v.to_string())),
                        Token::Eof => return Err(SelectorError::UnexpectedEof),
                        _ => return Err(
                            SelectorError::UnexpectedToken(self.tok.pos)),
                    }
                }
                Token::LBracket => {
                    self.bump()?;
                    simples.push(self.parse_attr()?);
                }
                Token::Colon => {
                    self.bump()?;
                    simples.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }
        if simples.is_empty() {
            return match self.peek()? {
                Token::Eof => Err(SelectorError::UnexpectedEof),
                _ => Err(SelectorError::UnexpectedToken(self.tok.pos)),
            };
        }
        Ok(CompoundSelector { simples })
    }

    fn parse_attr(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_ws()?;
        let local = match self.bump()? {
            Token::Ident(n) => n.to_string(),
            Token::Eof => return Err(SelectorError::UnexpectedEof),
            _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
        };
        self.skip_ws()?;
        let op = match self.bump()? {
            Token::RBracket => {
                return Ok(SimpleSelector::Attr {
                    local,
                    matcher: AttrMatcher::Presence,
                });
            }
            Token::Equals => Token::Equals,
            t @ Token::PrefixMatch
            | t @ Token::SuffixMatch
            | t @ Token::SubstringMatch
            | t @ Token::IncludesMatch
            | t @ Token::DashMatch => t,
            Token::Eof => return Err(SelectorError::UnexpectedEof),
            _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
        };
        self.skip_ws()?;
        let value = match self.bump()? {
            Token::Str(v) | Token::Ident(v) => v.to_string(),
            Token::Eof => return Err(SelectorError::UnexpectedEof),
            _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
        };
        self.skip_ws()?;
        match self.bump()? {
            Token::RBracket => {}
            Token::Eof => return Err(SelectorError::UnexpectedEof),
            _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
        }
        let matcher = match op {
            Token::Equals => AttrMatcher::Exact(value),
            Token::PrefixMatch => AttrMatcher::Prefix(value),
            Token::SuffixMatch => AttrMatcher::Suffix(value),
            Token::SubstringMatch => AttrMatcher::Substring(value),
            Token::IncludesMatch => AttrMatcher::Includes(value),
            Token::DashMatch => AttrMatcher::DashMatch(value),
            _ => unreachable!(),
        };
        Ok(SimpleSelector::Attr { local, matcher })
    }

    fn parse_pseudo(&mut self) -> Result<SimpleSelector, SelectorError> {
        // A second colon introduces a pseudo-element; recognized
        // syntactically, never matched.
        if *self.peek()? == Token::Colon {
            self.bump()?;
        }
        let name = match self.bump()? {
            Token::Ident(n) => n,
            Token::Eof => return Err(SelectorError::UnexpectedEof),
            _ => return Err(SelectorError::UnexpectedToken(self.tok.pos)),
        };
        let args = if *self.peek()? == Token::LParen {
            self.bump()?;
            debug_assert!(self.peeked.is_none());
            Some(self.tok.capture_balanced()?)
        } else {
            None
        };
        let pseudo = match (PSEUDO_KINDS.get(name), args) {
            (Some(PseudoKind::FirstChild), None) => PseudoClass::FirstChild,
            (Some(PseudoKind::LastChild), None) => PseudoClass::LastChild,
            (Some(PseudoKind::OnlyChild), None) => PseudoClass::OnlyChild,
            (Some(PseudoKind::FirstOfType), None) => PseudoClass::FirstOfType,
            (Some(PseudoKind::LastOfType), None) => PseudoClass::LastOfType,
            (Some(PseudoKind::NthChild), Some(a)) => {
                let (step, offset) = parse_nth(a)?;
                PseudoClass::NthChild(step, offset)
            }
            (Some(PseudoKind::Not), Some(a)) =>
                PseudoClass::Not(SelectorList::parse(a)?),
            (Some(PseudoKind::Is), Some(a)) =>
                PseudoClass::Is(SelectorList::parse(a)?),
            (Some(PseudoKind::Where), Some(a)) =>
                PseudoClass::Where(SelectorList::parse(a)?),
            (Some(PseudoKind::Has), Some(a)) =>
                PseudoClass::Has(SelectorList::parse(a)?),
            _ => PseudoClass::Unknown,
        };
        Ok(SimpleSelector::Pseudo(pseudo))
    }
}

/// Parse an `An+B` argument: `odd`, `even`, `B`, `An`, `An+B`, `An-B`,
/// with optional signs and whitespace.
fn parse_nth(s: &str) -> Result<(i32, i32), SelectorError> {
    let s = s.trim();
    match s {
        "odd" => return Ok((2, 1)),
        "even" => return Ok((2, 0)),
        _ => {}
    }
    let lower = s.to_ascii_lowercase();
    let compact: String =
        lower.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match compact.find('n') {
        None => compact.parse::<i32>()
            .map(|b| (0, b))
            .map_err(|_| SelectorError::BadNth),
        Some(i) => {
            let a_part = &compact[..i];
            let b_part = &compact[i + 1..];
            let a = match a_part {
                "" | "+" => 1,
                "-" => -1,
                _ => a_part.parse::<i32>()
                    .map_err(|_| SelectorError::BadNth)?,
            };
            let b = if b_part.is_empty() {
                0
            } else {
                if !b_part.starts_with('+') && !b_part.starts_with('-') {
                    return Err(SelectorError::BadNth);
                }
                b_part.trim_start_matches('+').parse::<i32>()
                    .or_else(|_| b_part.parse::<i32>())
                    .map_err(|_| SelectorError::BadNth)?
            };
            Ok((a, b))
        }
    }
}

// ------------------------------------------------------------ fast paths

/// A pre-parse classification of a selector string that routes trivial
/// selectors to the document indices.
#[derive(Clone, Debug, PartialEq)]
pub enum FastPath {
    /// `#ident` alone.
    SimpleId(String),
    /// `.ident` alone.
    SimpleClass(String),
    /// A bare type selector.
    SimpleTag(String),
    /// Leading `#ident` with a descendant tail: traversal can be rooted
    /// at the id element.
    IdFiltered(String),
    /// Everything else: full parse and match.
    Generic,
}

/// Classify the post-trim selector text.
pub fn classify(selector: &str) -> FastPath {
    let s = selector.trim();
    if let Some(rest) = s.strip_prefix('#') {
        if is_css_ident(rest) {
            return FastPath::SimpleId(rest.to_string());
        }
        if !s.contains(',') {
            let end = ident_end(rest);
            if end > 0 && rest[end..].starts_with(char::is_whitespace) {
                return FastPath::IdFiltered(rest[..end].to_string());
            }
        }
        return FastPath::Generic;
    }
    if let Some(rest) = s.strip_prefix('.') {
        if is_css_ident(rest) {
            return FastPath::SimpleClass(rest.to_string());
        }
        return FastPath::Generic;
    }
    if is_css_ident(s) {
        return FastPath::SimpleTag(s.to_string());
    }
    FastPath::Generic
}

// ----------------------------------------------------------------- cache

/// A FIFO-bounded map from selector text to its parsed form. Entries are
/// pointer-stable (`Rc`) for their cache lifetime.
#[derive(Default)]
pub(crate) struct SelectorCache {
    map: HashMap<Box<str>, Rc<SelectorList>>,
    order: VecDeque<Box<str>>,
}

impl SelectorCache {
    pub(crate) fn get_or_parse(&mut self, text: &str)
        -> Result<Rc<SelectorList>, SelectorError>
    {
        if let Some(hit) = self.map.get(text) {
            return Ok(hit.clone());
        }
        let parsed = Rc::new(SelectorList::parse(text)?);
        if self.order.len() >= SELECTOR_CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        let key: Box<str> = text.into();
        self.order.push_back(key.clone());
        self.map.insert(key, parsed.clone());
        trace!("selector cache miss ({} cached)", self.map.len());
        Ok(parsed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

// --------------------------------------------------------------- matcher

/// Selector queries and matching.
impl Document {
    /// First element matching the selector within `root`'s descendants,
    /// in depth-first pre-order.
    pub fn query_selector(&self, root: NodeId, selector: &str)
        -> DomResult<Option<NodeId>>
    {
        match classify(selector) {
            FastPath::SimpleId(id) =>
                Ok(self.query_by_id(root, &id)),
            FastPath::SimpleClass(c) =>
                Ok(self.query_by_class(root, &c)),
            FastPath::SimpleTag(t) =>
                Ok(self.query_by_tag_name(root, &t)),
            FastPath::IdFiltered(id) => {
                let list = self.parse_cached(selector)?;
                Ok(self.id_rooted(root, &id).and_then(|r| {
                    self.descendants(r)
                        .find(|n| self.matches_list(*n, &list))
                }))
            }
            FastPath::Generic => {
                let list = self.parse_cached(selector)?;
                Ok(self.descendants(root)
                    .filter(|n| *n != root)
                    .find(|n| self.matches_list(*n, &list)))
            }
        }
    }

    /// Static snapshot of every element matching the selector within
    /// `root`'s descendants, in document order.
    pub fn query_selector_all(&self, root: NodeId, selector: &str)
        -> DomResult<Vec<NodeId>>
    {
        match classify(selector) {
            FastPath::SimpleId(id) =>
                Ok(self.query_by_id(root, &id).into_iter().collect()),
            FastPath::SimpleClass(c) if self.index_covers(root) => {
                let token = LocalName::from(&*c);
                Ok(self.class_ids(&token).iter()
                    .filter(|n| self.in_subtree(root, **n))
                    .copied()
                    .collect())
            }
            FastPath::SimpleClass(c) => {
                Ok(self.descendants(root)
                    .filter(|n| *n != root)
                    .filter(|n| self[*n].as_element()
                        .map(|e| e.has_class(&c))
                        .unwrap_or(false))
                    .collect())
            }
            FastPath::SimpleTag(t) if self.index_covers(root) => {
                let lname = LocalName::from(&*t);
                Ok(self.tag_ids(&lname).iter()
                    .filter(|n| self.in_subtree(root, **n))
                    .copied()
                    .collect())
            }
            FastPath::SimpleTag(t) => {
                let lname = LocalName::from(&*t);
                Ok(self.descendants(root)
                    .filter(|n| *n != root)
                    .filter(|n| self[*n].is_elem(lname.clone()))
                    .collect())
            }
            FastPath::IdFiltered(id) => {
                let list = self.parse_cached(selector)?;
                Ok(match self.id_rooted(root, &id) {
                    Some(r) => self.descendants(r)
                        .filter(|n| self.matches_list(*n, &list))
                        .collect(),
                    None => vec![],
                })
            }
            FastPath::Generic => {
                let list = self.parse_cached(selector)?;
                Ok(self.descendants(root)
                    .filter(|n| *n != root)
                    .filter(|n| self.matches_list(*n, &list))
                    .collect())
            }
        }
    }

    /// True if the element matches the selector, evaluated as `matches()`.
    pub fn matches_selector(&self, el: NodeId, selector: &str)
        -> DomResult<bool>
    {
        let list = self.parse_cached(selector)?;
        Ok(self.matches_list(el, &list))
    }

    fn parse_cached(&self, selector: &str) -> DomResult<Rc<SelectorList>> {
        Ok(self.selectors.borrow_mut().get_or_parse(selector)?)
    }

    fn in_subtree(&self, root: NodeId, n: NodeId) -> bool {
        root == Document::DOCUMENT_NODE_ID
            || (n != root && self.contains(root, n))
    }

    // Resolve the leading id of an id-filtered selector to a traversal
    // root within `root`.
    fn id_rooted(&self, root: NodeId, id: &str) -> Option<NodeId> {
        self.query_by_id(root, id)
    }

    pub(crate) fn matches_list(&self, el: NodeId, list: &SelectorList)
        -> bool
    {
        if !self[el].is_element() {
            return false;
        }
        list.selectors.iter().any(|cx| self.matches_complex(el, cx))
    }

    fn matches_complex(&self, el: NodeId, cx: &ComplexSelector) -> bool {
        if !self.matches_compound(el, &cx.compounds[0]) {
            return false;
        }
        self.matches_left(el, cx, 0)
    }

    // Walk the structural relation for each combinator step leftward,
    // backtracking where the relation is one-to-many.
    fn matches_left(&self, el: NodeId, cx: &ComplexSelector, idx: usize)
        -> bool
    {
        if idx >= cx.combinators.len() {
            return true;
        }
        let next = &cx.compounds[idx + 1];
        match cx.combinators[idx] {
            Combinator::Child => {
                match self.parent_element(el) {
                    Some(p) => self.matches_compound(p, next)
                        && self.matches_left(p, cx, idx + 1),
                    None => false,
                }
            }
            Combinator::Descendant => {
                let mut cur = self.parent_element(el);
                while let Some(p) = cur {
                    if self.matches_compound(p, next)
                        && self.matches_left(p, cx, idx + 1)
                    {
                        return true;
                    }
                    cur = self.parent_element(p);
                }
                false
            }
            Combinator::AdjacentSibling => {
                match self.prev_element_sibling(el) {
                    Some(s) => self.matches_compound(s, next)
                        && self.matches_left(s, cx, idx + 1),
                    None => false,
                }
            }
            Combinator::GeneralSibling => {
                let mut cur = self.prev_element_sibling(el);
                while let Some(s) = cur {
                    if self.matches_compound(s, next)
                        && self.matches_left(s, cx, idx + 1)
                    {
                        return true;
                    }
                    cur = self.prev_element_sibling(s);
                }
                false
            }
        }
    }

    fn matches_compound(&self, el: NodeId, comp: &CompoundSelector) -> bool {
        self[el].is_element()
            && comp.simples.iter().all(|s| self.matches_simple(el, s))
    }

    fn matches_simple(&self, el: NodeId, simple: &SimpleSelector) -> bool {
        let elem = match self[el].as_element() {
            Some(e) => e,
            None => return false,
        };
        match simple {
            SimpleSelector::Universal => true,
            SimpleSelector::Type(t) => elem.name.local == *t,
            SimpleSelector::Id(v) => {
                elem.id().map(|i| &i[..] == &v[..]).unwrap_or(false)
            }
            SimpleSelector::Class(v) => elem.has_class(v),
            SimpleSelector::Attr { local, matcher } => {
                let value = match elem.attr(&**local) {
                    Some(v) => v,
                    None => return false,
                };
                match matcher {
                    AttrMatcher::Presence => true,
                    AttrMatcher::Exact(m) => &value[..] == &m[..],
                    AttrMatcher::Prefix(m) =>
                        !m.is_empty() && value.starts_with(&m[..]),
                    AttrMatcher::Suffix(m) =>
                        !m.is_empty() && value.ends_with(&m[..]),
                    AttrMatcher::Substring(m) =>
                        !m.is_empty() && value.contains(&m[..]),
                    AttrMatcher::Includes(m) =>
                        split_ascii_ws(value).any(|t| t == &m[..]),
                    AttrMatcher::DashMatch(m) => {
                        &value[..] == &m[..]
                            || (value.starts_with(&m[..])
                                && value[m.len()..].starts_with('-'))
                    }
                }
            }
            SimpleSelector::Pseudo(p) => self.matches_pseudo(el, p),
        }
    }

    fn matches_pseudo(&self, el: NodeId, pseudo: &PseudoClass) -> bool {
        match pseudo {
            PseudoClass::FirstChild =>
                self.prev_element_sibling(el).is_none(),
            PseudoClass::LastChild =>
                self.next_element_sibling(el).is_none(),
            PseudoClass::OnlyChild => {
                self.prev_element_sibling(el).is_none()
                    && self.next_element_sibling(el).is_none()
            }
            PseudoClass::FirstOfType =>
                !self.has_sibling_of_type(el, false),
            PseudoClass::LastOfType =>
                !self.has_sibling_of_type(el, true),
            PseudoClass::NthChild(a, b) => {
                let index = self.element_sibling_index(el) as i32;
                if *a == 0 {
                    index == *b
                } else {
                    let d = index - *b;
                    d % *a == 0 && d / *a >= 0
                }
            }
            PseudoClass::Not(list) =>
                !list.selectors.iter()
                    .any(|cx| self.matches_complex(el, cx)),
            PseudoClass::Is(list) | PseudoClass::Where(list) =>
                list.selectors.iter()
                    .any(|cx| self.matches_complex(el, cx)),
            PseudoClass::Has(list) => {
                self.descendants(el)
                    .filter(|n| *n != el)
                    .any(|n| self.matches_list(n, list))
            }
            PseudoClass::Unknown => false,
        }
    }

    fn parent_element(&self, el: NodeId) -> Option<NodeId> {
        self[el].parent.filter(|p| self[*p].is_element())
    }

    fn prev_element_sibling(&self, el: NodeId) -> Option<NodeId> {
        let mut cur = self[el].prev_sibling;
        while let Some(s) = cur {
            if self[s].is_element() {
                return Some(s);
            }
            cur = self[s].prev_sibling;
        }
        None
    }

    fn next_element_sibling(&self, el: NodeId) -> Option<NodeId> {
        let mut cur = self[el].next_sibling;
        while let Some(s) = cur {
            if self[s].is_element() {
                return Some(s);
            }
            cur = self[s].next_sibling;
        }
        None
    }

    // 1-based index among element siblings, in document order.
    fn element_sibling_index(&self, el: NodeId) -> u32 {
        let mut i = 1;
        let mut cur = self[el].prev_sibling;
        while let Some(s) = cur {
            if self[s].is_element() {
                i += 1;
            }
            cur = self[s].prev_sibling;
        }
        i
    }

    fn has_sibling_of_type(&self, el: NodeId, following: bool) -> bool {
        let name = match self[el].as_element() {
            Some(e) => e.name.local.clone(),
            None => return false,
        };
        let mut cur = if following {
            self[el].next_sibling
        } else {
            self[el].prev_sibling
        };
        while let Some(s) = cur {
            if self[s].is_elem(name.clone()) {
                return true;
            }
            cur = if following {
                self[s].next_sibling
            } else {
                self[s].prev_sibling
            };
        }
        false
    }
}
