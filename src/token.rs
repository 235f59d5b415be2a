use std::fmt;

use crate::{
    error::TokenError,
    function::{Function, Operator},
    parser::position::SourcePos,
    symbol::SymbolId,
    tag::{PayloadKind, Tag, TokenClass},
    value::Value,
};

/// Display state of a value token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ValueTag {
    /// Printed when it reaches the end of a statement
    #[default]
    Plain,
    /// Result of an assignment, not printed
    Committed,
    /// A vector still being glued from adjacent values
    Strand,
}

impl ValueTag {
    pub const fn tag(self) -> Tag {
        match self {
            Self::Plain => Tag::Value,
            Self::Committed => Tag::Committed,
            Self::Strand => Tag::Strand,
        }
    }
}

/// The items of a (partial) bracket index, left to right. `None` is an elided
/// position, as in `A[;2]`.
#[derive(Debug, Clone, Default)]
pub struct IndexList(Vec<Option<Value>>);

impl IndexList {
    pub fn new(items: Vec<Option<Value>>) -> Self {
        Self(items)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn items(&self) -> &[Option<Value>] {
        &self.0
    }

    pub fn into_items(self) -> Vec<Option<Value>> {
        self.0
    }

    /// The single axis of an axis specification `F[k]`.
    pub fn single(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [Some(v)] => Some(v),
            _ => None,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().flatten()
    }
}

/// A token of a statement body or of a reducer window.
///
/// The payload is determined by the variant, so a token can never carry a
/// payload that disagrees with its tag.
#[derive(Debug, Clone)]
pub enum Token {
    End,
    Return,
    Assign,
    Branch,
    LBracket,
    RBracket,
    Semicolon,
    LParen,
    RParen,
    Function(Function),
    Operator(Operator),
    Symbol(SymbolId),
    Value(ValueTag, Value),
    PartialIndex(IndexList),
    Index(IndexList),
    Void,
    NameList(Vec<SymbolId>),
}

impl Token {
    #[inline]
    pub fn value(value: Value) -> Self {
        Self::Value(ValueTag::Plain, value)
    }

    #[inline]
    pub fn committed(value: Value) -> Self {
        Self::Value(ValueTag::Committed, value)
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::End => Tag::End,
            Self::Return => Tag::Return,
            Self::Assign => Tag::Assign,
            Self::Branch => Tag::Branch,
            Self::LBracket => Tag::LBracket,
            Self::RBracket => Tag::RBracket,
            Self::Semicolon => Tag::Semicolon,
            Self::LParen => Tag::LParen,
            Self::RParen => Tag::RParen,
            Self::Function(f) if f.is_niladic() => Tag::Niladic,
            Self::Function(_) => Tag::Function,
            Self::Operator(op) if op.is_dyadic() => Tag::DyadicOperator,
            Self::Operator(_) => Tag::MonadicOperator,
            Self::Symbol(_) => Tag::Symbol,
            Self::Value(t, _) => t.tag(),
            Self::PartialIndex(_) => Tag::PartialIndex,
            Self::Index(_) => Tag::Index,
            Self::Void => Tag::Void,
            Self::NameList(_) => Tag::NameList,
        }
    }

    #[inline]
    pub fn class(&self) -> TokenClass {
        self.tag().class()
    }

    fn mismatch(&self, expected: PayloadKind) -> TokenError {
        TokenError::InvalidPayloadAccess {
            expected,
            found: self.tag(),
        }
    }

    pub fn as_value(&self) -> Result<&Value, TokenError> {
        match self {
            Self::Value(_, v) => Ok(v),
            _ => Err(self.mismatch(PayloadKind::Value)),
        }
    }

    pub fn into_value(self) -> Result<Value, TokenError> {
        match self {
            Self::Value(_, v) => Ok(v),
            _ => Err(self.mismatch(PayloadKind::Value)),
        }
    }

    pub fn into_tagged_value(self) -> Result<(ValueTag, Value), TokenError> {
        match self {
            Self::Value(t, v) => Ok((t, v)),
            _ => Err(self.mismatch(PayloadKind::Value)),
        }
    }

    pub fn value_tag(&self) -> Option<ValueTag> {
        match self {
            Self::Value(t, _) => Some(*t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Result<&Function, TokenError> {
        match self {
            Self::Function(f) => Ok(f),
            _ => Err(self.mismatch(PayloadKind::Function)),
        }
    }

    pub fn into_function(self) -> Result<Function, TokenError> {
        match self {
            Self::Function(f) => Ok(f),
            _ => Err(self.mismatch(PayloadKind::Function)),
        }
    }

    pub fn into_operator(self) -> Result<Operator, TokenError> {
        match self {
            Self::Operator(op) => Ok(op),
            _ => Err(self.mismatch(PayloadKind::Operator)),
        }
    }

    pub fn as_symbol(&self) -> Result<SymbolId, TokenError> {
        match self {
            Self::Symbol(id) => Ok(*id),
            _ => Err(self.mismatch(PayloadKind::Symbol)),
        }
    }

    pub fn into_index(self) -> Result<IndexList, TokenError> {
        match self {
            Self::Index(list) | Self::PartialIndex(list) => Ok(list),
            _ => Err(self.mismatch(PayloadKind::Index)),
        }
    }

    pub fn into_names(self) -> Result<Vec<SymbolId>, TokenError> {
        match self {
            Self::NameList(names) => Ok(names),
            _ => Err(self.mismatch(PayloadKind::Names)),
        }
    }

    /// Re-tags a token in place. Only tags with the same payload kind are
    /// interchangeable, and only where the payload does not fix the tag.
    pub fn change_tag(&mut self, to: Tag) -> Result<(), TokenError> {
        let from = self.tag();
        if from == to {
            return Ok(());
        }
        let illegal = TokenError::IllegalRetag { from, to };
        if from.payload_kind() != to.payload_kind() {
            return Err(illegal);
        }
        match (std::mem::replace(self, Self::Void), to) {
            (Self::Value(_, v), Tag::Value) => *self = Self::Value(ValueTag::Plain, v),
            (Self::Value(_, v), Tag::Committed) => *self = Self::Value(ValueTag::Committed, v),
            (Self::Value(_, v), Tag::Strand) => *self = Self::Value(ValueTag::Strand, v),
            (Self::PartialIndex(list), Tag::Index) => *self = Self::Index(list),
            (Self::Index(list), Tag::PartialIndex) => *self = Self::PartialIndex(list),
            (original, _) => {
                *self = original;
                return Err(illegal);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => write!(f, "{func}"),
            Self::Operator(op) => write!(f, "{op}"),
            Self::Value(_, v) => write!(f, "{v:?}"),
            other => write!(f, "{}", other.class()),
        }
    }
}

/// The origin of a statement body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Immediate,
    Execute,
    UserFunction,
}

/// A compiled statement list: the token string a context executes.
///
/// Tokens of each statement are stored right to left, so the reducer reads
/// the body front to back. Every statement is followed by [`Token::End`];
/// the body as a whole finishes with [`Token::Return`].
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub tokens: Vec<Token>,
    pub positions: Vec<SourcePos>,
    /// Source text per line; line 0 of a function is its header
    pub lines: Vec<String>,
    /// Token index where function line `n` starts, at `n - 1`
    pub line_starts: Vec<usize>,
    pub labels: Vec<(SymbolId, usize)>,
}

impl Body {
    pub fn push(&mut self, token: Token, pos: SourcePos) {
        self.tokens.push(token);
        self.positions.push(pos);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Literal values held by the body.
    pub fn literals(&self) -> impl Iterator<Item = &Value> {
        self.tokens.iter().filter_map(|t| t.as_value().ok())
    }

    /// Index of the first token of the statement that contains `cursor - 1`.
    pub fn statement_start(&self, cursor: usize) -> usize {
        let mut pos = cursor.saturating_sub(1).min(self.tokens.len());
        while pos > 0 && !self.tokens[pos - 1].class().is_separator() {
            pos -= 1;
        }
        pos
    }
}
