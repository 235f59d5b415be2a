#[cfg(not(target_arch = "wasm32"))]
use proptest_derive::Arbitrary;
use std::{convert::TryFrom, fmt};
use strum::{EnumIter, FromRepr};

/// Syntactic class of a token, as seen by the phrase reducer.
///
/// Classes up to and including [`TokenClass::Value`] are permanent: they may be
/// stored in a statement body. Higher classes are transient and only appear in
/// a reducer window. [`TokenClass::Misc`] never appears in a token at all; it is
/// the wildcard position of open-class phrases.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr, EnumIter)]
#[cfg_attr(not(target_arch = "wasm32"), derive(Arbitrary))]
#[repr(u16)]
pub enum TokenClass {
    End = 0,
    Return,
    Assign,
    Branch,
    LBracket,
    RBracket,
    Semicolon,
    LParen,
    RParen,
    Niladic,
    Function,
    MonadicOperator,
    DyadicOperator,
    Symbol,
    Value,
    PartialIndex,
    Index,
    Void,
    NameList,
    Misc,
}

/// The highest class that may occur in a stored body.
pub const MAX_PERMANENT: TokenClass = TokenClass::Value;

impl TokenClass {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    #[inline]
    pub const fn is_permanent(self) -> bool {
        self.code() <= MAX_PERMANENT.code()
    }

    /// Statement separators, used when rewinding to the start of a statement.
    #[inline]
    pub const fn is_separator(self) -> bool {
        matches!(self, Self::End | Self::Return)
    }
}

impl From<TokenClass> for u16 {
    fn from(val: TokenClass) -> Self {
        val as u16
    }
}

impl TryFrom<u16> for TokenClass {
    type Error = anyhow::Error;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_repr(code).ok_or_else(|| anyhow::anyhow!("invalid token class {code}"))
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::End => write!(f, "END"),
            Self::Return => write!(f, "RET"),
            Self::Assign => write!(f, "←"),
            Self::Branch => write!(f, "→"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Semicolon => write!(f, ";"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Niladic => write!(f, "N"),
            Self::Function => write!(f, "F"),
            Self::MonadicOperator => write!(f, "M"),
            Self::DyadicOperator => write!(f, "D"),
            Self::Symbol => write!(f, "V"),
            Self::Value => write!(f, "B"),
            Self::PartialIndex => write!(f, "P"),
            Self::Index => write!(f, "I"),
            Self::Void => write!(f, "VOID"),
            Self::NameList => write!(f, "L"),
            Self::Misc => write!(f, "X"),
        }
    }
}

/// Which payload variant a token carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    None,
    Function,
    Operator,
    Symbol,
    Value,
    Index,
    Names,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no payload"),
            Self::Function => write!(f, "function"),
            Self::Operator => write!(f, "operator"),
            Self::Symbol => write!(f, "symbol"),
            Self::Value => write!(f, "value"),
            Self::Index => write!(f, "index"),
            Self::Names => write!(f, "name list"),
        }
    }
}

/// A full token tag: class and payload kind. Value tags additionally record
/// whether the value is displayable, committed by an assignment, or a strand
/// still being glued. Note that `Tag` and `TokenClass` live in the same u16
/// namespace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, EnumIter)]
#[cfg_attr(not(target_arch = "wasm32"), derive(Arbitrary))]
#[repr(u16)]
pub enum Tag {
    End = 0b0001_0000_0000_0000,
    Return,
    Assign,
    Branch,
    LBracket,
    RBracket,
    Semicolon,
    LParen,
    RParen,
    Niladic,
    Function,
    MonadicOperator,
    DyadicOperator,
    Symbol,
    Value,
    Committed,
    Strand,
    PartialIndex,
    Index,
    Void,
    NameList,
}

impl Tag {
    pub const fn class(self) -> TokenClass {
        match self {
            Self::End => TokenClass::End,
            Self::Return => TokenClass::Return,
            Self::Assign => TokenClass::Assign,
            Self::Branch => TokenClass::Branch,
            Self::LBracket => TokenClass::LBracket,
            Self::RBracket => TokenClass::RBracket,
            Self::Semicolon => TokenClass::Semicolon,
            Self::LParen => TokenClass::LParen,
            Self::RParen => TokenClass::RParen,
            Self::Niladic => TokenClass::Niladic,
            Self::Function => TokenClass::Function,
            Self::MonadicOperator => TokenClass::MonadicOperator,
            Self::DyadicOperator => TokenClass::DyadicOperator,
            Self::Symbol => TokenClass::Symbol,
            Self::Value | Self::Committed | Self::Strand => TokenClass::Value,
            Self::PartialIndex => TokenClass::PartialIndex,
            Self::Index => TokenClass::Index,
            Self::Void => TokenClass::Void,
            Self::NameList => TokenClass::NameList,
        }
    }

    pub const fn payload_kind(self) -> PayloadKind {
        match self {
            Self::Niladic | Self::Function => PayloadKind::Function,
            Self::MonadicOperator | Self::DyadicOperator => PayloadKind::Operator,
            Self::Symbol => PayloadKind::Symbol,
            Self::Value | Self::Committed | Self::Strand => PayloadKind::Value,
            Self::PartialIndex | Self::Index => PayloadKind::Index,
            Self::NameList => PayloadKind::Names,
            Self::End
            | Self::Return
            | Self::Assign
            | Self::Branch
            | Self::LBracket
            | Self::RBracket
            | Self::Semicolon
            | Self::LParen
            | Self::RParen
            | Self::Void => PayloadKind::None,
        }
    }
}

impl From<Tag> for u16 {
    fn from(val: Tag) -> Self {
        val as u16
    }
}

impl TryFrom<u16> for Tag {
    type Error = anyhow::Error;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_repr(code).ok_or_else(|| anyhow::anyhow!("invalid token tag {code:#06x}"))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value#"),
            Self::Committed => write!(f, "committed#"),
            Self::Strand => write!(f, "strand#"),
            tag => write!(f, "{}#", tag.class()),
        }
    }
}
