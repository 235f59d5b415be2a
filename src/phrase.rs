//! The phrase table of the prefix reducer.
//!
//! Each phrase is a pattern of up to four token classes, leftmost first, with
//! a binding priority and the action that reduces it. Phrases are found by a
//! hash of their pattern: `key = key * 32 + (class + 1)` over the classes,
//! leftmost first, taken modulo the smallest modulus that maps every phrase to
//! its own slot. The table is built at compile time and the build fails if no
//! modulus up to [`MAX_MODULUS`] is collision-free.
use std::fmt;

use crate::tag::TokenClass::{self, *};

pub const MAX_PHRASE_LEN: usize = 4;
pub const MAX_MODULUS: usize = 256;

const EMPTY_SLOT: u8 = u8::MAX;

/// How strongly a token binds to its right neighbour. A matched phrase is
/// deferred when the lookahead binds strictly stronger than the phrase's own
/// priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingStrength {
    None = 0,
    AssB,
    FB,
    AF,
    LoOp,
    ValVal,
    OpRo,
    VAss,
    AnyBra,
}

/// What a reduction does with the matched tokens.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    DyadicCall,
    MonadicCall,
    Glue,
    DeriveMonadic,
    DeriveDyadic,
    Axis,
    Index,
    OpenIndex,
    PartialIndex,
    Group,
    Assign,
    IndexedAssign,
    VectorAssign,
    NameList,
    Branch,
    End,
    Return,
}

#[derive(Debug, Clone, Copy)]
pub struct Phrase {
    pub pattern: [TokenClass; MAX_PHRASE_LEN],
    pub len: usize,
    pub priority: BindingStrength,
    /// Open-class phrase: the leftmost position matches any class and is
    /// pushed back unreduced
    pub misc: bool,
    pub action: Action,
}

impl Phrase {
    const fn new(classes: &[TokenClass], priority: BindingStrength, action: Action) -> Self {
        let mut pattern = [End; MAX_PHRASE_LEN];
        let mut i = 0;
        while i < classes.len() {
            pattern[i] = classes[i];
            i += 1;
        }
        Self {
            pattern,
            len: classes.len(),
            priority,
            misc: matches!(classes[0], Misc),
            action,
        }
    }

    #[inline]
    pub fn classes(&self) -> &[TokenClass] {
        &self.pattern[..self.len]
    }

    const fn key(&self) -> usize {
        key_of(&self.pattern, self.len)
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, class) in self.classes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{class}")?;
        }
        Ok(())
    }
}

const fn key_of(classes: &[TokenClass], len: usize) -> usize {
    let mut key = 0;
    let mut i = 0;
    while i < len {
        key = key * 32 + classes[i] as usize + 1;
        i += 1;
    }
    key
}

use Action as A;
use BindingStrength as S;

const PHRASE_LIST: [Phrase; 34] = [
    Phrase::new(&[Value, Function, Value], S::AF, A::DyadicCall),
    Phrase::new(&[Misc, Function, Value], S::FB, A::MonadicCall),
    Phrase::new(&[Value, Value], S::ValVal, A::Glue),
    Phrase::new(&[Function, MonadicOperator], S::LoOp, A::DeriveMonadic),
    Phrase::new(&[Value, MonadicOperator], S::LoOp, A::DeriveMonadic),
    Phrase::new(&[Function, DyadicOperator, Function], S::LoOp, A::DeriveDyadic),
    Phrase::new(&[Function, DyadicOperator, Value], S::LoOp, A::DeriveDyadic),
    Phrase::new(&[Function, Index], S::AnyBra, A::Axis),
    Phrase::new(&[MonadicOperator, Index], S::AnyBra, A::Axis),
    Phrase::new(&[Value, Index], S::AnyBra, A::Index),
    Phrase::new(&[LBracket, Value, RBracket], S::AnyBra, A::OpenIndex),
    Phrase::new(&[LBracket, RBracket], S::AnyBra, A::OpenIndex),
    Phrase::new(&[LBracket, Value, PartialIndex], S::AnyBra, A::OpenIndex),
    Phrase::new(&[LBracket, PartialIndex], S::AnyBra, A::OpenIndex),
    Phrase::new(&[Semicolon, Value, RBracket], S::AnyBra, A::PartialIndex),
    Phrase::new(&[Semicolon, RBracket], S::AnyBra, A::PartialIndex),
    Phrase::new(&[Semicolon, Value, PartialIndex], S::AnyBra, A::PartialIndex),
    Phrase::new(&[Semicolon, PartialIndex], S::AnyBra, A::PartialIndex),
    Phrase::new(&[LParen, Value, RParen], S::AnyBra, A::Group),
    Phrase::new(&[LParen, Function, RParen], S::AnyBra, A::Group),
    Phrase::new(&[LParen, Symbol, RParen], S::AnyBra, A::Group),
    Phrase::new(&[LParen, NameList, RParen], S::AnyBra, A::Group),
    Phrase::new(&[Symbol, Assign, Value], S::VAss, A::Assign),
    Phrase::new(&[Symbol, Index, Assign, Value], S::VAss, A::IndexedAssign),
    Phrase::new(&[NameList, Assign, Value], S::VAss, A::VectorAssign),
    Phrase::new(&[Symbol, Symbol], S::VAss, A::NameList),
    Phrase::new(&[Symbol, NameList], S::VAss, A::NameList),
    Phrase::new(&[Branch, Value], S::AssB, A::Branch),
    Phrase::new(&[End, Value], S::AssB, A::End),
    Phrase::new(&[End, Void], S::AssB, A::End),
    Phrase::new(&[End], S::AssB, A::End),
    Phrase::new(&[Return, Value], S::AssB, A::Return),
    Phrase::new(&[Return, Void], S::AssB, A::Return),
    Phrase::new(&[Return], S::AssB, A::Return),
];

pub struct PhraseTable {
    modulus: usize,
    slots: [u8; MAX_MODULUS],
    phrases: &'static [Phrase],
}

impl PhraseTable {
    const fn build(phrases: &'static [Phrase]) -> Self {
        let mut modulus = phrases.len();
        while modulus <= MAX_MODULUS {
            let mut slots = [EMPTY_SLOT; MAX_MODULUS];
            let mut ok = true;
            let mut i = 0;
            while i < phrases.len() {
                let slot = phrases[i].key() % modulus;
                if slots[slot] != EMPTY_SLOT {
                    ok = false;
                    break;
                }
                slots[slot] = i as u8;
                i += 1;
            }
            if ok {
                return Self {
                    modulus,
                    slots,
                    phrases,
                };
            }
            modulus += 1;
        }
        panic!("no collision-free modulus for the phrase table")
    }

    #[inline]
    pub fn modulus(&self) -> usize {
        self.modulus
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// The phrase whose pattern is exactly `classes`, leftmost first.
    pub fn lookup(&self, classes: &[TokenClass]) -> Option<&'static Phrase> {
        if classes.is_empty() || classes.len() > MAX_PHRASE_LEN {
            return None;
        }
        let slot = self.slots[key_of(classes, classes.len()) % self.modulus];
        if slot == EMPTY_SLOT {
            return None;
        }
        let phrase = &self.phrases[slot as usize];
        (phrase.classes() == classes).then_some(phrase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Phrase> {
        self.phrases.iter()
    }
}

pub static PHRASES: PhraseTable = PhraseTable::build(&PHRASE_LIST);

/// Binding strength between the lookahead class `look` and the class `left`
/// at the left edge of the matched phrase.
pub fn binding(look: TokenClass, left: TokenClass) -> BindingStrength {
    if matches!(
        left,
        End | Return | LParen | LBracket | Semicolon | Branch | Assign
    ) {
        return S::None;
    }
    match (look, left) {
        // a closed group or index left of a function is its left argument
        (RBracket | RParen, Function) => S::AF,
        (RBracket | RParen | Index | PartialIndex, _) => S::AnyBra,
        (Value | Niladic, Value) => S::ValVal,
        (Value | Niladic, Function) => S::AF,
        (DyadicOperator, Function | Value) => S::OpRo,
        (Assign, _) => S::AssB,
        _ => S::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn smallest_modulus() {
        expect!["125"].assert_eq(&PHRASES.modulus().to_string());
        assert_eq!(PHRASES.len(), 34);
    }

    #[test]
    fn every_phrase_is_found() {
        for phrase in PHRASES.iter() {
            let found = PHRASES.lookup(phrase.classes()).unwrap();
            assert_eq!(found.action, phrase.action);
            assert_eq!(found.len, phrase.len);
        }
    }

    #[test]
    fn unknown_patterns_miss() {
        assert!(PHRASES.lookup(&[Function, Value]).is_none());
        assert!(PHRASES.lookup(&[Value]).is_none());
        assert!(PHRASES.lookup(&[]).is_none());
        assert!(PHRASES
            .lookup(&[Value, Value, Value, Value, Value])
            .is_none());
    }

    #[test]
    fn open_class_phrase() {
        let phrase = PHRASES.lookup(&[Misc, Function, Value]).unwrap();
        assert!(phrase.misc);
        assert_eq!(phrase.action, Action::MonadicCall);
        assert_eq!(phrase.to_string(), "X F B");
    }

    #[test]
    fn binding_strengths() {
        assert_eq!(binding(Value, Value), S::ValVal);
        assert_eq!(binding(Index, Function), S::AnyBra);
        assert_eq!(binding(RParen, Value), S::AnyBra);
        assert_eq!(binding(RParen, Function), S::AF);
        assert_eq!(binding(RBracket, Function), S::AF);
        // still defers a monadic call, but not an operator derivation
        assert!(binding(RParen, Function) > S::FB);
        assert!(binding(RBracket, Function) < S::LoOp);
        assert_eq!(binding(Function, Value), S::None);
        assert_eq!(binding(RParen, LParen), S::None);
        assert!(binding(DyadicOperator, Function) > S::FB);
    }
}
