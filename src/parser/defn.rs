//! ∇ definitions: headers and line labels.
use nom::{
    character::complete::{char, space0},
    sequence::{delimited, terminated},
};

use crate::{
    error::{ApplError, ErrorCode},
    parser::{
        lexer::{parse_name, tokenize, Lexeme},
        ParseResult, Span,
    },
};

/// The names of a ∇ header `[Z←][A] F [B]` or `[Z←][A] (LO OP [RO]) [B]`,
/// followed by `;LOCAL` names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub result: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub left_operand: Option<String>,
    pub right_operand: Option<String>,
    pub locals: Vec<String>,
}

fn defn_error(detail: impl Into<String>) -> ApplError {
    ApplError::with_detail(ErrorCode::Defn, detail)
}

enum Item {
    Name(String),
    Group(Vec<String>),
}

pub fn parse_header(line: &str) -> Result<Header, ApplError> {
    let line = line.trim().trim_start_matches('∇');
    let lexemes: Vec<Lexeme> = tokenize(line)
        .map_err(|e| defn_error(ApplError::from(e).detail.unwrap_or_default()))?
        .into_iter()
        .map(|l| l.lexeme)
        .collect();
    let mut parts = lexemes.split(|l| *l == Lexeme::Semicolon);
    let signature = parts.next().unwrap_or_default();
    let mut locals = vec![];
    for part in parts {
        match part {
            [Lexeme::Name(name)] => locals.push(name.clone()),
            _ => return Err(defn_error("bad local name list")),
        }
    }

    let mut header = Header {
        locals,
        ..Header::default()
    };
    let signature = match signature {
        [Lexeme::Name(z), Lexeme::Assign, rest @ ..] => {
            header.result = Some(z.clone());
            rest
        }
        rest => rest,
    };

    let mut items = vec![];
    let mut lexemes = signature.iter();
    while let Some(lexeme) = lexemes.next() {
        match lexeme {
            Lexeme::Name(name) => items.push(Item::Name(name.clone())),
            Lexeme::LParen => {
                let mut group = vec![];
                loop {
                    match lexemes.next() {
                        Some(Lexeme::Name(name)) => group.push(name.clone()),
                        Some(Lexeme::RParen) => break,
                        _ => return Err(defn_error("bad operator header")),
                    }
                }
                items.push(Item::Group(group));
            }
            _ => return Err(defn_error("bad function header")),
        }
    }

    match items.as_slice() {
        [Item::Name(f)] => header.name = f.clone(),
        [Item::Name(f), Item::Name(b)] => {
            header.name = f.clone();
            header.right = Some(b.clone());
        }
        [Item::Name(a), Item::Name(f), Item::Name(b)] => {
            header.left = Some(a.clone());
            header.name = f.clone();
            header.right = Some(b.clone());
        }
        [Item::Group(g), Item::Name(b)] => {
            operator_group(&mut header, g)?;
            header.right = Some(b.clone());
        }
        [Item::Name(a), Item::Group(g), Item::Name(b)] => {
            header.left = Some(a.clone());
            operator_group(&mut header, g)?;
            header.right = Some(b.clone());
        }
        _ => return Err(defn_error("bad function header")),
    }
    Ok(header)
}

fn operator_group(header: &mut Header, group: &[String]) -> Result<(), ApplError> {
    match group {
        [lo, op] => {
            header.left_operand = Some(lo.clone());
            header.name = op.clone();
        }
        [lo, op, ro] => {
            header.left_operand = Some(lo.clone());
            header.name = op.clone();
            header.right_operand = Some(ro.clone());
        }
        _ => return Err(defn_error("bad operator header")),
    }
    Ok(())
}

fn parse_label(i: Span<'_>) -> ParseResult<'_, String> {
    delimited(space0, terminated(parse_name, space0), char(':'))(i)
}

/// A leading `NAME:` label of a function line: the name and the byte offset
/// where the statements start.
pub fn split_label(line: &str) -> Option<(String, usize)> {
    let (rest, name) = parse_label(Span::new(line)).ok()?;
    Some((name, rest.location_offset()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_headers() {
        let h = parse_header("∇Z←A PLUS B;T;U").unwrap();
        assert_eq!(h.name, "PLUS");
        assert_eq!(h.result.as_deref(), Some("Z"));
        assert_eq!(h.left.as_deref(), Some("A"));
        assert_eq!(h.right.as_deref(), Some("B"));
        assert_eq!(h.locals, vec!["T".to_string(), "U".to_string()]);

        let h = parse_header("NILADIC").unwrap();
        assert_eq!(h.name, "NILADIC");
        assert!(h.right.is_none() && h.result.is_none());
    }

    #[test]
    fn operator_headers() {
        let h = parse_header("Z←(F TWICE) B").unwrap();
        assert_eq!(h.name, "TWICE");
        assert_eq!(h.left_operand.as_deref(), Some("F"));
        assert!(h.right_operand.is_none());

        let h = parse_header("Z←A (F AND G) B").unwrap();
        assert_eq!(h.name, "AND");
        assert_eq!(h.right_operand.as_deref(), Some("G"));
        assert_eq!(h.left.as_deref(), Some("A"));
    }

    #[test]
    fn bad_headers() {
        for bad in ["", "Z←", "A B C D", "(F) B", "Z←F B;1", "F+B"] {
            let err = parse_header(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Defn, "{bad}");
        }
    }

    #[test]
    fn labels() {
        assert_eq!(split_label("LOOP: →LOOP"), Some(("LOOP".to_string(), 5)));
        assert_eq!(split_label(" L1 :X←1"), Some(("L1".to_string(), 5)));
        assert_eq!(split_label("X←1"), None);
    }
}
