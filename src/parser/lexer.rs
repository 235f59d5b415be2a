//! Lexemes of one source line.
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{anychar, char, digit0, digit1, multispace1, none_of, one_of, satisfy},
    combinator::{map, opt, recognize, rest, value},
    error::context,
    multi::many0,
    sequence::{pair, preceded, tuple},
    Err,
};

use crate::{
    parser::{
        error::{ParseError, ParseErrorKind},
        ParseResult, Span,
    },
    primitive::{PrimFn, PrimOp},
    value::Scalar,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Lexeme {
    Number(Scalar),
    /// A quoted character literal, `''` unescaped
    Chars(String),
    Name(String),
    /// `⎕`, `⍞` or a `⎕NAME` system name
    Quad(String),
    Function(PrimFn),
    Operator(PrimOp),
    Assign,
    Branch,
    LBracket,
    RBracket,
    Semicolon,
    LParen,
    RParen,
    Diamond,
}

/// A lexeme and the character column it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub lexeme: Lexeme,
    pub column: usize,
}

pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '∆' | '⍙')
}

pub fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '¯'
}

pub fn parse_comment(i: Span<'_>) -> ParseResult<'_, Span<'_>> {
    preceded(tag("⍝"), rest)(i)
}

pub fn parse_space(i: Span<'_>) -> ParseResult<'_, Vec<Span<'_>>> {
    many0(alt((multispace1, parse_comment)))(i)
}

pub fn parse_name(i: Span<'_>) -> ParseResult<'_, String> {
    let (i, name) = recognize(pair(satisfy(is_name_start), take_while(is_name_char)))(i)?;
    Ok((i, name.fragment().to_string()))
}

fn parse_quad(i: Span<'_>) -> ParseResult<'_, Lexeme> {
    let (i, name) = alt((
        recognize(pair(char('⎕'), take_while(|c: char| c.is_ascii_alphabetic()))),
        recognize(char('⍞')),
    ))(i)?;
    Ok((i, Lexeme::Quad(name.fragment().to_uppercase())))
}

/// `¯1`, `2.5`, `.5`, `1E¯3`
pub fn parse_number(from: Span<'_>) -> ParseResult<'_, Scalar> {
    let (i, text) = context(
        "number",
        recognize(tuple((
            opt(char('¯')),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(char('¯')), digit1))),
        ))),
    )(from)?;
    let normal = text.fragment().replace('¯', "-");
    let parsed = if normal.contains(['.', 'e', 'E']) {
        normal.parse::<f64>().map(Scalar::from_f64)
    } else {
        match normal.parse::<i64>() {
            Ok(n) => Ok(Scalar::Int(n)),
            Err(_) => normal.parse::<f64>().map(Scalar::Float),
        }
    };
    ParseError::res(parsed, i, |_| {
        ParseErrorKind::InvalidNumber(text.fragment().to_string())
    })
}

/// `'it''s'`
pub fn parse_chars(from: Span<'_>) -> ParseResult<'_, String> {
    let (i, _) = char('\'')(from)?;
    let (i, chars) = many0(alt((value('\'', tag("''")), none_of("'"))))(i)?;
    match char::<_, ParseError<Span<'_>>>('\'')(i) {
        Ok((i, _)) => Ok((i, chars.into_iter().collect())),
        Err(_) => Err(Err::Failure(ParseError::new(
            from,
            ParseErrorKind::UnterminatedString,
        ))),
    }
}

fn parse_punctuation(i: Span<'_>) -> ParseResult<'_, Lexeme> {
    alt((
        value(Lexeme::Assign, char('←')),
        value(Lexeme::Branch, char('→')),
        value(Lexeme::LBracket, char('[')),
        value(Lexeme::RBracket, char(']')),
        value(Lexeme::Semicolon, char(';')),
        value(Lexeme::LParen, char('(')),
        value(Lexeme::RParen, char(')')),
        value(Lexeme::Diamond, char('◊')),
    ))(i)
}

fn parse_glyph(from: Span<'_>) -> ParseResult<'_, Lexeme> {
    let (i, c) = anychar(from)?;
    let glyph = c.to_string();
    if let Ok(f) = PrimFn::from_str(&glyph) {
        Ok((i, Lexeme::Function(f)))
    } else if let Ok(op) = PrimOp::from_str(&glyph) {
        Ok((i, Lexeme::Operator(op)))
    } else {
        Err(Err::Failure(ParseError::new(
            from,
            ParseErrorKind::InvalidChar(c),
        )))
    }
}

pub fn parse_lexeme(i: Span<'_>) -> ParseResult<'_, Lexeme> {
    alt((
        map(parse_number, Lexeme::Number),
        map(parse_chars, Lexeme::Chars),
        parse_quad,
        map(parse_name, Lexeme::Name),
        parse_punctuation,
        parse_glyph,
    ))(i)
}

/// Splits one line into lexemes. Comments and blanks are dropped.
pub fn tokenize(line: &str) -> Result<Vec<Located>, ParseError<Span<'_>>> {
    let mut lexemes = vec![];
    let mut i = Span::new(line);
    loop {
        let (rest, _) = parse_space(i).map_err(unwrap_err(i))?;
        if rest.fragment().is_empty() {
            return Ok(lexemes);
        }
        let column = rest.get_utf8_column() - 1;
        let (rest, lexeme) = parse_lexeme(rest).map_err(unwrap_err(rest))?;
        lexemes.push(Located { lexeme, column });
        i = rest;
    }
}

fn unwrap_err<'a>(at: Span<'a>) -> impl FnOnce(Err<ParseError<Span<'a>>>) -> ParseError<Span<'a>> {
    move |e| match e {
        Err::Error(e) | Err::Failure(e) => e,
        Err::Incomplete(_) => ParseError::new(at, ParseErrorKind::Nom(nom::error::ErrorKind::Eof)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn lexemes(line: &str) -> Vec<Lexeme> {
        tokenize(line)
            .unwrap()
            .into_iter()
            .map(|l| l.lexeme)
            .collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lexemes("1 ¯2 3.5 .5 1E3 2e¯1"),
            vec![
                Lexeme::Number(Scalar::Int(1)),
                Lexeme::Number(Scalar::Int(-2)),
                Lexeme::Number(Scalar::Float(3.5)),
                Lexeme::Number(Scalar::Float(0.5)),
                Lexeme::Number(Scalar::Int(1000)),
                Lexeme::Number(Scalar::Float(0.2)),
            ]
        );
    }

    #[test]
    fn names_glyphs_and_comments() {
        assert_eq!(
            lexemes("Z←A+.×⎕io ⍝ comment"),
            vec![
                Lexeme::Name("Z".into()),
                Lexeme::Assign,
                Lexeme::Name("A".into()),
                Lexeme::Function(PrimFn::Plus),
                Lexeme::Operator(PrimOp::Dot),
                Lexeme::Function(PrimFn::Times),
                Lexeme::Quad("⎕IO".into()),
            ]
        );
        assert_eq!(lexemes("⍝ only a comment"), vec![]);
    }

    #[test]
    fn character_literals() {
        assert_eq!(
            lexemes("'it''s' ''"),
            vec![Lexeme::Chars("it's".into()), Lexeme::Chars(String::new())]
        );
    }

    #[test]
    fn columns_count_characters() {
        let located = tokenize("⍳3 ◊ A[1]").unwrap();
        let columns: Vec<usize> = located.iter().map(|l| l.column).collect();
        assert_eq!(columns, vec![0, 1, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn errors() {
        let err = tokenize("1 + 'abc").unwrap_err();
        assert_eq!(err.reported(), Some(&ParseErrorKind::UnterminatedString));
        let err = tokenize("2 $ 3").unwrap_err();
        expect![[r#"
            at line 1:3
            1 | 2 $ 3
                  ^
            Reported errors:
            - Invalid character $
        "#]]
        .assert_eq(&err.to_string());
    }
}
