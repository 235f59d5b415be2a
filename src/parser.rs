//! Source text to statement bodies.
//!
//! Lines are split into lexemes by [`lexer`], then each statement's tokens
//! are laid out right to left in a [`Body`], followed by an `End` separator.
//! Names are interned as they are met; literals become values right away.
use nom::IResult;
use nom_locate::LocatedSpan;
use tracing::trace;

use crate::{
    error::{ApplError, ErrorCode},
    function::{Function, Operator, UserFunction},
    symbol::{SymbolId, SymbolTable},
    token::{Body, BodyKind, Token},
    value::{Scalar, ValueRegistry},
};

pub mod defn;
pub mod error;
pub mod lexer;
pub mod position;

use error::ParseError;
pub use lexer::{tokenize, Lexeme, Located};
use position::SourcePos;

pub type Span<'a> = LocatedSpan<&'a str>;
pub type ParseResult<'a, T> = IResult<Span<'a>, T, ParseError<Span<'a>>>;

/// Compiles one line of statements separated by `◊`.
///
/// The body ends with `Return` right after the last statement, so the value
/// of that statement is the result of the whole line.
pub fn compile_statements(
    text: &str,
    kind: BodyKind,
    symbols: &mut SymbolTable,
    values: &mut ValueRegistry,
) -> Result<Body, ApplError> {
    let mut body = Body {
        lines: vec![text.to_string()],
        ..Body::default()
    };
    let lexemes = tokenize(text)?;
    let statements: Vec<&[Located]> = lexemes
        .split(|l| l.lexeme == Lexeme::Diamond)
        .collect();
    let last = statements.len() - 1;
    for (n, statement) in statements.into_iter().enumerate() {
        let end = if n == last { Token::Return } else { Token::End };
        push_statement(&mut body, statement, 0, 0, symbols, values)?;
        let column = statement.last().map_or(0, |l| l.column + 1);
        body.push(end, SourcePos::new(0, column));
    }
    trace!("{kind:?} body of {} tokens", body.len());
    Ok(body)
}

/// Compiles a ∇ definition: a header line, then one line per function line.
/// A leading or trailing `∇` is ignored.
pub fn compile_function(
    text: &str,
    symbols: &mut SymbolTable,
    values: &mut ValueRegistry,
) -> Result<UserFunction, ApplError> {
    let mut lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.last().is_some_and(|l| l.trim() == "∇") {
        lines.pop();
    }
    if lines.first().is_some_and(|l| l.trim() == "∇") {
        lines.remove(0);
    }
    let Some((header_line, body_lines)) = lines.split_first() else {
        return Err(ApplError::with_detail(ErrorCode::Defn, "empty definition"));
    };
    let header = defn::parse_header(header_line)?;

    let mut intern = |name: &Option<String>| -> Result<Option<SymbolId>, ApplError> {
        name.as_deref().map(|n| symbols.intern(n)).transpose()
    };
    let result = intern(&header.result)?;
    let left = intern(&header.left)?;
    let right = intern(&header.right)?;
    let left_operand = intern(&header.left_operand)?;
    let right_operand = intern(&header.right_operand)?;
    let name = symbols.intern(&header.name)?;
    let locals = header
        .locals
        .iter()
        .map(|l| symbols.intern(l))
        .collect::<Result<Vec<_>, _>>()?;

    let mut body = Body {
        lines: vec![header_line.trim().trim_start_matches('∇').to_string()],
        ..Body::default()
    };
    for (n, line) in body_lines.iter().enumerate() {
        let line_no = n + 1;
        let line = line.trim_end_matches('∇');
        body.lines.push(line.to_string());
        body.line_starts.push(body.len());

        let (source, offset) = match defn::split_label(line) {
            Some((label, at)) => {
                let id = symbols.intern(&label)?;
                body.labels.push((id, line_no));
                (&line[at..], line[..at].chars().count())
            }
            None => (line, 0),
        };
        let lexemes = tokenize(source).map_err(|e| {
            let mut err = ApplError::from(e);
            err.detail = err.detail.map(|d| format!("{d} on line {line_no}"));
            err
        })?;
        for statement in lexemes.split(|l| l.lexeme == Lexeme::Diamond) {
            push_statement(&mut body, statement, line_no, offset, symbols, values)?;
            let column = statement.last().map_or(offset, |l| l.column + offset + 1);
            body.push(Token::End, SourcePos::new(line_no, column));
        }
    }
    let end = SourcePos::new(body_lines.len(), 0);
    body.push(Token::Return, end);

    Ok(UserFunction {
        name,
        name_text: header.name,
        result,
        left,
        right,
        left_operand,
        right_operand,
        locals,
        body: body.into(),
    })
}

/// Pushes the tokens of one statement, right-most first.
fn push_statement(
    body: &mut Body,
    statement: &[Located],
    line: usize,
    offset: usize,
    symbols: &mut SymbolTable,
    values: &mut ValueRegistry,
) -> Result<(), ApplError> {
    let mut tokens = vec![];
    let mut lexemes = statement.iter().peekable();
    while let Some(located) = lexemes.next() {
        let pos = SourcePos::new(line, located.column + offset);
        let token = match &located.lexeme {
            Lexeme::Number(n) => {
                let mut cells = vec![n.clone()];
                while let Some(Located {
                    lexeme: Lexeme::Number(m),
                    ..
                }) = lexemes.peek()
                {
                    cells.push(m.clone());
                    lexemes.next();
                }
                if cells.len() == 1 {
                    Token::value(values.scalar(cells.remove(0)))
                } else {
                    Token::value(values.vector(cells))
                }
            }
            Lexeme::Chars(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Token::value(values.scalar(Scalar::Char(c))),
                    _ => Token::value(values.chars(s)),
                }
            }
            Lexeme::Name(name) | Lexeme::Quad(name) => Token::Symbol(symbols.intern(name)?),
            Lexeme::Function(f) => Token::Function(Function::Primitive(*f)),
            Lexeme::Operator(op) => Token::Operator(Operator::Primitive {
                op: *op,
                axis: None,
            }),
            Lexeme::Assign => Token::Assign,
            Lexeme::Branch => Token::Branch,
            Lexeme::LBracket => Token::LBracket,
            Lexeme::RBracket => Token::RBracket,
            Lexeme::Semicolon => Token::Semicolon,
            Lexeme::LParen => Token::LParen,
            Lexeme::RParen => Token::RParen,
            Lexeme::Diamond => return Err(ApplError::assertion("◊ inside a statement")),
        };
        tokens.push((token, pos));
    }
    for (token, pos) in tokens.into_iter().rev() {
        body.push(token, pos);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TokenClass;

    fn setup() -> (SymbolTable, ValueRegistry) {
        let mut values = ValueRegistry::new();
        let symbols = SymbolTable::new(100, 1, &mut values);
        (symbols, values)
    }

    fn classes(body: &Body) -> Vec<TokenClass> {
        body.tokens.iter().map(Token::class).collect()
    }

    #[test]
    fn statements_are_reversed() {
        let (mut symbols, mut values) = setup();
        let body =
            compile_statements("A←1 2 3 ◊ +/A", BodyKind::Immediate, &mut symbols, &mut values)
                .unwrap();
        assert_eq!(
            classes(&body),
            vec![
                TokenClass::Value,
                TokenClass::Assign,
                TokenClass::Symbol,
                TokenClass::End,
                TokenClass::Symbol,
                TokenClass::MonadicOperator,
                TokenClass::Function,
                TokenClass::Return,
            ]
        );
        assert_eq!(body.tokens[0].as_value().unwrap().shape(), &[3]);
        assert_eq!(body.positions[0], SourcePos::new(0, 2));
        assert_eq!(body.positions[6], SourcePos::new(0, 10));
    }

    #[test]
    fn empty_line_is_a_bare_return() {
        let (mut symbols, mut values) = setup();
        let body =
            compile_statements("  ⍝ nothing", BodyKind::Immediate, &mut symbols, &mut values)
                .unwrap();
        assert_eq!(classes(&body), vec![TokenClass::Return]);
    }

    #[test]
    fn character_literals() {
        let (mut symbols, mut values) = setup();
        let body = compile_statements("'a' 'bc'", BodyKind::Execute, &mut symbols, &mut values)
            .unwrap();
        assert!(body.tokens[0].as_value().unwrap().rank() == 1);
        assert!(body.tokens[1].as_value().unwrap().is_scalar());
    }

    #[test]
    fn syntax_errors() {
        let (mut symbols, mut values) = setup();
        let err = compile_statements("1 + 'x", BodyKind::Immediate, &mut symbols, &mut values)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Syntax);
    }

    #[test]
    fn function_lines_and_labels() {
        let (mut symbols, mut values) = setup();
        let text = "∇Z←COUNT N\nZ←0\nLOOP:Z←Z+1 ◊ →(Z<N)/LOOP\n∇";
        let f = compile_function(text, &mut symbols, &mut values).unwrap();
        assert_eq!(f.name_text, "COUNT");
        assert!(f.result.is_some() && f.right.is_some() && f.left.is_none());
        assert_eq!(f.body.line_count(), 2);
        assert_eq!(f.body.line_starts, vec![0, 4]);
        let label = symbols.lookup("LOOP").unwrap();
        assert_eq!(f.body.labels, vec![(label, 2)]);
        assert_eq!(f.body.lines[2], "LOOP:Z←Z+1 ◊ →(Z<N)/LOOP");
        // `Z` right after the label keeps its column in the full line
        let z = f.body.line_starts[1] + 4;
        assert_eq!(f.body.tokens[z].class(), TokenClass::Symbol);
        assert_eq!(f.body.positions[z], SourcePos::new(2, 5));
        assert_eq!(f.body.tokens.last().map(Token::class), Some(TokenClass::Return));
    }

    #[test]
    fn bad_definitions() {
        let (mut symbols, mut values) = setup();
        for text in ["∇", "∇1 F B\nZ←B"] {
            let err = compile_function(text, &mut symbols, &mut values).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Defn, "{text}");
        }
    }
}
