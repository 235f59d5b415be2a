use std::{cmp::Ordering, fmt, fmt::Write};

use nom::{error::ErrorKind, AsBytes, Err, IResult, InputLength};

use crate::{
    error::{ApplError, ErrorCode},
    parser::Span,
};

#[derive(PartialEq, Debug, Clone)]
pub enum ParseErrorKind {
    InvalidChar(char),
    InvalidNumber(String),
    UnterminatedString,
    Nom(ErrorKind),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar(c) => write!(f, "Invalid character {c}"),
            Self::InvalidNumber(text) => write!(f, "Invalid number {text}"),
            Self::UnterminatedString => write!(f, "Unterminated character literal"),
            e => write!(f, "internal parser error {:?}", e),
        }
    }
}

impl ParseErrorKind {
    pub fn is_nom_err(&self) -> bool {
        matches!(self, Self::Nom(_))
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ParseError<I: AsBytes> {
    pub input: I,
    pub expected: Option<&'static str>,
    pub errors: Vec<ParseErrorKind>,
}

impl<I: AsBytes> ParseError<I> {
    pub fn new(input: I, error: ParseErrorKind) -> Self {
        ParseError {
            input,
            expected: None,
            errors: vec![error],
        }
    }

    pub fn throw<A>(input: I, e: ParseErrorKind) -> IResult<I, A, Self> {
        Err(Err::Error(ParseError::new(input, e)))
    }

    pub fn res<A, E, Fun: Fn(E) -> ParseErrorKind>(
        res: Result<A, E>,
        input: I,
        f: Fun,
    ) -> IResult<I, A, Self> {
        match res {
            Ok(a) => Ok((input, a)),
            Err(e) => Err(Err::Error(ParseError::new(input, f(e)))),
        }
    }
}

impl<'a> ParseError<Span<'a>> {
    /// The first error that is not an internal nom error.
    pub fn reported(&self) -> Option<&ParseErrorKind> {
        self.errors.iter().find(|x| !x.is_nom_err())
    }
}

impl<'a> fmt::Display for ParseError<Span<'a>> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = String::new();

        writeln!(
            &mut res,
            "at line {}:{}",
            self.input.location_line(),
            self.input.get_utf8_column()
        )?;
        let line = String::from_utf8_lossy(self.input.get_line_beginning());

        writeln!(&mut res, "{} | {}", self.input.location_line(), line)?;

        let cols = format!("{} | ", self.input.location_line()).len() + self.input.get_utf8_column();
        for _ in 0..(cols - 1) {
            write!(&mut res, " ")?;
        }
        writeln!(&mut res, "^")?;

        if let Some(exp) = self.expected {
            writeln!(&mut res, "Expected {}", exp)?;
        }

        let mut errs = self.errors.iter().filter(|x| !x.is_nom_err()).peekable();
        match errs.peek() {
            None => writeln!(&mut res, "Internal parser error")?,
            Some(_) => {
                writeln!(&mut res, "Reported errors:")?;
                for kind in errs {
                    writeln!(&mut res, "- {}", kind)?;
                }
            }
        }

        write!(f, "{}", res)
    }
}

impl<'a> From<ParseError<Span<'a>>> for ApplError {
    fn from(e: ParseError<Span<'a>>) -> Self {
        let column = e.input.get_utf8_column();
        let detail = match e.reported() {
            Some(kind) => format!("{kind} at column {column}"),
            None => format!("unexpected input at column {column}"),
        };
        ApplError::with_detail(ErrorCode::Syntax, detail)
    }
}

impl<I: AsBytes> nom::error::ParseError<I> for ParseError<I>
where
    I: InputLength,
    I: Clone,
{
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParseError::new(input, ParseErrorKind::Nom(kind))
    }

    fn append(input: I, kind: ErrorKind, mut other: Self) -> Self {
        match input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => ParseError::new(input, ParseErrorKind::Nom(kind)),
            Ordering::Equal => {
                other.errors.push(ParseErrorKind::Nom(kind));
                other
            }
            Ordering::Greater => other,
        }
    }

    fn or(self, mut other: Self) -> Self {
        match self.input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => self,
            Ordering::Equal => {
                for x in self.errors {
                    other.errors.push(x);
                }
                other
            }
            Ordering::Greater => other,
        }
    }
}

impl<I: AsBytes> nom::error::ContextError<I> for ParseError<I>
where
    I: InputLength,
    I: Clone,
{
    fn add_context(input: I, ctx: &'static str, other: Self) -> Self {
        match input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => ParseError {
                input,
                expected: Some(ctx),
                errors: vec![],
            },
            Ordering::Equal => match other.expected {
                None => ParseError {
                    input,
                    expected: Some(ctx),
                    errors: other.errors,
                },
                _ => other,
            },
            Ordering::Greater => other,
        }
    }
}
