//! Primitive functions.
pub mod operator;

use std::fmt;

use strum::{EnumIter, EnumString};

use crate::{
    cont::{Continuation, InputState},
    error::{ApplError, ErrorCode},
    eval::Interpreter,
    function::Applied,
    value::{
        format_value,
        ops::{self, MonadicScalarFn, ScalarFn},
        Scalar, Value, ValueRegistry,
    },
};

pub use operator::PrimOp;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumString, EnumIter)]
pub enum PrimFn {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "×")]
    Times,
    #[strum(serialize = "÷")]
    Divide,
    #[strum(serialize = "⌈")]
    Max,
    #[strum(serialize = "⌊")]
    Min,
    #[strum(serialize = "|")]
    Stile,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "≠")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "≤")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "≥")]
    GreaterEqual,
    #[strum(serialize = "∧")]
    And,
    #[strum(serialize = "∨")]
    Or,
    #[strum(serialize = "~")]
    Tilde,
    #[strum(serialize = "⍳")]
    Iota,
    #[strum(serialize = "⍴")]
    Rho,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = "⌽")]
    Rotate,
    #[strum(serialize = "↑")]
    Take,
    #[strum(serialize = "↓")]
    Drop,
    #[strum(serialize = "⊂")]
    Enclose,
    #[strum(serialize = "⊃")]
    Disclose,
    #[strum(serialize = "≡")]
    Match,
    #[strum(serialize = "⍕")]
    Format,
    #[strum(serialize = "⍎")]
    Execute,
    #[strum(serialize = "⊢")]
    Right,
    #[strum(serialize = "⊣")]
    Left,
    /// Only meaningful as the left operand of `.`
    #[strum(serialize = "∘")]
    Jot,
    #[strum(serialize = "⎕")]
    Quad,
    #[strum(serialize = "⍞")]
    QuoteQuad,
}

impl PrimFn {
    #[inline]
    pub fn is_niladic(self) -> bool {
        matches!(self, Self::Quad | Self::QuoteQuad)
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "×",
            Self::Divide => "÷",
            Self::Max => "⌈",
            Self::Min => "⌊",
            Self::Stile => "|",
            Self::Star => "*",
            Self::Equal => "=",
            Self::NotEqual => "≠",
            Self::Less => "<",
            Self::LessEqual => "≤",
            Self::Greater => ">",
            Self::GreaterEqual => "≥",
            Self::And => "∧",
            Self::Or => "∨",
            Self::Tilde => "~",
            Self::Iota => "⍳",
            Self::Rho => "⍴",
            Self::Comma => ",",
            Self::Rotate => "⌽",
            Self::Take => "↑",
            Self::Drop => "↓",
            Self::Enclose => "⊂",
            Self::Disclose => "⊃",
            Self::Match => "≡",
            Self::Format => "⍕",
            Self::Execute => "⍎",
            Self::Right => "⊢",
            Self::Left => "⊣",
            Self::Jot => "∘",
            Self::Quad => "⎕",
            Self::QuoteQuad => "⍞",
        }
    }

    /// Identity element, used to reduce an empty vector.
    pub fn identity(self) -> Option<Scalar> {
        Some(match self {
            Self::Plus | Self::Minus | Self::Stile | Self::NotEqual | Self::Or => Scalar::Int(0),
            Self::Less | Self::Greater => Scalar::Int(0),
            Self::Times | Self::Divide | Self::Star | Self::Equal | Self::And => Scalar::Int(1),
            Self::LessEqual | Self::GreaterEqual => Scalar::Int(1),
            Self::Max => Scalar::Float(f64::MIN),
            Self::Min => Scalar::Float(f64::MAX),
            _ => return None,
        })
    }

    pub fn dyadic_scalar(self) -> Option<ScalarFn> {
        let f: ScalarFn = match self {
            Self::Plus => add,
            Self::Minus => subtract,
            Self::Times => multiply,
            Self::Divide => divide,
            Self::Max => max,
            Self::Min => min,
            Self::Stile => residue,
            Self::Star => power,
            Self::Equal => equal,
            Self::NotEqual => not_equal,
            Self::Less => less,
            Self::LessEqual => less_equal,
            Self::Greater => greater,
            Self::GreaterEqual => greater_equal,
            Self::And => and,
            Self::Or => or,
            _ => return None,
        };
        Some(f)
    }

    pub fn monadic_scalar(self) -> Option<MonadicScalarFn> {
        let f: MonadicScalarFn = match self {
            Self::Plus => conjugate,
            Self::Minus => negate,
            Self::Times => signum,
            Self::Divide => reciprocal,
            Self::Max => ceiling,
            Self::Min => floor,
            Self::Stile => magnitude,
            Self::Star => exponential,
            Self::Tilde => not,
            _ => return None,
        };
        Some(f)
    }
}

impl fmt::Display for PrimFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

fn number(x: &Scalar) -> Result<f64, ApplError> {
    x.as_f64().ok_or_else(|| ApplError::new(ErrorCode::Domain))
}

fn finite(x: f64) -> Result<Scalar, ApplError> {
    if x.is_finite() {
        Ok(Scalar::from_f64(x))
    } else {
        Err(ErrorCode::Domain.into())
    }
}

fn boolean(b: bool) -> Scalar {
    Scalar::Int(b as i64)
}

fn truth(x: &Scalar) -> Result<bool, ApplError> {
    match x.as_int() {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(ErrorCode::Domain.into()),
    }
}

fn arith(
    x: &Scalar,
    y: &Scalar,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Scalar, ApplError> {
    if let (Scalar::Int(a), Scalar::Int(b)) = (x, y) {
        if let Some(r) = int_op(*a, *b) {
            return Ok(Scalar::Int(r));
        }
    }
    finite(float_op(number(x)?, number(y)?))
}

fn add(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    arith(x, y, i64::checked_add, |a, b| a + b)
}

fn subtract(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    arith(x, y, i64::checked_sub, |a, b| a - b)
}

fn multiply(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    arith(x, y, i64::checked_mul, |a, b| a * b)
}

fn divide(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    let (a, b) = (number(x)?, number(y)?);
    if b == 0.0 {
        return if a == 0.0 {
            Ok(Scalar::Int(1))
        } else {
            Err(ErrorCode::Domain.into())
        };
    }
    finite(a / b)
}

fn max(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(if number(x)? >= number(y)? { x.clone() } else { y.clone() })
}

fn min(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(if number(x)? <= number(y)? { x.clone() } else { y.clone() })
}

/// `A|B`: the remainder of `B` divided by `A`, with the sign of `A`.
fn residue(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    if let (Scalar::Int(a), Scalar::Int(b)) = (x, y) {
        return Ok(Scalar::Int(match *a {
            0 => *b,
            a => {
                let r = b.rem_euclid(a.abs());
                if a < 0 && r != 0 {
                    r + a
                } else {
                    r
                }
            }
        }));
    }
    let (a, b) = (number(x)?, number(y)?);
    if a == 0.0 {
        return Ok(y.clone());
    }
    finite(b - a * (b / a).floor())
}

fn power(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    if let (Scalar::Int(a), Scalar::Int(b)) = (x, y) {
        if let Some(r) = u32::try_from(*b).ok().and_then(|e| a.checked_pow(e)) {
            return Ok(Scalar::Int(r));
        }
    }
    finite(number(x)?.powf(number(y)?))
}

fn compare(x: &Scalar, y: &Scalar, op: fn(f64, f64) -> bool) -> Result<Scalar, ApplError> {
    if x == y {
        return Ok(boolean(op(0.0, 0.0)));
    }
    Ok(boolean(op(number(x)?, number(y)?)))
}

fn equal(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(boolean(x == y))
}

fn not_equal(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(boolean(x != y))
}

fn less(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    compare(x, y, |a, b| a < b)
}

fn less_equal(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    compare(x, y, |a, b| a <= b)
}

fn greater(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    compare(x, y, |a, b| a > b)
}

fn greater_equal(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    compare(x, y, |a, b| a >= b)
}

fn and(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(boolean(truth(x)? && truth(y)?))
}

fn or(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
    Ok(boolean(truth(x)? || truth(y)?))
}

fn conjugate(x: &Scalar) -> Result<Scalar, ApplError> {
    number(x).map(|_| x.clone())
}

fn negate(x: &Scalar) -> Result<Scalar, ApplError> {
    subtract(&Scalar::Int(0), x)
}

fn signum(x: &Scalar) -> Result<Scalar, ApplError> {
    let n = number(x)?;
    Ok(Scalar::Int(if n > 0.0 {
        1
    } else if n < 0.0 {
        -1
    } else {
        0
    }))
}

fn reciprocal(x: &Scalar) -> Result<Scalar, ApplError> {
    divide(&Scalar::Int(1), x)
}

fn ceiling(x: &Scalar) -> Result<Scalar, ApplError> {
    finite(number(x)?.ceil())
}

fn floor(x: &Scalar) -> Result<Scalar, ApplError> {
    finite(number(x)?.floor())
}

fn magnitude(x: &Scalar) -> Result<Scalar, ApplError> {
    match x {
        Scalar::Int(i) => Ok(i
            .checked_abs()
            .map_or(Scalar::Float((*i as f64).abs()), Scalar::Int)),
        _ => finite(number(x)?.abs()),
    }
}

fn exponential(x: &Scalar) -> Result<Scalar, ApplError> {
    finite(number(x)?.exp())
}

fn not(x: &Scalar) -> Result<Scalar, ApplError> {
    Ok(boolean(!truth(x)?))
}

/// 0-based axis from an axis specification.
pub fn axis_index(axis: &Value, io: i64) -> Result<usize, ApplError> {
    let k = axis
        .to_int()
        .map_err(|_| ApplError::new(ErrorCode::Axis))?
        - io;
    usize::try_from(k).map_err(|_| ApplError::new(ErrorCode::Axis))
}

/// Text of a character vector or scalar.
pub fn char_text(b: &Value) -> Result<String, ApplError> {
    if b.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    b.ravel()
        .iter()
        .map(|c| match c {
            Scalar::Char(ch) => Ok(*ch),
            _ => Err(ApplError::new(ErrorCode::Domain)),
        })
        .collect()
}

/// Display lines of a value as a character vector or matrix.
fn format(reg: &mut ValueRegistry, b: &Value, precision: usize) -> Result<Value, ApplError> {
    let text = format_value(b, precision);
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= 1 {
        return Ok(reg.chars(lines.first().copied().unwrap_or("")));
    }
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let cells = lines
        .iter()
        .flat_map(|l| {
            let pad = width - l.chars().count();
            l.chars().chain(std::iter::repeat(' ').take(pad))
        })
        .map(Scalar::Char)
        .collect();
    reg.make(vec![lines.len(), width], cells)
}

fn index_of(reg: &mut ValueRegistry, a: &Value, b: &Value, io: i64) -> Result<Value, ApplError> {
    if a.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let cells = {
        let (ra, rb) = (a.ravel(), b.ravel());
        rb.iter()
            .map(|y| {
                let at = ra.iter().position(|x| x == y).unwrap_or(ra.len());
                Scalar::Int(at as i64 + io)
            })
            .collect()
    };
    reg.make(b.shape().to_vec(), cells)
}

fn without(reg: &mut ValueRegistry, a: &Value, b: &Value) -> Result<Value, ApplError> {
    if a.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let cells = {
        let (ra, rb) = (a.ravel(), b.ravel());
        ra.iter().filter(|x| !rb.contains(x)).cloned().collect()
    };
    Ok(reg.vector(cells))
}

/// `A⊃B`: follows the path `A` into the nested value `B`.
fn pick(reg: &mut ValueRegistry, a: &Value, b: &Value, io: i64) -> Result<Value, ApplError> {
    if a.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let mut current = b.clone();
    for i in a.to_ints()? {
        if current.rank() != 1 {
            return Err(ErrorCode::Rank.into());
        }
        let cell = usize::try_from(i - io)
            .ok()
            .and_then(|p| current.element_at(p))
            .ok_or_else(|| ApplError::new(ErrorCode::Index))?;
        current = ops::scalar_value(reg, &cell);
    }
    Ok(current)
}

/// Applies a primitive function, with an optional axis.
pub fn apply(
    interp: &mut Interpreter,
    p: PrimFn,
    a: Option<Value>,
    b: Value,
    axis: Option<&Value>,
) -> Result<Applied, ApplError> {
    let axis = match axis {
        None => None,
        Some(v) if matches!(p, PrimFn::Comma | PrimFn::Rotate) => {
            Some(axis_index(v, interp.index_origin())?)
        }
        Some(_) => return Err(ErrorCode::Axis.into()),
    };
    match a {
        None => monadic(interp, p, b, axis),
        Some(a) => dyadic(interp, p, a, b, axis).map(Applied::Value),
    }
}

fn monadic(
    interp: &mut Interpreter,
    p: PrimFn,
    b: Value,
    axis: Option<usize>,
) -> Result<Applied, ApplError> {
    if let Some(f) = p.monadic_scalar() {
        return ops::pervade_monadic(&mut interp.values, f, &b).map(Applied::Value);
    }
    let io = interp.index_origin();
    let reg = &mut interp.values;
    let value = match p {
        PrimFn::Iota => ops::iota(reg, b.to_int()?, io)?,
        PrimFn::Rho => ops::shape_of(reg, &b),
        PrimFn::Comma => ops::ravel(reg, &b),
        PrimFn::Rotate => ops::reverse(reg, &b, axis)?,
        PrimFn::Take | PrimFn::Disclose => ops::first(reg, &b),
        PrimFn::Enclose => ops::enclose(reg, &b),
        PrimFn::Match => reg.int(ops::depth(&b)),
        PrimFn::Format => format(reg, &b, interp.settings.print_precision)?,
        PrimFn::Right | PrimFn::Left => b,
        PrimFn::Execute => {
            let text = char_text(&b)?;
            interp.push_execute(&text)?;
            return Ok(Applied::Pushed);
        }
        PrimFn::Jot => return Err(ApplError::syntax("∘ is not a function")),
        _ => return Err(ErrorCode::Valence.into()),
    };
    Ok(Applied::Value(value))
}

fn dyadic(
    interp: &mut Interpreter,
    p: PrimFn,
    a: Value,
    b: Value,
    axis: Option<usize>,
) -> Result<Value, ApplError> {
    if let Some(f) = p.dyadic_scalar() {
        return ops::pervade_dyadic(&mut interp.values, f, &a, &b);
    }
    let io = interp.index_origin();
    let reg = &mut interp.values;
    match p {
        PrimFn::Iota => index_of(reg, &a, &b, io),
        PrimFn::Rho => ops::reshape(reg, &a, &b),
        PrimFn::Comma => ops::catenate(reg, &a, &b, axis),
        PrimFn::Rotate => ops::rotate(reg, &a, &b, axis),
        PrimFn::Take => ops::take_n(reg, &a, &b),
        PrimFn::Drop => ops::drop_n(reg, &a, &b),
        PrimFn::Disclose => pick(reg, &a, &b, io),
        PrimFn::Match => Ok(reg.int(a.matches(&b) as i64)),
        PrimFn::Tilde => without(reg, &a, &b),
        PrimFn::Right => Ok(b),
        PrimFn::Left => Ok(a),
        PrimFn::Jot => Err(ApplError::syntax("∘ is not a function")),
        _ => Err(ErrorCode::Valence.into()),
    }
}

/// Evaluates `⎕` or `⍞`.
pub fn call_niladic(interp: &mut Interpreter, p: PrimFn) -> Result<Applied, ApplError> {
    match p {
        PrimFn::Quad => {
            let line = interp
                .console
                .read_line("⎕: ")
                .ok_or_else(|| ApplError::with_detail(ErrorCode::Value, "no input for ⎕"))?;
            interp.push_execute(&line)?;
            interp.install_continuation(Continuation::Input(InputState))?;
            Ok(Applied::Pushed)
        }
        PrimFn::QuoteQuad => {
            let line = interp
                .console
                .read_line("")
                .ok_or_else(|| ApplError::with_detail(ErrorCode::Value, "no input for ⍞"))?;
            Ok(Applied::Value(interp.values.chars(&line)))
        }
        _ => Err(ErrorCode::Valence.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn glyphs_round_trip() {
        for p in PrimFn::iter() {
            assert_eq!(PrimFn::from_str(p.glyph()).unwrap(), p);
        }
        assert!(PrimFn::from_str("⍤").is_err());
    }

    #[test]
    fn scalar_arithmetic() {
        let div = PrimFn::Divide.dyadic_scalar().unwrap();
        assert_eq!(div(&Scalar::Int(6), &Scalar::Int(3)).unwrap(), Scalar::Int(2));
        assert_eq!(div(&Scalar::Int(0), &Scalar::Int(0)).unwrap(), Scalar::Int(1));
        assert_eq!(
            div(&Scalar::Int(1), &Scalar::Int(0)).unwrap_err().code(),
            ErrorCode::Domain
        );
        let res = PrimFn::Stile.dyadic_scalar().unwrap();
        assert_eq!(res(&Scalar::Int(3), &Scalar::Int(-7)).unwrap(), Scalar::Int(2));
        assert_eq!(res(&Scalar::Int(-3), &Scalar::Int(7)).unwrap(), Scalar::Int(-2));
        let add = PrimFn::Plus.dyadic_scalar().unwrap();
        assert_eq!(
            add(&Scalar::Int(i64::MAX), &Scalar::Int(1)).unwrap(),
            Scalar::Float(i64::MAX as f64 + 1.0)
        );
        let pow = PrimFn::Star.dyadic_scalar().unwrap();
        assert_eq!(pow(&Scalar::Int(2), &Scalar::Int(10)).unwrap(), Scalar::Int(1024));
    }

    #[test]
    fn monadic_scalars() {
        let neg = PrimFn::Minus.monadic_scalar().unwrap();
        assert_eq!(neg(&Scalar::Int(4)).unwrap(), Scalar::Int(-4));
        let sig = PrimFn::Times.monadic_scalar().unwrap();
        assert_eq!(sig(&Scalar::Float(-2.5)).unwrap(), Scalar::Int(-1));
        assert_eq!(sig(&Scalar::Int(0)).unwrap(), Scalar::Int(0));
        let not = PrimFn::Tilde.monadic_scalar().unwrap();
        assert_eq!(not(&Scalar::Int(0)).unwrap(), Scalar::Int(1));
        assert!(not(&Scalar::Int(2)).is_err());
        let conj = PrimFn::Plus.monadic_scalar().unwrap();
        assert!(conj(&Scalar::Char('a')).is_err());
    }

    #[test]
    fn comparisons_accept_characters_for_equality() {
        let eq = PrimFn::Equal.dyadic_scalar().unwrap();
        assert_eq!(eq(&Scalar::Char('a'), &Scalar::Char('a')).unwrap(), Scalar::Int(1));
        let lt = PrimFn::Less.dyadic_scalar().unwrap();
        assert!(lt(&Scalar::Char('a'), &Scalar::Char('b')).is_err());
        assert_eq!(lt(&Scalar::Int(1), &Scalar::Int(2)).unwrap(), Scalar::Int(1));
    }

    #[test]
    fn identities() {
        assert_eq!(PrimFn::Plus.identity(), Some(Scalar::Int(0)));
        assert_eq!(PrimFn::Times.identity(), Some(Scalar::Int(1)));
        assert_eq!(PrimFn::Rho.identity(), None);
    }

    #[test]
    fn format_matrix() {
        let mut reg = ValueRegistry::new();
        let m = reg
            .make(vec![2, 2], [1, 10, 2, 3].map(Scalar::Int).to_vec())
            .unwrap();
        let f = format(&mut reg, &m, 10).unwrap();
        assert_eq!(f.shape(), &[2, 4]);
        assert_eq!(char_text(&ops::ravel(&mut reg, &f)).unwrap(), "1 102  3");
    }
}
