//! Functions, operators and their operands, as carried by tokens and bindings.
use std::{collections::HashSet, fmt, rc::Rc};

use crate::{
    error::{ApplError, ErrorCode},
    eval::Interpreter,
    primitive::{self, operator},
    symbol::{mark_value, SymbolId},
    token::Body,
    value::Value,
};

pub use crate::primitive::{PrimFn, PrimOp};

/// Outcome of applying a function.
#[derive(Debug, Clone)]
pub enum Applied {
    Value(Value),
    /// The function returned no result
    Void,
    /// A nested context was pushed; the result arrives through it
    Pushed,
}

/// A function or array operand of an operator.
#[derive(Debug, Clone)]
pub enum Operand {
    Function(Function),
    Value(Value),
}

impl Operand {
    pub fn as_function(&self) -> Result<&Function, ApplError> {
        match self {
            Self::Function(f) => Ok(f),
            Self::Value(_) => Err(ErrorCode::Domain.into()),
        }
    }

    fn mark_values(&self, seen: &mut HashSet<u64>) {
        match self {
            Self::Function(f) => f.mark_values(seen),
            Self::Value(v) => mark_value(v, seen),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => write!(f, "{func}"),
            Self::Value(v) => write!(f, "{v:?}"),
        }
    }
}

/// A ∇-defined function or operator.
#[derive(Debug)]
pub struct UserFunction {
    pub name: SymbolId,
    pub name_text: String,
    pub result: Option<SymbolId>,
    pub left: Option<SymbolId>,
    pub right: Option<SymbolId>,
    pub left_operand: Option<SymbolId>,
    pub right_operand: Option<SymbolId>,
    pub locals: Vec<SymbolId>,
    pub body: Rc<Body>,
}

impl UserFunction {
    #[inline]
    pub fn is_operator(&self) -> bool {
        self.left_operand.is_some()
    }

    pub fn is_niladic(&self) -> bool {
        !self.is_operator() && self.left.is_none() && self.right.is_none()
    }

    /// Every name a call shadows: header names, locals and labels.
    pub fn localized_names(&self) -> Vec<SymbolId> {
        [
            self.result,
            self.left,
            self.right,
            self.left_operand,
            self.right_operand,
        ]
        .into_iter()
        .flatten()
        .chain(self.locals.iter().copied())
        .chain(self.body.labels.iter().map(|(id, _)| *id))
        .collect()
    }

    pub fn text(&self) -> &[String] {
        &self.body.lines
    }
}

/// Arguments of a user function call, kept by the context for retry.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub left: Option<Value>,
    pub right: Option<Value>,
    pub left_operand: Option<Operand>,
    pub right_operand: Option<Operand>,
}

impl CallArgs {
    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        for v in self.left.iter().chain(self.right.iter()) {
            mark_value(v, seen);
        }
        for op in self.left_operand.iter().chain(self.right_operand.iter()) {
            op.mark_values(seen);
        }
    }
}

/// An operator bound to its operands.
#[derive(Debug)]
pub struct Derived {
    pub operator: Operator,
    pub left: Operand,
    pub right: Option<Operand>,
}

#[derive(Debug, Clone)]
pub enum Function {
    Primitive(PrimFn),
    User(Rc<UserFunction>),
    Derived(Rc<Derived>),
    /// A primitive with an axis specification, `F[k]`
    Axis { function: Rc<Function>, axis: Value },
}

impl Function {
    pub fn is_niladic(&self) -> bool {
        match self {
            Self::Primitive(p) => p.is_niladic(),
            Self::User(u) => u.is_niladic(),
            _ => false,
        }
    }

    /// Applies the function monadically (`a` is `None`) or dyadically.
    pub fn apply(
        &self,
        interp: &mut Interpreter,
        a: Option<Value>,
        b: Value,
    ) -> Result<Applied, ApplError> {
        match self {
            Self::Primitive(p) => primitive::apply(interp, *p, a, b, None),
            Self::Axis { function, axis } => match function.as_ref() {
                Self::Primitive(p) => primitive::apply(interp, *p, a, b, Some(axis)),
                _ => Err(ErrorCode::Axis.into()),
            },
            Self::User(u) => {
                if u.is_operator() {
                    return Err(ErrorCode::Syntax.into());
                }
                let args = CallArgs {
                    left: a,
                    right: Some(b),
                    ..CallArgs::default()
                };
                interp.call_user(u.clone(), args)
            }
            Self::Derived(d) => match &d.operator {
                Operator::Primitive { op, axis } => {
                    operator::apply(interp, *op, axis.as_ref(), &d.left, d.right.as_ref(), a, b)
                }
                Operator::User(u) => {
                    let args = CallArgs {
                        left: a,
                        right: Some(b),
                        left_operand: Some(d.left.clone()),
                        right_operand: d.right.clone(),
                    };
                    interp.call_user(u.clone(), args)
                }
            },
        }
    }

    /// Evaluates a niladic function.
    pub fn call_niladic(&self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        match self {
            Self::Primitive(p) => primitive::call_niladic(interp, *p),
            Self::User(u) if u.is_niladic() => interp.call_user(u.clone(), CallArgs::default()),
            _ => Err(ErrorCode::Valence.into()),
        }
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        match self {
            Self::Primitive(_) => (),
            Self::User(u) => u.body.literals().for_each(|v| mark_value(v, seen)),
            Self::Derived(d) => {
                d.operator.mark_values(seen);
                d.left.mark_values(seen);
                if let Some(right) = &d.right {
                    right.mark_values(seen);
                }
            }
            Self::Axis { function, axis } => {
                function.mark_values(seen);
                mark_value(axis, seen);
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::User(u) => write!(f, "{}", u.name_text),
            Self::Derived(d) => {
                write!(f, "{}{}", d.left, d.operator)?;
                if let Some(right) = &d.right {
                    write!(f, "{right}")?;
                }
                Ok(())
            }
            Self::Axis { function, .. } => write!(f, "{function}[]"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operator {
    Primitive { op: PrimOp, axis: Option<Value> },
    User(Rc<UserFunction>),
}

impl Operator {
    pub fn is_dyadic(&self) -> bool {
        match self {
            Self::Primitive { op, .. } => op.is_dyadic(),
            Self::User(u) => u.right_operand.is_some(),
        }
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        match self {
            Self::Primitive { axis, .. } => {
                if let Some(axis) = axis {
                    mark_value(axis, seen);
                }
            }
            Self::User(u) => u.body.literals().for_each(|v| mark_value(v, seen)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive { op, .. } => write!(f, "{op}"),
            Self::User(u) => write!(f, "{}", u.name_text),
        }
    }
}
