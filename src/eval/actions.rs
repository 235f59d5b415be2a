//! Phrase reductions.
use std::rc::Rc;

use tracing::debug;

use crate::{
    error::{ApplError, ErrorCode},
    eval::{context::ContextKind, prefix::AssignState, prefix::PrefixReducer, Interpreter},
    function::{Applied, Derived, Function, Operand, Operator},
    phrase::Action,
    symbol::SymbolId,
    tag::Tag,
    token::{Body, IndexList, Token, ValueTag},
    value::{ops, Value},
};

/// What the reducer does after an action.
#[derive(Debug)]
pub(super) enum ActionOutcome {
    /// Push the result back into the window and keep matching
    Continue(Token),
    /// The statement is finished; read the next token
    PushNext,
    /// The context is finished with this result
    Return(Token),
    /// A nested context was pushed
    Suspended,
}

impl From<Applied> for ActionOutcome {
    fn from(applied: Applied) -> Self {
        match applied {
            Applied::Value(v) => Self::Continue(Token::value(v)),
            Applied::Void => Self::Continue(Token::Void),
            Applied::Pushed => Self::Suspended,
        }
    }
}

/// The right side of an assignment, re-tagged so it is not printed.
fn committed(mut token: Token) -> Result<(Token, Value), ApplError> {
    let value = token.as_value()?.clone();
    token.change_tag(Tag::Committed)?;
    Ok((token, value))
}

fn next(tokens: &mut impl Iterator<Item = Token>) -> Result<Token, ApplError> {
    tokens
        .next()
        .ok_or_else(|| ApplError::assertion("phrase shorter than its pattern"))
}

fn operand(token: Token) -> Result<Operand, ApplError> {
    match token {
        Token::Function(f) => Ok(Operand::Function(f)),
        Token::Value(_, v) => Ok(Operand::Value(v)),
        other => Err(ApplError::syntax(format!("{} is not an operand", other.class()))),
    }
}

/// Items of a bracket index from the tokens following `[` or `;`.
fn index_items(tokens: impl Iterator<Item = Token>) -> Result<IndexList, ApplError> {
    let mut items = vec![];
    let mut head = None;
    for token in tokens {
        match token {
            Token::Value(_, v) => head = Some(v),
            Token::RBracket => items.push(head.take()),
            Token::PartialIndex(rest) => {
                items.push(head.take());
                items.extend(rest.into_items());
            }
            other => {
                return Err(ApplError::assertion(format!(
                    "{} inside an index",
                    other.class()
                )))
            }
        }
    }
    Ok(IndexList::new(items))
}

impl PrefixReducer {
    pub(super) fn perform(
        &mut self,
        action: Action,
        tokens: Vec<Token>,
        body: &Body,
        kind: &ContextKind,
        interp: &mut Interpreter,
    ) -> Result<ActionOutcome, ApplError> {
        let mut tokens = tokens.into_iter();
        let tokens = &mut tokens;
        match action {
            Action::DyadicCall => {
                let a = next(tokens)?.into_value()?;
                let f = next(tokens)?.into_function()?;
                let b = next(tokens)?.into_value()?;
                Ok(f.apply(interp, Some(a), b)?.into())
            }
            Action::MonadicCall => {
                let f = next(tokens)?.into_function()?;
                let b = next(tokens)?.into_value()?;
                Ok(f.apply(interp, None, b)?.into())
            }
            Action::Glue => {
                let a = next(tokens)?.into_value()?;
                let (tag, b) = next(tokens)?.into_tagged_value()?;
                let mut cells = vec![ops::cell_of(a)];
                if tag == ValueTag::Strand {
                    cells.extend(b.ravel().iter().cloned());
                } else {
                    cells.push(ops::cell_of(b));
                }
                let strand = interp.values.vector(cells);
                Ok(ActionOutcome::Continue(Token::Value(ValueTag::Strand, strand)))
            }
            Action::DeriveMonadic => {
                let left = operand(next(tokens)?)?;
                let operator = next(tokens)?.into_operator()?;
                Ok(derive(operator, left, None))
            }
            Action::DeriveDyadic => {
                let left = operand(next(tokens)?)?;
                let operator = next(tokens)?.into_operator()?;
                let right = operand(next(tokens)?)?;
                Ok(derive(operator, left, Some(right)))
            }
            Action::Axis => {
                let target = next(tokens)?;
                let list = next(tokens)?.into_index()?;
                let axis = list
                    .single()
                    .cloned()
                    .ok_or_else(|| ApplError::new(ErrorCode::Axis))?;
                let token = match target {
                    Token::Function(f) => Token::Function(Function::Axis {
                        function: Rc::new(f),
                        axis,
                    }),
                    Token::Operator(Operator::Primitive { op, axis: None }) => {
                        Token::Operator(Operator::Primitive {
                            op,
                            axis: Some(axis),
                        })
                    }
                    _ => return Err(ErrorCode::Axis.into()),
                };
                Ok(ActionOutcome::Continue(token))
            }
            Action::Index => {
                let a = next(tokens)?.into_value()?;
                let list = next(tokens)?.into_index()?;
                let io = interp.index_origin();
                let r = ops::index(&mut interp.values, &a, &list, io)?;
                Ok(ActionOutcome::Continue(Token::value(r)))
            }
            Action::OpenIndex => {
                next(tokens)?;
                Ok(ActionOutcome::Continue(Token::Index(index_items(tokens)?)))
            }
            Action::PartialIndex => {
                next(tokens)?;
                Ok(ActionOutcome::Continue(Token::PartialIndex(index_items(
                    tokens,
                )?)))
            }
            Action::Group => {
                next(tokens)?;
                let mut inner = next(tokens)?;
                if let Token::Value(..) = inner {
                    inner.change_tag(Tag::Value)?;
                }
                Ok(ActionOutcome::Continue(inner))
            }
            Action::Assign => {
                let id = next(tokens)?.as_symbol()?;
                next(tokens)?;
                let (result, value) = committed(next(tokens)?)?;
                self.assign = AssignState::None;
                interp.assign(id, value)?;
                Ok(ActionOutcome::Continue(result))
            }
            Action::IndexedAssign => {
                let id = next(tokens)?.as_symbol()?;
                let list = next(tokens)?.into_index()?;
                next(tokens)?;
                let (result, value) = committed(next(tokens)?)?;
                self.assign = AssignState::None;
                let current = interp.symbols.variable(id).cloned().ok_or_else(|| {
                    ApplError::with_detail(ErrorCode::Value, interp.symbols.name(id).to_string())
                })?;
                let io = interp.index_origin();
                let updated = ops::index_assign(&mut interp.values, &current, &list, &value, io)?;
                interp.assign(id, updated)?;
                Ok(ActionOutcome::Continue(result))
            }
            Action::VectorAssign => {
                let names = next(tokens)?.into_names()?;
                next(tokens)?;
                let (result, value) = committed(next(tokens)?)?;
                self.assign = AssignState::None;
                vector_assign(interp, &names, &value)?;
                Ok(ActionOutcome::Continue(result))
            }
            Action::NameList => {
                let first = next(tokens)?.as_symbol()?;
                let mut names = vec![first];
                match next(tokens)? {
                    Token::Symbol(id) => names.push(id),
                    Token::NameList(rest) => names.extend(rest),
                    other => return Err(ApplError::syntax(format!("{} in a name list", other.class()))),
                }
                Ok(ActionOutcome::Continue(Token::NameList(names)))
            }
            Action::Branch => {
                next(tokens)?;
                let target = next(tokens)?.into_value()?;
                self.branch(&target, body, kind)
            }
            Action::End => {
                next(tokens)?;
                if !self.window_is_empty() {
                    return Err(ApplError::syntax("unbalanced statement"));
                }
                if let Some(Token::Value(tag, v)) = tokens.next() {
                    if tag != ValueTag::Committed {
                        interp.print_value(&v);
                    }
                }
                Ok(ActionOutcome::PushNext)
            }
            Action::Return => {
                next(tokens)?;
                if !self.window_is_empty() {
                    return Err(ApplError::syntax("unbalanced statement"));
                }
                let result = tokens.next().unwrap_or(Token::Void);
                match kind {
                    ContextKind::Immediate => {
                        if let Token::Value(ValueTag::Plain | ValueTag::Strand, v) = &result {
                            interp.print_value(v);
                        }
                        Ok(ActionOutcome::Return(result))
                    }
                    ContextKind::Execute => Ok(ActionOutcome::Return(result)),
                    ContextKind::UserFunction(u) => {
                        let result = u
                            .result
                            .and_then(|z| interp.symbols.variable(z).cloned())
                            .map_or(Token::Void, Token::value);
                        Ok(ActionOutcome::Return(result))
                    }
                }
            }
        }
    }

    fn branch(
        &mut self,
        target: &Value,
        body: &Body,
        kind: &ContextKind,
    ) -> Result<ActionOutcome, ApplError> {
        if !matches!(kind, ContextKind::UserFunction(_)) {
            debug!("→ leaves {kind} context");
            return Ok(ActionOutcome::Return(Token::Void));
        }
        if target.element_count() == 0 {
            return Ok(ActionOutcome::PushNext);
        }
        if !self.window_is_empty() {
            return Err(ApplError::syntax("→ inside an expression"));
        }
        let line = target.first().as_int().ok_or(ErrorCode::Domain)?;
        self.cursor = match usize::try_from(line) {
            Ok(n) if (1..=body.line_count()).contains(&n) => body.line_starts[n - 1],
            _ => body.tokens.len().saturating_sub(1),
        };
        debug!("→ {line}");
        Ok(ActionOutcome::PushNext)
    }
}

fn derive(operator: Operator, left: Operand, right: Option<Operand>) -> ActionOutcome {
    ActionOutcome::Continue(Token::Function(Function::Derived(Rc::new(Derived {
        operator,
        left,
        right,
    }))))
}

/// `(A B C)←V`: one item per name, or the single item for every name.
fn vector_assign(interp: &mut Interpreter, names: &[SymbolId], value: &Value) -> Result<(), ApplError> {
    let items = ops::item_values(&mut interp.values, value);
    if items.len() == 1 {
        for id in names {
            interp.assign(*id, items[0].clone())?;
        }
        return Ok(());
    }
    if items.len() != names.len() {
        return Err(ErrorCode::Length.into());
    }
    for (id, item) in names.iter().zip(items) {
        interp.assign(*id, item)?;
    }
    Ok(())
}
