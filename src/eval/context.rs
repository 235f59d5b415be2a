use std::{collections::VecDeque, fmt, rc::Rc};

use tracing::debug;

use crate::{
    cont::ContinuationHandle,
    error::{ApplError, ErrorCode},
    eval::prefix::PrefixReducer,
    function::{CallArgs, UserFunction},
    symbol::SymbolId,
    token::Body,
};

/// What a context executes.
#[derive(Debug, Clone)]
pub enum ContextKind {
    /// A line typed at the prompt or read from a script
    Immediate,
    /// `⍎` or `⎕` input
    Execute,
    UserFunction(Rc<UserFunction>),
}

impl ContextKind {
    pub fn function(&self) -> Option<&Rc<UserFunction>> {
        match self {
            Self::UserFunction(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Execute => write!(f, "⍎"),
            Self::UserFunction(u) => write!(f, "{}", u.name_text),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// One `)SI` entry: a body, the reducer stepping through it, and the
/// arguments it was called with.
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub kind: ContextKind,
    pub body: Rc<Body>,
    pub reducer: PrefixReducer,
    pub args: CallArgs,
    /// Names shadowed on entry, restored on pop
    pub localized: Vec<SymbolId>,
    /// Fired in order when this context pops with a result
    pub continuations: VecDeque<ContinuationHandle>,
    pub parent: Option<ContextId>,
}

impl ExecutionContext {
    /// Current function line, counted from 1; 0 outside function bodies.
    pub fn line(&self) -> usize {
        let cursor = self.reducer.cursor().saturating_sub(1);
        self.body
            .line_starts
            .iter()
            .rposition(|&start| start <= cursor)
            .map_or(0, |n| n + 1)
    }
}

/// The stack of active contexts, innermost last.
#[derive(Debug)]
pub struct ContextStack {
    entries: Vec<ExecutionContext>,
    next_id: u64,
    max_depth: usize,
}

impl ContextStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: vec![],
            next_id: 0,
            max_depth,
        }
    }

    pub fn check_depth(&self) -> Result<(), ApplError> {
        if self.entries.len() >= self.max_depth {
            return Err(ApplError::with_detail(
                ErrorCode::SystemLimit,
                format!("depth of )SI stack exceeds {}", self.max_depth),
            ));
        }
        Ok(())
    }

    pub fn push(
        &mut self,
        kind: ContextKind,
        body: Rc<Body>,
        args: CallArgs,
        localized: Vec<SymbolId>,
    ) -> Result<ContextId, ApplError> {
        self.check_depth()?;
        let id = ContextId(self.next_id);
        self.next_id += 1;
        let parent = self.entries.last().map(|c| c.id);
        debug!("push {id} ({kind}), depth {}", self.entries.len() + 1);
        self.entries.push(ExecutionContext {
            id,
            kind,
            body,
            reducer: PrefixReducer::new(),
            args,
            localized,
            continuations: VecDeque::new(),
            parent,
        });
        Ok(id)
    }

    pub fn pop(&mut self) -> Option<ExecutionContext> {
        let popped = self.entries.pop();
        if let Some(ctx) = &popped {
            debug!("pop {} ({}), depth {}", ctx.id, ctx.kind, self.entries.len());
        }
        popped
    }

    #[inline]
    pub fn top(&self) -> Option<&ExecutionContext> {
        self.entries.last()
    }

    #[inline]
    pub fn top_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.entries.last_mut()
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut ExecutionContext> {
        self.entries.iter_mut().find(|c| c.id == id)
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Innermost first.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContext> {
        self.entries.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_limited() {
        let mut stack = ContextStack::new(2);
        let body = Rc::new(Body::default());
        let first = stack
            .push(ContextKind::Immediate, body.clone(), CallArgs::default(), vec![])
            .unwrap();
        let second = stack
            .push(ContextKind::Execute, body.clone(), CallArgs::default(), vec![])
            .unwrap();
        assert_eq!(stack.top().unwrap().parent, Some(first));
        let err = stack
            .push(ContextKind::Execute, body, CallArgs::default(), vec![])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemLimit);
        assert_eq!(stack.pop().unwrap().id, second);
        assert_eq!(stack.depth(), 1);
        assert!(stack.get_mut(first).is_some());
    }
}
