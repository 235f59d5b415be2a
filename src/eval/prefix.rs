//! The prefix reducer: a shift-reduce engine over a bounded token window.
//!
//! Tokens are read right to left (the body stores each statement reversed)
//! and pushed at the front of the window, so `window[0]` is always the
//! left-most token. After each push the window's leading classes are looked
//! up in the phrase table; a match is reduced unless the next unread token
//! binds more strongly, which is what gives APL its right-to-left, uniform
//! precedence.
use std::collections::VecDeque;

use itertools::Itertools;
use tracing::trace;

use crate::{
    error::{ApplError, ErrorCode},
    eval::{actions::ActionOutcome, context::ContextKind, Interpreter},
    function::Applied,
    parser::position::SourcePos,
    phrase::{binding, Phrase, MAX_PHRASE_LEN, PHRASES},
    symbol::SymbolResolver,
    tag::TokenClass,
    token::{Body, IndexList, Token},
};

/// Maximum number of tokens in the window.
pub const MAX_WINDOW: usize = 18;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ReducerState {
    #[default]
    Growing,
    Matching,
    Reducing,
    /// Waiting for the result of a nested context
    Suspended,
    Done,
}

/// Where the reducer is relative to an assignment arrow.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub(crate) enum AssignState {
    #[default]
    None,
    /// `←` was read; the target has not been seen yet
    Arrow { bracket_depth: usize, parens: bool },
    /// The target was read; inside `( )` every name is a target
    Variable { parens: bool },
}

/// Result of one reducer step.
#[derive(Debug)]
pub enum Step {
    Continue,
    Done(Token),
    Suspended,
}

#[derive(Debug, Default)]
pub struct PrefixReducer {
    window: VecDeque<(Token, SourcePos)>,
    saved: Option<(Token, SourcePos)>,
    pub(super) assign: AssignState,
    pub(super) cursor: usize,
    state: ReducerState,
    candidate: Option<&'static Phrase>,
    /// Window position of the result a nested context will deliver
    pending: Option<SourcePos>,
    /// Source span of the phrase being reduced
    span: Option<(SourcePos, SourcePos)>,
    last_read: Option<SourcePos>,
}

impl PrefixReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reducer that starts reading at body token `cursor`.
    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor,
            ..Self::default()
        }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn state(&self) -> ReducerState {
        self.state
    }

    #[inline]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub(super) fn window_is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Values held by the window.
    pub fn window_values(&self) -> impl Iterator<Item = &crate::value::Value> {
        self.window
            .iter()
            .chain(&self.saved)
            .filter_map(|(t, _)| t.as_value().ok())
    }

    fn push(&mut self, entry: (Token, SourcePos)) -> Result<(), ApplError> {
        if self.window.len() >= MAX_WINDOW {
            return Err(ApplError::with_detail(
                ErrorCode::SystemLimit,
                format!("statement needs more than {MAX_WINDOW} pending tokens"),
            ));
        }
        self.window.push_front(entry);
        Ok(())
    }

    pub fn step(
        &mut self,
        body: &Body,
        kind: &ContextKind,
        interp: &mut Interpreter,
    ) -> Result<Step, ApplError> {
        match self.state {
            ReducerState::Growing => self.grow(body, interp),
            ReducerState::Matching => self.find_phrase(body, interp),
            ReducerState::Reducing => self.reduce(body, kind, interp),
            ReducerState::Suspended => Err(ApplError::assertion("stepping a suspended reducer")),
            ReducerState::Done => Err(ApplError::assertion("stepping a finished reducer")),
        }
    }

    /// Delivers the result of the nested context this reducer waited for.
    pub fn resume(&mut self, token: Token) -> Result<(), ApplError> {
        if self.state != ReducerState::Suspended {
            return Err(ApplError::assertion("resuming a reducer that is not suspended"));
        }
        let pos = self
            .pending
            .take()
            .ok_or_else(|| ApplError::assertion("suspended reducer without pending result"))?;
        self.push((token, pos))?;
        self.state = ReducerState::Matching;
        Ok(())
    }

    fn grow(&mut self, body: &Body, interp: &mut Interpreter) -> Result<Step, ApplError> {
        if let Some(saved) = self.saved.take() {
            self.push(saved)?;
            self.state = ReducerState::Matching;
            return Ok(Step::Continue);
        }
        let Some(token) = body.tokens.get(self.cursor) else {
            return Err(ApplError::syntax("statement ended with an incomplete phrase"));
        };
        let mut token = token.clone();
        let pos = body.positions.get(self.cursor).copied().unwrap_or_default();
        self.cursor += 1;
        self.last_read = Some(pos);

        let left = match token {
            Token::Assign => {
                if self.assign != AssignState::None {
                    return Err(ApplError::syntax("unexpected ←"));
                }
                self.assign = AssignState::Arrow {
                    bracket_depth: 0,
                    parens: false,
                };
                false
            }
            _ => self.track_target(&token)?,
        };
        if matches!(token, Token::Symbol(_))
            && interp.symbols.resolve(&mut token, left)? == TokenClass::Niladic
        {
            let function = token.into_function()?;
            token = match function.call_niladic(interp)? {
                Applied::Value(v) => Token::value(v),
                Applied::Void => Token::Void,
                Applied::Pushed => {
                    self.pending = Some(pos);
                    self.state = ReducerState::Suspended;
                    return Ok(Step::Suspended);
                }
            };
        }
        self.push((token, pos))?;
        self.state = ReducerState::Matching;
        Ok(Step::Continue)
    }

    /// Follows the tokens left of `←`; true when `token` is an assignment target.
    fn track_target(&mut self, token: &Token) -> Result<bool, ApplError> {
        match self.assign {
            AssignState::None | AssignState::Variable { parens: false } => Ok(false),
            AssignState::Arrow {
                bracket_depth,
                parens,
            } => match token {
                Token::RBracket => {
                    self.assign = AssignState::Arrow {
                        bracket_depth: bracket_depth + 1,
                        parens,
                    };
                    Ok(false)
                }
                Token::LBracket => {
                    self.assign = AssignState::Arrow {
                        bracket_depth: bracket_depth.saturating_sub(1),
                        parens,
                    };
                    Ok(false)
                }
                _ if bracket_depth > 0 => Ok(false),
                Token::RParen => {
                    self.assign = AssignState::Arrow {
                        bracket_depth,
                        parens: true,
                    };
                    Ok(false)
                }
                Token::Symbol(_) => {
                    self.assign = AssignState::Variable { parens };
                    Ok(true)
                }
                _ => Err(ApplError::new(ErrorCode::LeftSyntax)),
            },
            AssignState::Variable { parens: true } => match token {
                Token::Symbol(_) => Ok(true),
                Token::LParen => {
                    self.assign = AssignState::Variable { parens: false };
                    Ok(false)
                }
                _ => Ok(false),
            },
        }
    }

    /// Symbols read next are assignment targets.
    fn in_target(&self) -> bool {
        matches!(
            self.assign,
            AssignState::Arrow {
                bracket_depth: 0,
                ..
            } | AssignState::Variable { parens: true }
        )
    }

    fn lookahead_class(&self, body: &Body, interp: &Interpreter) -> TokenClass {
        if let Some((token, _)) = &self.saved {
            return token.class();
        }
        match body.tokens.get(self.cursor) {
            None => TokenClass::End,
            Some(token @ Token::Symbol(_)) => interp.symbols.peek_class(token, self.in_target()),
            Some(token) => token.class(),
        }
    }

    fn find_phrase(&mut self, body: &Body, interp: &Interpreter) -> Result<Step, ApplError> {
        let classes: Vec<TokenClass> = self
            .window
            .iter()
            .take(MAX_PHRASE_LEN)
            .map(|(t, _)| t.class())
            .collect();
        for len in (1..=classes.len()).rev() {
            let prefix = &classes[..len];
            let mut found = PHRASES.lookup(prefix);
            if found.is_none() && len >= 3 && prefix[0] != TokenClass::Value {
                let mut open = prefix.to_vec();
                open[0] = TokenClass::Misc;
                found = PHRASES.lookup(&open);
            }
            if let Some(phrase) = found {
                trace!(
                    "window [{}] matches {phrase}",
                    classes.iter().join(" ")
                );
                return Ok(self.check_binding(phrase, body, interp));
            }
        }
        self.state = ReducerState::Growing;
        Ok(Step::Continue)
    }

    fn check_binding(&mut self, phrase: &'static Phrase, body: &Body, interp: &Interpreter) -> Step {
        let leftmost = self.window[0].0.class();
        if phrase.misc && leftmost == TokenClass::RBracket {
            if self.is_index(body, interp) {
                trace!("] opens an index");
                self.window[0].0 = Token::PartialIndex(IndexList::default());
                self.state = ReducerState::Growing;
                return Step::Continue;
            }
            self.candidate = Some(phrase);
            self.state = ReducerState::Reducing;
            return Step::Continue;
        }
        let (look, left) = if phrase.misc {
            (leftmost, self.window[1].0.class())
        } else {
            (self.lookahead_class(body, interp), leftmost)
        };
        if binding(look, left) > phrase.priority {
            trace!("{phrase} deferred by {look}");
            self.state = ReducerState::Growing;
        } else {
            self.candidate = Some(phrase);
            self.state = ReducerState::Reducing;
        }
        Step::Continue
    }

    /// Decides whether the `]` at the window's left edge closes an index
    /// (`A[...]`) rather than an axis (`F[...]`): finds the matching `[` and
    /// looks at what stands left of it.
    fn is_index(&self, body: &Body, interp: &Interpreter) -> bool {
        let mut depth = 1usize;
        let mut i = self.cursor;
        loop {
            match body.tokens.get(i) {
                None | Some(Token::End | Token::Return) => return false,
                Some(Token::RBracket) => depth += 1,
                Some(Token::LBracket) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => (),
            }
            i += 1;
        }
        match body.tokens.get(i + 1) {
            Some(Token::Value(..) | Token::RParen) => true,
            Some(token @ Token::Symbol(_)) => {
                interp.symbols.peek_class(token, false) == TokenClass::Value
            }
            _ => false,
        }
    }

    fn reduce(
        &mut self,
        body: &Body,
        kind: &ContextKind,
        interp: &mut Interpreter,
    ) -> Result<Step, ApplError> {
        let phrase = self
            .candidate
            .take()
            .ok_or_else(|| ApplError::assertion("reducing without a phrase"))?;
        let mut len = phrase.len;
        if phrase.misc {
            self.saved = self.window.pop_front();
            len -= 1;
        }
        if len > self.window.len() {
            return Err(ApplError::assertion(format!("{phrase} longer than window")));
        }
        let matched: Vec<(Token, SourcePos)> = self.window.drain(..len).collect();
        let pos = matched.iter().map(|(_, p)| *p).min().unwrap_or_default();
        self.span = matched.iter().map(|(_, p)| *p).minmax().into_option();
        trace!("reduce {phrase}");
        let tokens = matched.into_iter().map(|(t, _)| t).collect();
        let outcome = self.perform(phrase.action, tokens, body, kind, interp)?;
        self.span = None;
        Ok(match outcome {
            ActionOutcome::Continue(token) => {
                self.push((token, pos))?;
                self.state = ReducerState::Matching;
                Step::Continue
            }
            ActionOutcome::PushNext => {
                self.state = ReducerState::Growing;
                Step::Continue
            }
            ActionOutcome::Return(token) => {
                self.state = ReducerState::Done;
                Step::Done(token)
            }
            ActionOutcome::Suspended => {
                self.pending = Some(pos);
                self.state = ReducerState::Suspended;
                Step::Suspended
            }
        })
    }

    /// Abandons the current statement after `error`: releases the window,
    /// rewinds the cursor to the start of the statement and reports the
    /// source span of the failed phrase.
    pub fn fail(
        &mut self,
        body: &Body,
        mut error: ApplError,
    ) -> (ApplError, Option<(SourcePos, SourcePos)>) {
        if error.code == ErrorCode::Syntax && self.window.iter().any(|(t, _)| matches!(t, Token::Void))
        {
            error.code = ErrorCode::Value;
        }
        let span = self.span.take().or_else(|| {
            self.window
                .iter()
                .map(|(_, p)| *p)
                .chain(self.last_read)
                .chain(self.pending)
                .minmax()
                .into_option()
        });
        self.cursor = body.statement_start(self.cursor);
        self.window.clear();
        self.saved = None;
        self.assign = AssignState::None;
        self.candidate = None;
        self.pending = None;
        self.last_read = None;
        self.state = ReducerState::Growing;
        (error, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded() {
        let mut reducer = PrefixReducer::new();
        for _ in 0..MAX_WINDOW {
            reducer.push((Token::LParen, SourcePos::default())).unwrap();
        }
        let err = reducer
            .push((Token::LParen, SourcePos::default()))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemLimit);
        assert_eq!(reducer.window_len(), MAX_WINDOW);
    }

    #[test]
    fn fail_rewinds_and_releases() {
        let mut body = Body::default();
        for t in [Token::LParen, Token::End, Token::RParen, Token::RParen, Token::Return] {
            body.push(t, SourcePos::default());
        }
        let mut reducer = PrefixReducer::starting_at(4);
        reducer.push((Token::Void, SourcePos::new(0, 2))).unwrap();
        reducer.push((Token::RParen, SourcePos::new(0, 5))).unwrap();
        let (err, span) = reducer.fail(&body, ApplError::syntax("test"));
        assert_eq!(err.code(), ErrorCode::Value);
        assert_eq!(span, Some((SourcePos::new(0, 2), SourcePos::new(0, 5))));
        assert_eq!(reducer.cursor(), 2);
        assert_eq!(reducer.window_len(), 0);
        assert_eq!(reducer.state(), ReducerState::Growing);
    }

    #[test]
    fn assignment_targets() {
        let mut reducer = PrefixReducer::new();
        reducer.assign = AssignState::Arrow {
            bracket_depth: 0,
            parens: false,
        };
        assert!(!reducer.track_target(&Token::RBracket).unwrap());
        assert!(!reducer.track_target(&Token::Value(Default::default(), dummy())).unwrap());
        assert!(!reducer.track_target(&Token::LBracket).unwrap());
        assert!(reducer.in_target());
        assert!(!reducer.track_target(&Token::RParen).unwrap());
        assert_eq!(
            reducer.assign,
            AssignState::Arrow {
                bracket_depth: 0,
                parens: true
            }
        );
        assert!(reducer
            .track_target(&Token::Symbol(crate::symbol::QUAD))
            .unwrap());
        assert_eq!(reducer.assign, AssignState::Variable { parens: true });
        assert!(reducer.track_target(&Token::LParen).is_ok());
        assert!(!reducer.in_target());

        let mut reducer = PrefixReducer::new();
        reducer.assign = AssignState::Arrow {
            bracket_depth: 0,
            parens: false,
        };
        let err = reducer.track_target(&Token::LParen).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LeftSyntax);
    }

    fn dummy() -> crate::value::Value {
        crate::value::ValueRegistry::new().int(0)
    }
}
