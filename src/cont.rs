//! End-of-context continuations.
//!
//! A primitive that needs the result of a nested context installs one of
//! these before returning [`Applied::Pushed`](crate::function::Applied). The
//! registry keeps it, and the values it captured, alive until the nested
//! context pops and the continuation is resumed with that context's result.
use std::{collections::HashSet, fmt};

use tracing::debug;

use crate::{
    error::{ApplError, ErrorCode},
    eval::Interpreter,
    function::Applied,
    primitive::operator::{EachState, InnerState, OuterState, PowerState, RankState, ReduceState},
    token::Token,
    value::Value,
};

/// `⎕` input: the evaluated line becomes the value of `⎕`.
#[derive(Debug, Default)]
pub struct InputState;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContinuationKind {
    Reduce,
    Each,
    Outer,
    Inner,
    Rank,
    Power,
    Input,
}

impl fmt::Display for ContinuationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reduce => write!(f, "reduce"),
            Self::Each => write!(f, "each"),
            Self::Outer => write!(f, "outer-product"),
            Self::Inner => write!(f, "inner-product"),
            Self::Rank => write!(f, "rank"),
            Self::Power => write!(f, "power"),
            Self::Input => write!(f, "input"),
        }
    }
}

#[derive(Debug)]
pub enum Continuation {
    Reduce(ReduceState),
    Each(EachState),
    Outer(OuterState),
    Inner(InnerState),
    Rank(RankState),
    Power(PowerState),
    Input(InputState),
}

/// What resuming a continuation produced.
#[derive(Debug)]
pub enum Resume {
    /// A result token for the next continuation, or for the parent reducer
    Value(Token),
    /// Another nested context was pushed
    Pushed,
}

impl Continuation {
    pub fn kind(&self) -> ContinuationKind {
        match self {
            Self::Reduce(_) => ContinuationKind::Reduce,
            Self::Each(_) => ContinuationKind::Each,
            Self::Outer(_) => ContinuationKind::Outer,
            Self::Inner(_) => ContinuationKind::Inner,
            Self::Rank(_) => ContinuationKind::Rank,
            Self::Power(_) => ContinuationKind::Power,
            Self::Input(_) => ContinuationKind::Input,
        }
    }

    /// Feeds the result of the finished nested context back in.
    pub fn resume(self, interp: &mut Interpreter, token: Token) -> Result<Resume, ApplError> {
        let kind = self.kind();
        let value: Value = match token {
            Token::Value(_, v) => v,
            Token::Void => {
                return Err(ApplError::with_detail(
                    ErrorCode::Value,
                    format!("no result for {kind}"),
                ))
            }
            other => {
                return Err(ApplError::assertion(format!(
                    "{kind} continuation resumed with {}",
                    other.tag()
                )))
            }
        };
        let applied = match self {
            Self::Reduce(s) => s.resume(interp, value)?,
            Self::Each(s) => s.resume(interp, value)?,
            Self::Outer(s) => s.resume(interp, value)?,
            Self::Inner(s) => s.resume(interp, value)?,
            Self::Rank(s) => s.resume(interp, value)?,
            Self::Power(s) => s.resume(interp, value)?,
            Self::Input(_) => Applied::Value(value),
        };
        Ok(match applied {
            Applied::Value(v) => Resume::Value(Token::value(v)),
            Applied::Void => Resume::Value(Token::Void),
            Applied::Pushed => Resume::Pushed,
        })
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        match self {
            Self::Reduce(s) => s.mark_values(seen),
            Self::Each(s) => s.mark_values(seen),
            Self::Outer(s) => s.mark_values(seen),
            Self::Inner(s) => s.mark_values(seen),
            Self::Rank(s) => s.mark_values(seen),
            Self::Power(s) => s.mark_values(seen),
            Self::Input(_) => (),
        }
    }
}

/// Generation-checked handle of an installed continuation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for ContinuationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eoc#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    cont: Option<Continuation>,
}

/// Slab of pending continuations. Kind-agnostic: it never looks inside the
/// captured state beyond asking it for the values it keeps alive.
#[derive(Debug, Default)]
pub struct ContinuationRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ContinuationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, cont: Continuation) -> ContinuationHandle {
        let kind = cont.kind();
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.cont = Some(cont);
        let handle = ContinuationHandle {
            index,
            generation: slot.generation,
        };
        debug!("installed {kind} continuation {handle}");
        handle
    }

    /// Removes a continuation for resumption. Each handle can be taken once.
    pub fn take(&mut self, handle: ContinuationHandle) -> Result<Continuation, ApplError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .ok_or_else(|| ApplError::assertion(format!("stale continuation {handle}")))?;
        let cont = slot
            .cont
            .take()
            .ok_or_else(|| ApplError::assertion(format!("continuation {handle} already taken")))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        debug!("invoking {} continuation {handle}", cont.kind());
        Ok(cont)
    }

    /// Drops a continuation whose context was unwound.
    pub fn discard(&mut self, handle: ContinuationHandle) {
        if let Ok(cont) = self.take(handle) {
            debug!("discarded {} continuation {handle}", cont.kind());
        }
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.cont.is_some()).count()
    }

    /// Values kept alive by pending continuations.
    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        for cont in self.slots.iter().filter_map(|s| s.cont.as_ref()) {
            cont.mark_values(seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_single_use() {
        let mut reg = ContinuationRegistry::new();
        let h = reg.install(Continuation::Input(InputState));
        assert_eq!(reg.pending_count(), 1);
        assert_eq!(reg.take(h).unwrap().kind(), ContinuationKind::Input);
        assert_eq!(reg.pending_count(), 0);
        assert_eq!(reg.take(h).unwrap_err().code(), ErrorCode::Assertion);
    }

    #[test]
    fn reused_slots_reject_old_handles() {
        let mut reg = ContinuationRegistry::new();
        let old = reg.install(Continuation::Input(InputState));
        reg.discard(old);
        let new = reg.install(Continuation::Input(InputState));
        assert_ne!(old, new);
        assert!(reg.take(old).is_err());
        assert!(reg.take(new).is_ok());
    }
}
