//! The interpreter: the workspace and the driver over the context stack.
//!
//! There is exactly one driver loop. It steps the reducer of the top
//! context until that context returns a result, pushes a nested context, or
//! fails. Suspension and resumption go through return values and
//! continuation records only; no context ever runs inside another one's
//! native stack frame.
mod actions;
pub mod context;
pub mod prefix;

#[cfg(test)]
mod tests;

use std::{
    collections::HashSet,
    mem,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    console::Console,
    cont::{Continuation, ContinuationHandle, ContinuationRegistry, Resume},
    error::{ApplError, Diagnostic, ErrorCode},
    function::{Applied, CallArgs, Function, Operator, UserFunction},
    parser::{self, position::SourcePos},
    symbol::{mark_value, Binding, SymbolId, SymbolTable, INDEX_ORIGIN, QUAD, QUOTE_QUAD},
    token::{Body, BodyKind, Token},
    value::{format_value, SweepReport, Value, ValueRegistry},
};

pub use context::{ContextId, ContextKind, ContextStack, ExecutionContext};
pub use prefix::{PrefixReducer, ReducerState, Step};

/// Result of running one context.
#[derive(Debug)]
pub enum RunOutcome {
    /// The context finished with this result
    Value(Token),
    /// A nested context is now on top
    Pushed,
    Error(ApplError),
}

/// Where [`Interpreter::retry_last`] starts over.
#[derive(Debug, Clone)]
pub enum RetryPoint {
    /// The innermost failed user function and its saved arguments
    Call {
        function: Rc<UserFunction>,
        args: CallArgs,
    },
    /// A failed immediate statement
    Statement { body: Rc<Body>, start: usize },
}

/// What the last failed statement left behind.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub error: ApplError,
    /// `)SI` entries at the time of failure, innermost first
    pub si_trace: Vec<String>,
    pub retry: Option<RetryPoint>,
}

pub struct Interpreter {
    pub(crate) values: ValueRegistry,
    pub(crate) symbols: SymbolTable,
    pub(crate) contexts: ContextStack,
    pub(crate) conts: ContinuationRegistry,
    pub(crate) console: Box<dyn Console>,
    pub(crate) settings: Settings,
    attention: Arc<AtomicBool>,
    last_failure: Option<FailureRecord>,
}

impl Interpreter {
    pub fn new(settings: Settings, console: Box<dyn Console>) -> Self {
        let mut values = ValueRegistry::new();
        let symbols = SymbolTable::new(settings.max_symbols, settings.index_origin, &mut values);
        Self {
            values,
            symbols,
            contexts: ContextStack::new(settings.max_depth),
            conts: ContinuationRegistry::new(),
            console,
            settings,
            attention: Arc::default(),
            last_failure: None,
        }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    #[inline]
    pub fn values(&self) -> &ValueRegistry {
        &self.values
    }

    #[inline]
    pub fn contexts(&self) -> &ContextStack {
        &self.contexts
    }

    #[inline]
    pub fn continuations(&self) -> &ContinuationRegistry {
        &self.conts
    }

    #[inline]
    pub fn last_failure(&self) -> Option<&FailureRecord> {
        self.last_failure.as_ref()
    }

    #[inline]
    pub fn index_origin(&self) -> i64 {
        self.symbols.index_origin()
    }

    /// The interrupt flag, polled before every reducer step.
    pub fn attention(&self) -> Arc<AtomicBool> {
        self.attention.clone()
    }

    /// Value of a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.symbols.lookup(name).and_then(|id| self.symbols.variable(id))
    }

    /// Prints one line on the console.
    pub fn print(&mut self, line: &str) {
        self.console.print(line);
    }

    pub fn print_value(&mut self, value: &Value) {
        let text = format_value(value, self.settings.print_precision);
        for line in text.split('\n') {
            self.console.print(line);
        }
    }

    /// Binds a variable, with the side effects of the system names.
    pub fn assign(&mut self, id: SymbolId, value: Value) -> Result<(), ApplError> {
        match id {
            QUAD | QUOTE_QUAD => {
                self.print_value(&value);
                Ok(())
            }
            INDEX_ORIGIN => {
                let io = value.to_int()?;
                if io != 0 && io != 1 {
                    return Err(ApplError::with_detail(ErrorCode::Domain, "⎕IO must be 0 or 1"));
                }
                self.symbols.set(INDEX_ORIGIN, Binding::Variable(value));
                Ok(())
            }
            _ => self.symbols.assign(id, value),
        }
    }

    /// Executes one line of immediate input. Prints as a side effect and
    /// returns the value of the last statement, if any.
    pub fn execute_line(&mut self, text: &str) -> Result<Option<Value>, ApplError> {
        let body = parser::compile_statements(
            text,
            BodyKind::Immediate,
            &mut self.symbols,
            &mut self.values,
        )?;
        self.push_context(ContextKind::Immediate, Rc::new(body), CallArgs::default(), vec![])?;
        let result = self.drive();
        self.sweep();
        Ok(result?.and_then(|token| token.into_value().ok()))
    }

    /// Defines a ∇ function or operator from its header and body lines.
    pub fn define_function(&mut self, text: &str) -> Result<SymbolId, ApplError> {
        let function = parser::compile_function(text, &mut self.symbols, &mut self.values)?;
        let id = function.name;
        if matches!(self.symbols.binding(id), Binding::Variable(_)) {
            return Err(ApplError::with_detail(
                ErrorCode::Defn,
                format!("{} is a variable", function.name_text),
            ));
        }
        info!("defined {}", function.name_text);
        let function = Rc::new(function);
        let binding = if function.is_operator() {
            Binding::Operator(Operator::User(function))
        } else {
            Binding::Function(Function::User(function))
        };
        self.symbols.set(id, binding);
        Ok(id)
    }

    /// Erases a name; false when it was not bound.
    pub fn erase(&mut self, name: &str) -> bool {
        match self.symbols.lookup(name) {
            Some(id) if !matches!(self.symbols.binding(id), Binding::Unbound) => {
                self.symbols.erase(id);
                true
            }
            _ => false,
        }
    }

    /// Forgets the last failure.
    pub fn reset(&mut self) {
        self.last_failure = None;
        self.sweep();
    }

    /// Runs the last failed statement or user function again from the start.
    pub fn retry_last(&mut self) -> Result<Option<Value>, ApplError> {
        let retry = self
            .last_failure
            .as_ref()
            .and_then(|f| f.retry.clone())
            .ok_or_else(|| ApplError::with_detail(ErrorCode::Value, "nothing to retry"))?;
        if !self.contexts.is_empty() {
            return Err(ApplError::assertion("retry with an active context"));
        }
        // An immediate statement prints its own result; a function result
        // is printed here.
        let print_result = match retry {
            RetryPoint::Call { function, args } => {
                info!("retrying {}", function.name_text);
                match self.call_user(function, args)? {
                    Applied::Pushed => true,
                    Applied::Value(v) => return Ok(Some(v)),
                    Applied::Void => return Ok(None),
                }
            }
            RetryPoint::Statement { body, start } => {
                info!("retrying statement at token {start}");
                self.push_context(ContextKind::Immediate, body, CallArgs::default(), vec![])?;
                if let Some(top) = self.contexts.top_mut() {
                    top.reducer = PrefixReducer::starting_at(start);
                }
                false
            }
        };
        let result = self.drive();
        self.sweep();
        let value = result?.and_then(|token| token.into_value().ok());
        if let (true, Some(v)) = (print_result, &value) {
            self.print_value(v);
        }
        Ok(value)
    }

    pub fn push_context(
        &mut self,
        kind: ContextKind,
        body: Rc<Body>,
        args: CallArgs,
        localized: Vec<SymbolId>,
    ) -> Result<ContextId, ApplError> {
        self.contexts.push(kind, body, args, localized)
    }

    /// Pushes an Execute context for `⍎` or `⎕` input.
    pub(crate) fn push_execute(&mut self, text: &str) -> Result<(), ApplError> {
        self.contexts.check_depth()?;
        let body = parser::compile_statements(
            text,
            BodyKind::Execute,
            &mut self.symbols,
            &mut self.values,
        )?;
        self.push_context(ContextKind::Execute, Rc::new(body), CallArgs::default(), vec![])?;
        Ok(())
    }

    /// Calls a user function or operator: localizes its names, binds the
    /// arguments and pushes its context. The result arrives when that
    /// context pops.
    pub fn call_user(
        &mut self,
        function: Rc<UserFunction>,
        args: CallArgs,
    ) -> Result<Applied, ApplError> {
        let valence_ok = (args.left.is_none() || function.left.is_some())
            && args.right.is_some() == function.right.is_some()
            && args.left_operand.is_some() == function.left_operand.is_some()
            && args.right_operand.is_some() == function.right_operand.is_some();
        if !valence_ok {
            return Err(ApplError::with_detail(
                ErrorCode::Valence,
                function.name_text.clone(),
            ));
        }
        self.contexts.check_depth()?;

        let localized = function.localized_names();
        for id in &localized {
            self.symbols.localize(*id);
        }
        let values = [(function.left, &args.left), (function.right, &args.right)];
        for (name, value) in values {
            if let (Some(id), Some(v)) = (name, value) {
                self.symbols.set(id, Binding::Variable(v.clone()));
            }
        }
        let operands = [
            (function.left_operand, &args.left_operand),
            (function.right_operand, &args.right_operand),
        ];
        for (name, operand) in operands {
            if let (Some(id), Some(op)) = (name, operand) {
                self.symbols.set(id, Binding::from(op.clone()));
            }
        }
        for (id, line) in &function.body.labels {
            let v = self.values.int(*line as i64);
            self.symbols.set(*id, Binding::Variable(v));
        }

        let body = function.body.clone();
        let kind = ContextKind::UserFunction(function);
        if let Err(e) = self.push_context(kind, body, args, localized.clone()) {
            self.unlocalize(&localized);
            return Err(e);
        }
        Ok(Applied::Pushed)
    }

    /// Attaches a continuation to the context on top, which must be the one
    /// just pushed for the operand.
    pub fn install_continuation(&mut self, cont: Continuation) -> Result<(), ApplError> {
        let kind = cont.kind();
        let handle = self.conts.install(cont);
        match self.contexts.top_mut() {
            Some(top) => {
                top.continuations.push_back(handle);
                Ok(())
            }
            None => {
                self.conts.discard(handle);
                Err(ApplError::assertion(format!(
                    "{kind} continuation without a nested context"
                )))
            }
        }
    }

    pub fn invoke_continuation(
        &mut self,
        handle: ContinuationHandle,
        token: Token,
    ) -> Result<Resume, ApplError> {
        let cont = self.conts.take(handle)?;
        cont.resume(self, token)
    }

    /// Steps the reducer of context `id` until it finishes, suspends or fails.
    pub fn evaluate_statement(&mut self, id: ContextId) -> RunOutcome {
        let Some(ctx) = self.contexts.get_mut(id) else {
            return RunOutcome::Error(ApplError::assertion(format!("no context {id}")));
        };
        let mut reducer = mem::take(&mut ctx.reducer);
        let body = ctx.body.clone();
        let kind = ctx.kind.clone();
        let outcome = loop {
            if self.attention.swap(false, Ordering::Relaxed) {
                break RunOutcome::Error(ErrorCode::Interrupt.into());
            }
            match reducer.step(&body, &kind, self) {
                Ok(Step::Continue) => (),
                Ok(Step::Done(token)) => break RunOutcome::Value(token),
                Ok(Step::Suspended) => break RunOutcome::Pushed,
                Err(e) => break RunOutcome::Error(e),
            }
        };
        if let Some(ctx) = self.contexts.get_mut(id) {
            ctx.reducer = reducer;
        }
        outcome
    }

    /// Runs until the bottom context returns.
    fn drive(&mut self) -> Result<Option<Token>, ApplError> {
        loop {
            let Some(id) = self.contexts.top().map(|c| c.id) else {
                return Ok(None);
            };
            let completed = match self.evaluate_statement(id) {
                RunOutcome::Pushed => continue,
                RunOutcome::Value(token) => self.complete(token),
                RunOutcome::Error(e) => Err(e),
            };
            match completed {
                Ok(Some(token)) => return Ok(Some(token)),
                Ok(None) => (),
                Err(e) => return Err(self.unwind(e)),
            }
        }
    }

    /// Pops the finished top context and routes its result through the
    /// context's continuations, then to the parent reducer.
    fn complete(&mut self, mut token: Token) -> Result<Option<Token>, ApplError> {
        let ctx = self.pop_context_on_return()?;
        let mut handles = ctx.continuations;
        while let Some(handle) = handles.pop_front() {
            match self.invoke_continuation(handle, token) {
                Ok(Resume::Value(t)) => token = t,
                Ok(Resume::Pushed) => {
                    let Some(top) = self.contexts.top_mut() else {
                        return Err(ApplError::assertion("continuation pushed no context"));
                    };
                    top.continuations.extend(handles);
                    return Ok(None);
                }
                Err(e) => {
                    for handle in handles {
                        self.conts.discard(handle);
                    }
                    return Err(e);
                }
            }
        }
        if ctx.parent.is_none() {
            return Ok(Some(token));
        }
        let parent = self
            .contexts
            .top_mut()
            .ok_or_else(|| ApplError::assertion("parent context missing"))?;
        parent.reducer.resume(token)?;
        Ok(None)
    }

    fn unlocalize(&mut self, names: &[SymbolId]) {
        for id in names.iter().rev() {
            self.symbols.unlocalize(*id);
        }
    }

    pub fn pop_context_on_return(&mut self) -> Result<ExecutionContext, ApplError> {
        let ctx = self
            .contexts
            .pop()
            .ok_or_else(|| ApplError::assertion("pop from an empty stack"))?;
        self.unlocalize(&ctx.localized);
        Ok(ctx)
    }

    /// Pops the top context after `error`: abandons its statement, attaches
    /// its diagnostic unless an inner context did, restores localized names
    /// and drops its continuations.
    pub fn pop_context_on_error(
        &mut self,
        error: ApplError,
        si_trace: &mut Vec<String>,
    ) -> (ApplError, Option<ExecutionContext>) {
        let Some(mut ctx) = self.contexts.pop() else {
            return (error, None);
        };
        let line = ctx.line();
        let (error, span) = ctx.reducer.fail(&ctx.body, error);
        let error = error.attach(diagnostic(&ctx, line, span));
        si_trace.push(match &ctx.kind {
            ContextKind::UserFunction(u) => format!("{}[{line}]", u.name_text),
            ContextKind::Immediate => "⋆".to_string(),
            ContextKind::Execute => "⍎".to_string(),
        });
        self.unlocalize(&ctx.localized);
        for handle in ctx.continuations.drain(..) {
            self.conts.discard(handle);
        }
        (error, Some(ctx))
    }

    /// Unwinds the whole stack after an error and records the failure.
    fn unwind(&mut self, mut error: ApplError) -> ApplError {
        debug!("unwinding {} contexts after {}", self.contexts.depth(), error.code);
        let mut si_trace = vec![];
        let mut retry = None;
        loop {
            let (e, ctx) = self.pop_context_on_error(error, &mut si_trace);
            error = e;
            let Some(ctx) = ctx else { break };
            if retry.is_none() {
                retry = match ctx.kind {
                    ContextKind::UserFunction(function) => Some(RetryPoint::Call {
                        function,
                        args: ctx.args,
                    }),
                    ContextKind::Immediate => Some(RetryPoint::Statement {
                        body: ctx.body,
                        start: ctx.reducer.cursor(),
                    }),
                    ContextKind::Execute => None,
                };
            }
        }
        self.last_failure = Some(FailureRecord {
            error: error.clone(),
            si_trace,
            retry,
        });
        error
    }

    /// Drops stale values and finalizes incomplete ones. Does nothing while
    /// a context is active.
    pub fn sweep(&mut self) -> SweepReport {
        if !self.contexts.is_empty() {
            return SweepReport::default();
        }
        let report = self.values.sweep_stale();
        if report.finalized > 0 {
            warn!("finalized {} incomplete values", report.finalized);
        }
        debug!("swept {} values, {} live", report.swept, report.live);
        report
    }

    /// Serials of every value reachable from the workspace: bindings,
    /// pending continuations, active contexts and the last failure.
    pub fn reachable_values(&self) -> HashSet<u64> {
        let mut seen = HashSet::new();
        self.symbols.reachable_values(&mut seen);
        self.conts.mark_values(&mut seen);
        for ctx in self.contexts.iter() {
            ctx.body.literals().for_each(|v| mark_value(v, &mut seen));
            ctx.args.mark_values(&mut seen);
            ctx.reducer.window_values().for_each(|v| mark_value(v, &mut seen));
        }
        match self.last_failure.as_ref().and_then(|f| f.retry.as_ref()) {
            Some(RetryPoint::Call { function, args }) => {
                function.body.literals().for_each(|v| mark_value(v, &mut seen));
                args.mark_values(&mut seen);
            }
            Some(RetryPoint::Statement { body, .. }) => {
                body.literals().for_each(|v| mark_value(v, &mut seen));
            }
            None => (),
        }
        seen
    }

    /// `)SI`: active contexts, then the trace of the last failure.
    pub fn si_report(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .contexts
            .iter()
            .map(|ctx| match &ctx.kind {
                ContextKind::UserFunction(u) => format!("{}[{}]", u.name_text, ctx.line()),
                other => other.to_string(),
            })
            .collect();
        if let Some(failure) = &self.last_failure {
            lines.push(failure.error.code.to_string());
            lines.extend(failure.si_trace.iter().cloned());
        }
        lines
    }
}

fn diagnostic(
    ctx: &ExecutionContext,
    line: usize,
    span: Option<(SourcePos, SourcePos)>,
) -> Diagnostic {
    let line = span.map_or(line, |(from, _)| from.line);
    let prefix = match &ctx.kind {
        ContextKind::UserFunction(u) => format!("{}[{line}]  ", u.name_text),
        _ => " ".repeat(6),
    };
    let (left_caret, right_caret) = span.map_or((0, 0), |(from, upto)| (from.column, upto.column));
    Diagnostic {
        prefix,
        statement: ctx.body.lines.get(line).cloned().unwrap_or_default(),
        left_caret,
        right_caret,
    }
}
