//! The symbol table: interned names, each with a stack of bindings so a user
//! function call can shadow (localize) a name and restore it on return.
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{
    error::{ApplError, ErrorCode},
    function::{Function, Operand, Operator, PrimFn},
    tag::TokenClass,
    token::Token,
    value::{Scalar, Value, ValueRegistry},
};

/// Handle of an interned name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// `⎕`: evaluated input when read, output when assigned
pub const QUAD: SymbolId = SymbolId(0);
/// `⍞`: character input when read, output when assigned
pub const QUOTE_QUAD: SymbolId = SymbolId(1);
/// `⎕IO`: the index origin
pub const INDEX_ORIGIN: SymbolId = SymbolId(2);

const SYSTEM_NAMES: [&str; 3] = ["⎕", "⍞", "⎕IO"];

/// What a name currently denotes.
#[derive(Debug, Clone, Default)]
pub enum Binding {
    #[default]
    Unbound,
    Variable(Value),
    Function(Function),
    Operator(Operator),
}

impl Binding {
    pub fn class(&self) -> TokenClass {
        match self {
            Self::Unbound => TokenClass::Symbol,
            Self::Variable(_) => TokenClass::Value,
            Self::Function(f) if f.is_niladic() => TokenClass::Niladic,
            Self::Function(_) => TokenClass::Function,
            Self::Operator(op) if op.is_dyadic() => TokenClass::DyadicOperator,
            Self::Operator(_) => TokenClass::MonadicOperator,
        }
    }
}

impl From<Operand> for Binding {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Function(f) => Self::Function(f),
            Operand::Value(v) => Self::Variable(v),
        }
    }
}

/// Resolves symbol tokens to their current binding.
pub trait SymbolResolver {
    /// Replaces a symbol token by what it currently denotes and reports the
    /// resulting class. In `left` position (an assignment target) the symbol
    /// is kept as is.
    fn resolve(&self, token: &mut Token, left: bool) -> Result<TokenClass, ApplError>;

    /// The class a token would resolve to, without touching it. Unbound
    /// names report [`TokenClass::Symbol`].
    fn peek_class(&self, token: &Token, left: bool) -> TokenClass {
        let mut probe = token.clone();
        self.resolve(&mut probe, left)
            .unwrap_or(TokenClass::Symbol)
    }
}

struct Entry {
    /// Innermost binding last; never empty
    shadows: Vec<Binding>,
}

pub struct SymbolTable {
    names: IndexMap<String, Entry>,
    max_symbols: usize,
}

impl SymbolTable {
    pub fn new(max_symbols: usize, index_origin: i64, values: &mut ValueRegistry) -> Self {
        let mut table = Self {
            names: IndexMap::new(),
            max_symbols: max_symbols.max(SYSTEM_NAMES.len()),
        };
        for name in SYSTEM_NAMES {
            table.names.insert(
                name.to_string(),
                Entry {
                    shadows: vec![Binding::Unbound],
                },
            );
        }
        table.set(QUAD, Binding::Function(Function::Primitive(PrimFn::Quad)));
        table.set(
            QUOTE_QUAD,
            Binding::Function(Function::Primitive(PrimFn::QuoteQuad)),
        );
        table.set(INDEX_ORIGIN, Binding::Variable(values.int(index_origin)));
        table
    }

    pub fn intern(&mut self, name: &str) -> Result<SymbolId, ApplError> {
        if let Some(index) = self.names.get_index_of(name) {
            return Ok(SymbolId(index as u32));
        }
        if self.names.len() >= self.max_symbols {
            return Err(ApplError::with_detail(
                ErrorCode::SystemLimit,
                format!("symbol table full ({} names)", self.max_symbols),
            ));
        }
        let (index, _) = self.names.insert_full(
            name.to_string(),
            Entry {
                shadows: vec![Binding::Unbound],
            },
        );
        Ok(SymbolId(index as u32))
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.names.get_index_of(name).map(|i| SymbolId(i as u32))
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.names
            .get_index(id.index())
            .map(|(name, _)| name.as_str())
            .unwrap_or("?")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn entry(&self, id: SymbolId) -> Option<&Entry> {
        self.names.get_index(id.index()).map(|(_, e)| e)
    }

    fn entry_mut(&mut self, id: SymbolId) -> Option<&mut Entry> {
        self.names.get_index_mut(id.index()).map(|(_, e)| e)
    }

    pub fn binding(&self, id: SymbolId) -> &Binding {
        const UNBOUND: &Binding = &Binding::Unbound;
        self.entry(id)
            .and_then(|e| e.shadows.last())
            .unwrap_or(UNBOUND)
    }

    /// Replaces the innermost binding. The old binding is released first.
    pub fn set(&mut self, id: SymbolId, binding: Binding) {
        if let Some(slot) = self.entry_mut(id).and_then(|e| e.shadows.last_mut()) {
            drop(std::mem::take(slot));
            *slot = binding;
        }
    }

    pub fn variable(&self, id: SymbolId) -> Option<&Value> {
        match self.binding(id) {
            Binding::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Binds a variable, refusing to overwrite a function or operator.
    pub fn assign(&mut self, id: SymbolId, value: Value) -> Result<(), ApplError> {
        match self.binding(id) {
            Binding::Function(_) | Binding::Operator(_) => Err(ApplError::with_detail(
                ErrorCode::Syntax,
                format!("{} is not a variable", self.name(id)),
            )),
            _ => {
                self.set(id, Binding::Variable(value));
                Ok(())
            }
        }
    }

    pub fn erase(&mut self, id: SymbolId) {
        self.set(id, Binding::Unbound);
    }

    /// Shadows a name with a fresh, unbound binding.
    pub fn localize(&mut self, id: SymbolId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.shadows.push(Binding::Unbound);
        }
    }

    /// Drops the innermost shadow of a name.
    pub fn unlocalize(&mut self, id: SymbolId) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.shadows.len() > 1 {
                entry.shadows.pop();
            }
        }
    }

    pub fn index_origin(&self) -> i64 {
        self.variable(INDEX_ORIGIN)
            .and_then(|v| v.to_int().ok())
            .unwrap_or(1)
    }

    fn names_where(&self, keep: impl Fn(&Binding) -> bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .iter()
            .filter(|(name, e)| {
                !SYSTEM_NAMES.contains(&name.as_str())
                    && e.shadows.last().is_some_and(&keep)
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn function_names(&self) -> Vec<String> {
        self.names_where(|b| matches!(b, Binding::Function(_) | Binding::Operator(_)))
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.names_where(|b| matches!(b, Binding::Variable(_)))
    }

    /// Every value reachable from any binding, shadows included: variables,
    /// literals of defined functions and value operands.
    pub fn reachable_values(&self, seen: &mut HashSet<u64>) {
        for entry in self.names.values() {
            for binding in &entry.shadows {
                match binding {
                    Binding::Unbound => (),
                    Binding::Variable(v) => mark_value(v, seen),
                    Binding::Function(f) => f.mark_values(seen),
                    Binding::Operator(op) => op.mark_values(seen),
                }
            }
        }
    }
}

/// Records a value and everything nested in it.
pub fn mark_value(value: &Value, seen: &mut HashSet<u64>) {
    if seen.insert(value.serial()) {
        for cell in value.ravel().iter() {
            if let Scalar::Nested(inner) = cell {
                mark_value(inner, seen);
            }
        }
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, token: &mut Token, left: bool) -> Result<TokenClass, ApplError> {
        let Token::Symbol(id) = token else {
            return Ok(token.class());
        };
        if left {
            return Ok(TokenClass::Symbol);
        }
        let id = *id;
        *token = match self.binding(id) {
            Binding::Unbound => {
                return Err(ApplError::with_detail(
                    ErrorCode::Value,
                    self.name(id).to_string(),
                ))
            }
            Binding::Variable(v) => Token::value(v.clone()),
            Binding::Function(f) => Token::Function(f.clone()),
            Binding::Operator(op) => Token::Operator(op.clone()),
        };
        Ok(token.class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &mut ValueRegistry) -> SymbolTable {
        SymbolTable::new(8, 1, values)
    }

    #[test]
    fn system_names_are_bound() {
        let mut values = ValueRegistry::new();
        let symbols = table(&mut values);
        assert_eq!(symbols.lookup("⎕"), Some(QUAD));
        assert_eq!(symbols.binding(QUAD).class(), TokenClass::Niladic);
        assert_eq!(symbols.index_origin(), 1);
    }

    #[test]
    fn resolve_respects_position() {
        let mut values = ValueRegistry::new();
        let mut symbols = table(&mut values);
        let a = symbols.intern("A").unwrap();
        let mut token = Token::Symbol(a);
        assert_eq!(
            symbols.resolve(&mut token, false).unwrap_err().code(),
            ErrorCode::Value
        );
        assert_eq!(symbols.peek_class(&token, false), TokenClass::Symbol);
        symbols.assign(a, values.int(4)).unwrap();
        assert_eq!(symbols.resolve(&mut token, true).unwrap(), TokenClass::Symbol);
        assert!(matches!(token, Token::Symbol(_)));
        assert_eq!(symbols.resolve(&mut token, false).unwrap(), TokenClass::Value);
        assert_eq!(token.as_value().unwrap().to_int().unwrap(), 4);
    }

    #[test]
    fn localize_shadows_and_restores() {
        let mut values = ValueRegistry::new();
        let mut symbols = table(&mut values);
        let x = symbols.intern("X").unwrap();
        symbols.assign(x, values.int(1)).unwrap();
        symbols.localize(x);
        assert!(symbols.variable(x).is_none());
        symbols.assign(x, values.int(2)).unwrap();
        assert_eq!(symbols.variable(x).unwrap().to_int().unwrap(), 2);
        symbols.unlocalize(x);
        assert_eq!(symbols.variable(x).unwrap().to_int().unwrap(), 1);
        symbols.unlocalize(x);
        assert!(symbols.variable(x).is_some());
    }

    #[test]
    fn capacity_is_a_system_limit() {
        let mut values = ValueRegistry::new();
        let mut symbols = table(&mut values);
        for i in 0..5 {
            symbols.intern(&format!("N{i}")).unwrap();
        }
        assert_eq!(
            symbols.intern("ONE_TOO_MANY").unwrap_err().code(),
            ErrorCode::SystemLimit
        );
        assert!(symbols.intern("N0").is_ok());
    }
}
