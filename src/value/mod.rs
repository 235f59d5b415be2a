//! Array values and the registry of every live value.
//!
//! A [`Value`] is a shared, reference-counted handle. While it is being built
//! (after [`ValueRegistry::alloc`]) it is incomplete and may only be appended
//! to; once [`Value::check_complete`] succeeds it is immutable. The registry
//! keeps one strong reference to every value it created, so a value is stale
//! exactly when the registry holds its only reference.
mod format;
pub mod ops;

use std::{
    cell::{Ref, RefCell},
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{ApplError, ErrorCode};

pub use format::{format_number, format_value};

/// Filler for cells of a value that was still under construction when its
/// producer failed.
pub const SENTINEL: Scalar = Scalar::Int(0);

/// Comparison tolerance for float equality.
const CT: f64 = 1e-13;

/// One cell of an array.
#[derive(Clone, Debug)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Char(char),
    Nested(Value),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of a numeric cell; floats within tolerance of an integer qualify.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if (f - f.round()).abs() < 1e-9 && f.abs() < 9.0e15 => {
                Some(f.round() as i64)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_char(&self) -> bool {
        matches!(self, Self::Char(_))
    }

    #[inline]
    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Nested(_))
    }

    /// Normalizes a float result to an integer cell when it is exact.
    pub fn from_f64(f: f64) -> Self {
        if f.fract() == 0.0 && f.abs() < 9.0e15 {
            Self::Int(f as i64)
        } else {
            Self::Float(f)
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Nested(a), Self::Nested(b)) => a.matches(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => {
                    x == y || (x - y).abs() <= CT * x.abs().max(y.abs())
                }
                _ => false,
            },
        }
    }
}

struct ValueData {
    serial: u64,
    shape: Vec<usize>,
    ravel: RefCell<Vec<Scalar>>,
    complete: std::cell::Cell<bool>,
}

/// Handle to an array: shape plus ravel of cells.
#[derive(Clone)]
pub struct Value(Rc<ValueData>);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}{:?}", self.serial(), self.shape())?;
        if !self.is_complete() {
            write!(f, "(incomplete)")?;
        }
        Ok(())
    }
}

impl Value {
    #[inline]
    pub fn serial(&self) -> u64 {
        self.0.serial
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.0.shape.len()
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.0.shape.iter().product()
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.0.shape.is_empty()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.0.complete.get()
    }

    pub fn ravel(&self) -> Ref<'_, [Scalar]> {
        Ref::map(self.0.ravel.borrow(), |r| r.as_slice())
    }

    pub fn element_at(&self, i: usize) -> Option<Scalar> {
        self.0.ravel.borrow().get(i).cloned()
    }

    /// First cell, or the numeric prototype for an empty array.
    pub fn first(&self) -> Scalar {
        self.element_at(0).unwrap_or(Scalar::Int(0))
    }

    pub fn is_char_array(&self) -> bool {
        self.element_count() > 0 && self.ravel().iter().all(Scalar::is_char)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Appends a cell to a value under construction.
    pub fn push(&self, cell: Scalar) -> Result<(), ApplError> {
        if self.is_complete() {
            return Err(ApplError::assertion("append to a complete value"));
        }
        let mut ravel = self.0.ravel.borrow_mut();
        if ravel.len() >= self.element_count() {
            return Err(ApplError::assertion("value ravel overflow"));
        }
        ravel.push(cell);
        Ok(())
    }

    /// Marks a value under construction as complete.
    pub fn check_complete(&self) -> Result<(), ApplError> {
        if self.0.ravel.borrow().len() != self.element_count() {
            return Err(ApplError::assertion(format!(
                "value {} completed with {} of {} cells",
                self.serial(),
                self.0.ravel.borrow().len(),
                self.element_count()
            )));
        }
        self.0.complete.set(true);
        Ok(())
    }

    /// Fills the missing cells with [`SENTINEL`] and marks the value complete.
    fn finalize(&self) {
        let count = self.element_count();
        self.0.ravel.borrow_mut().resize(count, SENTINEL);
        self.0.complete.set(true);
    }

    /// Values directly referenced by nested cells.
    pub fn nested_values(&self) -> Vec<Value> {
        self.ravel()
            .iter()
            .filter_map(|c| match c {
                Scalar::Nested(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// APL match: same shape and equal cells.
    pub fn matches(&self, other: &Value) -> bool {
        self.ptr_eq(other)
            || (self.shape() == other.shape()
                && self
                    .ravel()
                    .iter()
                    .zip(other.ravel().iter())
                    .all(|(a, b)| a == b))
    }

    /// Integer cells, or DOMAIN ERROR.
    pub fn to_ints(&self) -> Result<Vec<i64>, ApplError> {
        self.ravel()
            .iter()
            .map(|c| c.as_int().ok_or_else(|| ApplError::new(ErrorCode::Domain)))
            .collect()
    }

    /// The single integer of a scalar or one-element array.
    pub fn to_int(&self) -> Result<i64, ApplError> {
        if self.element_count() != 1 {
            return Err(ErrorCode::Length.into());
        }
        self.first()
            .as_int()
            .ok_or_else(|| ApplError::new(ErrorCode::Domain))
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// Counts reported by [`ValueRegistry::sweep_stale`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Values dropped because nothing but the registry referenced them
    pub swept: usize,
    /// Incomplete values filled with the sentinel
    pub finalized: usize,
    /// Values still live after the sweep
    pub live: usize,
}

/// Registry of every value created by the interpreter.
#[derive(Default)]
pub struct ValueRegistry {
    live: IndexMap<u64, Value>,
    next_serial: u64,
}

impl ValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an incomplete value, exclusively owned by the caller.
    pub fn alloc(&mut self, shape: Vec<usize>) -> Value {
        let count: usize = shape.iter().product();
        let value = Value(Rc::new(ValueData {
            serial: self.next_serial,
            shape,
            ravel: RefCell::new(Vec::with_capacity(count)),
            complete: std::cell::Cell::new(false),
        }));
        self.live.insert(self.next_serial, value.clone());
        self.next_serial += 1;
        value
    }

    pub fn make(&mut self, shape: Vec<usize>, ravel: Vec<Scalar>) -> Result<Value, ApplError> {
        let value = self.alloc(shape);
        *value.0.ravel.borrow_mut() = ravel;
        value.check_complete()?;
        Ok(value)
    }

    pub fn scalar(&mut self, cell: Scalar) -> Value {
        let value = self.alloc(vec![]);
        value.0.ravel.borrow_mut().push(cell);
        value.0.complete.set(true);
        value
    }

    #[inline]
    pub fn int(&mut self, i: i64) -> Value {
        self.scalar(Scalar::Int(i))
    }

    pub fn vector(&mut self, cells: Vec<Scalar>) -> Value {
        let value = self.alloc(vec![cells.len()]);
        *value.0.ravel.borrow_mut() = cells;
        value.0.complete.set(true);
        value
    }

    pub fn chars(&mut self, s: &str) -> Value {
        self.vector(s.chars().map(Scalar::Char).collect())
    }

    pub fn empty(&mut self) -> Value {
        self.vector(vec![])
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, serial: u64) -> bool {
        self.live.contains_key(&serial)
    }

    pub fn live_serials(&self) -> Vec<u64> {
        self.live.keys().copied().collect()
    }

    /// Number of live values nothing but the registry refers to.
    pub fn stale_count(&self) -> usize {
        self.live.values().filter(|v| v.strong_count() == 1).count()
    }

    /// Drops stale values and finalizes incomplete ones. Must only run while no
    /// reduction is in flight.
    pub fn sweep_stale(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        loop {
            let stale: Vec<u64> = self
                .live
                .iter()
                .filter(|(_, v)| v.strong_count() == 1)
                .map(|(serial, _)| *serial)
                .collect();
            if stale.is_empty() {
                break;
            }
            for serial in stale {
                if let Some(value) = self.live.swap_remove(&serial) {
                    if !value.is_complete() {
                        value.finalize();
                        report.finalized += 1;
                    }
                    report.swept += 1;
                }
            }
        }
        for value in self.live.values() {
            if !value.is_complete() {
                warn!("finalizing incomplete value {value:?}");
                value.finalize();
                report.finalized += 1;
            }
        }
        report.live = self.live.len();
        debug!(
            "sweep: {} stale, {} finalized, {} live",
            report.swept, report.finalized, report.live
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_values_are_swept() {
        let mut reg = ValueRegistry::new();
        let kept = reg.int(1);
        {
            let _temp = reg.int(2);
        }
        assert_eq!(reg.live_count(), 2);
        assert_eq!(reg.stale_count(), 1);
        let report = reg.sweep_stale();
        assert_eq!(report.swept, 1);
        assert_eq!(report.live, 1);
        assert!(reg.is_live(kept.serial()));
    }

    #[test]
    fn nested_children_follow_parent() {
        let mut reg = ValueRegistry::new();
        let inner = reg.vector(vec![Scalar::Int(1), Scalar::Int(2)]);
        let outer = reg.vector(vec![Scalar::Nested(inner), Scalar::Int(3)]);
        assert_eq!(reg.sweep_stale().swept, 0);
        drop(outer);
        let report = reg.sweep_stale();
        assert_eq!(report.swept, 2);
        assert_eq!(reg.live_count(), 0);
    }

    #[test]
    fn incomplete_values_are_finalized() {
        let mut reg = ValueRegistry::new();
        let partial = reg.alloc(vec![3]);
        partial.push(Scalar::Int(7)).unwrap();
        assert!(partial.check_complete().is_err());
        let report = reg.sweep_stale();
        assert_eq!(report.finalized, 1);
        assert!(partial.is_complete());
        assert_eq!(partial.element_at(2), Some(SENTINEL));
        assert!(partial.push(Scalar::Int(1)).is_err());
    }

    #[test]
    fn float_tolerance() {
        assert_eq!(Scalar::Float(0.1 + 0.2), Scalar::Float(0.3));
        assert_eq!(Scalar::Int(3), Scalar::Float(3.0));
        assert_ne!(Scalar::Char('3'), Scalar::Int(3));
        assert_eq!(Scalar::Float(2.0000000000001).as_int(), Some(2));
    }
}
