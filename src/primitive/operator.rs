//! Primitive operators.
//!
//! An operator that applies a function operand keeps its progress in an
//! iteration state. Whenever the operand pushes a nested context (a user
//! function call), the state is installed as a continuation and the
//! operator returns [`Applied::Pushed`]; the continuation's `resume` feeds the
//! nested result back in and carries on from where the iteration stopped.
use std::{collections::HashSet, fmt};

use strum::{EnumIter, EnumString};

use crate::{
    cont::Continuation,
    error::{ApplError, ErrorCode},
    eval::Interpreter,
    function::{Applied, Function, Operand},
    primitive::{axis_index, PrimFn},
    symbol::mark_value,
    value::{
        ops::{self, scalar_value},
        Scalar, Value,
    },
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumString, EnumIter)]
pub enum PrimOp {
    #[strum(serialize = "/")]
    Reduce,
    #[strum(serialize = "\\")]
    Scan,
    #[strum(serialize = "⌿")]
    ReduceFirst,
    #[strum(serialize = "⍀")]
    ScanFirst,
    #[strum(serialize = "¨")]
    Each,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "⍤")]
    Rank,
    #[strum(serialize = "⍣")]
    Power,
}

impl PrimOp {
    #[inline]
    pub fn is_dyadic(self) -> bool {
        matches!(self, Self::Dot | Self::Rank | Self::Power)
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Reduce => "/",
            Self::Scan => "\\",
            Self::ReduceFirst => "⌿",
            Self::ScanFirst => "⍀",
            Self::Each => "¨",
            Self::Dot => ".",
            Self::Rank => "⍤",
            Self::Power => "⍣",
        }
    }
}

impl fmt::Display for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

/// The value of an operand application, or `None` once a nested context was
/// pushed for it.
fn operand_result(applied: Applied) -> Result<Option<Value>, ApplError> {
    match applied {
        Applied::Value(v) => Ok(Some(v)),
        Applied::Void => Err(ApplError::with_detail(
            ErrorCode::Value,
            "operand function returned no result",
        )),
        Applied::Pushed => Ok(None),
    }
}

fn suspend(interp: &mut Interpreter, cont: Continuation) -> Result<Applied, ApplError> {
    interp.install_continuation(cont)?;
    Ok(Applied::Pushed)
}

fn mark_cells(cells: &[Scalar], seen: &mut HashSet<u64>) {
    for cell in cells {
        if let Scalar::Nested(v) = cell {
            mark_value(v, seen);
        }
    }
}

/// Applies a derived function `left OP right`.
pub fn apply(
    interp: &mut Interpreter,
    op: PrimOp,
    axis: Option<&Value>,
    left: &Operand,
    right: Option<&Operand>,
    a: Option<Value>,
    b: Value,
) -> Result<Applied, ApplError> {
    let axis = axis
        .map(|v| axis_index(v, interp.index_origin()))
        .transpose()?;
    match op {
        PrimOp::Reduce | PrimOp::Scan | PrimOp::ReduceFirst | PrimOp::ScanFirst => {
            if a.is_some() {
                return Err(ErrorCode::Valence.into());
            }
            let first = matches!(op, PrimOp::ReduceFirst | PrimOp::ScanFirst);
            let axis = axis.or(first.then_some(0));
            let scan = matches!(op, PrimOp::Scan | PrimOp::ScanFirst);
            match left {
                Operand::Value(counts) if !scan => {
                    ops::compress(&mut interp.values, counts, &b, axis).map(Applied::Value)
                }
                Operand::Value(_) => Err(ErrorCode::Domain.into()),
                Operand::Function(f) => ReduceState::new(f.clone(), &b, axis, scan)?.run(interp),
            }
        }
        _ if axis.is_some() => Err(ErrorCode::Axis.into()),
        PrimOp::Each => {
            let f = left.as_function()?.clone();
            EachState::new(interp, f, a, &b)?.run(interp)
        }
        PrimOp::Dot => {
            let g = right
                .ok_or_else(|| ApplError::new(ErrorCode::Syntax))?
                .as_function()?
                .clone();
            let a = a.ok_or_else(|| ApplError::new(ErrorCode::Valence))?;
            match left.as_function()? {
                Function::Primitive(PrimFn::Jot) => OuterState::new(interp, g, &a, &b).run(interp),
                f => InnerState::new(f.clone(), g, &a, &b)?.run(interp),
            }
        }
        PrimOp::Rank => {
            let f = left.as_function()?.clone();
            let Some(Operand::Value(k)) = right else {
                return Err(ErrorCode::Domain.into());
            };
            RankState::new(interp, f, k, a, &b)?.run(interp)
        }
        PrimOp::Power => {
            let f = left.as_function()?.clone();
            let state = match right {
                Some(Operand::Value(n)) => {
                    let n = usize::try_from(n.to_int()?)
                        .map_err(|_| ApplError::new(ErrorCode::Domain))?;
                    PowerState::times(f, a, b, n)
                }
                Some(Operand::Function(g)) => PowerState::until(f, g.clone(), a, b),
                None => return Err(ErrorCode::Syntax.into()),
            };
            state.run(interp)
        }
    }
}

/// Reduction and scan: each job is folded right to left.
#[derive(Debug)]
pub struct ReduceState {
    function: Function,
    jobs: Vec<Vec<Scalar>>,
    job: usize,
    /// Position of the next item to fold into `acc`
    pos: usize,
    acc: Option<Value>,
    results: Vec<Value>,
    shape: Vec<usize>,
    /// Axis and its length when scanning
    scan: Option<(usize, usize)>,
}

impl ReduceState {
    fn new(function: Function, b: &Value, axis: Option<usize>, scan: bool) -> Result<Self, ApplError> {
        let (reduced_shape, vectors) = ops::vectors_along(b, axis)?;
        let (jobs, shape, scan) = if scan {
            let k = axis.unwrap_or(b.rank().saturating_sub(1));
            let len = b.shape().get(k).copied().unwrap_or(1);
            let jobs = vectors
                .iter()
                .flat_map(|v| (1..=v.len()).map(move |n| v[..n].to_vec()))
                .collect();
            (jobs, b.shape().to_vec(), Some((k, len)))
        } else {
            (vectors, reduced_shape, None)
        };
        Ok(Self {
            function,
            jobs,
            job: 0,
            pos: 0,
            acc: None,
            results: vec![],
            shape,
            scan,
        })
    }

    fn identity(&self) -> Result<Scalar, ApplError> {
        match &self.function {
            Function::Primitive(p) => p
                .identity()
                .ok_or_else(|| ApplError::new(ErrorCode::Domain)),
            _ => Err(ErrorCode::Domain.into()),
        }
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        while self.job < self.jobs.len() {
            if self.acc.is_none() {
                let items = &self.jobs[self.job];
                let last = match items.last() {
                    Some(cell) => cell.clone(),
                    None => self.identity()?,
                };
                self.pos = items.len().saturating_sub(1);
                self.acc = Some(scalar_value(&mut interp.values, &last));
            }
            while self.pos > 0 {
                self.pos -= 1;
                let a = scalar_value(&mut interp.values, &self.jobs[self.job][self.pos]);
                let b = self
                    .acc
                    .take()
                    .ok_or_else(|| ApplError::assertion("reduction without accumulator"))?;
                match operand_result(self.function.apply(interp, Some(a), b)?)? {
                    Some(v) => self.acc = Some(v),
                    None => return suspend(interp, Continuation::Reduce(self)),
                }
            }
            if let Some(acc) = self.acc.take() {
                self.results.push(acc);
            }
            self.job += 1;
        }
        self.finish(interp)
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        self.acc = Some(value);
        self.run(interp)
    }

    fn finish(self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        let reg = &mut interp.values;
        let value = match self.scan {
            None => ops::assemble_items(reg, self.shape, self.results)?,
            Some((k, len)) => {
                let inner: usize = self.shape.get(k + 1..).map_or(1, |s| s.iter().product());
                let mut cells = vec![Scalar::Int(0); self.results.len()];
                for (n, result) in self.results.into_iter().enumerate() {
                    let (vector, j) = (n / len, n % len);
                    let (o, i) = (vector / inner, vector % inner);
                    cells[(o * len + j) * inner + i] = ops::cell_of(result);
                }
                reg.make(self.shape, cells)?
            }
        };
        Ok(Applied::Value(value))
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.function.mark_values(seen);
        self.jobs.iter().for_each(|j| mark_cells(j, seen));
        self.acc.iter().chain(&self.results).for_each(|v| mark_value(v, seen));
    }
}

/// Picks item `i`, extending a single item to every position.
fn item(items: &[Value], i: usize) -> Value {
    if items.len() == 1 {
        items[0].clone()
    } else {
        items[i].clone()
    }
}

/// `F¨B` and `A F¨B`.
#[derive(Debug)]
pub struct EachState {
    function: Function,
    left: Option<Vec<Value>>,
    right: Vec<Value>,
    shape: Vec<usize>,
    next: usize,
    results: Vec<Value>,
}

impl EachState {
    fn new(
        interp: &mut Interpreter,
        function: Function,
        a: Option<Value>,
        b: &Value,
    ) -> Result<Self, ApplError> {
        let shape = match &a {
            None => b.shape().to_vec(),
            Some(a) if a.shape() == b.shape() => b.shape().to_vec(),
            Some(a) if a.element_count() == 1 => b.shape().to_vec(),
            Some(a) if b.element_count() == 1 => a.shape().to_vec(),
            Some(a) if a.rank() != b.rank() => return Err(ErrorCode::Rank.into()),
            Some(_) => return Err(ErrorCode::Length.into()),
        };
        let reg = &mut interp.values;
        Ok(Self {
            function,
            left: a.map(|a| ops::item_values(reg, &a)),
            right: ops::item_values(reg, b),
            shape,
            next: 0,
            results: vec![],
        })
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        let count: usize = self.shape.iter().product();
        while self.next < count {
            let i = self.next;
            self.next += 1;
            let a = self.left.as_deref().map(|items| item(items, i));
            let b = item(&self.right, i);
            match operand_result(self.function.apply(interp, a, b)?)? {
                Some(v) => self.results.push(v),
                None => return suspend(interp, Continuation::Each(self)),
            }
        }
        ops::assemble_items(&mut interp.values, self.shape, self.results).map(Applied::Value)
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        self.results.push(value);
        self.run(interp)
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.function.mark_values(seen);
        self.left
            .iter()
            .flatten()
            .chain(&self.right)
            .chain(&self.results)
            .for_each(|v| mark_value(v, seen));
    }
}

/// `A∘.G B`.
#[derive(Debug)]
pub struct OuterState {
    function: Function,
    left: Vec<Value>,
    right: Vec<Value>,
    shape: Vec<usize>,
    next: usize,
    results: Vec<Value>,
}

impl OuterState {
    fn new(interp: &mut Interpreter, function: Function, a: &Value, b: &Value) -> Self {
        let reg = &mut interp.values;
        let mut shape = a.shape().to_vec();
        shape.extend_from_slice(b.shape());
        Self {
            function,
            left: ops::item_values(reg, a),
            right: ops::item_values(reg, b),
            shape,
            next: 0,
            results: vec![],
        }
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        let count = self.left.len() * self.right.len();
        while self.next < count {
            let (i, j) = (self.next / self.right.len(), self.next % self.right.len());
            self.next += 1;
            let (a, b) = (self.left[i].clone(), self.right[j].clone());
            match operand_result(self.function.apply(interp, Some(a), b)?)? {
                Some(v) => self.results.push(v),
                None => return suspend(interp, Continuation::Outer(self)),
            }
        }
        ops::assemble_items(&mut interp.values, self.shape, self.results).map(Applied::Value)
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        self.results.push(value);
        self.run(interp)
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.function.mark_values(seen);
        self.left
            .iter()
            .chain(&self.right)
            .chain(&self.results)
            .for_each(|v| mark_value(v, seen));
    }
}

/// `A F.G B`: for every row of `A` and column of `B`, the `G` products are
/// folded right to left with `F`.
#[derive(Debug)]
pub struct InnerState {
    reduce: Function,
    combine: Function,
    rows: Vec<Vec<Scalar>>,
    cols: Vec<Vec<Scalar>>,
    len: usize,
    shape: Vec<usize>,
    pair: usize,
    products: Vec<Value>,
    /// Products still to fold, once every product of the pair is known
    fold: Option<usize>,
    acc: Option<Value>,
    results: Vec<Value>,
}

impl InnerState {
    fn new(reduce: Function, combine: Function, a: &Value, b: &Value) -> Result<Self, ApplError> {
        let (rows, frame_a, len_a) = if a.is_scalar() {
            (vec![vec![a.first()]], vec![], None)
        } else {
            let n = a.shape()[a.rank() - 1];
            let ravel = a.ravel();
            let rows = if n == 0 {
                vec![vec![]; a.shape()[..a.rank() - 1].iter().product()]
            } else {
                ravel.chunks(n).map(|c| c.to_vec()).collect()
            };
            (rows, a.shape()[..a.rank() - 1].to_vec(), Some(n))
        };
        let (cols, frame_b, len_b) = if b.is_scalar() {
            (vec![vec![b.first()]], vec![], None)
        } else {
            let n = b.shape()[0];
            let rest: usize = b.shape()[1..].iter().product();
            let ravel = b.ravel();
            let cols = (0..rest)
                .map(|c| (0..n).map(|j| ravel[j * rest + c].clone()).collect())
                .collect();
            (cols, b.shape()[1..].to_vec(), Some(n))
        };
        let len = match (len_a, len_b) {
            (Some(x), Some(y)) if x == y => x,
            (Some(1), Some(y)) | (None, Some(y)) => y,
            (Some(x), Some(1)) | (Some(x), None) => x,
            (None, None) => 1,
            _ => return Err(ErrorCode::Length.into()),
        };
        let mut shape = frame_a;
        shape.extend(frame_b);
        Ok(Self {
            reduce,
            combine,
            rows,
            cols,
            len,
            shape,
            pair: 0,
            products: vec![],
            fold: None,
            acc: None,
            results: vec![],
        })
    }

    fn cell(items: &[Scalar], k: usize) -> Scalar {
        if items.len() == 1 {
            items[0].clone()
        } else {
            items[k].clone()
        }
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        let total = self.rows.len() * self.cols.len();
        while self.pair < total {
            let (r, c) = (self.pair / self.cols.len(), self.pair % self.cols.len());
            while self.fold.is_none() && self.products.len() < self.len {
                let k = self.products.len();
                let x = scalar_value(&mut interp.values, &Self::cell(&self.rows[r], k));
                let y = scalar_value(&mut interp.values, &Self::cell(&self.cols[c], k));
                match operand_result(self.combine.apply(interp, Some(x), y)?)? {
                    Some(v) => self.products.push(v),
                    None => return suspend(interp, Continuation::Inner(self)),
                }
            }
            if self.fold.is_none() {
                match self.products.last() {
                    Some(last) => {
                        self.acc = Some(last.clone());
                        self.fold = Some(self.products.len() - 1);
                    }
                    None => {
                        let identity = match &self.reduce {
                            Function::Primitive(p) => p.identity(),
                            _ => None,
                        }
                        .ok_or_else(|| ApplError::new(ErrorCode::Domain))?;
                        self.acc = Some(interp.values.scalar(identity));
                        self.fold = Some(0);
                    }
                }
            }
            while let Some(k) = self.fold.filter(|&k| k > 0) {
                self.fold = Some(k - 1);
                let x = self.products[k - 1].clone();
                let y = self
                    .acc
                    .take()
                    .ok_or_else(|| ApplError::assertion("inner product without accumulator"))?;
                match operand_result(self.reduce.apply(interp, Some(x), y)?)? {
                    Some(v) => self.acc = Some(v),
                    None => return suspend(interp, Continuation::Inner(self)),
                }
            }
            if let Some(acc) = self.acc.take() {
                self.results.push(acc);
            }
            self.products.clear();
            self.fold = None;
            self.pair += 1;
        }
        ops::assemble_items(&mut interp.values, self.shape, self.results).map(Applied::Value)
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        if self.fold.is_some() {
            self.acc = Some(value);
        } else {
            self.products.push(value);
        }
        self.run(interp)
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.reduce.mark_values(seen);
        self.combine.mark_values(seen);
        self.rows.iter().chain(&self.cols).for_each(|c| mark_cells(c, seen));
        self.products
            .iter()
            .chain(&self.acc)
            .chain(&self.results)
            .for_each(|v| mark_value(v, seen));
    }
}

/// `F⍤k B` and `A F⍤k B`.
#[derive(Debug)]
pub struct RankState {
    function: Function,
    left: Option<Vec<Value>>,
    right: Vec<Value>,
    frame: Vec<usize>,
    next: usize,
    results: Vec<Value>,
}

impl RankState {
    fn new(
        interp: &mut Interpreter,
        function: Function,
        k: &Value,
        a: Option<Value>,
        b: &Value,
    ) -> Result<Self, ApplError> {
        if k.rank() > 1 {
            return Err(ErrorCode::Rank.into());
        }
        // monadic, left and right cell ranks
        let (km, kl, kr) = match k.to_ints()?.as_slice() {
            [c] => (*c, *c, *c),
            [l, r] => (*r, *l, *r),
            [m, l, r] => (*m, *l, *r),
            _ => return Err(ErrorCode::Length.into()),
        };
        let reg = &mut interp.values;
        match a {
            None => {
                let (frame, right) = ops::cells(reg, b, km)?;
                Ok(Self {
                    function,
                    left: None,
                    right,
                    frame,
                    next: 0,
                    results: vec![],
                })
            }
            Some(a) => {
                let (frame_a, left) = ops::cells(reg, &a, kl)?;
                let (frame_b, right) = ops::cells(reg, b, kr)?;
                let frame = if frame_a == frame_b || frame_a.is_empty() {
                    frame_b
                } else if frame_b.is_empty() {
                    frame_a
                } else if frame_a.len() != frame_b.len() {
                    return Err(ErrorCode::Rank.into());
                } else {
                    return Err(ErrorCode::Length.into());
                };
                Ok(Self {
                    function,
                    left: Some(left),
                    right,
                    frame,
                    next: 0,
                    results: vec![],
                })
            }
        }
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        let count: usize = self.frame.iter().product();
        while self.next < count {
            let i = self.next;
            self.next += 1;
            let a = self.left.as_deref().map(|cells| item(cells, i));
            let b = item(&self.right, i);
            match operand_result(self.function.apply(interp, a, b)?)? {
                Some(v) => self.results.push(v),
                None => return suspend(interp, Continuation::Rank(self)),
            }
        }
        ops::assemble_cells(&mut interp.values, self.frame, self.results).map(Applied::Value)
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        self.results.push(value);
        self.run(interp)
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.function.mark_values(seen);
        self.left
            .iter()
            .flatten()
            .chain(&self.right)
            .chain(&self.results)
            .for_each(|v| mark_value(v, seen));
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PowerPhase {
    Times,
    /// Next: apply the function
    Step,
    /// Next: test the last two values
    Test,
}

/// `F⍣n B` applies `F` n times; `F⍣G B` applies it until `new G old` is 1.
#[derive(Debug)]
pub struct PowerState {
    function: Function,
    test: Option<Function>,
    left: Option<Value>,
    current: Value,
    remaining: usize,
    /// The value before the last application, while its test is pending
    previous: Option<Value>,
}

impl PowerState {
    fn times(function: Function, left: Option<Value>, b: Value, n: usize) -> Self {
        Self {
            function,
            test: None,
            left,
            current: b,
            remaining: n,
            previous: None,
        }
    }

    fn until(function: Function, test: Function, left: Option<Value>, b: Value) -> Self {
        Self {
            function,
            test: Some(test),
            left,
            current: b,
            remaining: 0,
            previous: None,
        }
    }

    fn phase(&self) -> PowerPhase {
        match (&self.test, &self.previous) {
            (None, _) => PowerPhase::Times,
            (Some(_), None) => PowerPhase::Step,
            (Some(_), Some(_)) => PowerPhase::Test,
        }
    }

    /// Takes in the result of the last application; true when done.
    fn accept(&mut self, value: Value) -> Result<bool, ApplError> {
        match self.phase() {
            PowerPhase::Times => {
                self.current = value;
                Ok(false)
            }
            PowerPhase::Step => {
                self.previous = Some(std::mem::replace(&mut self.current, value));
                Ok(false)
            }
            PowerPhase::Test => match value.to_int()? {
                1 => Ok(true),
                0 => {
                    self.previous = None;
                    Ok(false)
                }
                _ => Err(ErrorCode::Domain.into()),
            },
        }
    }

    pub fn run(mut self, interp: &mut Interpreter) -> Result<Applied, ApplError> {
        loop {
            let applied = match self.phase() {
                PowerPhase::Times if self.remaining == 0 => {
                    return Ok(Applied::Value(self.current))
                }
                PowerPhase::Times => {
                    self.remaining -= 1;
                    self.function
                        .apply(interp, self.left.clone(), self.current.clone())?
                }
                PowerPhase::Step => self
                    .function
                    .apply(interp, self.left.clone(), self.current.clone())?,
                PowerPhase::Test => match (&self.test, &self.previous) {
                    (Some(test), Some(previous)) => {
                        test.apply(interp, Some(self.current.clone()), previous.clone())?
                    }
                    _ => return Err(ApplError::assertion("power test without operands")),
                },
            };
            match operand_result(applied)? {
                Some(v) => {
                    if self.accept(v)? {
                        return Ok(Applied::Value(self.current));
                    }
                }
                None => return suspend(interp, Continuation::Power(self)),
            }
        }
    }

    pub fn resume(mut self, interp: &mut Interpreter, value: Value) -> Result<Applied, ApplError> {
        if self.accept(value)? {
            return Ok(Applied::Value(self.current));
        }
        self.run(interp)
    }

    pub fn mark_values(&self, seen: &mut HashSet<u64>) {
        self.function.mark_values(seen);
        if let Some(test) = &self.test {
            test.mark_values(seen);
        }
        self.left
            .iter()
            .chain(Some(&self.current))
            .chain(&self.previous)
            .for_each(|v| mark_value(v, seen));
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn glyphs_round_trip() {
        for op in PrimOp::iter() {
            assert_eq!(PrimOp::from_str(op.glyph()).unwrap(), op);
        }
    }

    #[test]
    fn valence() {
        let dyadic: Vec<_> = PrimOp::iter().filter(|op| op.is_dyadic()).collect();
        assert_eq!(dyadic, vec![PrimOp::Dot, PrimOp::Rank, PrimOp::Power]);
    }
}
