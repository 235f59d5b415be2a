//! Structural and scalar array operations used by the primitives.
use itertools::Itertools;

use super::{Scalar, Value, ValueRegistry};
use crate::{
    error::{ApplError, ErrorCode},
    token::IndexList,
};

pub type ScalarFn = fn(&Scalar, &Scalar) -> Result<Scalar, ApplError>;
pub type MonadicScalarFn = fn(&Scalar) -> Result<Scalar, ApplError>;

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Wraps a cell as a value: nested cells are disclosed, simple cells become scalars.
pub fn scalar_value(reg: &mut ValueRegistry, cell: &Scalar) -> Value {
    match cell {
        Scalar::Nested(v) => v.clone(),
        simple => reg.scalar(simple.clone()),
    }
}

/// Wraps a value as a cell: simple scalars are unwrapped, anything else is enclosed.
pub fn cell_of(value: Value) -> Scalar {
    if value.is_scalar() && !value.first().is_nested() {
        value.first()
    } else {
        Scalar::Nested(value)
    }
}

/// Shape of the result of a scalar function, with singleton extension.
fn conform(a: &Value, b: &Value) -> Result<Vec<usize>, ApplError> {
    if a.shape() == b.shape() {
        Ok(a.shape().to_vec())
    } else if a.element_count() == 1 && a.rank() <= b.rank() {
        Ok(b.shape().to_vec())
    } else if b.element_count() == 1 && b.rank() <= a.rank() {
        Ok(a.shape().to_vec())
    } else if a.rank() != b.rank() {
        Err(ErrorCode::Rank.into())
    } else {
        Err(ErrorCode::Length.into())
    }
}

pub fn pervade_dyadic(
    reg: &mut ValueRegistry,
    f: ScalarFn,
    a: &Value,
    b: &Value,
) -> Result<Value, ApplError> {
    let shape = conform(a, b)?;
    let count: usize = shape.iter().product();
    let mut cells = Vec::with_capacity(count);
    {
        let (ra, rb) = (a.ravel(), b.ravel());
        for i in 0..count {
            let x = if ra.len() == 1 { &ra[0] } else { &ra[i] };
            let y = if rb.len() == 1 { &rb[0] } else { &rb[i] };
            cells.push(pervade_cell(reg, f, x, y)?);
        }
    }
    reg.make(shape, cells)
}

fn pervade_cell(
    reg: &mut ValueRegistry,
    f: ScalarFn,
    x: &Scalar,
    y: &Scalar,
) -> Result<Scalar, ApplError> {
    match (x, y) {
        (Scalar::Nested(u), Scalar::Nested(v)) => Ok(cell_of(pervade_dyadic(reg, f, u, v)?)),
        (Scalar::Nested(u), y) => {
            let y = reg.scalar(y.clone());
            Ok(cell_of(pervade_dyadic(reg, f, u, &y)?))
        }
        (x, Scalar::Nested(v)) => {
            let x = reg.scalar(x.clone());
            Ok(cell_of(pervade_dyadic(reg, f, &x, v)?))
        }
        (x, y) => f(x, y),
    }
}

pub fn pervade_monadic(
    reg: &mut ValueRegistry,
    f: MonadicScalarFn,
    b: &Value,
) -> Result<Value, ApplError> {
    let mut cells = Vec::with_capacity(b.element_count());
    {
        let rb = b.ravel();
        for cell in rb.iter() {
            cells.push(match cell {
                Scalar::Nested(v) => cell_of(pervade_monadic(reg, f, v)?),
                simple => f(simple)?,
            });
        }
    }
    reg.make(b.shape().to_vec(), cells)
}

pub fn iota(reg: &mut ValueRegistry, n: i64, io: i64) -> Result<Value, ApplError> {
    if n < 0 {
        return Err(ErrorCode::Domain.into());
    }
    Ok(reg.vector((0..n).map(|i| Scalar::Int(i + io)).collect()))
}

pub fn shape_of(reg: &mut ValueRegistry, b: &Value) -> Value {
    reg.vector(b.shape().iter().map(|&d| Scalar::Int(d as i64)).collect())
}

pub fn reshape(reg: &mut ValueRegistry, shape: &Value, b: &Value) -> Result<Value, ApplError> {
    if shape.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let dims = shape
        .to_ints()?
        .into_iter()
        .map(|d| usize::try_from(d).map_err(|_| ApplError::new(ErrorCode::Domain)))
        .collect::<Result<Vec<_>, _>>()?;
    let count: usize = dims.iter().product();
    let source = b.ravel();
    let cells = if source.is_empty() {
        vec![Scalar::Int(0); count]
    } else {
        source.iter().cycle().take(count).cloned().collect()
    };
    std::mem::drop(source);
    reg.make(dims, cells)
}

pub fn ravel(reg: &mut ValueRegistry, b: &Value) -> Value {
    let cells = b.ravel().to_vec();
    reg.vector(cells)
}

/// Catenates along `axis` (0-based), which defaults to the last axis of the
/// higher-rank argument.
pub fn catenate(
    reg: &mut ValueRegistry,
    a: &Value,
    b: &Value,
    axis: Option<usize>,
) -> Result<Value, ApplError> {
    if a.is_scalar() && b.is_scalar() {
        return Ok(reg.vector(vec![a.first(), b.first()]));
    }
    let rank = a.rank().max(b.rank());
    let k = axis.unwrap_or(rank - 1);
    if k >= rank {
        return Err(ErrorCode::Axis.into());
    }
    let promote = |v: &Value, other: &Value| -> Result<Vec<usize>, ApplError> {
        if v.is_scalar() {
            let mut shape = other.shape().to_vec();
            shape[k] = 1;
            Ok(shape)
        } else if v.rank() + 1 == rank {
            let mut shape = v.shape().to_vec();
            shape.insert(k, 1);
            Ok(shape)
        } else if v.rank() == rank {
            Ok(v.shape().to_vec())
        } else {
            Err(ErrorCode::Rank.into())
        }
    };
    let (sa, sb) = (promote(a, b)?, promote(b, a)?);
    for i in 0..rank {
        if i != k && sa[i] != sb[i] {
            return Err(ErrorCode::Length.into());
        }
    }
    let mut shape = sa.clone();
    shape[k] = sa[k] + sb[k];
    let inner: usize = shape[k + 1..].iter().product();
    let outer: usize = shape[..k].iter().product();
    let (la, lb) = (sa[k] * inner, sb[k] * inner);
    let mut cells = Vec::with_capacity(outer * (la + lb));
    {
        let (ra, rb) = (a.ravel(), b.ravel());
        for o in 0..outer {
            for (r, len) in [(&ra, la), (&rb, lb)] {
                if r.len() == 1 && len != 1 {
                    cells.extend(std::iter::repeat(r[0].clone()).take(len));
                } else if r.len() == 1 {
                    cells.push(r[0].clone());
                } else {
                    cells.extend_from_slice(&r[o * len..(o + 1) * len]);
                }
            }
        }
    }
    reg.make(shape, cells)
}

pub fn reverse(reg: &mut ValueRegistry, b: &Value, axis: Option<usize>) -> Result<Value, ApplError> {
    if b.is_scalar() {
        return Ok(b.clone());
    }
    let k = axis.unwrap_or(b.rank() - 1);
    if k >= b.rank() {
        return Err(ErrorCode::Axis.into());
    }
    let shape = b.shape().to_vec();
    let st = strides(&shape);
    let source = b.ravel();
    let cells = (0..source.len())
        .map(|i| {
            let pos = (i / st[k]) % shape[k];
            let mirrored = i - pos * st[k] + (shape[k] - 1 - pos) * st[k];
            source[mirrored].clone()
        })
        .collect();
    std::mem::drop(source);
    reg.make(shape, cells)
}

/// Rotates every vector along `axis` left by the scalar count `n`.
pub fn rotate(
    reg: &mut ValueRegistry,
    n: &Value,
    b: &Value,
    axis: Option<usize>,
) -> Result<Value, ApplError> {
    let n = n.to_int()?;
    if b.is_scalar() {
        return Ok(b.clone());
    }
    let k = axis.unwrap_or(b.rank() - 1);
    if k >= b.rank() {
        return Err(ErrorCode::Axis.into());
    }
    let shape = b.shape().to_vec();
    if shape[k] == 0 {
        return Ok(b.clone());
    }
    let st = strides(&shape);
    let len = shape[k] as i64;
    let source = b.ravel();
    let cells = (0..source.len())
        .map(|i| {
            let pos = ((i / st[k]) % shape[k]) as i64;
            let from = (pos + n).rem_euclid(len);
            source[(i as i64 + (from - pos) * st[k] as i64) as usize].clone()
        })
        .collect();
    std::mem::drop(source);
    reg.make(shape, cells)
}

fn fill_for(b: &Value) -> Scalar {
    if b.first().is_char() {
        Scalar::Char(' ')
    } else {
        Scalar::Int(0)
    }
}

pub fn take_n(reg: &mut ValueRegistry, n: &Value, b: &Value) -> Result<Value, ApplError> {
    if b.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let n = n.to_int()?;
    let source = b.ravel().to_vec();
    let len = source.len() as i64;
    let fill = fill_for(b);
    let count = n.unsigned_abs() as usize;
    let cells = if n >= 0 {
        (0..count)
            .map(|i| source.get(i).cloned().unwrap_or_else(|| fill.clone()))
            .collect()
    } else {
        let start = len - count as i64;
        (0..count as i64)
            .map(|i| {
                let j = start + i;
                if j < 0 {
                    fill.clone()
                } else {
                    source[j as usize].clone()
                }
            })
            .collect()
    };
    Ok(reg.vector(cells))
}

pub fn drop_n(reg: &mut ValueRegistry, n: &Value, b: &Value) -> Result<Value, ApplError> {
    if b.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let n = n.to_int()?;
    let source = b.ravel().to_vec();
    let count = (n.unsigned_abs() as usize).min(source.len());
    let cells = if n >= 0 {
        source[count..].to_vec()
    } else {
        source[..source.len() - count].to_vec()
    };
    Ok(reg.vector(cells))
}

pub fn enclose(reg: &mut ValueRegistry, b: &Value) -> Value {
    if b.is_scalar() && !b.first().is_nested() {
        b.clone()
    } else {
        reg.scalar(Scalar::Nested(b.clone()))
    }
}

pub fn first(reg: &mut ValueRegistry, b: &Value) -> Value {
    let cell = b.first();
    scalar_value(reg, &cell)
}

pub fn depth(b: &Value) -> i64 {
    if b.is_scalar() && !b.first().is_nested() {
        return 0;
    }
    1 + b
        .ravel()
        .iter()
        .map(|c| match c {
            Scalar::Nested(v) => depth(v),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Per-axis selections of an index list, as 0-based positions plus the shape
/// each selection contributes to the result.
fn selections(
    a: &Value,
    idx: &IndexList,
    io: i64,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>, ApplError> {
    if idx.len() != a.rank() {
        return Err(ErrorCode::Rank.into());
    }
    idx.items()
        .iter()
        .zip(a.shape())
        .map(|(item, &len)| match item {
            None => Ok(((0..len).collect(), vec![len])),
            Some(v) => {
                let positions = v
                    .to_ints()?
                    .into_iter()
                    .map(|i| {
                        let p = i - io;
                        if p < 0 || p >= len as i64 {
                            Err(ApplError::new(ErrorCode::Index))
                        } else {
                            Ok(p as usize)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((positions, v.shape().to_vec()))
            }
        })
        .collect()
}

/// Offsets of every selected cell, in result order.
fn selected_offsets(a: &Value, sels: &[(Vec<usize>, Vec<usize>)]) -> Vec<usize> {
    let st = strides(a.shape());
    sels.iter()
        .enumerate()
        .map(|(k, (positions, _))| positions.iter().map(|p| p * st[k]).collect::<Vec<_>>())
        .multi_cartesian_product()
        .map(|parts| parts.into_iter().sum())
        .collect()
}

pub fn index(reg: &mut ValueRegistry, a: &Value, idx: &IndexList, io: i64) -> Result<Value, ApplError> {
    let sels = selections(a, idx, io)?;
    let shape: Vec<usize> = sels.iter().flat_map(|(_, s)| s.clone()).collect();
    let offsets = if sels.is_empty() {
        vec![0]
    } else {
        selected_offsets(a, &sels)
    };
    let source = a.ravel();
    let cells = offsets.iter().map(|&o| source[o].clone()).collect();
    std::mem::drop(source);
    reg.make(shape, cells)
}

/// Copy of `a` with the indexed cells replaced by `b`.
pub fn index_assign(
    reg: &mut ValueRegistry,
    a: &Value,
    idx: &IndexList,
    b: &Value,
    io: i64,
) -> Result<Value, ApplError> {
    let sels = selections(a, idx, io)?;
    let shape: Vec<usize> = sels.iter().flat_map(|(_, s)| s.clone()).collect();
    let offsets = selected_offsets(a, &sels);
    if b.element_count() != 1 {
        let trimmed: Vec<usize> = shape.iter().copied().filter(|&d| d != 1).collect();
        let given: Vec<usize> = b.shape().iter().copied().filter(|&d| d != 1).collect();
        if trimmed.len() != given.len() {
            return Err(ErrorCode::Rank.into());
        }
        if trimmed != given {
            return Err(ErrorCode::Length.into());
        }
    }
    let mut cells = a.ravel().to_vec();
    {
        let rb = b.ravel();
        for (i, &o) in offsets.iter().enumerate() {
            cells[o] = if rb.len() == 1 {
                rb[0].clone()
            } else {
                rb[i].clone()
            };
        }
    }
    reg.make(a.shape().to_vec(), cells)
}

/// Replicate along `axis` (0-based, default last).
pub fn compress(
    reg: &mut ValueRegistry,
    counts: &Value,
    b: &Value,
    axis: Option<usize>,
) -> Result<Value, ApplError> {
    if counts.rank() > 1 {
        return Err(ErrorCode::Rank.into());
    }
    let counts = counts
        .to_ints()?
        .into_iter()
        .map(|c| usize::try_from(c).map_err(|_| ApplError::new(ErrorCode::Domain)))
        .collect::<Result<Vec<_>, _>>()?;
    let (shape, cells) = if b.is_scalar() {
        (vec![counts.len()], vec![b.first(); counts.len()])
    } else {
        (b.shape().to_vec(), b.ravel().to_vec())
    };
    let k = axis.unwrap_or(shape.len() - 1);
    if k >= shape.len() {
        return Err(ErrorCode::Axis.into());
    }
    let counts = match counts.len() {
        1 => vec![counts[0]; shape[k]],
        n if n == shape[k] => counts,
        _ => return Err(ErrorCode::Length.into()),
    };
    let inner: usize = shape[k + 1..].iter().product();
    let outer: usize = shape[..k].iter().product();
    let mut result = Vec::new();
    for o in 0..outer {
        for (j, &c) in counts.iter().enumerate() {
            let start = (o * shape[k] + j) * inner;
            for _ in 0..c {
                result.extend_from_slice(&cells[start..start + inner]);
            }
        }
    }
    let mut new_shape = shape;
    new_shape[k] = counts.iter().sum();
    reg.make(new_shape, result)
}

/// The items of a value as standalone values (cells disclosed).
pub fn item_values(reg: &mut ValueRegistry, b: &Value) -> Vec<Value> {
    let cells = b.ravel().to_vec();
    cells.iter().map(|c| scalar_value(reg, c)).collect()
}

/// Splits `b` into its cells of rank `k`; negative `k` counts from the full rank.
pub fn cells(
    reg: &mut ValueRegistry,
    b: &Value,
    k: i64,
) -> Result<(Vec<usize>, Vec<Value>), ApplError> {
    let rank = b.rank() as i64;
    let k = if k < 0 { (rank + k).max(0) } else { k.min(rank) } as usize;
    let split = b.rank() - k;
    let frame = b.shape()[..split].to_vec();
    let cell_shape = b.shape()[split..].to_vec();
    let size: usize = cell_shape.iter().product();
    let count: usize = frame.iter().product();
    let source = b.ravel().to_vec();
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(reg.make(cell_shape.clone(), source[i * size..(i + 1) * size].to_vec())?);
    }
    Ok((frame, out))
}

/// Frame-shaped array of results, each enclosed unless a simple scalar.
pub fn assemble_items(
    reg: &mut ValueRegistry,
    frame: Vec<usize>,
    results: Vec<Value>,
) -> Result<Value, ApplError> {
    let cells = results.into_iter().map(cell_of).collect();
    reg.make(frame, cells)
}

/// Frame-shaped array of equally shaped results, flattened into one array.
pub fn assemble_cells(
    reg: &mut ValueRegistry,
    frame: Vec<usize>,
    results: Vec<Value>,
) -> Result<Value, ApplError> {
    let cell_shape = results.first().map(|r| r.shape().to_vec()).unwrap_or_default();
    if results.iter().any(|r| r.shape() != cell_shape.as_slice()) {
        return Err(ErrorCode::Domain.into());
    }
    let cells = results.iter().flat_map(|r| r.ravel().to_vec()).collect();
    let mut shape = frame;
    shape.extend(cell_shape);
    reg.make(shape, cells)
}

/// For a reduction along `axis`: the result shape and each vector along the axis.
pub fn vectors_along(b: &Value, axis: Option<usize>) -> Result<(Vec<usize>, Vec<Vec<Scalar>>), ApplError> {
    if b.is_scalar() {
        return Ok((vec![], vec![vec![b.first()]]));
    }
    let k = axis.unwrap_or(b.rank() - 1);
    if k >= b.rank() {
        return Err(ErrorCode::Axis.into());
    }
    let shape = b.shape();
    let inner: usize = shape[k + 1..].iter().product();
    let outer: usize = shape[..k].iter().product();
    let source = b.ravel();
    let mut vectors = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            vectors.push(
                (0..shape[k])
                    .map(|j| source[(o * shape[k] + j) * inner + i].clone())
                    .collect(),
            );
        }
    }
    let mut result_shape = shape.to_vec();
    result_shape.remove(k);
    Ok((result_shape, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(reg: &mut ValueRegistry, shape: Vec<usize>, xs: &[i64]) -> Value {
        reg.make(shape, xs.iter().map(|&i| Scalar::Int(i)).collect())
            .unwrap()
    }

    fn add(x: &Scalar, y: &Scalar) -> Result<Scalar, ApplError> {
        Ok(Scalar::Int(x.as_int().unwrap() + y.as_int().unwrap()))
    }

    #[test]
    fn scalar_extension() {
        let mut reg = ValueRegistry::new();
        let a = reg.int(10);
        let b = ints(&mut reg, vec![3], &[1, 2, 3]);
        let r = pervade_dyadic(&mut reg, add, &a, &b).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![11, 12, 13]);
        let c = ints(&mut reg, vec![2], &[1, 2]);
        assert_eq!(
            pervade_dyadic(&mut reg, add, &b, &c).unwrap_err().code(),
            ErrorCode::Length
        );
    }

    #[test]
    fn catenate_matrix_first_axis() {
        let mut reg = ValueRegistry::new();
        let m = ints(&mut reg, vec![2, 2], &[1, 2, 3, 4]);
        let v = ints(&mut reg, vec![2], &[5, 6]);
        let r = catenate(&mut reg, &m, &v, Some(0)).unwrap();
        assert_eq!(r.shape(), &[3, 2]);
        assert_eq!(r.to_ints().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        let r = catenate(&mut reg, &m, &v, None).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![1, 2, 5, 3, 4, 6]);
    }

    #[test]
    fn reverse_axes() {
        let mut reg = ValueRegistry::new();
        let m = ints(&mut reg, vec![2, 3], &[1, 2, 3, 4, 5, 6]);
        let r = reverse(&mut reg, &m, None).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![3, 2, 1, 6, 5, 4]);
        let r = reverse(&mut reg, &m, Some(0)).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![4, 5, 6, 1, 2, 3]);
        for n in 0..6 {
            let v = ints(&mut reg, vec![n], &(1..=n as i64).collect::<Vec<_>>());
            let r = reverse(&mut reg, &v, None).unwrap();
            assert_eq!(r.to_ints().unwrap(), (1..=n as i64).rev().collect::<Vec<_>>());
        }
        let one = reg.int(1);
        let r = rotate(&mut reg, &one, &m, None).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![2, 3, 1, 5, 6, 4]);
        let back = reg.int(-1);
        let r = rotate(&mut reg, &back, &m, Some(0)).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn index_and_assign() {
        let mut reg = ValueRegistry::new();
        let m = ints(&mut reg, vec![2, 3], &[1, 2, 3, 4, 5, 6]);
        let row = reg.int(2);
        let cols = ints(&mut reg, vec![2], &[3, 1]);
        let idx = IndexList::new(vec![Some(row), Some(cols)]);
        let r = index(&mut reg, &m, &idx, 1).unwrap();
        assert_eq!(r.shape(), &[2]);
        assert_eq!(r.to_ints().unwrap(), vec![6, 4]);
        let zero = reg.int(0);
        let r = index_assign(&mut reg, &m, &idx, &zero, 1).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![1, 2, 3, 0, 5, 0]);
        let bad = IndexList::new(vec![Some(reg.int(3)), None]);
        assert_eq!(index(&mut reg, &m, &bad, 1).unwrap_err().code(), ErrorCode::Index);
    }

    #[test]
    fn compress_and_cells() {
        let mut reg = ValueRegistry::new();
        let v = ints(&mut reg, vec![4], &[1, 2, 3, 4]);
        let mask = ints(&mut reg, vec![4], &[1, 0, 2, 0]);
        let r = compress(&mut reg, &mask, &v, None).unwrap();
        assert_eq!(r.to_ints().unwrap(), vec![1, 3, 3]);
        let m = ints(&mut reg, vec![2, 2], &[1, 2, 3, 4]);
        let (frame, rows) = cells(&mut reg, &m, 1).unwrap();
        assert_eq!(frame, vec![2]);
        assert_eq!(rows[1].to_ints().unwrap(), vec![3, 4]);
        let back = assemble_cells(&mut reg, frame, rows).unwrap();
        assert!(back.matches(&m));
    }

    #[test]
    fn vectors_along_first_axis() {
        let mut reg = ValueRegistry::new();
        let m = ints(&mut reg, vec![2, 3], &[1, 2, 3, 4, 5, 6]);
        let (shape, vs) = vectors_along(&m, Some(0)).unwrap();
        assert_eq!(shape, vec![3]);
        assert_eq!(vs[2], vec![Scalar::Int(3), Scalar::Int(6)]);
    }
}
