use std::fmt;
use std::rc::Rc;

use ndarray::Array2;
use tracing::{debug, error};

use crate::error::{Result, TensorError};
use crate::render::{render_matrix, render_row, ReprCache};
use crate::storage::Storage;
use crate::utils::{clip, compose_view, span_len, wrap_index};
use crate::Elem;

/// A 2-D view onto a shared `Storage`.
///
/// Element `(r, c)` lives at physical index
/// `offset[0] + r * stride[0] + offset[1] + c * stride[1]`. Fresh tensors are
/// row-major, `stride = [ncols, 1]`. Strides go negative after a reverse slice.
#[derive(Clone)]
pub struct Tensor2D {
    storage: Rc<Storage>,
    offset: [isize; 2],
    nrows: usize,
    ncols: usize,
    stride: [isize; 2],
    repr: ReprCache,
}

impl Tensor2D {
    fn view(storage: Rc<Storage>, offset: [isize; 2], nrows: usize, ncols: usize, stride: [isize; 2]) -> Self {
        Self { storage, offset, nrows, ncols, stride, repr: ReprCache::new() }
    }

    fn null() -> Self {
        Self::view(Storage::empty(), [0, 0], 0, 0, [0, 1])
    }

    /// Fresh row-major tensor, contents are zeroed
    pub fn empty(nrows: usize, ncols: usize) -> Result<Self> {
        // an overflowing element count can never be allocated
        let size = nrows.checked_mul(ncols).unwrap_or(usize::MAX);
        let storage = Storage::new(size)?;
        Ok(Self::view(storage, [0, 0], nrows, ncols, [ncols as isize, 1]))
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Result<Self> {
        let storage = Storage::zeros(nrows.checked_mul(ncols).unwrap_or(usize::MAX))?;
        Ok(Self::view(storage, [0, 0], nrows, ncols, [ncols as isize, 1]))
    }

    /// A `(1, size)` row holding `0.0 .. size`
    pub fn arange(size: usize) -> Result<Self> {
        let t = Self::empty(1, size)?;
        for i in 0..size {
            t.write(0, i, i as Elem);
        }
        Ok(t)
    }

    /// `arange(nrows * ncols)` viewed as `(nrows, ncols)`
    pub fn arange2(nrows: usize, ncols: usize) -> Result<Self> {
        // an overflowing element count goes down the allocation failure path
        Self::arange(nrows.checked_mul(ncols).unwrap_or(usize::MAX))?.reshape(nrows, ncols)
    }

    /// Builds a tensor from nested rows, every row must have the same length
    pub fn from_rows(rows: Vec<Vec<Elem>>) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(nrows * ncols);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != ncols {
                return Err(TensorError::RaggedRows { row, expected: ncols, actual: values.len() });
            }
            data.extend(values);
        }
        Ok(Self::view(Storage::from_vec(data), [0, 0], nrows, ncols, [ncols as isize, 1]))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// total number of elements, `nrows * ncols`
    pub fn len(&self) -> usize {
        self.nrows * self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self) -> [isize; 2] {
        self.offset
    }

    pub fn strides(&self) -> [isize; 2] {
        self.stride
    }

    pub fn storage(&self) -> &Rc<Storage> {
        &self.storage
    }

    pub fn shares_storage(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Whether the view walks its storage row-major without gaps.
    /// Axes of length 0 or 1 place no constraint on their stride.
    pub fn is_contiguous(&self) -> bool {
        (self.ncols <= 1 || self.stride[1] == 1) && (self.nrows <= 1 || self.stride[0] == self.ncols as isize)
    }

    #[inline]
    fn physical(&self, row: usize, col: usize) -> usize {
        let idx = self.offset[0] + row as isize * self.stride[0] + self.offset[1] + col as isize * self.stride[1];
        idx as usize
    }

    #[inline]
    fn read(&self, row: usize, col: usize) -> Elem {
        self.storage.get(self.physical(row, col))
    }

    #[inline]
    fn write(&self, row: usize, col: usize, val: Elem) {
        self.storage.set(self.physical(row, col), val)
    }

    /// wraps each axis independently, then bounds checks each axis against its own extent
    fn check_index(&self, row: isize, col: isize) -> Result<(usize, usize)> {
        let r = wrap_index(row, self.nrows);
        let c = wrap_index(col, self.ncols);
        if r < 0 || r as usize >= self.nrows || c < 0 || c as usize >= self.ncols {
            return Err(TensorError::IndexOutOfBounds2D { row, col, nrows: self.nrows, ncols: self.ncols });
        }
        Ok((r as usize, c as usize))
    }

    pub fn try_get(&self, row: isize, col: isize) -> Result<Elem> {
        let (r, c) = self.check_index(row, col)?;
        Ok(self.read(r, c))
    }

    /// `t[row, col]`, NaN (logged) when out of bounds
    pub fn get(&self, row: isize, col: isize) -> Elem {
        self.try_get(row, col).unwrap_or_else(|e| {
            error!("{}", e);
            Elem::NAN
        })
    }

    pub fn try_set(&self, row: isize, col: isize, val: Elem) -> Result<()> {
        let (r, c) = self.check_index(row, col)?;
        self.write(r, c, val);
        Ok(())
    }

    /// `t[row, col] = val`, an out of bounds write is logged and dropped
    pub fn set(&self, row: isize, col: isize, val: Elem) {
        if let Err(e) = self.try_set(row, col, val) {
            error!("{}", e);
        }
    }

    /// Reinterprets the same storage as `(nrows, ncols)` row-major.
    ///
    /// The element count must match and the view must be contiguous, a
    /// strided slice cannot be reshaped without copying.
    pub fn reshape(&self, nrows: usize, ncols: usize) -> Result<Self> {
        let to = nrows.saturating_mul(ncols);
        if to != self.len() {
            return Err(TensorError::ReshapeSize { from: self.len(), to });
        }
        if !self.is_contiguous() {
            return Err(TensorError::NonContiguous);
        }
        // fold both axis offsets into the row offset so a contiguous slice keeps its start
        let base = self.offset[0] + self.offset[1];
        debug!(nrows, ncols, base, "reshape view");
        Ok(Self::view(Storage::retain(&self.storage), [base, 0], nrows, ncols, [ncols as isize, 1]))
    }

    /// `t[rstart:rend:rstep, cstart:cend:cstep]` as a new view of the same storage.
    ///
    /// Each axis is handled on its own: negative bounds wrap once, a start
    /// past the end with a positive step is rejected, bounds are clipped, and
    /// a zero step is rejected. Negative steps walk the axis in reverse.
    pub fn try_slice(
        &self,
        rstart: isize,
        rend: isize,
        rstep: isize,
        cstart: isize,
        cend: isize,
        cstep: isize,
    ) -> Result<Self> {
        let (rstart, nrows) = axis_range(0, self.nrows, rstart, rend, rstep)?;
        let (cstart, ncols) = axis_range(1, self.ncols, cstart, cend, cstep)?;
        let (roffset, rstride) = compose_view(self.offset[0], self.stride[0], rstart, rstep, nrows)?;
        let (coffset, cstride) = compose_view(self.offset[1], self.stride[1], cstart, cstep, ncols)?;
        let offset = [roffset, coffset];
        let stride = [rstride, cstride];
        debug!(?offset, nrows, ncols, ?stride, "slice view");
        Ok(Self::view(Storage::retain(&self.storage), offset, nrows, ncols, stride))
    }

    /// Like `try_slice`, a rejected slice is logged and yields an empty `(0, 0)` tensor
    pub fn slice(&self, rstart: isize, rend: isize, rstep: isize, cstart: isize, cend: isize, cstep: isize) -> Self {
        self.try_slice(rstart, rend, rstep, cstart, cend, cstep).unwrap_or_else(|e| {
            error!("{}", e);
            Self::null()
        })
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = Elem> + '_ {
        (0..self.ncols).map(move |c| self.read(row, c))
    }

    /// row-major logical contents
    pub fn to_vec(&self) -> Vec<Elem> {
        (0..self.nrows).flat_map(|r| self.row(r)).collect()
    }

    pub fn to_ndarray(&self) -> Array2<Elem> {
        Array2::from_shape_fn((self.nrows, self.ncols), |(r, c)| self.read(r, c))
    }

    fn map(&self, f: impl Fn(Elem) -> Elem) -> Result<Self> {
        let out = Self::empty(self.nrows, self.ncols)?;
        for r in 0..self.nrows {
            for c in 0..self.ncols {
                out.write(r, c, f(self.read(r, c)));
            }
        }
        Ok(out)
    }

    pub fn add_scalar(&self, val: Elem) -> Result<Self> {
        self.map(|x| x + val)
    }

    pub fn mul_scalar(&self, val: Elem) -> Result<Self> {
        self.map(|x| x * val)
    }

    /// Elementwise `f` into a fresh tensor, shapes must match exactly
    fn zip_with(op: &'static str, t1: &Self, t2: &Self, f: impl Fn(Elem, Elem) -> Elem) -> Result<Self> {
        if t1.shape() != t2.shape() {
            return Err(TensorError::ShapeMismatch { op, lhs: t1.shape(), rhs: t2.shape() });
        }
        let out = Self::empty(t1.nrows, t1.ncols)?;
        for r in 0..t1.nrows {
            for c in 0..t1.ncols {
                out.write(r, c, f(t1.read(r, c), t2.read(r, c)));
            }
        }
        Ok(out)
    }

    pub fn add(t1: &Self, t2: &Self) -> Result<Self> {
        Self::zip_with("add", t1, t2, |a, b| a + b)
    }

    /// elementwise product
    pub fn mul(t1: &Self, t2: &Self) -> Result<Self> {
        Self::zip_with("mul", t1, t2, |a, b| a * b)
    }

    /// Matrix product, `(n, k) x (k, m) -> (n, m)`
    pub fn dot(t1: &Self, t2: &Self) -> Result<Self> {
        if t1.ncols != t2.nrows {
            return Err(TensorError::ShapeMismatch { op: "dot", lhs: t1.shape(), rhs: t2.shape() });
        }
        let out = Self::empty(t1.nrows, t2.ncols)?;
        for i in 0..t1.nrows {
            for j in 0..t2.ncols {
                let mut acc: Elem = 0.0;
                for k in 0..t1.ncols {
                    acc += t1.read(i, k) * t2.read(k, j);
                }
                out.write(i, j, acc);
            }
        }
        Ok(out)
    }

    /// `[[r0...]\n [r1...]]`, cached on this view according to the configured `RenderCache`
    pub fn render(&self) -> String {
        self.repr.get_or_render(&self.storage, |precision| {
            render_matrix((0..self.nrows).map(|r| render_row(self.row(r), precision)))
        })
    }
}

/// Validates and clips one axis of a slice, returning the clipped start and the new extent
fn axis_range(axis: usize, len: usize, start: isize, end: isize, step: isize) -> Result<(isize, usize)> {
    let start = wrap_index(start, len);
    let end = wrap_index(end, len);
    if start > end && step > 0 {
        return Err(TensorError::InvalidSliceRange { axis, start, end, step });
    }
    if step == 0 {
        return Err(TensorError::ZeroStep);
    }
    let n = len as isize;
    // a reverse walk may start at the last element and stop just before the first
    let (lo, hi) = if step > 0 { (0, n) } else { (-1, n - 1) };
    let start = clip(start, lo, hi);
    let end = clip(end, lo, hi);
    Ok((start, span_len(start, end, step)))
}

impl fmt::Display for Tensor2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for Tensor2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor2D")
            .field("shape", &self.shape())
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .field("storage", &self.storage)
            .finish()
    }
}
