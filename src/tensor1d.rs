use std::fmt;
use std::rc::Rc;

use ndarray::Array1;
use tracing::{debug, error};

use crate::error::{Result, TensorError};
use crate::render::{render_row, ReprCache};
use crate::storage::Storage;
use crate::utils::{clip, compose_view, span_len, wrap_index};
use crate::Elem;

/// A 1-D view `(offset, size, stride)` onto a shared `Storage`.
///
/// Logical element `i` lives at physical index `offset + i * stride`. Slices
/// share the parent's storage, so writes through either are visible in both.
/// Cloning makes another view of the same storage, dropping a view releases
/// its handle.
#[derive(Clone)]
pub struct Tensor1D {
    storage: Rc<Storage>,
    offset: isize,
    size: usize,
    stride: isize,
    repr: ReprCache,
}

impl Tensor1D {
    fn view(storage: Rc<Storage>, offset: isize, size: usize, stride: isize) -> Self {
        Self { storage, offset, size, stride, repr: ReprCache::new() }
    }

    /// The result handed back when a slice is rejected, backed by its own empty storage
    fn null() -> Self {
        Self::view(Storage::empty(), 0, 0, 1)
    }

    /// Fresh contiguous tensor, contents are zeroed
    pub fn empty(size: usize) -> Result<Self> {
        Ok(Self::view(Storage::new(size)?, 0, size, 1))
    }

    pub fn zeros(size: usize) -> Result<Self> {
        Ok(Self::view(Storage::zeros(size)?, 0, size, 1))
    }

    /// `[0.0, 1.0, ..., size - 1]`
    pub fn arange(size: usize) -> Result<Self> {
        let t = Self::empty(size)?;
        for i in 0..size {
            t.write(i, i as Elem);
        }
        Ok(t)
    }

    pub fn from_vec(values: Vec<Elem>) -> Self {
        let size = values.len();
        Self::view(Storage::from_vec(values), 0, size, 1)
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn storage(&self) -> &Rc<Storage> {
        &self.storage
    }

    /// whether both views project onto the same buffer
    pub fn shares_storage(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    #[inline]
    fn physical(&self, ix: usize) -> usize {
        (self.offset + ix as isize * self.stride) as usize
    }

    /// logical read, `ix` already checked against `size`
    #[inline]
    fn read(&self, ix: usize) -> Elem {
        self.storage.get(self.physical(ix))
    }

    #[inline]
    fn write(&self, ix: usize, val: Elem) {
        self.storage.set(self.physical(ix), val)
    }

    fn check_index(&self, ix: isize) -> Result<usize> {
        let wrapped = wrap_index(ix, self.size);
        if wrapped < 0 || wrapped as usize >= self.size {
            return Err(TensorError::IndexOutOfBounds { index: ix, size: self.size });
        }
        Ok(wrapped as usize)
    }

    pub fn try_get(&self, ix: isize) -> Result<Elem> {
        Ok(self.read(self.check_index(ix)?))
    }

    /// `t[ix]`, negative indices count from the end.
    /// An out of bounds index is logged and reads as NaN.
    pub fn get(&self, ix: isize) -> Elem {
        self.try_get(ix).unwrap_or_else(|e| {
            error!("{}", e);
            Elem::NAN
        })
    }

    pub fn try_set(&self, ix: isize, val: Elem) -> Result<()> {
        let ix = self.check_index(ix)?;
        self.write(ix, val);
        Ok(())
    }

    /// `t[ix] = val`, takes `&self` since every view may write its storage.
    /// An out of bounds index is logged and the write is dropped.
    pub fn set(&self, ix: isize, val: Elem) {
        if let Err(e) = self.try_set(ix, val) {
            error!("{}", e);
        }
    }

    /// Indexing that keeps the result a tensor: a size 1 view of element `ix`
    pub fn get_as_tensor(&self, ix: isize) -> Self {
        let ix = wrap_index(ix, self.size);
        self.slice(ix, ix.saturating_add(1), 1)
    }

    pub fn try_item(&self) -> Result<Elem> {
        if self.size != 1 {
            return Err(TensorError::NotScalar { size: self.size });
        }
        Ok(self.read(0))
    }

    /// The single element of a size 1 tensor, NaN (logged) otherwise
    pub fn item(&self) -> Elem {
        self.try_item().unwrap_or_else(|e| {
            error!("{}", e);
            Elem::NAN
        })
    }

    /// `t[start:end:step]` as a new view of the same storage.
    ///
    /// Negative bounds wrap once, then both are clipped to `[0, len]`.
    /// Only positive steps are supported.
    pub fn try_slice(&self, start: isize, end: isize, step: isize) -> Result<Self> {
        let n = self.size as isize;
        let start = clip(wrap_index(start, self.size), 0, n);
        let end = clip(wrap_index(end, self.size), 0, n);
        if step == 0 {
            return Err(TensorError::ZeroStep);
        }
        if step < 0 {
            return Err(TensorError::NegativeStep { step });
        }
        let size = span_len(start, end, step);
        let (offset, stride) = compose_view(self.offset, self.stride, start, step, size)?;
        debug!(offset, size, stride, "slice view");
        Ok(Self::view(Storage::retain(&self.storage), offset, size, stride))
    }

    /// Like `try_slice`, but a rejected slice is logged and yields an empty
    /// tensor on fresh storage, leaving `self` untouched
    pub fn slice(&self, start: isize, end: isize, step: isize) -> Self {
        self.try_slice(start, end, step).unwrap_or_else(|e| {
            error!("{}", e);
            Self::null()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Elem> + '_ {
        (0..self.size).map(move |i| self.read(i))
    }

    /// logical contents, copied out
    pub fn to_vec(&self) -> Vec<Elem> {
        self.iter().collect()
    }

    pub fn to_ndarray(&self) -> Array1<Elem> {
        Array1::from_iter(self.iter())
    }

    fn map(&self, f: impl Fn(Elem) -> Elem) -> Result<Self> {
        let out = Self::empty(self.size)?;
        for i in 0..self.size {
            out.write(i, f(self.read(i)));
        }
        Ok(out)
    }

    pub fn add_scalar(&self, val: Elem) -> Result<Self> {
        self.map(|x| x + val)
    }

    pub fn mul_scalar(&self, val: Elem) -> Result<Self> {
        self.map(|x| x * val)
    }

    /// equal sizes, or either side of size 1
    pub fn broadcastable(t1: &Self, t2: &Self) -> bool {
        t1.size == t2.size || t1.size == 1 || t2.size == 1
    }

    /// Elementwise `f` into a fresh tensor, a size 1 operand repeats for every output element
    fn zip_broadcast(t1: &Self, t2: &Self, f: impl Fn(Elem, Elem) -> Elem) -> Result<Self> {
        if !Self::broadcastable(t1, t2) {
            return Err(TensorError::NotBroadcastable { lhs: t1.size, rhs: t2.size });
        }
        // max of the two, except a size 0 operand wins over a size 1 one
        let size = if t1.size == 1 { t2.size } else { t1.size };
        let out = Self::empty(size)?;
        let step1 = usize::from(t1.size > 1);
        let step2 = usize::from(t2.size > 1);
        let (mut i1, mut i2) = (0, 0);
        for i in 0..size {
            out.write(i, f(t1.read(i1), t2.read(i2)));
            i1 += step1;
            i2 += step2;
        }
        Ok(out)
    }

    pub fn add(t1: &Self, t2: &Self) -> Result<Self> {
        Self::zip_broadcast(t1, t2, |a, b| a + b)
    }

    pub fn sub(t1: &Self, t2: &Self) -> Result<Self> {
        Self::zip_broadcast(t1, t2, |a, b| a - b)
    }

    pub fn mul(t1: &Self, t2: &Self) -> Result<Self> {
        Self::zip_broadcast(t1, t2, |a, b| a * b)
    }

    /// `[v0, v1, ...]`, cached on this view according to the configured `RenderCache`
    pub fn render(&self) -> String {
        self.repr.get_or_render(&self.storage, |precision| render_row(self.iter(), precision))
    }
}

impl From<Vec<Elem>> for Tensor1D {
    fn from(values: Vec<Elem>) -> Self {
        Self::from_vec(values)
    }
}

impl fmt::Display for Tensor1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for Tensor1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor1D")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("storage", &self.storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, RenderCache, TensorConfig};
    use proptest::prelude::*;

    fn slice_of(t: &Tensor1D, s: (isize, isize, isize)) -> Tensor1D {
        t.try_slice(s.0, s.1, s.2).unwrap()
    }

    #[test]
    fn arange_values() {
        for size in [0, 1, 10, 100] {
            let t = Tensor1D::arange(size).unwrap();
            let expected: Vec<Elem> = (0..size).map(|i| i as Elem).collect();
            assert_eq!(t.to_vec(), expected);
            assert_eq!(t.len(), size);
        }
    }

    #[test]
    fn from_vec_and_zeros() {
        let t = Tensor1D::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(Tensor1D::zeros(3).unwrap().to_vec(), vec![0.0; 3]);
        assert!(Tensor1D::empty(0).unwrap().is_empty());
    }

    #[test]
    fn negative_indexing() {
        let t = Tensor1D::arange(20).unwrap();
        assert_eq!(t.get(0), 0.0);
        assert_eq!(t.get(5), 5.0);
        assert_eq!(t.get(-1), 19.0);
        assert_eq!(t.get(-5), 15.0);
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let t = Tensor1D::arange(5).unwrap();
        assert!(t.get(5).is_nan());
        assert!(t.get(-6).is_nan());
        assert_eq!(t.try_get(7), Err(TensorError::IndexOutOfBounds { index: 7, size: 5 }));
        assert!(t.try_set(5, 1.0).is_err());
        t.set(-6, 1.0);
        assert_eq!(t.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn slicing_matches_python() {
        let t = Tensor1D::arange(20).unwrap();
        assert_eq!(slice_of(&t, (0, 20, 1)).to_vec(), t.to_vec());
        assert_eq!(slice_of(&t, (5, 20, 1)).len(), 15);
        assert_eq!(slice_of(&t, (0, 15, 1)).len(), 15);
        assert_eq!(slice_of(&t, (0, 20, 2)).to_vec(), (0..20).step_by(2).map(|i| i as Elem).collect::<Vec<_>>());
        assert_eq!(slice_of(&t, (5, 15, 2)).to_vec(), vec![5.0, 7.0, 9.0, 11.0, 13.0]);
    }

    #[test]
    fn slice_of_slice() {
        let t = Tensor1D::arange(20).unwrap();
        let s = slice_of(&t, (5, 15, 1));
        assert_eq!(slice_of(&s, (2, 7, 1)).to_vec(), vec![7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(slice_of(&s, (100, 10, 1)).len(), 0);
        assert_eq!(slice_of(&s, (0, 100, 1)).len(), 10);
        assert_eq!(slice_of(&s, (-100, 10, 1)).to_vec(), s.to_vec());
        assert_eq!(slice_of(&s, (0, -100, 1)).len(), 0);
        assert_eq!(slice_of(&t, (-15, -5, 1)).to_vec(), (5..15).map(|i| i as Elem).collect::<Vec<_>>());
        assert_eq!(slice_of(&t, (0, 0, 1)).len(), 0);
        let e = slice_of(&t, (0, 0, 1));
        assert_eq!(slice_of(&e, (0, 0, 1)).len(), 0);
        // start past end yields nothing rather than a negative size
        assert_eq!(slice_of(&t, (7, 3, 1)).len(), 0);
    }

    #[test]
    fn stride_composition() {
        let t = Tensor1D::arange(20).unwrap();
        let ss = t.slice(5, 15, 1).slice(2, 7, 2);
        assert_eq!(ss.to_vec(), vec![7.0, 9.0, 11.0]);
        assert_eq!(ss.get(-1), 11.0);
        assert_eq!(ss.offset(), 7);
        assert_eq!(ss.stride(), 2);

        let t = Tensor1D::arange(100).unwrap();
        let r = t.slice(10, 90, 2).slice(5, 35, 3).slice(0, 100, 2);
        let expected: Vec<Elem> = (10..90).step_by(2).skip(5).take(30).step_by(3).step_by(2).map(|i| i as Elem).collect();
        assert_eq!(r.to_vec(), expected);
    }

    #[test]
    fn huge_steps_take_one_element() {
        let t = Tensor1D::arange(10).unwrap();
        let evens = t.slice(0, 10, 2);
        let first = evens.try_slice(0, 5, isize::MAX).unwrap();
        assert_eq!(first.to_vec(), vec![0.0]);
        assert_eq!(first.stride(), 2);
        let last = evens.slice(4, 5, isize::MAX / 2);
        assert_eq!(last.to_vec(), vec![8.0]);
        assert!(evens.slice(5, 5, isize::MAX).is_empty());
    }

    #[test]
    fn bad_steps_leave_parent_untouched() {
        let t = Tensor1D::arange(5).unwrap();
        assert_eq!(t.try_slice(0, 5, 0).unwrap_err(), TensorError::ZeroStep);
        assert_eq!(t.try_slice(0, 5, -1).unwrap_err(), TensorError::NegativeStep { step: -1 });
        let e = t.slice(0, 5, 0);
        assert!(e.is_empty());
        assert!(!e.shares_storage(&t));
        assert_eq!(Storage::ref_count(t.storage()), 1);
        assert_eq!(t.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn writes_alias_both_ways() {
        let t = Tensor1D::arange(20).unwrap();
        let view = t.slice(5, 15, 1);
        view.set(0, 100.0);
        view.set(-1, 200.0);
        assert_eq!(t.get(5), 100.0);
        assert_eq!(t.get(14), 200.0);
        t.set(6, 300.0);
        assert_eq!(view.get(1), 300.0);
    }

    #[test]
    fn slice_lifetimes() {
        let t = Tensor1D::arange(10).unwrap();
        let weak = Rc::downgrade(t.storage());
        let s = t.slice(2, 8, 1);
        assert_eq!(Storage::ref_count(t.storage()), 2);
        drop(s);
        assert_eq!(Storage::ref_count(t.storage()), 1);

        let s = t.slice(2, 8, 1);
        drop(t);
        assert!(weak.upgrade().is_some());
        assert_eq!(s.get(0), 2.0);
        drop(s);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn get_as_tensor_and_item() {
        let t = Tensor1D::arange(10).unwrap();
        for i in 0..10 {
            assert_eq!(t.get_as_tensor(i).item(), i as Elem);
        }
        let last = t.get_as_tensor(-1);
        assert!(last.shares_storage(&t));
        assert_eq!(last.item(), 9.0);
        last.set(0, 42.0);
        assert_eq!(t.get(9), 42.0);
        assert_eq!(t.try_item(), Err(TensorError::NotScalar { size: 10 }));
        assert!(t.item().is_nan());
        assert!(t.get_as_tensor(10).is_empty());
        assert!(t.get_as_tensor(isize::MAX).is_empty());
        assert!(t.get_as_tensor(isize::MIN).is_empty());
    }

    #[test]
    fn broadcast_add() {
        let a = Tensor1D::from(vec![1.0, 2.0, 3.0]);
        let b = Tensor1D::from(vec![10.0]);
        assert_eq!(Tensor1D::add(&a, &b).unwrap().to_vec(), vec![11.0, 12.0, 13.0]);
        assert_eq!(Tensor1D::add(&b, &a).unwrap().to_vec(), vec![11.0, 12.0, 13.0]);
        assert_eq!(Tensor1D::add(&a, &a).unwrap().to_vec(), vec![2.0, 4.0, 6.0]);
        let c = Tensor1D::from(vec![1.0, 2.0]);
        assert!(!Tensor1D::broadcastable(&c, &a));
        assert_eq!(Tensor1D::add(&c, &a).unwrap_err(), TensorError::NotBroadcastable { lhs: 2, rhs: 3 });
        let nothing = Tensor1D::empty(0).unwrap();
        assert!(Tensor1D::add(&nothing, &b).unwrap().is_empty());
        assert!(Tensor1D::add(&b, &nothing).unwrap().is_empty());
    }

    #[test]
    fn sub_mul_and_scalars() {
        for size in [0, 1, 10, 100] {
            let a = Tensor1D::arange(size).unwrap();
            assert!(Tensor1D::sub(&a, &a).unwrap().to_vec().iter().all(|&x| x == 0.0));
            let sq: Vec<Elem> = (0..size).map(|i| (i * i) as Elem).collect();
            assert_eq!(Tensor1D::mul(&a, &a).unwrap().to_vec(), sq);
        }
        let a = Tensor1D::arange(3).unwrap();
        assert_eq!(a.add_scalar(1.5).unwrap().to_vec(), vec![1.5, 2.5, 3.5]);
        assert_eq!(a.mul_scalar(2.0).unwrap().to_vec(), vec![0.0, 2.0, 4.0]);
        // results never alias their inputs
        assert!(!a.add_scalar(0.0).unwrap().shares_storage(&a));
    }

    #[test]
    fn arithmetic_reads_through_strides() {
        let t = Tensor1D::arange(10).unwrap();
        let evens = t.slice(0, 10, 2);
        let odds = t.slice(1, 10, 2);
        assert_eq!(Tensor1D::add(&evens, &odds).unwrap().to_vec(), vec![1.0, 5.0, 9.0, 13.0, 17.0]);
    }

    #[test]
    fn render_format() {
        let t = Tensor1D::arange(3).unwrap();
        assert_eq!(t.render(), "[0.0, 1.0, 2.0]");
        assert_eq!(format!("{}", t.slice(1, 3, 1)), "[1.0, 2.0]");
        assert_eq!(Tensor1D::empty(0).unwrap().render(), "[]");
    }

    #[test]
    fn render_cache_policies() {
        let t = Tensor1D::arange(3).unwrap();
        let view = t.slice(0, 3, 1);
        assert_eq!(t.render(), "[0.0, 1.0, 2.0]");
        view.set(0, 9.0);
        assert_eq!(t.render(), "[9.0, 1.0, 2.0]");

        let sticky = TensorConfig { render_cache: RenderCache::Sticky, ..TensorConfig::default() };
        config::scoped(sticky, || {
            let t = Tensor1D::arange(2).unwrap();
            assert_eq!(t.render(), "[0.0, 1.0]");
            t.set(0, 5.0);
            assert_eq!(t.render(), "[0.0, 1.0]");
        });
    }

    #[test]
    fn ndarray_interop() {
        let t = Tensor1D::arange(10).unwrap().slice(1, 10, 3);
        assert_eq!(t.to_ndarray(), ndarray::arr1(&[1.0 as Elem, 4.0, 7.0]));
    }

    proptest! {
        #[test]
        fn prop_full_slice_round_trips(n in 0usize..64) {
            let t = Tensor1D::arange(n).unwrap();
            let s = t.slice(0, n as isize, 1);
            prop_assert_eq!(s.to_vec(), t.to_vec());
            prop_assert!(s.shares_storage(&t));
        }

        #[test]
        fn prop_last_element(n in 1usize..64) {
            let t = Tensor1D::arange(n).unwrap();
            prop_assert_eq!(t.get(-1), t.get(n as isize - 1));
        }

        #[test]
        fn prop_slice_matches_direct_indexing(
            n in 1usize..64,
            start in -80isize..80,
            end in -80isize..80,
            step in 1isize..6,
        ) {
            let t = Tensor1D::arange(n).unwrap();
            let s = t.slice(start, end, step);
            let len = n as isize;
            let lo = wrap_index(start, n).clamp(0, len);
            let hi = wrap_index(end, n).clamp(0, len);
            let expected: Vec<Elem> = (lo..hi.max(lo)).step_by(step as usize).map(|i| i as Elem).collect();
            prop_assert_eq!(s.to_vec(), expected);
        }
    }
}
