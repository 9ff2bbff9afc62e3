use std::alloc::{self, Layout};
use std::cell::Cell;

use tracing::error;

use crate::config::{self, AllocPolicy};
use crate::error::{Result, TensorError};
use crate::Elem;

/// integer division rounding towards positive infinity, ceil(a / b)
/// valid for either sign of `a` and `b`, `b` must be non zero
pub fn ceil_div(a: isize, b: isize) -> isize {
    let q = a / b;
    let r = a % b;
    if r != 0 && ((r > 0) == (b > 0)) {
        q + 1
    } else {
        q
    }
}

/// python style wraparound, applied once: -1 is the last element
pub fn wrap_index(ix: isize, len: usize) -> isize {
    if ix < 0 {
        ix + len as isize
    } else {
        ix
    }
}

/// clips `x` into `[lo, hi]`
pub fn clip(x: isize, lo: isize, hi: isize) -> isize {
    num::clamp(x, lo, hi)
}

/// Number of elements visited walking from `start` towards `end` (exclusive) by `step`
pub fn span_len(start: isize, end: isize, step: isize) -> usize {
    ceil_div(end - start, step).max(0) as usize
}

/// Offset and stride of the sub-view that starts at logical `start` and takes
/// every `step`th element, `size` elements in all.
///
/// A sub-view of at most one element never steps, so it keeps the parent
/// stride, and an empty one never reads, so it keeps the parent offset too.
pub fn compose_view(offset: isize, stride: isize, start: isize, step: isize, size: usize) -> Result<(isize, isize)> {
    if size == 0 {
        return Ok((offset, stride));
    }
    let offset = start.checked_mul(stride).and_then(|d| offset.checked_add(d));
    let stride = if size == 1 { Some(stride) } else { stride.checked_mul(step) };
    match (offset, stride) {
        (Some(offset), Some(stride)) => Ok((offset, stride)),
        _ => Err(TensorError::StrideOverflow),
    }
}

/// Allocates `size` zeroed elements, honoring the configured `AllocPolicy` on failure
pub fn alloc_buffer(size: usize) -> Result<Box<[Cell<Elem>]>> {
    let mut buf: Vec<Cell<Elem>> = Vec::new();
    if buf.try_reserve_exact(size).is_err() {
        return alloc_failed(size);
    }
    buf.resize(size, Cell::new(0.0));
    Ok(buf.into_boxed_slice())
}

fn alloc_failed<T>(size: usize) -> Result<T> {
    error!(requested = size, "memory allocation failed");
    match config::current().alloc_policy {
        AllocPolicy::Error => Err(TensorError::AllocationFailed { requested: size }),
        AllocPolicy::Abort => {
            // the request may not even be representable as a layout
            let layout = Layout::array::<Elem>(size).unwrap_or_else(|_| Layout::new::<Elem>());
            alloc::handle_alloc_error(layout)
        }
    }
}
