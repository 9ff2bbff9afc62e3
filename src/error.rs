use thiserror::Error;

/// Errors reported by tensor operations.
///
/// Everything except `AllocationFailed` is a caller error: the operation did
/// nothing and the inputs are untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Only surfaced under `AllocPolicy::Error`, the default policy aborts.
    #[error("memory allocation of {requested} elements failed")]
    AllocationFailed { requested: usize },

    #[error("index {index} is out of bounds for tensor of size {size}")]
    IndexOutOfBounds { index: isize, size: usize },

    #[error("index [{row}, {col}] is out of bounds for tensor of shape ({nrows}, {ncols})")]
    IndexOutOfBounds2D {
        row: isize,
        col: isize,
        nrows: usize,
        ncols: usize,
    },

    #[error("slice step cannot be zero")]
    ZeroStep,

    #[error("slice step cannot be negative, got {step}")]
    NegativeStep { step: isize },

    #[error("invalid slice on axis {axis}: start {start} is past end {end} with step {step}")]
    InvalidSliceRange {
        axis: usize,
        start: isize,
        end: isize,
        step: isize,
    },

    #[error("tensors of size {lhs} and {rhs} are not broadcastable")]
    NotBroadcastable { lhs: usize, rhs: usize },

    #[error("incompatible shapes for {op}: {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    #[error("cannot reshape tensor of size {from} to tensor of size {to}")]
    ReshapeSize { from: usize, to: usize },

    #[error("cannot reshape a view that is not contiguous and row-major")]
    NonContiguous,

    #[error("composed view stride or offset overflows")]
    StrideOverflow,

    #[error("can only convert a tensor of size 1 to a scalar, got size {size}")]
    NotScalar { size: usize },

    #[error("row {row} has {actual} elements, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, TensorError>;
