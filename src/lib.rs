//! 1-D and 2-D float tensors as strided views over shared, reference counted storage.
//!
//! A [`Storage`] owns a flat buffer. A [`Tensor1D`] or [`Tensor2D`] is an
//! (offset, stride, shape) projection onto one. Slicing and reshaping build new
//! views over the same buffer, so a write through any view is visible through
//! every other view of that storage. Arithmetic always allocates a fresh result.

pub mod config;
pub mod error;
pub mod render;
pub mod storage;
pub mod tensor1d;
pub mod tensor2d;
pub mod utils;

/// The single element type of every tensor.
pub type Elem = f32;

pub use config::{AllocPolicy, Config, RenderCache, TensorConfig};
pub use error::{Result, TensorError};
pub use storage::Storage;
pub use tensor1d::Tensor1D;
pub use tensor2d::Tensor2D;
