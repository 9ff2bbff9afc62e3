use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::Result;
use crate::utils::alloc_buffer;
use crate::Elem;

/// A flat buffer shared by every view that projects onto it.
///
/// Views hold an `Rc<Storage>`: cloning the handle retains, dropping it
/// releases, and the buffer is freed with the last handle. Elements are
/// `Cell`s so any holder may write through a shared reference; aliasing
/// writes are how slices and reshapes expose mutation to their parents.
/// Single threaded only, `Rc` and `Cell` keep it `!Send`.
pub struct Storage {
    data: Box<[Cell<Elem>]>,
    // bumped on every write, views compare it against their cached render
    version: Cell<u64>,
}

impl Storage {
    /// `size` zeroed elements with one owner
    pub fn new(size: usize) -> Result<Rc<Self>> {
        let data = alloc_buffer(size)?;
        debug!(size, "allocated storage");
        Ok(Rc::new(Self { data, version: Cell::new(0) }))
    }

    /// Zero length storage, never allocates
    pub fn empty() -> Rc<Self> {
        Rc::new(Self { data: Vec::new().into_boxed_slice(), version: Cell::new(0) })
    }

    pub fn zeros(size: usize) -> Result<Rc<Self>> {
        Self::new(size)
    }

    pub fn from_vec(values: Vec<Elem>) -> Rc<Self> {
        let data = values.into_iter().map(Cell::new).collect();
        Rc::new(Self { data, version: Cell::new(0) })
    }

    /// Reads a physical element.
    ///
    /// Callers translate and bounds check logical indices first, an index
    /// past the buffer here is a bug in the caller and panics.
    #[inline]
    pub fn get(&self, idx: usize) -> Elem {
        assert!(idx < self.data.len(), "storage index {} out of bounds of {}", idx, self.data.len());
        self.data[idx].get()
    }

    /// Writes a physical element, same precondition as `get`
    #[inline]
    pub fn set(&self, idx: usize, val: Elem) {
        assert!(idx < self.data.len(), "storage index {} out of bounds of {}", idx, self.data.len());
        self.data[idx].set(val);
        self.version.set(self.version.get().wrapping_add(1));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of writes made so far through any view
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// A new handle onto the same buffer
    pub fn retain(this: &Rc<Self>) -> Rc<Self> {
        Rc::clone(this)
    }

    /// Number of live handles, i.e. views plus any raw handles held by callers
    pub fn ref_count(this: &Rc<Self>) -> usize {
        Rc::strong_count(this)
    }

    /// Physical contents in buffer order
    pub fn to_vec(&self) -> Vec<Elem> {
        self.data.iter().map(Cell::get).collect()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        trace!(size = self.data.len(), "releasing storage");
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("len", &self.data.len())
            .field("version", &self.version.get())
            .finish()
    }
}
