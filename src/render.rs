use std::cell::RefCell;

use itertools::Itertools;

use crate::config::{self, RenderCache};
use crate::storage::Storage;
use crate::Elem;

/// Text form of a view, cached on the view.
///
/// The cache is stamped with the storage version it was rendered at. Under
/// `RenderCache::Invalidate` a later write through any alias forces a
/// re-render, under `RenderCache::Sticky` the first render is kept forever.
#[derive(Debug, Default)]
pub struct ReprCache {
    // (storage version, precision) the string was rendered at
    cached: RefCell<Option<(u64, usize, String)>>,
}

impl ReprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_render(&self, storage: &Storage, render: impl FnOnce(usize) -> String) -> String {
        let cfg = config::current();
        let version = storage.version();
        if let Some((at, precision, repr)) = self.cached.borrow().as_ref() {
            let fresh = *at == version && *precision == cfg.precision;
            if fresh || cfg.render_cache == RenderCache::Sticky {
                return repr.clone();
            }
        }
        let repr = render(cfg.precision);
        *self.cached.borrow_mut() = Some((version, cfg.precision, repr.clone()));
        repr
    }

    #[cfg(test)]
    pub fn is_cached(&self) -> bool {
        self.cached.borrow().is_some()
    }
}

// a fresh view starts without a render, even when cloned from a rendered one
impl Clone for ReprCache {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// `[v0, v1, ...]` with `precision` decimals
pub fn render_row(values: impl Iterator<Item = Elem>, precision: usize) -> String {
    format!("[{}]", values.map(|v| format!("{:.*}", precision, v)).join(", "))
}

/// rows wrapped in an outer bracket, one row per line, continuation lines indented by one space
pub fn render_matrix(mut rows: impl Iterator<Item = String>) -> String {
    format!("[{}]", rows.join("\n "))
}
