use std::cell::RefCell;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Anything serde can handle can be dumped to and loaded from ron.
pub trait Config {
    fn config(&self) -> String;
    fn load_config(&mut self, config: &str) -> Result<()>;
}

impl<T: Serialize + DeserializeOwned> Config for T {
    fn config(&self) -> String {
        ron::to_string(self).unwrap_or_default()
    }
    fn load_config(&mut self, config: &str) -> Result<()> {
        *self = ron::from_str(config).context(format!("Failed to load config {}", config))?;
        Ok(())
    }
}

/// What happens when a storage buffer cannot be allocated
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AllocPolicy {
    /// terminate through `std::alloc::handle_alloc_error`
    #[default]
    Abort,
    /// hand `TensorError::AllocationFailed` back to the caller
    Error,
}

/// How long a rendered string stays cached on a view
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RenderCache {
    /// re-render once the storage has been written through any view
    #[default]
    Invalidate,
    /// render once and keep it forever, even if the data changes
    Sticky,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TensorConfig {
    pub alloc_policy: AllocPolicy,
    pub render_cache: RenderCache,
    /// digits after the decimal point when rendering
    pub precision: usize,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            alloc_policy: AllocPolicy::Abort,
            render_cache: RenderCache::Invalidate,
            precision: 1,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<TensorConfig> = RefCell::new(TensorConfig::default());
}

/// The configuration in effect on this thread
pub fn current() -> TensorConfig {
    CURRENT.with(|c| *c.borrow())
}

/// Replaces the configuration for this thread, returning the previous one
pub fn set(config: TensorConfig) -> TensorConfig {
    CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), config))
}

/// Runs `f` under `config`, restoring the previous configuration afterwards
pub fn scoped<R>(config: TensorConfig, f: impl FnOnce() -> R) -> R {
    struct Restore(TensorConfig);
    impl Drop for Restore {
        fn drop(&mut self) {
            set(self.0);
        }
    }
    let _restore = Restore(set(config));
    f()
}
