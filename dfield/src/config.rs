//! `dfield` global configuration options.
//!
//! See [`Config`] for the list of options.

use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `dfield` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Concurrent Target
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The maximum number of blocks processed concurrently when writing or reading a displacement field.
/// Each in-flight block holds its own transform copy and block buffer, so memory usage scales with this value.
///
/// ## Store Empty Blocks
/// > default: [`false`]
///
/// If `false`, blocks holding only the fill value (zero) are not written to the store.
/// A missing block reads as zero, so this only trades store size against write requests.
#[derive(Debug)]
pub struct Config {
    concurrent_target: usize,
    store_empty_blocks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrent_target: std::thread::available_parallelism()
                .map_or(1, std::num::NonZero::get),
            store_empty_blocks: false,
        }
    }
}

impl Config {
    /// Get the [concurrent target](#concurrent-target) configuration.
    #[must_use]
    pub fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the [concurrent target](#concurrent-target) configuration. Zero is treated as one.
    pub fn set_concurrent_target(&mut self, concurrent_target: usize) -> &mut Self {
        self.concurrent_target = concurrent_target.max(1);
        self
    }

    /// Get the [store empty blocks](#store-empty-blocks) configuration.
    #[must_use]
    pub fn store_empty_blocks(&self) -> bool {
        self.store_empty_blocks
    }

    /// Set the [store empty blocks](#store-empty-blocks) configuration.
    pub fn set_store_empty_blocks(&mut self, store_empty_blocks: bool) -> &mut Self {
        self.store_empty_blocks = store_empty_blocks;
        self
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `dfield` configuration.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Returns a mutable reference to the global `dfield` configuration.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap_or_else(PoisonError::into_inner)
}
