//! Best-effort on-disk caching of processor outputs.
//!
//! A [`ProcessorCache`] stores the data of a processor's outports under a
//! fingerprint of its inputs and configuration, and restores it when the
//! same fingerprint is seen again. Failing to store or restore is never an
//! error for the evaluation itself, only a lost optimization.
//!
//! The [`CacheCleaner`] reclaims disk space by deleting entries that were
//! never restored and by evicting the least valuable entries until the cache
//! fits within a size budget.

#[doc(inline)]
pub use cache::{CLEAR_CACHE, ProcessorCache, RestoreError, StoreError, USE_CACHING, sanitize};
#[doc(inline)]
pub use cacheable::{Cacheable, PayloadError};
#[doc(inline)]
pub use cleaner::{CacheCleaner, CacheEntry, CleanerError};
#[doc(inline)]
pub use config::{CacheConfig, ConfigError};

mod cache;
mod cacheable;
mod cleaner;
mod config;
