//! Cache configuration.
//!
//! Controls entry capacity and the invalidation sets declared by mutations.

use std::num::NonZeroUsize;

const DEFAULT_MAX_ENTRIES: usize = 256;

/// Cache configuration resolved from `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of retained entries (least recently used are evicted).
    pub max_entries: usize,
    /// Also mark meetings stale after a successful summarize.
    pub invalidate_meetings_on_summarize: bool,
    /// Mark jurisdictions and meetings stale after a successful upload.
    pub invalidate_on_upload: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            invalidate_meetings_on_summarize: true,
            invalidate_on_upload: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries,
            invalidate_meetings_on_summarize: settings.invalidate_meetings_on_summarize,
            invalidate_on_upload: settings.invalidate_on_upload,
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
