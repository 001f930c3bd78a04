use std::sync::Arc;

use rustc_hash::{FxBuildHasher, FxHashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle into the [`TextInterner`] table.
///
/// Handle 0 always resolves to the empty string, so node fields that may be
/// absent (a person without contact info) store [`TextHandle::EMPTY`] rather
/// than an `Option`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextHandle(pub(crate) u32);

impl TextHandle {
    /// The handle of the interned empty string.
    pub const EMPTY: Self = Self(0);

    /// Returns `true` if this handle resolves to the empty string.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Deduplicating string table.
///
/// Repeated text values (position titles, department names) are stored once;
/// equal strings always yield the same handle. The `Arc<str>` is shared
/// between the lookup map and the resolve table, so each unique string is
/// allocated once.
#[derive(Debug, Clone, PartialEq)]
pub struct TextInterner {
    entries: Vec<Arc<str>>,
    lookup: FxHashMap<Arc<str>, TextHandle>,
}

impl Default for TextInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl TextInterner {
    /// Creates an interner holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an interner with preallocated capacity for `capacity` strings.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let empty: Arc<str> = Arc::from("");
        let mut lookup =
            FxHashMap::with_capacity_and_hasher(capacity.saturating_add(1), FxBuildHasher);
        lookup.insert(Arc::clone(&empty), TextHandle::EMPTY);
        Self {
            entries: vec![empty],
            lookup,
        }
    }

    /// Interns `text`, returning the existing handle when the string is
    /// already present.
    pub fn intern(&mut self, text: &str) -> TextHandle {
        if let Some(&handle) = self.lookup.get(text) {
            return handle;
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "handles are 32-bit by design; the store caps out long before"
        )]
        let handle = TextHandle(self.entries.len() as u32);
        let shared: Arc<str> = Arc::from(text);
        self.entries.push(Arc::clone(&shared));
        self.lookup.insert(shared, handle);
        handle
    }

    /// Resolves a handle to its string. Unknown handles resolve to `""`.
    #[inline]
    #[must_use]
    pub fn resolve(&self, handle: TextHandle) -> &str {
        self.entries
            .get(handle.0 as usize)
            .map_or("", |s| s.as_ref())
    }

    /// Returns a cheaply clonable shared copy of the interned string.
    #[must_use]
    pub fn resolve_shared(&self, handle: TextHandle) -> Arc<str> {
        self.entries
            .get(handle.0 as usize)
            .map_or_else(|| Arc::from(""), Arc::clone)
    }

    /// Number of unique strings, including the empty string.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if only the empty string is interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}
