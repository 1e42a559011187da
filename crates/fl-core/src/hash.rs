//! Content hashing and fast hash map aliases.
//!
//! Two unrelated kinds of hashing live here:
//!
//! - [`ContentHash`] / [`content_digest`]: a stable 64-bit xxh3 digest of file
//!   or build-output bytes. The file watcher uses it to suppress writes that
//!   did not change anything, and compile results carry one to drive
//!   skip-redeploy.
//! - [`FxHashMap`] / [`FxHashSet`]: the `rustc-hash` map aliases used for
//!   in-memory tables keyed by paths. The Fx hash is not DoS resistant, which
//!   is fine for internal bookkeeping.
//!
//! # Examples
//!
//! ```
//! use fl_core::{ContentHash, FxHashMap, fx_hash_map};
//!
//! let a = ContentHash::of_bytes(b"void setup() {}");
//! let b = ContentHash::of_bytes(b"void setup() {}");
//! assert_eq!(a, b);
//!
//! let map: FxHashMap<&str, ContentHash> = fx_hash_map();
//! assert!(map.is_empty());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Returns the raw 64-bit xxh3 digest of `bytes`.
#[inline]
#[must_use]
pub fn content_digest(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// An opaque content hash, compared for equality only.
///
/// Hashes computed locally are 16 lowercase hex digits of an xxh3 digest.
/// Hashes reported by a compile backend may be any string; they are trimmed
/// on construction so a trailing newline in a `hash.txt` does not make two
/// identical builds look different.
///
/// # Examples
///
/// ```
/// use fl_core::ContentHash;
///
/// let local = ContentHash::of_bytes(b"abc");
/// assert_eq!(local.as_str().len(), 16);
///
/// let remote = ContentHash::new("deadbeef\n");
/// assert_eq!(remote.as_str(), "deadbeef");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a hash string produced elsewhere (for example by a backend).
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_owned())
    }

    /// Hashes a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_digest(content_digest(bytes))
    }

    /// Hashes a sequence of `(name, bytes)` entries.
    ///
    /// Each name is fed with its length so that moving bytes between an
    /// entry's name and its body changes the result. Callers are
    /// responsible for passing entries in a stable order.
    #[must_use]
    pub fn of_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut hasher = Xxh3::new();
        for (name, bytes) in entries {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self::from_digest(hasher.digest())
    }

    /// Renders a raw digest as a hash.
    #[must_use]
    pub fn from_digest(digest: u64) -> Self {
        Self(format!("{digest:016x}"))
    }

    /// Returns the hash as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
