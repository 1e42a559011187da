//! Path filtering for watch events.
//!
//! Filters run on the watcher's consuming thread before a file is hashed,
//! so excluded trees (build output, VCS metadata) cost nothing beyond the
//! raw notify event.
//!
//! Paths handed to a filter are relative to the watched root when the event
//! lies under it, so a component filter never matches the root's own
//! ancestors.
//!
//! # Examples
//!
//! ```
//! use fl_watcher::{ExcludeComponentsFilter, FileFilter};
//! use camino::Utf8Path;
//!
//! let filter = ExcludeComponentsFilter::new(["fastled_js", ".git"]);
//!
//! assert!(filter.should_process(Utf8Path::new("sketch.ino")));
//! assert!(!filter.should_process(Utf8Path::new("fastled_js/index.html")));
//! assert!(!filter.should_process(Utf8Path::new(".git/HEAD")));
//! ```

use camino::Utf8Path;
use smallvec::SmallVec;

/// A predicate deciding which changed files are considered at all.
///
/// Filters must be [`Send`] and [`Sync`] because they move into the blocking
/// watcher worker.
///
/// # Examples
///
/// ```
/// use fl_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct SourcesOnly;
///
/// impl FileFilter for SourcesOnly {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         matches!(path.extension(), Some("ino" | "cpp" | "h"))
///     }
/// }
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if changes to `path` should be considered.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Rejects any path containing one of the given components.
///
/// Matching is exact and per component: excluding `fastled_js` rejects
/// `fastled_js/index.js` but not `fastled_js_old/index.js`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeComponentsFilter {
    excluded: SmallVec<[String; 4]>,
}

impl ExcludeComponentsFilter {
    /// Creates a filter excluding the given components.
    #[must_use]
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        for component in components {
            filter = filter.exclude(component);
        }
        filter
    }

    /// Adds a component to exclude.
    #[must_use]
    pub fn exclude(mut self, component: impl Into<String>) -> Self {
        let component = component.into();
        if !component.is_empty() && !self.excluded.contains(&component) {
            self.excluded.push(component);
        }
        self
    }

    /// Returns the excluded components.
    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }
}

impl FileFilter for ExcludeComponentsFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        !path
            .components()
            .any(|component| self.excluded.iter().any(|e| e == component.as_str()))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        assert!(AcceptAllFilter.should_process(Utf8Path::new("anything.txt")));
        assert!(AcceptAllFilter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_exclude_components_matches_whole_components() {
        let filter = ExcludeComponentsFilter::new(["fastled_js"]);

        assert!(!filter.should_process(Utf8Path::new("fastled_js/index.js")));
        assert!(!filter.should_process(Utf8Path::new("nested/fastled_js/a.wasm")));
        assert!(filter.should_process(Utf8Path::new("fastled_js_old/index.js")));
        assert!(filter.should_process(Utf8Path::new("src/fastled_js.h")));
    }

    #[test]
    fn test_exclude_components_dedups_and_skips_empty() {
        let filter = ExcludeComponentsFilter::new(["a", "a", ""]).exclude("b");
        assert_eq!(filter.excluded(), ["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_boxed_and_arc_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(ExcludeComponentsFilter::new([".git"]));
        assert!(!boxed.should_process(Utf8Path::new(".git/index")));

        let shared = std::sync::Arc::new(ExcludeComponentsFilter::new([".git"]));
        assert!(shared.should_process(Utf8Path::new("src/main.cpp")));
    }
}
