use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use logpane_types::{Fields, Record};

/// One side of the filter: the text as typed plus its compiled form
#[derive(Clone, Default)]
struct Pattern {
    /// Original pattern string
    text: String,

    /// Compiled regex (regex mode, non-empty and valid only)
    regex: Option<Regex>,

    /// Compile error (regex mode only)
    error: Option<String>,
}

impl Pattern {
    fn compile(text: &str, use_regex: bool, side: &'static str) -> Self {
        let mut pattern = Self {
            text: text.to_string(),
            regex: None,
            error: None,
        };

        if use_regex && !text.is_empty() {
            match Regex::new(text) {
                Ok(re) => pattern.regex = Some(re),
                Err(e) => {
                    tracing::warn!(side, pattern = text, error = %e, "invalid filter regex");
                    pattern.error = Some(e.to_string());
                }
            }
        }

        pattern
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// True if any value contains the pattern (substring or regex search).
    /// An invalid pattern matches nothing.
    fn matches_any<'a>(&self, mut values: impl Iterator<Item = &'a str>) -> bool {
        if !self.is_valid() {
            return false;
        }
        match &self.regex {
            Some(re) => values.any(|v| re.is_match(v)),
            None => values.any(|v| v.contains(self.text.as_str())),
        }
    }
}

/// Include/exclude text filter over a record's fields.
///
/// A record passes when any field matches the include pattern and no field
/// matches the exclude pattern. Empty patterns impose no constraint. In regex
/// mode a pattern that fails to compile is flagged invalid: an invalid include
/// matches nothing, an invalid exclude excludes nothing.
#[derive(Clone, Default)]
pub struct FilterEngine {
    include: Pattern,
    exclude: Pattern,
    use_regex: bool,
}

impl FilterEngine {
    /// Create a filter that lets everything through
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter from both patterns and the matching mode
    pub fn with_patterns(include: &str, exclude: &str, use_regex: bool) -> Self {
        Self {
            include: Pattern::compile(include, use_regex, "include"),
            exclude: Pattern::compile(exclude, use_regex, "exclude"),
            use_regex,
        }
    }

    pub fn set_include(&mut self, text: &str) {
        self.include = Pattern::compile(text, self.use_regex, "include");
    }

    pub fn set_exclude(&mut self, text: &str) {
        self.exclude = Pattern::compile(text, self.use_regex, "exclude");
    }

    /// Switch between literal and regex matching, recompiling both patterns
    pub fn set_use_regex(&mut self, use_regex: bool) {
        self.use_regex = use_regex;
        self.include = Pattern::compile(&self.include.text, use_regex, "include");
        self.exclude = Pattern::compile(&self.exclude.text, use_regex, "exclude");
    }

    /// Check if a record passes the filter
    pub fn passes(&self, record: &Record) -> bool {
        self.passes_fields(&record.fields)
    }

    /// Check if a set of fields passes the filter
    pub fn passes_fields(&self, fields: &Fields) -> bool {
        self.included(fields) && !self.excluded(fields)
    }

    /// True if the include pattern is empty or any field matches it
    pub fn included(&self, fields: &Fields) -> bool {
        self.include.is_empty() || self.include.matches_any(fields.values())
    }

    /// True if the exclude pattern is non-empty and any field matches it
    pub fn excluded(&self, fields: &Fields) -> bool {
        !self.exclude.is_empty() && self.exclude.matches_any(fields.values())
    }

    /// Byte ranges of include-pattern matches in `text` (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        if self.include.is_empty() || !self.include.is_valid() {
            return Vec::new();
        }
        match &self.include.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => text
                .match_indices(self.include.text.as_str())
                .map(|(start, m)| (start, start + m.len()))
                .collect(),
        }
    }

    pub fn include_pattern(&self) -> &str {
        &self.include.text
    }

    pub fn exclude_pattern(&self) -> &str {
        &self.exclude.text
    }

    pub fn use_regex(&self) -> bool {
        self.use_regex
    }

    pub fn include_valid(&self) -> bool {
        self.include.is_valid()
    }

    pub fn exclude_valid(&self) -> bool {
        self.exclude.is_valid()
    }

    /// Compile error of the include regex, if any
    pub fn include_error(&self) -> Option<&str> {
        self.include.error.as_deref()
    }

    /// Compile error of the exclude regex, if any
    pub fn exclude_error(&self) -> Option<&str> {
        self.exclude.error.as_deref()
    }

    /// Check if the filter lets everything through
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn status(&self) -> FilterStatus {
        FilterStatus {
            include_valid: self.include_valid(),
            exclude_valid: self.exclude_valid(),
        }
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("include", &self.include.text)
            .field("exclude", &self.exclude.text)
            .field("use_regex", &self.use_regex)
            .field("include_valid", &self.include_valid())
            .field("exclude_valid", &self.exclude_valid())
            .finish()
    }
}

/// Validity of both filter patterns after an edit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterStatus {
    pub include_valid: bool,
    pub exclude_valid: bool,
}

struct FilterShared {
    engine: FilterEngine,

    /// Set by every edit, cleared when the consumer takes the new filter
    dirty: bool,

    /// Bumped by every edit
    revision: u64,
}

/// Thread-safe handle for editing the filter from outside the ingestion loop.
///
/// Edits mark the filter dirty; the ingestion loop picks the new filter up
/// once edits have settled for its debounce window.
#[derive(Clone)]
pub struct FilterHandle {
    inner: Arc<Mutex<FilterShared>>,
}

impl FilterHandle {
    /// Wrap an initial filter. The handle starts clean.
    pub fn new(engine: FilterEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FilterShared {
                engine,
                dirty: false,
                revision: 0,
            })),
        }
    }

    /// Set the include pattern
    pub fn set_include(&self, text: &str) -> FilterStatus {
        self.edit(|engine| {
            if engine.include_pattern() == text {
                return false;
            }
            engine.set_include(text);
            true
        })
    }

    /// Set the exclude pattern
    pub fn set_exclude(&self, text: &str) -> FilterStatus {
        self.edit(|engine| {
            if engine.exclude_pattern() == text {
                return false;
            }
            engine.set_exclude(text);
            true
        })
    }

    /// Switch between literal and regex matching
    pub fn set_use_regex(&self, use_regex: bool) -> FilterStatus {
        self.edit(|engine| {
            if engine.use_regex() == use_regex {
                return false;
            }
            engine.set_use_regex(use_regex);
            true
        })
    }

    fn edit(&self, apply: impl FnOnce(&mut FilterEngine) -> bool) -> FilterStatus {
        let mut shared = self.inner.lock();
        if apply(&mut shared.engine) {
            shared.dirty = true;
            shared.revision += 1;
        }
        shared.engine.status()
    }

    /// Copy of the current filter (compiled regexes are shared, not recompiled)
    pub fn snapshot(&self) -> FilterEngine {
        self.inner.lock().engine.clone()
    }

    pub fn status(&self) -> FilterStatus {
        self.inner.lock().engine.status()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Revision of the pending edit, if the filter is dirty
    pub fn dirty_revision(&self) -> Option<u64> {
        let shared = self.inner.lock();
        shared.dirty.then_some(shared.revision)
    }

    /// Take the filter and clear the dirty flag, but only if no edit landed
    /// after `revision`
    pub fn take_if_current(&self, revision: u64) -> Option<FilterEngine> {
        let mut shared = self.inner.lock();
        if !shared.dirty || shared.revision != revision {
            return None;
        }
        shared.dirty = false;
        Some(shared.engine.clone())
    }
}

impl Default for FilterHandle {
    fn default() -> Self {
        Self::new(FilterEngine::new())
    }
}

impl std::fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("FilterHandle")
            .field("engine", &shared.engine)
            .field("dirty", &shared.dirty)
            .field("revision", &shared.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpane_types::field;

    fn fields(message: &str, node: &str) -> Fields {
        Fields::new()
            .with(field::MESSAGE, message)
            .with(field::NODE, node)
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = FilterEngine::new();
        assert!(filter.is_empty());
        assert!(filter.passes_fields(&fields("anything", "/node")));
        assert!(filter.passes_fields(&Fields::new()));
    }

    #[test]
    fn test_include_matches_any_field() {
        let filter = FilterEngine::with_patterns("planner", "", false);
        assert!(filter.passes_fields(&fields("path blocked", "/planner")));
        assert!(filter.passes_fields(&fields("planner ready", "/base")));
        assert!(!filter.passes_fields(&fields("path blocked", "/base")));
    }

    #[test]
    fn test_literal_mode_is_case_sensitive_and_not_regex() {
        let filter = FilterEngine::with_patterns("Err.r", "", false);
        assert!(!filter.passes_fields(&fields("Error", "/n")));
        assert!(filter.passes_fields(&fields("saw Err.r here", "/n")));

        let filter = FilterEngine::with_patterns("error", "", false);
        assert!(!filter.passes_fields(&fields("ERROR", "/n")));
    }

    #[test]
    fn test_exclude_overrides_include() {
        let filter = FilterEngine::with_patterns("motor", "debug", false);
        assert!(filter.passes_fields(&fields("motor stalled", "/base")));
        assert!(!filter.passes_fields(&fields("motor debug dump", "/base")));

        let exclude_only = FilterEngine::with_patterns("", "/base", false);
        assert!(!exclude_only.passes_fields(&fields("motor stalled", "/base")));
        assert!(exclude_only.passes_fields(&fields("motor stalled", "/arm")));
    }

    #[test]
    fn test_regex_search_is_unanchored() {
        let filter = FilterEngine::with_patterns(r"stall(ed)?\b", "", true);
        assert!(filter.passes_fields(&fields("motor stalled now", "/base")));
        assert!(!filter.passes_fields(&fields("installer", "/base")));
    }

    #[test]
    fn test_invalid_include_matches_nothing() {
        let filter = FilterEngine::with_patterns("(unbalanced", "", true);
        assert!(!filter.include_valid());
        assert!(filter.include_error().is_some());
        assert!(!filter.passes_fields(&fields("(unbalanced", "/n")));
    }

    #[test]
    fn test_invalid_exclude_excludes_nothing() {
        let filter = FilterEngine::with_patterns("", "[oops", true);
        assert!(!filter.exclude_valid());
        assert!(filter.include_valid());
        assert!(filter.passes_fields(&fields("[oops", "/n")));
    }

    #[test]
    fn test_toggle_regex_recompiles() {
        let mut filter = FilterEngine::with_patterns("(x", "", false);
        assert!(filter.include_valid());
        assert!(filter.passes_fields(&fields("a(x", "/n")));

        filter.set_use_regex(true);
        assert!(!filter.include_valid());
        assert!(!filter.passes_fields(&fields("a(x", "/n")));

        filter.set_use_regex(false);
        assert!(filter.include_valid());
    }

    #[test]
    fn test_find_matches() {
        let literal = FilterEngine::with_patterns("err", "", false);
        assert_eq!(literal.find_matches("err, another err"), vec![(0, 3), (13, 16)]);

        let regex = FilterEngine::with_patterns(r"\d+", "", true);
        assert_eq!(regex.find_matches("a 12 b 345"), vec![(2, 4), (7, 10)]);

        assert!(FilterEngine::new().find_matches("text").is_empty());
    }

    #[test]
    fn test_handle_tracks_dirty_revisions() {
        let handle = FilterHandle::default();
        assert_eq!(handle.dirty_revision(), None);

        let status = handle.set_include("a");
        assert!(status.include_valid);
        assert_eq!(handle.dirty_revision(), Some(1));

        // Re-setting the same text is not an edit
        handle.set_include("a");
        assert_eq!(handle.dirty_revision(), Some(1));

        handle.set_exclude("b");
        assert_eq!(handle.take_if_current(1).map(|f| f.include_pattern().to_string()), None);

        let taken = handle.take_if_current(2).unwrap();
        assert_eq!(taken.include_pattern(), "a");
        assert_eq!(taken.exclude_pattern(), "b");
        assert!(!handle.is_dirty());
    }

    #[test]
    fn test_handle_reports_invalid_regex() {
        let handle = FilterHandle::default();
        handle.set_include("(");
        let status = handle.set_use_regex(true);
        assert_eq!(
            status,
            FilterStatus {
                include_valid: false,
                exclude_valid: true
            }
        );
        assert_eq!(handle.status(), status);
    }
}
