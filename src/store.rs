use crate::error::{PromptconError, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Read contract for named template content.
///
/// Implementations expose two priority-ordered locations: a project-local
/// store and a global store. Project lookup is always attempted before
/// global. A lookup that finds nothing is `Ok(None)`, not an error; `Err` is
/// reserved for environment failures (bad name, unreadable file) and is
/// treated by the flattener as a miss.
pub trait TemplateStore {
    fn read_project_template(&self, name: &str) -> Result<Option<String>>;
    fn read_global_template(&self, name: &str) -> Result<Option<String>>;
}

/// Filesystem-backed template store.
///
/// Each location is an optional directory; a location that is unset or does
/// not exist simply never produces a hit. Template names are plain file names
/// within a location, so names carrying path separators or `..` are rejected
/// outright rather than resolved.
#[derive(Debug, Clone, Default)]
pub struct FsTemplateStore {
    project_dir: Option<PathBuf>,
    global_dir: Option<PathBuf>,
}

impl FsTemplateStore {
    #[must_use]
    pub fn new(project_dir: Option<PathBuf>, global_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            global_dir,
        }
    }

    fn read_from(dir: Option<&Path>, name: &str) -> Result<Option<String>> {
        validate_template_name(name)?;

        let Some(dir) = dir else {
            return Ok(None);
        };

        let path = dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }

        fs::read_to_string(&path).map(Some).map_err(Into::into)
    }
}

impl TemplateStore for FsTemplateStore {
    fn read_project_template(&self, name: &str) -> Result<Option<String>> {
        Self::read_from(self.project_dir.as_deref(), name)
    }

    fn read_global_template(&self, name: &str) -> Result<Option<String>> {
        Self::read_from(self.global_dir.as_deref(), name)
    }
}

/// In-memory template store, useful for hosts that manage template content
/// themselves and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    project: HashMap<String, String>,
    global: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.project.insert(name.into(), content.into());
    }

    pub fn insert_global(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.global.insert(name.into(), content.into());
    }
}

impl TemplateStore for MemoryStore {
    fn read_project_template(&self, name: &str) -> Result<Option<String>> {
        Ok(self.project.get(name).cloned())
    }

    fn read_global_template(&self, name: &str) -> Result<Option<String>> {
        Ok(self.global.get(name).cloned())
    }
}

/// Session-lifetime lookup cache shared by all flatten calls.
///
/// Resolved content is keyed by the name as referenced (before extension
/// fallback), and failed names are memoized in a missing set so repeated
/// flattens do not re-attempt the lookup. Both maps are append-only until the
/// owner calls [`TemplateCache::clear`], which the host must do whenever the
/// set of tracked project folders changes.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: HashMap<String, String>,
    missing: HashSet<String>,
}

impl TemplateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn put(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(name.into(), content.into());
    }

    #[must_use]
    pub fn is_missing(&self, name: &str) -> bool {
        self.missing.contains(name)
    }

    pub fn mark_missing(&mut self, name: impl Into<String>) {
        self.missing.insert(name.into());
    }

    /// Drops all cached content and forgets every memoized miss.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.missing.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves `name` through the cache and the store.
///
/// Candidate spellings are the bare name, then `NAME.txt`, then `NAME.md`;
/// the extension fallback applies only when the name has no extension of its
/// own. For each candidate the project location is tried before the global
/// one, and the first hit wins. Store errors for a candidate are logged and
/// treated as a miss for that candidate. A name that misses everywhere is
/// memoized so the next call returns without touching the store.
pub fn resolve_template(
    name: &str,
    store: &dyn TemplateStore,
    cache: &mut TemplateCache,
) -> Option<String> {
    if let Some(hit) = cache.get(name) {
        return Some(hit.to_string());
    }
    if cache.is_missing(name) {
        return None;
    }

    for candidate in candidate_names(name) {
        match store.read_project_template(&candidate) {
            Ok(Some(content)) => {
                tracing::debug!("resolved template {name} from project store as {candidate}");
                cache.put(name, &content);
                return Some(content);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("project lookup failed for {candidate}: {e}"),
        }

        match store.read_global_template(&candidate) {
            Ok(Some(content)) => {
                tracing::debug!("resolved template {name} from global store as {candidate}");
                cache.put(name, &content);
                return Some(content);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("global lookup failed for {candidate}: {e}"),
        }
    }

    cache.mark_missing(name);
    None
}

fn candidate_names(name: &str) -> Vec<String> {
    if name.contains('.') {
        vec![name.to_string()]
    } else {
        vec![
            name.to_string(),
            format!("{name}.txt"),
            format!("{name}.md"),
        ]
    }
}

fn validate_template_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name == "."
    {
        return Err(PromptconError::InvalidTemplateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with_dirs() -> (TempDir, TempDir, FsTemplateStore) {
        let project = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let store = FsTemplateStore::new(
            Some(project.path().to_path_buf()),
            Some(global.path().to_path_buf()),
        );
        (project, global, store)
    }

    #[test]
    fn test_project_wins_over_global() {
        let (project, global, store) = store_with_dirs();
        fs::write(project.path().join("GREETING"), "from project").unwrap();
        fs::write(global.path().join("GREETING"), "from global").unwrap();

        let mut cache = TemplateCache::new();
        let resolved = resolve_template("GREETING", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("from project"));
    }

    #[test]
    fn test_global_fallback() {
        let (_project, global, store) = store_with_dirs();
        fs::write(global.path().join("GREETING"), "from global").unwrap();

        let mut cache = TemplateCache::new();
        let resolved = resolve_template("GREETING", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("from global"));
    }

    #[test]
    fn test_extension_fallback_order() {
        let (project, _global, store) = store_with_dirs();
        fs::write(project.path().join("NOTES.txt"), "txt content").unwrap();
        fs::write(project.path().join("NOTES.md"), "md content").unwrap();

        let mut cache = TemplateCache::new();
        let resolved = resolve_template("NOTES", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("txt content"));
    }

    #[test]
    fn test_bare_name_beats_extensions() {
        let (project, _global, store) = store_with_dirs();
        fs::write(project.path().join("NOTES"), "bare content").unwrap();
        fs::write(project.path().join("NOTES.txt"), "txt content").unwrap();

        let mut cache = TemplateCache::new();
        let resolved = resolve_template("NOTES", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("bare content"));
    }

    #[test]
    fn test_extension_fallback_crosses_locations() {
        // The bare candidate misses everywhere before .txt is tried, so a
        // global bare file beats a project .txt file.
        let (project, global, store) = store_with_dirs();
        fs::write(project.path().join("NOTES.txt"), "project txt").unwrap();
        fs::write(global.path().join("NOTES"), "global bare").unwrap();

        let mut cache = TemplateCache::new();
        let resolved = resolve_template("NOTES", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("global bare"));
    }

    #[test]
    fn test_no_fallback_for_named_extension() {
        let (project, _global, store) = store_with_dirs();
        fs::write(project.path().join("NOTES.md.txt"), "nope").unwrap();

        let mut cache = TemplateCache::new();
        assert!(resolve_template("NOTES.md", &store, &mut cache).is_none());
    }

    #[test]
    fn test_missing_is_memoized() {
        let (_project, _global, store) = store_with_dirs();
        let mut cache = TemplateCache::new();

        assert!(resolve_template("ABSENT", &store, &mut cache).is_none());
        assert!(cache.is_missing("ABSENT"));

        // A clear forgets the miss.
        cache.clear();
        assert!(!cache.is_missing("ABSENT"));
    }

    #[test]
    fn test_cache_hit_short_circuits_store() {
        let store = MemoryStore::new();
        let mut cache = TemplateCache::new();
        cache.put("CACHED", "cached content");

        let resolved = resolve_template("CACHED", &store, &mut cache);
        assert_eq!(resolved.as_deref(), Some("cached content"));
    }

    #[test]
    fn test_invalid_template_names_rejected() {
        let (_project, _global, store) = store_with_dirs();

        for bad in ["../escape", "a/b", "a\\b", "..", "", "."] {
            let result = store.read_project_template(bad);
            assert!(
                matches!(result, Err(PromptconError::InvalidTemplateName { .. })),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_unset_location_never_hits() {
        let store = FsTemplateStore::new(None, None);
        assert_eq!(store.read_project_template("ANY").unwrap(), None);
        assert_eq!(store.read_global_template("ANY").unwrap(), None);
    }

    #[test]
    fn test_memory_store_locations() {
        let mut store = MemoryStore::new();
        store.insert_project("A", "project a");
        store.insert_global("A", "global a");
        store.insert_global("B", "global b");

        let mut cache = TemplateCache::new();
        assert_eq!(
            resolve_template("A", &store, &mut cache).as_deref(),
            Some("project a")
        );
        assert_eq!(
            resolve_template("B", &store, &mut cache).as_deref(),
            Some("global b")
        );
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(
            candidate_names("PLAN"),
            vec!["PLAN", "PLAN.txt", "PLAN.md"]
        );
        assert_eq!(candidate_names("PLAN.md"), vec!["PLAN.md"]);
    }
}
