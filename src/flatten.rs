use crate::store::{TemplateCache, TemplateStore, resolve_template};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Default recursion depth for nested template expansion
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Upper bound on substitutions per top-level flatten call
pub const MAX_SUBSTITUTIONS: usize = 1000;

/// Placeholder introducing a snapshot of selected files
pub const FILE_BLOCK: &str = "FILE_BLOCK";
/// Placeholder carrying literal text in its parameter
pub const TEXT_BLOCK: &str = "TEXT_BLOCK";
/// Placeholder naming a response slot filled in by a later editing step
pub const PROMPT_RESPONSE: &str = "PROMPT_RESPONSE";

/// Matches `{{NAME}}` and `{{NAME=param}}` forms. Names are limited to
/// alphanumerics, underscore, hyphen and dot; the parameter runs to the
/// closing braces and may be empty.
pub(crate) static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)(?:=([^}]*))?\s*\}\}").expect("valid placeholder regex")
});

/// A placeholder occurrence found in template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Name on the left of the optional `=`
    pub name: String,
    /// Parameter on the right of the `=`, if present
    pub param: Option<String>,
    /// Starting byte offset of the full match
    pub start: usize,
    /// Ending byte offset of the full match
    pub end: usize,
}

impl Placeholder {
    /// Whether this placeholder is one of the reserved forms that the
    /// flattener never expands into template content.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        matches!(
            self.name.as_str(),
            FILE_BLOCK | TEXT_BLOCK | PROMPT_RESPONSE
        )
    }

    /// Name of the template this placeholder reads from the store, if any.
    ///
    /// Returns `None` for the purely structural reserved forms; for response
    /// slots this is the slot's source template.
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        match self.name.as_str() {
            FILE_BLOCK | TEXT_BLOCK => None,
            PROMPT_RESPONSE => self
                .param
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty()),
            _ => Some(&self.name),
        }
    }
}

/// Finds all placeholders in the given text, left to right.
#[must_use]
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    let mut placeholders = Vec::new();

    for capture in PLACEHOLDER.captures_iter(text) {
        if let Some(whole) = capture.get(0)
            && let Some(name) = capture.get(1)
        {
            placeholders.push(Placeholder {
                name: name.as_str().to_string(),
                param: capture.get(2).map(|m| m.as_str().to_string()),
                start: whole.start(),
                end: whole.end(),
            });
        }
    }

    placeholders
}

/// Non-fatal condition observed while flattening
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenWarning {
    /// A referenced template was not found in any store location
    MissingTemplate { name: String },
    /// A template referenced itself through the chain currently being expanded
    CyclicReference { name: String },
    /// The recursion depth ran out while expanding a template
    DepthExceeded { name: String },
    /// The per-call substitution budget was exhausted
    SubstitutionCapReached,
}

impl fmt::Display for FlattenWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTemplate { name } => write!(f, "template not found: {name}"),
            Self::CyclicReference { name } => {
                write!(f, "cyclic template reference left unexpanded: {name}")
            }
            Self::DepthExceeded { name } => {
                write!(f, "recursion depth exhausted while expanding: {name}")
            }
            Self::SubstitutionCapReached => {
                write!(f, "substitution limit reached; output may be partially expanded")
            }
        }
    }
}

/// Recursively inlines `{{NAME}}` references using a template store.
///
/// Expansion is serialized: each placeholder is fully resolved, including its
/// own nested references, before the scan continues, and the scan restarts
/// from the beginning of the text after every substitution so placeholders
/// introduced by the substituted content are picked up. Reserved forms are
/// skipped (response slots are rewritten to their canonical spelling but
/// never replaced by content). Failures never abort the call; they leave the
/// placeholder in place and are collected as [`FlattenWarning`]s, each
/// distinct warning reported once per flattener.
pub struct Flattener<'a> {
    store: &'a dyn TemplateStore,
    cache: &'a mut TemplateCache,
    warnings: Vec<FlattenWarning>,
    max_depth: usize,
}

impl<'a> Flattener<'a> {
    pub fn new(store: &'a dyn TemplateStore, cache: &'a mut TemplateCache) -> Self {
        Self::with_max_depth(store, cache, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(
        store: &'a dyn TemplateStore,
        cache: &'a mut TemplateCache,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            cache,
            warnings: Vec::new(),
            max_depth,
        }
    }

    /// Flattens `text` with a fresh visited set.
    pub fn flatten(&mut self, text: &str) -> String {
        let mut visited = HashSet::new();
        self.flatten_with(text, &mut visited)
    }

    /// Flattens `text` treating every name in `visited` as already expanded.
    pub fn flatten_with(&mut self, text: &str, visited: &mut HashSet<String>) -> String {
        let mut budget = MAX_SUBSTITUTIONS;
        self.expand(text.to_string(), visited, self.max_depth, &mut budget)
    }

    /// Warnings collected so far, in first-occurrence order.
    #[must_use]
    pub fn warnings(&self) -> &[FlattenWarning] {
        &self.warnings
    }

    /// Drains the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<FlattenWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn warn_once(&mut self, warning: FlattenWarning) {
        if !self.warnings.contains(&warning) {
            tracing::warn!("{warning}");
            self.warnings.push(warning);
        }
    }

    fn expand(
        &mut self,
        text: String,
        visited: &mut HashSet<String>,
        depth: usize,
        budget: &mut usize,
    ) -> String {
        if depth == 0 {
            return text;
        }

        let mut result = text;
        let mut cursor = 0;

        loop {
            let Some(capture) = PLACEHOLDER.captures_at(&result, cursor) else {
                break;
            };
            let (Some(whole), Some(name_match)) = (capture.get(0), capture.get(1)) else {
                break;
            };

            let name = name_match.as_str().to_string();
            let param = capture.get(2).map(|m| m.as_str().to_string());
            let (start, end) = (whole.start(), whole.end());

            match name.as_str() {
                FILE_BLOCK | TEXT_BLOCK => {
                    cursor = end;
                    continue;
                }
                PROMPT_RESPONSE => {
                    // A response slot keeps its placeholder form so the block
                    // parser can recognize it, but the spelling is normalized
                    // and the source template is resolved to warm the cache.
                    let Some(source) = param.as_deref().map(str::trim).filter(|s| !s.is_empty())
                    else {
                        cursor = end;
                        continue;
                    };
                    if resolve_template(source, self.store, self.cache).is_none() {
                        tracing::debug!("response slot source not found: {source}");
                    }
                    let canonical = format!("{{{{{PROMPT_RESPONSE}={source}}}}}");
                    result.replace_range(start..end, &canonical);
                    cursor = start + canonical.len();
                    continue;
                }
                _ => {}
            }

            if visited.contains(&name) {
                self.warn_once(FlattenWarning::CyclicReference { name });
                cursor = end;
                continue;
            }

            let Some(content) = resolve_template(&name, self.store, self.cache) else {
                self.warn_once(FlattenWarning::MissingTemplate { name });
                cursor = end;
                continue;
            };

            let replacement = if depth <= 1 {
                // The next level would abort immediately, so inline the
                // content without expanding it further.
                self.warn_once(FlattenWarning::DepthExceeded { name: name.clone() });
                content
            } else {
                visited.insert(name.clone());
                let expanded = self.expand(content, visited, depth - 1, budget);
                visited.remove(&name);
                expanded
            };

            if *budget == 0 {
                self.warn_once(FlattenWarning::SubstitutionCapReached);
                break;
            }
            *budget -= 1;

            result.replace_range(start..end, &replacement);
            cursor = 0;
        }

        result
    }
}
