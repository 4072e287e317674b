use crate::error::{PromptconError, Result};
use crate::selection::{DirListing, NodeKind, TreeNode};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// App-specific ignore file honored in every listed directory
pub const CUSTOM_IGNORE_FILENAME: &str = ".promptignore";

/// Read contract for project files and directory structure.
///
/// Listings come back already filtered by ignore rules; the selection engine
/// treats them as authoritative until the next refresh.
pub trait FileAccess {
    /// Lists a directory recursively.
    ///
    /// # Errors
    ///
    /// Returns `PromptconError::DirectoryNotFound` if `path` is not a
    /// directory, and traversal errors from the underlying walker.
    fn list_directory(&self, path: &Path) -> Result<DirListing>;

    /// Reads a file's text content.
    ///
    /// # Errors
    ///
    /// Returns `PromptconError::FileNotFound` if `path` is not a file, or an
    /// IO error from reading it.
    fn read_file(&self, path: &Path) -> Result<String>;
}

/// Filesystem-backed [`FileAccess`] with gitignore handling, glob excludes
/// and an optional depth limit.
#[derive(Debug, Clone)]
pub struct FsFileAccess {
    use_gitignore: bool,
    exclude: Option<GlobSet>,
    max_depth: Option<usize>,
}

impl Default for FsFileAccess {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            exclude: None,
            max_depth: None,
        }
    }
}

impl FsFileAccess {
    #[must_use]
    pub fn new(use_gitignore: bool, exclude: Option<GlobSet>, max_depth: Option<usize>) -> Self {
        Self {
            use_gitignore,
            exclude,
            max_depth,
        }
    }
}

impl FileAccess for FsFileAccess {
    fn list_directory(&self, path: &Path) -> Result<DirListing> {
        let root = path
            .canonicalize()
            .map_err(|_| PromptconError::DirectoryNotFound {
                path: path.to_path_buf(),
            })?;
        if !root.is_dir() {
            return Err(PromptconError::DirectoryNotFound { path: root });
        }

        let mut builder = WalkBuilder::new(&root);
        builder
            .follow_links(false)
            .hidden(true)
            .require_git(false)
            .git_ignore(self.use_gitignore)
            .git_global(self.use_gitignore)
            .git_exclude(self.use_gitignore)
            .ignore(self.use_gitignore)
            .parents(self.use_gitignore)
            .max_depth(self.max_depth);
        builder.add_custom_ignore_filename(CUSTOM_IGNORE_FILENAME);

        if let Some(exclude) = self.exclude.clone() {
            let base = root.clone();
            builder.filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let relative = entry.path().strip_prefix(&base).unwrap_or(entry.path());
                !exclude.is_match(relative)
            });
        }

        // Group walked entries by parent path, then stitch the tree together
        // from the root down.
        let mut by_parent: BTreeMap<String, Vec<TreeNode>> = BTreeMap::new();
        for entry in builder.build() {
            let entry = entry?;
            if entry.depth() == 0 {
                continue;
            }

            let entry_path = entry.path();
            let parent_key = entry_path
                .parent()
                .unwrap_or(&root)
                .display()
                .to_string();
            let is_dir = entry.file_type().is_some_and(|file_type| file_type.is_dir());

            by_parent.entry(parent_key).or_default().push(TreeNode {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry_path.display().to_string(),
                kind: if is_dir {
                    NodeKind::Directory
                } else {
                    NodeKind::File
                },
                children: Vec::new(),
            });
        }

        let root_path = root.display().to_string();
        let mut listing_root = TreeNode {
            name: root
                .file_name()
                .map_or_else(|| root_path.clone(), |name| name.to_string_lossy().to_string()),
            path: root_path,
            kind: NodeKind::Directory,
            children: Vec::new(),
        };
        attach_children(&mut listing_root, &mut by_parent);

        Ok(DirListing {
            root_path: listing_root.path,
            root_name: listing_root.name,
            children: listing_root.children,
        })
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(PromptconError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        fs::read_to_string(path).map_err(Into::into)
    }
}

fn attach_children(node: &mut TreeNode, by_parent: &mut BTreeMap<String, Vec<TreeNode>>) {
    let Some(mut children) = by_parent.remove(&node.path) else {
        return;
    };
    for child in &mut children {
        if child.kind == NodeKind::Directory {
            attach_children(child, by_parent);
        }
    }
    children.sort_by(|a, b| {
        let rank = |node: &TreeNode| match node.kind {
            NodeKind::Directory => 0,
            NodeKind::File => 1,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
    node.children = children;
}

/// Compiles exclusion patterns into a glob set; no patterns means no set.
///
/// # Errors
///
/// Returns `PromptconError::Glob` for an invalid pattern.
pub fn build_exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.name.as_str()).collect()
    }

    #[test]
    fn test_list_directory_structure() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("src")).unwrap();
        fs::write(temp_dir.path().join("src/a.ts"), "let a = 1;").unwrap();
        fs::write(temp_dir.path().join("readme.md"), "# readme").unwrap();

        let access = FsFileAccess::default();
        let listing = access.list_directory(temp_dir.path()).unwrap();

        // Directories sort before files.
        assert_eq!(names(&listing.children), vec!["src", "readme.md"]);
        assert_eq!(listing.children[0].kind, NodeKind::Directory);
        assert_eq!(names(&listing.children[0].children), vec!["a.ts"]);

        // Paths are absolute and live under the canonicalized root.
        let file = &listing.children[0].children[0];
        assert!(file.path.starts_with(&listing.root_path));
        assert!(file.path.ends_with("a.ts"));
    }

    #[test]
    fn test_list_directory_missing() {
        let temp_dir = TempDir::new().unwrap();
        let access = FsFileAccess::default();

        let result = access.list_directory(&temp_dir.path().join("absent"));
        assert!(matches!(
            result,
            Err(PromptconError::DirectoryNotFound { .. })
        ));

        let file_path = temp_dir.path().join("plain.txt");
        fs::write(&file_path, "x").unwrap();
        let result = access.list_directory(&file_path);
        assert!(matches!(
            result,
            Err(PromptconError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_list_respects_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "target/\n").unwrap();
        fs::create_dir(temp_dir.path().join("target")).unwrap();
        fs::write(temp_dir.path().join("target/out.txt"), "built").unwrap();
        fs::write(temp_dir.path().join("keep.txt"), "kept").unwrap();

        let access = FsFileAccess::default();
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["keep.txt"]);

        let access = FsFileAccess::new(false, None, None);
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["target", "keep.txt"]);
    }

    #[test]
    fn test_list_respects_custom_ignore_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CUSTOM_IGNORE_FILENAME), "secret.txt\n").unwrap();
        fs::write(temp_dir.path().join("secret.txt"), "hidden").unwrap();
        fs::write(temp_dir.path().join("open.txt"), "visible").unwrap();

        let access = FsFileAccess::default();
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["open.txt"]);
    }

    #[test]
    fn test_list_applies_exclude_globs() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("app.log"), "log").unwrap();
        fs::write(temp_dir.path().join("app.rs"), "code").unwrap();

        let exclude = build_exclude_set(&["*.log".to_string()]).unwrap();
        let access = FsFileAccess::new(true, exclude, None);
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["app.rs"]);
    }

    #[test]
    fn test_list_skips_hidden_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".hidden"), "x").unwrap();
        fs::write(temp_dir.path().join("shown.txt"), "y").unwrap();

        let access = FsFileAccess::default();
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["shown.txt"]);
    }

    #[test]
    fn test_list_max_depth() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("a/b/deep.txt"), "deep").unwrap();
        fs::write(temp_dir.path().join("top.txt"), "top").unwrap();

        let access = FsFileAccess::new(true, None, Some(1));
        let listing = access.list_directory(temp_dir.path()).unwrap();
        assert_eq!(names(&listing.children), vec!["a", "top.txt"]);
        assert!(listing.children[0].children.is_empty());
    }

    #[test]
    fn test_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, "test content").unwrap();

        let access = FsFileAccess::default();
        assert_eq!(access.read_file(&file_path).unwrap(), "test content");

        let result = access.read_file(&temp_dir.path().join("absent.txt"));
        assert!(matches!(result, Err(PromptconError::FileNotFound { .. })));

        let result = access.read_file(temp_dir.path());
        assert!(matches!(result, Err(PromptconError::FileNotFound { .. })));
    }

    #[test]
    fn test_build_exclude_set() {
        assert!(build_exclude_set(&[]).unwrap().is_none());

        let set = build_exclude_set(&["*.log".to_string(), "tmp/**".to_string()])
            .unwrap()
            .unwrap();
        assert!(set.is_match("app.log"));
        assert!(set.is_match("tmp/cache/x"));
        assert!(!set.is_match("src/main.rs"));

        assert!(matches!(
            build_exclude_set(&["[".to_string()]),
            Err(PromptconError::Glob(_))
        ));
    }
}
