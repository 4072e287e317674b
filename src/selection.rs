use crate::blocks::FileEntry;
use crate::fs_access::FileAccess;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Selection state of a node. Directory states are derived from children;
/// file states are set only by direct toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    None,
    All,
    Partial,
}

/// A node in a listed directory tree. `path` is the unique, stable key used
/// by every state map in the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

/// A directory listing as produced by a file access implementation, already
/// filtered by ignore rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub root_path: String,
    pub root_name: String,
    pub children: Vec<TreeNode>,
}

/// Tri-state file selection over a forest of tracked folders.
///
/// The engine owns the cached listings, the per-path selection states, the
/// per-path expansion flags and the loaded-content cache. Toggling never
/// blocks on file reads; newly selected files are queued and fetched by a
/// later [`SelectionEngine::load_pending`] call, so consumers observe the
/// selection growing incrementally.
#[derive(Debug, Default)]
pub struct SelectionEngine {
    roots: Vec<TreeNode>,
    states: HashMap<String, NodeState>,
    expanded: HashMap<String, bool>,
    contents: HashMap<String, String>,
    pending: BTreeSet<String>,
}

impl SelectionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// Selection state for a path; paths never seen default to `None`.
    #[must_use]
    pub fn state(&self, path: &str) -> NodeState {
        self.states.get(path).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.get(path).copied().unwrap_or(false)
    }

    /// Starts tracking a folder. A listing for an already tracked root is
    /// treated as a refresh of that root; a listing nested inside a tracked
    /// tree is grafted onto the node that already keys its path, and tracked
    /// roots that reappear inside a new listing are absorbed by it. Every
    /// path therefore keeps exactly one node in the forest. New roots start
    /// expanded, their descendants collapsed.
    pub fn add_root(&mut self, listing: DirListing) {
        if self.roots.iter().any(|root| root.path == listing.root_path) {
            self.refresh(listing);
            return;
        }

        // Roots covered by the new listing are absorbed; their selections
        // stay dormant in the state map and reattach during recompute.
        self.roots
            .retain(|root| find_node(&listing.children, &root.path).is_none());

        if let Some(node) = find_node_mut(&mut self.roots, &listing.root_path) {
            node.name = listing.root_name;
            node.children = listing.children;
        } else {
            self.expanded.insert(listing.root_path.clone(), true);
            self.roots.push(TreeNode {
                name: listing.root_name,
                path: listing.root_path,
                kind: NodeKind::Directory,
                children: listing.children,
            });
        }
        self.recompute();
        self.resync_contents();
    }

    /// Stops tracking a folder and drops every piece of state keyed under it.
    pub fn remove_root(&mut self, root_path: &str) {
        let Some(index) = self.roots.iter().position(|root| root.path == root_path) else {
            return;
        };
        let root = self.roots.remove(index);

        let mut paths = Vec::new();
        collect_paths(&root, &mut paths);
        for path in &paths {
            self.states.remove(path);
            self.expanded.remove(path);
            self.contents.remove(path);
            self.pending.remove(path);
        }
    }

    /// Replaces the cached subtree for the listing's root, then reconciles
    /// states and cached content against the new structure. Selections on
    /// paths that still exist are preserved; state entries for paths that
    /// disappeared are kept dormant so a file that comes back keeps its
    /// selection.
    pub fn refresh(&mut self, listing: DirListing) {
        let Some(root) = self
            .roots
            .iter_mut()
            .find(|root| root.path == listing.root_path)
        else {
            tracing::debug!("refresh ignored for untracked root: {}", listing.root_path);
            return;
        };
        root.name = listing.root_name;
        root.children = listing.children;

        self.recompute();
        self.resync_contents();
    }

    /// Flips a node's selection and propagates it.
    ///
    /// `all` becomes `none`; anything else becomes `all`. The new state
    /// overwrites the entire subtree, after which directory states across the
    /// forest are recomputed bottom-up and the content cache is resynced to
    /// the new selected set.
    pub fn toggle(&mut self, path: &str) {
        let Some(node) = find_node(&self.roots, path) else {
            tracing::debug!("toggle ignored for unknown path: {path}");
            return;
        };

        let next = if self.states.get(path).copied().unwrap_or_default() == NodeState::All {
            NodeState::None
        } else {
            NodeState::All
        };
        overwrite_subtree(node, next, &mut self.states);

        self.recompute();
        self.resync_contents();
    }

    pub fn expand(&mut self, path: &str) {
        self.expanded.insert(path.to_string(), true);
    }

    /// Collapses a directory together with its entire subtree.
    pub fn collapse(&mut self, path: &str) {
        let Some(node) = find_node(&self.roots, path) else {
            return;
        };
        collapse_subtree(node, &mut self.expanded);
    }

    /// Paths of all selected files, in forest order.
    #[must_use]
    pub fn selected_files(&self) -> Vec<String> {
        let mut selected = Vec::new();
        for root in &self.roots {
            collect_selected(root, &self.states, &mut selected);
        }
        selected
    }

    /// Loaded content for a selected file, if the read already completed.
    #[must_use]
    pub fn file_content(&self, path: &str) -> Option<&str> {
        self.contents.get(path).map(String::as_str)
    }

    /// Number of selected files whose content has not been loaded yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drains the pending queue by reading each file through `access`.
    ///
    /// A failed read leaves the file selected with its content unavailable;
    /// the failure is logged and the path is dropped from the queue until a
    /// later toggle or refresh queues it again. Returns the number of files
    /// whose content was loaded.
    pub fn load_pending(&mut self, access: &dyn FileAccess) -> usize {
        let queued: Vec<String> = std::mem::take(&mut self.pending).into_iter().collect();
        let mut loaded = 0;

        for path in queued {
            match access.read_file(Path::new(&path)) {
                Ok(content) => {
                    self.contents.insert(path, content);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("failed to read selected file {path}: {e}");
                }
            }
        }

        loaded
    }

    /// Selected files as renderable entries, in forest order. Files whose
    /// content is unavailable appear with empty content rather than being
    /// dropped.
    #[must_use]
    pub fn selected_file_entries(&self) -> Vec<FileEntry> {
        self.selected_files()
            .into_iter()
            .map(|path| {
                let content = self.contents.get(&path).cloned().unwrap_or_default();
                FileEntry::new(path, content)
            })
            .collect()
    }

    fn recompute(&mut self) {
        for root in &self.roots {
            recompute_states(root, &mut self.states);
        }
    }

    fn resync_contents(&mut self) {
        let selected = self.selected_files();
        let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();

        self.contents
            .retain(|path, _| selected_set.contains(path.as_str()));
        self.pending
            .retain(|path| selected_set.contains(path.as_str()));

        for path in selected {
            if !self.contents.contains_key(&path) {
                self.pending.insert(path);
            }
        }
    }
}

fn find_node<'a>(roots: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
    roots.iter().find_map(|root| find_in(root, path))
}

fn find_in<'a>(node: &'a TreeNode, path: &str) -> Option<&'a TreeNode> {
    if node.path == path {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| find_in(child, path))
}

fn find_node_mut<'a>(roots: &'a mut [TreeNode], path: &str) -> Option<&'a mut TreeNode> {
    roots.iter_mut().find_map(|root| find_in_mut(root, path))
}

fn find_in_mut<'a>(node: &'a mut TreeNode, path: &str) -> Option<&'a mut TreeNode> {
    if node.path == path {
        return Some(node);
    }
    node.children
        .iter_mut()
        .find_map(|child| find_in_mut(child, path))
}

fn overwrite_subtree(node: &TreeNode, state: NodeState, states: &mut HashMap<String, NodeState>) {
    states.insert(node.path.clone(), state);
    for child in &node.children {
        overwrite_subtree(child, state, states);
    }
}

fn recompute_states(node: &TreeNode, states: &mut HashMap<String, NodeState>) -> NodeState {
    match node.kind {
        NodeKind::File => states.get(&node.path).copied().unwrap_or_default(),
        NodeKind::Directory => {
            if node.children.is_empty() {
                // A childless directory keeps whatever was last set on it.
                return states.get(&node.path).copied().unwrap_or_default();
            }

            let mut all_selected = true;
            let mut none_selected = true;
            for child in &node.children {
                match recompute_states(child, states) {
                    NodeState::All => none_selected = false,
                    NodeState::None => all_selected = false,
                    NodeState::Partial => {
                        all_selected = false;
                        none_selected = false;
                    }
                }
            }

            let state = if all_selected {
                NodeState::All
            } else if none_selected {
                NodeState::None
            } else {
                NodeState::Partial
            };
            states.insert(node.path.clone(), state);
            state
        }
    }
}

fn collect_selected(node: &TreeNode, states: &HashMap<String, NodeState>, out: &mut Vec<String>) {
    match node.kind {
        NodeKind::File => {
            if states.get(&node.path).copied().unwrap_or_default() == NodeState::All {
                out.push(node.path.clone());
            }
        }
        NodeKind::Directory => {
            for child in &node.children {
                collect_selected(child, states, out);
            }
        }
    }
}

fn collect_paths(node: &TreeNode, out: &mut Vec<String>) {
    out.push(node.path.clone());
    for child in &node.children {
        collect_paths(child, out);
    }
}

fn collapse_subtree(node: &TreeNode, expanded: &mut HashMap<String, bool>) {
    expanded.insert(node.path.clone(), false);
    for child in &node.children {
        collapse_subtree(child, expanded);
    }
}
