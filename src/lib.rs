//! # promptcon
//!
//! A prompt-composition library and CLI tool built around recursive template
//! flattening. Named `{{TEMPLATE}}` references are inlined from per-project
//! and global template stores, the flattened text is parsed into an ordered
//! block sequence, and the blocks render to a final prompt with file
//! selections, directory maps and token estimates for Large Language Model
//! use.
//!
//! ## Features
//!
//! - Recursive `{{NAME}}` expansion with cycle detection and depth limits
//! - Project-before-global template lookup with extension fallback
//! - Block parsing of reserved `{{FILE_BLOCK}}`, `{{TEXT_BLOCK=...}}` and
//!   `{{PROMPT_RESPONSE=...}}` forms
//! - Tri-state file selection over tracked folder trees
//! - `<file_map>` / `<file_contents>` prompt rendering
//! - Pluggable token estimation for budget display
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```
//! use promptcon::{Flattener, MemoryStore, TemplateCache, parse_blocks, render_blocks};
//!
//! let mut store = MemoryStore::new();
//! store.insert_project("GREETING", "Hi {{TEXT_BLOCK=there}}");
//!
//! let mut cache = TemplateCache::new();
//! let mut flattener = Flattener::new(&store, &mut cache);
//! let flattened = flattener.flatten("{{GREETING}}");
//!
//! let outcome = parse_blocks(&flattened, None, None);
//! let rendered = render_blocks(&outcome.blocks, &mut flattener);
//! assert_eq!(rendered, "Hi\n\nthere");
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Stitch files and directories into a prompt
//! promptcon src/ README.md
//!
//! # Flatten and render a template file
//! promptcon --template prompt.txt
//!
//! # Render from stdin with a file selection
//! echo "Context: {{FILE_BLOCK}}" | promptcon --template - --select src/
//!
//! # Show token usage per block
//! promptcon --template prompt.txt --stats --model gpt-4o
//! ```

pub mod blocks;
pub mod error;
pub mod flatten;
pub mod fs_access;
pub mod render;
pub mod selection;
pub mod store;
pub mod tokens;

// Re-export main types and functions for convenience
pub use blocks::{
    Block, BlockKind, FileEntry, GroupMembership, ParseOutcome, ParseWarning, TemplateVariable,
    language_for_path, new_id, parse_blocks, validate_groups,
};
pub use error::{PromptconError, Result};
pub use flatten::{
    DEFAULT_MAX_DEPTH, FILE_BLOCK, FlattenWarning, Flattener, MAX_SUBSTITUTIONS, PROMPT_RESPONSE,
    Placeholder, TEXT_BLOCK, find_placeholders,
};
pub use fs_access::{CUSTOM_IGNORE_FILENAME, FileAccess, FsFileAccess, build_exclude_set};
pub use render::{render_block, render_blocks, render_file_map};
pub use selection::{DirListing, NodeKind, NodeState, SelectionEngine, TreeNode};
pub use store::{FsTemplateStore, MemoryStore, TemplateCache, TemplateStore, resolve_template};
pub use tokens::{HeuristicTokenEstimator, TokenEstimator, WhitespaceTokenEstimator};
