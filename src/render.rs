use crate::blocks::{Block, BlockKind, FileEntry, TemplateVariable};
use crate::flatten::Flattener;
use crate::selection::{NodeKind, TreeNode};

/// Renders an ordered block sequence to the final prompt text.
///
/// Blocks are processed strictly in sequence order. Each block's rendering is
/// trimmed; empty renderings are dropped and the rest are joined by exactly
/// one blank line, so the result carries no leading or trailing blank lines.
pub fn render_blocks(blocks: &[Block], flattener: &mut Flattener<'_>) -> String {
    let parts: Vec<String> = blocks
        .iter()
        .map(|block| render_block(block, flattener))
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();

    parts.join("\n\n")
}

/// Renders a single block's contribution, before trimming and joining.
pub fn render_block(block: &Block, flattener: &mut Flattener<'_>) -> String {
    match &block.kind {
        BlockKind::Text { content } => flattener.flatten(content),
        BlockKind::Template { content, variables } => {
            let substituted = substitute_variables(content, variables);
            flattener.flatten(&substituted)
        }
        BlockKind::Files {
            files,
            project_map,
            include_project_map,
        } => {
            let mut parts = Vec::new();
            if *include_project_map && !project_map.trim().is_empty() {
                parts.push(project_map.trim().to_string());
            }
            for file in files {
                parts.push(render_file_entry(file));
            }
            parts.join("\n\n")
        }
        BlockKind::PromptResponse { content, .. } => flattener.flatten(content),
    }
}

fn substitute_variables(content: &str, variables: &[TemplateVariable]) -> String {
    let mut result = content.to_string();
    for variable in variables {
        let needle = format!("{{{{{}}}}}", variable.name);
        if result.contains(&needle) {
            result = result.replace(&needle, &variable.default);
        }
    }
    result
}

fn render_file_entry(entry: &FileEntry) -> String {
    format!(
        "<file_contents>\nFile: {}\n```{}\n{}\n```\n</file_contents>",
        entry.path,
        entry.language,
        entry.content.trim_end()
    )
}

/// Renders one tracked folder as an ASCII tree wrapped in `<file_map>` tags.
///
/// The first line inside the wrapper is the root's path. Every other line is
/// `<prefix><marker><label>`: the marker is `└── ` for a last sibling and
/// `├── ` otherwise, and the prefix accumulates `    ` or `│   ` per
/// ancestor depending on whether that ancestor was itself a last sibling.
/// Directories sort before files, both groups alphabetically, and directory
/// labels carry a `[D] ` prefix.
#[must_use]
pub fn render_file_map(root: &TreeNode) -> String {
    let mut out = String::new();
    out.push_str("<file_map>\n");
    out.push_str(&root.path);
    out.push('\n');
    render_map_level(&root.children, "", &mut out);
    out.push_str("</file_map>");
    out
}

fn render_map_level(children: &[TreeNode], prefix: &str, out: &mut String) {
    let mut ordered: Vec<&TreeNode> = children.iter().collect();
    ordered.sort_by(|a, b| {
        let rank = |node: &TreeNode| match node.kind {
            NodeKind::Directory => 0,
            NodeKind::File => 1,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });

    let count = ordered.len();
    for (index, child) in ordered.into_iter().enumerate() {
        let last = index + 1 == count;
        let marker = if last { "└── " } else { "├── " };

        out.push_str(prefix);
        out.push_str(marker);
        if child.kind == NodeKind::Directory {
            out.push_str("[D] ");
        }
        out.push_str(&child.name);
        out.push('\n');

        if child.kind == NodeKind::Directory {
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_map_level(&child.children, &child_prefix, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::parse_blocks;
    use crate::store::{MemoryStore, TemplateCache};

    fn render_with_store(store: &MemoryStore, blocks: &[Block]) -> String {
        let mut cache = TemplateCache::new();
        let mut flattener = Flattener::new(store, &mut cache);
        render_blocks(blocks, &mut flattener)
    }

    fn file(path: &str) -> TreeNode {
        TreeNode {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    fn dir(path: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            kind: NodeKind::Directory,
            children,
        }
    }

    #[test]
    fn test_render_single_text_block_round_trip() {
        let store = MemoryStore::new();
        let outcome = parse_blocks("hello world", None, None);
        assert_eq!(render_with_store(&store, &outcome.blocks), "hello world");
    }

    #[test]
    fn test_render_joins_blocks_with_one_blank_line() {
        let store = MemoryStore::new();
        let blocks = vec![Block::template("first\n"), Block::text("second")];
        assert_eq!(render_with_store(&store, &blocks), "first\n\nsecond");
    }

    #[test]
    fn test_render_skips_empty_blocks() {
        let store = MemoryStore::new();
        let blocks = vec![
            Block::template(""),
            Block::text("kept"),
            Block::template("   \n"),
        ];
        assert_eq!(render_with_store(&store, &blocks), "kept");
    }

    #[test]
    fn test_render_template_variables() {
        let store = MemoryStore::new();
        let mut block = Block::template("Hello {{name}}, welcome to {{place}}!");
        if let BlockKind::Template { variables, .. } = &mut block.kind {
            variables.push(TemplateVariable {
                name: "name".to_string(),
                default: "Ada".to_string(),
            });
            variables.push(TemplateVariable {
                name: "place".to_string(),
                default: "the machine room".to_string(),
            });
        }

        assert_eq!(
            render_with_store(&store, &[block]),
            "Hello Ada, welcome to the machine room!"
        );
    }

    #[test]
    fn test_render_template_resolves_nested_references() {
        let mut store = MemoryStore::new();
        store.insert_project("SIGNATURE", "yours truly");

        let blocks = vec![Block::template("regards, {{SIGNATURE}}")];
        assert_eq!(
            render_with_store(&store, &blocks),
            "regards, yours truly"
        );
    }

    #[test]
    fn test_render_prompt_response_content() {
        let store = MemoryStore::new();
        let mut block = Block::prompt_response("plan.md");
        if let BlockKind::PromptResponse { content, .. } = &mut block.kind {
            *content = "captured answer".to_string();
        }

        assert_eq!(render_with_store(&store, &[block]), "captured answer");
    }

    #[test]
    fn test_render_files_block_format() {
        let store = MemoryStore::new();
        let mut block = Block::files();
        if let BlockKind::Files {
            files, project_map, ..
        } = &mut block.kind
        {
            *project_map = "<file_map>\n/proj\n└── main.rs\n</file_map>".to_string();
            files.push(FileEntry::new("/proj/main.rs", "fn main() {}\n\n"));
        }

        let expected = "<file_map>\n/proj\n└── main.rs\n</file_map>\n\n\
                        <file_contents>\nFile: /proj/main.rs\n```rust\nfn main() {}\n```\n</file_contents>";
        assert_eq!(render_with_store(&store, &[block]), expected);
    }

    #[test]
    fn test_render_files_block_map_suppressed() {
        let store = MemoryStore::new();
        let mut block = Block::files();
        if let BlockKind::Files {
            files,
            project_map,
            include_project_map,
        } = &mut block.kind
        {
            *project_map = "<file_map>\n/proj\n</file_map>".to_string();
            *include_project_map = false;
            files.push(FileEntry::new("/proj/a.txt", "text"));
        }

        let rendered = render_with_store(&store, &[block]);
        assert!(!rendered.contains("<file_map>"));
        assert!(rendered.contains("File: /proj/a.txt"));
    }

    #[test]
    fn test_render_file_map_scenario() {
        let root = dir(
            "/abs/proj",
            vec![
                dir("/abs/proj/src", vec![file("/abs/proj/src/a.ts")]),
                file("/abs/proj/readme.md"),
            ],
        );

        let expected = "<file_map>\n\
                        /abs/proj\n\
                        ├── [D] src\n\
                        │   └── a.ts\n\
                        └── readme.md\n\
                        </file_map>";
        assert_eq!(render_file_map(&root), expected);
    }

    #[test]
    fn test_render_file_map_orders_directories_first() {
        let root = dir(
            "/r",
            vec![
                file("/r/zebra.txt"),
                dir("/r/beta", Vec::new()),
                file("/r/alpha.txt"),
                dir("/r/delta", Vec::new()),
            ],
        );

        let rendered = render_file_map(&root);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "<file_map>",
                "/r",
                "├── [D] beta",
                "├── [D] delta",
                "├── alpha.txt",
                "└── zebra.txt",
                "</file_map>",
            ]
        );
    }

    #[test]
    fn test_render_file_map_deep_prefixes() {
        let root = dir(
            "/r",
            vec![
                dir(
                    "/r/a",
                    vec![dir("/r/a/b", vec![file("/r/a/b/leaf.txt")])],
                ),
                file("/r/tail.txt"),
            ],
        );

        let rendered = render_file_map(&root);
        assert!(rendered.contains("├── [D] a\n│   └── [D] b\n│       └── leaf.txt\n"));
    }

    #[test]
    fn test_render_collects_warnings_across_blocks() {
        let store = MemoryStore::new();
        let mut cache = TemplateCache::new();
        let mut flattener = Flattener::new(&store, &mut cache);

        let blocks = vec![Block::template("{{GONE}}"), Block::text("{{ALSO_GONE}}")];
        render_blocks(&blocks, &mut flattener);
        assert_eq!(flattener.warnings().len(), 2);
    }
}
