use crate::error::{PromptconError, Result};
use crate::flatten::{FILE_BLOCK, PROMPT_RESPONSE, TEXT_BLOCK, find_placeholders};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Generates a fresh block identifier.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A named substitution variable declared by a template block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    pub default: String,
}

/// A file captured into a files block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    pub language: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = language_for_path(&path);
        Self {
            path,
            content: content.into(),
            language,
        }
    }
}

/// The discriminated payload of a block.
///
/// The set of kinds is closed; compositions referring to any other kind fail
/// at deserialization rather than producing a half-understood block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Literal text, rendered verbatim
    Text { content: String },
    /// Editable template text with optional declared variables
    Template {
        content: String,
        #[serde(default)]
        variables: Vec<TemplateVariable>,
    },
    /// Snapshot of selected files plus an optional rendered directory map
    Files {
        #[serde(default)]
        files: Vec<FileEntry>,
        #[serde(default)]
        project_map: String,
        #[serde(default = "default_true")]
        include_project_map: bool,
    },
    /// Named slot whose content is written by a later editing step
    PromptResponse { source_file: String, content: String },
}

fn default_true() -> bool {
    true
}

/// Group bookkeeping shared by every block.
///
/// A block belongs to at most one group; within a group exactly one block is
/// the lead, the unlocked representative the user edits. All other members
/// are locked against direct editing and are regenerated by re-parsing the
/// lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupMembership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_lead: bool,
    #[serde(default)]
    pub locked: bool,
}

/// One element of an ordered composition.
///
/// Ordering in the containing sequence is the only ordering signal; ids are
/// unique within a composition and stable across re-parses of a group lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(flatten)]
    pub group: GroupMembership,
    #[serde(flatten)]
    pub kind: BlockKind,
}

impl Block {
    fn with_kind(kind: BlockKind) -> Self {
        Self {
            id: new_id(),
            group: GroupMembership::default(),
            kind,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(BlockKind::Text {
            content: content.into(),
        })
    }

    pub fn template(content: impl Into<String>) -> Self {
        Self::with_kind(BlockKind::Template {
            content: content.into(),
            variables: Vec::new(),
        })
    }

    #[must_use]
    pub fn files() -> Self {
        Self::with_kind(BlockKind::Files {
            files: Vec::new(),
            project_map: String::new(),
            include_project_map: true,
        })
    }

    pub fn prompt_response(source_file: impl Into<String>) -> Self {
        Self::with_kind(BlockKind::PromptResponse {
            source_file: source_file.into(),
            content: String::new(),
        })
    }
}

/// Non-fatal condition observed while parsing flattened text into blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A placeholder that is neither a reserved form nor a resolvable
    /// template survived into the parse input
    UnknownPlaceholder { name: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlaceholder { name } => {
                write!(f, "unrecognized placeholder kept as literal text: {name}")
            }
        }
    }
}

/// Blocks produced by a parse together with any warnings raised
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub blocks: Vec<Block>,
    pub warnings: Vec<ParseWarning>,
}

/// Parses flattened template text into an ordered block sequence.
///
/// The text up to the first placeholder always becomes the unlocked lead
/// template block, even when empty, so every parse yields exactly one lead.
/// Every other text segment becomes a locked template block. Reserved
/// placeholders become their corresponding kinds; anything else degrades to
/// an inert locked block holding the literal placeholder text, reported as a
/// warning. Parsing never fails.
#[must_use]
pub fn parse_blocks(
    flattened: &str,
    group_id: Option<&str>,
    lead_block_id: Option<&str>,
) -> ParseOutcome {
    let placeholders = find_placeholders(flattened);
    let mut blocks = Vec::new();
    let mut warnings = Vec::new();

    let membership = |is_lead: bool| GroupMembership {
        group_id: group_id.map(str::to_string),
        is_lead,
        locked: !is_lead,
    };

    let lead_end = placeholders
        .first()
        .map_or(flattened.len(), |placeholder| placeholder.start);
    blocks.push(Block {
        id: lead_block_id.map_or_else(new_id, str::to_string),
        group: membership(true),
        kind: BlockKind::Template {
            content: flattened[..lead_end].to_string(),
            variables: Vec::new(),
        },
    });

    let mut cursor = lead_end;
    for placeholder in &placeholders {
        if placeholder.start > cursor {
            blocks.push(Block {
                id: new_id(),
                group: membership(false),
                kind: BlockKind::Template {
                    content: flattened[cursor..placeholder.start].to_string(),
                    variables: Vec::new(),
                },
            });
        }

        let kind = match (placeholder.name.as_str(), placeholder.param.as_deref()) {
            (TEXT_BLOCK, Some(value)) => Some(BlockKind::Text {
                content: value.to_string(),
            }),
            (FILE_BLOCK, None) => Some(BlockKind::Files {
                files: Vec::new(),
                project_map: String::new(),
                include_project_map: true,
            }),
            (PROMPT_RESPONSE, Some(source)) if !source.trim().is_empty() => {
                Some(BlockKind::PromptResponse {
                    source_file: source.trim().to_string(),
                    content: String::new(),
                })
            }
            _ => None,
        };

        let kind = kind.unwrap_or_else(|| {
            warnings.push(ParseWarning::UnknownPlaceholder {
                name: placeholder.name.clone(),
            });
            BlockKind::Template {
                content: flattened[placeholder.start..placeholder.end].to_string(),
                variables: Vec::new(),
            }
        });

        blocks.push(Block {
            id: new_id(),
            group: membership(false),
            kind,
        });
        cursor = placeholder.end;
    }

    if cursor < flattened.len() {
        blocks.push(Block {
            id: new_id(),
            group: membership(false),
            kind: BlockKind::Template {
                content: flattened[cursor..].to_string(),
                variables: Vec::new(),
            },
        });
    }

    ParseOutcome { blocks, warnings }
}

/// Checks that block ids are unique across the composition and that no
/// group declares more than one lead block.
///
/// # Errors
///
/// Returns `PromptconError::DuplicateBlockId` or
/// `PromptconError::DuplicateGroupLead` naming the first offending id or
/// group.
pub fn validate_groups(blocks: &[Block]) -> Result<()> {
    let mut ids: HashSet<&str> = HashSet::new();
    let mut leads: HashMap<&str, usize> = HashMap::new();

    for block in blocks {
        if !ids.insert(block.id.as_str()) {
            return Err(PromptconError::DuplicateBlockId {
                id: block.id.clone(),
            });
        }
        if block.group.is_lead
            && let Some(group_id) = block.group.group_id.as_deref()
        {
            let count = leads.entry(group_id).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(PromptconError::DuplicateGroupLead {
                    group_id: group_id.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Maps a file path to the fence language tag used when rendering its
/// contents. Unrecognized extensions fall through as themselves.
#[must_use]
pub fn language_for_path(path: &str) -> String {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    match extension {
        "rs" => "rust".to_string(),
        "ts" | "tsx" => "typescript".to_string(),
        "js" | "jsx" | "mjs" => "javascript".to_string(),
        "py" => "python".to_string(),
        "rb" => "ruby".to_string(),
        "go" => "go".to_string(),
        "java" => "java".to_string(),
        "kt" => "kotlin".to_string(),
        "swift" => "swift".to_string(),
        "c" | "h" => "c".to_string(),
        "cc" | "cpp" | "cxx" | "hpp" => "cpp".to_string(),
        "cs" => "csharp".to_string(),
        "md" | "markdown" => "markdown".to_string(),
        "json" => "json".to_string(),
        "yaml" | "yml" => "yaml".to_string(),
        "toml" => "toml".to_string(),
        "sh" | "bash" | "zsh" => "bash".to_string(),
        "html" | "htm" => "html".to_string(),
        "css" => "css".to_string(),
        "sql" => "sql".to_string(),
        "xml" => "xml".to_string(),
        "txt" | "" => String::new(),
        other => other.to_ascii_lowercase(),
    }
}
