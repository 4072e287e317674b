use clap::{Parser, ValueEnum};
use promptcon::{
    Block, BlockKind, FILE_BLOCK, FileAccess, Flattener, FsFileAccess, FsTemplateStore,
    HeuristicTokenEstimator, NodeState, PromptconError, Result, SelectionEngine, TemplateCache,
    TokenEstimator, build_exclude_set, find_placeholders, new_id, parse_blocks, render_block,
    render_blocks, render_file_map, resolve_template, validate_groups,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LONG_HELP: &str = r#"
Reference:
  {{TEMPLATE_NAME}}         - Inline a stored template (expanded recursively)
  {{FILE_BLOCK}}            - Snapshot of the selected files plus directory map
  {{TEXT_BLOCK=some text}}  - Literal text block
  {{PROMPT_RESPONSE=name}}  - Response slot kept for later editing

Template lookup:
  NAME is tried as spelled, then NAME.txt, then NAME.md. Each spelling is
  looked up in the project templates directory (.promptcon/templates under
  the base directory) before the global one.

Examples:
  # Stitch files and directories into a prompt
  promptcon src/ README.md
  # Flatten and render a template file
  promptcon --template prompt.txt
  # Template from stdin with a file selection
  echo "Review: {{FILE_BLOCK}}" | promptcon --template - --select src/
  # Validate template references without rendering (dry run)
  promptcon --template prompt.txt --dry-run
  # Inspect the parsed blocks
  promptcon --template prompt.txt --list=detailed
  # Token budget per block
  promptcon --template prompt.txt --stats --model gpt-4o
  # Save the composition for re-editing
  promptcon --template prompt.txt --export composition.json
  # Re-render a saved composition
  promptcon --import composition.json

Template example:
  # Code Review
  {{REVIEW_INTRO}}
  ## Files
  {{FILE_BLOCK}}
  ## Notes
  {{TEXT_BLOCK=Focus on error handling.}}
  ## Proposal
  {{PROMPT_RESPONSE=proposal.md}}


For more information, visit: https://github.com/0x484558/promptcon
"#;

/// Prompt composition from templates and file selections.
///
/// Copyright 2025 0x484558 @ aleph0 s.r.o.
/// Licensed under the EUPL v1.2.
#[derive(Parser, Debug)]
#[command(
    name = "promptcon",
    version,
    author = "0x484558 @ aleph0 s.r.o.",
    about = "Prompt composition from templates and file selections.",
    after_long_help = LONG_HELP,
    after_help = "For more information, visit: https://github.com/0x484558/promptcon"
)]
struct Cli {
    /// Files and directories to select (stitching mode)
    #[arg(value_name = "INPUTS", required_unless_present_any = ["template", "import"])]
    inputs: Vec<PathBuf>,

    /// Template file to flatten and render. Use '-' for stdin.
    #[arg(long, short, value_name = "TEMPLATE", conflicts_with = "inputs")]
    template: Option<PathBuf>,

    /// Re-render a previously exported composition (JSON)
    #[arg(long, value_name = "FILE", conflicts_with_all = ["inputs", "template"])]
    import: Option<PathBuf>,

    /// Write the parsed composition as JSON for later re-rendering
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Base directory for resolving inputs and the project template store
    #[arg(short, long, value_name = "DIR", env = "PROMPTCON_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Project templates directory (defaults to .promptcon/templates under the base directory)
    #[arg(long, value_name = "DIR")]
    templates_dir: Option<PathBuf>,

    /// Global templates directory, consulted after the project one
    #[arg(long, value_name = "DIR", env = "PROMPTCON_GLOBAL_TEMPLATES")]
    global_templates: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Additional paths to select into {{FILE_BLOCK}} snapshots (repeatable)
    #[arg(long, value_name = "PATH", action = clap::ArgAction::Append)]
    select: Vec<PathBuf>,

    /// Maximum directory listing depth (unlimited when omitted)
    #[arg(short = 'd', long, value_name = "DEPTH")]
    max_depth: Option<usize>,

    /// Exclude glob patterns, relative to each listed root (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB", action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Disable compliance with .gitignore files
    #[arg(long)]
    no_gitignore: bool,

    /// Omit the directory map from file snapshots
    #[arg(long)]
    no_map: bool,

    /// Model identifier used for token estimates
    #[arg(long, value_name = "MODEL", default_value = "gpt-4o")]
    model: String,

    /// Print per-block and total token counts to stderr
    #[arg(long)]
    stats: bool,

    /// Validate template references without rendering
    #[arg(long, conflicts_with_all = ["list", "import"])]
    dry_run: bool,

    /// List parsed blocks (optionally with format: plain, detailed, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "dry_run")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// One line per block
    Plain,
    /// Detailed information about each block
    Detailed,
    /// JSON output for scripting
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let base_dir = match &cli.base_dir {
        Some(dir) => dir.canonicalize()?,
        None => std::env::current_dir()?,
    };

    let templates_dir = cli
        .templates_dir
        .clone()
        .unwrap_or_else(|| base_dir.join(".promptcon").join("templates"));
    let store = FsTemplateStore::new(Some(templates_dir), cli.global_templates.clone());
    let mut cache = TemplateCache::new();

    let access = FsFileAccess::new(
        !cli.no_gitignore,
        build_exclude_set(&cli.exclude)?,
        cli.max_depth,
    );

    let mut engine = SelectionEngine::new();
    for path in cli.inputs.iter().chain(cli.select.iter()) {
        add_selection(&mut engine, &access, &base_dir, path)?;
    }
    let loaded = engine.load_pending(&access);
    tracing::debug!("loaded content for {loaded} selected files");

    let mut blocks = if let Some(import_path) = &cli.import {
        tracing::info!("importing composition from {}", import_path.display());
        let json = fs::read_to_string(import_path)?;
        let blocks: Vec<Block> = serde_json::from_str(&json)?;
        validate_groups(&blocks)?;
        blocks
    } else {
        let template = template_content(cli)?;
        if cli.dry_run {
            return dry_run(&template, &store, &mut cache);
        }

        let mut flattener = Flattener::new(&store, &mut cache);
        let flattened = flattener.flatten(&template);

        let group_id = new_id();
        let outcome = parse_blocks(&flattened, Some(&group_id), None);
        for warning in &outcome.warnings {
            tracing::warn!("{warning}");
        }
        outcome.blocks
    };

    if !engine.roots().is_empty() {
        fill_file_blocks(&mut blocks, &engine);
    }
    if cli.no_map {
        for block in &mut blocks {
            if let BlockKind::Files {
                include_project_map,
                ..
            } = &mut block.kind
            {
                *include_project_map = false;
            }
        }
    }

    if let Some(list_format) = cli.list {
        return list_blocks(&blocks, list_format, &cli.model);
    }

    let mut flattener = Flattener::new(&store, &mut cache);
    let rendered = render_blocks(&blocks, &mut flattener);

    if cli.stats {
        print_stats(&blocks, &rendered, &mut flattener, &cli.model);
    }

    if let Some(export_path) = &cli.export {
        tracing::info!("exporting composition to {}", export_path.display());
        let json = serde_json::to_string_pretty(&blocks)?;
        fs::write(export_path, json)?;
    }

    if let Some(output_path) = &cli.output {
        tracing::info!("writing output to {}", output_path.display());
        fs::write(output_path, rendered)?;
    } else {
        print!("{rendered}");
        io::stdout().flush()?;
    }

    Ok(())
}

fn template_content(cli: &Cli) -> Result<String> {
    if let Some(template_path) = &cli.template {
        if template_path.as_path() == Path::new("-") {
            tracing::info!("reading template from stdin");
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            tracing::info!("reading template from {}", template_path.display());
            fs::read_to_string(template_path).map_err(Into::into)
        }
    } else {
        // Stitching mode: the inputs form the selection and the prompt is a
        // bare files placeholder.
        Ok(format!("{{{{{FILE_BLOCK}}}}}"))
    }
}

fn add_selection(
    engine: &mut SelectionEngine,
    access: &FsFileAccess,
    base_dir: &Path,
    path: &Path,
) -> Result<()> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    if resolved.is_dir() {
        let listing = access.list_directory(&resolved)?;
        let root_path = listing.root_path.clone();
        engine.add_root(listing);
        if engine.state(&root_path) != NodeState::All {
            engine.toggle(&root_path);
        }
    } else if resolved.is_file() {
        let parent = resolved.parent().unwrap_or(base_dir);
        engine.add_root(access.list_directory(parent)?);

        let file_key = resolved.canonicalize()?.display().to_string();
        if engine.state(&file_key) != NodeState::All {
            engine.toggle(&file_key);
        }
        if engine.state(&file_key) != NodeState::All {
            tracing::warn!(
                "input not present in listing (ignored or excluded): {}",
                resolved.display()
            );
        }
    } else {
        return Err(PromptconError::FileNotFound { path: resolved });
    }

    Ok(())
}

fn fill_file_blocks(blocks: &mut [Block], engine: &SelectionEngine) {
    let entries = engine.selected_file_entries();
    let map = engine
        .roots()
        .iter()
        .map(render_file_map)
        .collect::<Vec<_>>()
        .join("\n\n");

    for block in blocks.iter_mut() {
        if let BlockKind::Files {
            files, project_map, ..
        } = &mut block.kind
        {
            *files = entries.clone();
            *project_map = map.clone();
        }
    }
}

fn dry_run(template: &str, store: &FsTemplateStore, cache: &mut TemplateCache) -> Result<()> {
    tracing::info!("performing dry run - validating template references");

    let placeholders = find_placeholders(template);
    let total = placeholders.len();
    let mut resolvable = 0;
    let mut missing = 0;

    for placeholder in &placeholders {
        match placeholder.template_name() {
            None => {
                println!("✓ {} (reserved form)", placeholder.name);
                resolvable += 1;
            }
            Some(name) => {
                if resolve_template(name, store, cache).is_some() {
                    println!("✓ {name}");
                    resolvable += 1;
                } else {
                    println!("✗ {name} (not found)");
                    missing += 1;
                }
            }
        }
    }

    println!("\nSummary: {total} placeholders found");
    if resolvable > 0 {
        println!("  ✓ {resolvable} resolvable");
    }
    if missing > 0 {
        println!("  ✗ {missing} missing");
        std::process::exit(1);
    }

    Ok(())
}

fn list_blocks(blocks: &[Block], format: ListFormat, model: &str) -> Result<()> {
    match format {
        ListFormat::Plain => {
            for block in blocks {
                println!("{}: {}", kind_name(&block.kind), summary(&block.kind));
            }
        }
        ListFormat::Detailed => {
            let estimator = HeuristicTokenEstimator;
            for block in blocks {
                println!("Block: {}", block.id);
                println!("  Kind: {}", kind_name(&block.kind));
                if let Some(group_id) = &block.group.group_id {
                    println!("  Group: {group_id}");
                }
                println!("  Lead: {}", if block.group.is_lead { "yes" } else { "no" });
                println!("  Locked: {}", if block.group.locked { "yes" } else { "no" });

                match &block.kind {
                    BlockKind::Text { content } | BlockKind::Template { content, .. } => {
                        println!("  Tokens: {}", estimator.estimate(content, model));
                        println!("  Content: {}", preview(content));
                    }
                    BlockKind::Files {
                        files,
                        include_project_map,
                        ..
                    } => {
                        println!("  Files: {}", files.len());
                        println!(
                            "  Project map: {}",
                            if *include_project_map { "yes" } else { "no" }
                        );
                    }
                    BlockKind::PromptResponse {
                        source_file,
                        content,
                    } => {
                        println!("  Source: {source_file}");
                        println!("  Tokens: {}", estimator.estimate(content, model));
                    }
                }
                println!();
            }
        }
        ListFormat::Json => {
            let json = serde_json::to_string_pretty(blocks)?;
            println!("{json}");
        }
    }

    Ok(())
}

fn kind_name(kind: &BlockKind) -> &'static str {
    match kind {
        BlockKind::Text { .. } => "text",
        BlockKind::Template { .. } => "template",
        BlockKind::Files { .. } => "files",
        BlockKind::PromptResponse { .. } => "prompt_response",
    }
}

fn summary(kind: &BlockKind) -> String {
    match kind {
        BlockKind::Text { content }
        | BlockKind::Template { content, .. }
        | BlockKind::PromptResponse { content, .. } => preview(content),
        BlockKind::Files { files, .. } => format!("{} files", files.len()),
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', "\\n");
    if flat.chars().count() > 60 {
        let truncated: String = flat.chars().take(60).collect();
        format!("{truncated}...")
    } else {
        flat
    }
}

fn print_stats(blocks: &[Block], rendered: &str, flattener: &mut Flattener<'_>, model: &str) {
    let estimator = HeuristicTokenEstimator;

    eprintln!("Token usage ({model}):");
    for (index, block) in blocks.iter().enumerate() {
        let contribution = render_block(block, flattener);
        let tokens = estimator.estimate(contribution.trim(), model);
        eprintln!(
            "  block {:>3}  {:<16} {:>7} tokens",
            index + 1,
            kind_name(&block.kind),
            tokens
        );
    }
    eprintln!(
        "  total {:>31} tokens",
        estimator.estimate(rendered, model)
    );
}
