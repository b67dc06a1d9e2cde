use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemaforge_core::{Config, Diagnostic, Report, Schema, Severity, SourceFormat};
use schemaforge_engine::{apply_overrides, build_schema_diff, compare, parse_patch, SchemaOverride};
use schemaforge_history::{FileSystemFetcher, FileVersionStore, SourceFetcher, VersionManager};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG: &str = "schemaforge.toml";

/// SchemaForge - convert, diff, merge and version database schemas
#[derive(Parser)]
#[command(name = "schemaforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: $SCHEMAFORGE_CONFIG or schemaforge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a schema source into the unified schema JSON
    Parse {
        /// Source file (SQL, Prisma, tbls JSON, Drizzle module or schema.rb)
        file: PathBuf,

        /// Input format (default: from extension, then config)
        #[arg(short, long)]
        format: Option<SourceFormat>,

        /// Write the schema JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write a JSON report of the diagnostics
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Print PostgreSQL DDL for a schema JSON file
    Deparse {
        file: PathBuf,

        /// Treat FILE as a JSON Patch and print migration DDL for it
        #[arg(long)]
        patch: bool,
    },

    /// Print the changes between two schema JSON files
    Diff {
        before: PathBuf,
        after: PathBuf,
    },

    /// Apply override documents to a schema JSON file
    Merge {
        schema: PathBuf,

        /// Override documents applied after the configured ones, in order
        overrides: Vec<PathBuf>,

        /// Write the merged schema here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Local version history
    History {
        /// Document name (default: [history] document)
        #[arg(short, long, global = true)]
        document: Option<String>,

        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Start a history from a schema JSON file (or an empty schema)
    Init {
        schema: Option<PathBuf>,
    },

    /// Commit a JSON Patch file, or the difference to a schema JSON file
    Commit {
        file: PathBuf,

        /// Treat FILE as a full schema and commit its difference
        #[arg(long)]
        schema: bool,

        /// Version the change was prepared against (default: latest)
        #[arg(long)]
        assumed: Option<u64>,
    },

    /// Print the content of a version
    Show {
        /// Version number (default: latest)
        #[arg(long)]
        at: Option<u64>,

        /// Replay the whole history and check it against recorded fingerprints
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Parse { file, format, output, report } => {
            parse_command(&config, &file, format, output.as_deref(), report.as_deref(), cli.verbose).await
        }
        Commands::Deparse { file, patch } => deparse_command(&file, patch),
        Commands::Diff { before, after } => diff_command(&before, &after),
        Commands::Merge { schema, overrides, output } => {
            merge_command(&config, &schema, &overrides, output.as_deref(), cli.verbose)
        }
        Commands::History { document, command } => {
            let document = document.unwrap_or_else(|| config.history.document.clone());
            history_command(&config, &document, command, cli.verbose).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Explicit path, then $SCHEMAFORGE_CONFIG, then ./schemaforge.toml, then defaults
fn load_config(explicit: Option<&Path>, verbose: bool) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("SCHEMAFORGE_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG);
            default.exists().then_some(default)
        });

    let config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?
        }
        None => {
            if verbose {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Config::default()
        }
    };

    if verbose {
        eprintln!("{} default format: {}", "Using".cyan(), config.format);
    }
    Ok(config)
}

/// Parse command - convert a source file into the unified schema
async fn parse_command(
    config: &Config,
    file: &Path,
    format: Option<SourceFormat>,
    output: Option<&Path>,
    report_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let format = format
        .or_else(|| SourceFormat::from_path(file))
        .unwrap_or(config.format);

    if verbose {
        eprintln!("{} {} as {}", "Parsing".cyan(), file.display(), format);
    }

    let fetcher = FileSystemFetcher::new(".");
    let path = file.to_string_lossy();
    let source = fetcher
        .fetch(&path, None)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let result = schemaforge_parser::parse_with(format, &source, &config.parser);
    let diagnostics = result.diagnostics(&path, Some(&source));
    let report = Report::for_schema(&result.value, diagnostics)
        .with_metadata(serde_json::json!({ "file": path, "format": format.as_str() }));

    let json = serde_json::to_string_pretty(&result.value)?;
    match output {
        Some(output) => {
            std::fs::write(output, json)?;
            if verbose {
                eprintln!("{} {}", "Schema saved to:".green(), output.display());
            }
        }
        None => println!("{}", json),
    }

    if let Some(report_path) = report_path {
        std::fs::write(report_path, report.to_json()?)?;
        if verbose {
            eprintln!("{} {}", "Report saved to:".green(), report_path.display());
        }
    }

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

/// Deparse command - print PostgreSQL DDL for a schema or a patch
fn deparse_command(path: &Path, patch: bool) -> Result<()> {
    let deparsed = if patch {
        let operations = parse_patch(&std::fs::read_to_string(path)?)?;
        schemaforge_parser::deparse_operations(&operations)
    } else {
        schemaforge_parser::deparse(&read_schema(path)?)
    };

    for error in &deparsed.errors {
        eprintln!("{} {}", "error:".red().bold(), error);
    }
    println!("{}", deparsed.to_sql());

    if !deparsed.errors.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

/// Diff command - print entity-scoped changes as JSON
fn diff_command(before: &Path, after: &Path) -> Result<()> {
    let before = read_schema(before)?;
    let after = read_schema(after)?;
    let items = build_schema_diff(&before, &after);
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

/// Merge command - apply configured then listed override documents
fn merge_command(
    config: &Config,
    schema_path: &Path,
    overrides: &[PathBuf],
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let schema = read_schema(schema_path)?;

    let mut documents = Vec::new();
    for path in config.override_files().iter().chain(overrides) {
        if verbose {
            eprintln!("{} {}", "Loading overrides from:".cyan(), path.display());
        }
        documents.push(SchemaOverride::from_file(path)?);
    }

    let outcome = apply_overrides(&schema, &documents)?;
    tracing::debug!(documents = documents.len(), warnings = outcome.warnings.len(), "merged overrides");
    for warning in &outcome.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning.message.yellow());
    }

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "schema": outcome.schema,
        "tableGroups": outcome.table_groups,
        "requests": outcome.requests,
    }))?;
    match output {
        Some(output) => std::fs::write(output, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

/// History command - file-backed version history
async fn history_command(config: &Config, document: &str, command: HistoryCommands, verbose: bool) -> Result<()> {
    let store_dir = config.resolve(&config.history.store);
    if verbose {
        eprintln!("{} {}", "Using history store:".cyan(), store_dir.display());
    }
    let manager = VersionManager::new(Arc::new(FileVersionStore::new(store_dir)));

    match command {
        HistoryCommands::Init { schema } => {
            let base = match schema {
                Some(path) => read_schema(&path)?,
                None => Schema::new(),
            };
            manager.init(document, &base).await?;
            println!("{} {} at version 0", "Initialized".green(), document);
        }
        HistoryCommands::Commit { file, schema, assumed } => {
            let assumed = match assumed {
                Some(version) => version,
                None => manager.latest_version(document).await?,
            };
            let patch = if schema {
                let current = manager.content_at(document, assumed).await?;
                compare(&current, &read_schema(&file)?.to_value())
            } else {
                parse_patch(&std::fs::read_to_string(&file)?)?
            };

            if patch.is_empty() {
                println!("{}", "Nothing to commit".yellow());
                return Ok(());
            }

            let outcome = manager.commit(document, &patch, assumed).await?;
            for warning in &outcome.warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning.message.yellow());
            }
            println!(
                "{} {} version {} ({} operations)",
                "Committed".green(),
                document,
                outcome.version,
                patch.len()
            );
        }
        HistoryCommands::Show { at, verify } => {
            if verify {
                let diagnostics = manager.verify(document).await?;
                if diagnostics.is_empty() {
                    eprintln!("{}", "✓ History verified".green());
                } else {
                    diagnostics.iter().for_each(print_diagnostic);
                    std::process::exit(1);
                }
            }

            let content = match at {
                Some(version) => manager.content_at(document, version).await?,
                None => manager.latest_content(document).await?.1,
            };
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
    }
    Ok(())
}

fn read_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("{} is not a valid schema: {}", path.display(), e))
}

/// Print report summary to stderr
fn print_report_summary(report: &Report) {
    eprintln!("\n{}", "=".repeat(60).bright_blue());
    eprintln!("{}", "Schema Parse Report".bold().bright_blue());
    eprintln!("{}", "=".repeat(60).bright_blue());
    eprintln!();

    eprintln!("Version: {}", report.version);
    eprintln!("Tables: {}", report.summary.tables);
    eprintln!("Relationships: {}", report.summary.relationships);
    eprintln!();

    if report.summary.errors > 0 {
        eprintln!("  Errors:   {}", report.summary.errors.to_string().red().bold());
    } else {
        eprintln!("  Errors:   {}", report.summary.errors.to_string().green());
    }

    if report.summary.warnings > 0 {
        eprintln!("  Warnings: {}", report.summary.warnings.to_string().yellow());
    } else {
        eprintln!("  Warnings: {}", report.summary.warnings.to_string().green());
    }
    eprintln!();

    if report.diagnostics.is_empty() {
        eprintln!("{}", "✓ No issues found!".green().bold());
    } else {
        eprintln!("{}", "Diagnostics:".bold());
        report.diagnostics.iter().for_each(print_diagnostic);
    }

    eprintln!();
    eprintln!("{}", "=".repeat(60).bright_blue());
}

fn print_diagnostic(diag: &Diagnostic) {
    let severity_str = match diag.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    };

    eprintln!("  [{}] {}: {}", severity_str, diag.code, diag.message);

    if let Some(loc) = &diag.location {
        match (loc.line, loc.column) {
            (Some(line), Some(column)) => eprintln!("    at {}:{}:{}", loc.file, line, column),
            _ => eprintln!("    at {}", loc.file),
        }
    }

    if let (Some(expected), Some(actual)) = (&diag.expected, &diag.actual) {
        eprintln!("    expected: {}", expected.green());
        eprintln!("    actual:   {}", actual.red());
    }
}
