//! CLI binary for edgequake-docvault.
//!
//! A thin shim over the library crate that maps flags to `VaultConfig`,
//! runs one operation and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_docvault::{
    DerivationOutcome, DocVault, DocumentId, IngestProgressCallback, IngestReport, IngestStage,
    MetadataInput, PdfiumCapability, ServedFile, Upload, VaultConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows a document through its ingestion stages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.set_message("reading upload…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_stage(&self, label: &str, stage: IngestStage) {
        if stage.is_terminal() {
            self.bar.finish_and_clear();
            return;
        }
        if stage == IngestStage::DerivationFailed {
            self.bar
                .println(format!("  {} preview pages could not be derived", yellow("⚠")));
        }
        self.bar.set_message(format!("{stage}  {}", dim(label)));
    }

    fn on_pages_published(&self, _label: &str, page_count: usize) {
        self.bar
            .println(format!("  {} {page_count} preview pages", green("✓")));
    }

    fn on_cleanup_issue(&self, _label: &str, issue: &edgequake_docvault::CleanupIssue) {
        self.bar.println(format!("  {} {issue}", yellow("⚠")));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a PDF; pages are derived automatically
  docvault create report.pdf --title "Q3 report" --author Finance --category report

  # List documents, newest first
  docvault list

  # Replace the file and publish
  docvault update <ID> --title "Q3 report" --author Finance --category report \
      --status published --file report-v2.pdf

  # Preview pages
  docvault pages <ID>
  docvault preview <ID> page-0001.pdf -o page1.pdf

  # Download the original
  docvault download <ID> -o report.pdf

ENVIRONMENT VARIABLES:
  DOCVAULT_UPLOADS           Uploads root directory
  DOCVAULT_DATABASE          SQLite URL of the record store
  DOCVAULT_PDFIUM_LIB        Path to libpdfium (file or directory)
  DOCVAULT_MAX_UPLOAD_BYTES  Upload size ceiling
  RUST_LOG                   Log filter (overrides --verbose/--quiet)
"#;

/// Store documents and preview their pages.
#[derive(Parser, Debug)]
#[command(
    name = "docvault",
    version,
    about = "Store documents and preview their PDF pages",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Uploads root directory.
    #[arg(long, global = true, env = "DOCVAULT_UPLOADS", default_value = "uploads")]
    uploads: PathBuf,

    /// SQLite URL of the record store.
    #[arg(
        long,
        global = true,
        env = "DOCVAULT_DATABASE",
        default_value = "sqlite://docvault.db"
    )]
    database: String,

    /// Path to libpdfium, or a directory containing it.
    #[arg(long, global = true, env = "DOCVAULT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Largest accepted upload in bytes.
    #[arg(
        long,
        global = true,
        env = "DOCVAULT_MAX_UPLOAD_BYTES",
        default_value_t = edgequake_docvault::config::DEFAULT_MAX_UPLOAD_BYTES
    )]
    max_upload_bytes: u64,

    /// Print results as JSON.
    #[arg(long, global = true, env = "DOCVAULT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCVAULT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "DOCVAULT_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct MetadataArgs {
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    author: Option<String>,

    /// Category / kind tag, e.g. paper, thesis, report.
    #[arg(long)]
    category: Option<String>,

    /// draft or published (default: draft).
    #[arg(long)]
    status: Option<String>,
}

impl From<MetadataArgs> for MetadataInput {
    fn from(a: MetadataArgs) -> Self {
        MetadataInput {
            title: a.title,
            author: a.author,
            category: a.category,
            status: a.status,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a new document.
    Create {
        /// File to upload.
        file: PathBuf,
        #[command(flatten)]
        metadata: MetadataArgs,
    },
    /// Update a document's metadata, optionally replacing its file.
    Update {
        id: String,
        #[command(flatten)]
        metadata: MetadataArgs,
        /// New file; the previous one and its pages are removed.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a document with its file and pages.
    Delete { id: String },
    /// List documents, newest first.
    List,
    /// Show one document.
    Show { id: String },
    /// List a document's preview pages.
    Pages { id: String },
    /// Write the original file to a path or stdout.
    Download {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write one preview page to a path or stdout.
    Preview {
        id: String,
        page: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Open the vault ───────────────────────────────────────────────────
    let is_ingest = matches!(cli.command, Command::Create { .. } | Command::Update { .. });
    let mut builder = VaultConfig::builder()
        .uploads_root(&cli.uploads)
        .database_url(&cli.database)
        .max_upload_bytes(cli.max_upload_bytes);
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if show_progress && is_ingest {
        builder = builder.progress_callback(CliProgressCallback::new());
    }
    let config = builder.build().context("Invalid configuration")?;

    // Only ingestion needs a working pdfium; reads should not fail without it.
    let vault = if is_ingest {
        DocVault::open(config).await
    } else {
        let pdfium = PdfiumCapability::new(config.pdfium_lib_path.clone());
        DocVault::with_capability(config, Arc::new(pdfium)).await
    }
    .context("Failed to open document vault")?;

    // ── Run the command ──────────────────────────────────────────────────
    match cli.command {
        Command::Create { file, metadata } => {
            let upload = read_upload(&file).await?;
            let report = vault
                .create(metadata.into(), Some(upload))
                .await
                .context("Create failed")?;
            print_report(&report, cli.json, cli.quiet)?;
        }
        Command::Update { id, metadata, file } => {
            let id = parse_id(&id)?;
            let upload = match file {
                Some(ref path) => Some(read_upload(path).await?),
                None => None,
            };
            let report = vault
                .update(id, metadata.into(), upload)
                .await
                .context("Update failed")?;
            print_report(&report, cli.json, cli.quiet)?;
        }
        Command::Delete { id } => {
            let report = vault
                .delete(parse_id(&id)?)
                .await
                .context("Delete failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} deleted {}", green("✔"), report.id);
                for issue in &report.cleanup {
                    eprintln!("  {} {issue}", yellow("⚠"));
                }
            }
        }
        Command::List => {
            let docs = vault.list().await.context("List failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else {
                for d in docs {
                    println!(
                        "{}  {:<9}  {}  {}",
                        d.id,
                        d.status,
                        bold(&d.title),
                        dim(&format!("{} · {} · {}", d.author, d.kind, d.created_at.format("%Y-%m-%d %H:%M")))
                    );
                }
            }
        }
        Command::Show { id } => {
            let doc = vault.get(parse_id(&id)?).await.context("Lookup failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("Id:        {}", doc.id);
                println!("Title:     {}", doc.title);
                println!("Author:    {}", doc.author);
                println!("Category:  {}", doc.kind);
                println!("Status:    {}", doc.status);
                println!("File:      {}", doc.file_path);
                println!("Created:   {}", doc.created_at.to_rfc3339());
            }
        }
        Command::Pages { id } => {
            let pages = vault
                .list_pages(parse_id(&id)?)
                .await
                .context("Page listing failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&pages)?);
            } else {
                for p in pages {
                    println!("{p}");
                }
            }
        }
        Command::Download { id, output } => {
            let served = vault
                .download(parse_id(&id)?)
                .await
                .context("Download failed")?;
            write_served(served, output.as_deref(), cli.quiet).await?;
        }
        Command::Preview { id, page, output } => {
            let served = vault
                .preview(parse_id(&id)?, &page)
                .await
                .context("Preview failed")?;
            write_served(served, output.as_deref(), cli.quiet).await?;
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<DocumentId> {
    DocumentId::parse(raw).with_context(|| format!("No document with id '{raw}'"))
}

async fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Upload::new(filename, bytes))
}

fn print_report(report: &IngestReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    println!("{}", report.document.id);
    if quiet {
        return Ok(());
    }
    let pages = match &report.derivation {
        DerivationOutcome::Derived { pages } => format!("{pages} preview pages"),
        DerivationOutcome::Skipped => "no preview pages (not a PDF)".to_string(),
        DerivationOutcome::Failed(f) => yellow(&format!("no preview pages: {}", f.reason)),
        DerivationOutcome::Untouched => "file unchanged".to_string(),
    };
    eprintln!(
        "{} {}  {}  {}",
        green("✔"),
        bold(&report.document.title),
        report.document.status,
        dim(&pages)
    );
    for issue in &report.cleanup {
        eprintln!("  {} {issue}", yellow("⚠"));
    }
    Ok(())
}

/// Copy a served file to `output`, or stdout when absent.
async fn write_served(served: ServedFile, output: Option<&Path>, quiet: bool) -> Result<()> {
    if !quiet {
        for (name, value) in &served.headers {
            eprintln!("{}", dim(&format!("{name}: {value}")));
        }
    }
    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let n = served.copy_to(&mut file).await.context("Copy failed")?;
            if !quiet {
                eprintln!("{} {n} bytes → {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let mut stdout = tokio::io::stdout();
            served.copy_to(&mut stdout).await.context("Copy failed")?;
        }
    }
    Ok(())
}
