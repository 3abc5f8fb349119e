//! CLI binary for zip2pdf.
//!
//! A thin shim over the library crate that maps CLI flags onto
//! `ServiceConfig` and either runs the HTTP service or converts one archive.

mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zip2pdf::config::{LOG_FILE, PDF_DIR, UNZIP_DIR, UPLOADS_DIR};
use zip2pdf::metrics::{CountingAllocator, COUNTING_ALLOCATOR};
use zip2pdf::{convert_archive, serve, OutputNaming, ServiceConfig, WkHtmlToPdf};

#[global_allocator]
static GLOBAL: &CountingAllocator = &COUNTING_ALLOCATOR;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  zip2pdf                                   serve on 0.0.0.0:3333
  zip2pdf serve --listen 127.0.0.1:8080 --max-concurrent-jobs 2
  zip2pdf convert site.zip                  render one archive and exit

  curl -F file=@site.zip http://localhost:3333/upload
  curl http://localhost:3333/jobs/<id from the x-job-id header>

LAYOUT (relative to the working directory):
  ./uploads/<job-id>.zip      original uploads
  ./unziped/<job-id>/         extracted archives
  ./pdfs/                     rendered PDFs
  ./logs                      append-only log file

ENGINE:
  wkhtmltopdf must be installed. It is looked up on PATH and in the usual
  install directories unless --engine is given.
"#;

/// Render zipped HTML sites to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "zip2pdf",
    version,
    about = "Upload a zipped HTML site and render its index.html to PDF",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP upload service (default).
    Serve(ServeArgs),
    /// Convert one local archive and exit.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory for stored uploads.
    #[arg(long, global = true, default_value = UPLOADS_DIR)]
    uploads_dir: PathBuf,

    /// Directory for extracted archives.
    #[arg(long, global = true, default_value = UNZIP_DIR)]
    extract_dir: PathBuf,

    /// Directory for rendered PDFs.
    #[arg(long, global = true, default_value = PDF_DIR)]
    pdf_dir: PathBuf,

    /// Append-only log file.
    #[arg(long, global = true, default_value = LOG_FILE)]
    log_file: PathBuf,

    /// Path to the wkhtmltopdf executable.
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Kill the engine after this many seconds.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    render_timeout: Option<u64>,

    /// PDF naming: `timestamp-job` (unique) or `timestamp` (legacy, may collide).
    #[arg(long, global = true, value_enum, default_value = "timestamp-job")]
    naming: NamingArg,

    /// Enable DEBUG-level logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors to the console.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to listen on [default: 0.0.0.0:3333].
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Upload size ceiling in MiB.
    #[arg(long)]
    max_upload_mb: Option<u64>,

    /// Jobs allowed to extract or render at once.
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,

    /// Job records kept for GET /jobs/{id}.
    #[arg(long)]
    max_tracked_jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Zip archive containing index.html.
    archive: PathBuf,

    /// Print the RenderedDocument as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NamingArg {
    Timestamp,
    TimestampJob,
}

impl From<NamingArg> for OutputNaming {
    fn from(v: NamingArg) -> Self {
        match v {
            NamingArg::Timestamp => OutputNaming::Timestamp,
            NamingArg::TimestampJob => OutputNaming::TimestampJob,
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default()));
    let common = cli.common;

    let config = build_config(&common, &command)?;

    // The spinner is the console feedback for `convert`; keep INFO lines off it.
    let show_progress = matches!(&command, Command::Convert(a) if !a.no_progress && !a.json)
        && !common.quiet;
    let console = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let file = if common.verbose { "debug" } else { "info" };
    let _guard = logging::init(&config.log_file, console, file)?;

    let engine = WkHtmlToPdf::from_config(&config).context("No render engine")?;
    match engine.version() {
        Ok(v) => info!("Using {} ({})", engine.binary().display(), v),
        Err(e) => warn!("{}", e),
    }

    match command {
        Command::Serve(_) => serve(config, Arc::new(engine))
            .await
            .context("Service stopped with an error"),
        Command::Convert(args) => run_convert(args, config, engine, show_progress).await,
    }
}

/// Map CLI args to `ServiceConfig`.
fn build_config(common: &CommonArgs, command: &Command) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .uploads_dir(&common.uploads_dir)
        .extract_dir(&common.extract_dir)
        .pdf_dir(&common.pdf_dir)
        .log_file(&common.log_file)
        .output_naming(common.naming.into());

    if let Some(ref path) = common.engine {
        builder = builder.engine_path(path);
    }
    if let Some(secs) = common.render_timeout {
        builder = builder.render_timeout_secs(secs);
    }

    if let Command::Serve(args) = command {
        if let Some(ref addr) = args.listen {
            builder = builder.listen_addr(addr);
        }
        if let Some(mb) = args.max_upload_mb {
            builder = builder.max_upload_bytes(mb.saturating_mul(1024 * 1024));
        }
        if let Some(n) = args.max_concurrent_jobs {
            builder = builder.max_concurrent_jobs(n);
        }
        if let Some(n) = args.max_tracked_jobs {
            builder = builder.max_tracked_jobs(n);
        }
    }

    builder.build().context("Invalid configuration")
}

async fn run_convert(
    args: ConvertArgs,
    config: ServiceConfig,
    engine: WkHtmlToPdf,
    show_progress: bool,
) -> Result<()> {
    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("Rendering {}", args.archive.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = convert_archive(&args.archive, &config, Arc::new(engine)).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match result {
        Ok(doc) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!(
                    "{} {}  {}",
                    green("✓"),
                    doc.path.display(),
                    dim(&format!("{} bytes, {}ms", doc.size_bytes, doc.metrics.elapsed_ms))
                );
            }
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to convert {}", args.archive.display())),
    }
}
