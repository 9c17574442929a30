//! CLI binary for edgequake-doc2md.
//!
//! Maps flags onto `ConversionConfig`, runs the batch, and either prints the
//! Markdown or writes it (with `assets/`) to an output directory.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::{
    convert_batch, convert_to_dir, BatchOutput, ConversionConfig, ConversionProgressCallback,
    ConverterRegistry, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// file. Files may complete out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, input: &str) {
        self.start_times.lock().insert(index, Instant::now());
        self.bar.set_message(input.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, input: &str, markdown_len: usize) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            input,
            dim(&format!("{markdown_len} chars")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, input: &str, error: &str) {
        let elapsed = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep the log line on one row; the full error is in the summary.
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            input,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single document to stdout
  doc2md report.docx

  # Several documents plus extracted images into a directory
  doc2md report.docx data.csv notes.txt -o out/

  # WordPress export with metadata blocks, four files at a time
  doc2md --metadata -c 4 site-export.xml -o site/

  # Convert from URL
  doc2md https://example.com/exports/blog.xml -o blog/

  # Keep remote image URLs instead of downloading them
  doc2md --no-images blog.xml

  # Machine-readable batch result
  doc2md --json data.csv > result.json

SUPPORTED FORMATS:
  Format              Extensions   Notes
  ──────────────────  ───────────  ─────────────────────────────────────
  Styled document     docx         headings, bold/italic/underline, tables, images
  Tabular             csv          Markdown table + summary statistics
  Plain text          txt, text    heading / list / code / link heuristics
  WordPress export    wxr, xml     one section per post, images localised

OUTPUT LAYOUT (-o DIR):
  DIR/<name>.md          one file per converted input
  DIR/assets/<image>     every extracted image, deduplicated by content

ENVIRONMENT VARIABLES:
  RUST_LOG               Override log filter (e.g. edgequake_doc2md=debug)
  DOC2MD_*               Every flag can also be set from the environment
                         (e.g. DOC2MD_CONCURRENCY=4, DOC2MD_METADATA=true)
"#;

/// Convert DOCX, CSV, plain-text and WordPress export files to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert DOCX, CSV, plain-text and WordPress export files to Markdown",
    long_about = "Convert word-processor documents, CSV files, plain text and WordPress \
(WXR) exports to clean Markdown. Embedded and remote images are optimised, deduplicated \
and written to an assets/ directory next to the Markdown files.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "list_formats")]
    inputs: Vec<String>,

    /// Write `<name>.md` files and `assets/` into this directory instead of stdout.
    #[arg(short, long, env = "DOC2MD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Prepend a `---` metadata block to every document.
    #[arg(long, env = "DOC2MD_METADATA")]
    metadata: bool,

    /// Do not extract or download images.
    #[arg(long, env = "DOC2MD_NO_IMAGES")]
    no_images: bool,

    /// Scale images wider than this down (pixels).
    #[arg(long, env = "DOC2MD_MAX_IMAGE_WIDTH", default_value_t = 1200,
          value_parser = clap::value_parser!(u32).range(16..))]
    max_image_width: u32,

    /// JPEG quality for re-encoded images (1–100).
    #[arg(long, env = "DOC2MD_IMAGE_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    image_quality: u8,

    /// Per-request timeout for remote image downloads in seconds.
    #[arg(long, env = "DOC2MD_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Number of files converted at once.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Output the structured batch result as JSON instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout for URL inputs in seconds.
    #[arg(long, env = "DOC2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// List supported formats and exit.
    #[arg(long)]
    list_formats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would tear the progress bar.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_formats;
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

    // ── List formats ─────────────────────────────────────────────────────
    if cli.list_formats {
        let registry = ConverterRegistry::default();
        for (name, extensions) in registry.list_formats() {
            println!("{:<8} {}", name, extensions.join(", "));
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let batch = if let Some(ref out_dir) = cli.output_dir {
        convert_to_dir(cli.inputs.as_slice(), out_dir, &config)
            .await
            .context("Conversion failed")?
    } else {
        convert_batch(cli.inputs.as_slice(), &config).await
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&batch).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output_dir.is_none() {
        write_markdown_to_stdout(&batch)?;
    }

    if !cli.quiet && !cli.json {
        print_summary(&cli, &batch, show_progress);
    }

    if batch.stats.failed > 0 {
        anyhow::bail!(
            "{} of {} files failed",
            batch.stats.failed,
            batch.stats.total_files
        );
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .include_metadata(cli.metadata)
        .extract_images(!cli.no_images)
        .max_image_width(cli.max_image_width)
        .image_quality(cli.image_quality)
        .fetch_timeout_secs(cli.fetch_timeout)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Print every converted document to stdout, separated by a blank line.
fn write_markdown_to_stdout(batch: &BatchOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for (i, output) in batch.outputs().enumerate() {
        if i > 0 {
            handle.write_all(b"\n").context("Failed to write to stdout")?;
        }
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}

fn print_summary(cli: &Cli, batch: &BatchOutput, show_progress: bool) {
    let stats = &batch.stats;

    // The progress callback already printed the per-file log and tick.
    if !show_progress {
        eprintln!(
            "Converted {}/{} files in {}ms",
            stats.converted, stats.total_files, stats.duration_ms
        );
    }
    for error in batch.errors() {
        eprintln!("  {} {}", red("✗"), error);
    }

    match cli.output_dir {
        Some(ref dir) => {
            for path in &batch.written {
                eprintln!("   →  {}", bold(&path.display().to_string()));
            }
            if stats.images > 0 {
                eprintln!(
                    "   {} images  →  {}",
                    dim(&stats.images.to_string()),
                    bold(&dir.join("assets").display().to_string())
                );
            }
        }
        None if stats.images > 0 => {
            eprintln!(
                "   {} images referenced under assets/ were not written; use -o DIR to save them",
                cyan(&stats.images.to_string())
            );
        }
        None => {}
    }
}
