//! CLI binary for nutrilabel.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use nutrilabel::{
    extract_file, extract_files, extract_to_file, Basis, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, FileResult, NutrientKey, NutrientSource, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback for batch runs. Files finish out of order, so
/// every event logs its own line above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
    }

    fn on_file_start(&self, path: &str) {
        self.bar.set_message(path.to_string());
    }

    fn on_file_complete(&self, path: &str, nutrient_count: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}",
            green("✓"),
            path,
            dim(&format!("{nutrient_count} nutrients")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<40} {}", red("✗"), path, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} files extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} failed)",
                if failed == total_files { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print the nutrient table of one OCR payload
  nutrilabel label.json

  # Full JSON output, including diagnostics
  nutrilabel --json --debug label.json

  # Write JSON to a file
  nutrilabel label.json -o label.out.json

  # Batch of payloads, 4 at a time
  nutrilabel --concurrency 4 scans/*.json --json > results.json

INPUT FORMATS:
  Flat:        { "fullText": "...", "items": [{ "text": "...", "boundingBox": [{"x":..,"y":..}] }] }
  Structured:  { "text": "...", "pages": [{ "blocks": [{ "paragraphs": [{ "words": [...] }] }] }] }
               optionally wrapped in { "fullTextAnnotation": ... }

ENVIRONMENT VARIABLES:
  Every flag can be set with NUTRILABEL_<FLAG>, e.g. NUTRILABEL_CONCURRENCY=4.
  RUST_LOG overrides the log filter.
"#;

/// Extract nutrition-label values from OCR payloads.
#[derive(Parser, Debug)]
#[command(
    name = "nutrilabel",
    version,
    about = "Extract nutrition-label values from OCR payloads",
    long_about = "Reconstruct a nutrition table (energy, macronutrients, sodium) from raw OCR \
words and their bounding boxes. Each value carries a confidence tier; dual-column labels are \
cross-validated between the per-serving and per-100g columns.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// OCR payload JSON files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write JSON output to this file instead of stdout.
    #[arg(short, long, env = "NUTRILABEL_OUTPUT")]
    output: Option<PathBuf>,

    /// Print JSON instead of a table.
    #[arg(long, env = "NUTRILABEL_JSON")]
    json: bool,

    /// Include diagnostics (tokens, dropped lines, column clusters).
    #[arg(long, env = "NUTRILABEL_DEBUG")]
    debug: bool,

    /// Number of files extracted concurrently.
    #[arg(short, long, env = "NUTRILABEL_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Serving sizes below this are treated as "not detected".
    #[arg(long, env = "NUTRILABEL_MIN_SERVING_SIZE", default_value_t = 5.0)]
    min_serving_size: f64,

    /// Column deviation above which a nutrient is rejected.
    #[arg(long, env = "NUTRILABEL_REJECT_DEVIATION", default_value_t = 0.8)]
    reject_deviation: f64,

    /// Column deviation below which a nutrient is upgraded to medium confidence.
    #[arg(long, env = "NUTRILABEL_ACCEPT_DEVIATION", default_value_t = 0.3)]
    accept_deviation: f64,

    /// Disable progress bar.
    #[arg(long, env = "NUTRILABEL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NUTRILABEL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NUTRILABEL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let batch = cli.inputs.len() > 1;
    let show_progress = batch && !cli.quiet && !cli.no_progress;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Single payload ───────────────────────────────────────────────────
    if !batch {
        let input = &cli.inputs[0];
        if let Some(ref output_path) = cli.output {
            let output = extract_to_file(input, output_path, &config)
                .await
                .with_context(|| format!("Extraction failed for {}", input.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} nutrients  →  {}",
                    green("✔"),
                    output.label.nutrients.len(),
                    bold(&output_path.display().to_string()),
                );
            }
        } else {
            let output = extract_file(input, &config)
                .await
                .with_context(|| format!("Extraction failed for {}", input.display()))?;
            if cli.json {
                let json =
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
                println!("{json}");
            } else {
                print_table(&input.display().to_string(), &output, &config);
            }
        }
        return Ok(());
    }

    // ── Batch ────────────────────────────────────────────────────────────
    let (results, stats) = extract_files(cli.inputs.as_slice(), &config).await;

    if let Some(ref output_path) = cli.output {
        let json = serde_json::to_string_pretty(&results).context("Failed to serialise output")?;
        tokio::fs::write(output_path, json)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    } else if cli.json {
        let json = serde_json::to_string_pretty(&results).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        for result in &results {
            print_result(result, &config);
        }
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Extracted {}/{} files in {}ms ({} empty)",
            stats.extracted_files, stats.total_files, stats.total_duration_ms, stats.empty_files
        );
    }
    if stats.extracted_files == 0 {
        anyhow::bail!("All {} files failed", stats.total_files);
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency)
        .min_serving_size(cli.min_serving_size)
        .reject_deviation(cli.reject_deviation)
        .accept_deviation(cli.accept_deviation)
        .include_debug(cli.debug);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_result(result: &FileResult, config: &ExtractionConfig) {
    match (&result.output, &result.error) {
        (Some(output), _) => print_table(&result.path, output, config),
        (None, Some(e)) => println!("{} {}\n", red("✗"), e),
        (None, None) => {}
    }
}

/// Human-readable nutrient table.
fn print_table(name: &str, output: &ExtractionOutput, config: &ExtractionConfig) {
    let basis = match output.label.basis {
        Basis::PerServe => "per serve",
        Basis::Per100g => "per 100 g",
    };
    let serving = if output.label.serving_detected(config.min_serving_size) {
        format!(
            "serving {} {}",
            output.label.serving_size.value, output.label.serving_size.unit
        )
    } else {
        "serving size not detected".to_string()
    };
    println!("{}  {}", bold(name), dim(&format!("({basis}, {serving})")));
    if let Some(n) = output.serving.servings_per_pack {
        println!("  {}", dim(&format!("{n} servings per pack")));
    }

    if output.is_empty() {
        println!("  {}\n", dim("no nutrients found"));
        return;
    }
    for key in NutrientKey::ALL {
        let Some(record) = output.nutrient(key) else { continue };
        println!(
            "  {:<12} {:>9} {:<5} {:<5} {}",
            key.as_str(),
            format!("{}", record.value),
            record.unit,
            format!("{:?}", record.confidence).to_lowercase(),
            dim(source_name(record.source)),
        );
    }
    println!();
}

fn source_name(source: NutrientSource) -> &'static str {
    match source {
        NutrientSource::Columns => "columns",
        NutrientSource::Rows => "rows",
        NutrientSource::LineRules => "line rules",
    }
}
