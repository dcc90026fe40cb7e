//! CLI binary for sensor-datasheet.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one extraction per input and prints the records.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use sensor_datasheet::{
    extract_file, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, JsonFileStore,
    MemoryStore, MergePolicy, ProgressCallback, Quality, RecordStore,
};
use std::io;
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback shared by every concurrent run.
///
/// The bar length grows as each run reports its eligible page count, so one
/// bar covers all inputs.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, eligible_pages: usize) {
        self.bar.inc_length(eligible_pages as u64);
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_recovered(&self, page_num: usize, total: usize, fields: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{fields:>3} fields")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_fallback(&self) {
        self.bar.println(format!(
            "  {} no page yielded data, trying identity-only fallback",
            cyan("⚠")
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one datasheet, print the record
  datasheet2json TEMT6000_datasheet.pdf

  # Several datasheets, three at a time, persisted to a JSON store
  datasheet2json -j 3 --store sensors.json sheets/*.pdf

  # Keep the earliest value on conflicts instead of the most detailed one
  datasheet2json --policy first-non-null-wins bmp280.pdf

  # Use a specific provider and model
  datasheet2json --provider openai --model gpt-4.1-mini lm35.pdf

  # From a URL, full output (quality, per-page outcomes, stats)
  datasheet2json --json https://example.com/TEMT6000.pdf

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      OpenRouter API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openrouter, openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract structured sensor specifications from PDF datasheets using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "datasheet2json",
    version,
    about = "Extract structured sensor specifications from PDF datasheets using LLMs",
    long_about = "Read PDF sensor datasheets (local files or URLs), ask a language model about each \
page, and merge the answers into one JSON record per datasheet. Records can be persisted to a \
JSON store keyed on (model, filename); re-running a datasheet updates its record in place.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<String>,

    /// LLM model ID (default: meta-llama/llama-3.1-8b-instruct).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openrouter, openai, anthropic, gemini, ollama, ...
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// Conflict resolution between pages.
    #[arg(long, env = "DATASHEET2JSON_POLICY", value_enum, default_value = "score-based")]
    policy: PolicyArg,

    /// Persist records to this JSON file instead of keeping them in memory.
    #[arg(long, env = "DATASHEET2JSON_STORE")]
    store: Option<PathBuf>,

    /// Also persist one raw-text audit document per page.
    #[arg(long, env = "DATASHEET2JSON_AUDIT_PAGES")]
    audit_pages: bool,

    /// Only the first N eligible pages are sent to the model.
    #[arg(long, env = "DATASHEET2JSON_MAX_PAGES", default_value_t = 5)]
    max_pages: usize,

    /// Pages with less trimmed text than this are skipped.
    #[arg(long, env = "DATASHEET2JSON_MIN_PAGE_CHARS", default_value_t = 50)]
    min_page_chars: usize,

    /// Page text is truncated to this many characters.
    #[arg(long, env = "DATASHEET2JSON_MAX_PAGE_CHARS", default_value_t = 8000)]
    max_page_chars: usize,

    /// Unit substrings that earn the score-based bonus (comma-separated).
    #[arg(long, env = "DATASHEET2JSON_UNITS", value_delimiter = ',')]
    units: Option<Vec<String>>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DATASHEET2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "DATASHEET2JSON_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DATASHEET2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Number of datasheets processed concurrently.
    #[arg(short, long, env = "DATASHEET2JSON_JOBS", default_value_t = 4)]
    jobs: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DATASHEET2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full ExtractionOutput instead of the record only.
    #[arg(long, env = "DATASHEET2JSON_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DATASHEET2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DATASHEET2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DATASHEET2JSON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    FirstNonNullWins,
    ScoreBased,
}

impl From<PolicyArg> for MergePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::FirstNonNullWins => MergePolicy::FirstNonNullWins,
            PolicyArg::ScoreBased => MergePolicy::ScoreBased,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
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
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )
    .await?;

    let store: Arc<dyn RecordStore> = match cli.store {
        Some(ref path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    // ── Run extractions ──────────────────────────────────────────────────
    let jobs = cli.jobs.max(1);
    let mut results: Vec<(usize, String, Result<ExtractionOutput>)> =
        stream::iter(cli.inputs.iter().cloned().enumerate().map(|(i, input)| {
            let config = &config;
            let store = Arc::clone(&store);
            async move {
                let result = extract_file(&input, config, store.as_ref())
                    .await
                    .with_context(|| format!("Extraction failed for {input}"));
                (i, input, result)
            }
        }))
        .buffer_unordered(jobs)
        .collect()
        .await;
    results.sort_by_key(|(i, _, _)| *i);

    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
    }

    // ── Report ───────────────────────────────────────────────────────────
    let mut documents = Vec::new();
    let mut failures = 0usize;
    for (_, input, result) in results {
        match result {
            Ok(output) => {
                if !cli.quiet {
                    print_summary(&input, &output);
                }
                let doc = if cli.json {
                    serde_json::to_value(&output).context("Failed to serialise output")?
                } else {
                    output.record.to_document()
                };
                documents.push(doc);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {:#}", red("✘"), e);
            }
        }
    }

    let json = if documents.len() == 1 {
        serde_json::to_string_pretty(&documents[0])
    } else {
        serde_json::to_string_pretty(&documents)
    }
    .context("Failed to serialise output")?;
    if !documents.is_empty() {
        println!("{json}");
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} datasheets failed", cli.inputs.len());
    }
    Ok(())
}

fn print_summary(input: &str, output: &ExtractionOutput) {
    let model = output.record.model.as_deref().unwrap_or("?");
    let quality = match output.quality {
        Quality::Good => green("good"),
        Quality::Partial => cyan("partial"),
    };
    eprintln!(
        "{} {}  {}  {}/{} pages{}  {:?}  {}ms  {}",
        green("✔"),
        bold(model),
        quality,
        output.stats.recovered_pages,
        output.stats.eligible_pages,
        if output.stats.used_fallback {
            " (fallback)"
        } else {
            ""
        },
        output.outcome,
        output.stats.total_duration_ms,
        dim(input),
    );
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .merge_policy(cli.policy.into())
        .max_pages(cli.max_pages)
        .min_page_chars(cli.min_page_chars)
        .max_page_chars(cli.max_page_chars)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .audit_pages(cli.audit_pages)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref units) = cli.units {
        builder = builder.unit_tokens(units.iter().map(|u| u.trim().to_string()));
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_multiple_inputs_and_policy() {
        let cli = Cli::try_parse_from([
            "datasheet2json",
            "--policy",
            "first-non-null-wins",
            "--units",
            "V,Hz",
            "a.pdf",
            "b.pdf",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["a.pdf", "b.pdf"]);
        assert!(matches!(cli.policy, PolicyArg::FirstNonNullWins));
        assert_eq!(cli.units, Some(vec!["V".to_string(), "Hz".to_string()]));
    }

    #[tokio::test]
    async fn build_config_maps_flags() {
        let cli = Cli::try_parse_from(["datasheet2json", "--max-pages", "3", "x.pdf"]).unwrap();
        let config = build_config(&cli, None).await.unwrap();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.merge_policy, MergePolicy::ScoreBased);
    }
}
