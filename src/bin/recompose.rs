//! CLI binary for edgequake-recompose.
//!
//! A thin host over the library's `WorkflowController`: it maps flags to
//! `RecomposeConfig`, drives one pass of the workflow, and writes the export.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_recompose::catalog;
use edgequake_recompose::{
    AspectRatio, DetectedElement, ExportFormat, RecomposeConfig, Step,
    WorkflowController, WorkflowObserver,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
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

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner whose message follows the workflow step.
struct CliObserver {
    bar: ProgressBar,
    started: Instant,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let template = "{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}";
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Upload");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkflowObserver for CliObserver {
    fn on_step_change(&self, _from: Step, to: Step) {
        let msg = match to {
            Step::Upload => "Waiting for input",
            Step::Analyzing => "Identifying elements…",
            Step::Selecting => "Elements ready",
            Step::Configuring => "Configuring",
            Step::Generating => "Generating image…",
            Step::Result => "Image ready",
        };
        self.bar.set_prefix(to.to_string());
        self.bar.set_message(msg);
    }

    fn on_error(&self, message: &str) {
        // Keep the banner to one line; the full text is printed on exit.
        let first = message.lines().next().unwrap_or(message);
        self.bar.println(format!("  {} {}", red("✗"), red(first)));
    }

    fn on_analysis_fallback(&self, reason: &str) {
        self.bar.println(format!(
            "  {} analysis unavailable, using generic elements  {}",
            cyan("⚠"),
            dim(reason.lines().next().unwrap_or(reason))
        ));
    }

    fn on_elements_ready(&self, count: usize) {
        self.bar.println(format!(
            "  {} {} elements  {}",
            green("✓"),
            count,
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recompose a landscape photo for a portrait display
  recompose photo.jpg --ratio 9:16 -o portrait.png

  # Use the first page of a PDF flyer, neon style, export as PDF
  recompose flyer.pdf --template neon_city --format pdf

  # See what the analyzer found, then drop element el-2
  recompose photo.jpg --analyze-only
  recompose photo.jpg --toggle el-2

  # Freeform instructions replace the template entirely
  recompose photo.jpg --instructions "Put the chef on a beach at sunset"

  # Create a brand-new image from a description
  recompose --create "A cosy bookshop at night" --ratio 16:9 --inspiration lamps

  # List templates, inspirations, and ratios
  recompose --list-templates

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (image generation, analysis)
  GOOGLE_API_KEY          Alternative name for the Gemini key
  GEMINI_API_BASE         Override the Gemini REST base URL
  OPENAI_API_KEY          OpenAI key, used for analysis when no Gemini key is set
  EDGEQUAKE_LLM_PROVIDER  Override analysis provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override analysis model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Recompose images and PDF pages with generative vision models.
#[derive(Parser, Debug)]
#[command(
    name = "recompose",
    version,
    about = "Recompose images and PDF pages into new ratios and styles",
    long_about = "Identify the elements of a photo or the first page of a PDF with a vision model, \
keep the ones you want, and have an image model compose them into a new aspect ratio and style. \
Or create a new image from a description alone.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image/PDF path or HTTP/HTTPS URL.
    input: Option<String>,

    /// Write the exported file here. Default: ./recompose-output.<format>
    #[arg(short, long, env = "RECOMPOSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Create a new image from this description instead of recomposing INPUT.
    #[arg(long, conflicts_with = "input")]
    create: Option<String>,

    /// Freeform instructions. When set, the template is ignored.
    #[arg(long, env = "RECOMPOSE_INSTRUCTIONS")]
    instructions: Option<String>,

    /// Template id (see --list-templates).
    #[arg(long, env = "RECOMPOSE_TEMPLATE")]
    template: Option<String>,

    /// Target aspect ratio: 1:1, 2:3, 3:2, 3:4, 4:3, 9:16, 16:9, 21:9.
    #[arg(long, env = "RECOMPOSE_RATIO")]
    ratio: Option<AspectRatio>,

    /// Element ids whose keep flag to flip, e.g. el-0,el-3.
    #[arg(long, value_delimiter = ',', conflicts_with = "create")]
    toggle: Vec<String>,

    /// Inspiration ids to append to the instructions, e.g. lamps,office.
    #[arg(long, value_delimiter = ',')]
    inspiration: Vec<String>,

    /// Export format: png, jpeg, pdf. Default: from --output extension, else png.
    #[arg(long, env = "RECOMPOSE_FORMAT")]
    format: Option<ExportFormat>,

    /// Stop after analysis and print the detected elements.
    #[arg(long, conflicts_with = "create")]
    analyze_only: bool,

    /// Print the template and inspiration catalogs, then exit.
    #[arg(long)]
    list_templates: bool,

    /// Print a JSON summary to stdout.
    #[arg(long, env = "RECOMPOSE_JSON")]
    json: bool,

    /// Analysis provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Analysis model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Image generation model ID.
    #[arg(long, env = "RECOMPOSE_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Output size hint for the image model: 1K, 2K, 4K.
    #[arg(long, env = "RECOMPOSE_IMAGE_SIZE", default_value = "1K")]
    image_size: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "RECOMPOSE_PASSWORD")]
    password: Option<String>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Per-call timeout for remote models, in seconds.
    #[arg(long, env = "RECOMPOSE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout for URL inputs, in seconds.
    #[arg(long, env = "RECOMPOSE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the spinner.
    #[arg(long, env = "RECOMPOSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECOMPOSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECOMPOSE_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct ElementsReport<'a> {
    source: &'a str,
    elements: &'a [DetectedElement],
}

#[derive(Serialize)]
struct RunReport<'a> {
    output: String,
    format: ExportFormat,
    bytes: usize,
    ratio: AspectRatio,
    instructions_used: &'a str,
    instruction_source: &'a edgequake_recompose::InstructionSource,
    elements: &'a [DetectedElement],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; keep library logs to
    // errors while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    if cli.list_templates {
        print_catalogs();
        return Ok(());
    }

    if cli.input.is_none() && cli.create.is_none() {
        bail!("Nothing to do: pass an INPUT file or --create \"description\"");
    }

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone())?;
    let mut workflow = WorkflowController::from_config(config);

    let outcome = run(&cli, &mut workflow).await;
    if let Some(obs) = observer {
        obs.finish();
    }
    outcome
}

async fn run(cli: &Cli, workflow: &mut WorkflowController) -> Result<()> {
    // ── Upload / analysis ────────────────────────────────────────────────
    if let Some(ref description) = cli.create {
        workflow.start_new_creation()?;
        workflow.set_instructions(description.as_str())?;
    } else if let Some(ref input) = cli.input {
        workflow
            .accept_source(input)
            .await
            .with_context(|| format!("Could not prepare the source image from '{input}'"))?;

        for id in &cli.toggle {
            workflow.toggle_element(id)?;
        }

        if cli.analyze_only {
            let elements = workflow.session().elements();
            if cli.json {
                let report = ElementsReport {
                    source: input,
                    elements,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_elements(elements);
            }
            return Ok(());
        }

        if !cli.quiet && !cli.json {
            print_elements(workflow.session().elements());
        }
        workflow.proceed_to_configuration()?;
    }

    // ── Configuration ────────────────────────────────────────────────────
    if let Some(ref id) = cli.template {
        workflow.set_template(id)?;
    }
    if let Some(ratio) = cli.ratio {
        workflow.set_ratio(ratio)?;
    }
    if let Some(ref text) = cli.instructions {
        workflow.set_instructions(text.as_str())?;
    }
    for id in &cli.inspiration {
        workflow.apply_inspiration(id)?;
    }

    // ── Generation ───────────────────────────────────────────────────────
    let started = Instant::now();
    workflow.generate().await.context("Image generation failed")?;

    // ── Export ───────────────────────────────────────────────────────────
    let format = cli
        .format
        .or_else(|| cli.output.as_deref().and_then(format_from_extension))
        .unwrap_or_default();
    let file = workflow.export(format).await.context("Export failed")?;

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&file.file_name));
    file.write_to(&output_path)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    let Some(result) = workflow.session().result() else {
        bail!("Workflow finished without a result");
    };

    if cli.json {
        let report = RunReport {
            output: output_path.display().to_string(),
            format,
            bytes: file.bytes.len(),
            ratio: result.ratio,
            instructions_used: &result.instructions_used,
            instruction_source: &result.source,
            elements: workflow.session().elements(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        eprintln!(
            "{}  {} {}  {}  →  {}",
            green("✔"),
            result.ratio,
            format,
            dim(&format!("{:.1}s", started.elapsed().as_secs_f64())),
            bold(&output_path.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `RecomposeConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<RecomposeConfig> {
    let mut builder = RecomposeConfig::builder()
        .image_size(cli.image_size.as_str())
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref provider) = cli.provider {
        builder = builder.analysis_provider_name(provider.as_str());
    }
    if let Some(ref model) = cli.model {
        builder = builder.analysis_model(model.as_str());
    }
    if let Some(ref model) = cli.image_model {
        builder = builder.synthesis_model(model.as_str());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.as_str());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

fn format_from_extension(path: &Path) -> Option<ExportFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
}

fn print_elements(elements: &[DetectedElement]) {
    eprintln!("{}", bold("Detected elements:"));
    for el in elements {
        let mark = if el.keep { green("keep") } else { dim("drop") };
        eprintln!(
            "  {:<6} {}  {:<28} {}",
            el.id,
            mark,
            el.label,
            dim(el.category.as_str())
        );
    }
}

fn print_catalogs() {
    println!("{}", bold("TEMPLATES"));
    for t in catalog::templates() {
        let default = if t.id == catalog::DEFAULT_TEMPLATE_ID {
            cyan(" (default)")
        } else {
            String::new()
        };
        println!("  {:<14} {}{}  {}", t.id, t.name, default, dim(&t.description));
    }
    println!();
    println!("{}", bold("INSPIRATIONS"));
    for i in catalog::inspirations() {
        println!("  {:<14} {}", i.id, i.description);
    }
    println!();
    println!("{}", bold("RATIOS"));
    let ratios: Vec<&str> = AspectRatio::ALL.iter().map(|r| r.as_str()).collect();
    println!("  {}", ratios.join("  "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_recompose_only_flags() {
        for flag in [&["--toggle", "el-0"][..], &["--analyze-only"][..]] {
            let mut args = vec!["recompose", "--create", "a red bicycle"];
            args.extend_from_slice(flag);
            let err = Cli::try_parse_from(args).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }
    }

    #[test]
    fn input_accepts_toggles() {
        let cli = Cli::try_parse_from(["recompose", "photo.jpg", "--toggle", "el-0,el-2"]).unwrap();
        assert_eq!(cli.toggle, ["el-0", "el-2"]);
        assert_eq!(cli.input.as_deref(), Some("photo.jpg"));
    }

    #[test]
    fn output_extension_picks_format() {
        assert_eq!(format_from_extension(Path::new("out.pdf")), Some(ExportFormat::Pdf));
        assert_eq!(format_from_extension(Path::new("out.JPG")), Some(ExportFormat::Jpeg));
        assert_eq!(format_from_extension(Path::new("out")), None);
    }
}
