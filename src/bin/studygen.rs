//! CLI binary for studygen.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig`, runs one generation and prints the result as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use studygen::{
    narrate, write_audio_files, Difficulty, ExplanationStyle, GenerationConfig, GenerationOutcome,
    GenerationParameters, GenerationRequest, Generator, HttpSpeechBackend,
    NarrationProgressCallback, Quiz, VoicePair,
};
use tokio_util::sync::CancellationToken;
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

/// Live progress bar for narration. Lines may finish out of order.
struct CliNarrationProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliNarrationProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} lines  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Narrating");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        }
    }

    fn elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl NarrationProgressCallback for CliNarrationProgress {
    fn on_narration_start(&self, total_lines: usize) {
        self.bar.set_length(total_lines as u64);
    }

    fn on_line_start(&self, index: usize, _total_lines: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_line_complete(&self, index: usize, total_lines: usize, audio_bytes: usize) {
        let elapsed_ms = self.elapsed_ms(index);
        self.bar.println(format!(
            "  {} Line {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index + 1,
            total_lines,
            dim(&format!("{:>6} KB", audio_bytes / 1024)),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_line_error(&self, index: usize, total_lines: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(index);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Line {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total_lines,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_narration_complete(&self, total_lines: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_lines.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} lines narrated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} lines narrated  ({} failed)",
                if failed == total_lines {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_lines,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Twelve medium flashcards from a text file
  studygen flashcards chapter3.txt

  # Hard quiz from stdin, saved to a file
  cat notes.txt | studygen quiz - --difficulty hard -o quiz.json

  # Explanation for a beginner, printed as Markdown
  studygen explain chapter3.txt --style layman

  # Podcast script plus one WAV per line
  studygen podcast chapter3.txt --speaker1 Sam --speaker2 Riley --audio-dir episode/

  # Grade a saved quiz (blank or '-' marks an unanswered question)
  studygen grade quiz.json --answers 0,2,-,1

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  GROQ_API_KEY            Groq key, used for narration
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  STUDYGEN_TTS_BASE_URL   OpenAI-compatible speech endpoint base URL
  STUDYGEN_TTS_MODEL      Speech model (default: playai-tts)
"#;

/// Generate flashcards, quizzes, explanations and podcast scripts from text.
#[derive(Parser, Debug)]
#[command(
    name = "studygen",
    version,
    about = "Generate study material from text using LLMs",
    long_about = "Turn study text into flashcards, multiple-choice quizzes, explanations and \
two-host podcast scripts. Supports OpenAI, Anthropic, Google Gemini and any OpenAI-compatible \
endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Write output to this file instead of stdout.
    #[arg(short, long, global = true, env = "STUDYGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Document id recorded in the result.
    #[arg(long, global = true, env = "STUDYGEN_DOCUMENT_ID")]
    document_id: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, llama-3.3-70b-versatile).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0). Default depends on the kind.
    #[arg(long, global = true, env = "STUDYGEN_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens. Default depends on the kind.
    #[arg(long, global = true, env = "STUDYGEN_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Source text budget in characters. Default depends on the kind.
    #[arg(long, global = true, env = "STUDYGEN_MAX_TEXT_CHARS")]
    max_text_chars: Option<usize>,

    /// Retries on LLM failure.
    #[arg(long, global = true, env = "STUDYGEN_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "STUDYGEN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "STUDYGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDYGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "STUDYGEN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate flashcards.
    Flashcards {
        /// Text file to read, or `-` for stdin.
        input: PathBuf,

        /// Number of cards to request.
        #[arg(short, long, env = "STUDYGEN_COUNT", default_value_t = 12)]
        count: usize,

        #[arg(short, long, value_enum, default_value = "medium")]
        difficulty: DifficultyArg,
    },

    /// Generate a multiple-choice quiz (8/12/15 questions by difficulty).
    Quiz {
        /// Text file to read, or `-` for stdin.
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "medium")]
        difficulty: DifficultyArg,
    },

    /// Generate a Markdown explanation.
    Explain {
        /// Text file to read, or `-` for stdin.
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "layman")]
        style: StyleArg,

        /// Print the full JSON result instead of the Markdown body.
        #[arg(long)]
        json: bool,
    },

    /// Generate a two-host podcast script, optionally narrated.
    Podcast {
        /// Text file to read, or `-` for stdin.
        input: PathBuf,

        #[arg(long, env = "STUDYGEN_SPEAKER1", default_value = "Alex")]
        speaker1: String,

        #[arg(long, env = "STUDYGEN_SPEAKER2", default_value = "Jordan")]
        speaker2: String,

        /// Maximum dialogue lines.
        #[arg(long, env = "STUDYGEN_MAX_LINES", default_value_t = 8)]
        max_lines: usize,

        /// Narrate the script and write one WAV per line into this directory.
        #[arg(long, env = "STUDYGEN_AUDIO_DIR")]
        audio_dir: Option<PathBuf>,

        #[arg(long, value_enum, env = "STUDYGEN_VOICES", default_value = "male-female")]
        voices: VoicesArg,

        /// Concurrent speech requests.
        #[arg(long, env = "STUDYGEN_TTS_CONCURRENCY", default_value_t = 4)]
        tts_concurrency: usize,
    },

    /// Grade answers against a saved quiz JSON.
    Grade {
        /// Quiz JSON as written by `studygen quiz`.
        quiz: PathBuf,

        /// Comma-separated option indices; blank or `-` for unanswered.
        #[arg(long)]
        answers: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(v: DifficultyArg) -> Self {
        match v {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    Layman,
    Professor,
    Industry,
}

impl From<StyleArg> for ExplanationStyle {
    fn from(v: StyleArg) -> Self {
        match v {
            StyleArg::Layman => ExplanationStyle::Layman,
            StyleArg::Professor => ExplanationStyle::Professor,
            StyleArg::Industry => ExplanationStyle::Industry,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum VoicesArg {
    MaleMale,
    FemaleFemale,
    MaleFemale,
}

impl From<VoicesArg> for VoicePair {
    fn from(v: VoicesArg) -> Self {
        match v {
            VoicesArg::MaleMale => VoicePair::MaleMale,
            VoicesArg::FemaleFemale => VoicePair::FemaleFemale,
            VoicesArg::MaleFemale => VoicePair::MaleFemale,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if g.verbose {
        "debug"
    } else if g.quiet {
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

    // ── Ctrl-C cancels the in-flight model call ──────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match &cli.command {
        Command::Grade { quiz, answers } => {
            let raw = tokio::fs::read_to_string(quiz)
                .await
                .with_context(|| format!("Failed to read quiz from {:?}", quiz))?;
            let quiz: Quiz = serde_json::from_str(&raw).context("Invalid quiz JSON")?;
            let answers = parse_answers(answers)?;
            let result = quiz.grade(&answers).context("Grading failed")?;
            if !g.quiet {
                eprintln!(
                    "{} {}/{} correct ({:.0}%)",
                    if result.score == result.total_questions {
                        green("✔")
                    } else {
                        cyan("◆")
                    },
                    result.score,
                    result.total_questions,
                    result.percentage
                );
            }
            emit(g, &serde_json::to_string_pretty(&result)?)?;
        }

        Command::Explain { input, style, json } => {
            let request = GenerationRequest::new(
                read_input(input)?,
                GenerationParameters::Explanation {
                    style: (*style).into(),
                },
            );
            let outcome = run(g, &request, &cancel).await?;
            match outcome {
                GenerationOutcome::Explanation(e) if !*json => emit(g, &e.content)?,
                other => emit(g, &serde_json::to_string_pretty(&other)?)?,
            }
        }

        Command::Flashcards {
            input,
            count,
            difficulty,
        } => {
            let request = GenerationRequest::new(
                read_input(input)?,
                GenerationParameters::Flashcards {
                    count: Some(*count),
                    difficulty: (*difficulty).into(),
                },
            );
            let outcome = run(g, &request, &cancel).await?;
            emit(g, &serde_json::to_string_pretty(&outcome)?)?;
        }

        Command::Quiz { input, difficulty } => {
            let request = GenerationRequest::new(
                read_input(input)?,
                GenerationParameters::Quiz {
                    difficulty: (*difficulty).into(),
                },
            );
            let outcome = run(g, &request, &cancel).await?;
            // Write the bare quiz so `studygen grade` can read it back.
            match outcome {
                GenerationOutcome::Quiz(quiz) => emit(g, &serde_json::to_string_pretty(&quiz)?)?,
                other => emit(g, &serde_json::to_string_pretty(&other)?)?,
            }
        }

        Command::Podcast {
            input,
            speaker1,
            speaker2,
            max_lines,
            audio_dir,
            voices,
            tts_concurrency,
        } => {
            let request = GenerationRequest::new(
                read_input(input)?,
                GenerationParameters::DialogueScript {
                    speaker1: Some(speaker1.clone()),
                    speaker2: Some(speaker2.clone()),
                    max_lines: Some(*max_lines),
                },
            );
            let outcome = run(g, &request, &cancel).await?;
            emit(g, &serde_json::to_string_pretty(&outcome)?)?;

            if let (Some(dir), GenerationOutcome::DialogueScript(script)) = (audio_dir, &outcome)
            {
                let backend = HttpSpeechBackend::from_env(g.api_timeout)
                    .context("Narration is not configured")?;
                let progress = (!g.quiet && !g.no_progress).then(CliNarrationProgress::new);
                let lines = narrate(
                    script,
                    &backend,
                    (*voices).into(),
                    *tts_concurrency,
                    progress.as_ref().map(|p| p as &dyn NarrationProgressCallback),
                )
                .await;
                let written = write_audio_files(dir, &lines)
                    .await
                    .context("Failed to write audio files")?;
                if !g.quiet {
                    eprintln!(
                        "{}  {} audio files  →  {}",
                        green("✔"),
                        written.len(),
                        bold(&dir.display().to_string())
                    );
                }
            }
        }
    }

    Ok(())
}

/// Build the generator and run one request, reporting degraded output.
async fn run(
    g: &GlobalArgs,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome> {
    let generator = Generator::new(build_config(g)?);
    let document_id = g.document_id.clone().unwrap_or_else(|| "stdin".to_string());

    let start = Instant::now();
    let outcome = generator
        .generate(&document_id, request, cancel)
        .await
        .context("Generation failed")?;

    if !g.quiet {
        let mark = if outcome.is_degraded() {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{}  {}  {}ms{}",
            mark,
            bold(outcome.kind().as_str()),
            start.elapsed().as_millis(),
            if outcome.is_degraded() {
                dim("  (model output unusable, placeholders returned)")
            } else {
                String::new()
            }
        );
    }
    Ok(outcome)
}

/// Map CLI args to `GenerationConfig`.
fn build_config(g: &GlobalArgs) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .max_retries(g.max_retries)
        .api_timeout_secs(g.api_timeout);

    if let Some(model) = &g.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &g.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(t) = g.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = g.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(n) = g.max_text_chars {
        builder = builder.max_text_chars(n);
    }

    builder.build().context("Invalid configuration")
}

/// Read the source text from a file, or stdin for `-`.
fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Parse `--answers`: `0,2,-,1` or `0,2,,1`.
fn parse_answers(s: &str) -> Result<Vec<Option<usize>>> {
    s.split(',')
        .map(|a| match a.trim() {
            "" | "-" => Ok(None),
            n => n
                .parse::<usize>()
                .map(Some)
                .with_context(|| format!("Invalid answer index: '{n}'")),
        })
        .collect()
}

/// Write to `--output` or stdout, with a trailing newline.
fn emit(g: &GlobalArgs, body: &str) -> Result<()> {
    let mut body = body.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    match &g.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            std::fs::write(path, body).with_context(|| format!("Failed to write {:?}", path))?;
            if !g.quiet {
                eprintln!("   {}", dim(&format!("→ {}", path.display())));
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
