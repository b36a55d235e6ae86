//! # Replete CLI Entry Point
//!
//! Terminal host for the Replete ClojureScript REPL. It plays the part of
//! the UI: it starts a dispatcher, forwards input lines as evaluations and
//! renders the notifications that come back.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive session against a compiled bundle
//! replete repl --bundle out/
//!
//! # One-shot evaluation, notifications as JSON lines
//! replete eval --bundle out/ -e '(+ 1 2)' --json
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG`; stdout carries REPL output only.

use anyhow::{Context as _, Result};
use argh::FromArgs;
use replete_common::{channel_notifier, Notification};
use replete_vm::{Command, DirBundle, Dispatcher, VmConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

/// Environment fallback for `--files`.
const FILES_ROOT_ENV: &str = "REPLETE_FILES_ROOT";

const PROMPT: &str = "cljs.user=> ";

#[derive(FromArgs)]
/// Replete - a ClojureScript REPL hosted on an embedded JavaScript engine
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Repl(ReplArgs),
    Eval(EvalArgs),
}

/// Arguments for an interactive session.
///
/// # Example
///
/// ```bash
/// replete repl --bundle out/ --files ~/.replete --device tablet
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "repl")]
/// start an interactive REPL session
struct ReplArgs {
    /// directory holding the compiled script bundle
    #[argh(option, short = 'b')]
    bundle: PathBuf,

    /// writable root for the filesystem natives
    ///
    /// Falls back to REPLETE_FILES_ROOT, then to a directory under the
    /// system temp dir.
    #[argh(option)]
    files: Option<PathBuf>,

    /// user interface idiom passed to the REPL library
    #[argh(option, default = "\"phone\".into()")]
    device: String,

    /// print notifications as JSON lines instead of plain text
    #[argh(switch)]
    json: bool,
}

/// Arguments for a single evaluation.
#[derive(FromArgs)]
#[argh(subcommand, name = "eval")]
/// evaluate one form and exit
struct EvalArgs {
    /// directory holding the compiled script bundle
    #[argh(option, short = 'b')]
    bundle: PathBuf,

    /// source text to evaluate
    #[argh(option, short = 'e')]
    expr: String,

    /// writable root for the filesystem natives
    #[argh(option)]
    files: Option<PathBuf>,

    /// print notifications as JSON lines instead of plain text
    #[argh(switch)]
    json: bool,
}

/// Renders notifications to stdout.
struct Printer {
    json: bool,
}

impl Printer {
    fn print(&self, note: &Notification) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        if self.json {
            serde_json::to_writer(&mut stdout, note)?;
            writeln!(stdout)?;
        } else {
            match note {
                Notification::Output(text) => writeln!(stdout, "{}", text.trim_end_matches('\n'))?,
                Notification::Error(text) => eprintln!("{}", text.trim_end_matches('\n')),
                _ => {}
            }
        }
        stdout.flush()?;
        Ok(())
    }
}

fn config(files: Option<PathBuf>) -> VmConfig {
    let config = VmConfig::new();
    match files.or_else(|| std::env::var_os(FILES_ROOT_ENV).map(PathBuf::from)) {
        Some(root) => config.with_files_root(root),
        None => config,
    }
}

/// Terminal width for the REPL's pretty printer.
fn viewport_width() -> f64 {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse::<f64>().ok())
        .unwrap_or(80.0)
}

/// Spawn a dispatcher and wait until the bootstrap finishes.
async fn start(
    bundle: PathBuf,
    files: Option<PathBuf>,
    device: &str,
    printer: &Printer,
) -> Result<(Dispatcher, UnboundedReceiver<Notification>)> {
    if !bundle.is_dir() {
        anyhow::bail!("Bundle directory '{}' does not exist", bundle.display());
    }

    let config = config(files);
    std::fs::create_dir_all(&config.files_root)
        .with_context(|| format!("Failed to create {}", config.files_root.display()))?;
    tracing::info!("Files root: {}", config.files_root.display());

    let (notifier, mut notes) = channel_notifier();
    let dispatcher = Dispatcher::spawn(config, Arc::new(DirBundle::new(bundle)), Arc::new(notifier))?;
    dispatcher.start_session(device)?;

    while let Some(note) = notes.recv().await {
        printer.print(&note)?;
        match note {
            Notification::EngineReady => tracing::info!("Engine ready"),
            Notification::UpdateWidth => dispatcher.submit(Command::SetViewportWidth(viewport_width()))?,
            Notification::EnableEval => return Ok((dispatcher, notes)),
            Notification::Error(_) => anyhow::bail!("Bootstrap failed"),
            _ => {}
        }
    }
    anyhow::bail!("Dispatcher stopped during bootstrap")
}

/// Tracks the evaluation in flight, if any.
///
/// Only error items that arrive between submit and the re-enable count
/// against the evaluation; timer output before or after it does not.
#[derive(Debug, Default)]
struct Pending {
    active: bool,
    failed: bool,
}

impl Pending {
    fn begin(&mut self) {
        self.active = true;
        self.failed = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    /// Record `note`. Returns `Some(failed)` once the evaluation finishes.
    fn observe(&mut self, note: &Notification) -> Option<bool> {
        if !self.active {
            return None;
        }
        match note {
            Notification::Error(_) => {
                self.failed = true;
                None
            }
            Notification::EnablePrinting => {
                self.active = false;
                Some(self.failed)
            }
            _ => None,
        }
    }
}

/// Submit one evaluation and render everything up to the re-enable.
///
/// Notifications already queued are rendered first and do not count.
/// Returns whether an error item was seen.
async fn evaluate(
    dispatcher: &Dispatcher,
    notes: &mut UnboundedReceiver<Notification>,
    source: String,
    printer: &Printer,
) -> Result<bool> {
    while let Ok(note) = notes.try_recv() {
        printer.print(&note)?;
    }

    let mut pending = Pending::default();
    dispatcher.submit(Command::Evaluate(source))?;
    pending.begin();
    while let Some(note) = notes.recv().await {
        printer.print(&note)?;
        if let Some(failed) = pending.observe(&note) {
            return Ok(failed);
        }
    }
    anyhow::bail!("Dispatcher stopped during evaluation")
}

fn prompt(printer: &Printer) -> Result<()> {
    if !printer.json {
        print!("{}", PROMPT);
        std::io::stdout().flush()?;
    }
    Ok(())
}

/// Interactive loop. Input is read only while no evaluation is in flight;
/// notifications render as they arrive, including timer and promise output
/// produced between evaluations.
async fn run_repl(args: ReplArgs) -> Result<()> {
    let printer = Printer { json: args.json };
    let (dispatcher, mut notes) = start(args.bundle, args.files, &args.device, &printer).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = Pending::default();
    let mut input_open = true;
    prompt(&printer)?;

    while input_open || pending.is_active() {
        tokio::select! {
            line = lines.next_line(), if input_open && !pending.is_active() => {
                match line? {
                    None => input_open = false,
                    Some(line) if line.trim().is_empty() => prompt(&printer)?,
                    Some(line) => {
                        dispatcher.submit(Command::Evaluate(line))?;
                        pending.begin();
                    }
                }
            }
            note = notes.recv() => {
                let Some(note) = note else {
                    anyhow::bail!("Dispatcher stopped");
                };
                if !pending.is_active() && note.is_item() && !printer.json {
                    println!();
                }
                printer.print(&note)?;
                if note == Notification::UpdateWidth {
                    dispatcher.submit(Command::SetViewportWidth(viewport_width()))?;
                }
                let finished = pending.observe(&note).is_some();
                if finished || (!pending.is_active() && note.is_item()) {
                    prompt(&printer)?;
                }
            }
        }
    }

    tracing::info!("End of input, shutting down");
    dispatcher.shutdown()?;
    Ok(())
}

async fn run_eval(args: EvalArgs) -> Result<()> {
    let printer = Printer { json: args.json };
    let (dispatcher, mut notes) = start(args.bundle, args.files, "phone", &printer).await?;
    let failed = evaluate(&dispatcher, &mut notes, args.expr, &printer).await?;
    dispatcher.shutdown()?;
    if failed {
        anyhow::bail!("Evaluation failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to INFO, RUST_LOG overrides. Logs go to stderr so stdout
    // stays clean REPL output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Repl(args) => run_repl(args).await,
        Commands::Eval(args) => run_eval(args).await,
    }
}
