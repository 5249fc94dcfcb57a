//! Tutor CLI
//!
//! Runs an interactive tutoring session in the terminal, or hosts sessions
//! over HTTP with `--serve`.

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tutor_engine::{
    create_router, AppState, ConceptGraph, Config, EncouragementHint, Session, SessionManager,
    SessionState, SessionSummary, StepKind, TopicPrompt, TurnInstruction, TurnOutcome,
};
use tutor_report::{Report, SessionRecord};

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// How often the HTTP host looks for idle sessions.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Adaptive tutor
///
/// Teaches concepts from a prerequisite graph, adjusting difficulty to how
/// the learner answers.
#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the concept bank (default: conceptBank from tutor.json)
    #[arg(value_name = "CONCEPTS")]
    concepts: Option<String>,

    /// Path to configuration file (default: tutor.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Learner id recorded on the session
    #[arg(short, long, default_value = "learner")]
    learner: String,

    /// Host sessions over HTTP instead of running one in the terminal
    #[arg(long)]
    serve: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Output directory for study guides
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Continue the saved session instead of starting fresh
    #[arg(long)]
    resume: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, concepts = ?args.concepts, "Starting tutor");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref concepts) = args.concepts {
        config.concept_bank.clone_from(concepts);
    }
    if let Some(ref output_dir) = args.output_dir {
        config.output_dir.clone_from(output_dir);
    }

    // Re-validate after overrides
    config.validate()?;

    let graph = ConceptGraph::load(&config.concept_bank)?
        .with_threshold_overrides(&config.mastery_thresholds)?;
    let graph = Arc::new(graph);

    if args.serve {
        serve(graph, &config, args.port).await
    } else {
        run_interactive(graph, &config, &args.learner, args.resume).await
    }
}

// ============================================================================
// HTTP host
// ============================================================================

async fn serve(graph: Arc<ConceptGraph>, config: &Config, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(graph, config);

    let manager = Arc::clone(&state.manager);
    let sessions = state.sessions.clone();
    let reaper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(REAP_INTERVAL);
        loop {
            tick.tick().await;
            let reaped = sessions.reap_expired(&manager, Utc::now()).await;
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "Reaped idle sessions");
            }
        }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Tutor API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    let result = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    reaper.abort();
    result.map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

// ============================================================================
// Interactive session
// ============================================================================

/// Runs one session on stdin/stdout.
///
/// End of input ends the session and writes the study guide. Ctrl+C leaves
/// the session saved for `--resume`.
async fn run_interactive(
    graph: Arc<ConceptGraph>,
    config: &Config,
    learner: &str,
    resume: bool,
) -> anyhow::Result<()> {
    let manager = SessionManager::new(Arc::clone(&graph), config);
    let session_path = PathBuf::from(&config.session_file);
    let mut session = load_or_create_session(&manager, &session_path, learner, resume).await?;

    if let Some(instruction) = manager.pending_instruction(&session) {
        render_instruction(&instruction);
    } else {
        let prompt = manager.open(&mut session)?;
        render_prompt(&prompt, &graph);
    }
    session.save(&session_path).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut topic: Option<String> = None;
    let mut summary: Option<SessionSummary> = None;

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Ok(()) = tokio::signal::ctrl_c() => {
                println!();
                println!(
                    "Session saved to {}. Run with --resume to continue.",
                    session_path.display()
                );
                return Ok(());
            }
        };
        let Some(line) = line else { break };

        let choosing = matches!(session.state, SessionState::Idle | SessionState::TopicSelection);
        match manager.submit_response(&mut session, &line) {
            Ok(outcome) => {
                if choosing && matches!(outcome, TurnOutcome::Taught { .. }) {
                    topic = Some(line.trim().to_string());
                }
                render_outcome(&outcome, &graph);
                if let Err(e) = session.save(&session_path).await {
                    tracing::warn!(error = %e, "Failed to save session");
                }
                if let TurnOutcome::Ended(ended) = outcome {
                    summary = Some(ended);
                    break;
                }
            }
            Err(e) if e.is_fatal() => {
                session.save(&session_path).await?;
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                eprintln!("{e}");
            }
        }
    }

    let summary = match summary {
        Some(summary) => summary,
        None => {
            let summary = manager.end_session(&mut session)?;
            session.save(&session_path).await?;
            summary
        }
    };

    println!();
    print_summary(&summary);

    let topic = topic
        .or_else(|| summary.concepts.last().map(|c| c.name.clone()))
        .unwrap_or_else(|| "Session".to_string());
    generate_reports(&summary, &topic, Path::new(&config.output_dir))
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the saved session or creates a new one.
async fn load_or_create_session(
    manager: &SessionManager,
    path: &Path,
    learner: &str,
    resume: bool,
) -> anyhow::Result<Session> {
    match Session::load(path).await? {
        Some(session) if resume && !session.is_terminal() => {
            println!("Resuming session {} (turn {})", session.id, session.turn);
            tracing::info!(
                session_id = %session.id,
                state = %session.state,
                turn = session.turn,
                "Resuming saved session"
            );
            Ok(session)
        }
        Some(session) if !session.is_terminal() => {
            anyhow::bail!(
                "Found an unfinished session at '{}' (turn {})\n\nSuggestion: Use --resume to continue or delete the file to start fresh",
                path.display(),
                session.turn
            );
        }
        Some(_) | None => Ok(manager.create_session(learner)),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_outcome(outcome: &TurnOutcome, graph: &ConceptGraph) {
    match outcome {
        TurnOutcome::TopicPrompt(prompt) => render_prompt(prompt, graph),
        TurnOutcome::Taught { instructions, .. } => {
            for instruction in instructions {
                render_instruction(instruction);
            }
        }
        TurnOutcome::Ended(_) => println!("Thanks for learning with me. Goodbye!"),
    }
}

fn render_prompt(prompt: &TopicPrompt, graph: &ConceptGraph) {
    println!();
    println!("{}", prompt.message);
    if let Some(ref diagnostic) = prompt.diagnostic {
        tracing::debug!(%diagnostic, "Topic prompt after failure");
    }
    for id in &prompt.suggestions {
        let name = graph.get(id).map_or(id.as_str(), |c| c.name.as_str());
        println!("  - {name}");
    }
}

fn render_instruction(instruction: &TurnInstruction) {
    if instruction.directive.is_some() {
        match instruction.encouragement {
            EncouragementHint::Celebrate => println!("Nice work!"),
            EncouragementHint::Reassure => println!("No worries, let's take a step back."),
            EncouragementHint::Neutral => {}
        }
    }
    if instruction.rephrase {
        println!("(Let's look at this one again.)");
    }

    let label = match instruction.step.kind {
        StepKind::Explain => "",
        StepKind::Example => "Example: ",
        StepKind::CheckQuestion => "Question: ",
    };
    println!();
    println!("{label}{}", content_text(&instruction.step.content));
}

/// Text of a step: a plain string, an object's `text` field, or the raw JSON.
fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => match map.get("text") {
            Some(serde_json::Value::String(text)) => text.clone(),
            _ => content.to_string(),
        },
        other => other.to_string(),
    }
}

fn print_summary(summary: &SessionSummary) {
    println!("=== Session Summary ===");
    println!("Turns: {}", summary.turns);
    println!(
        "Mastered: {} of {} concepts",
        summary.mastered_count(),
        summary.concepts.len()
    );
    for concept in &summary.concepts {
        println!(
            "  {:<24} {:>4.0}%  {}",
            concept.name,
            concept.score * 100.0,
            if concept.mastered { "mastered" } else { "in progress" }
        );
    }
}

/// Writes the study guide in every format to `output_dir`.
fn generate_reports(summary: &SessionSummary, topic: &str, output_dir: &Path) -> anyhow::Result<()> {
    println!();
    println!("Generating study guide...");

    let record = SessionRecord::from_summary(summary)?;
    let report = Report::from_session(&record, topic);
    for path in report.write_reports(output_dir)? {
        println!("  {}", path.display());
    }

    Ok(())
}
