use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valo_coach::config::Config;
use valo_coach::events::{load_events, STDIN_SOURCE};
use valo_coach::fake_log::{self, DEFAULT_ROUNDS};
use valo_coach::llm::GeminiClient;
use valo_coach::pipeline::Pipeline;
use valo_coach::util::write_atomic;

#[derive(Parser, Debug)]
#[command(
    name = "valo-coach",
    about = "Turn a VALORANT match event log into a coaching report with Gemini",
    version
)]
struct Cli {
    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze an event log and print or save the report
    Analyze(AnalyzeArgs),
    /// Write a synthetic match log for trying the analyzer
    FakeLog(FakeLogArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Event JSON file, or '-' for stdin
    source: String,
    /// Report file (.json); stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,
    /// Model to start with (overrides MODEL_NAME and the config file)
    #[arg(long)]
    model: Option<String>,
    /// Maximum number of events sent to the model
    #[arg(long)]
    max_events: Option<usize>,
    /// Language the report is written in
    #[arg(long)]
    lang: Option<String>,
}

#[derive(Args, Debug)]
struct FakeLogArgs {
    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    rounds: u32,
    /// Random seed for a reproducible log
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "sample.json")]
    out: PathBuf,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::FakeLog(args) => run_fake_log(args),
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = Config::load();
    if let Some(model) = args.model {
        config.model_name = model;
    }
    if let Some(max_events) = args.max_events {
        config.max_events = max_events;
    }
    if let Some(lang) = args.lang {
        config.language = lang;
    }

    let events = load_events(&args.source).with_context(|| {
        if args.source == STDIN_SOURCE {
            "Failed to load events from stdin".to_string()
        } else {
            format!("Failed to load events from {}", args.source)
        }
    })?;

    let client = GeminiClient::new(&config)?;
    let pipeline = Pipeline::new(client, &config);
    let outcome = pipeline.run(&events).await?;

    let rendered =
        serde_json::to_string_pretty(&outcome.report).context("Failed to serialize report")?;
    match args.out {
        Some(path) => {
            write_atomic(&path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved report to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn run_fake_log(args: FakeLogArgs) -> Result<()> {
    let events = fake_log::generate(args.rounds, args.seed);
    let rendered = serde_json::to_string_pretty(&events).context("Failed to serialize events")?;
    write_atomic(&args.out, &rendered)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    eprintln!(
        "Wrote {} ({} rounds, {} events)",
        args.out.display(),
        args.rounds,
        events.len()
    );
    Ok(())
}
