use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fractality_core::{EngineConfig, NodeId};
use fractality_engine::{Clock, Engine, EngineContext, EngineStats, ManualClock};
use fractality_loader::{DataLoader, LoadOptions};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "fractality",
    author,
    version,
    about = "Headless driver for the fractal graph engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a graph, drive frames on a simulated clock and print a JSON summary
    Run(RunArgs),
    /// Write a graph in its canonical JSON form
    Export(ExportArgs),
    /// Print navigation hints for a graph
    Hints(HintsArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// `test:<pattern>`, a pattern name, an http(s) URL or a JSON file path
    #[arg(short, long, default_value = "test:balanced")]
    source: String,

    /// JSON config file; missing keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PRNG seed for generators and scattered layouts
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Layout name (family, goldenSpiral, fibonacciSphere, fractalTree, cosmicWeb)
    #[arg(short, long)]
    layout: Option<String>,

    #[arg(short, long, default_value_t = 600)]
    frames: usize,

    /// Refocus on a random visible node every N frames (0 disables)
    #[arg(short, long, default_value_t = 0)]
    walk: usize,

    /// Simulated frame interval in milliseconds
    #[arg(long, default_value_t = 16.67)]
    frame_ms: f64,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    max_depth: Option<u32>,
}

#[derive(Args, Debug)]
struct HintsArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Entries per list
    #[arg(short = 'n', long, default_value_t = 5)]
    limit: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    source: String,
    simulated_seconds: f64,
    focus_path: Vec<NodeId>,
    events: BTreeMap<&'static str, usize>,
    stats: EngineStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Export(args) => export(args).await,
        Command::Hints(args) => hints(args).await,
    }
}

fn load_config(args: &SourceArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.seed.is_some() {
        config.data.seed = args.seed;
    }
    Ok(config)
}

async fn session(args: &SourceArgs) -> Result<(Engine, ManualClock)> {
    let config = load_config(args)?;
    let clock = ManualClock::new();
    let context = EngineContext::new(config).with_clock(Arc::new(clock.clone()));
    let mut engine = Engine::headless(context);
    engine
        .load(&args.source)
        .await
        .with_context(|| format!("loading {}", args.source))?;
    Ok((engine, clock))
}

async fn run(args: RunArgs) -> Result<()> {
    let (mut engine, clock) = session(&args.source).await?;
    if let Some(layout) = &args.layout {
        engine.set_layout(layout)?;
    }

    let step = Duration::from_secs_f64(args.frame_ms / 1000.0);
    let mut rng = StdRng::seed_from_u64(args.source.seed.unwrap_or(0));
    let mut focus_path: Vec<NodeId> = engine.focus().cloned().into_iter().collect();
    let mut events: BTreeMap<&'static str, usize> = BTreeMap::new();

    tracing::info!("Running {} frames on '{}'", args.frames, args.source.source);
    for frame in 1..=args.frames {
        clock.advance(step);
        engine.frame();
        for event in engine.events().drain() {
            *events.entry(event.name()).or_default() += 1;
        }

        if args.walk > 0 && frame % args.walk == 0 {
            let focus = engine.focus().cloned();
            let candidates: Vec<NodeId> = engine
                .view()
                .ids()
                .filter(|id| Some(*id) != focus.as_ref())
                .cloned()
                .collect();
            if let Some(next) = candidates.choose(&mut rng) {
                engine.set_focus(next.as_str())?;
                focus_path.push(next.clone());
            }
        }
    }

    let summary = RunSummary {
        source: args.source.source.clone(),
        simulated_seconds: clock.now().as_secs_f64(),
        focus_path,
        events,
        stats: engine.stats(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn export(args: ExportArgs) -> Result<()> {
    let config = load_config(&args.source)?;
    let loader = DataLoader::with_seed(config.data.loading, config.data.seed);
    let options = LoadOptions {
        max_depth: args.max_depth,
        limit: args.limit,
    };
    let graph = loader.load_descriptor(&args.source.source, options).await?;
    let json = graph.to_json_string()?;
    match args.out {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Wrote {} nodes to {}", graph.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn hints(args: HintsArgs) -> Result<()> {
    let (mut engine, _) = session(&args.source).await?;
    let hints = engine
        .navigation_hints(args.limit)
        .context("no graph loaded")?;
    println!("{}", serde_json::to_string_pretty(&hints)?);
    Ok(())
}
