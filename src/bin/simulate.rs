use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use grove_warden::config::GameConfig;
use grove_warden::rng::Rng;
use grove_warden::session::{Headless, Session, SessionReport};
use grove_warden::types::{Direction, InputEvent, Outcome};
use grove_warden::world::{load_map_file, GlyphTable};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run headless sessions with a scripted random walk")]
struct Cli {
    #[arg(long, default_value = "maps/grove.txt")]
    map: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long, default_value_t = 1)]
    runs: u32,
    /// Inputs per run before the script closes its input channel.
    #[arg(long, default_value_t = 200)]
    steps: usize,
    #[arg(long, default_value_t = 50)]
    step_ms: u64,
    #[arg(long)]
    monster: Option<String>,
    #[arg(long)]
    gate: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunLine {
    run: u32,
    started_at: DateTime<Utc>,
    duration_ms: i64,
    frames: u64,
    #[serde(flatten)]
    report: SessionReport,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    run_count: usize,
    average_duration_ms: i64,
    average_score: f64,
    outcome_counts: BTreeMap<String, usize>,
    events_dropped: u64,
    runs: Vec<RunLine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let base = load_config(&cli)?;
    let glyphs = Arc::new(GlyphTable::default());
    let first_seed = base.seed.unwrap_or_else(rand::random);
    let started_at = Utc::now();

    let mut lines = Vec::new();
    for run in 0..cli.runs {
        let map = load_map_file(&cli.map, &glyphs)
            .with_context(|| format!("loading {}", cli.map.display()))?;
        let mut config = base.clone();
        config.seed = Some(first_seed.wrapping_add(run));
        let line = run_once(run, config, map, glyphs.clone(), &cli).await?;
        println!("{}", serde_json::to_string(&line)?);
        lines.push(line);
    }

    let summary = build_run_summary(started_at, Utc::now(), lines);
    info!(
        runs = summary.run_count,
        average_score = summary.average_score,
        outcomes = ?summary.outcome_counts,
        "simulation finished"
    );
    if let Some(path) = cli.summary_out.as_ref() {
        write_summary(path, &summary)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }
    Ok(())
}

async fn run_once(
    run: u32,
    config: GameConfig,
    map: grove_warden::world::LoadedMap,
    glyphs: Arc<GlyphTable>,
    cli: &Cli,
) -> anyhow::Result<RunLine> {
    let session = Session::new(config, map, glyphs);
    let mut script_rng = Rng::new(session.seed() ^ 0x5eed);
    let script = walk_script(&mut script_rng, cli.steps);
    let step = Duration::from_millis(cli.step_ms);
    info!(run, seed = session.seed(), inputs = script.len(), "run started");

    let (tx, inputs) = mpsc::channel(16);
    let feeder = tokio::spawn(async move {
        for input in script {
            tokio::time::sleep(step).await;
            if tx.send(input).await.is_err() {
                break;
            }
        }
    });

    let started_at = Utc::now();
    let mut renderer = Headless::default();
    let report = session.run(inputs, &mut renderer).await?;
    feeder.abort();
    let finished_at = Utc::now();

    if report.events_dropped > 0 {
        warn!(run, dropped = report.events_dropped, "events dropped under load");
    }
    Ok(RunLine {
        run,
        started_at,
        duration_ms: (finished_at - started_at).num_milliseconds(),
        frames: renderer.frames,
        report,
    })
}

/// Mostly walking, with the odd interaction and double jump mixed in.
fn walk_script(rng: &mut Rng, steps: usize) -> Vec<InputEvent> {
    (0..steps)
        .map(|_| {
            let direction = Direction::ALL[rng.pick_index(Direction::ALL.len())];
            match rng.int(0, 19) {
                0 | 1 => InputEvent::Interact,
                2 => InputEvent::Jump(direction),
                _ => InputEvent::Move(direction),
            }
        })
        .collect()
}

fn load_config(cli: &Cli) -> anyhow::Result<GameConfig> {
    let mut config = match &cli.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    config.apply_overrides(cli.monster.as_deref(), cli.gate.as_deref(), cli.seed)?;
    Ok(config)
}

fn outcome_key(outcome: Outcome) -> String {
    match outcome {
        Outcome::Quit => "quit",
        Outcome::Caught { .. } => "caught",
        Outcome::InputClosed => "input_closed",
    }
    .to_string()
}

fn build_run_summary(
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    runs: Vec<RunLine>,
) -> RunSummary {
    let mut outcome_counts = BTreeMap::new();
    for line in &runs {
        *outcome_counts.entry(outcome_key(line.report.outcome)).or_insert(0) += 1;
    }
    let count = runs.len();
    let (average_duration_ms, average_score) = if count == 0 {
        (0, 0.0)
    } else {
        (
            runs.iter().map(|line| line.duration_ms).sum::<i64>() / count as i64,
            runs.iter().map(|line| f64::from(line.report.score)).sum::<f64>() / count as f64,
        )
    };
    RunSummary {
        started_at,
        finished_at,
        run_count: count,
        average_duration_ms,
        average_score,
        outcome_counts,
        events_dropped: runs.iter().map(|line| line.report.events_dropped).sum(),
        runs,
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)
}
