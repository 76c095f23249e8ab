use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use clap::Parser;
use grove_warden::config::GameConfig;
use grove_warden::session::{Renderer, Session};
use grove_warden::state::GameView;
use grove_warden::types::{InputEvent, Outcome, Position};
use grove_warden::world::{load_map_file, GlyphTable, Tint};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{DefaultTerminal, Frame};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play a map in the terminal")]
struct Cli {
    #[arg(long, default_value = "maps/grove.txt")]
    map: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u32>,
    /// stalker or aggressive
    #[arg(long)]
    monster: Option<String>,
    /// lock or broker
    #[arg(long)]
    gate: Option<String>,
    #[arg(long, default_value = "grove-warden.log")]
    log_file: PathBuf,
}

struct TerminalRenderer {
    terminal: DefaultTerminal,
}

impl Renderer for TerminalRenderer {
    fn draw(&mut self, view: &GameView) -> std::io::Result<()> {
        self.terminal.draw(|frame| render(frame, view)).map(|_| ())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;

    let config = load_config(&cli)?;
    let glyphs = Arc::new(GlyphTable::default());
    let map = load_map_file(&cli.map, &glyphs)
        .with_context(|| format!("loading {}", cli.map.display()))?;
    let session = Session::new(config, map, glyphs);
    info!(seed = session.seed(), map = %cli.map.display(), "starting terminal session");

    let (tx, inputs) = mpsc::channel(16);
    let terminal = ratatui::try_init().context("entering raw mode")?;
    thread::spawn(move || read_keys(tx));

    let mut renderer = TerminalRenderer { terminal };
    let result = session.run(inputs, &mut renderer).await;
    ratatui::restore();

    let report = result?;
    match report.outcome {
        Outcome::Caught { by } => println!("Game over: caught by {by}."),
        Outcome::Quit | Outcome::InputClosed => println!("Bye."),
    }
    println!(
        "score {} | lives {} | steps {} | events {} handled, {} dropped",
        report.score, report.lives, report.steps, report.events_handled, report.events_dropped
    );
    Ok(())
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<GameConfig> {
    let mut config = match &cli.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    config.apply_overrides(cli.monster.as_deref(), cli.gate.as_deref(), cli.seed)?;
    Ok(config)
}

/// Blocking keyboard loop; runs on its own thread so the runtime never
/// waits on the terminal.
fn read_keys(tx: mpsc::Sender<InputEvent>) {
    loop {
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(err) => {
                warn!(%err, "keyboard read failed");
                return;
            }
        };
        let input = match key.code {
            KeyCode::Esc => Some(InputEvent::Quit),
            KeyCode::Char(ch) => InputEvent::from_key(ch),
            _ => None,
        };
        let Some(input) = input else {
            continue;
        };
        if tx.blocking_send(input).is_err() || input == InputEvent::Quit {
            return;
        }
    }
}

fn color(tint: Tint) -> Color {
    match tint {
        Tint::Default => Color::Reset,
        Tint::Text => Color::White,
        Tint::DarkGray => Color::DarkGray,
        Tint::Red => Color::Red,
        Tint::Green => Color::Green,
        Tint::Yellow => Color::Yellow,
        Tint::Wall => Color::Black,
        Tint::WallBackground => Color::DarkGray,
    }
}

fn render(frame: &mut Frame, view: &GameView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3), Constraint::Length(1)])
        .split(frame.area());

    let rows: Vec<Line> = (0..view.grid.height())
        .map(|y| {
            let spans: Vec<Span> = (0..view.grid.width())
                .filter_map(|x| view.cell_at(Position::new(x, y)))
                .map(|cell| {
                    Span::styled(
                        cell.symbol.to_string(),
                        Style::default().fg(color(cell.fg)).bg(color(cell.bg)),
                    )
                })
                .collect();
            Line::from(spans)
        })
        .collect();
    frame.render_widget(
        Paragraph::new(rows).block(Block::default().borders(Borders::ALL).title("grove")),
        chunks[0],
    );

    let counters = format!(
        "score {}  lives {}  jumps {}  invisible {}  enemies {}  steps {}",
        view.score, view.lives, view.double_jumps, view.invisible_steps, view.enemies, view.steps
    );
    frame.render_widget(
        Paragraph::new(vec![Line::from(view.status.as_str()), Line::from(counters)])
            .block(Block::default().borders(Borders::TOP)),
        chunks[1],
    );
    frame.render_widget(
        Paragraph::new("wasd move · WASD jump · e interact · esc quit")
            .style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}
