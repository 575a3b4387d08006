use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beach_cells::client::surface::HeadlessSurface;
use beach_cells::client::tui::{self, TuiSurface};
use beach_cells::client::ViewSurface;
use beach_cells::config::{self, ClientConfig, ConfigError};
use beach_cells::session::{CellSession, SessionError, UiEvent};
use beach_cells::telemetry::logging::{self as logctl, LogConfig, LogLevel};
use beach_cells::transport::websocket::WebSocketConnector;
use clap::{Args, Parser};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config(cli.headless);
    logctl::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let config = cli.to_config()?;
    info!(
        server = %config.server,
        max_retries = config.max_retries,
        headless = cli.headless,
        "starting beach-cells"
    );
    let connector = Arc::new(WebSocketConnector::new());
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    if cli.headless {
        let surface = HeadlessSurface::new(cli.width, cli.height);
        let mut session = CellSession::new(&config, connector, surface)?;
        spawn_stdin_listener(ui_tx);
        session.run(ui_rx).await?;
        let status = session.status();
        println!(
            "{} • {} checked of {}",
            status.connection, status.checked, status.total
        );
        return Ok(());
    }

    let surface = TuiSurface::enter()?;
    let size = surface.measure();
    let mut session = CellSession::new(&config, connector, surface)?;
    if ui_tx
        .send(UiEvent::Resize {
            width: size.width,
            height: size.height,
        })
        .is_err()
    {
        debug!(target = "main", "initial resize dropped; ui channel closed");
    }
    tui::spawn_input_listener(ui_tx);
    let outcome = session.run(ui_rx).await;
    let mut surface = session.into_surface();
    surface.restore()?;
    outcome?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "beach-cells",
    about = "Live terminal view of a shared grid of checkboxes",
    author,
    version
)]
struct Cli {
    #[arg(
        long,
        env = "BEACH_CELLS_SERVER",
        default_value = config::DEFAULT_SERVER,
        help = "Page or server URL; the socket address is derived from it"
    )]
    server: String,

    #[arg(long, default_value_t = 15, help = "Reconnection attempts before giving up")]
    max_retries: u32,

    #[arg(
        long = "retry-delay-ms",
        default_value_t = 300,
        help = "Base reconnect delay; attempt n waits n times this"
    )]
    retry_delay_ms: u64,

    #[arg(long, default_value_t = 4, help = "Cell width in terminal columns")]
    cell_width: u16,

    #[arg(long, default_value_t = 1, help = "Cell height in terminal rows")]
    cell_height: u16,

    #[arg(long, default_value_t = 0, help = "Extra pooled rows below the viewport")]
    overscan_rows: u16,

    #[arg(long = "frame-interval-ms", default_value_t = 16)]
    frame_interval_ms: u64,

    #[arg(long, help = "Run without the terminal UI; commands are read from stdin")]
    headless: bool,

    #[arg(long, default_value_t = 80, help = "Headless surface width")]
    width: u32,

    #[arg(long, default_value_t = 24, help = "Headless surface height")]
    height: u32,

    #[command(flatten)]
    logging: LoggingArgs,
}

impl Cli {
    fn to_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::with_server(&self.server)?;
        config.max_retries = self.max_retries;
        config.retry_delay = Duration::from_millis(self.retry_delay_ms);
        config.cell_width = self.cell_width.max(1);
        config.cell_height = self.cell_height.max(1);
        config.overscan_rows = self.overscan_rows;
        config.frame_interval = Duration::from_millis(self.frame_interval_ms.max(1));
        config.socket_url()?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "BEACH_CELLS_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "BEACH_CELLS_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

impl LoggingArgs {
    /// The terminal UI owns stdout and stderr, so it logs to a file even when
    /// none was given.
    fn to_config(&self, headless: bool) -> LogConfig {
        let file = match (&self.file, headless) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => None,
            (None, false) => Some(std::env::temp_dir().join("beach-cells.log")),
        };
        LogConfig {
            level: self.level,
            file,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging init failed: {0}")]
    Logging(String),
}

/// Headless driver: one command per line, EOF quits.
fn spawn_stdin_listener(events: mpsc::UnboundedSender<UiEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let Some(event) = parse_command(&line) else {
                eprintln!("unrecognized command: {line:?} (t INDEX 0|1, s OFFSET, r W H, q)");
                continue;
            };
            if events.send(event).is_err() || event == UiEvent::Quit {
                break;
            }
        }
    })
}

fn parse_command(line: &str) -> Option<UiEvent> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let mut number = || parts.next()?.parse::<u64>().ok();
    let event = match command {
        "q" | "quit" => UiEvent::Quit,
        "t" | "toggle" => {
            let index = number()? as usize;
            let value = number()? != 0;
            UiEvent::Toggle { index, value }
        }
        "s" | "scroll" => UiEvent::Scroll {
            offset: u32::try_from(number()?).ok()?,
        },
        "r" | "resize" => UiEvent::Resize {
            width: u32::try_from(number()?).ok()?,
            height: u32::try_from(number()?).ok()?,
        },
        _ => return None,
    };
    Some(event)
}
