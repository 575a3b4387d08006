//! Global `tracing` subscriber for the client.
//!
//! Level comes from `--log-level`; `BEACH_CELLS_LOG_FILTER` replaces the
//! computed directives entirely. At trace level the WebSocket and I/O
//! dependencies are held at info unless `BEACH_CELLS_TRACE_DEPS` is set.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Crate-scoped directives: verbose levels raise only `beach_cells`.
    fn directives(self) -> String {
        match self {
            LogLevel::Debug | LogLevel::Trace => format!("info,beach_cells={}", self.as_str()),
            other => other.as_str().to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

const NOISY_DEPENDENCIES: &[&str] = &["tokio_tungstenite", "tungstenite", "mio", "native_tls"];

/// The filter directives actually installed, and whether dependency traces
/// were held back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPlan {
    pub directives: String,
    pub throttled: bool,
}

impl FilterPlan {
    pub fn resolve(level: LogLevel, custom: Option<String>, allow_deps: bool) -> Self {
        if let Some(directives) = custom {
            return Self {
                directives,
                throttled: false,
            };
        }
        let mut directives = level.directives();
        let throttled = level == LogLevel::Trace && !allow_deps;
        if throttled {
            for target in NOISY_DEPENDENCIES {
                directives.push_str(&format!(",{target}=info"));
            }
        }
        Self {
            directives,
            throttled,
        }
    }

    fn from_env(level: LogLevel) -> Self {
        Self::resolve(
            level,
            std::env::var("BEACH_CELLS_LOG_FILTER").ok(),
            super::env_truthy("BEACH_CELLS_TRACE_DEPS").unwrap_or(false),
        )
    }
}

/// Holds the appender guard for the life of the process; set once.
static WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn open_writer(file: Option<&Path>) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let Some(path) = file else {
        return Ok(tracing_appender::non_blocking(std::io::stderr()));
    };
    let handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| InitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(tracing_appender::non_blocking(handle))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if WRITER_GUARD.get().is_some() {
        return Ok(());
    }
    let plan = FilterPlan::from_env(config.level);
    let (writer, guard) = open_writer(config.file.as_deref())?;
    let verbose = config.level >= LogLevel::Debug;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&plan.directives))
        .with_target(verbose)
        .with_thread_ids(config.level == LogLevel::Trace)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;

    let _ = WRITER_GUARD.set(guard);
    if plan.throttled {
        eprintln!(
            "[beach-cells] dependency traces held at info; set BEACH_CELLS_TRACE_DEPS=1 or BEACH_CELLS_LOG_FILTER to override"
        );
    }
    Ok(())
}

/// Offset, hex and printable columns, sixteen bytes per line.
pub fn hexdump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(line, chunk)| hexdump_line(line * 16, chunk))
        .collect()
}

fn hexdump_line(offset: usize, chunk: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = format!("{offset:08x}  ");
    for slot in 0..16 {
        if slot == 8 {
            out.push(' ');
        }
        match chunk.get(slot) {
            Some(byte) => {
                let _ = write!(out, "{byte:02x} ");
            }
            None => out.push_str("   "),
        }
    }
    out.push(' ');
    out.extend(chunk.iter().map(|&byte| match byte {
        0x20..=0x7e => byte as char,
        _ => '.',
    }));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_plan_throttles_dependencies() {
        let plan = FilterPlan::resolve(LogLevel::Trace, None, false);
        assert!(plan.throttled);
        assert!(plan.directives.starts_with("info,beach_cells=trace"));
        assert!(plan.directives.contains(",tungstenite=info"));

        let plan = FilterPlan::resolve(LogLevel::Trace, None, true);
        assert_eq!(plan.directives, "info,beach_cells=trace");
        assert!(!plan.throttled);

        assert_eq!(FilterPlan::resolve(LogLevel::Warn, None, false).directives, "warn");
        assert_eq!(
            FilterPlan::resolve(LogLevel::Debug, None, false).directives,
            "info,beach_cells=debug"
        );
    }

    #[test]
    fn custom_filter_wins() {
        let plan = FilterPlan::resolve(LogLevel::Trace, Some("beach_cells::session=trace".into()), false);
        assert_eq!(plan.directives, "beach_cells::session=trace");
        assert!(!plan.throttled);
    }

    #[test]
    fn hexdump_formats_columns() {
        let dump = hexdump(&[0x21, 0x05, 0x00, 0x41]);
        assert_eq!(dump.lines().count(), 1);
        assert!(dump.starts_with("00000000  21 05 00 41 "));
        assert!(dump.trim_end().ends_with("!..A"));
        let two = hexdump(&[0u8; 17]);
        assert_eq!(two.lines().count(), 2);
        assert!(two.lines().nth(1).unwrap().starts_with("00000010  00 "));
        assert!(hexdump(&[]).is_empty());
    }
}
