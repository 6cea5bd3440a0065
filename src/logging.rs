//! Tracing setup
//!
//! Terminal output always goes to stderr: in stdio mode stdout carries the
//! JSON-RPC stream and must stay clean.
//!
//! Levels: default WARN, `-v` INFO, `-d` DEBUG, `-q` ERROR, `-s` off.
//! `RUST_LOG` is honoured only when none of those flags is given.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
    /// Compact single-line format
    Compact,
}

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,
    pub format: LogFormat,
    /// Receives DEBUG logs regardless of the terminal level
    pub log_file: Option<PathBuf>,
}

impl TracingConfig {
    fn explicit(&self) -> bool {
        self.verbose || self.debug || self.quiet || self.silent
    }

    /// Terminal level, `None` when silent
    fn terminal_level(&self) -> Option<Level> {
        if self.silent {
            None
        } else if self.quiet {
            Some(Level::ERROR)
        } else if self.debug {
            Some(Level::DEBUG)
        } else if self.verbose {
            Some(Level::INFO)
        } else {
            Some(Level::WARN)
        }
    }
}

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Our own targets at `level`, dependencies at WARN
fn directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("asrai_mcp={level},mcp={level},warn")
}

fn terminal_filter(level: Level, explicit: bool) -> EnvFilter {
    if explicit {
        EnvFilter::new(directives(level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)))
    }
}

fn terminal_layer(format: &LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(path: &PathBuf) -> Option<BoxedLayer> {
    let file = match std::fs::File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Failed to create log file {:?}: {}", path, e);
            return None;
        }
    };
    Some(
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(file)
            .with_filter(EnvFilter::new(directives(Level::DEBUG)))
            .boxed(),
    )
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(config: TracingConfig) {
    if TRACING_INITIALIZED.set(()).is_err() {
        return;
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if let Some(layer) = config.log_file.as_ref().and_then(file_layer) {
        layers.push(layer);
    }
    if let Some(level) = config.terminal_level() {
        layers.push(terminal_layer(&config.format, terminal_filter(level, config.explicit())));
    }

    // Another subscriber may already be installed (tests); that is fine
    let _ = tracing_subscriber::registry().with(layers).try_init();
}
