//! Logging setup for wbcrawl.
//!
//! All diagnostics go to stderr through `tracing`, so stdout stays reserved for
//! crawl output (text, JSON, or JSON lines).
//!
//! ```rust
//! use wbcrawl::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Crawler started");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include the module path in log output.
    pub target: bool,
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// Single line per event.
    Compact,
    /// Single line with thread, file and line details.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: true,
            target: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            colors: true,
        }
    }

    /// Map a `-v` count to a configuration: 1 shows page progress, 2 shows
    /// skipped cards and fetches, 3 and above traces every record.
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::default(),
            1 => Self {
                level: LogLevel::Info,
                ..Self::default()
            },
            2 => Self {
                level: LogLevel::Debug,
                target: true,
                ..Self::default()
            },
            _ => Self {
                level: LogLevel::Trace,
                format: LogFormat::Full,
                target: true,
                ..Self::default()
            },
        }
    }

    #[must_use]
    pub const fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }
}

impl LogLevel {
    /// Convert to env filter directive string.
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    // RUST_LOG wins when set
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("wbcrawl={}", level.to_filter_string()))
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = env_filter(config.level);
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => {
            let layer = base.pretty();
            tracing_subscriber::registry().with(filter).with(layer).try_init().ok();
        }
        (LogFormat::Pretty, false) => {
            let layer = base.pretty().without_time();
            tracing_subscriber::registry().with(filter).with(layer).try_init().ok();
        }
        (LogFormat::Compact, true) => {
            let layer = base.compact();
            tracing_subscriber::registry().with(filter).with(layer).try_init().ok();
        }
        (LogFormat::Compact, false) => {
            let layer = base.compact().without_time();
            tracing_subscriber::registry().with(filter).with(layer).try_init().ok();
        }
        (LogFormat::Full, _) => {
            let layer = base
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry().with(filter).with(layer).try_init().ok();
        }
    }
}

/// Initialize logging for the command line.
pub fn init_cli_logging(quiet: bool, verbosity: u8, colors: bool) {
    let config = if quiet {
        LogConfig::quiet()
    } else {
        LogConfig::from_verbosity(verbosity)
    };
    init_logging(&config.with_colors(colors));
}
