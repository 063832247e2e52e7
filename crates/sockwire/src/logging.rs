use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives when set.
pub const LOG_ENV: &str = "SOCKWIRE_LOG";

const SOCKWIRE_TARGETS: [&str; 5] = [
    "sockwire",
    "sockwire_transport",
    "sockwire_frame",
    "sockwire_engine",
    "sockwire_client",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Directives applying this level to our crates. HTTP and websocket
    /// dependencies stay at `warn` unless the level is stricter.
    fn directives(self) -> String {
        let deps = match self {
            LogLevel::Error => "error",
            _ => "warn",
        };
        let mut directives = vec![deps.to_string()];
        directives.extend(
            SOCKWIRE_TARGETS
                .iter()
                .map(|target| format!("{target}={}", self.as_str())),
        );
        directives.join(",")
    }
}

fn filter(level: LogLevel) -> EnvFilter {
    std::env::var(LOG_ENV)
        .ok()
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directives()))
}

/// Install the stderr subscriber. Library crates only emit events.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level))
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
