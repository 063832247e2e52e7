use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use sockwire_client::{client_event, Channel, Session, SessionConfig};
use sockwire_transport::TlsPolicy;
use tokio::sync::mpsc;

use crate::exit::{client_error, io_error, CliError, CliResult, INTERNAL, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod emit;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Emit one event, optionally waiting for its acknowledgement.
    Emit(EmitArgs),
    /// Connect and print received events.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    if let Command::Version(args) = command {
        return version::run(args);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(async move {
        match command {
            Command::Emit(args) => emit::run(args, format).await,
            Command::Listen(args) => listen::run(args, format).await,
            Command::Version(args) => version::run(args),
        }
    })
}

/// Options shared by every command that opens a session.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// JSON session configuration file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Never upgrade from long-polling.
    #[arg(long, conflicts_with = "websocket_only")]
    pub polling_only: bool,
    /// Connect over a websocket only.
    #[arg(long)]
    pub websocket_only: bool,
    /// Extra request header (repeatable).
    #[arg(long = "header", value_name = "K=V")]
    pub headers: Vec<String>,
    /// Cookie sent with every request (repeatable).
    #[arg(long = "cookie", value_name = "K=V")]
    pub cookies: Vec<String>,
    /// Give up instead of reconnecting when the transport drops.
    #[arg(long)]
    pub no_reconnect: bool,
    /// Reconnect attempts before giving up (-1 = unlimited).
    #[arg(long, allow_negative_numbers = true)]
    pub reconnect_attempts: Option<i64>,
    /// How long to wait for the connection (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub connect_timeout: String,
    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,
}

impl ConnectionArgs {
    pub fn session_config(&self) -> CliResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|err| {
                    io_error(&format!("failed reading {}", path.display()), err)
                })?;
                SessionConfig::from_json_str(&text)
                    .map_err(|err| client_error("invalid --config", err))?
            }
            None => SessionConfig::default(),
        };

        if self.polling_only {
            config = config.polling_only();
        }
        if self.websocket_only {
            config = config.websocket_only();
        }
        for header in &self.headers {
            let (name, value) = parse_pair("--header", header)?;
            config = config.with_header(name, value);
        }
        for cookie in &self.cookies {
            let (name, value) = parse_pair("--cookie", cookie)?;
            config = config.with_cookie(name, value);
        }
        if self.no_reconnect {
            config = config.without_reconnects();
        }
        if let Some(attempts) = self.reconnect_attempts {
            config.reconnect_attempts = attempts;
        }
        if self.insecure {
            config.tls = TlsPolicy::AcceptInvalidCerts;
        }
        config.validate().map_err(|err| client_error("invalid options", err))?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> CliResult<Duration> {
        parse_duration(&self.connect_timeout)
    }
}

#[derive(Args, Debug)]
pub struct EmitArgs {
    /// Server URL (http, https, ws or wss).
    pub url: String,
    /// Event name.
    pub event: String,
    /// JSON payload; an array is sent as separate items.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Channel path.
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Wait for an acknowledgement and print it.
    #[arg(long)]
    pub ack: bool,
    /// Maximum time to wait for the acknowledgement (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub ack_timeout: String,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Server URL (http, https, ws or wss).
    pub url: String,
    /// Channel path.
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Only print these events (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub events: Option<Vec<String>>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect `session` and return the joined channel for `path`, within
/// `timeout`.
pub async fn open_channel(session: &Session, path: &str, timeout: Duration) -> CliResult<Channel> {
    let channel = session.channel(path);
    let (tx, mut connected) = mpsc::unbounded_channel();
    channel.once(client_event::CONNECT, move |_| {
        let _ = tx.send(());
    });
    channel
        .join()
        .and_then(|()| session.connect())
        .map_err(|err| client_error("connect failed", err))?;

    let wait = async {
        session
            .wait_until_connected()
            .await
            .map_err(|err| client_error("connect failed", err))?;
        if !channel.is_connected() {
            connected
                .recv()
                .await
                .ok_or_else(|| CliError::new(INTERNAL, "session stopped while joining"))?;
        }
        Ok::<_, CliError>(())
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result.map(|()| channel),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("connect failed: no connection within {timeout:?}"),
        )),
    }
}

fn parse_pair(flag: &str, input: &str) -> CliResult<(String, String)> {
    match input.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::new(
            USAGE,
            format!("{flag} expects K=V, got {input:?}"),
        )),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
    }

    #[test]
    fn flags_override_config() {
        let args = ConnectionArgs {
            polling_only: true,
            headers: vec!["X-Token=abc".to_string()],
            cookies: vec!["sid=1".to_string()],
            no_reconnect: true,
            insecure: true,
            connect_timeout: "10s".to_string(),
            ..ConnectionArgs::default()
        };
        let config = args.session_config().unwrap();
        assert!(config.force_polling);
        assert!(!config.reconnects);
        assert_eq!(config.extra_headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(config.cookies.get("sid").map(String::as_str), Some("1"));
        assert_eq!(config.tls, TlsPolicy::AcceptInvalidCerts);
    }

    #[test]
    fn rejects_malformed_pairs_and_attempts() {
        let args = ConnectionArgs {
            headers: vec!["novalue".to_string()],
            ..ConnectionArgs::default()
        };
        assert_eq!(args.session_config().unwrap_err().code, USAGE);

        let args = ConnectionArgs {
            reconnect_attempts: Some(-5),
            ..ConnectionArgs::default()
        };
        assert_eq!(args.session_config().unwrap_err().code, USAGE);
    }
}
