use std::fmt;
use std::io;

use sockwire_client::ClientError;
use sockwire_engine::EngineError;
use sockwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidHeader { .. } | TransportError::Unsupported(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    match err {
        EngineError::Transport(err) => transport_error(context, err),
        EngineError::Url(_) | EngineError::UnsupportedScheme(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        EngineError::Handshake(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        EngineError::Frame(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        EngineError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Engine(err) => engine_error(context, err),
        ClientError::Transport(err) => transport_error(context, err),
        ClientError::Config(_) | ClientError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ClientError::Frame(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ClientError::AckTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::Disconnected => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        ClientError::AckDropped | ClientError::SessionClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn maps_client_errors_to_exit_codes() {
        let cases = [
            (ClientError::AckTimeout(Duration::from_secs(1)), TIMEOUT),
            (ClientError::Disconnected, TRANSPORT_ERROR),
            (ClientError::Config("bad".to_string()), USAGE),
            (
                ClientError::Engine(EngineError::UnsupportedScheme("ftp".to_string())),
                USAGE,
            ),
            (
                ClientError::Transport(TransportError::Request("refused".to_string())),
                TRANSPORT_ERROR,
            ),
            (ClientError::SessionClosed, FAILURE),
        ];
        for (err, code) in cases {
            assert_eq!(client_error("ctx", err).code, code);
        }
    }

    #[test]
    fn message_carries_context() {
        let err = client_error("emit failed", ClientError::AckDropped);
        assert!(err.to_string().starts_with("emit failed: "));
    }
}
