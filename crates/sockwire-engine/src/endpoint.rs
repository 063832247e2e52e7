use url::Url;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Protocol revision spoken by the engine.
pub const PROTOCOL_REVISION: &str = "3";

/// Builds the polling and streaming-socket URLs for one server.
#[derive(Debug, Clone)]
pub struct EngineUrls {
    polling: Url,
    websocket: Url,
}

impl EngineUrls {
    /// Accepts `http`, `https`, `ws` and `wss` server URLs. The configured
    /// path replaces any path in `server`; the query is rebuilt.
    pub fn new(server: &str, config: &EngineConfig) -> Result<Self> {
        let base = Url::parse(server)?;
        let (poll_scheme, ws_scheme) = match base.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => return Err(EngineError::UnsupportedScheme(other.to_string())),
        };

        let mut polling = base.clone();
        set_scheme(&mut polling, poll_scheme)?;
        polling.set_path(&config.path);
        polling.set_query(None);
        polling.set_fragment(None);

        let mut websocket = polling.clone();
        set_scheme(&mut websocket, ws_scheme)?;

        append_query(&mut polling, "polling", true, &config.connect_params);
        append_query(&mut websocket, "websocket", false, &config.connect_params);

        Ok(Self { polling, websocket })
    }

    /// Long-poll URL, with the session id once one is known.
    pub fn polling(&self, sid: Option<&str>) -> String {
        with_sid(&self.polling, sid)
    }

    /// Streaming-socket URL, with the session id once one is known.
    pub fn websocket(&self, sid: Option<&str>) -> String {
        with_sid(&self.websocket, sid)
    }
}

// `Url::set_scheme` refuses special/non-special switches; http<->ws are both special.
fn set_scheme(url: &mut Url, scheme: &str) -> Result<()> {
    url.set_scheme(scheme)
        .map_err(|()| EngineError::UnsupportedScheme(scheme.to_string()))
}

fn append_query(url: &mut Url, transport: &str, b64: bool, params: &[(String, String)]) {
    let mut query = url.query_pairs_mut();
    query.append_pair("EIO", PROTOCOL_REVISION);
    query.append_pair("transport", transport);
    if b64 {
        query.append_pair("b64", "1");
    }
    for (name, value) in params {
        query.append_pair(name, value);
    }
}

fn with_sid(url: &Url, sid: Option<&str>) -> String {
    match sid {
        Some(sid) => {
            let mut url = url.clone();
            url.query_pairs_mut().append_pair("sid", sid);
            url.into()
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_polling_and_websocket_urls() {
        let config = EngineConfig {
            connect_params: vec![("token".to_string(), "a b".to_string())],
            ..EngineConfig::default()
        };
        let urls = EngineUrls::new("https://example.com:8443/ignored?x=1", &config).unwrap();
        assert_eq!(
            urls.polling(None),
            "https://example.com:8443/socket.io/?EIO=3&transport=polling&b64=1&token=a+b"
        );
        assert_eq!(
            urls.websocket(Some("abc")),
            "wss://example.com:8443/socket.io/?EIO=3&transport=websocket&token=a+b&sid=abc"
        );
    }

    #[test]
    fn custom_path_and_ws_scheme() {
        let config = EngineConfig {
            path: "/realtime/".to_string(),
            ..EngineConfig::default()
        };
        let urls = EngineUrls::new("ws://localhost:3000", &config).unwrap();
        assert_eq!(
            urls.polling(Some("s1")),
            "http://localhost:3000/realtime/?EIO=3&transport=polling&b64=1&sid=s1"
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = EngineUrls::new("ftp://example.com", &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedScheme(_)));
        assert!(matches!(
            EngineUrls::new("not a url", &EngineConfig::default()),
            Err(EngineError::Url(_))
        ));
    }
}
