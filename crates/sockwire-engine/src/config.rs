use std::fmt;

/// Request path used when none is configured.
pub const DEFAULT_ENGINE_PATH: &str = "/socket.io/";

/// Options that shape the engine's requests and transport choice.
#[derive(Clone)]
pub struct EngineConfig {
    /// Request path on the server.
    pub path: String,
    /// Never attempt the streaming-socket upgrade.
    pub force_polling: bool,
    /// Skip long-polling and handshake directly on the streaming socket.
    pub force_websockets: bool,
    /// Headers added to every request.
    pub extra_headers: Vec<(String, String)>,
    /// Cookies sent as a single `Cookie` header.
    pub cookies: Vec<(String, String)>,
    /// Extra query parameters added to every request.
    pub connect_params: Vec<(String, String)>,
    /// Ask the streaming socket for per-message compression.
    pub compress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ENGINE_PATH.to_string(),
            force_polling: false,
            force_websockets: false,
            extra_headers: Vec::new(),
            cookies: Vec::new(),
            connect_params: Vec::new(),
            compress: false,
        }
    }
}

impl EngineConfig {
    /// Header list sent with every request, including the cookie header.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.extra_headers.clone();
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_string(), cookie));
        }
        headers
    }
}

// Header and cookie values may carry credentials.
impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.extra_headers.iter().map(|(n, _)| n.as_str()).collect();
        let cookie_names: Vec<&str> = self.cookies.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("EngineConfig")
            .field("path", &self.path)
            .field("force_polling", &self.force_polling)
            .field("force_websockets", &self.force_websockets)
            .field("extra_headers", &header_names)
            .field("cookies", &cookie_names)
            .field("connect_params", &self.connect_params)
            .field("compress", &self.compress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_join_into_one_header() {
        let config = EngineConfig {
            extra_headers: vec![("X-Client".to_string(), "cli".to_string())],
            cookies: vec![
                ("session".to_string(), "s3cret".to_string()),
                ("lang".to_string(), "en".to_string()),
            ],
            ..EngineConfig::default()
        };
        assert_eq!(
            config.request_headers(),
            vec![
                ("X-Client".to_string(), "cli".to_string()),
                ("Cookie".to_string(), "session=s3cret; lang=en".to_string()),
            ]
        );
    }

    #[test]
    fn debug_hides_header_and_cookie_values() {
        let config = EngineConfig {
            extra_headers: vec![("Authorization".to_string(), "Bearer abc".to_string())],
            cookies: vec![("session".to_string(), "s3cret".to_string())],
            ..EngineConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("Bearer abc"));
        assert!(!debug.contains("s3cret"));
    }
}
