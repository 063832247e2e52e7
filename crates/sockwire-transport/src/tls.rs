use serde::{Deserialize, Serialize};

/// Certificate verification policy handed to the native collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Verify against the platform/webpki roots.
    #[default]
    Verify,
    /// Accept any certificate. Only meant for local development servers.
    AcceptInvalidCerts,
    /// Trust only the listed PEM certificates.
    Pinned { certificates: Vec<String> },
}

impl TlsPolicy {
    /// True when the policy deviates from default root verification.
    pub fn is_custom(&self) -> bool {
        !matches!(self, TlsPolicy::Verify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_modes() {
        let verify: TlsPolicy = serde_json::from_str(r#"{"mode":"verify"}"#).unwrap();
        assert_eq!(verify, TlsPolicy::Verify);
        assert!(!verify.is_custom());

        let pinned: TlsPolicy =
            serde_json::from_str(r#"{"mode":"pinned","certificates":["-----BEGIN"]}"#).unwrap();
        assert_eq!(
            pinned,
            TlsPolicy::Pinned {
                certificates: vec!["-----BEGIN".to_string()]
            }
        );
        assert!(pinned.is_custom());
    }
}
