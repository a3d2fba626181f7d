//! Configuration types for a call session

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default rendezvous endpoint used by the room client
pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:4531/vc";

/// Default public STUN endpoint
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Main configuration for a call session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Which side creates the offer
    pub role: CallRole,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Negotiation role of this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    /// Sends the offer once signaling is open and on every renegotiation
    #[default]
    Caller,
    /// Waits for the remote offer and answers it
    Callee,
}

impl CallRole {
    /// Whether this side initiates offers
    pub fn initiates_offer(&self) -> bool {
        matches!(self, CallRole::Caller)
    }
}

impl std::str::FromStr for CallRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "caller" => Ok(CallRole::Caller),
            "callee" => Ok(CallRole::Callee),
            other => Err(Error::InvalidConfig(format!(
                "role must be 'caller' or 'callee', got {}",
                other
            ))),
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            turn_servers: Vec::new(),
            role: CallRole::Caller,
        }
    }
}

impl CallConfig {
    /// Create a configuration for the given signaling URL with defaults elsewhere
    pub fn with_signaling_url(signaling_url: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            ..Default::default()
        }
    }

    /// Load a configuration file (YAML, or JSON since it is a YAML subset)
    ///
    /// Missing fields fall back to their defaults. The result is validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: CallConfig = serde_yaml::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a valid ws:// or wss:// URL
    /// - `stun_servers` is empty or contains a non-STUN URL
    /// - a TURN entry does not use a turn:/turns: URL
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.signaling_url).map_err(|e| {
            Error::InvalidConfig(format!(
                "signaling_url is not a valid URL ({}): {}",
                self.signaling_url, e
            ))
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .stun_servers
            .iter()
            .find(|s| !s.starts_with("stun:") && !s.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must use stun: or stuns:, got {}",
                bad
            )));
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server must use turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = CallConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signaling_url, "ws://localhost:4531/vc");
        assert_eq!(config.role, CallRole::Caller);
    }

    #[test]
    fn test_rejects_http_signaling_url() {
        let config = CallConfig::with_signaling_url("http://localhost:4531/vc");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_garbage_signaling_url() {
        let config = CallConfig::with_signaling_url("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_requires_stun_server() {
        let config = CallConfig {
            stun_servers: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CallConfig {
            stun_servers: vec!["turn:example.org".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_turn_url() {
        let config = CallConfig {
            turn_servers: vec![TurnServerConfig {
                url: "stun:example.org".to_string(),
                username: "u".to_string(),
                credential: "c".to_string(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Callee".parse::<CallRole>().unwrap(), CallRole::Callee);
        assert!("observer".parse::<CallRole>().is_err());
        assert!(CallRole::Caller.initiates_offer());
        assert!(!CallRole::Callee.initiates_offer());
    }

    #[test]
    fn test_from_yaml_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "signaling_url: wss://rooms.example.org/vc").unwrap();
        writeln!(file, "role: callee").unwrap();

        let config = CallConfig::from_file(file.path()).unwrap();
        assert_eq!(config.signaling_url, "wss://rooms.example.org/vc");
        assert_eq!(config.role, CallRole::Callee);
        assert_eq!(config.stun_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert!(config.turn_servers.is_empty());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stun_servers": ["stun:stun.example.org:3478"], "role": "callee"}}"#
        )
        .unwrap();

        let config = CallConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stun_servers, vec!["stun:stun.example.org:3478"]);
        assert_eq!(config.role, CallRole::Callee);
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "signaling_url: ftp://example.org").unwrap();
        assert!(CallConfig::from_file(file.path()).is_err());
    }
}
