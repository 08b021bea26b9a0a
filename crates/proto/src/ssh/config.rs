//! Mock server configuration.
//!
//! Configuration can be built in code with [`MockServerConfig::builder`] or
//! loaded from TOML. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! listen_addr = "127.0.0.1:2222"
//! server_version = "MockServer_1.0"
//! channel_id_policy = "mirror_peer"      # or "fixed_zero"
//! unknown_message_policy = "ignore"      # or "unimplemented", "disconnect"
//! max_identification_length = 255
//! max_packet_length = 35000
//!
//! [auth_markers]
//! probe = "pubkey_probe"
//! signed = "signed_request"
//! ```

use crate::ssh::auth::AuthMarkers;
use crate::ssh::channel::ChannelIdPolicy;
use crate::ssh::packet::{HEADER_LEN, MAX_PACKET_SIZE};
use crate::ssh::version::MOCK_SOFTWARE;
use mirage_platform::{MirageError, MirageResult};
use serde::Deserialize;
use std::path::Path;

/// Default listening endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:2222";

/// Default cap on the peer identification line, CR LF included (RFC 4253 Section 4.2).
pub const DEFAULT_MAX_IDENTIFICATION_LENGTH: usize = 255;

/// What to do with a message type the mock has no policy for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnknownMessagePolicy {
    /// Consume it silently; the connection stays open.
    #[default]
    Ignore,
    /// Answer SSH_MSG_UNIMPLEMENTED with the packet's sequence number.
    Unimplemented,
    /// Send SSH_MSG_DISCONNECT (protocol error) and close.
    Disconnect,
}

/// Mock server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockServerConfig {
    /// Address the acceptor binds to.
    pub listen_addr: String,
    /// Software id in our identification line (`SSH-2.0-<id>`).
    pub server_version: String,
    /// Local channel id allocation.
    pub channel_id_policy: ChannelIdPolicy,
    /// Handling of message types without a mock policy.
    pub unknown_message_policy: UnknownMessagePolicy,
    /// Longest accepted peer identification line, CR LF included.
    pub max_identification_length: usize,
    /// Largest accepted `total_length` of an inbound packet.
    pub max_packet_length: usize,
    /// Substrings used to classify authentication requests.
    pub auth_markers: AuthMarkers,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            server_version: MOCK_SOFTWARE.to_string(),
            channel_id_policy: ChannelIdPolicy::default(),
            unknown_message_policy: UnknownMessagePolicy::default(),
            max_identification_length: DEFAULT_MAX_IDENTIFICATION_LENGTH,
            max_packet_length: MAX_PACKET_SIZE,
            auth_markers: AuthMarkers::default(),
        }
    }
}

impl MockServerConfig {
    /// Create builder for server configuration
    pub fn builder() -> MockServerConfigBuilder {
        MockServerConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> MirageResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| MirageError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> MirageResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            MirageError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate configuration
    pub fn validate(&self) -> MirageResult<()> {
        if self.listen_addr.is_empty() {
            return Err(MirageError::Config("listen_addr cannot be empty".into()));
        }
        if self.server_version.is_empty() {
            return Err(MirageError::Config("server_version cannot be empty".into()));
        }
        if self
            .server_version
            .chars()
            .any(|c| c == '\r' || c == '\n' || c == ' ' || c == '-')
        {
            return Err(MirageError::Config(format!(
                "server_version '{}' may not contain spaces, dashes or line breaks",
                self.server_version.escape_default()
            )));
        }
        if self.max_identification_length < 3 {
            return Err(MirageError::Config(
                "max_identification_length must leave room for a CR LF terminated line".into(),
            ));
        }
        if self.max_packet_length < HEADER_LEN {
            return Err(MirageError::Config(format!(
                "max_packet_length must be at least {}",
                HEADER_LEN
            )));
        }
        Ok(())
    }
}

/// Builder for [`MockServerConfig`]
#[derive(Debug, Default)]
pub struct MockServerConfigBuilder {
    config: MockServerConfig,
}

impl MockServerConfigBuilder {
    /// Set listening address
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set software id sent in the identification line
    pub fn with_server_version(mut self, software: impl Into<String>) -> Self {
        self.config.server_version = software.into();
        self
    }

    /// Set channel id policy
    pub fn with_channel_id_policy(mut self, policy: ChannelIdPolicy) -> Self {
        self.config.channel_id_policy = policy;
        self
    }

    /// Set unknown message policy
    pub fn with_unknown_message_policy(mut self, policy: UnknownMessagePolicy) -> Self {
        self.config.unknown_message_policy = policy;
        self
    }

    /// Set identification line limit
    pub fn with_max_identification_length(mut self, len: usize) -> Self {
        self.config.max_identification_length = len;
        self
    }

    /// Set inbound packet size limit
    pub fn with_max_packet_length(mut self, len: usize) -> Self {
        self.config.max_packet_length = len;
        self
    }

    /// Set authentication markers
    pub fn with_auth_markers(mut self, markers: AuthMarkers) -> Self {
        self.config.auth_markers = markers;
        self
    }

    /// Build and validate configuration
    pub fn build(self) -> MirageResult<MockServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MockServerConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:2222");
        assert_eq!(config.server_version, "MockServer_1.0");
        assert_eq!(config.channel_id_policy, ChannelIdPolicy::MirrorPeer);
        assert_eq!(config.unknown_message_policy, UnknownMessagePolicy::Ignore);
        assert_eq!(config.max_identification_length, 255);
        assert_eq!(config.max_packet_length, 35000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MockServerConfig::builder()
            .with_listen_addr("127.0.0.1:0")
            .with_channel_id_policy(ChannelIdPolicy::FixedZero)
            .with_unknown_message_policy(UnknownMessagePolicy::Unimplemented)
            .build()
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.channel_id_policy, ChannelIdPolicy::FixedZero);
        assert_eq!(
            config.unknown_message_policy,
            UnknownMessagePolicy::Unimplemented
        );
    }

    #[test]
    fn test_builder_rejects_bad_version() {
        let result = MockServerConfig::builder()
            .with_server_version("Mock Server")
            .build();
        assert!(matches!(result, Err(MirageError::Config(_))));

        let result = MockServerConfig::builder()
            .with_server_version("Mock\r\nInjected")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_limits() {
        assert!(MockServerConfig::builder()
            .with_max_identification_length(2)
            .build()
            .is_err());
        assert!(MockServerConfig::builder()
            .with_max_packet_length(4)
            .build()
            .is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = MockServerConfig::from_toml_str(
            r#"
            channel_id_policy = "fixed_zero"
            unknown_message_policy = "disconnect"

            [auth_markers]
            probe = "probe!"
            "#,
        )
        .unwrap();
        assert_eq!(config.channel_id_policy, ChannelIdPolicy::FixedZero);
        assert_eq!(
            config.unknown_message_policy,
            UnknownMessagePolicy::Disconnect
        );
        assert_eq!(config.auth_markers.probe, "probe!");
        assert_eq!(config.auth_markers.signed, "signed_request");
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_from_toml_empty() {
        assert_eq!(
            MockServerConfig::from_toml_str("").unwrap(),
            MockServerConfig::default()
        );
    }

    #[test]
    fn test_from_toml_rejects_unknown_field() {
        let result = MockServerConfig::from_toml_str("listen = \"x\"");
        assert!(matches!(result, Err(MirageError::Config(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:2200\"").unwrap();
        let config = MockServerConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:2200");
    }

    #[test]
    fn test_load_missing_file() {
        let result = MockServerConfig::load("/nonexistent/mirage.toml");
        assert!(matches!(result, Err(MirageError::Config(_))));
    }

    #[test]
    fn test_policy_cli_values() {
        use clap::ValueEnum;

        assert_eq!(
            UnknownMessagePolicy::from_str("unimplemented", false),
            Ok(UnknownMessagePolicy::Unimplemented)
        );
        let names: Vec<String> = UnknownMessagePolicy::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["ignore", "unimplemented", "disconnect"]);
        assert!(UnknownMessagePolicy::from_str("explode", false).is_err());
    }
}
