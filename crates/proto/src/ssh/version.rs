//! SSH identification lines (RFC 4253 Section 4.2).
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! The mock accepts whatever line the peer sends; [`Version::parse`] is only
//! used to pull the software name out for logs. The line we send is built
//! from the configured software id, `SSH-2.0-MockServer_1.0` by default.
//!
//! # Example
//!
//! ```rust
//! use mirage_proto::ssh::version::Version;
//!
//! let version = Version::new("MockServer_1.0", None);
//! assert_eq!(version.to_wire_format(), b"SSH-2.0-MockServer_1.0\r\n");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_8.9");
//! ```

use mirage_platform::{MirageError, MirageResult};

/// Default software id of the mock server.
pub const MOCK_SOFTWARE: &str = "MockServer_1.0";

/// Line terminator for identification strings.
pub const CRLF: &[u8] = b"\r\n";

/// SSH protocol version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
}

impl Version {
    /// Creates a new version with protocol version "2.0".
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// The mock server's own identification.
    pub fn mock() -> Self {
        Self::new(MOCK_SOFTWARE, None)
    }

    /// Parses an identification line, with or without CR LF.
    ///
    /// # Errors
    ///
    /// Returns [`MirageError::Protocol`] if the line does not start with
    /// `SSH-` or lacks a software version. Protocol versions other than 2.0
    /// are accepted; the mock does not negotiate.
    pub fn parse(line: &str) -> MirageResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        let rest = line.strip_prefix("SSH-").ok_or_else(|| {
            MirageError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            ))
        })?;

        let (proto_version, rest) = rest.split_once('-').ok_or_else(|| {
            MirageError::Protocol(format!("Invalid version string format: '{}'", line))
        })?;

        let (software_version, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments.trim().to_string())),
            None => (rest, None),
        };

        if software_version.is_empty() {
            return Err(MirageError::Protocol(format!(
                "Missing software version: '{}'",
                line
            )));
        }

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version: software_version.to_string(),
            comments,
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version.
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> Vec<u8> {
        let mut line = self.to_string().into_bytes();
        line.extend_from_slice(CRLF);
        line
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::mock()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_wire_format() {
        assert_eq!(Version::mock().to_wire_format(), b"SSH-2.0-MockServer_1.0\r\n");
        assert_eq!(Version::default(), Version::mock());
    }

    #[test]
    fn test_version_parse() {
        let version = Version::parse("SSH-2.0-Test\r\n").unwrap();
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "Test");
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
    }

    #[test]
    fn test_version_parse_old_protocol_accepted() {
        let version = Version::parse("SSH-1.99-Legacy").unwrap();
        assert_eq!(version.proto_version(), "1.99");
    }

    #[test]
    fn test_version_parse_invalid_prefix() {
        assert!(matches!(
            Version::parse("HELLO-2.0-Test"),
            Err(MirageError::Protocol(_))
        ));
    }

    #[test]
    fn test_version_parse_missing_software() {
        assert!(Version::parse("SSH-2.0-").is_err());
        assert!(Version::parse("SSH-2.0").is_err());
    }

    #[test]
    fn test_version_round_trip() {
        let original = Version::new("Mirage_0.1.0", Some("test"));
        let parsed = Version::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }
}
