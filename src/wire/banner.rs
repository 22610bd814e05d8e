//! SSH protocol-version identification line.
//!
//! The banner is the line `SSH-<version>-<software>\r\n` a peer sends
//! unsolicited immediately after TCP connect. It is the sole handshake step
//! modeled by this crate; no key exchange follows.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Protocol version this crate speaks.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Longest banner line accepted before the peer is considered non-conformant.
///
/// RFC 4253 caps the identification string at 255 bytes including CRLF.
pub const MAX_BANNER_LEN: usize = 255;

/// Banner line shape: `SSH-<version>-<software>` with optional trailing CRLF.
static BANNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SSH-([0-9.]+)-([^\r\n ]+)(?: [^\r\n]*)?\r?\n?$").expect("valid banner regex")
});

// ============================================================================
// Banner
// ============================================================================

/// A parsed protocol-version identification line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Protocol version (`2.0` for conformant peers).
    pub version: String,

    /// Implementation identifier, e.g. `OpenSSH_9.6`.
    pub software: String,
}

impl Banner {
    /// Creates a version 2.0 banner for the given implementation id.
    #[inline]
    #[must_use]
    pub fn new(software: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            software: software.into(),
        }
    }

    /// Parses a banner line as received from the peer.
    ///
    /// Accepts the line with or without its trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the line is overlong or does not match
    /// `SSH-<version>-<software>`.
    pub fn decode(line: &str) -> Result<Self> {
        if line.len() > MAX_BANNER_LEN {
            return Err(Error::protocol(format!(
                "banner exceeds {MAX_BANNER_LEN} bytes"
            )));
        }

        let captures = BANNER_RE
            .captures(line)
            .ok_or_else(|| Error::protocol(format!("malformed banner: {line:?}")))?;

        Ok(Self {
            version: captures[1].to_string(),
            software: captures[2].to_string(),
        })
    }

    /// Encodes the banner as the wire line, including the trailing CRLF.
    #[inline]
    #[must_use]
    pub fn encode(&self) -> String {
        format!("SSH-{}-{}\r\n", self.version, self.software)
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH-{}-{}", self.version, self.software)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_crlf() {
        let banner = Banner::decode("SSH-2.0-OpenSSH_9.6\r\n").expect("decode");
        assert_eq!(banner.version, "2.0");
        assert_eq!(banner.software, "OpenSSH_9.6");
    }

    #[test]
    fn test_decode_without_line_ending() {
        let banner = Banner::decode("SSH-2.0-mockssh").expect("decode");
        assert_eq!(banner.software, "mockssh");
    }

    #[test]
    fn test_decode_with_comment() {
        // RFC 4253 allows a space-separated comment after the software id.
        let banner = Banner::decode("SSH-2.0-OpenSSH_9.6 Ubuntu-3\r\n").expect("decode");
        assert_eq!(banner.software, "OpenSSH_9.6");
    }

    #[test]
    fn test_roundtrip() {
        let banner = Banner::new("termbridge_0.1");
        let line = banner.encode();
        assert_eq!(line, "SSH-2.0-termbridge_0.1\r\n");
        assert_eq!(Banner::decode(&line).expect("decode"), banner);
    }

    #[test]
    fn test_malformed_banner_rejected() {
        assert!(Banner::decode("HTTP/1.1 200 OK\r\n").is_err());
        assert!(Banner::decode("SSH-").is_err());
        assert!(Banner::decode("").is_err());
    }

    #[test]
    fn test_overlong_banner_rejected() {
        let line = format!("SSH-2.0-{}\r\n", "x".repeat(300));
        let err = Banner::decode(&line).unwrap_err();
        assert!(err.is_protocol());
    }
}
