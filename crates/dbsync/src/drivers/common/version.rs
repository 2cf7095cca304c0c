//! Server version parsing and minimum-version checks.

use std::fmt;

use crate::error::{Result, SyncError};

/// `major.minor.patch` of a database server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `major[.minor[.patch]]` of a version string, e.g.
    /// `8.0.36-28`, `10.11.6-MariaDB-log` or `14.5 (Debian 14.5-1)`.
    pub fn parse_leading(s: &str) -> Option<Self> {
        let mut parts = [0u32; 3];
        let mut found = 0;
        for (i, piece) in s.trim().split('.').take(3).enumerate() {
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts[i] = digits.parse().ok()?;
            found = i + 1;
            if digits.len() != piece.len() {
                break;
            }
        }
        if found == 0 {
            return None;
        }
        Some(Self::new(parts[0], parts[1], parts[2]))
    }

    /// Fail with `UnsupportedVersion` unless `self >= minimum`.
    pub fn require_at_least(&self, minimum: ServerVersion, engine: &str, raw: &str) -> Result<()> {
        if *self < minimum {
            return Err(SyncError::UnsupportedVersion {
                engine: engine.to_string(),
                version: raw.to_string(),
                reason: format!("minimum supported version is {}", minimum),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error for a version string that cannot be parsed at all.
pub fn unparsable(engine: &str, raw: &str) -> SyncError {
    SyncError::UnsupportedVersion {
        engine: engine.to_string(),
        version: raw.to_string(),
        reason: "could not parse version string".to_string(),
    }
}
