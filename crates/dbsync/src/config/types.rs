//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drivers::EngineKind;
use crate::error::Result;
use crate::sync::DEFAULT_WINDOW_SIZE;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection rows are read from.
    pub source: ConnectionConfig,

    /// Connection that is brought in line with the source.
    pub destination: ConnectionConfig,

    /// Sync behavior configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// One database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type: mysql, mariadb or postgres.
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306 for mysql/mariadb, 5432 for postgres).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema (postgres only, default: "public").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,

    /// Pool size. One connection is pinned for statements (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl ConnectionConfig {
    pub fn kind(&self) -> Result<EngineKind> {
        EngineKind::parse(&self.r#type)
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            self.kind()
                .map(|k| k.default_port())
                .unwrap_or(EngineKind::Mysql.default_port())
        })
    }

    pub fn effective_ssl_mode(&self) -> String {
        match &self.ssl_mode {
            Some(mode) => mode.clone(),
            None => self
                .kind()
                .map(|k| k.default_ssl_mode())
                .unwrap_or("prefer")
                .to_string(),
        }
    }

    pub fn effective_schema(&self) -> String {
        self.schema.clone().unwrap_or_else(|| "public".to_string())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tables to sync. Empty means every base table of the source.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Tables to skip (patterns with '*' wildcards).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Target row count per window (default: 1000).
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Execute statements or only generate them (default: execute).
    #[serde(default)]
    pub mode: SyncMode,

    /// Run the destination's integrity-check hooks around mutations (default: true).
    #[serde(default = "default_true")]
    pub disable_integrity_checks: bool,

    /// Keep going with the next table after a table fails (default: true).
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            exclude_tables: Vec::new(),
            window_size: default_window_size(),
            mode: SyncMode::default(),
            disable_integrity_checks: true,
            continue_on_error: true,
        }
    }
}

impl SyncConfig {
    /// Whether `table` survives the exclusion patterns.
    pub fn includes(&self, table: &str) -> bool {
        !self
            .exclude_tables
            .iter()
            .any(|pattern| matches_pattern(pattern, table))
    }
}

/// How generated statements are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Apply each statement to the destination as it is produced.
    #[default]
    Execute,
    /// Collect statements without touching the destination.
    Generate,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Execute => f.write_str("execute"),
            SyncMode::Generate => f.write_str("generate"),
        }
    }
}

/// Case-insensitive match where '*' stands for any run of characters.
pub(crate) fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((sp, sn)) = star {
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

fn default_max_connections() -> usize {
    4
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("audit_*", "audit_log"));
        assert!(matches_pattern("*_tmp", "Orders_TMP"));
        assert!(matches_pattern("a*b*c", "axxbyyc"));
        assert!(matches_pattern("users", "users"));
        assert!(!matches_pattern("users", "users2"));
        assert!(!matches_pattern("a*b", "acd"));
        assert!(matches_pattern("*", ""));
    }

    #[test]
    fn test_exclusions() {
        let sync = SyncConfig {
            exclude_tables: vec!["tmp_*".into(), "sessions".into()],
            ..SyncConfig::default()
        };
        assert!(sync.includes("orders"));
        assert!(!sync.includes("tmp_orders"));
        assert!(!sync.includes("sessions"));
    }

    #[test]
    fn test_connection_defaults_per_engine() {
        let yaml = "type: postgres\nhost: h\ndatabase: d\nuser: u\n";
        let pg: ConnectionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pg.effective_port(), 5432);
        assert_eq!(pg.effective_ssl_mode(), "disable");
        assert_eq!(pg.effective_schema(), "public");
        assert_eq!(pg.max_connections, 4);

        let yaml = "type: mariadb\nhost: h\ndatabase: d\nuser: u\nport: 3307\n";
        let maria: ConnectionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(maria.effective_port(), 3307);
        assert_eq!(maria.effective_ssl_mode(), "prefer");
    }

    #[test]
    fn test_sync_mode_parsing() {
        let sync: SyncConfig = serde_yaml::from_str("mode: generate\n").unwrap();
        assert_eq!(sync.mode, SyncMode::Generate);
        assert_eq!(sync.window_size, 1000);
        assert!(sync.disable_integrity_checks);
    }
}
