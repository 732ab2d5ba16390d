//! Run configuration.
//!
//! An [`ExportConfig`] is built once at startup and passed by reference to
//! the runner. It is assembled from [`PartialConfig`] layers (command line,
//! environment, JSON config file) by [`PartialConfig::merge`] and
//! [`PartialConfig::resolve`], which applies defaults and validation.
//!
//! # Security
//! Passwords only ever live inside [`Credentials`]. The `Display`
//! implementations in this module never include credentials.

use crate::error::{Result, TableDumpError};
use crate::security::Credentials;
use crate::writer::WriterOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default SQL Server TCP port.
pub const DEFAULT_PORT: u16 = 1433;

/// Server used when none is configured.
pub const DEFAULT_SERVER: &str = "localhost,1433";

/// Login used when none is configured.
pub const DEFAULT_USER: &str = "sa";

/// Default TCP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Location of a SQL Server instance.
///
/// Parsed from the notations SQL Server tools accept: `host`,
/// `host,port`, `host:port`, `host\instance` and `host\instance,port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Host name or IP address
    pub host: String,
    /// Explicit TCP port
    pub port: Option<u16>,
    /// Named instance, resolved through the SQL Browser service
    pub instance: Option<String>,
}

impl ServerAddress {
    /// Creates an address for `host` on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            instance: None,
        }
    }

    /// Builder method to set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Port to connect to when no named instance is used.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Whether the port must be looked up through SQL Browser.
    ///
    /// An explicit port wins over the instance name, as with `sqlcmd`.
    pub fn uses_sql_browser(&self) -> bool {
        self.instance.is_some() && self.port.is_none()
    }
}

impl FromStr for ServerAddress {
    type Err = TableDumpError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().strip_prefix("tcp:").unwrap_or(s.trim());
        if s.is_empty() {
            return Err(TableDumpError::configuration("server cannot be empty"));
        }

        let (rest, port) = match s.rsplit_once(',') {
            Some((rest, port)) => (rest, Some(parse_port(port)?)),
            None => match s.rsplit_once(':') {
                // A bare IPv6 address contains several colons; only treat a
                // single colon as a port separator.
                Some((rest, port)) if !rest.contains(':') => (rest, Some(parse_port(port)?)),
                _ => (s, None),
            },
        };

        let (host, instance) = match rest.split_once('\\') {
            Some((host, instance)) if !instance.is_empty() => (host, Some(instance.to_string())),
            Some((host, _)) => (host, None),
            None => (rest, None),
        };

        let host = match host {
            "." | "(local)" => "localhost",
            other => other,
        };
        if host.is_empty() {
            return Err(TableDumpError::configuration(format!(
                "server '{s}' has no host name"
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(TableDumpError::configuration(format!(
            "invalid port '{port}'"
        ))),
        Ok(p) => Ok(p),
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{instance}")?;
        }
        if let Some(port) = self.port {
            write!(f, ",{port}")?;
        }
        Ok(())
    }
}

/// Configuration for the database connection.
///
/// # Security
/// This struct intentionally does NOT store credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server to connect to
    pub server: ServerAddress,
    /// Database to export; the login's default database when unset
    pub database: Option<String>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Accept the server certificate without validation
    pub trust_server_certificate: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server: ServerAddress::new("localhost").with_port(DEFAULT_PORT),
            database: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            trust_server_certificate: true,
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.server,
            self.database.as_deref().unwrap_or("<default>")
        )
        // Intentionally omit the login and never include credentials
    }
}

impl ConnectionConfig {
    /// Validates connection parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(TableDumpError::configuration("host cannot be empty"));
        }

        if self.server.port == Some(0) {
            return Err(TableDumpError::configuration("port must be greater than 0"));
        }

        if self.connect_timeout.is_zero() {
            return Err(TableDumpError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.database.as_deref().is_some_and(str::is_empty) {
            return Err(TableDumpError::configuration("database cannot be empty"));
        }

        Ok(())
    }
}

/// Parquet page compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParquetCompression {
    /// No compression
    None,
    /// Snappy, the default of most Parquet writers
    #[default]
    Snappy,
    /// Zstandard at the given level (1–22)
    Zstd(i32),
}

/// Level used for `zstd` without an explicit level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

impl FromStr for ParquetCompression {
    type Err = TableDumpError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "none" | "uncompressed" => Ok(Self::None),
            "snappy" => Ok(Self::Snappy),
            "zstd" => Ok(Self::Zstd(DEFAULT_ZSTD_LEVEL)),
            other => {
                let level = other
                    .strip_prefix("zstd:")
                    .and_then(|level| level.parse::<i32>().ok())
                    .ok_or_else(|| {
                        TableDumpError::configuration(format!(
                            "unknown compression '{s}' (expected none, snappy, zstd or zstd:<level>)"
                        ))
                    })?;
                if !(1..=22).contains(&level) {
                    return Err(TableDumpError::configuration(format!(
                        "zstd level {level} is outside 1..=22"
                    )));
                }
                Ok(Self::Zstd(level))
            }
        }
    }
}

impl fmt::Display for ParquetCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Snappy => write!(f, "snappy"),
            Self::Zstd(level) => write!(f, "zstd:{level}"),
        }
    }
}

/// Where and how table files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Directory receiving one file per table
    pub dir: PathBuf,
    /// Parquet encoding options
    pub writer: WriterOptions,
}

impl OutputConfig {
    /// Creates an output config writing to `dir` with default encoding.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: WriterOptions::default(),
        }
    }
}

/// Default output directory for a database: `./<database>_parquet`.
pub fn default_output_dir(database: Option<&str>) -> PathBuf {
    PathBuf::from(format!("{}_parquet", database.unwrap_or("tabledump")))
}

/// Fully resolved configuration of one run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Database connection settings
    pub connection: ConnectionConfig,
    /// Login
    pub credentials: Credentials,
    /// Output settings
    pub output: OutputConfig,
}

impl ExportConfig {
    /// Creates a config from its parts.
    pub fn new(
        connection: ConnectionConfig,
        credentials: Credentials,
        output: OutputConfig,
    ) -> Self {
        Self {
            connection,
            credentials,
            output,
        }
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    /// Returns error if any part is invalid
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        if self.credentials.username().is_empty() {
            return Err(TableDumpError::configuration("user cannot be empty"));
        }

        if self.output.dir.as_os_str().is_empty() {
            return Err(TableDumpError::configuration("output_dir cannot be empty"));
        }

        // Surfaces bad zstd levels before connecting.
        self.output.writer.writer_properties()?;

        Ok(())
    }
}

/// One layer of optional settings.
///
/// The same shape is used for the JSON config file and for values coming
/// from the command line or environment; layers are combined with
/// [`PartialConfig::merge`].
#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// Server address (`host`, `host,port`, `host\instance`)
    pub server: Option<String>,
    /// Database name
    pub database: Option<String>,
    /// Login name
    pub user: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Output directory
    pub output_dir: Option<PathBuf>,
    /// Compression (`none`, `snappy`, `zstd`, `zstd:<level>`)
    pub compression: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Accept the server certificate without validation
    pub trust_server_certificate: Option<bool>,
}

impl fmt::Debug for PartialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("output_dir", &self.output_dir)
            .field("compression", &self.compression)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

impl PartialConfig {
    /// Loads a layer from a JSON config file.
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TableDumpError::configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents).map_err(|e| match e {
            TableDumpError::Configuration { message } => TableDumpError::configuration(format!(
                "{}: {message}",
                path.display()
            )),
            other => other,
        })
    }

    /// Parses a layer from JSON text.
    ///
    /// # Errors
    /// Returns a configuration error for malformed JSON or unknown keys.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| TableDumpError::configuration(format!("invalid config: {e}")))
    }

    /// Combines two layers; values in `self` win over values in `lower`.
    #[must_use]
    pub fn merge(self, lower: Self) -> Self {
        Self {
            server: self.server.or(lower.server),
            database: self.database.or(lower.database),
            user: self.user.or(lower.user),
            password: self.password.or(lower.password),
            output_dir: self.output_dir.or(lower.output_dir),
            compression: self.compression.or(lower.compression),
            connect_timeout_secs: self.connect_timeout_secs.or(lower.connect_timeout_secs),
            trust_server_certificate: self
                .trust_server_certificate
                .or(lower.trust_server_certificate),
        }
    }

    /// Applies defaults and validates, producing the run configuration.
    ///
    /// # Errors
    /// Returns a configuration error when a value is malformed or the
    /// password is missing.
    pub fn resolve(self) -> Result<ExportConfig> {
        let server = self
            .server
            .as_deref()
            .unwrap_or(DEFAULT_SERVER)
            .parse::<ServerAddress>()?;

        let database = self.database.filter(|d| !d.trim().is_empty());

        let connection = ConnectionConfig {
            server,
            connect_timeout: Duration::from_secs(
                self.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            trust_server_certificate: self.trust_server_certificate.unwrap_or(true),
            database,
        };

        let password = self.password.ok_or_else(|| {
            TableDumpError::configuration(
                "no password configured (set TABLEDUMP_PASSWORD, pass --password or use --prompt-password)",
            )
        })?;
        let credentials = Credentials::new(
            self.user.unwrap_or_else(|| DEFAULT_USER.to_string()),
            password,
        );

        let compression = match self.compression.as_deref() {
            Some(value) => value.parse()?,
            None => ParquetCompression::default(),
        };
        let output = OutputConfig {
            dir: self
                .output_dir
                .unwrap_or_else(|| default_output_dir(connection.database.as_deref())),
            writer: WriterOptions {
                compression,
                ..Default::default()
            },
        };

        let config = ExportConfig::new(connection, credentials, output);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_notations() {
        let addr: ServerAddress = "localhost,1433".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("localhost").with_port(1433));

        let addr: ServerAddress = "db.example.com:14330".parse().unwrap();
        assert_eq!(addr.host, "db.example.com");
        assert_eq!(addr.port, Some(14330));

        let addr: ServerAddress = "sqlhost".parse().unwrap();
        assert_eq!(addr.port, None);
        assert_eq!(addr.effective_port(), DEFAULT_PORT);

        let addr: ServerAddress = r"sqlhost\SQLEXPRESS".parse().unwrap();
        assert_eq!(addr.host, "sqlhost");
        assert_eq!(addr.instance.as_deref(), Some("SQLEXPRESS"));

        let addr: ServerAddress = r"tcp:.\DEV,1500".parse().unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.instance.as_deref(), Some("DEV"));
        assert_eq!(addr.port, Some(1500));
    }

    #[test]
    fn test_sql_browser_only_without_port() {
        let named: ServerAddress = r"sql01\DEV".parse().unwrap();
        assert!(named.uses_sql_browser());

        let named_with_port: ServerAddress = r"sql01\DEV,1500".parse().unwrap();
        assert!(!named_with_port.uses_sql_browser());

        let plain: ServerAddress = "sql01".parse().unwrap();
        assert!(!plain.uses_sql_browser());
    }

    #[test]
    fn test_server_address_rejects_bad_input() {
        assert!("".parse::<ServerAddress>().is_err());
        assert!("host,notaport".parse::<ServerAddress>().is_err());
        assert!("host,0".parse::<ServerAddress>().is_err());
        assert!(",1433".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_server_address_display_round_trip() {
        for input in ["localhost,1433", r"sqlhost\SQLEXPRESS", "sqlhost"] {
            let addr: ServerAddress = input.parse().unwrap();
            assert_eq!(addr.to_string(), input);
        }
    }

    #[test]
    fn test_connection_config_display_no_credentials() {
        let config = ConnectionConfig {
            database: Some("AdventureWorks2022".to_string()),
            ..Default::default()
        };
        assert_eq!(config.to_string(), "localhost,1433/AdventureWorks2022");
    }

    #[test]
    fn test_connection_config_validation() {
        assert!(ConnectionConfig::default().validate().is_ok());

        let config = ConnectionConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            database: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!("snappy".parse::<ParquetCompression>().unwrap(), ParquetCompression::Snappy);
        assert_eq!("NONE".parse::<ParquetCompression>().unwrap(), ParquetCompression::None);
        assert_eq!(
            "zstd".parse::<ParquetCompression>().unwrap(),
            ParquetCompression::Zstd(DEFAULT_ZSTD_LEVEL)
        );
        assert_eq!(
            "zstd:9".parse::<ParquetCompression>().unwrap(),
            ParquetCompression::Zstd(9)
        );
        assert!("zstd:40".parse::<ParquetCompression>().is_err());
        assert!("gzip".parse::<ParquetCompression>().is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let config = PartialConfig {
            password: Some("secret".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(config.connection.server.host, "localhost");
        assert_eq!(config.connection.server.port, Some(1433));
        assert_eq!(config.connection.database, None);
        assert!(config.connection.trust_server_certificate);
        assert_eq!(config.credentials.username(), DEFAULT_USER);
        assert_eq!(config.output.dir, PathBuf::from("tabledump_parquet"));
        assert_eq!(config.output.writer.compression, ParquetCompression::Snappy);
    }

    #[test]
    fn test_resolve_output_dir_follows_database() {
        let config = PartialConfig {
            database: Some("AdventureWorks2022".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(
            config.output.dir,
            PathBuf::from("AdventureWorks2022_parquet")
        );
    }

    #[test]
    fn test_resolve_requires_password() {
        let err = PartialConfig::default().resolve().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_merge_precedence() {
        let cli = PartialConfig {
            server: Some("cli-host".to_string()),
            ..Default::default()
        };
        let file = PartialConfig {
            server: Some("file-host".to_string()),
            database: Some("FileDb".to_string()),
            ..Default::default()
        };

        let merged = cli.merge(file);
        assert_eq!(merged.server.as_deref(), Some("cli-host"));
        assert_eq!(merged.database.as_deref(), Some("FileDb"));
    }

    #[test]
    fn test_from_json() {
        let layer = PartialConfig::from_json_str(
            r#"{"server": "db,1433", "database": "Sales", "compression": "zstd:5", "connect_timeout_secs": 5}"#,
        )
        .unwrap();
        assert_eq!(layer.server.as_deref(), Some("db,1433"));
        assert_eq!(layer.connect_timeout_secs, Some(5));

        assert!(PartialConfig::from_json_str(r#"{"sever": "typo"}"#).is_err());
    }

    #[test]
    fn test_partial_config_debug_hides_password() {
        let layer = PartialConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{layer:?}").contains("hunter2"));
    }
}
