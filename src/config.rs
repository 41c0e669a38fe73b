use std::path::PathBuf;

/// Server settings, read from `DAYBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Fallback password for users the roster gives none.
    pub password: String,
    pub max_connections: usize,
    /// Journal appends since the last compaction before the compactor runs.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls: TlsSettings,
    pub roster: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSettings {
    Disabled,
    Enabled { cert: PathBuf, key: PathBuf },
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    /// Only one of `DAYBOOK_TLS_CERT` / `DAYBOOK_TLS_KEY` was set.
    PartialTls,
    Roster(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::PartialTls => {
                write!(f, "both DAYBOOK_TLS_CERT and DAYBOOK_TLS_KEY must be set, or neither")
            }
            ConfigError::Roster(msg) => write!(f, "roster: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "daybook".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls: TlsSettings::Disabled,
            roster: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(v) = lookup("DAYBOOK_PORT") {
            config.port = parse("DAYBOOK_PORT", v)?;
        }
        if let Some(v) = lookup("DAYBOOK_BIND") {
            config.bind = v;
        }
        if let Some(v) = lookup("DAYBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DAYBOOK_PASSWORD") {
            config.password = v;
        }
        if let Some(v) = lookup("DAYBOOK_MAX_CONNECTIONS") {
            config.max_connections = parse("DAYBOOK_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("DAYBOOK_COMPACT_THRESHOLD") {
            config.compact_threshold = parse("DAYBOOK_COMPACT_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("DAYBOOK_METRICS_PORT") {
            config.metrics_port = Some(parse("DAYBOOK_METRICS_PORT", v)?);
        }
        config.tls = match (lookup("DAYBOOK_TLS_CERT"), lookup("DAYBOOK_TLS_KEY")) {
            (None, None) => TlsSettings::Disabled,
            (Some(cert), Some(key)) => TlsSettings::Enabled {
                cert: cert.into(),
                key: key.into(),
            },
            _ => return Err(ConfigError::PartialTls),
        };
        config.roster = lookup("DAYBOOK_ROSTER").map(PathBuf::from);

        if config.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DAYBOOK_MAX_CONNECTIONS",
                value: "0".into(),
            });
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
