//! Typed configuration (C1): listening address, backend pools, whitelists, retry/timeout
//! policy, TTL policy, and the storage/logging back-ends to wire up.
//!
//! A missing config file is not an error: [`Config::default`] supplies hardcoded development
//! defaults.

use serde::Deserialize;
use std::{net::IpAddr, path::Path};
use weeder_core::{Backend, Role};

/// One entry of the `server` array in the config file.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerEntry {
    /// Hostname or IP of the backend.
    pub host: String,
    /// Port of the backend.
    pub port: u16,
    /// One of `"master"`, `"volume"`, `"filer"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ServerEntry {
    fn role(&self) -> Role {
        match self.kind.as_str() {
            "master" => Role::Master,
            "filer" => Role::Filer,
            _ => Role::Volume,
        }
    }

    fn to_backend(&self) -> Backend {
        Backend::new(format!("http://{}:{}", self.host, self.port), self.role())
    }
}

/// Redis connection settings.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct RedisConfig {
    /// `host:port`, or a comma-separated list of `host:port` pairs to select cluster mode.
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: i64,
}

/// MySQL connection settings.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct MysqlConfig {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_pool_cap")]
    pub max_idle_connections: u32,
    #[serde(default = "default_pool_cap")]
    pub max_open_connections: u32,
}

fn default_pool_cap() -> u32 {
    10
}

impl MysqlConfig {
    /// Builds a `mysql://` DSN from the discrete fields.
    pub fn dsn(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.hostname, self.port, self.database
        )
    }
}

/// Qiniu (external CDN) object-storage credentials, used only by the delete engine's
/// `qiniuDelete` hook.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct QiniuConfig {
    #[serde(default, rename = "accessKey")]
    pub access_key: String,
    #[serde(default, rename = "secretKey")]
    pub secret_key: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub bucket: String,
}

impl QiniuConfig {
    /// Whether credentials are configured. When absent, the delete engine's CDN step is a no-op.
    pub fn is_configured(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// Top-level proxy configuration, as loaded from the JSON config file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub server: Vec<ServerEntry>,
    #[serde(rename = "maxIdleConnsPerHost")]
    pub max_idle_conns_per_host: usize,
    pub retry: usize,
    #[serde(rename = "logHost")]
    pub log_host: String,
    #[serde(rename = "fileUrlPrefix")]
    pub file_url_prefix: String,
    pub redis: RedisConfig,
    #[serde(rename = "uploadWhite")]
    pub upload_white: Vec<String>,
    #[serde(rename = "filerWhite")]
    pub filer_white: Vec<String>,
    #[serde(rename = "uniSourceCheck")]
    pub uni_source_check: bool,
    pub shadow: Vec<ServerEntry>,
    #[serde(rename = "redisCacheTtl")]
    pub redis_cache_ttl: String,
    #[serde(rename = "unkonwnUriChecker")]
    pub unknown_uri_checker: String,
    pub mysql: MysqlConfig,
    pub qiniu: QiniuConfig,
    #[serde(rename = "debugDetailLog")]
    pub debug_detail_log: bool,
    #[serde(rename = "devEnvEnforcedTtl")]
    pub dev_env_enforced_ttl: String,
    #[serde(rename = "volumeCheckDuration")]
    pub volume_check_duration: u64,
    #[serde(rename = "volumeCheckUrl")]
    pub volume_check_url: String,
    #[serde(rename = "volumeCheckBaseLine")]
    pub volume_check_base_line: u64,
    #[serde(rename = "nodeCheckBaseLine")]
    pub node_check_base_line: u64,
    /// Selects the directory-adapter backend: `"mysql"` or `"redis"`.
    #[serde(rename = "directoryAdapter")]
    pub directory_adapter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ip: "0.0.0.0".to_string(),
            port: 8080,
            server: Vec::new(),
            max_idle_conns_per_host: 100,
            retry: 2,
            log_host: String::new(),
            file_url_prefix: "http://127.0.0.1:8080/".to_string(),
            redis: RedisConfig::default(),
            upload_white: Vec::new(),
            filer_white: Vec::new(),
            uni_source_check: false,
            shadow: Vec::new(),
            redis_cache_ttl: String::new(),
            unknown_uri_checker: r#"|\s""#.to_string(),
            mysql: MysqlConfig::default(),
            qiniu: QiniuConfig::default(),
            debug_detail_log: false,
            dev_env_enforced_ttl: String::new(),
            volume_check_duration: 60,
            volume_check_url: String::new(),
            volume_check_base_line: 1,
            node_check_base_line: 1,
            directory_adapter: "mysql".to_string(),
        }
    }
}

/// Failure loading or parsing the config file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Loads configuration from a JSON file. A missing path is not itself an error at the call
    /// site; callers wanting the "no file -> defaults" behavior should check existence first
    /// and fall back to [`Config::default`].
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let bytes = std::fs::read(path)?;
        let cfg = serde_json::from_slice(&bytes)?;
        Ok(cfg)
    }

    /// Loads from `path` if it exists, otherwise returns the hardcoded development defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if path.exists() {
            Config::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using built-in defaults");
            Ok(Config::default())
        }
    }

    /// The primary backend pool, built once at startup.
    pub fn primary_pool(&self) -> Vec<Backend> {
        self.server.iter().map(ServerEntry::to_backend).collect()
    }

    /// The shadow backend pool, consulted on primary failure.
    pub fn shadow_pool(&self) -> Vec<Backend> {
        self.shadow.iter().map(ServerEntry::to_backend).collect()
    }

    /// Parses `uploadWhite` into CIDR prefixes, skipping unparseable entries.
    pub fn write_whitelist(&self) -> Vec<ipnet::IpNet> {
        parse_cidrs(&self.upload_white)
    }

    /// Parses `filerWhite` into CIDR prefixes, skipping unparseable entries.
    pub fn read_whitelist(&self) -> Vec<ipnet::IpNet> {
        parse_cidrs(&self.filer_white)
    }

    /// The socket address the proxy listens on.
    pub fn listen_addr(&self) -> std::net::SocketAddr {
        let ip: IpAddr = self.ip.parse().unwrap_or(IpAddr::from([0, 0, 0, 0]));
        std::net::SocketAddr::new(ip, self.port)
    }
}

fn parse_cidrs(entries: &[String]) -> Vec<ipnet::IpNet> {
    entries
        .iter()
        .filter_map(|s| match s.parse::<ipnet::IpNet>() {
            Ok(net) => Some(net),
            Err(_) => s.parse::<IpAddr>().ok().map(|ip| ipnet::IpNet::from(ip)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_open_write_closed_read() {
        let cfg = Config::default();
        assert!(cfg.write_whitelist().is_empty());
        assert!(cfg.read_whitelist().is_empty());
    }

    #[test]
    fn parses_json_config() {
        let json = r#"{
            "ip": "127.0.0.1",
            "port": 9000,
            "server": [{"host": "10.0.0.1", "port": 9333, "type": "master"}],
            "retry": 3,
            "fileUrlPrefix": "http://cdn.example.com/",
            "uploadWhite": ["10.0.0.0/8"]
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.retry, 3);
        assert_eq!(cfg.primary_pool().len(), 1);
        assert_eq!(cfg.write_whitelist().len(), 1);
    }
}
