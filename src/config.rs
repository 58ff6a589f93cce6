//! Configuration file loading.
//!
//! The config file `pingviz.toml` is looked up in `/etc/`, the user config
//! directory and the working directory, in that order:
//!
//! ```toml
//! ttl = "1s"      # wait before a packet is considered dropped
//! sleep = "2s"    # pause between probes of one host
//! log = "info"
//!
//! [report]
//! host = "127.0.0.1:8125"
//! prefix = "pingviz."
//! normalize = true
//!
//! [hosts]
//! dns = ["8.8.8.8", "1.1.1.1"]
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::state::MonitoredHost;

/// Config file name searched for in the standard locations
pub const CONFIG_FILE_NAME: &str = "pingviz.toml";

/// Log levels accepted in the config file and on the command line
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Map a user supplied level onto the name `EnvFilter` understands
///
/// Case-insensitive; `warning` is accepted for `warn`. Returns None for
/// anything else, which `EnvFilter` would otherwise read as a target name.
pub fn parse_log_level(level: &str) -> Option<&'static str> {
    let level = level.trim().to_ascii_lowercase();
    if level == "warning" {
        return Some("warn");
    }
    LOG_LEVELS.iter().copied().find(|l| *l == level)
}

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to load configuration file: none of {0} exist")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_ttl() -> Duration {
    Duration::from_secs(1)
}

fn default_sleep() -> Duration {
    Duration::from_secs(2)
}

fn default_log() -> String {
    "info".to_string()
}

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Duration before a packet is considered dropped
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    /// Duration between probes of one host
    #[serde(default = "default_sleep", with = "humantime_serde")]
    pub sleep: Duration,
    /// Log level
    #[serde(default = "default_log")]
    pub log: String,
    pub report: ReportConfig,
    /// Host groups; the group name becomes part of the metric names
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,
}

/// Statsd reporting options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Statsd server, `host[:port]`
    pub host: String,
    pub prefix: String,
    pub postfix: String,
    /// Replace `.` in host names with `normalize_char`
    pub normalize: bool,
    pub normalize_char: String,
    /// Infix for successful responses
    pub successful: String,
    /// Infix for dropped responses
    pub failed: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            prefix: String::new(),
            postfix: String::new(),
            normalize: false,
            normalize_char: "_".to_string(),
            successful: "response.".to_string(),
            failed: "failed.".to_string(),
        }
    }
}

impl ReportConfig {
    /// Success and failure metric names for one host
    pub fn metric_names(&self, host: &str, group: &str) -> (String, String) {
        let host = if self.normalize {
            host.replace('.', &self.normalize_char)
        } else {
            host.to_string()
        };

        let successful = format!(
            "{}{}{}.{}{}",
            self.prefix, self.successful, group, host, self.postfix
        );
        let failed = format!(
            "{}{}{}.{}{}",
            self.prefix, self.failed, group, host, self.postfix
        );
        (successful, failed)
    }
}

impl Config {
    /// Candidate config file locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![Path::new("/etc").join(CONFIG_FILE_NAME)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join(CONFIG_FILE_NAME));
        }
        paths.push(PathBuf::from(CONFIG_FILE_NAME));
        paths
    }

    /// Load from an explicit path, or the first file found in [`search_paths`](Self::search_paths)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let candidates = Self::search_paths();
                match candidates.iter().find(|p| p.is_file()) {
                    Some(p) => p.clone(),
                    None => {
                        let listed: Vec<String> =
                            candidates.iter().map(|p| p.display().to_string()).collect();
                        return Err(ConfigError::NotFound(listed.join(", ")));
                    }
                }
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate config file contents
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        if let Some(level) = parse_log_level(&config.log) {
            config.log = level.to_string();
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report.host.trim().is_empty() {
            return Err(ConfigError::Invalid("report.host must be set".into()));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::Invalid("ttl must be positive".into()));
        }
        if parse_log_level(&self.log).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}, use one of {}",
                self.log,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Resolve every configured host into a [`MonitoredHost`]
    ///
    /// Hosts that do not resolve to an IPv4 address are logged and skipped.
    pub fn monitored_hosts(&self) -> Vec<MonitoredHost> {
        self.monitored_hosts_with(resolve_ipv4)
    }

    /// Same as [`monitored_hosts`](Self::monitored_hosts) with a custom resolver
    pub fn monitored_hosts_with<F>(&self, resolve: F) -> Vec<MonitoredHost>
    where
        F: Fn(&str) -> Option<Ipv4Addr>,
    {
        let mut hosts = Vec::new();
        for (group, names) in &self.hosts {
            for name in names {
                let Some(addr) = resolve(name) else {
                    tracing::warn!(host = %name, "Unable to resolve host; will not ping.");
                    continue;
                };

                let (success_metric, failure_metric) = self.report.metric_names(name, group);
                tracing::debug!(
                    group = %group,
                    host = %name,
                    a_record = %addr,
                    success_metric = %success_metric,
                    failed_metric = %failure_metric,
                    "Found Host"
                );

                hosts.push(
                    MonitoredHost::new(name.clone(), group.clone(), IpAddr::V4(addr))
                        .with_ttl(self.ttl)
                        .with_interval(self.sleep)
                        .with_metrics(success_metric, failure_metric),
                );
            }
        }
        hosts
    }
}

/// Parse an IPv4 literal or resolve a hostname to its first IPv4 address
pub fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip);
    }

    format!("{}:0", host)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
ttl = "500ms"
sleep = "5s"
log = "debug"

[report]
host = "127.0.0.1:8125"
prefix = "pingviz."
postfix = ".v1"
normalize = true

[hosts]
dns = ["8.8.8.8", "1.1.1.1"]
lan = ["10.0.0.1"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.ttl, Duration::from_millis(500));
        assert_eq!(config.sleep, Duration::from_secs(5));
        assert_eq!(config.log, "debug");
        assert_eq!(config.report.host, "127.0.0.1:8125");
        assert_eq!(config.report.normalize_char, "_");
        assert_eq!(config.hosts["dns"], vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("[report]\nhost = \"statsd\"\n").unwrap();
        assert_eq!(config.ttl, Duration::from_secs(1));
        assert_eq!(config.sleep, Duration::from_secs(2));
        assert_eq!(config.log, "info");
        assert!(!config.report.normalize);
        assert_eq!(config.report.successful, "response.");
        assert_eq!(config.report.failed, "failed.");
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn test_missing_report_host_rejected() {
        let err = Config::parse("[report]\nprefix = \"x.\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_log_level_warning_alias() {
        let config = Config::parse("log = \"Warning\"\n[report]\nhost = \"statsd\"\n").unwrap();
        assert_eq!(config.log, "warn");
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = Config::parse("log = \"verbose\"\n[report]\nhost = \"statsd\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("verbose")));
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), Some("debug"));
        assert_eq!(parse_log_level("warning"), Some("warn"));
        assert_eq!(parse_log_level("off"), Some("off"));
        assert_eq!(parse_log_level("pingviz=debug"), None);
    }

    #[test]
    fn test_search_paths_use_dot_config() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], Path::new("/etc/pingviz.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths[1], home.join(".config").join(CONFIG_FILE_NAME));
        }
        assert_eq!(paths.last().unwrap(), &PathBuf::from(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = Config::parse("ttl = \"soon\"\n[report]\nhost = \"statsd\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_metric_names_plain() {
        let report = ReportConfig {
            prefix: "pv.".into(),
            ..ReportConfig::default()
        };
        let (ok, ko) = report.metric_names("8.8.8.8", "dns");
        assert_eq!(ok, "pv.response.dns.8.8.8.8");
        assert_eq!(ko, "pv.failed.dns.8.8.8.8");
    }

    #[test]
    fn test_metric_names_normalized() {
        let report = ReportConfig {
            normalize: true,
            normalize_char: "-".into(),
            postfix: ".count".into(),
            ..ReportConfig::default()
        };
        let (ok, ko) = report.metric_names("example.com", "web");
        assert_eq!(ok, "response.web.example-com.count");
        assert_eq!(ko, "failed.web.example-com.count");
    }

    #[test]
    fn test_monitored_hosts_skips_unresolved() {
        let config = Config::parse(SAMPLE).unwrap();
        let hosts = config.monitored_hosts_with(|name| match name {
            "1.1.1.1" => None,
            other => other.parse().ok(),
        });

        let names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["8.8.8.8", "10.0.0.1"]);

        let dns = &hosts[0];
        assert_eq!(dns.group, "dns");
        assert_eq!(dns.ttl, Duration::from_millis(500));
        assert_eq!(dns.interval, Duration::from_secs(5));
        assert_eq!(dns.success_metric, "pingviz.response.dns.8_8_8_8.v1");
        assert_eq!(dns.failure_metric, "pingviz.failed.dns.8_8_8_8.v1");
    }

    #[test]
    fn test_resolve_ipv4_literal() {
        assert_eq!(resolve_ipv4("10.0.0.2"), Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(resolve_ipv4("::1"), None);
    }

    #[test]
    fn test_load_explicit_path() {
        let path = std::env::temp_dir().join(format!("pingviz-test-{}.toml", std::process::id()));
        fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.hosts.len(), 2);
    }

    #[test]
    fn test_load_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/pingviz.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
