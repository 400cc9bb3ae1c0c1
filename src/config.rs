use crate::error::{Result, StratumError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which handshake vocabulary the session speaks.
///
/// `Legacy` is the array-based `mining.subscribe`/`mining.authorize` style,
/// `Modern` is the single-shot JSON-RPC 2.0 `login` call. A session configured
/// for `Modern` falls back to `Legacy` at most once per connection attempt
/// when the pool rejects the login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Legacy,
    Modern,
}

/// Reconnect delay schedule: a fixed delay, or an ordered list advanced by
/// one position on every unsuccessful connection attempt and reset on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackoffSchedule {
    Fixed(Duration),
    Schedule(Vec<Duration>),
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        BackoffSchedule::Schedule(vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}

impl BackoffSchedule {
    /// Delay for the given attempt index, clamped to the last entry.
    pub fn delay_at(&self, index: usize) -> Duration {
        match self {
            BackoffSchedule::Fixed(d) => *d,
            BackoffSchedule::Schedule(list) => list
                .get(index.min(self.last_index()))
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Last valid schedule position.
    pub fn last_index(&self) -> usize {
        match self {
            BackoffSchedule::Fixed(_) => 0,
            BackoffSchedule::Schedule(list) => list.len().saturating_sub(1),
        }
    }

    /// True when the schedule is an ordered list rather than a fixed delay.
    pub fn is_schedule(&self) -> bool {
        matches!(self, BackoffSchedule::Schedule(_))
    }
}

/// Resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Build a plain TCP target from a host and port pair.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self {
            scheme: "tcp".to_string(),
            host: host.to_string(),
            port,
        }
    }
}

impl FromStr for Target {
    type Err = StratumError;

    /// Accepts bare `host:port` or a URL with a scheme. A missing scheme
    /// normalizes to `tcp`; `http`/`https` imply ports 80/443.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StratumError::Config("url is required".to_string()));
        }

        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("tcp".to_string(), s),
        };
        // strip any path component
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    StratumError::Config(format!("invalid port in url: {s}"))
                })?;
                (host, port)
            }
            None => match scheme.as_str() {
                "http" => (authority, 80),
                "https" => (authority, 443),
                _ => {
                    return Err(StratumError::Config(format!(
                        "host and port are required to connect: {s}"
                    )))
                }
            },
        };

        if host.is_empty() {
            return Err(StratumError::Config(format!(
                "host and port are required to connect: {s}"
            )));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Stratum session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumConfig {
    /// Pool URL (hostname:port or stratum+tcp://hostname:port)
    pub url: String,

    /// Worker username (usually wallet.worker_name). Required.
    pub username: String,

    /// Worker password (often just 'x' for most pools)
    #[serde(default = "default_password")]
    pub password: String,

    /// Handshake dialect preference
    #[serde(default)]
    pub dialect: Dialect,

    /// Try to resume the previous mining session on reconnect
    #[serde(default = "default_true")]
    pub resume_session: bool,

    /// Timeout to receive the login response. Zero disables.
    #[serde(default = "default_login_timeout")]
    pub login_timeout: Duration,

    /// Enable the ping/pong keep-alive. Most pools kick clients for using it.
    #[serde(default)]
    pub enable_ping: bool,

    /// Automatically reconnect after errors and remote closes
    #[serde(default = "default_true")]
    pub reconnect_on_error: bool,

    /// Reconnect delay schedule
    #[serde(default)]
    pub reconnect_schedule: BackoffSchedule,

    /// Algorithm tag, passed through opaquely
    #[serde(default)]
    pub algo: String,

    /// Identity tag; derived from url, algo and date when empty
    #[serde(default)]
    pub id: String,

    /// Set SO_KEEPALIVE on the socket
    #[serde(default = "default_true")]
    pub keepalive: bool,

    /// Disable Nagle's algorithm on the socket
    #[serde(default = "default_true")]
    pub nodelay: bool,

    /// Log raw incoming traffic at debug level
    #[serde(default)]
    pub log_incoming: bool,

    /// Log raw outgoing traffic at debug level
    #[serde(default)]
    pub log_outgoing: bool,

    /// Throughput sampling period. Zero disables the sampler.
    #[serde(default = "default_sample_period")]
    pub sample_period: Duration,

    /// Connection establishment timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// User agent string sent with login/subscribe
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: default_password(),
            dialect: Dialect::default(),
            resume_session: true,
            login_timeout: default_login_timeout(),
            enable_ping: false,
            reconnect_on_error: true,
            reconnect_schedule: BackoffSchedule::default(),
            algo: String::new(),
            id: String::new(),
            keepalive: true,
            nodelay: true,
            log_incoming: false,
            log_outgoing: false,
            sample_period: default_sample_period(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl StratumConfig {
    /// Parse the configured URL into a connection target.
    pub fn target(&self) -> Result<Target> {
        self.url.parse()
    }

    /// Validate everything that must be right before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(StratumError::Config(
                "stratum requires username to be set".to_string(),
            ));
        }
        self.target()?;
        Ok(())
    }

    /// Effective identity tag: the configured one, or a stable value derived
    /// from the target, algorithm and current date.
    pub fn identity(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        derived_identity(&self.url, &self.algo)
    }
}

/// Deterministic identity tag for saving/loading pool settings.
pub fn derived_identity(url: &str, algo: &str) -> String {
    let date = chrono::Local::now().date_naive();
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(algo.as_bytes());
    hasher.update(date.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

// Default value functions for serde
fn default_true() -> bool {
    true
}
fn default_password() -> String {
    "x".to_string()
}
fn default_login_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_sample_period() -> Duration {
    Duration::from_secs(1)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}
pub(crate) fn default_user_agent() -> String {
    format!("stratum-link/{}", env!("CARGO_PKG_VERSION"))
}
