use std::{fs, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use serde::Deserialize;

/// Command line options for the relay.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// HTTP listen address (host:port, or :port for all interfaces).
    #[arg(long)]
    pub http: Option<String>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Seconds between SSE keep-alive pings.
    #[arg(long)]
    pub keepalive_secs: Option<u64>,
    /// Seconds a disconnected subscriber keeps absorbing in-flight messages.
    #[arg(long)]
    pub drain_grace_secs: Option<u64>,
    /// Forget channels that stay without listeners for this many seconds.
    #[arg(long)]
    pub channel_ttl_secs: Option<u64>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub http: String,
    /// Whether info-level logging is enabled.
    pub logging_enabled: bool,
    /// Interval of SSE `ping` events.
    pub keepalive: Duration,
    /// Grace window for draining a hung-up subscriber.
    pub drain_grace: Duration,
    /// Idle channel eviction. `None` keeps channels for the life of the process.
    pub channel_ttl: Option<Duration>,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    channels: FileChannels,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize, Default)]
struct FileServer {
    http: Option<String>,
    keepalive_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct FileChannels {
    drain_grace_secs: Option<u64>,
    ttl_secs: Option<u64>,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

const DEFAULT_HTTP: &str = "0.0.0.0:8080";
const DEFAULT_KEEPALIVE_SECS: u64 = 15;
const DEFAULT_DRAIN_GRACE_SECS: u64 = 60;

fn default_logging() -> bool {
    true
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: DEFAULT_HTTP.into(),
            logging_enabled: default_logging(),
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            drain_grace: Duration::from_secs(DEFAULT_DRAIN_GRACE_SECS),
            channel_ttl: None,
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut http = DEFAULT_HTTP.to_string();
        let mut logging = default_logging();
        let mut keepalive_secs = DEFAULT_KEEPALIVE_SECS;
        let mut drain_grace_secs = DEFAULT_DRAIN_GRACE_SECS;
        let mut ttl_secs = None;

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("FANOUT_CONFIG").ok().map(PathBuf::from))
            .or_else(default_config_path);

        if let Some(path) = config_path {
            if let Ok(bytes) = fs::read(&path) {
                let contents = String::from_utf8_lossy(&bytes);
                let file_cfg: FileConfig =
                    toml::from_str(&contents).context("invalid config file")?;
                if let Some(h) = file_cfg.server.http {
                    http = h;
                }
                if let Some(k) = file_cfg.server.keepalive_secs {
                    keepalive_secs = k;
                }
                if let Some(d) = file_cfg.channels.drain_grace_secs {
                    drain_grace_secs = d;
                }
                ttl_secs = file_cfg.channels.ttl_secs;
                logging = file_cfg.logging.enabled;
            }
        }

        // environment overrides
        if let Ok(h) = std::env::var("FANOUT_HTTP") {
            http = h;
        }
        if let Ok(l) = std::env::var("FANOUT_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(h) = &cli.http {
            http = h.clone();
        }
        if let Some(l) = cli.logging {
            logging = l;
        }
        if let Some(k) = cli.keepalive_secs {
            keepalive_secs = k;
        }
        if let Some(d) = cli.drain_grace_secs {
            drain_grace_secs = d;
        }
        if let Some(t) = cli.channel_ttl_secs {
            ttl_secs = Some(t);
        }

        if keepalive_secs == 0 {
            anyhow::bail!("invalid_keepalive");
        }
        let http = normalize_addr(&http);
        check_host_port(&http)?;

        Ok(Self {
            http,
            logging_enabled: logging,
            keepalive: Duration::from_secs(keepalive_secs),
            drain_grace: Duration::from_secs(drain_grace_secs),
            channel_ttl: ttl_secs.map(Duration::from_secs),
        })
    }

    /// Resolve the listen address. Hostnames such as `localhost` go through
    /// the system resolver and the first result wins.
    pub async fn resolve_addr(&self) -> Result<SocketAddr> {
        let http = normalize_addr(&self.http);
        let addr = tokio::net::lookup_host(http.as_str())
            .await
            .with_context(|| format!("cannot resolve listen address {http}"))?
            .next()
            .with_context(|| format!("listen address {http} resolved to nothing"));
        addr
    }
}

/// `host:port` with a numeric port. The host is resolved later, at bind time.
fn check_host_port(addr: &str) -> Result<()> {
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("invalid listen address {addr}: missing port"))?;
    port.parse::<u16>()
        .with_context(|| format!("invalid listen address {addr}: bad port"))?;
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        anyhow::bail!("invalid listen address {addr}: bad host");
    }
    Ok(())
}

/// Accept the `:port` shorthand for all interfaces.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Platform config location, e.g. `~/.config/fanout/fanout.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "fanout", "fanout").map(|p| p.config_dir().join("fanout.toml"))
}
