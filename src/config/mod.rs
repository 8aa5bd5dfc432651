use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How far request headers are trusted when resolving the client address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Ignore forwarding headers, use the socket peer
    None,
    /// `X-Forwarded-For`, then `X-Real-IP`
    Standard,
    /// `CF-Connecting-IP`, then the standard headers
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// HMAC key for address digests. A random key is used when absent.
    pub ip_salt: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxies whose hops are skipped from the right of `X-Forwarded-For`
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
    /// `max-age` of the private cache hint on reports
    #[serde(default = "AnalyticsConfig::default_report_max_age_secs")]
    pub report_max_age_secs: u64,
}

impl AnalyticsConfig {
    const fn default_report_max_age_secs() -> u64 {
        300
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            ip_salt: None,
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
            report_max_age_secs: Self::default_report_max_age_secs(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./tally.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let ip_salt = std::env::var("IP_SALT").ok().filter(|s| !s.is_empty());

        let trusted_proxy_mode = parse_trusted_proxy_mode(
            &std::env::var("TRUSTED_PROXY_MODE").unwrap_or_else(|_| "standard".to_string()),
        );

        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(raw) => parse_trusted_proxies(&raw)?,
            Err(_) => Vec::new(),
        };

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let report_max_age_secs = std::env::var("REPORT_CACHE_MAX_AGE_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("REPORT_CACHE_MAX_AGE_SECS must be a non-negative integer")?
            .unwrap_or_else(AnalyticsConfig::default_report_max_age_secs);

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            analytics: AnalyticsConfig {
                ip_salt,
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
                report_max_age_secs,
            },
        })
    }
}

fn parse_trusted_proxy_mode(raw: &str) -> TrustedProxyMode {
    match raw.to_lowercase().as_str() {
        "none" => TrustedProxyMode::None,
        "standard" => TrustedProxyMode::Standard,
        "cloudflare" => TrustedProxyMode::Cloudflare,
        other => {
            tracing::warn!(
                "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'standard'. Supported values: none, standard, cloudflare"
            );
            TrustedProxyMode::Standard
        }
    }
}

/// Parse a comma-separated CIDR list. Bare addresses become host networks.
fn parse_trusted_proxies(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid entry '{s}' in TRUSTED_PROXIES"))
        })
        .collect()
}
