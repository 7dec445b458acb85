use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DEGA_ADS__` and TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// Knobs for the recommendation/exposure policy.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum campaigns returned per recommendation request.
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
    /// Candidate pool size fetched for in-memory scoring.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// A campaign seen within this window is not shown again.
    #[serde(default = "default_repeat_window_secs")]
    pub repeat_window_secs: i64,
}

// Default functions
fn default_node_id() -> String {
    "ads-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "dega_ads".to_string()
}
fn default_batch_size() -> usize {
    10000
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_max_recommendations() -> usize {
    3
}
fn default_candidate_limit() -> usize {
    50
}
fn default_repeat_window_secs() -> i64 {
    600
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_recommendations: default_max_recommendations(),
            candidate_limit: default_candidate_limit(),
            repeat_window_secs: default_repeat_window_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DEGA_ADS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
