use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use ocasino_aml::LargeValueThresholds;
use ocasino_common::money::{Amount, Currency};

/// The platform's configuration options, loaded from environment variables
/// (and, for local runs, the matching CLI flags `clap` derives for free).
#[derive(Debug, Clone, Parser)]
#[command(name = "ocasino-node", about = "Wallet, auth and AML composition root")]
pub struct PlatformConfig {
    /// Base64-encoded 32-byte key used to encrypt amounts at rest.
    #[arg(long, env = "ENCRYPTION_KEY")]
    pub encryption_key: String,

    #[arg(long, env = "ALLOWED_IP_ENFORCEMENT", default_value_t = true)]
    pub allowed_ip_enforcement: bool,

    #[arg(long, env = "DEFAULT_RATE_LIMIT", default_value_t = 100)]
    pub default_rate_limit: u64,

    #[arg(long, env = "AUTH_EXCLUDE_PATHS", value_delimiter = ',', default_value = "/health")]
    pub auth_exclude_paths: Vec<String>,

    /// JSON object mapping ISO currency codes to decimal large-value
    /// thresholds, e.g. `{"USD":"10000.00","JPY":"1000000"}`. Absent entries,
    /// and absent currencies within a supplied map, fall back to
    /// `LargeValueThresholds::default_set`.
    #[arg(long, env = "AML_LARGE_VALUE_THRESHOLDS")]
    pub aml_large_value_thresholds: Option<String>,

    #[arg(long, env = "EVENT_QUEUE_CAPACITY", default_value_t = 10_000)]
    pub event_queue_capacity: usize,

    /// Number of single-threaded event workers. Independent of queue
    /// capacity; more workers means more players' events processed in
    /// parallel, at the cost of looser global ordering across workers.
    #[arg(long, env = "EVENT_WORKER_COUNT", default_value_t = 8)]
    pub event_worker_count: usize,

    #[arg(long, env = "OPERATION_DEADLINE_MS", default_value_t = 5_000)]
    pub operation_deadline_ms: u64,

    /// Redis connection URL. Absent selects the in-process cache backend.
    #[arg(long, env = "CACHE_URL")]
    pub cache_url: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub rust_log: String,
}

impl PlatformConfig {
    pub fn operation_deadline(&self) -> Duration {
        Duration::from_millis(self.operation_deadline_ms)
    }

    /// Parses `aml-large-value-thresholds` into a `LargeValueThresholds`,
    /// falling back to the built-in defaults when the option is absent or
    /// fails to parse a given currency's amount.
    pub fn aml_thresholds(&self) -> LargeValueThresholds {
        let Some(raw) = &self.aml_large_value_thresholds else {
            return LargeValueThresholds::default_set();
        };

        let parsed: HashMap<String, String> = match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "aml-large-value-thresholds is not a valid JSON object; using defaults");
                return LargeValueThresholds::default_set();
            }
        };

        let mut by_currency = HashMap::new();
        for (code, decimal) in parsed {
            let currency = match Currency::new(&code) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, code, "skipping unrecognized currency in aml-large-value-thresholds");
                    continue;
                }
            };
            match Amount::parse(&decimal, &currency) {
                Ok(amount) => {
                    by_currency.insert(currency.code().to_string(), amount);
                }
                Err(e) => {
                    tracing::warn!(error = %e, code, decimal, "skipping unparseable threshold in aml-large-value-thresholds");
                }
            }
        }

        let default_threshold = by_currency
            .get("USD")
            .copied()
            .unwrap_or_else(|| Amount::from_minor_units(10_000_00));
        LargeValueThresholds::new(by_currency, default_threshold)
    }
}
