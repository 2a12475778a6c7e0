use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub gateway: GatewayConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

/// External payment processor settings. `mode = "mock"` bypasses the real
/// gateway and synthesizes intents for test/demo environments.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub mode: String,
    pub secret_key: String,
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    pub webhook_secret: String,
}

fn default_gateway_base_url() -> String {
    "https://api.stripe.com".to_string()
}

impl GatewayConfig {
    pub fn is_mock(&self) -> bool {
        self.mode == "mock"
    }
}

/// Tunable policy constants, not hard protocol requirements.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// How long a pending reservation holds inventory.
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: u64,
    /// Expiry sweeper tick interval.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Age past which an in-flight idempotency sentinel is abandoned.
    #[serde(default = "default_idempotency_stale")]
    pub idempotency_stale_seconds: u64,
    /// TTL for the Redis response mirror.
    #[serde(default = "default_response_cache_ttl")]
    pub response_cache_ttl_seconds: u64,
}

fn default_hold_ttl() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idempotency_stale() -> u64 {
    300
}

fn default_response_cache_ttl() -> u64 {
    900
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("VOYAGO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_defaults_apply() {
        let rules: BusinessRules = serde_json::from_str("{}").unwrap();
        assert_eq!(rules.hold_ttl_seconds, 900);
        assert_eq!(rules.sweep_interval_seconds, 60);
        assert_eq!(rules.idempotency_stale_seconds, 300);
        assert_eq!(rules.response_cache_ttl_seconds, 900);
    }

    #[test]
    fn gateway_mock_mode_flag() {
        let gateway: GatewayConfig = serde_json::from_str(
            r#"{"mode": "mock", "secret_key": "", "webhook_secret": "s"}"#,
        )
        .unwrap();
        assert!(gateway.is_mock());
        assert_eq!(gateway.base_url, "https://api.stripe.com");
    }
}
