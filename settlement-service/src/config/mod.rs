use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pesapal: PesapalConfig,
    pub audit: AuditConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PesapalConfig {
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    pub api_base_url: String,
    /// Public URL the gateway pushes IPN callbacks to.
    pub callback_url: String,
    pub currency: String,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuditConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("SETTLEMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SETTLEMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let db_url =
            env::var("SETTLEMENT_DATABASE_URL").expect("SETTLEMENT_DATABASE_URL must be set");
        let db_name =
            env::var("SETTLEMENT_DATABASE_NAME").unwrap_or_else(|_| "settlement_db".to_string());

        let consumer_key =
            env::var("PESAPAL_CONSUMER_KEY").expect("PESAPAL_CONSUMER_KEY must be set");
        let consumer_secret =
            env::var("PESAPAL_CONSUMER_SECRET").expect("PESAPAL_CONSUMER_SECRET must be set");
        let api_base_url = env::var("PESAPAL_API_BASE_URL")
            .unwrap_or_else(|_| "https://cybqa.pesapal.com/pesapalv3".to_string());
        let callback_url =
            env::var("SETTLEMENT_CALLBACK_URL").expect("SETTLEMENT_CALLBACK_URL must be set");
        let currency = env::var("SETTLEMENT_CURRENCY").unwrap_or_else(|_| "KES".to_string());
        let request_timeout_secs = env::var("PESAPAL_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let audit_enabled = env::var("SETTLEMENT_AUDIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let audit_interval_secs = env::var("SETTLEMENT_AUDIT_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            pesapal: PesapalConfig {
                consumer_key,
                consumer_secret: Secret::new(consumer_secret),
                api_base_url,
                callback_url,
                currency,
                request_timeout_secs,
            },
            audit: AuditConfig {
                enabled: audit_enabled,
                interval_secs: audit_interval_secs,
            },
            service_name: "settlement-service".to_string(),
        })
    }
}
