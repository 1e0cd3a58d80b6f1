// fillpdf-service/src/config.rs

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub pubsub: PubSubConfig,
    pub database: DatabaseConfig,
    pub backend: BackendConfig,
    pub files: FilesConfig,
    pub storage: StorageConfig,
    pub tokens: TokensConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    pub project_id: String,
    pub request_subscription: String,
    pub response_topic: String,
    pub max_concurrent_messages: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Pdftk,
    LocalServer,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub pdftk_path: String,
    /// Locale exported as `LC_ALL` to the pdftk process. Read once at
    /// startup and handed to the backend; never looked up per call.
    pub locale: Option<String>,
    pub local_server_url: String,
    pub remote_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    pub public_path: String,
    pub private_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket receiving filled PDFs for forms with a destination path.
    /// Empty disables uploads.
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    pub site_name: String,
    pub site_mail: String,
    pub site_url: String,
    pub site_slogan: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            // Start with default values
            .set_default("service.name", "fillpdf-service")?
            .set_default("service.log_level", "info")?
            .set_default("pubsub.project_id", "fillpdf")?
            .set_default("pubsub.request_subscription", "fillpdf-requests-sub")?
            .set_default("pubsub.response_topic", "fillpdf-results")?
            .set_default("pubsub.max_concurrent_messages", "10")?
            .set_default("database.url", "postgres://localhost/fillpdf")?
            .set_default("database.max_connections", "5")?
            .set_default("backend.kind", "local_server")?
            .set_default("backend.pdftk_path", "pdftk")?
            .set_default("backend.local_server_url", "http://127.0.0.1:8085")?
            .set_default("backend.remote_url", "https://fillpdf.io")?
            .set_default("backend.timeout_secs", "30")?
            .set_default("files.public_path", "./files/public")?
            .set_default("files.private_path", "./files/private")?
            .set_default("storage.bucket", "")?
            .set_default("tokens.site_name", "")?
            .set_default("tokens.site_mail", "")?
            .set_default("tokens.site_url", "")?
            .set_default("tokens.site_slogan", "")?
            // Load from config file if it exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (e.g., SERVICE__BACKEND__KIND)
            .add_source(Environment::with_prefix("SERVICE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
