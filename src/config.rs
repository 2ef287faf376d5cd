use anyhow::Context;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mysql_host: String,
    pub mysql_port: u16,
    pub mysql_db: String,
    pub mysql_user: String,
    pub mysql_pass: String,
    pub server_url: String,
    pub log_level: String,
    pub insecure_tls: bool,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists, ignore if not

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if !matches!(log_level.as_str(), "debug" | "info" | "warn" | "error") {
            anyhow::bail!("LOG_LEVEL must be one of debug, info, warn, error");
        }

        let config = AppConfig {
            mysql_host: env::var("MYSQL_HOST").context("MYSQL_HOST must be set")?,
            mysql_port: env::var("MYSQL_PORT")
                .context("MYSQL_PORT must be set")?
                .parse()
                .context("MYSQL_PORT must be a valid u16")?,
            mysql_db: env::var("MYSQL_DB").context("MYSQL_DB must be set")?,
            mysql_user: env::var("MYSQL_USER").context("MYSQL_USER must be set")?,
            mysql_pass: env::var("MYSQL_PASS").context("MYSQL_PASS must be set")?,
            server_url: env::var("SERVER_URL")
                .context("SERVER_URL must be set")?
                .trim_end_matches('/')
                .to_string(),
            log_level,
            insecure_tls: env::var("INSECURE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        Ok(config)
    }
}
