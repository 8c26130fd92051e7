use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub public_base_url: String,
    pub uploads_dir: String,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub email_from: String,

    pub email_max_attempts: i32,
    pub email_retry_base_secs: u64,
    pub email_retry_max_secs: u64,
    pub email_send_timeout_secs: u64,
    pub email_queue_deadline_secs: Option<u64>,

    pub public_rps: u32,
    pub admin_rps: u32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            public_base_url: get_env("PUBLIC_BASE_URL")?,
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            smtp_host: get_env("SMTP_HOST")?,
            smtp_port: get_env_parse_or("SMTP_PORT", 587)?,
            smtp_username: get_env("SMTP_USERNAME")?,
            smtp_password: get_env("SMTP_PASSWORD")?,
            email_from: get_env("EMAIL_FROM")?,
            email_max_attempts: get_env_parse_or("EMAIL_MAX_ATTEMPTS", 3)?,
            email_retry_base_secs: get_env_parse_or("EMAIL_RETRY_BASE_SECS", 30)?,
            email_retry_max_secs: get_env_parse_or("EMAIL_RETRY_MAX_SECS", 3600)?,
            email_send_timeout_secs: get_env_parse_or("EMAIL_SEND_TIMEOUT_SECS", 20)?,
            email_queue_deadline_secs: match env::var("EMAIL_QUEUE_DEADLINE_SECS") {
                Ok(raw) => Some(parse_env("EMAIL_QUEUE_DEADLINE_SECS", &raw)?),
                Err(_) => None,
            },
            public_rps: get_env_parse("PUBLIC_RPS")?,
            admin_rps: get_env_parse("ADMIN_RPS")?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    parse_env(name, &raw)
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_env(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
