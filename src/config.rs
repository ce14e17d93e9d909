use std::{env, str::FromStr};
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub username: String,
    pub password: String,
    /// Remote image-generation endpoint.
    pub generation_endpoint: Url,
    pub generation_api_key: Option<String>,
    /// Concurrent workers per generation run.
    pub worker_count: usize,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    /// Handwritten-style font used for page captions.
    pub caption_font_path: String,
    pub run_history_limit: usize,
}

trait FromEnvWithDefault: Sized {
    fn from_env_or_default(key: &str, default: Self) -> Self;
}

impl FromEnvWithDefault for u16 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for u32 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for u64 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for usize {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for String {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key).unwrap_or(default)
    }
}

impl FromEnvWithDefault for Url {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| Url::parse(&val).ok())
            .unwrap_or(default)
    }
}

impl<T> FromEnvWithDefault for Option<T>
where
    T: FromStr,
{
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .or(default)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            host: String::from_env_or_default("HOST", "0.0.0.0".into()),
            port: u16::from_env_or_default("PORT", 8080),
            env: String::from_env_or_default("ENV", "dev".into()),
            username: String::from_env_or_default("USERNAME", "admin".into()),
            password: String::from_env_or_default("PASSWORD", "admin".into()),
            generation_endpoint: Url::from_env_or_default(
                "GENERATION__ENDPOINT",
                Url::parse("http://127.0.0.1:9090/v1/generate")
                    .expect("default endpoint should parse"),
            ),
            generation_api_key: Option::from_env_or_default("GENERATION__API_KEY", None),
            worker_count: usize::from_env_or_default("GENERATION__WORKER_COUNT", 2),
            retry_max_attempts: u32::from_env_or_default("GENERATION__MAX_ATTEMPTS", 3),
            retry_initial_delay_ms: u64::from_env_or_default("GENERATION__INITIAL_DELAY_MS", 1000),
            caption_font_path: String::from_env_or_default(
                "COMPOSE__FONT_PATH",
                "assets/caption.ttf".into(),
            ),
            run_history_limit: usize::from_env_or_default("RUN_HISTORY_LIMIT", 50),
        }
    }
}
