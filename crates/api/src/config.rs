//! Environment-driven service configuration, read once at startup.

use std::time::Duration;

use jobrunner_infra::jobs::JobRuntimeConfig;
use jobrunner_infra::workers::WriteRetry;

/// Invalid environment value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Where job records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres { url: String },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreConfig,
    pub runtime: JobRuntimeConfig,
    pub shutdown_grace: Duration,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or(&var, "APP_PORT", 8000u16, "a port number")?;

        let database_url = var("DATABASE_URL").or_else(|| postgres_url_from_parts(&var));
        let persistent = match var("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => database_url.is_some(),
        };
        let store = match (persistent, database_url) {
            (true, Some(url)) => StoreConfig::Postgres { url },
            (true, None) => {
                return Err(ConfigError::Invalid {
                    name: "USE_PERSISTENT_STORES",
                    expected: "false when no DATABASE_URL or DB_HOST is set",
                    value: "true".to_string(),
                });
            }
            (false, _) => StoreConfig::InMemory,
        };

        let name = var("WORKER_NAME")
            .or_else(|| var("HOSTNAME"))
            .unwrap_or_else(|| "jobrunner".to_string());

        let timeout_secs: u64 = parse_or(&var, "JOB_TIMEOUT_SECS", 0, "a number of seconds")?;
        let attempts: u32 = parse_or(&var, "COMPLETION_WRITE_ATTEMPTS", 3, "a positive integer")?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "COMPLETION_WRITE_ATTEMPTS",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }

        let runtime = JobRuntimeConfig::default()
            .with_name(name)
            .with_pool_size(positive(&var, "WORKER_POOL_SIZE", 8)?)
            .with_queue_capacity(positive(&var, "SUBMISSION_QUEUE_CAPACITY", 1024)?)
            .with_completion_capacity(positive(&var, "COMPLETION_CHANNEL_CAPACITY", 100)?)
            .with_shell(var("JOB_SHELL").unwrap_or_else(|| "bash".to_string()))
            .with_job_timeout((timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)))
            .with_write_retry(WriteRetry::default().with_max_attempts(attempts));

        let grace: u64 = parse_or(&var, "SHUTDOWN_GRACE_SECS", 10, "a number of seconds")?;

        Ok(Self {
            port,
            store,
            runtime,
            shutdown_grace: Duration::from_secs(grace),
        })
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

fn positive<V>(var: &V, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    let value = parse_or(var, name, default, "a positive integer")?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "true or false",
            value: value.to_string(),
        }),
    }
}

/// Build a Postgres URL from `DB_HOST`, `DB_PORT`, `DB_USERNAME`,
/// `DB_PASSWORD`, `DB_TABLE` (database name) and `SSL_MODE`.
fn postgres_url_from_parts<V>(var: &V) -> Option<String>
where
    V: Fn(&str) -> Option<String>,
{
    let host = var("DB_HOST")?;
    let port = var("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let database = var("DB_TABLE").unwrap_or_else(|| "postgres".to_string());

    let credentials = match (var("DB_USERNAME"), var("DB_PASSWORD")) {
        (Some(user), Some(password)) => format!("{user}:{password}@"),
        (Some(user), None) => format!("{user}@"),
        _ => String::new(),
    };

    let mut url = format!("postgres://{credentials}{host}:{port}/{database}");
    if let Some(mode) = var("SSL_MODE") {
        url.push_str("?sslmode=");
        url.push_str(&mode);
    }
    Some(url)
}
