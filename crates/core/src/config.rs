use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub recycle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub row_limit: u32,
    pub max_tool_round_trips: u32,
    pub domain_knowledge_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_name: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new().into(),
                database: "askdb".to_string(),
                max_connections: 5,
                acquire_timeout_secs: 30,
                recycle_secs: 3600,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
            },
            agent: AgentConfig {
                row_limit: 100,
                max_tool_round_trips: 1,
                domain_knowledge_path: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("askdb.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(host) = database.host {
                self.database.host = host;
            }
            if let Some(port) = database.port {
                self.database.port = port;
            }
            if let Some(user) = database.user {
                self.database.user = user;
            }
            if let Some(database_password_value) = database.password {
                self.database.password = secret_value(database_password_value);
            }
            if let Some(name) = database.name {
                self.database.database = name;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(acquire_timeout_secs) = database.acquire_timeout_secs {
                self.database.acquire_timeout_secs = acquire_timeout_secs;
            }
            if let Some(recycle_secs) = database.recycle_secs {
                self.database.recycle_secs = recycle_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(row_limit) = agent.row_limit {
                self.agent.row_limit = row_limit;
            }
            if let Some(max_tool_round_trips) = agent.max_tool_round_trips {
                self.agent.max_tool_round_trips = max_tool_round_trips;
            }
            if let Some(domain_knowledge_path) = agent.domain_knowledge_path {
                self.agent.domain_knowledge_path = Some(domain_knowledge_path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ASKDB_DATABASE_HOST") {
            self.database.host = value;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_PORT") {
            self.database.port = parse_u16("ASKDB_DATABASE_PORT", &value)?;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_USER") {
            self.database.user = value;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_PASSWORD") {
            self.database.password = secret_value(value);
        }
        if let Some(value) = read_env("ASKDB_DATABASE_NAME") {
            self.database.database = value;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ASKDB_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs =
                parse_u64("ASKDB_DATABASE_ACQUIRE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ASKDB_DATABASE_RECYCLE_SECS") {
            self.database.recycle_secs = parse_u64("ASKDB_DATABASE_RECYCLE_SECS", &value)?;
        }

        if let Some(value) = read_env("ASKDB_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ASKDB_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("ASKDB_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ASKDB_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ASKDB_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ASKDB_AGENT_ROW_LIMIT") {
            self.agent.row_limit = parse_u32("ASKDB_AGENT_ROW_LIMIT", &value)?;
        }
        if let Some(value) = read_env("ASKDB_AGENT_MAX_TOOL_ROUND_TRIPS") {
            self.agent.max_tool_round_trips =
                parse_u32("ASKDB_AGENT_MAX_TOOL_ROUND_TRIPS", &value)?;
        }
        if let Some(value) = read_env("ASKDB_AGENT_DOMAIN_KNOWLEDGE_PATH") {
            self.agent.domain_knowledge_path = Some(PathBuf::from(value));
        }

        let log_level = read_env("ASKDB_LOGGING_LEVEL").or_else(|| read_env("ASKDB_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ASKDB_LOGGING_FORMAT").or_else(|| read_env("ASKDB_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_name) = overrides.database_name {
            self.database.database = database_name;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("askdb.toml"), PathBuf::from("config/askdb.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    if database.host.trim().is_empty() {
        return Err(ConfigError::Validation("database.host must not be empty".to_string()));
    }
    if database.port == 0 {
        return Err(ConfigError::Validation(
            "database.port must be greater than zero".to_string(),
        ));
    }
    if database.user.trim().is_empty() {
        return Err(ConfigError::Validation("database.user must not be empty".to_string()));
    }
    if database.database.trim().is_empty() {
        return Err(ConfigError::Validation("database.name must not be empty".to_string()));
    }
    if !database.database.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(ConfigError::Validation(
            "database.name may only contain letters, digits, and `_`".to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.acquire_timeout_secs == 0 || database.acquire_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.acquire_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if database.recycle_secs == 0 {
        return Err(ConfigError::Validation(
            "database.recycle_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key must not be blank when set. Unset it or provide a real key".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.row_limit == 0 || agent.row_limit > 10_000 {
        return Err(ConfigError::Validation(
            "agent.row_limit must be in range 1..=10000".to_string(),
        ));
    }

    // The round-trip cap must stay finite; 8 is already far past useful.
    if agent.max_tool_round_trips == 0 || agent.max_tool_round_trips > 8 {
        return Err(ConfigError::Validation(
            "agent.max_tool_round_trips must be in range 1..=8".to_string(),
        ));
    }

    if let Some(path) = &agent.domain_knowledge_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "agent.domain_knowledge_path does not exist: `{}`",
                path.display()
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
    recycle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    row_limit: Option<u32>,
    max_tool_round_trips: Option<u32>,
    domain_knowledge_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_input() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.port == 3306, "default database port should be 3306")?;
        ensure(config.agent.row_limit == 100, "default row limit should be 100")?;
        ensure(
            config.agent.max_tool_round_trips == 1,
            "default tool round-trip cap should be 1",
        )?;
        ensure(config.llm.model == "gpt-4o-mini", "default model should be gpt-4o-mini")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ASKDB_DB_PASSWORD", "pw-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("askdb.toml");
            fs::write(
                &path,
                r#"
[database]
password = "${TEST_ASKDB_DB_PASSWORD}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.password.expose_secret() == "pw-from-env",
                "database password should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_ASKDB_DB_PASSWORD"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASKDB_DATABASE_NAME", "from_env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("askdb.toml");
            fs::write(
                &path,
                r#"
[database]
name = "from_file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.database.database == "from_env", "env database name should win")?;
            ensure(config.logging.level == "debug", "override log level should win")
        })();

        clear_vars(&["ASKDB_DATABASE_NAME"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASKDB_AGENT_MAX_TOOL_ROUND_TRIPS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("max_tool_round_trips")
            );
            ensure(has_message, "validation failure should mention max_tool_round_trips")
        })();

        clear_vars(&["ASKDB_AGENT_MAX_TOOL_ROUND_TRIPS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASKDB_DATABASE_PASSWORD", "db-secret-value");
        env::set_var("ASKDB_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("db-secret-value"),
                "debug output should not contain database password",
            )?;
            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["ASKDB_DATABASE_PASSWORD", "ASKDB_LLM_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASKDB_LOG_LEVEL", "warn");
        env::set_var("ASKDB_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["ASKDB_LOG_LEVEL", "ASKDB_LOG_FORMAT"]);
        result
    }
}
