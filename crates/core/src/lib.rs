pub mod config;
pub mod prompts;

pub use config::{
    AgentConfig, AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, LlmConfig, LoadOptions,
    LogFormat, LoggingConfig,
};
pub use prompts::SystemDirectives;
