use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ESCALATION_PATTERNS: &[&str] = &[
    r"以.*?身份",
    r"作为.*?管理员",
    r"使用.*?权限",
    r"提升.*?权限",
    r"切换.*?角色",
    r"manager|admin|管理员|店长",
    r"绕过|跳过|忽略.*?检查|权限.*?提升",
    r"\bas\s+(an?\s+)?(admin|administrator|manager|root)\b",
    r"(switch|change)\s+(to|my)\s+.*\brole\b",
    r"(bypass|skip|ignore)\s+.*\b(check|checks|permission|permissions|rules?)\b",
    r"(elevat|escalat)\w*\s+.*\b(privilege|permission)s?\b",
];

pub const DEFAULT_RESTRICTED_KEYWORDS: &[&str] =
    &["周报", "月报", "年报", "管理报表", "员工管理", "删除", "修改他人"];

const MIN_ENCRYPTION_KEY_CHARS: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub timeout_secs: u64,
    pub temperature: f32,
    pub primary: LlmProviderConfig,
    pub secondary: LlmProviderConfig,
}

/// One OpenAI-compatible chat-completion endpoint.
#[derive(Clone, Debug)]
pub struct LlmProviderConfig {
    pub name: String,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

impl LlmProviderConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl LlmConfig {
    pub fn any_provider_configured(&self) -> bool {
        self.primary.is_configured() || self.secondary.is_configured()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub encryption_key: SecretString,
    pub max_input_chars: usize,
    pub escalation_patterns: Vec<String>,
    pub restricted_keywords: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new().into(),
            max_input_chars: 1000,
            escalation_patterns: DEFAULT_ESCALATION_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            restricted_keywords: DEFAULT_RESTRICTED_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub encryption_key: Option<String>,
    pub primary_api_key: Option<String>,
    pub secondary_api_key: Option<String>,
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
                url: "sqlite://flowmaster.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                timeout_secs: 30,
                temperature: 0.7,
                primary: LlmProviderConfig {
                    name: "deepseek".to_string(),
                    api_key: None,
                    base_url: "https://api.deepseek.com".to_string(),
                    model: "deepseek-chat".to_string(),
                },
                secondary: LlmProviderConfig {
                    name: "qianwen".to_string(),
                    api_key: None,
                    base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
                    model: "qwen3-omni-flash".to_string(),
                },
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                graceful_shutdown_secs: 15,
            },
            security: SecurityConfig::default(),
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("flowmaster.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(primary) = llm.primary {
                primary.apply_to(&mut self.llm.primary);
            }
            if let Some(secondary) = llm.secondary {
                secondary.apply_to(&mut self.llm.secondary);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(security) = patch.security {
            if let Some(encryption_key) = security.encryption_key {
                self.security.encryption_key = secret_value(encryption_key);
            }
            if let Some(max_input_chars) = security.max_input_chars {
                self.security.max_input_chars = max_input_chars;
            }
            if let Some(escalation_patterns) = security.escalation_patterns {
                self.security.escalation_patterns = escalation_patterns;
            }
            if let Some(restricted_keywords) = security.restricted_keywords {
                self.security.restricted_keywords = restricted_keywords;
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
        if let Some(value) = read_env("FLOWMASTER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FLOWMASTER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FLOWMASTER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FLOWMASTER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FLOWMASTER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLOWMASTER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FLOWMASTER_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FLOWMASTER_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("FLOWMASTER_LLM_TEMPERATURE", &value)?;
        }

        let primary_key =
            read_env("FLOWMASTER_LLM_PRIMARY_API_KEY").or_else(|| read_env("DEEPSEEK_API_KEY"));
        if let Some(value) = primary_key {
            self.llm.primary.api_key = Some(secret_value(value));
        }
        let primary_base =
            read_env("FLOWMASTER_LLM_PRIMARY_BASE_URL").or_else(|| read_env("DEEPSEEK_API_BASE"));
        if let Some(value) = primary_base {
            self.llm.primary.base_url = value;
        }
        if let Some(value) = read_env("FLOWMASTER_LLM_PRIMARY_MODEL") {
            self.llm.primary.model = value;
        }

        let secondary_key = read_env("FLOWMASTER_LLM_SECONDARY_API_KEY")
            .or_else(|| read_env("DASHSCOPE_API_KEY"))
            .or_else(|| read_env("QIANWEN_API_KEY"));
        if let Some(value) = secondary_key {
            self.llm.secondary.api_key = Some(secret_value(value));
        }
        let secondary_base = read_env("FLOWMASTER_LLM_SECONDARY_BASE_URL")
            .or_else(|| read_env("QIANWEN_API_BASE"));
        if let Some(value) = secondary_base {
            self.llm.secondary.base_url = value;
        }
        if let Some(value) = read_env("FLOWMASTER_LLM_SECONDARY_MODEL") {
            self.llm.secondary.model = value;
        }

        if let Some(value) = read_env("FLOWMASTER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FLOWMASTER_SERVER_PORT") {
            self.server.port = parse_u16("FLOWMASTER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FLOWMASTER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FLOWMASTER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let encryption_key = read_env("FLOWMASTER_SECURITY_ENCRYPTION_KEY")
            .or_else(|| read_env("FLOWMASTER_ENCRYPTION_KEY"));
        if let Some(value) = encryption_key {
            self.security.encryption_key = secret_value(value);
        }
        if let Some(value) = read_env("FLOWMASTER_SECURITY_MAX_INPUT_CHARS") {
            self.security.max_input_chars =
                parse_u64("FLOWMASTER_SECURITY_MAX_INPUT_CHARS", &value)? as usize;
        }

        let log_level =
            read_env("FLOWMASTER_LOGGING_LEVEL").or_else(|| read_env("FLOWMASTER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FLOWMASTER_LOGGING_FORMAT").or_else(|| read_env("FLOWMASTER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(encryption_key) = overrides.encryption_key {
            self.security.encryption_key = secret_value(encryption_key);
        }
        if let Some(api_key) = overrides.primary_api_key {
            self.llm.primary.api_key = Some(secret_value(api_key));
        }
        if let Some(api_key) = overrides.secondary_api_key {
            self.llm.secondary.api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_security(&self.security)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("flowmaster.toml"), PathBuf::from("config/flowmaster.toml")]
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
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
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

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    for (section, provider) in [("llm.primary", &llm.primary), ("llm.secondary", &llm.secondary)] {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{section}.name must not be empty")));
        }
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "{section}.base_url must start with http:// or https://"
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{section}.model must not be empty")));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_security(security: &SecurityConfig) -> Result<(), ConfigError> {
    let key = security.encryption_key.expose_secret();
    if key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "security.encryption_key is required (set FLOWMASTER_SECURITY_ENCRYPTION_KEY)"
                .to_string(),
        ));
    }
    if key.chars().count() < MIN_ENCRYPTION_KEY_CHARS {
        return Err(ConfigError::Validation(format!(
            "security.encryption_key must be at least {MIN_ENCRYPTION_KEY_CHARS} characters"
        )));
    }

    if security.max_input_chars == 0 {
        return Err(ConfigError::Validation(
            "security.max_input_chars must be greater than zero".to_string(),
        ));
    }

    for pattern in &security.escalation_patterns {
        if let Err(error) = Regex::new(pattern) {
            return Err(ConfigError::Validation(format!(
                "security.escalation_patterns contains an invalid regex `{pattern}`: {error}"
            )));
        }
    }

    if security.restricted_keywords.iter().any(|keyword| keyword.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "security.restricted_keywords must not contain empty entries".to_string(),
        ));
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

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    security: Option<SecurityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    primary: Option<LlmProviderPatch>,
    secondary: Option<LlmProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmProviderPatch {
    name: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

impl LlmProviderPatch {
    fn apply_to(self, provider: &mut LlmProviderConfig) {
        if let Some(name) = self.name {
            provider.name = name;
        }
        if let Some(api_key) = self.api_key.filter(|value| !value.trim().is_empty()) {
            provider.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = self.base_url {
            provider.base_url = base_url;
        }
        if let Some(model) = self.model {
            provider.model = model;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPatch {
    encryption_key: Option<String>,
    max_input_chars: Option<usize>,
    escalation_patterns: Option<Vec<String>>,
    restricted_keywords: Option<Vec<String>>,
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

    const TEST_KEY: &str = "test-encryption-key-0123";

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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_FLOWMASTER_KEY", TEST_KEY);
        env::set_var("TEST_DEEPSEEK_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("flowmaster.toml");
            fs::write(
                &path,
                r#"
[security]
encryption_key = "${TEST_FLOWMASTER_KEY}"

[llm.primary]
api_key = "${TEST_DEEPSEEK_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.security.encryption_key.expose_secret() == TEST_KEY,
                "encryption key should be interpolated from environment",
            )?;
            ensure(
                config.llm.primary.is_configured() && !config.llm.secondary.is_configured(),
                "only the primary provider should be configured",
            )?;
            ensure(config.llm.primary.model == "deepseek-chat", "primary model keeps its default")?;
            Ok(())
        })();

        clear_vars(&["TEST_FLOWMASTER_KEY", "TEST_DEEPSEEK_KEY"]);
        result
    }

    #[test]
    fn provider_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLOWMASTER_ENCRYPTION_KEY", TEST_KEY);
        env::set_var("DASHSCOPE_API_KEY", "sk-dashscope");
        env::set_var("QIANWEN_API_BASE", "https://qianwen.example.com/v1");
        env::set_var("FLOWMASTER_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.secondary.is_configured(), "secondary key should come from alias")?;
            ensure(
                config.llm.secondary.base_url == "https://qianwen.example.com/v1",
                "secondary base url should come from alias",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "FLOWMASTER_ENCRYPTION_KEY",
            "DASHSCOPE_API_KEY",
            "QIANWEN_API_BASE",
            "FLOWMASTER_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FLOWMASTER_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("FLOWMASTER_SERVER_PORT", "6100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("flowmaster.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7000

[security]
encryption_key = "file-encryption-key-0001"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 6100, "env port should win over file and defaults")?;
            ensure(
                config.security.max_input_chars == 1000,
                "max input chars keeps its default",
            )?;
            Ok(())
        })();

        clear_vars(&["FLOWMASTER_DATABASE_URL", "FLOWMASTER_SERVER_PORT"]);
        result
    }

    #[test]
    fn missing_encryption_key_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("security.encryption_key")
        );
        ensure(has_message, "validation failure should mention security.encryption_key")
    }

    #[test]
    fn short_encryption_key_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                encryption_key: Some("short".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("at least 16")),
            "short key should be rejected",
        )
    }

    #[test]
    fn invalid_escalation_pattern_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("flowmaster.toml");
        fs::write(
            &path,
            r#"
[security]
encryption_key = "file-encryption-key-0001"
escalation_patterns = ["(unclosed"]
"#,
        )
        .map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("invalid regex")),
            "invalid regex should be rejected at load time",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                encryption_key: Some("super-secret-encryption-key".to_string()),
                primary_api_key: Some("sk-super-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        let debug = format!("{config:?}");

        ensure(
            !debug.contains("super-secret-encryption-key"),
            "debug output should not contain the encryption key",
        )?;
        ensure(!debug.contains("sk-super-secret"), "debug output should not contain api keys")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.security.escalation_patterns.len() == 11, "default patterns are loaded")?;
        Ok(())
    }
}
