use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use flowmaster_core::config::{AppConfig, LlmProviderConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::CommandResult;

/// One reported key with the env variables that can set it, highest precedence first.
struct Field {
    key: &'static str,
    value: String,
    env_keys: Vec<&'static str>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    CommandResult::success("config", render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut fields = vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: vec!["FLOWMASTER_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: vec!["FLOWMASTER_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: vec!["FLOWMASTER_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: vec!["FLOWMASTER_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: vec!["FLOWMASTER_LLM_TEMPERATURE"],
        },
    ];
    fields.extend(provider_fields(
        "primary",
        &config.llm.primary,
        &["FLOWMASTER_LLM_PRIMARY_API_KEY", "DEEPSEEK_API_KEY"],
        &["FLOWMASTER_LLM_PRIMARY_BASE_URL", "DEEPSEEK_API_BASE"],
        &["FLOWMASTER_LLM_PRIMARY_MODEL"],
    ));
    fields.extend(provider_fields(
        "secondary",
        &config.llm.secondary,
        &["FLOWMASTER_LLM_SECONDARY_API_KEY", "DASHSCOPE_API_KEY", "QIANWEN_API_KEY"],
        &["FLOWMASTER_LLM_SECONDARY_BASE_URL", "QIANWEN_API_BASE"],
        &["FLOWMASTER_LLM_SECONDARY_MODEL"],
    ));
    fields.extend([
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: vec!["FLOWMASTER_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: vec!["FLOWMASTER_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: vec!["FLOWMASTER_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "security.encryption_key",
            value: redact_secret(Some(&config.security.encryption_key)),
            env_keys: vec!["FLOWMASTER_SECURITY_ENCRYPTION_KEY", "FLOWMASTER_ENCRYPTION_KEY"],
        },
        Field {
            key: "security.max_input_chars",
            value: config.security.max_input_chars.to_string(),
            env_keys: vec!["FLOWMASTER_SECURITY_MAX_INPUT_CHARS"],
        },
        Field {
            key: "security.escalation_patterns",
            value: format!("{} patterns", config.security.escalation_patterns.len()),
            env_keys: vec![],
        },
        Field {
            key: "security.restricted_keywords",
            value: config.security.restricted_keywords.join(","),
            env_keys: vec![],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: vec!["FLOWMASTER_LOGGING_LEVEL", "FLOWMASTER_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_lowercase(),
            env_keys: vec!["FLOWMASTER_LOGGING_FORMAT", "FLOWMASTER_LOG_FORMAT"],
        },
    ]);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        let source = field_source(
            field.key,
            &field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        format!("- {} = {} (source: {source})", field.key, field.value)
    }));
    lines.join("\n")
}

fn provider_fields(
    slot: &'static str,
    provider: &LlmProviderConfig,
    key_env: &[&'static str],
    base_env: &[&'static str],
    model_env: &[&'static str],
) -> Vec<Field> {
    let (name_key, key_key, base_key, model_key) = match slot {
        "primary" => {
            ("llm.primary.name", "llm.primary.api_key", "llm.primary.base_url", "llm.primary.model")
        }
        _ => (
            "llm.secondary.name",
            "llm.secondary.api_key",
            "llm.secondary.base_url",
            "llm.secondary.model",
        ),
    };

    vec![
        Field { key: name_key, value: provider.name.clone(), env_keys: Vec::new() },
        Field {
            key: key_key,
            value: redact_secret(provider.api_key.as_ref()),
            env_keys: key_env.to_vec(),
        },
        Field { key: base_key, value: provider.base_url.clone(), env_keys: base_env.to_vec() },
        Field { key: model_key, value: provider.model.clone(), env_keys: model_env.to_vec() },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("flowmaster.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/flowmaster.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().chars().count()) {
        None | Some(0) => "<unset>".to_string(),
        Some(length) => format!("<redacted:{length} chars>"),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn redaction_never_echoes_secret_material() {
        let secret = SecretString::from("super-secret-value".to_string());
        let rendered = redact_secret(Some(&secret));
        assert!(!rendered.contains("super"));
        assert_eq!(rendered, "<redacted:18 chars>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_in_nested_tables() {
        let doc: toml::Value = "[llm.primary]\nmodel = \"deepseek-chat\"".parse().expect("toml");
        assert!(contains_path(&doc, "llm.primary.model"));
        assert!(!contains_path(&doc, "llm.secondary.model"));
    }
}
