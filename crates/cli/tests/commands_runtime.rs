use std::env;
use std::sync::{Mutex, OnceLock};

use flowmaster_cli::commands::{config, employee, migrate, seed};
use serde_json::Value;

const KEY: &str = "cli-test-encryption-secret";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("FLOWMASTER_DATABASE_URL", "sqlite::memory:"), ("FLOWMASTER_ENCRYPTION_KEY", KEY)],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["error_class"], Value::Null);
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_encryption_key() {
    with_env(&[("FLOWMASTER_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_creates_demo_account_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("seed.db").display());

    with_env(
        &[("FLOWMASTER_DATABASE_URL", url.as_str()), ("FLOWMASTER_ENCRYPTION_KEY", KEY)],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected first seed invocation success");
            let first_payload = parse_payload(&first.output);
            assert_eq!(first_payload["status"], "ok");
            let first_message = first_payload["message"].as_str().unwrap_or_default();
            assert!(first_message.contains("created"), "{first_message}");

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected second seed invocation success");
            let second_payload = parse_payload(&second.output);
            assert_eq!(second_payload["command"], "seed");
            assert_eq!(second_payload["status"], "ok");
            let second_message = second_payload["message"].as_str().unwrap_or_default();
            assert!(second_message.contains("already present"), "{second_message}");
        },
    );
}

#[test]
fn employee_add_registers_and_rejects_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("employees.db").display());

    with_env(
        &[("FLOWMASTER_DATABASE_URL", url.as_str()), ("FLOWMASTER_ENCRYPTION_KEY", KEY)],
        || {
            let created = employee::add("zhangsan", "张三", "worker", false);
            assert_eq!(created.exit_code, 0);
            let payload = parse_payload(&created.output);
            assert_eq!(payload["command"], "employee add");
            assert!(payload["message"].as_str().unwrap_or_default().contains("as worker"));

            let duplicate = employee::add("zhangsan", "张三二号", "staff", false);
            assert_eq!(duplicate.exit_code, 7);
            assert_eq!(parse_payload(&duplicate.output)["error_class"], "conflict");
        },
    );
}

#[test]
fn employee_add_rejects_unknown_role_before_touching_the_store() {
    with_env(&[], || {
        let result = employee::add("wangwu", "王五", "owner", false);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

#[test]
fn config_reports_sources_and_redacts_secrets() {
    with_env(
        &[
            ("FLOWMASTER_DATABASE_URL", "sqlite::memory:"),
            ("FLOWMASTER_ENCRYPTION_KEY", KEY),
            ("DEEPSEEK_API_KEY", "sk-should-not-appear"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains("- database.url = sqlite::memory: (source: env (FLOWMASTER_DATABASE_URL))"));
            assert!(message.contains("llm.primary.api_key = <redacted"));
            assert!(message.contains("source: env (DEEPSEEK_API_KEY)"));
            assert!(message.contains("- server.port = 5000 (source: default)"));
            assert!(!message.contains("sk-should-not-appear"));
            assert!(!message.contains(KEY));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FLOWMASTER_DATABASE_URL",
        "FLOWMASTER_DATABASE_MAX_CONNECTIONS",
        "FLOWMASTER_DATABASE_TIMEOUT_SECS",
        "FLOWMASTER_LLM_TIMEOUT_SECS",
        "FLOWMASTER_LLM_TEMPERATURE",
        "FLOWMASTER_LLM_PRIMARY_API_KEY",
        "FLOWMASTER_LLM_PRIMARY_BASE_URL",
        "FLOWMASTER_LLM_PRIMARY_MODEL",
        "FLOWMASTER_LLM_SECONDARY_API_KEY",
        "FLOWMASTER_LLM_SECONDARY_BASE_URL",
        "FLOWMASTER_LLM_SECONDARY_MODEL",
        "DEEPSEEK_API_KEY",
        "DEEPSEEK_API_BASE",
        "DASHSCOPE_API_KEY",
        "QIANWEN_API_KEY",
        "QIANWEN_API_BASE",
        "FLOWMASTER_SERVER_BIND_ADDRESS",
        "FLOWMASTER_SERVER_PORT",
        "FLOWMASTER_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FLOWMASTER_SECURITY_ENCRYPTION_KEY",
        "FLOWMASTER_ENCRYPTION_KEY",
        "FLOWMASTER_SECURITY_MAX_INPUT_CHARS",
        "FLOWMASTER_LOGGING_LEVEL",
        "FLOWMASTER_LOGGING_FORMAT",
        "FLOWMASTER_LOG_LEVEL",
        "FLOWMASTER_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
