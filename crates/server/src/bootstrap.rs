use std::sync::Arc;

use flowmaster_agent::{
    AgentRuntime, ChatCompletion, CommandDispatcher, GuardError, LlmError,
    OpenAiCompatibleClient, PermissionGuard, ResponseAssembler, Sanitizer,
};
use flowmaster_core::config::{AppConfig, ConfigError, LoadOptions};
use flowmaster_core::crypto::{CryptoError, DetailCipher};
use flowmaster_db::{
    connect_with_settings, migrations, DbPool, EmployeeRepository, SqlEmployeeRepository,
    SqlTransactionRepository,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: AgentRuntime,
    pub employees: Arc<dyn EmployeeRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("detail encryption could not be initialised: {0}")]
    Crypto(#[from] CryptoError),
    #[error("permission guard could not be built: {0}")]
    Guard(#[from] GuardError),
    #[error("chat provider could not be built: {0}")]
    ChatProvider(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let cipher = DetailCipher::from_secret(&config.security.encryption_key)?;
    let employees: Arc<dyn EmployeeRepository> =
        Arc::new(SqlEmployeeRepository::new(db_pool.clone()));
    let transactions = Arc::new(SqlTransactionRepository::new(db_pool.clone(), cipher));

    let providers: Vec<Arc<dyn ChatCompletion>> = OpenAiCompatibleClient::from_config(&config.llm)?
        .into_iter()
        .map(|client| Arc::new(client) as Arc<dyn ChatCompletion>)
        .collect();
    if providers.is_empty() {
        warn!(
            event_name = "system.bootstrap.no_chat_provider",
            correlation_id = "bootstrap",
            "no chat provider configured; chat requests will be refused"
        );
    } else {
        info!(
            event_name = "system.bootstrap.chat_providers",
            correlation_id = "bootstrap",
            providers = providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(","),
            "chat providers configured"
        );
    }

    let runtime = AgentRuntime::new(
        Sanitizer::new(config.security.max_input_chars),
        PermissionGuard::from_config(&config.security)?,
        CommandDispatcher::new(transactions, employees.clone()),
        ResponseAssembler::new(providers, config.llm.temperature),
    );

    Ok(Application { config, db_pool, runtime, employees })
}
