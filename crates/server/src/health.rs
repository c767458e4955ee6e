use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use flowmaster_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    assistant_configured: bool,
}

impl HealthState {
    pub fn new(db_pool: DbPool, assistant_configured: bool) -> Self {
        Self { db_pool, assistant_configured }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub status: &'static str,
    pub detail: String,
}

impl ComponentStatus {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready", detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded", detail: detail.into() }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub store: ComponentStatus,
    pub assistant: ComponentStatus,
    pub active_employees: Option<i64>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Only the store gates the status code; a missing chat provider is reported but still serves 200.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let (store, active_employees) = match count_active_employees(&state.db_pool).await {
        Ok(count) => (ComponentStatus::ready("employee store reachable"), Some(count)),
        Err(error) => {
            tracing::warn!(
                event_name = "system.health.store_unreachable",
                error = %error,
                "health check could not reach the employee store"
            );
            (ComponentStatus::degraded(format!("employee store unreachable: {error}")), None)
        }
    };
    let assistant = if state.assistant_configured {
        ComponentStatus::ready("chat provider configured")
    } else {
        ComponentStatus::degraded("no chat provider configured")
    };

    let status_code = if store.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let report = HealthReport {
        status: if store.is_ready() && assistant.is_ready() { "ready" } else { "degraded" },
        store,
        assistant,
        active_employees,
        checked_at: Utc::now().to_rfc3339(),
    };
    (status_code, Json(report))
}

async fn count_active_employees(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = 1")
        .fetch_one(pool)
        .await
}
