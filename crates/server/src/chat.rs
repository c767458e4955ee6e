//! `POST /api/ai/chat`: one authenticated chat turn through the agent pipeline.
//!
//! The caller identity is supplied by the authentication layer in front of this service as
//! the `x-user-id` header and resolved against the employee store on every request.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use flowmaster_agent::AgentRuntime;
use flowmaster_core::domain::actor::{ActorContext, EmployeeId};
use flowmaster_core::domain::command::CommandResult;
use flowmaster_core::domain::conversation::ChatTurn;
use flowmaster_core::domain::intent::Intent;
use flowmaster_core::errors::{ApplicationError, InterfaceError};
use flowmaster_db::EmployeeRepository;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
const PROVIDER_MISSING_REPLY: &str = "抱歉，AI功能暂时不可用。请检查API配置或联系管理员。";

#[derive(Clone)]
pub struct ChatState {
    runtime: AgentRuntime,
    employees: Arc<dyn EmployeeRepository>,
}

impl ChatState {
    pub fn new(runtime: AgentRuntime, employees: Arc<dyn EmployeeRepository>) -> Self {
        Self { runtime, employees }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub messages: Vec<ChatTurn>,
    pub intent: Intent,
    pub api_result: Option<CommandResult>,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

pub type ChatRejection = (StatusCode, Json<ChatError>);

pub fn router(state: ChatState) -> Router {
    Router::new().route("/api/ai/chat", post(chat)).with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ChatRejection> {
    let correlation_id = Uuid::new_v4().to_string();
    let actor = resolve_actor(&state, &headers, &correlation_id).await?;

    if request.message.trim().is_empty() {
        return Err(reject(
            InterfaceError::BadRequest {
                message: "message must not be empty".to_string(),
                correlation_id,
            },
            None,
        ));
    }

    if !state.runtime.has_chat_provider() {
        error!(
            event_name = "server.chat.no_provider",
            correlation_id = %correlation_id,
            "chat request refused: no chat provider configured"
        );
        return Err(reject(
            InterfaceError::Internal {
                message: "no chat provider configured".to_string(),
                correlation_id,
            },
            Some(PROVIDER_MISSING_REPLY.to_string()),
        ));
    }

    let outcome = state.runtime.process(&request.message, request.history, &actor).await;
    info!(
        event_name = "server.chat.completed",
        correlation_id = %correlation_id,
        user_id = actor.user_id.0,
        intent = outcome.intent.as_str(),
        "chat request completed"
    );

    if outcome.is_blocked() {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(ChatResponse {
                response: outcome.reply,
                messages: outcome.conversation.into_turns(),
                intent: Intent::SecurityBlocked,
                api_result: None,
            }),
        ));
    }

    let api_result = outcome
        .result
        .filter(|result| result.success && outcome.intent.is_actionable());

    Ok((
        StatusCode::OK,
        Json(ChatResponse {
            response: outcome.reply,
            messages: outcome.conversation.into_turns(),
            intent: outcome.intent,
            api_result,
        }),
    ))
}

async fn resolve_actor(
    state: &ChatState,
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<ActorContext, ChatRejection> {
    let unauthorized = |message: &str| {
        warn!(
            event_name = "server.chat.unauthorized",
            correlation_id = %correlation_id,
            reason = message,
            "chat request without a usable identity"
        );
        reject(
            InterfaceError::Unauthorized {
                message: message.to_string(),
                correlation_id: correlation_id.to_string(),
            },
            None,
        )
    };

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| unauthorized("missing or malformed user id header"))?;

    let employee = state.employees.find_by_id(EmployeeId(user_id)).await.map_err(|source| {
        error!(
            event_name = "server.chat.identity_lookup_failed",
            correlation_id = %correlation_id,
            error = %source,
            "employee lookup failed"
        );
        reject(
            ApplicationError::Persistence(source.to_string()).into_interface(correlation_id),
            None,
        )
    })?;

    match employee {
        Some(employee) if employee.is_active => {
            Ok(ActorContext::new(employee.id, employee.role, employee.is_demo))
        }
        Some(_) => Err(unauthorized("employee is inactive")),
        None => Err(unauthorized("employee not found")),
    }
}

fn reject(interface: InterfaceError, response: Option<String>) -> ChatRejection {
    let status = match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ChatError {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
            response,
        }),
    )
}
