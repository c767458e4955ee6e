use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use flowmaster_core::domain::actor::ActorContext;
use flowmaster_core::domain::command::{CommandResult, ErrorKind};
use flowmaster_core::domain::conversation::{ChatTurn, ConversationState};
use flowmaster_core::domain::intent::Intent;
use flowmaster_core::domain::parameters::ParameterSet;

use crate::dispatcher::CommandDispatcher;
use crate::extractor::ParameterExtractor;
use crate::guardrails::{GuardDecision, PermissionGuard};
use crate::intent::IntentClassifier;
use crate::response::ResponseAssembler;
use crate::sanitizer::Sanitizer;

/// Everything one pipeline run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutcome {
    pub reply: String,
    pub conversation: ConversationState,
    pub intent: Intent,
    pub parameters: ParameterSet,
    /// `None` only when nothing reached the dispatcher.
    pub result: Option<CommandResult>,
}

impl PipelineOutcome {
    pub fn is_blocked(&self) -> bool {
        self.intent == Intent::SecurityBlocked
    }
}

/// Linear six-stage pipeline: sanitize, guard, classify, extract, dispatch, respond.
///
/// Built once at startup and shared across requests. It keeps no state between calls.
#[derive(Clone)]
pub struct AgentRuntime {
    sanitizer: Sanitizer,
    guard: PermissionGuard,
    classifier: IntentClassifier,
    extractor: ParameterExtractor,
    dispatcher: CommandDispatcher,
    assembler: ResponseAssembler,
}

impl AgentRuntime {
    pub fn new(
        sanitizer: Sanitizer,
        guard: PermissionGuard,
        dispatcher: CommandDispatcher,
        assembler: ResponseAssembler,
    ) -> Self {
        Self {
            sanitizer,
            guard,
            classifier: IntentClassifier::new(),
            extractor: ParameterExtractor::new(),
            dispatcher,
            assembler,
        }
    }

    pub fn has_chat_provider(&self) -> bool {
        self.assembler.has_provider()
    }

    pub async fn process(
        &self,
        message: &str,
        history: Vec<ChatTurn>,
        actor: &ActorContext,
    ) -> PipelineOutcome {
        self.process_on(message, history, actor, Local::now().date_naive()).await
    }

    pub async fn process_on(
        &self,
        message: &str,
        history: Vec<ChatTurn>,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> PipelineOutcome {
        let text = self.sanitizer.sanitize(message);
        let conversation = ConversationState::with_user_message(history, text.clone());

        if let GuardDecision::Deny { reason_code, user_message } =
            self.guard.check(&text, Some(actor.role))
        {
            warn!(
                event_name = "agent.pipeline.blocked",
                user_id = actor.user_id.0,
                role = actor.role.as_str(),
                reason = reason_code,
                "message rejected by permission guard"
            );
            return PipelineOutcome {
                conversation: conversation.with_assistant_reply(user_message.clone()),
                result: Some(CommandResult::failed(ErrorKind::SecurityBlocked, user_message.clone())),
                reply: user_message,
                intent: Intent::SecurityBlocked,
                parameters: ParameterSet::default(),
            };
        }

        let intent = self.classifier.classify(&text);
        let parameters =
            self.extractor.extract_on(&text, intent, actor.role, actor.user_id, today);
        let result = self.dispatcher.dispatch_on(intent, &parameters, actor, today).await;
        let (reply, conversation) = self.assembler.respond(intent, &result, &conversation).await;

        info!(
            event_name = "agent.pipeline.completed",
            user_id = actor.user_id.0,
            intent = intent.as_str(),
            success = result.success,
            "message processed"
        );

        PipelineOutcome { reply, conversation, intent, parameters, result: Some(result) }
    }
}
