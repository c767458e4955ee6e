use std::sync::Arc;

use tracing::warn;

use flowmaster_core::domain::command::CommandResult;
use flowmaster_core::domain::conversation::{ChatTurn, ConversationState};
use flowmaster_core::domain::intent::Intent;

use crate::llm::ChatCompletion;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const HELP_SUFFIX: &str = "如需更多帮助，请告诉我具体需求。";

const ASSISTANT_PREAMBLE: &str = "你是一个友好的AI助手，帮助用户管理每日流水数据。
你可以帮助用户：
1. 录入流水记录
2. 查询流水数据
3. 生成各类报表（日报、周报、月报、年报）
4. 查看员工信息

请用自然、友好的语言回复用户。";

/// Phrases a dispatch result for the user. Never changes the intent or the result.
#[derive(Clone)]
pub struct ResponseAssembler {
    providers: Vec<Arc<dyn ChatCompletion>>,
    temperature: f32,
}

impl ResponseAssembler {
    /// `providers` are tried in order; the second only after the first has failed.
    pub fn new(providers: Vec<Arc<dyn ChatCompletion>>, temperature: f32) -> Self {
        Self { providers, temperature }
    }

    /// Fallback-only assembler, used when no chat provider is configured.
    pub fn literal() -> Self {
        Self::new(Vec::new(), DEFAULT_TEMPERATURE)
    }

    pub fn has_provider(&self) -> bool {
        !self.providers.is_empty()
    }

    pub async fn respond(
        &self,
        intent: Intent,
        result: &CommandResult,
        conversation: &ConversationState,
    ) -> (String, ConversationState) {
        let reply = if result.success {
            self.phrase(intent, result, conversation).await
        } else {
            result.message.clone()
        };
        let updated = conversation.with_assistant_reply(reply.clone());
        (reply, updated)
    }

    async fn phrase(
        &self,
        intent: Intent,
        result: &CommandResult,
        conversation: &ConversationState,
    ) -> String {
        let messages = chat_context(intent, result, conversation);

        for provider in &self.providers {
            match provider.complete(&messages, self.temperature).await {
                Ok(reply) => return reply,
                Err(error) => warn!(
                    event_name = "agent.response.provider_failed",
                    provider = provider.name(),
                    intent = intent.as_str(),
                    error = %error,
                    "chat provider failed, trying next"
                ),
            }
        }

        literal_reply(result)
    }
}

/// System preamble with the dispatch outcome, followed by the latest user turn only.
fn chat_context(
    intent: Intent,
    result: &CommandResult,
    conversation: &ConversationState,
) -> Vec<ChatTurn> {
    let mut system = format!(
        "{ASSISTANT_PREAMBLE}\n\n当前意图：{}\n处理结果：{}",
        intent.as_str(),
        result.message
    );
    if let Some(data) = &result.data {
        system.push_str(&format!("\n结果数据：{data}"));
    }

    let mut messages = vec![ChatTurn::system(system)];
    if let Some(latest) = conversation.latest_user_message() {
        messages.push(ChatTurn::user(latest));
    }
    messages
}

pub fn literal_reply(result: &CommandResult) -> String {
    format!("{}\n\n{HELP_SUFFIX}", result.message)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use flowmaster_core::domain::command::{CommandResult, ErrorKind};
    use flowmaster_core::domain::conversation::{ChatRole, ChatTurn, ConversationState};
    use flowmaster_core::domain::intent::Intent;

    use super::{ResponseAssembler, HELP_SUFFIX};
    use crate::llm::{ChatCompletion, LlmError};

    struct Scripted {
        name: &'static str,
        reply: Result<&'static str, ()>,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl Scripted {
        fn new(name: &'static str, reply: Result<&'static str, ()>) -> Arc<Self> {
            Arc::new(Self { name, reply, seen: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl ChatCompletion for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, messages: &[ChatTurn], _: f32) -> Result<String, LlmError> {
            self.seen.lock().expect("lock").push(messages.to_vec());
            self.reply
                .map(str::to_string)
                .map_err(|()| LlmError::HttpStatus { provider: self.name.to_string(), status: 503 })
        }
    }

    fn chain(providers: &[&Arc<Scripted>]) -> Vec<Arc<dyn ChatCompletion>> {
        providers.iter().map(|provider| Arc::clone(*provider) as Arc<dyn ChatCompletion>).collect()
    }

    fn conversation() -> ConversationState {
        ConversationState::with_user_message(
            vec![ChatTurn::user("早上好"), ChatTurn::assistant("您好")],
            "查询今天的流水",
        )
    }

    fn ok_result() -> CommandResult {
        CommandResult::ok("已为您查询到1条流水记录", Some(json!({"count": 1})))
    }

    #[tokio::test]
    async fn primary_reply_is_used_and_secondary_untouched() {
        let primary = Scripted::new("deepseek", Ok("今天共有1条记录。"));
        let secondary = Scripted::new("qianwen", Ok("unused"));
        let assembler = ResponseAssembler::new(chain(&[&primary, &secondary]), 0.7);

        let (reply, updated) =
            assembler.respond(Intent::QueryTransactions, &ok_result(), &conversation()).await;

        assert_eq!(reply, "今天共有1条记录。");
        assert_eq!(secondary.calls(), 0);
        assert_eq!(updated.turns().last(), Some(&ChatTurn::assistant("今天共有1条记录。")));
    }

    #[tokio::test]
    async fn context_holds_preamble_and_latest_user_turn_only() {
        let primary = Scripted::new("deepseek", Ok("ok"));
        let assembler = ResponseAssembler::new(chain(&[&primary]), 0.7);

        assembler.respond(Intent::QueryTransactions, &ok_result(), &conversation()).await;

        let seen = primary.seen.lock().expect("lock");
        let context = &seen[0];
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].role, ChatRole::System);
        assert!(context[0].content.contains("已为您查询到1条流水记录"));
        assert_eq!(context[1], ChatTurn::user("查询今天的流水"));
    }

    #[tokio::test]
    async fn secondary_is_tried_after_primary_fails() {
        let primary = Scripted::new("deepseek", Err(()));
        let secondary = Scripted::new("qianwen", Ok("来自备用服务的回复"));
        let assembler = ResponseAssembler::new(chain(&[&primary, &secondary]), 0.7);

        let (reply, _) =
            assembler.respond(Intent::QueryTransactions, &ok_result(), &conversation()).await;

        assert_eq!(reply, "来自备用服务的回复");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn both_failing_falls_back_to_literal_message() {
        let primary = Scripted::new("deepseek", Err(()));
        let secondary = Scripted::new("qianwen", Err(()));
        let assembler = ResponseAssembler::new(chain(&[&primary, &secondary]), 0.7);

        let (reply, updated) =
            assembler.respond(Intent::QueryTransactions, &ok_result(), &conversation()).await;

        assert_eq!(reply, format!("已为您查询到1条流水记录\n\n{HELP_SUFFIX}"));
        assert_eq!(updated.turns().len(), conversation().turns().len() + 1);
    }

    #[tokio::test]
    async fn failed_results_are_returned_verbatim_without_calling_providers() {
        let primary = Scripted::new("deepseek", Ok("should not be used"));
        let assembler = ResponseAssembler::new(chain(&[&primary]), 0.7);
        let failed = CommandResult::failed(ErrorKind::Forbidden, "权限不足");

        let (reply, _) = assembler.respond(Intent::WeeklyReport, &failed, &conversation()).await;

        assert_eq!(reply, "权限不足");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn respond_does_not_alter_result() {
        let assembler = ResponseAssembler::literal();
        let result = ok_result();
        let before = result.clone();

        assembler.respond(Intent::QueryTransactions, &result, &conversation()).await;

        assert_eq!(result, before);
    }
}
