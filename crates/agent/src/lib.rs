//! FlowMaster agent pipeline - natural-language access to daily transactions
//!
//! Each chat message runs through six stages, strictly in order:
//! 1. **Sanitizer** (`sanitizer`) - strip markup, bound length, trim
//! 2. **Permission Guard** (`guardrails`) - deny escalation phrases and manager-only features
//! 3. **Intent Classifier** (`intent`) - keyword rules, first match wins
//! 4. **Parameter Extractor** (`extractor`) - typed, validated parameters; non-managers are
//!    pinned to their own id
//! 5. **Command Dispatcher** (`dispatcher`) - one handler per intent against the stores
//! 6. **Response Assembler** (`response`) - phrase the result via a chat provider, with a
//!    literal fallback
//!
//! `runtime::AgentRuntime` composes the stages. A guard denial ends the run before
//! classification.
//!
//! # Safety Principle
//!
//! The chat model only phrases replies. Authorization, scoping and every write are decided
//! by deterministic code before the model is called.

pub mod dispatcher;
pub mod extractor;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod response;
pub mod runtime;
pub mod sanitizer;

pub use dispatcher::CommandDispatcher;
pub use extractor::ParameterExtractor;
pub use guardrails::{GuardDecision, GuardError, PermissionGuard};
pub use intent::IntentClassifier;
pub use llm::{ChatCompletion, LlmError, OpenAiCompatibleClient};
pub use response::ResponseAssembler;
pub use runtime::{AgentRuntime, PipelineOutcome};
pub use sanitizer::Sanitizer;
