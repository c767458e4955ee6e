use regex::{Regex, RegexBuilder};
use thiserror::Error;

use flowmaster_core::config::{
    SecurityConfig, DEFAULT_ESCALATION_PATTERNS, DEFAULT_RESTRICTED_KEYWORDS,
};
use flowmaster_core::domain::actor::Role;

pub const ESCALATION_REJECTION: &str = "检测到可疑的权限绕过尝试，操作已被拒绝。";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Empty when allowed.
    pub fn reason(&self) -> &str {
        match self {
            Self::Allow => "",
            Self::Deny { user_message, .. } => user_message,
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid escalation pattern `{pattern}`: {source}")]
    InvalidPattern { pattern: String, source: regex::Error },
}

/// Textual screen for role escalation and manager-only features.
///
/// Any escalation match denies, whatever the caller's role. Restricted keywords only apply
/// to worker and staff. A call without a role (internal traffic) is not screened.
#[derive(Clone, Debug)]
pub struct PermissionGuard {
    escalation_patterns: Vec<Regex>,
    restricted_keywords: Vec<String>,
}

impl Default for PermissionGuard {
    fn default() -> Self {
        Self::new(
            DEFAULT_ESCALATION_PATTERNS.iter().copied(),
            DEFAULT_RESTRICTED_KEYWORDS.iter().copied(),
        )
        .expect("default escalation patterns compile")
    }
}

impl PermissionGuard {
    pub fn new<'a>(
        patterns: impl IntoIterator<Item = &'a str>,
        restricted_keywords: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, GuardError> {
        let escalation_patterns = patterns
            .into_iter()
            .map(|pattern| {
                RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|source| {
                    GuardError::InvalidPattern { pattern: pattern.to_string(), source }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            escalation_patterns,
            restricted_keywords: restricted_keywords
                .into_iter()
                .map(str::to_string)
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, GuardError> {
        Self::new(
            config.escalation_patterns.iter().map(String::as_str),
            config.restricted_keywords.iter().map(String::as_str),
        )
    }

    pub fn check(&self, text: &str, role: Option<Role>) -> GuardDecision {
        let Some(role) = role else {
            return GuardDecision::Allow;
        };

        let lowered = text.to_lowercase();
        if self.escalation_patterns.iter().any(|pattern| pattern.is_match(&lowered)) {
            return GuardDecision::Deny {
                reason_code: "escalation_phrase",
                user_message: ESCALATION_REJECTION.to_string(),
            };
        }

        if role.is_restricted()
            && self.restricted_keywords.iter().any(|keyword| text.contains(keyword.as_str()))
        {
            return GuardDecision::Deny {
                reason_code: "restricted_feature",
                user_message: format!("您的角色({role})无权访问此功能。"),
            };
        }

        GuardDecision::Allow
    }
}
