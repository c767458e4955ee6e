use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_MAX_INPUT_CHARS: usize = 1000;

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("static markup pattern"))
}

/// Normalizes untrusted chat text. Never fails.
///
/// Statement metacharacters are left alone here: chat text must stay readable, and the
/// strict stripping happens per parameter in `flowmaster_core::domain::parameters::validate`.
#[derive(Clone, Debug)]
pub struct Sanitizer {
    max_chars: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_CHARS)
    }
}

impl Sanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars: max_chars.max(1) }
    }

    pub fn sanitize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let stripped = markup_pattern().replace_all(text, "");
        let bounded: String = stripped.chars().take(self.max_chars).collect();
        bounded.trim().to_string()
    }
}
