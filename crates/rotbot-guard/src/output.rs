//! Output filtering: unconditional redaction of secrets and infrastructure
//! details, self-referential internal-name screening, and whole-response
//! replacement when violations pile up.

use tracing::warn;

use crate::patterns::{
    code_span_ranges, in_code_span, INTERNAL_MODEL_NAMES, INTERNAL_STACK_NAMES,
    SELF_REFERENCE_MARKERS, SELF_REFERENCE_WINDOW, UNCONDITIONAL_REDACTIONS,
};

pub const REFUSAL_TEXT: &str =
    "I can't provide that response. Is there something else I can help you with?";

const REDACTED: &str = "[REDACTED]";
const MODEL_PLACEHOLDER: &str = "an AI model";

/// A response is replaced wholesale when more than this many distinct
/// violations fire.
const MAX_VIOLATIONS: usize = 5;

/// Result of [`filter_output`].
#[derive(Debug, Clone)]
pub struct OutputVerdict {
    pub filtered: String,
    /// Violation kind per redaction performed, deduplicated.
    pub violations: Vec<String>,
    pub modified: bool,
}

/// Scan the assistant's complete response and redact everything the patterns
/// flag. Characters inside fenced or inline code spans are never rewritten.
/// Idempotent: running the filter on its own output changes nothing.
pub fn filter_output(text: &str) -> OutputVerdict {
    let code_spans = code_span_ranges(text);

    // (start, end, replacement, kind) for every planned rewrite.
    let mut edits: Vec<(usize, usize, &'static str, String)> = Vec::new();

    for (kind, pattern) in UNCONDITIONAL_REDACTIONS.iter() {
        for m in pattern.find_iter(text) {
            if in_code_span(&code_spans, m.start(), m.end()) {
                continue;
            }
            edits.push((m.start(), m.end(), REDACTED, format!("{kind}:{}", m.as_str())));
        }
    }

    // Internal names are only a problem when the bot is talking about itself.
    for marker in SELF_REFERENCE_MARKERS.find_iter(text) {
        let window_start = marker.end();
        let window_end = clamp_to_char_boundary(text, window_start + SELF_REFERENCE_WINDOW);
        let window = &text[window_start..window_end];

        for m in INTERNAL_MODEL_NAMES.find_iter(window) {
            let (start, end) = (window_start + m.start(), window_start + m.end());
            if in_code_span(&code_spans, start, end) {
                continue;
            }
            edits.push((start, end, MODEL_PLACEHOLDER, format!("model_name:{}", m.as_str())));
        }
        for m in INTERNAL_STACK_NAMES.find_iter(window) {
            let (start, end) = (window_start + m.start(), window_start + m.end());
            if in_code_span(&code_spans, start, end) {
                continue;
            }
            edits.push((start, end, REDACTED, format!("stack_name:{}", m.as_str())));
        }
    }

    if edits.is_empty() {
        return OutputVerdict {
            filtered: text.to_string(),
            violations: Vec::new(),
            modified: false,
        };
    }

    // Apply non-overlapping edits left to right; overlaps keep the earliest.
    edits.sort_by_key(|&(start, end, _, _)| (start, std::cmp::Reverse(end)));
    let mut filtered = String::with_capacity(text.len());
    let mut violations: Vec<String> = Vec::new();
    let mut cursor = 0usize;
    for (start, end, replacement, label) in edits {
        if start < cursor {
            continue; // swallowed by an earlier, wider match
        }
        filtered.push_str(&text[cursor..start]);
        filtered.push_str(replacement);
        cursor = end;
        if !violations.contains(&label) {
            violations.push(label);
        }
    }
    filtered.push_str(&text[cursor..]);

    if violations.len() > MAX_VIOLATIONS {
        warn!(count = violations.len(), "response replaced — too many redactions");
        return OutputVerdict {
            filtered: REFUSAL_TEXT.to_string(),
            violations,
            modified: true,
        };
    }

    OutputVerdict {
        filtered,
        violations,
        modified: true,
    }
}

fn clamp_to_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_untouched() {
        let verdict = filter_output("The capital of France is Paris.");
        assert!(!verdict.modified);
        assert!(verdict.violations.is_empty());
        assert_eq!(verdict.filtered, "The capital of France is Paris.");
    }

    #[test]
    fn self_referential_model_and_infra_url_are_replaced() {
        let verdict = filter_output(
            "I am running on llama3.1:8b at http://localhost:11434 — here is your answer.",
        );
        assert!(verdict.modified);
        assert!(!verdict.filtered.contains("llama3.1:8b"));
        assert!(!verdict.filtered.contains("localhost:11434"));
        assert!(verdict.filtered.contains("an AI model"));
        assert!(verdict.filtered.contains("[REDACTED]"));
        assert!(verdict.filtered.contains("here is your answer."));
    }

    #[test]
    fn model_name_outside_self_reference_window_survives() {
        let verdict = filter_output("Llama 3 is a popular open-weights model family.");
        assert!(!verdict.filtered.contains("[REDACTED]"));
        assert!(verdict.filtered.contains("Llama 3"));
    }

    #[test]
    fn secrets_are_redacted_unconditionally() {
        let verdict = filter_output("Your key is api_key=abcd1234efgh5678, keep it safe.");
        assert!(verdict.filtered.contains("[REDACTED]"));
        assert!(!verdict.filtered.contains("abcd1234efgh5678"));

        let verdict = filter_output("SSN on file: 123-45-6789.");
        assert!(!verdict.filtered.contains("123-45-6789"));

        let verdict = filter_output("Card: 4111 1111 1111 1111");
        assert!(!verdict.filtered.contains("4111"));
    }

    #[test]
    fn code_spans_are_never_rewritten() {
        let text = "Use the config below:\n```bash\nexport OPENAI_API_KEY=sk-aaaaaaaaaaaaaaaaaaaa\ncurl http://localhost:11434\n```\nDone.";
        let verdict = filter_output(text);
        assert!(verdict.filtered.contains("sk-aaaaaaaaaaaaaaaaaaaa"));
        assert!(verdict.filtered.contains("http://localhost:11434"));

        let inline = "Run `curl http://localhost:11434` to test.";
        let verdict = filter_output(inline);
        assert!(!verdict.modified);
    }

    #[test]
    fn no_redaction_pattern_survives_filtering() {
        let text = "path /etc/passwd url http://127.0.0.1:8000 ssn 123-45-6789";
        let verdict = filter_output(text);
        for (_, pattern) in UNCONDITIONAL_REDACTIONS.iter() {
            assert!(
                pattern.find(&verdict.filtered).is_none(),
                "pattern still matches: {}",
                verdict.filtered
            );
        }
    }

    #[test]
    fn filter_is_idempotent() {
        let text = "I'm powered by ollama; token=abcdef123456789 lives in /home/bot/.env";
        let once = filter_output(text);
        let twice = filter_output(&once.filtered);
        assert_eq!(once.filtered, twice.filtered);
        assert!(!twice.modified);
    }

    #[test]
    fn many_violations_replace_the_whole_response() {
        let text = "email me at /etc/a /home/b /var/c /usr/d /opt/e with 123-45-6789 \
                    and api_key=deadbeef12345678 via http://localhost:1 http://127.0.0.1:2";
        let verdict = filter_output(text);
        assert_eq!(verdict.filtered, REFUSAL_TEXT);
        assert!(verdict.violations.len() > 5);
    }

    #[test]
    fn refusal_text_passes_the_filter_unchanged() {
        let verdict = filter_output(REFUSAL_TEXT);
        assert!(!verdict.modified);
        assert_eq!(verdict.filtered, REFUSAL_TEXT);
    }
}
