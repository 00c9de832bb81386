//! Streaming parser for `<think>…</think>` reasoning tags.
//!
//! Reasoning-capable models interleave internal reasoning with the visible
//! answer. Tags can be split across chunk boundaries, so the parser buffers
//! partial tags and replays them with the next chunk.

use std::sync::LazyLock;

use regex::Regex;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Thinking,
}

/// Separates reasoning-tag content from response text in a chunked stream.
#[derive(Debug)]
pub struct ThinkTagParser {
    state: State,
    buffer: String,
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            buffer: String::new(),
        }
    }

    /// Process one chunk. Returns `(thinking_delta, response_delta)`.
    pub fn feed(&mut self, chunk: &str) -> (String, String) {
        let mut thinking_delta = String::new();
        let mut response_delta = String::new();

        let text = std::mem::take(&mut self.buffer) + chunk;

        let mut i = 0;
        while i < text.len() {
            let (tag, sink): (&str, &mut String) = match self.state {
                State::Normal => (OPEN_TAG, &mut response_delta),
                State::Thinking => (CLOSE_TAG, &mut thinking_delta),
            };

            match text[i..].find('<') {
                None => {
                    sink.push_str(&text[i..]);
                    i = text.len();
                }
                Some(rel) => {
                    let lt_pos = i + rel;
                    sink.push_str(&text[i..lt_pos]);
                    let remaining = &text[lt_pos..];
                    if remaining.starts_with(tag) {
                        self.state = match self.state {
                            State::Normal => State::Thinking,
                            State::Thinking => State::Normal,
                        };
                        i = lt_pos + tag.len();
                    } else if tag.starts_with(remaining) {
                        // A partial tag at the end of the chunk — buffer it.
                        self.buffer = remaining.to_string();
                        i = text.len();
                    } else {
                        sink.push('<');
                        i = lt_pos + 1;
                    }
                }
            }
        }

        (thinking_delta, response_delta)
    }

    /// Flush any trailing partial-tag buffer as content of the current state.
    pub fn finish(&mut self) -> (String, String) {
        let tail = std::mem::take(&mut self.buffer);
        match self.state {
            State::Thinking => (tail, String::new()),
            State::Normal => (String::new(), tail),
        }
    }

    /// Remove all `<think>…</think>` blocks from a complete string.
    pub fn strip_think_tags(text: &str) -> String {
        THINK_BLOCK.replace_all(text, "").trim().to_string()
    }

    /// Split a complete string into `(thinking, response)`.
    pub fn extract_think_and_response(text: &str) -> (String, String) {
        let mut thinking_parts = Vec::new();
        for cap in THINK_BLOCK.find_iter(text) {
            let inner = &text[cap.start() + OPEN_TAG.len()..cap.end() - CLOSE_TAG.len()];
            let inner = inner.trim();
            if !inner.is_empty() {
                thinking_parts.push(inner.to_string());
            }
        }
        (thinking_parts.join("\n"), Self::strip_think_tags(text))
    }
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ThinkTagParser, chunks: &[&str]) -> (String, String) {
        let mut thinking = String::new();
        let mut response = String::new();
        for chunk in chunks {
            let (t, r) = parser.feed(chunk);
            thinking.push_str(&t);
            response.push_str(&r);
        }
        let (t, r) = parser.finish();
        thinking.push_str(&t);
        response.push_str(&r);
        (thinking, response)
    }

    #[test]
    fn plain_text_is_all_response() {
        let mut parser = ThinkTagParser::new();
        let (thinking, response) = feed_all(&mut parser, &["Hello, world!"]);
        assert_eq!(thinking, "");
        assert_eq!(response, "Hello, world!");
    }

    #[test]
    fn tags_partition_the_stream() {
        let mut parser = ThinkTagParser::new();
        let (thinking, response) =
            feed_all(&mut parser, &["<think>step one</think>The answer is 4."]);
        assert_eq!(thinking, "step one");
        assert_eq!(response, "The answer is 4.");
    }

    #[test]
    fn tag_split_across_chunks() {
        let mut parser = ThinkTagParser::new();
        let (thinking, response) = feed_all(
            &mut parser,
            &["before <thi", "nk>hidden</th", "ink> after"],
        );
        assert_eq!(thinking, "hidden");
        assert_eq!(response, "before  after");
    }

    #[test]
    fn bare_angle_bracket_passes_through() {
        let mut parser = ThinkTagParser::new();
        let (thinking, response) = feed_all(&mut parser, &["a < b and b <c> d"]);
        assert_eq!(thinking, "");
        assert_eq!(response, "a < b and b <c> d");
    }

    #[test]
    fn unterminated_partial_tag_is_flushed_by_finish() {
        let mut parser = ThinkTagParser::new();
        let (t, r) = parser.feed("answer<thi");
        assert_eq!((t.as_str(), r.as_str()), ("", "answer"));
        let (t, r) = parser.finish();
        assert_eq!((t.as_str(), r.as_str()), ("", "<thi"));
    }

    #[test]
    fn char_at_a_time_equals_single_chunk() {
        let inputs = [
            "<think>reasoning here</think>The answer.",
            "no tags at all",
            "a<b <think>x</think> c<think>y</think>d",
            "trailing <think>never closed",
            "<think></think>empty",
            "< think> not a tag",
        ];
        for input in inputs {
            let mut whole = ThinkTagParser::new();
            let expected = feed_all(&mut whole, &[input]);

            let mut charwise = ThinkTagParser::new();
            let chunks: Vec<String> = input.chars().map(|c| c.to_string()).collect();
            let chunk_refs: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
            let got = feed_all(&mut charwise, &chunk_refs);

            assert_eq!(got, expected, "input: {input}");
        }
    }

    #[test]
    fn strip_removes_all_blocks() {
        let text = "<think>a</think>Hello <think>b</think>world";
        assert_eq!(ThinkTagParser::strip_think_tags(text), "Hello world");
    }

    #[test]
    fn extract_splits_thinking_and_response() {
        let text = "<think>first</think>Answer<think>second</think>";
        let (thinking, response) = ThinkTagParser::extract_think_and_response(text);
        assert_eq!(thinking, "first\nsecond");
        assert_eq!(response, "Answer");
    }

    #[test]
    fn user_text_containing_literal_tags_round_trips_through_stream() {
        // Concatenating deltas plus finish must equal the input partitioned
        // by tag scope, with the tags themselves discarded.
        let input = "x<think>t1</think>y<think>t2</think>z";
        let mut parser = ThinkTagParser::new();
        let (thinking, response) = feed_all(&mut parser, &[input]);
        assert_eq!(response, "xyz");
        assert_eq!(thinking, "t1t2");
    }
}
