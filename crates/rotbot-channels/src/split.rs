//! Newline-preferred message splitting for platform length caps.

/// Split `text` into parts of at most `limit` characters.
///
/// Break points prefer the last newline inside the window; when there is
/// none, or it sits in the first half of the window, the text is cut at the
/// limit. Leading newlines are stripped from each continuation part.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 {
        return vec![text.to_string()];
    }
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut remaining = text;

    loop {
        if remaining.chars().count() <= limit {
            if !remaining.is_empty() {
                parts.push(remaining.to_string());
            }
            break;
        }

        // Byte offset of the character right after the window.
        let window_end = remaining
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..window_end];

        let split_at = match window.rfind('\n') {
            // A newline in the second half of the window is a good break.
            Some(pos) if char_count(&remaining[..pos]) >= limit / 2 => pos,
            _ => window_end,
        };

        parts.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
    }

    parts
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_part() {
        assert_eq!(split_message("hello", 100), vec!["hello"]);
    }

    #[test]
    fn exactly_at_limit_is_one_part() {
        let text = "a".repeat(50);
        assert_eq!(split_message(&text, 50), vec![text]);
    }

    #[test]
    fn splits_prefer_newlines() {
        let line = "a".repeat(30);
        let text = format!("{line}\n{line}\n{line}");
        let parts = split_message(&text, 40);
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(part.chars().count() <= 40);
            assert!(!part.starts_with('\n'));
            assert_eq!(part, &line);
        }
    }

    #[test]
    fn early_newline_is_ignored() {
        // The only newline sits in the first half of the window, so the
        // split lands at the limit instead.
        let text = format!("ab\n{}", "c".repeat(100));
        let parts = split_message(&text, 40);
        assert_eq!(parts[0].chars().count(), 40);
    }

    #[test]
    fn long_unbroken_text_is_hard_cut() {
        let text = "x".repeat(95);
        let parts = split_message(&text, 40);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].chars().count(), 40);
        assert_eq!(parts[1].chars().count(), 40);
        assert_eq!(parts[2].chars().count(), 15);
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn nine_thousand_chars_with_newlines_yield_three_parts_under_cap() {
        // Prose-like input: 90-char lines, ~9000 chars total.
        let line = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt u";
        let text = vec![line; 99].join("\n");
        assert_eq!(text.chars().count(), 9008);

        let parts = split_message(&text, 4000);
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(part.chars().count() <= 4000);
            assert!(!part.starts_with('\n'));
        }
        // Break points fall on newlines: rejoining restores the input.
        assert_eq!(parts.join("\n"), text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(85);
        let parts = split_message(&text, 40);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), text);
        for part in &parts[..2] {
            assert_eq!(part.chars().count(), 40);
        }
    }
}
