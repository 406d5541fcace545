//! Outbound message framing.
//!
//! The Bot API refuses messages longer than [`MAX_MESSAGE_CHARS`] characters
//! and messages with empty text. Shell output lines have no length limit, so
//! each line is cut into consecutive chunks that fit in one message. Chunks
//! always end on a character boundary; concatenating them yields the input.

/// Maximum number of characters in a single `sendMessage` text.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Iterator over the message-sized chunks of a line.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_chars: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let end = self
            .rest
            .char_indices()
            .nth(self.max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Empty text yields no chunks. `max_chars` of zero is treated as one.
pub fn chunks_with_limit(text: &str, max_chars: usize) -> Chunks<'_> {
    Chunks {
        rest: text,
        max_chars: max_chars.max(1),
    }
}

/// Splits `text` into chunks that each fit in one message.
pub fn chunks(text: &str) -> Chunks<'_> {
    chunks_with_limit(text, MAX_MESSAGE_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_line_is_single_chunk() {
        let parts: Vec<_> = chunks("hello").collect();
        assert_eq!(parts, vec!["hello"]);
    }

    #[test]
    fn test_empty_line_has_no_chunks() {
        assert_eq!(chunks("").count(), 0);
    }

    #[test]
    fn test_exact_limit_is_single_chunk() {
        let line = "a".repeat(MAX_MESSAGE_CHARS);
        let parts: Vec<_> = chunks(&line).collect();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_long_line_is_split_in_order() {
        let line = format!("{}{}", "a".repeat(MAX_MESSAGE_CHARS), "bc");
        let parts: Vec<_> = chunks(&line).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "bc");
        assert_eq!(parts.concat(), line);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let line = "é".repeat(5);
        let parts: Vec<_> = chunks_with_limit(&line, 2).collect();
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_zero_limit_is_treated_as_one() {
        let parts: Vec<_> = chunks_with_limit("abc", 0).collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }
}
