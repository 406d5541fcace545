//! Chat command protocol.
//!
//! A message is a command when its first character is [`TRIGGER`]. The
//! trigger and the single delimiter character after it are removed and the
//! rest is handed to the shell untouched: `"$ ls -la"` runs `ls -la`.

/// Leading character marking a message as a shell command.
pub const TRIGGER: char = '$';

/// Number of characters stripped from the front of a command message
/// (the trigger plus one delimiter).
pub const PREFIX_CHARS: usize = 2;

/// Returns `true` when `text` starts with the trigger symbol.
pub fn is_command(text: &str) -> bool {
    text.starts_with(TRIGGER)
}

/// Extracts the command payload from a chat message.
///
/// Returns `None` for text that does not start with [`TRIGGER`]. The
/// delimiter is whatever character follows the trigger; it is not required
/// to be a space. A message consisting of the trigger alone yields an empty
/// payload.
pub fn parse_command(text: &str) -> Option<&str> {
    if !is_command(text) {
        return None;
    }

    let start = text
        .char_indices()
        .nth(PREFIX_CHARS)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    Some(&text[start..])
}
