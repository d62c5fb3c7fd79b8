//! Per-request view of the line being completed.

use super::{CompletionSuggestion, SuggestionKind};
use crate::tokenizer::{self, byte_to_char, char_to_byte};

/// Derived from `(input, cursor)` on every completion request.
///
/// Positions are character indices into `full_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub full_line: String,
    /// The word under the cursor, up to the cursor, quotes removed.
    pub current_word: String,
    pub word_start: usize,
    pub word_end: usize,
    pub cursor_position: usize,
    pub tokens: Vec<String>,
    pub current_token_index: usize,
    /// Session the request was made for, if any.
    pub session_id: Option<String>,
}

impl CompletionContext {
    /// Parse `input` with the cursor at character `cursor_position`.
    ///
    /// The cursor is clamped to the line length. A cursor sitting in
    /// whitespace yields an empty current word positioned at the cursor.
    pub fn parse(input: &str, cursor_position: usize) -> Self {
        let cursor_position = cursor_position.min(input.chars().count());
        let cursor_byte = char_to_byte(input, cursor_position);
        let parsed = tokenizer::split(input);

        let containing = parsed
            .iter()
            .position(|t| t.start <= cursor_byte && cursor_byte <= t.end);

        let (current_word, word_start, word_end, current_token_index) = match containing {
            Some(idx) => {
                let token = &parsed[idx];
                let word: String = input[token.start..cursor_byte]
                    .chars()
                    .filter(|c| *c != '"' && *c != '\'')
                    .collect();
                (
                    word,
                    byte_to_char(input, token.start),
                    byte_to_char(input, token.end),
                    idx,
                )
            }
            None => {
                let before = parsed.iter().filter(|t| t.end < cursor_byte).count();
                (String::new(), cursor_position, cursor_position, before)
            }
        };

        Self {
            full_line: input.to_string(),
            current_word,
            word_start,
            word_end,
            cursor_position,
            tokens: parsed.into_iter().map(|t| t.text).collect(),
            current_token_index,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }

    /// True while completing the first word of the line.
    pub fn is_command_position(&self) -> bool {
        self.current_token_index == 0
    }

    /// The command word, once the cursor has moved past it.
    pub fn command(&self) -> Option<&str> {
        if self.is_command_position() {
            None
        } else {
            self.tokens.first().map(String::as_str)
        }
    }

    /// The line up to the cursor.
    pub fn line_before_cursor(&self) -> &str {
        &self.full_line[..char_to_byte(&self.full_line, self.cursor_position)]
    }
}

/// Insert `suggestion` into `input` and return the new line and cursor.
///
/// History suggestions replace the whole line; everything else replaces the
/// word under the cursor.
pub fn apply_suggestion(
    input: &str,
    cursor_position: usize,
    suggestion: &CompletionSuggestion,
) -> (String, usize) {
    let insert = suggestion.insert_text();
    if suggestion.kind == SuggestionKind::History {
        return (insert.to_string(), insert.chars().count());
    }

    let ctx = CompletionContext::parse(input, cursor_position);
    let start = char_to_byte(input, ctx.word_start);
    let end = char_to_byte(input, ctx.word_end);

    let mut line = String::with_capacity(input.len() + insert.len());
    line.push_str(&input[..start]);
    line.push_str(insert);
    line.push_str(&input[end..]);
    (line, ctx.word_start + insert.chars().count())
}
