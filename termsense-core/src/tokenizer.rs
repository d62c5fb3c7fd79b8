//! Quote-aware command line splitting.
//!
//! Shared by the completion context parser and local command argument
//! parsing so both agree on what a word is. Whitespace separates tokens
//! unless it sits inside a single- or double-quoted run; an unterminated
//! quote simply extends to the end of the line.

/// One whitespace-delimited word of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text with quote characters removed.
    pub text: String,
    /// Byte offset of the first character (including an opening quote).
    pub start: usize,
    /// Byte offset one past the last character (including a closing quote).
    pub end: usize,
    /// Whether any part of the token was quoted.
    pub quoted: bool,
}

/// Split `input` into tokens.
pub fn split(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;
    let mut quoted = false;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => text.push(c),
            None if c == '"' || c == '\'' => {
                start.get_or_insert(i);
                quote = Some(c);
                quoted = true;
            }
            None if c.is_whitespace() => {
                if let Some(s) = start.take() {
                    tokens.push(Token {
                        text: std::mem::take(&mut text),
                        start: s,
                        end: i,
                        quoted,
                    });
                    quoted = false;
                }
            }
            None => {
                start.get_or_insert(i);
                text.push(c);
            }
        }
    }

    if let Some(s) = start {
        tokens.push(Token {
            text,
            start: s,
            end: input.len(),
            quoted,
        });
    }
    tokens
}

/// Split `input` into plain argument strings.
pub fn split_args(input: &str) -> Vec<String> {
    split(input).into_iter().map(|t| t.text).collect()
}

/// First whitespace-delimited word of `line` and the remainder after it.
pub fn first_word(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find(char::is_whitespace) {
        Some(idx) => Some((&trimmed[..idx], trimmed[idx..].trim_start())),
        None => Some((trimmed, "")),
    }
}

/// Convert a character index into a byte offset, clamped to the string end.
pub fn char_to_byte(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Convert a byte offset into a character index.
pub fn byte_to_char(s: &str, byte_idx: usize) -> usize {
    let byte_idx = byte_idx.min(s.len());
    s.char_indices().take_while(|(i, _)| *i < byte_idx).count()
}
