//! Interactive line editor backed by the engine's history and completion.
//!
//! A crossterm raw-mode input handler that provides:
//! - Up/Down history navigation through the session, preserving the unsent draft
//! - Tab completion: a single suggestion is applied, several open a dropdown
//! - Up/Down to move through the dropdown, Tab or Enter to accept, Esc to dismiss
//! - Ctrl-C to clear the line, Ctrl-D on an empty line for EOF

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use std::io::{self, Write};
use termsense_core::completion::{StateUpdate, apply_suggestion};
use termsense_core::{CompletionState, CompletionSuggestion, Direction, Engine, SuggestionKind};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Maximum number of completion items to show in the dropdown.
const MAX_VISIBLE_COMPLETIONS: usize = 8;

/// Width reserved for the suggestion column in the dropdown.
const NAME_COLUMN: usize = 24;

/// Editable line with a cursor counted in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
    cursor: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_at(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map_or(self.text.len(), |(i, _)| i)
    }

    /// Replace the contents, clamping `cursor` to the new length.
    pub fn set(&mut self, text: impl Into<String>, cursor: usize) {
        self.text = text.into();
        self.cursor = cursor.min(self.char_len());
    }

    /// Replace the contents and put the cursor at the end.
    pub fn replace(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.char_len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_at(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    /// Remove the character before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let start = self.byte_at(self.cursor - 1);
        let end = self.byte_at(self.cursor);
        self.text.replace_range(start..end, "");
        self.cursor -= 1;
        true
    }

    /// Remove the character under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.char_len() {
            return false;
        }
        let start = self.byte_at(self.cursor);
        let end = self.byte_at(self.cursor + 1);
        self.text.replace_range(start..end, "");
        true
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.char_len();
    }

    pub fn at_end(&self) -> bool {
        self.cursor == self.char_len()
    }

    /// Terminal columns occupied by the text before the cursor.
    pub fn cursor_column(&self) -> usize {
        self.text[..self.byte_at(self.cursor)].width()
    }
}

/// First and one-past-last index of the dropdown rows to draw.
fn visible_range(selected: usize, total: usize) -> (usize, usize) {
    let max_vis = MAX_VISIBLE_COMPLETIONS.min(total);
    let start = (selected + 1).saturating_sub(max_vis);
    (start, (start + max_vis).min(total))
}

/// Longest prefix of `s` that fits in `max` terminal columns.
fn truncate_to_width(s: &str, max: usize) -> &str {
    let mut width = 0;
    for (i, c) in s.char_indices() {
        width += c.width().unwrap_or(0);
        if width > max {
            return &s[..i];
        }
    }
    s
}

/// Interactive input handler for one session.
pub struct ReplInput {
    session_id: String,
    /// Line being edited before history navigation started.
    draft: Option<String>,
    /// Number of completion lines currently displayed below the input.
    rendered_lines: usize,
    prompt: String,
}

impl ReplInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            draft: None,
            rendered_lines: 0,
            prompt: "> ".to_string(),
        }
    }

    /// Read a line of input with history and completion.
    ///
    /// Returns `Some(line)` on Enter, `None` on Ctrl-D (EOF).
    /// Raw mode is enabled while reading and restored before returning.
    pub async fn read_line(&mut self, prompt: &str, engine: &Engine) -> io::Result<Option<String>> {
        self.prompt = prompt.to_string();
        self.draft = None;
        print!("\x1b[1;34m{prompt}\x1b[0m");
        io::stdout().flush()?;

        terminal::enable_raw_mode()?;
        let result = self.read_line_raw(engine).await;
        engine.completion().set_state(StateUpdate::dismiss());
        let cleared = self.clear_completion_lines();
        terminal::disable_raw_mode()?;
        cleared?;

        print!("\r\n");
        io::stdout().flush()?;

        result
    }

    async fn read_line_raw(&mut self, engine: &Engine) -> io::Result<Option<String>> {
        let mut buffer = LineBuffer::new();

        loop {
            if !event::poll(std::time::Duration::from_millis(100))? {
                continue;
            }

            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            else {
                continue;
            };
            let popup_open = engine.completion().state().is_active;

            match (code, modifiers) {
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                    buffer.clear();
                    engine.completion().set_state(StateUpdate::dismiss());
                    self.end_navigation(engine);
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Char('d'), KeyModifiers::CONTROL) => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    buffer.delete();
                    self.refresh_completion(&buffer, engine).await;
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Tab, _) | (KeyCode::Enter, _) if popup_open => {
                    if let Some(selected) = engine.completion().selected() {
                        accept(&mut buffer, &selected);
                    }
                    engine.completion().set_state(StateUpdate::dismiss());
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Tab, _) => {
                    let suggestions = engine
                        .complete(&self.session_id, buffer.text(), buffer.cursor())
                        .await;
                    match suggestions.as_slice() {
                        [] => {}
                        [only] => accept(&mut buffer, only),
                        _ => engine
                            .completion()
                            .set_state(StateUpdate::show(suggestions)),
                    }
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Enter, _) => {
                    self.end_navigation(engine);
                    return Ok(Some(buffer.text().to_string()));
                }
                (KeyCode::Esc, _) => {
                    if popup_open {
                        engine.completion().set_state(StateUpdate::dismiss());
                        self.render(&buffer, engine)?;
                    }
                }
                (KeyCode::Up, _) if popup_open => {
                    engine.completion().select_previous();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Down, _) if popup_open => {
                    engine.completion().select_next();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Up, _) => {
                    if self.draft.is_none() {
                        self.draft = Some(buffer.text().to_string());
                    }
                    if let Some(line) = engine.navigate(&self.session_id, Direction::Up) {
                        buffer.replace(line);
                        self.render(&buffer, engine)?;
                    }
                }
                (KeyCode::Down, _) => {
                    if self.draft.is_none() {
                        continue;
                    }
                    match engine.navigate(&self.session_id, Direction::Down) {
                        Some(line) if line.is_empty() => {
                            buffer.replace(self.draft.take().unwrap_or_default());
                        }
                        Some(line) => buffer.replace(line),
                        None => {}
                    }
                    self.render(&buffer, engine)?;
                }
                (KeyCode::PageUp, _) if self.draft.is_some() => {
                    if let Some(line) = engine.navigate(&self.session_id, Direction::First) {
                        buffer.replace(line);
                        self.render(&buffer, engine)?;
                    }
                }
                (KeyCode::PageDown, _) if self.draft.is_some() => {
                    if let Some(line) = engine.navigate(&self.session_id, Direction::Last) {
                        buffer.replace(line);
                        self.render(&buffer, engine)?;
                    }
                }
                (KeyCode::Left, _) => {
                    engine.completion().set_state(StateUpdate::dismiss());
                    buffer.move_left();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Right, _) => {
                    engine.completion().set_state(StateUpdate::dismiss());
                    buffer.move_right();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Home, _) | (KeyCode::Char('a'), KeyModifiers::CONTROL) => {
                    engine.completion().set_state(StateUpdate::dismiss());
                    buffer.move_home();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::End, _) | (KeyCode::Char('e'), KeyModifiers::CONTROL) => {
                    engine.completion().set_state(StateUpdate::dismiss());
                    buffer.move_end();
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Backspace, _) => {
                    if buffer.backspace() {
                        self.end_navigation(engine);
                        self.refresh_completion(&buffer, engine).await;
                    }
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Delete, _) => {
                    if buffer.delete() {
                        self.end_navigation(engine);
                        self.refresh_completion(&buffer, engine).await;
                    }
                    self.render(&buffer, engine)?;
                }
                (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
                    buffer.insert(c);
                    self.end_navigation(engine);
                    self.refresh_completion(&buffer, engine).await;
                    self.render(&buffer, engine)?;
                }
                _ => {}
            }
        }
    }

    /// Leave history navigation once the recalled line is edited.
    fn end_navigation(&mut self, engine: &Engine) {
        if self.draft.take().is_some() {
            engine
                .history()
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .reset_cursor(Some(&self.session_id));
        }
    }

    /// Re-query an open dropdown after the line changed.
    async fn refresh_completion(&self, buffer: &LineBuffer, engine: &Engine) {
        if !engine.completion().state().is_active {
            return;
        }
        let suggestions = engine
            .complete(&self.session_id, buffer.text(), buffer.cursor())
            .await;
        let update = if suggestions.is_empty() {
            StateUpdate::dismiss()
        } else {
            StateUpdate::show(suggestions)
        };
        engine.completion().set_state(update);
    }

    /// Redraw the input line and the dropdown, if one is open.
    fn render(&mut self, buffer: &LineBuffer, engine: &Engine) -> io::Result<()> {
        self.clear_completion_lines()?;
        let state = engine.completion().state();

        let ghost = engine
            .completion()
            .selected()
            .filter(|_| buffer.at_end())
            .and_then(|s| {
                let (line, _) = apply_suggestion(buffer.text(), buffer.cursor(), &s);
                line.strip_prefix(buffer.text()).map(str::to_string)
            });
        self.redraw_input(buffer, ghost.as_deref())?;

        if state.is_active {
            self.render_dropdown(&state)?;
            if self.rendered_lines > 0 {
                let mut stdout = io::stdout();
                let col = self.prompt.width() + buffer.cursor_column();
                write!(stdout, "\x1b[{}A", self.rendered_lines)?;
                write!(stdout, "{}", cursor::MoveToColumn(col as u16))?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn render_dropdown(&mut self, state: &CompletionState) -> io::Result<()> {
        let mut stdout = io::stdout();
        let total = state.suggestions.len();
        let (start, end) = visible_range(state.selected_index, total);
        let visible_count = end - start;

        let term_width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);

        for (i, suggestion) in state.suggestions[start..end].iter().enumerate() {
            let is_selected = start + i == state.selected_index;
            let name = truncate_to_width(&suggestion.text, NAME_COLUMN);
            let padding = " ".repeat(NAME_COLUMN.saturating_sub(name.width()));
            let desc = suggestion
                .description
                .as_deref()
                .unwrap_or_else(|| kind_label(suggestion));
            let desc = truncate_to_width(desc, term_width.saturating_sub(NAME_COLUMN + 4));

            write!(stdout, "\r\n")?;
            if is_selected {
                write!(stdout, "\x1b[2K\x1b[7m  {name}{padding} {desc}\x1b[0m")?;
            } else {
                write!(
                    stdout,
                    "\x1b[2K  \x1b[36m{name}{padding}\x1b[0m \x1b[90m{desc}\x1b[0m",
                )?;
            }
        }

        if total > visible_count {
            write!(stdout, "\r\n")?;
            write!(
                stdout,
                "\x1b[2K  \x1b[90m({}/{total})\x1b[0m",
                state.selected_index + 1
            )?;
            self.rendered_lines = visible_count + 1;
        } else {
            self.rendered_lines = visible_count;
        }

        stdout.flush()?;
        Ok(())
    }

    /// Clear previously rendered completion lines below the input.
    fn clear_completion_lines(&mut self) -> io::Result<()> {
        if self.rendered_lines > 0 {
            let mut stdout = io::stdout();
            for _ in 0..self.rendered_lines {
                write!(stdout, "\r\n\x1b[2K")?;
            }
            write!(stdout, "\x1b[{}A", self.rendered_lines)?;
            stdout.flush()?;
            self.rendered_lines = 0;
        }
        Ok(())
    }

    /// Redraw just the input line with optional ghost text after the cursor.
    fn redraw_input(&self, buffer: &LineBuffer, ghost_hint: Option<&str>) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "\r\x1b[2K")?;
        write!(stdout, "\x1b[1;34m{}\x1b[0m", self.prompt)?;
        write!(stdout, "{}", buffer.text())?;
        if let Some(hint) = ghost_hint.filter(|h| !h.is_empty()) {
            write!(stdout, "\x1b[90m{hint}\x1b[0m")?;
        }
        let col = self.prompt.width() + buffer.cursor_column();
        write!(stdout, "{}", cursor::MoveToColumn(col as u16))?;
        stdout.flush()?;
        Ok(())
    }
}

fn accept(buffer: &mut LineBuffer, suggestion: &CompletionSuggestion) {
    let (line, cursor) = apply_suggestion(buffer.text(), buffer.cursor(), suggestion);
    buffer.set(line, cursor);
}

fn kind_label(suggestion: &CompletionSuggestion) -> &'static str {
    match suggestion.kind {
        SuggestionKind::Command => "command",
        SuggestionKind::Flag => "flag",
        SuggestionKind::Option => "option",
        SuggestionKind::File => "file",
        SuggestionKind::Directory => "directory",
        SuggestionKind::Variable => "variable",
        SuggestionKind::History => "history",
        SuggestionKind::Alias => "alias",
        SuggestionKind::Custom => "",
    }
}
