//! Where local commands write their output.

/// Line-oriented output for local command handlers.
pub trait OutputSink: Send {
    fn write_line(&mut self, line: &str);
    fn write_error(&mut self, line: &str);
}

/// A captured output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Info(String),
    Error(String),
}

/// Collects output in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedOutput {
    pub lines: Vec<OutputLine>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// All info lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .filter_map(|l| match l {
                OutputLine::Info(s) => Some(s.as_str()),
                OutputLine::Error(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn errors(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                OutputLine::Error(s) => Some(s.as_str()),
                OutputLine::Info(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl OutputSink for BufferedOutput {
    fn write_line(&mut self, line: &str) {
        self.lines.push(OutputLine::Info(line.to_string()));
    }

    fn write_error(&mut self, line: &str) {
        self.lines.push(OutputLine::Error(line.to_string()));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn write_line(&mut self, _line: &str) {}
    fn write_error(&mut self, _line: &str) {}
}
