//! Session loop: read a line, let the engine route it, hand forwarded lines
//! to the transport.

use crate::repl_input::ReplInput;
use std::io::{self, BufRead, Write};
use std::path::Path;
use termsense_core::{Engine, OutputSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Lines that end the remote session.
const SESSION_END: &[&str] = &["exit", "logout"];

/// Destination for lines the engine did not handle locally.
pub trait Transport {
    fn send(&mut self, line: &str) -> io::Result<()>;
}

/// Echoes forwarded lines to stdout in place of a remote shell.
pub struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "\x1b[90m[remote]\x1b[0m {line}")?;
        out.flush()
    }
}

/// Local command output on the terminal.
pub struct TerminalOutput;

impl OutputSink for TerminalOutput {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }

    fn write_error(&mut self, line: &str) {
        eprintln!("\x1b[31m{line}\x1b[0m");
    }
}

/// Ask on the terminal before forwarding an expanded alias.
pub fn confirm_on_terminal(line: &str) -> io::Result<bool> {
    print!("Run `{line}`? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Route one submitted line. Returns `false` once the remote session would end.
pub async fn handle_line(
    engine: &Engine,
    session_id: &str,
    line: &str,
    transport: &mut dyn Transport,
    output: &mut dyn OutputSink,
    confirm: &mut dyn FnMut(&str) -> io::Result<bool>,
) -> anyhow::Result<bool> {
    let outcome = engine.submit(line, session_id, output).await;
    let Some(forward) = outcome.forward_line else {
        return Ok(true);
    };
    if forward.is_empty() {
        return Ok(true);
    }
    if outcome.needs_confirmation && !confirm(&forward)? {
        output.write_line("Cancelled");
        return Ok(true);
    }
    transport.send(&forward)?;
    debug!(session = session_id, "Forwarded line");
    Ok(!SESSION_END.contains(&forward.trim()))
}

/// Run the interactive editor until EOF or the session ends.
pub async fn run_interactive(engine: &Engine, session_id: &str, workspace: &Path) -> anyhow::Result<()> {
    engine.open_session(session_id);
    println!(
        "\x1b[1;32mtermsense\x1b[0m  session: {session_id} | workspace: {}",
        workspace.display()
    );
    println!("  Type local-help for local commands, Ctrl-D to quit\n");

    let mut input = ReplInput::new(session_id);
    let mut transport = StdoutTransport;
    let mut output = TerminalOutput;
    let mut confirm = confirm_on_terminal;

    loop {
        let Some(line) = input.read_line("> ", engine).await? else {
            println!("Goodbye!");
            break;
        };
        if !handle_line(
            engine,
            session_id,
            &line,
            &mut transport,
            &mut output,
            &mut confirm,
        )
        .await?
        {
            break;
        }
    }
    Ok(())
}

/// Route lines from a non-interactive stdin. Confirmation prompts are declined.
pub async fn run_piped(engine: &Engine, session_id: &str) -> anyhow::Result<()> {
    engine.open_session(session_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transport = StdoutTransport;
    let mut output = TerminalOutput;
    let mut decline = |_: &str| -> io::Result<bool> { Ok(false) };

    while let Some(line) = lines.next_line().await? {
        if !handle_line(
            engine,
            session_id,
            &line,
            &mut transport,
            &mut output,
            &mut decline,
        )
        .await?
        {
            break;
        }
    }
    Ok(())
}
