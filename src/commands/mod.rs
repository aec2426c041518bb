/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`   - Interactive chat mode
- `ask`    - One-shot question with a streamed answer
- `status` - Model server reachability check
- `models` - Model listing

Every handler builds a [`ChatSession`] or a [`ConnectionProbe`] from the
loaded [`Config`] and renders its events on the terminal.
*/

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use prettytable::{format, row, Table};

use crate::chat::{ChatEvents, ChatSession, Message, Role, SessionConfig};
use crate::config::Config;
use crate::error::{AiorgError, ErrorKind, Result};
use crate::probe::{ConnectionProbe, ConnectionStatus};

// Special commands parser for the interactive loop
pub mod special_commands;

// Model listing command
pub mod models;

/// How the last send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

/// Renders session events on stdout/stderr
///
/// The outcome of the most recent send is kept in a shared slot so the caller
/// can inspect it after the session has gone idle.
#[derive(Debug, Clone, Default)]
pub struct TerminalEvents {
    outcome: Arc<Mutex<Option<SendOutcome>>>,
}

impl TerminalEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the outcome of the last finished send
    pub fn take_outcome(&self) -> Option<SendOutcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record(&self, outcome: SendOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}

impl ChatEvents for TerminalEvents {
    fn on_chunk(&mut self, delta: &str) {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&mut self, _message: &Message) {
        println!("\n");
        self.record(SendOutcome::Completed);
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        eprintln!("\n{} {}\n", format!("[{}]", kind).red().bold(), message);
        self.record(SendOutcome::Failed {
            kind,
            message: message.to_string(),
        });
    }

    fn on_cancelled(&mut self) {
        println!("\n{}\n", "[cancelled]".yellow());
        self.record(SendOutcome::Cancelled);
    }
}

enum PumpStep {
    Event(bool),
    Interrupted,
}

/// Delivers session events until the send finishes; Ctrl-C cancels it
async fn pump_until_idle(session: &mut ChatSession) {
    pump_until(session, tokio::signal::ctrl_c()).await;
}

/// Event pump that stops the send when `interrupt` resolves
///
/// The interrupt future is created once, so a signal that lands between two
/// events is still observed.
async fn pump_until<F>(session: &mut ChatSession, interrupt: F)
where
    F: std::future::Future,
{
    tokio::pin!(interrupt);

    loop {
        let step = tokio::select! {
            more = session.dispatch_next() => PumpStep::Event(more),
            _ = &mut interrupt => PumpStep::Interrupted,
        };

        match step {
            PumpStep::Event(true) => continue,
            PumpStep::Event(false) => break,
            PumpStep::Interrupted => {
                session.cancel();
                break;
            }
        }
    }
}

/// Formats the conversation for `/history`
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "Conversation is empty.\n".to_string();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(row!["#".bold(), "Role".bold(), "Content".bold()]);

    for (index, message) in messages.iter().enumerate() {
        let label = match message.role {
            Role::User => "you".cyan().bold(),
            Role::Assistant => "assistant".green().bold(),
        };
        table.add_row(row![index + 1, label, message.content]);
    }

    table.to_string()
}

/// Formats a probe result for `status` and `/status`
pub fn format_status(endpoint: &str, status: &ConnectionStatus) -> String {
    let state = if status.reachable {
        "reachable".green().bold()
    } else {
        "unreachable".red().bold()
    };
    let mut out = format!(
        "Server:  {} ({})\nChecked: {}\n",
        endpoint,
        state,
        status.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(detail) = &status.detail {
        let label = if status.reachable { "Version" } else { "Reason" };
        out.push_str(&format!("{}: {}\n", label, detail));
    }
    out
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs a readline loop; each line is either a special command or a
    //! message streamed through the [`ChatSession`].

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the terminal or the session cannot be set up
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let events = TerminalEvents::new();
        let mut session =
            ChatSession::new(SessionConfig::from_config(&config), Box::new(events.clone()))?;
        let probe = ConnectionProbe::new()?;
        let probe_timeout = Duration::from_secs(config.probe.timeout_seconds);

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&session);

        let status = probe.check(session.endpoint(), probe_timeout).await;
        if !status.reachable {
            println!("{}", format_status(session.endpoint(), &status));
        }

        loop {
            let prompt = format!("{} ", ">>>".cyan().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::Help => {
                            print_help();
                            continue;
                        }
                        SpecialCommand::Reset => {
                            match session.reset() {
                                Ok(()) => println!("{}", "Conversation cleared.".green()),
                                Err(e) => eprintln!("Error: {}", e),
                            }
                            continue;
                        }
                        SpecialCommand::History => {
                            print!("{}", format_history(&session.history()));
                            continue;
                        }
                        SpecialCommand::ShowStatus => {
                            let status = probe.check(session.endpoint(), probe_timeout).await;
                            print!("{}", format_status(session.endpoint(), &status));
                            println!("Model:   {}", session.model());
                            println!("Session: {}", session.id());
                            println!("Turns:   {}\n", session.history().len());
                            continue;
                        }
                        SpecialCommand::ListModels => {
                            match probe.list_models(session.endpoint(), probe_timeout).await {
                                Ok(models) => print!(
                                    "{}",
                                    super::models::format_models_table(&models, session.model())
                                ),
                                Err(e) => eprintln!("Error: {}", e),
                            }
                            continue;
                        }
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {}
                    }

                    let _ = rl.add_history_entry(trimmed);

                    if let Err(e) = session.send(trimmed) {
                        eprintln!("Error: {}", e);
                        continue;
                    }
                    println!();
                    pump_until_idle(&mut session).await;
                    events.take_outcome();
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome_banner(session: &ChatSession) {
        println!(
            "\n{}\n",
            "AIOrg interactive chat".bold().underline()
        );
        println!("Server: {}", session.endpoint());
        println!("Model:  {}", session.model().cyan());
        println!(
            "Type {} for commands, {} to stop a reply, {} to leave.\n",
            "/help".bold(),
            "Ctrl-C".bold(),
            "exit".bold()
        );
    }
}

// One-shot question handler
pub mod ask {
    //! Sends a single prompt and streams the answer to stdout.

    use super::*;

    /// Ask one question
    ///
    /// # Errors
    ///
    /// Returns error if the send fails or is interrupted, so the process
    /// exits with a non-zero status
    pub async fn run_ask(config: Config, prompt: String) -> Result<()> {
        tracing::info!("Asking a single question");

        let events = TerminalEvents::new();
        let mut session =
            ChatSession::new(SessionConfig::from_config(&config), Box::new(events.clone()))?;

        session.send(&prompt)?;
        pump_until_idle(&mut session).await;

        match events.take_outcome() {
            Some(SendOutcome::Completed) => Ok(()),
            Some(SendOutcome::Failed { kind, message }) => {
                Err(anyhow::anyhow!("{}: {}", kind, message))
            }
            Some(SendOutcome::Cancelled) | None => Err(AiorgError::Cancelled.into()),
        }
    }
}

// Server status handler
pub mod status {
    //! Prints whether the configured model server is reachable.

    use super::*;

    /// Probe the configured server
    ///
    /// # Errors
    ///
    /// Returns error if the server is unreachable
    pub async fn run_status(config: Config) -> Result<()> {
        let probe = ConnectionProbe::new()?;
        let status = probe
            .check(
                &config.ollama.host,
                Duration::from_secs(config.probe.timeout_seconds),
            )
            .await;

        print!("{}", format_status(&config.ollama.host, &status));
        println!("Model:   {}", config.ollama.model);

        if status.reachable {
            Ok(())
        } else {
            Err(AiorgError::Connection(format!(
                "model server at {} is not reachable",
                config.ollama.host
            ))
            .into())
        }
    }
}
