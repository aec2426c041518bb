//! Special commands parser for interactive chat mode
//!
//! Lines starting with `/` are handled locally instead of being sent to the
//! model. `exit` and `quit` work without the slash. Commands are
//! case-insensitive.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it does not take
    #[error("{command} takes no arguments, got: {arg}")]
    UnexpectedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Show available commands
    Help,
    /// Clear the conversation
    Reset,
    /// Print the conversation so far
    History,
    /// Probe the model server and show session details
    ShowStatus,
    /// List models installed on the server
    ListModels,
    /// Leave the chat
    Exit,
    /// Not a special command; send the text to the model
    None,
}

/// Parse a line of user input
///
/// # Examples
///
/// ```
/// use aiorg::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/RESET").unwrap(), SpecialCommand::Reset);
/// assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("hello there").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let mut parts = lower.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    let parsed = match command {
        "/help" | "/?" => SpecialCommand::Help,
        "/reset" | "/clear" => SpecialCommand::Reset,
        "/history" => SpecialCommand::History,
        "/status" => SpecialCommand::ShowStatus,
        "/models" => SpecialCommand::ListModels,
        "/exit" | "/quit" | "exit" | "quit" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnexpectedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }

    Ok(parsed)
}

/// Print the help text for interactive mode
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
==========================================

CONVERSATION:
  /reset          - Clear the conversation and start over
  /clear          - Same as /reset
  /history        - Show the conversation so far

SERVER:
  /status         - Check the model server and show session details
  /models         - List models installed on the server

SESSION CONTROL:
  /help           - Show this help message
  /?              - Same as /help
  exit            - Exit interactive mode
  quit            - Same as exit
  Ctrl-C          - Stop the reply being streamed (exits when idle)
"#
    );
}
