use std::fmt;
use table_sync::entities::{Action, Chips};

/// Help text listing every command.
pub const HELP: &str = "\
Commands:
  fold, check, call, all-in   Act when it is your turn
  raise [AMOUNT]              Raise, to the minimum if no amount is given
  leave                       Stop watching the table (stay connected)
  help                        Show this help
  quit                        Disconnect and exit
";

/// A parsed line of user input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserCommand {
    TakeAction(Action),
    Leave,
    Help,
    Quit,
}

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid raise amount (not a valid number).
    InvalidRaiseAmount(String),
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRaiseAmount(value) => write!(
                f,
                "Invalid raise amount '{value}'. Must be a positive number (e.g., 'raise 100')"
            ),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{cmd}'. Type 'help' to see available commands"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a command string into a [`UserCommand`].
///
/// # Examples
///
/// ```
/// use table_sync::entities::Action;
/// use ts_client::commands::{UserCommand, parse_command};
///
/// assert_eq!(parse_command("call"), Ok(UserCommand::TakeAction(Action::Call)));
/// assert_eq!(
///     parse_command("raise 100"),
///     Ok(UserCommand::TakeAction(Action::Raise(Some(100))))
/// );
/// ```
pub fn parse_command(input: &str) -> Result<UserCommand, ParseError> {
    let trimmed = input.trim();

    match trimmed {
        "all-in" | "allin" => return Ok(UserCommand::TakeAction(Action::AllIn)),
        "call" => return Ok(UserCommand::TakeAction(Action::Call)),
        "check" => return Ok(UserCommand::TakeAction(Action::Check)),
        "fold" => return Ok(UserCommand::TakeAction(Action::Fold)),
        "leave" => return Ok(UserCommand::Leave),
        "help" | "?" => return Ok(UserCommand::Help),
        "quit" | "exit" => return Ok(UserCommand::Quit),
        _ => {}
    }

    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();
    match parts.first() {
        Some(&"raise") => parse_raise_command(&parts),
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

/// Parse a raise command: "raise [amount]"
fn parse_raise_command(parts: &[&str]) -> Result<UserCommand, ParseError> {
    match parts.get(1) {
        Some(value) => {
            let amount = value
                .parse::<Chips>()
                .ok()
                .filter(|amount| *amount > 0)
                .ok_or_else(|| ParseError::InvalidRaiseAmount(value.to_string()))?;
            Ok(UserCommand::TakeAction(Action::Raise(Some(amount))))
        }
        None => Ok(UserCommand::TakeAction(Action::Raise(None))),
    }
}
