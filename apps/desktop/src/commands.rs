use controls::PointerSample;
use session_core::PointerCommand;
use shared::domain::{ControlId, Vec2};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pointer(PointerCommand),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}' (expected press, move, release, status or quit)")]
    Unknown(String),
    #[error("usage: {0} x y [dial]")]
    Usage(&'static str),
    #[error("'{0}' is not a number")]
    NotANumber(String),
}

/// Parses one stdin line. Blank lines yield `None`.
///
/// The named dial stands in for the hit test: a press or move lands on it,
/// or on `default_dial` when none is given.
pub fn parse_command(line: &str, default_dial: &ControlId) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "press" => Command::Pointer(PointerCommand::Press(sample(
            "press",
            words,
            default_dial,
        )?)),
        "move" => Command::Pointer(PointerCommand::Move(sample("move", words, default_dial)?)),
        "release" => Command::Pointer(PointerCommand::Release),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn sample<'a>(
    verb: &'static str,
    mut words: impl Iterator<Item = &'a str>,
    default_dial: &ControlId,
) -> Result<PointerSample, CommandError> {
    let (Some(x), Some(y)) = (words.next(), words.next()) else {
        return Err(CommandError::Usage(verb));
    };
    let dial = words
        .next()
        .map(ControlId::from)
        .unwrap_or_else(|| default_dial.clone());
    if words.next().is_some() {
        return Err(CommandError::Usage(verb));
    }

    let position = Vec2::new(number(x)?, number(y)?);
    Ok(PointerSample::new(position, Some(dial)))
}

fn number(word: &str) -> Result<f32, CommandError> {
    word.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| CommandError::NotANumber(word.to_string()))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
