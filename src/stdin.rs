//! Console control.
//!
//! Plain lines replace the text of the [STDIN_SOURCE] text source, so the
//! detector picks them up like any other live text. Lines starting with a
//! slash are commands.

use crate::{
    event::{Event, EventBus, SpeechAction},
    text_source::TextSources,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Name of the text source fed from the console.
pub const STDIN_SOURCE: &str = "stdin";

#[derive(Debug, PartialEq)]
pub enum Command {
    /// Replace the console text source
    SetText(String),

    /// `/speak <text>`
    Speak(String),

    /// `/generate`
    GenerateNow,

    /// `/quit`
    Quit,
}

pub fn parse(line: &str) -> Option<Command> {
    let Some(command) = line.strip_prefix('/') else {
        return Some(Command::SetText(line.to_string()));
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "speak" if !rest.trim().is_empty() => Some(Command::Speak(rest.trim().to_string())),
        "generate" => Some(Command::GenerateNow),
        "quit" => Some(Command::Quit),
        _ => None,
    }
}

pub fn init(bus: EventBus, sources: TextSources) {
    sources.set(STDIN_SOURCE, "");

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Console input closed");
                    break;
                }
                Err(e) => {
                    error!("Error while reading console input: {e}");
                    break;
                }
            };

            match parse(&line) {
                Some(Command::SetText(text)) => sources.set(STDIN_SOURCE, &text),
                Some(Command::Speak(text)) => bus.send(Event::Speech(SpeechAction::Speak { text })),
                Some(Command::GenerateNow) => bus.send(Event::Speech(SpeechAction::GenerateNow)),
                Some(Command::Quit) => {
                    bus.send(Event::Shutdown);
                    break;
                }
                None => warn!("Unknown command: {line}"),
            }
        }
    });
}
