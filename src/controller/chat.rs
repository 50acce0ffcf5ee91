//! In-game chat commands
//!
//! Drivers can query their own standing by typing `/rc position` or
//! `/rc best` in chat. Answers go back privately to the sender.

use std::time::Duration;
use tracing::debug;

use super::RaceControl;
use crate::Result;
use crate::provider::ControlCommand;
use crate::types::{Chat, Driver};

const PREFIX: &str = "/rc";

/// A race control query typed in chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Position,
    Best,
}

impl ChatCommand {
    /// Parse a chat line. Anything that is not a known command yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        if words.next()? != PREFIX {
            return None;
        }
        let command = match words.next()?.to_ascii_lowercase().as_str() {
            "position" | "pos" => ChatCommand::Position,
            "best" => ChatCommand::Best,
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }

    /// Reply text for `driver`.
    pub fn reply(self, driver: &Driver) -> String {
        match self {
            ChatCommand::Position if driver.position == 0 => "No position yet".to_owned(),
            ChatCommand::Position if driver.split.is_empty() => format!("P{}", driver.position),
            ChatCommand::Position => format!("P{}, split {}", driver.position, driver.split),
            ChatCommand::Best => match driver.best_lap() {
                Some(best) => format!("Best lap {}", format_lap_time(best)),
                None => "No valid lap yet".to_owned(),
            },
        }
    }
}

/// "1:23.456"
fn format_lap_time(lap: Duration) -> String {
    let millis = lap.as_millis();
    format!("{}:{:02}.{:03}", millis / 60_000, millis / 1_000 % 60, millis % 1_000)
}

impl RaceControl {
    pub(super) async fn chat(&self, chat: &Chat) -> Result<()> {
        let Some(command) = ChatCommand::parse(&chat.message) else {
            return Ok(());
        };
        let driver = self.registry.resolve_or_err(chat.car_id, "chat command")?;
        let message = command.reply(&driver.lock());
        debug!(car_id = chat.car_id, ?command, "Answering chat command");

        self.control.send(ControlCommand::SendChat { car_id: chat.car_id, message }).await
    }
}
