//! Commands received on the message bus.

use crate::lifecycle::CoffeeMode;

pub const COMMAND_MAKE: &str = "make";
pub const COMMAND_INIT: &str = "init";
pub const COMMAND_FUND: &str = "fund";
pub const COMMAND_CLOSE: &str = "close";

/// A lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pay for a coffee (`<prefix>/make`, payload `single` or `double`).
    Make(CoffeeMode),
    /// Open the channel (`<prefix>/init`).
    Init,
    /// Fund the channel (`<prefix>/fund`).
    Fund,
    /// Close the channel (`<prefix>/close`).
    Close,
}

impl Command {
    /// Parse a bus message. Returns `None` for topics that are not commands.
    #[must_use]
    pub fn from_message(prefix: &str, topic: &str, payload: &[u8]) -> Option<Self> {
        let name = topic.strip_prefix(prefix)?.strip_prefix('/')?;
        match name {
            COMMAND_MAKE => Some(Command::Make(CoffeeMode::parse(
                &String::from_utf8_lossy(payload),
            ))),
            COMMAND_INIT => Some(Command::Init),
            COMMAND_FUND => Some(Command::Fund),
            COMMAND_CLOSE => Some(Command::Close),
            _ => None,
        }
    }

    /// Bounded name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::Make(_) => COMMAND_MAKE,
            Command::Init => COMMAND_INIT,
            Command::Fund => COMMAND_FUND,
            Command::Close => COMMAND_CLOSE,
        }
    }
}

/// Topics to subscribe to for all commands.
#[must_use]
pub fn command_topics(prefix: &str) -> Vec<String> {
    [COMMAND_MAKE, COMMAND_INIT, COMMAND_FUND, COMMAND_CLOSE]
        .iter()
        .map(|name| format!("{prefix}/{name}"))
        .collect()
}
