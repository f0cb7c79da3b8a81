//! Server-list advertisement published through the transport option channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Game protocol version advertised by default.
pub const PROTOCOL_VERSION: u32 = 84;

/// Game version string advertised by default.
pub const GAME_VERSION: &str = "0.15.10";

/// One server-list broadcast entry.
///
/// Rendered as `MCPE;<name>;<protocol>;<version>;<players>;<max players>` —
/// five semicolon-delimited fields after the literal prefix. Clients parse
/// this string verbatim, so the field order is part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub server_name: String,
    pub protocol_version: u32,
    pub game_version: String,
    pub players: u32,
    pub max_players: u32,
}

impl Advertisement {
    /// Advertisement with the default protocol and game versions.
    pub fn new(server_name: impl Into<String>, players: u32, max_players: u32) -> Self {
        Self {
            server_name: server_name.into(),
            protocol_version: PROTOCOL_VERSION,
            game_version: GAME_VERSION.to_owned(),
            players,
            max_players,
        }
    }
}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MCPE;{};{};{};{};{}",
            self.server_name, self.protocol_version, self.game_version, self.players, self.max_players
        )
    }
}
