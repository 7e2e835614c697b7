use std::str::FromStr;

use strum::{EnumMessage, IntoEnumIterator};

// -------------------------------------------------------------------------------------------------

/// Single key commands of the live control loop.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::EnumMessage,
)]
#[strum(ascii_case_insensitive)]
pub enum ControlCommand {
    #[strum(
        serialize = " ",
        message = "replay the pitch-per-channel identification test on all channels"
    )]
    ChannelTest,
    #[strum(serialize = "t", message = "change the channels of the three spatial objects")]
    Reassign,
    #[strum(
        serialize = "h",
        message = "change the hopping sequence (keeps channel assignments)"
    )]
    Sequence,
    #[strum(serialize = "g", message = "change the grain length")]
    GrainLength,
    #[strum(serialize = "j", message = "change the jitter (grain launch window size)")]
    Jitter,
    #[strum(serialize = "d", message = "change the density (grain launch interval)")]
    Density,
    #[strum(serialize = "p", message = "change the travel factor (pitch variation range)")]
    TravelSpread,
    #[strum(serialize = "l", message = "change the level of the dry source layer")]
    DryLevel,
    #[strum(serialize = "o", message = "shift all object channels by an offset")]
    ChannelOffset,
    #[strum(serialize = "s", message = "show the current engine status")]
    Status,
    #[strum(serialize = "q", message = "quit")]
    Quit,
}

impl ControlCommand {
    /// Parse a line of user input. A line with nothing but spaces runs the channel test,
    /// an empty line is no command at all.
    pub fn from_input(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            None
        } else if line.trim().is_empty() {
            Some(Self::ChannelTest)
        } else {
            Self::from_str(line.trim()).ok()
        }
    }

    /// Key label as shown in the help text.
    pub fn key_label(&self) -> String {
        match self {
            Self::ChannelTest => "SPACE".to_string(),
            _ => format!("'{}'", self),
        }
    }

    /// One help line per command.
    pub fn help_lines() -> Vec<String> {
        Self::iter()
            .map(|command| {
                format!(
                    "{:>7} - {}",
                    command.key_label(),
                    command.get_message().unwrap_or_default()
                )
            })
            .collect()
    }
}

// -------------------------------------------------------------------------------------------------
