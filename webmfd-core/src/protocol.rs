//! Button event codes and label-set payloads
//!
//! Client to server, a button press travels as its integer code. Push
//! frames pad the code to two digits; poll requests carry it unpadded in
//! the path. Server to client, a payload is either empty ("nothing ready,
//! ask again") or a JSON [`LabelSet`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Number of soft keys on each side of a panel
pub const KEYS_PER_SIDE: usize = 6;

/// Total number of labelled soft keys on a panel
pub const SOFT_KEY_COUNT: usize = KEYS_PER_SIDE * 2;

/// Code requesting the current labels without pressing anything
pub const REFRESH_CODE: i32 = -1;
/// Code for the select button
pub const SELECT_CODE: i32 = 13;
/// Code for the menu button
pub const MENU_CODE: i32 = 14;
/// Code notifying the server that the session is being torn down
pub const TEARDOWN_CODE: i32 = 99;

/// Which column of soft keys a button belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// A button press or control event on a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    /// Ask for the current label state
    Refresh,
    /// One of the twelve soft keys; `index` counts from the top, 0..6
    SoftKey { side: Side, index: u8 },
    /// SEL
    Select,
    /// MNU
    Menu,
    /// Session teardown notification
    Teardown,
    /// PWR closes the panel locally and is never sent
    Power,
}

impl ButtonEvent {
    /// Soft key for a display slot, 0..6 left then 6..12 right
    pub fn soft_key(slot: usize) -> Option<Self> {
        match slot {
            0..KEYS_PER_SIDE => Some(Self::SoftKey {
                side: Side::Left,
                index: slot as u8,
            }),
            KEYS_PER_SIDE..SOFT_KEY_COUNT => Some(Self::SoftKey {
                side: Side::Right,
                index: (slot - KEYS_PER_SIDE) as u8,
            }),
            _ => None,
        }
    }

    /// Wire code, or `None` for events handled locally
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Refresh => Some(REFRESH_CODE),
            Self::SoftKey { side, index } => {
                let offset = match side {
                    Side::Left => 0,
                    Side::Right => KEYS_PER_SIDE as i32,
                };
                Some(offset + i32::from(*index))
            }
            Self::Select => Some(SELECT_CODE),
            Self::Menu => Some(MENU_CODE),
            Self::Teardown => Some(TEARDOWN_CODE),
            Self::Power => None,
        }
    }

    fn wire_code(&self) -> Result<i32, ProtocolError> {
        self.code()
            .ok_or_else(|| ProtocolError::NotSendable(self.to_string()))
    }
}

impl TryFrom<i32> for ButtonEvent {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            REFRESH_CODE => Ok(Self::Refresh),
            SELECT_CODE => Ok(Self::Select),
            MENU_CODE => Ok(Self::Menu),
            TEARDOWN_CODE => Ok(Self::Teardown),
            0..=11 => Self::soft_key(code as usize).ok_or(ProtocolError::InvalidCode(code)),
            _ => Err(ProtocolError::InvalidCode(code)),
        }
    }
}

impl FromStr for ButtonEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i32>() {
            return Self::try_from(code);
        }

        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "refresh" => return Ok(Self::Refresh),
            "sel" | "select" => return Ok(Self::Select),
            "mnu" | "menu" => return Ok(Self::Menu),
            "pwr" | "power" => return Ok(Self::Power),
            "teardown" => return Ok(Self::Teardown),
            _ => {}
        }

        // l1..l6 and r1..r6, numbered from the top as printed on the panel
        let unknown = || ProtocolError::UnknownButton(s.to_string());
        let (side, rest) = match lower.split_at_checked(1) {
            Some(("l", rest)) => (Side::Left, rest),
            Some(("r", rest)) => (Side::Right, rest),
            _ => return Err(unknown()),
        };
        let number: u8 = rest.parse().map_err(|_| unknown())?;
        if !(1..=KEYS_PER_SIDE as u8).contains(&number) {
            return Err(unknown());
        }
        Ok(Self::SoftKey {
            side,
            index: number - 1,
        })
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refresh => write!(f, "REFRESH"),
            Self::SoftKey {
                side: Side::Left,
                index,
            } => write!(f, "L{}", index + 1),
            Self::SoftKey {
                side: Side::Right,
                index,
            } => write!(f, "R{}", index + 1),
            Self::Select => write!(f, "SEL"),
            Self::Menu => write!(f, "MNU"),
            Self::Teardown => write!(f, "TEARDOWN"),
            Self::Power => write!(f, "PWR"),
        }
    }
}

/// Current captions of the twelve soft keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub left: [String; KEYS_PER_SIDE],
    pub right: [String; KEYS_PER_SIDE],
}

impl LabelSet {
    /// Labels paired with their display slot, left column first
    pub fn slots(&self) -> impl Iterator<Item = (usize, &str)> {
        self.left
            .iter()
            .chain(self.right.iter())
            .map(String::as_str)
            .enumerate()
    }
}

/// A decoded server payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The server had nothing ready; the client should ask again
    NotReady,
    Labels(LabelSet),
}

/// Encode an event as a push frame: decimal, zero-padded to two digits
pub fn encode_frame(event: ButtonEvent) -> Result<String, ProtocolError> {
    Ok(format!("{:02}", event.wire_code()?))
}

/// Encode an event as the code segment of a poll request path
pub fn encode_path_code(event: ButtonEvent) -> Result<String, ProtocolError> {
    Ok(event.wire_code()?.to_string())
}

/// Decode a push frame or poll response body
pub fn decode_payload(text: &str) -> Result<Payload, ProtocolError> {
    if text.trim().is_empty() {
        return Ok(Payload::NotReady);
    }
    serde_json::from_str::<LabelSet>(text)
        .map(Payload::Labels)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}
