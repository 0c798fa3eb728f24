use crate::Result;
use serde::Deserialize;

/// Laser commands understood by the Stradus controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LaserCommand {
    On,
    Off,
    /// Output power in milliwatts.
    SetPower(f64),
    Status,
}

impl LaserCommand {
    pub fn to_ascii(&self) -> String {
        match self {
            Self::On => "LON\r".to_string(),
            Self::Off => "LOFF\r".to_string(),
            Self::SetPower(mw) => format!("LPOWER {mw:.3}\r"),
            Self::Status => "STATUS?\r".to_string(),
        }
    }
}

/// How laser commands are packed into HID reports.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Raw ASCII in the payload, zero padded.
    Ascii,
    /// `[cmd][len][data]` frames carrying the ASCII command.
    Cmd,
}

/// One request/reply exchange per call; replies come back as decoded text.
pub trait StradusLaser {
    fn query(&mut self, command: &LaserCommand) -> Result<String>;

    fn laser_on(&mut self) -> Result<String> {
        self.query(&LaserCommand::On)
    }

    fn laser_off(&mut self) -> Result<String> {
        self.query(&LaserCommand::Off)
    }

    fn set_power(&mut self, mw: f64) -> Result<String> {
        self.query(&LaserCommand::SetPower(mw))
    }

    fn status(&mut self) -> Result<String> {
        self.query(&LaserCommand::Status)
    }
}

/// ASCII decode that drops non-ASCII bytes and trims line endings and NULs.
pub(crate) fn decode_ascii(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    text.trim_matches(|c| matches!(c, '\r' | '\n' | '\0'))
        .to_string()
}
