use crate::hid::{parse_hex_u16, ReportLayout};
use crate::stradus::Framing;
use confique::{Config, File};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "photonctl.toml";

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub laser: LaserSettings,
    #[config(nested)]
    pub spectrometer: SpectrometerSettings,
    #[config(nested)]
    pub logging: LogSettings,
}

#[derive(Config, Debug, Clone)]
pub struct LaserSettings {
    #[config(env = "PHOTONCTL_LASER_FRAMING", default = "ascii")]
    pub framing: Framing,
    /// Integer, or a string in hex (`"0x0C80"`) or decimal.
    #[config(env = "PHOTONCTL_LASER_VID", deserialize_with = deserialize_id)]
    pub vid: Option<u16>,
    #[config(env = "PHOTONCTL_LASER_PID", deserialize_with = deserialize_id)]
    pub pid: Option<u16>,
    /// Platform HID path, plain or as a `b'...'` literal.
    #[config(env = "PHOTONCTL_LASER_PATH")]
    pub path: Option<String>,
    #[config(env = "PHOTONCTL_LASER_TIMEOUT_MS", default = 500)]
    pub timeout_ms: i32,
    #[config(env = "PHOTONCTL_LASER_REPORT_ID", default = 0)]
    pub report_id: u8,
    /// Payload bytes per report, excluding the report ID.
    #[config(env = "PHOTONCTL_LASER_PAYLOAD_LEN", default = 64)]
    pub payload_len: usize,
    /// Append an XOR checksum to command frames.
    #[config(env = "PHOTONCTL_LASER_CRC", default = false)]
    pub crc: bool,
}

impl LaserSettings {
    pub fn layout(&self) -> ReportLayout {
        ReportLayout {
            report_id: self.report_id,
            payload_len: self.payload_len,
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct SpectrometerSettings {
    /// Explicit path to the vendor library.
    #[config(env = "PHOTONCTL_SHAMROCK_LIBRARY")]
    pub library: Option<PathBuf>,
    #[config(env = "PHOTONCTL_SHAMROCK_DEVICE", default = 0)]
    pub device: i32,
    #[config(env = "PHOTONCTL_OUTFILE", default = "spectrum.csv")]
    pub outfile: PathBuf,
}

#[derive(Config, Debug, Clone)]
pub struct LogSettings {
    #[config(env = "PHOTONCTL_LOG", default = "info")]
    pub level: String,
    #[config(env = "PHOTONCTL_LOG_FILE")]
    pub file: Option<PathBuf>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u16),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(id) => Ok(id),
        Id::Text(text) => parse_hex_u16(&text).map_err(serde::de::Error::custom),
    }
}

impl Conf {
    /// Environment first, then the given file, then `photonctl.toml`.
    /// A file named explicitly must exist; the default one is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self, confique::Error> {
        let mut builder = Conf::builder().env();
        if let Some(path) = path {
            let explicit: <Conf as Config>::Partial = File::new(path)?.required().load()?;
            builder = builder.preloaded(explicit);
        }
        builder.file(DEFAULT_CONFIG_FILE).load()
    }
}
