pub mod config;
pub mod error;
pub mod hid;
pub mod shamrock_lib;
pub mod spectrometer;
pub mod spectrum;
pub mod stradus;
pub mod stradus_ascii;
pub mod stradus_cmd;

pub use config::{Conf, LaserSettings, LogSettings, SpectrometerSettings};
pub use error::{Error, Result};
pub use hid::{DeviceSelector, HidTransport, ReportLayout};
pub use shamrock_lib::{ShamrockLibrary, ShamrockReturn, ShamrockSdk, SHAMROCK_SUCCESS};
pub use spectrometer::Spectrometer;
pub use spectrum::Spectrum;
pub use stradus::{Framing, LaserCommand, StradusLaser};
pub use stradus_ascii::StradusAscii;
pub use stradus_cmd::{CmdResponse, CommandId, StradusCmd};
