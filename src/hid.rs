use crate::{Error, Result};
use hidapi::{HidApi, HidDevice};
use log::{debug, info};
use std::ffi::CString;

/// Report ID used by devices that expose a single report.
pub const REPORT_ID: u8 = 0x00;
/// Payload length of one report, excluding the report ID byte.
pub const PAYLOAD_LEN: usize = 64;

/// Shape of the fixed-size reports exchanged with a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportLayout {
    pub report_id: u8,
    pub payload_len: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            report_id: REPORT_ID,
            payload_len: PAYLOAD_LEN,
        }
    }
}

impl ReportLayout {
    /// Full report length including the report ID byte.
    pub fn report_len(&self) -> usize {
        self.payload_len + 1
    }
}

/// Raw report I/O. Implemented for hidapi devices; tests plug in their own.
pub trait HidTransport {
    fn write_report(&mut self, report: &[u8]) -> Result<usize>;
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl HidTransport for HidDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<usize> {
        Ok(self.write(report)?)
    }

    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(self.read_timeout(buf, timeout_ms)?)
    }
}

/// Which device to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelector {
    Path(CString),
    VidPid(u16, u16),
}

impl DeviceSelector {
    /// A path wins over vid+pid; both ids are needed otherwise.
    pub fn resolve(path: Option<&str>, vid: Option<u16>, pid: Option<u16>) -> Result<Self> {
        if let Some(path) = path {
            return Ok(Self::Path(parse_device_path(path)?));
        }
        match (vid, pid) {
            (Some(vid), Some(pid)) => Ok(Self::VidPid(vid, pid)),
            _ => Err(Error::NoDeviceSelected),
        }
    }
}

pub fn open_device(api: &HidApi, selector: &DeviceSelector) -> Result<HidDevice> {
    let device = match selector {
        DeviceSelector::Path(path) => {
            info!("Opening HID device at {:?}", path);
            api.open_path(path)?
        }
        DeviceSelector::VidPid(vid, pid) => {
            info!("Opening HID device VID=0x{vid:04X} PID=0x{pid:04X}");
            api.open(*vid, *pid)?
        }
    };
    device.set_blocking_mode(false)?;
    Ok(device)
}

/// Render the device enumeration, one block per device.
pub fn list_devices(api: &HidApi) -> String {
    let mut out = String::new();
    for dev in api.device_list() {
        out.push_str(&format!(
            "0x{:04x} 0x{:04x} {} | {}\n",
            dev.vendor_id(),
            dev.product_id(),
            dev.manufacturer_string().unwrap_or("None"),
            dev.product_string().unwrap_or("None"),
        ));
        out.push_str(&format!("PATH: {}\n", render_device_path(dev.path().to_bytes())));
        out.push_str(&"-".repeat(60));
        out.push('\n');
    }
    debug!("Enumerated {} HID device(s)", api.device_list().count());
    out
}

/// Bytes-literal form of a device path, accepted back by
/// [`parse_device_path`].
pub fn render_device_path(path: &[u8]) -> String {
    let mut out = String::with_capacity(path.len() + 3);
    out.push_str("b'");
    for &b in path {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

/// Accepts `0x`-prefixed hex or plain decimal.
pub fn parse_hex_u16(s: &str) -> std::result::Result<u16, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse::<u16>()
    };
    parsed.map_err(|e| format!("invalid id '{s}': {e}"))
}

/// Device paths come either as plain strings or as bytes literals
/// (`b'\\?\hid#vid_...'`) copied out of an enumeration listing.
pub fn parse_device_path(s: &str) -> Result<CString> {
    let bytes = match bytes_literal_body(s) {
        Some(body) => unescape_bytes(body)?,
        None => s.as_bytes().to_vec(),
    };
    CString::new(bytes).map_err(|_| Error::InvalidPath(s.to_string()))
}

fn bytes_literal_body(s: &str) -> Option<&str> {
    let rest = s.strip_prefix('b')?;
    for quote in ['\'', '"'] {
        if let Some(body) = rest.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return Some(body);
        }
    }
    None
}

fn unescape_bytes(body: &str) -> Result<Vec<u8>> {
    let invalid = || Error::InvalidPath(body.to_string());
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('\\') => out.push(b'\\'),
            Some('\'') => out.push(b'\''),
            Some('"') => out.push(b'"'),
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return Err(invalid());
                }
                out.push(u8::from_str_radix(&hex, 16).map_err(|_| invalid())?);
            }
            // unknown escapes are kept verbatim
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    Ok(out)
}
