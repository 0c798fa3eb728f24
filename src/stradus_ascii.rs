use crate::hid::{HidTransport, ReportLayout};
use crate::stradus::{decode_ascii, LaserCommand, StradusLaser};
use crate::{Error, Result};
use log::debug;

/// Build `[report_id][ascii][0x00 padding]`.
pub fn frame_ascii(layout: &ReportLayout, command: &str) -> Result<Vec<u8>> {
    let payload: Vec<u8> = command.bytes().filter(|b| b.is_ascii()).collect();
    if payload.len() > layout.payload_len {
        return Err(Error::CommandTooLong {
            len: payload.len(),
            max: layout.payload_len,
        });
    }
    let mut report = vec![0u8; layout.report_len()];
    report[0] = layout.report_id;
    report[1..=payload.len()].copy_from_slice(&payload);
    Ok(report)
}

/// Decode one raw report (report ID first). Zero bytes are dropped wherever
/// they appear.
pub fn decode_ascii_report(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let payload: Vec<u8> = raw[1..].iter().copied().filter(|&b| b != 0).collect();
    decode_ascii(&payload)
}

/// Stradus laser driven by raw ASCII commands inside HID reports.
pub struct StradusAscii<T: HidTransport> {
    transport: T,
    layout: ReportLayout,
    timeout_ms: i32,
}

impl<T: HidTransport> StradusAscii<T> {
    pub fn new(transport: T, layout: ReportLayout, timeout_ms: i32) -> Self {
        Self {
            transport,
            layout,
            timeout_ms,
        }
    }

    pub fn write_ascii(&mut self, command: &str) -> Result<()> {
        let report = frame_ascii(&self.layout, command)?;
        debug!("ascii tx {command:?}");
        match self.transport.write_report(&report)? {
            0 => Err(Error::WriteFailed),
            _ => Ok(()),
        }
    }

    pub fn read_ascii(&mut self) -> Result<String> {
        let mut buf = vec![0u8; self.layout.report_len()];
        let n = self.transport.read_report(&mut buf, self.timeout_ms)?;
        let reply = decode_ascii_report(&buf[..n]);
        debug!("ascii rx {n} bytes: {reply:?}");
        Ok(reply)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: HidTransport> StradusLaser for StradusAscii<T> {
    fn query(&mut self, command: &LaserCommand) -> Result<String> {
        self.write_ascii(&command.to_ascii())?;
        self.read_ascii()
    }
}
