use crate::hid::{HidTransport, ReportLayout};
use crate::stradus::{decode_ascii, LaserCommand, StradusLaser};
use crate::{Error, Result};
use log::debug;

/// Request/response command IDs of the framed protocol.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandId {
    SetCmdQry = 0xA0,
    GetResponseStatus = 0xA1,
    GetResponse = 0xA2,
    SetResponseReceived = 0xA3,
}

impl From<CommandId> for u8 {
    fn from(value: CommandId) -> Self {
        value as u8
    }
}

/// One decoded response frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmdResponse {
    /// Echoed command or status byte.
    pub status: u8,
    pub payload: Vec<u8>,
}

/// Build `[report_id][cmd][len][data][crc?][padding]`.
///
/// The optional checksum is the XOR of the data bytes, placed right after
/// the data.
pub fn frame_cmd(layout: &ReportLayout, cmd: u8, data: &[u8], add_crc: bool) -> Result<Vec<u8>> {
    let room = layout.payload_len.saturating_sub(2);
    let needed = data.len() + usize::from(add_crc);
    if layout.payload_len < 2 || needed > room {
        return Err(Error::DataTooLong {
            len: data.len(),
            max: room.saturating_sub(usize::from(add_crc)),
        });
    }
    // len is a single byte on the wire
    if data.len() > usize::from(u8::MAX) {
        return Err(Error::DataTooLong {
            len: data.len(),
            max: usize::from(u8::MAX),
        });
    }

    let mut report = vec![0u8; layout.report_len()];
    report[0] = layout.report_id;
    let payload = &mut report[1..];
    payload[0] = cmd;
    payload[1] = data.len() as u8;
    payload[2..2 + data.len()].copy_from_slice(data);
    if add_crc {
        payload[2 + data.len()] = data.iter().fold(0u8, |crc, b| crc ^ b);
    }
    Ok(report)
}

/// Parse `[report_id][status][len][data...]`. An empty read means no
/// response; a declared length longer than the report is truncated.
pub fn parse_cmd_report(raw: &[u8]) -> Result<Option<CmdResponse>> {
    match raw.len() {
        0 => return Ok(None),
        1 => return Err(Error::ShortReport(1)),
        _ => {}
    }
    let status = raw[1];
    let length = raw.get(2).copied().map_or(0, usize::from);
    let start = 3.min(raw.len());
    let end = (3 + length).min(raw.len());
    Ok(Some(CmdResponse {
        status,
        payload: raw[start..end].to_vec(),
    }))
}

/// Stradus laser driven by command/length framed HID reports.
pub struct StradusCmd<T: HidTransport> {
    transport: T,
    layout: ReportLayout,
    timeout_ms: i32,
    add_crc: bool,
}

impl<T: HidTransport> StradusCmd<T> {
    pub fn new(transport: T, layout: ReportLayout, timeout_ms: i32, add_crc: bool) -> Self {
        Self {
            transport,
            layout,
            timeout_ms,
            add_crc,
        }
    }

    pub fn send_request(&mut self, cmd: u8, data: &[u8], add_crc: bool) -> Result<()> {
        let report = frame_cmd(&self.layout, cmd, data, add_crc)?;
        debug!("cmd tx 0x{cmd:02X} len={} crc={add_crc}", data.len());
        match self.transport.write_report(&report)? {
            0 => Err(Error::WriteFailed),
            _ => Ok(()),
        }
    }

    pub fn read_response(&mut self) -> Result<Option<CmdResponse>> {
        let mut buf = vec![0u8; self.layout.report_len()];
        let n = self.transport.read_report(&mut buf, self.timeout_ms)?;
        let response = parse_cmd_report(&buf[..n])?;
        if let Some(resp) = &response {
            debug!("cmd rx 0x{:02X} len={}", resp.status, resp.payload.len());
        }
        Ok(response)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: HidTransport> StradusLaser for StradusCmd<T> {
    fn query(&mut self, command: &LaserCommand) -> Result<String> {
        let ascii = command.to_ascii();
        self.send_request(CommandId::SetCmdQry.into(), ascii.as_bytes(), self.add_crc)?;
        Ok(self
            .read_response()?
            .map(|resp| decode_ascii(&resp.payload))
            .unwrap_or_default())
    }
}
