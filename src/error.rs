use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("provide device path or vid+pid")]
    NoDeviceSelected,

    #[error("invalid device path: {0}")]
    InvalidPath(String),

    #[error("command too long for payload ({len} > {max})")]
    CommandTooLong { len: usize, max: usize },

    #[error("data too long for single report ({len} > {max})")]
    DataTooLong { len: usize, max: usize },

    #[error("HID write failed")]
    WriteFailed,

    #[error("short report ({0} bytes)")]
    ShortReport(usize),

    #[error("unable to load {name}: {source}")]
    Library {
        name: String,
        #[source]
        source: libloading::Error,
    },

    #[error("{function} failed (code={code}) {description}")]
    Sdk {
        function: &'static str,
        code: i32,
        description: String,
    },

    #[error(
        "this library version does not export ShamrockAcquire; use the camera SDK for intensity \
         acquisition, the spectrograph only provides optics and calibration"
    )]
    AcquireUnsupported,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
