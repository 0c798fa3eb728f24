use crate::{Error, Result};
use libc::{c_char, c_double, c_int};
use libloading::Library;
use log::{debug, info};
use std::ffi::{CStr, OsString};
use std::path::{Path, PathBuf};

#[cfg(windows)]
pub const LIBRARY_NAME: &str = "ShamrockCIF.dll";
#[cfg(not(windows))]
pub const LIBRARY_NAME: &str = "libshamrockcif.so";

pub const SHAMROCK_SUCCESS: i32 = 20202;

const DESCRIPTION_LEN: usize = 256;

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub enum ShamrockReturn {
    CommunicationError = 20201,
    Success = 20202,
    P1Invalid = 20266,
    P2Invalid = 20267,
    P3Invalid = 20268,
    P4Invalid = 20269,
    P5Invalid = 20270,
    NotInitialized = 20275,
    NotAvailable = 20292,
    Other = -1,
}

impl From<i32> for ShamrockReturn {
    fn from(value: i32) -> Self {
        match value {
            20201 => Self::CommunicationError,
            20202 => Self::Success,
            20266 => Self::P1Invalid,
            20267 => Self::P2Invalid,
            20268 => Self::P3Invalid,
            20269 => Self::P4Invalid,
            20270 => Self::P5Invalid,
            20275 => Self::NotInitialized,
            20292 => Self::NotAvailable,
            _ => Self::Other,
        }
    }
}

/// The spectrograph control calls, each returning the raw vendor code.
///
/// Output parameters are written through the given references/buffers just
/// like the C API does.
pub trait ShamrockSdk {
    fn initialize(&self, ini_dir: &CStr) -> i32;
    fn close(&self) -> i32;
    fn number_devices(&self, count: &mut i32) -> i32;
    fn serial_number(&self, device: i32, buf: &mut [u8]) -> i32;
    fn return_description(&self, code: i32, buf: &mut [u8]) -> i32;
    fn set_grating(&self, device: i32, grating: i32) -> i32;
    fn grating(&self, device: i32, grating: &mut i32) -> i32;
    fn set_wavelength(&self, device: i32, nm: f64) -> i32;
    fn wavelength(&self, device: i32, nm: &mut f64) -> i32;
    fn number_pixels(&self, device: i32, pixels: &mut i32) -> i32;
    fn calibration(&self, device: i32, values: &mut [f64]) -> i32;
    fn wavelength_limits(&self, device: i32, min: &mut f64, max: &mut f64) -> i32;
    /// `None` when the loaded library does not export an acquire call.
    fn acquire(&self, device: i32, values: &mut [f64]) -> Option<i32>;
}

/// Turn a vendor return code into a `Result`, pulling the description text
/// for failures.
pub fn check<S: ShamrockSdk + ?Sized>(sdk: &S, code: i32, function: &'static str) -> Result<()> {
    if code == SHAMROCK_SUCCESS {
        return Ok(());
    }
    let mut buf = vec![0u8; DESCRIPTION_LEN];
    let description = if sdk.return_description(code, &mut buf) == SHAMROCK_SUCCESS {
        c_buf_to_string(&buf)
    } else {
        String::new()
    };
    debug!("{function} returned {code} ({:?})", ShamrockReturn::from(code));
    Err(Error::Sdk {
        function,
        code,
        description,
    })
}

/// Text up to the first NUL, lossy.
pub(crate) fn c_buf_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

type InitializeFn = unsafe extern "system" fn(*const c_char) -> c_int;
type CloseFn = unsafe extern "system" fn() -> c_int;
type GetNumberDevicesFn = unsafe extern "system" fn(*mut c_int) -> c_int;
type GetSerialNumberFn = unsafe extern "system" fn(c_int, *mut c_char) -> c_int;
type GetReturnDescriptionFn = unsafe extern "system" fn(c_int, *mut c_char, c_int) -> c_int;
type SetGratingFn = unsafe extern "system" fn(c_int, c_int) -> c_int;
type GetGratingFn = unsafe extern "system" fn(c_int, *mut c_int) -> c_int;
type SetWavelengthFn = unsafe extern "system" fn(c_int, c_double) -> c_int;
type GetWavelengthFn = unsafe extern "system" fn(c_int, *mut c_double) -> c_int;
type GetNumberPixelsFn = unsafe extern "system" fn(c_int, *mut c_int) -> c_int;
type GetCalibrationFn = unsafe extern "system" fn(c_int, *mut c_double, c_int) -> c_int;
type GetWavelengthLimitsFn = unsafe extern "system" fn(c_int, *mut c_double, *mut c_double) -> c_int;
type AcquireFn = unsafe extern "system" fn(c_int, *mut c_double, c_int) -> c_int;

/// The vendor control library, loaded at runtime.
pub struct ShamrockLibrary {
    initialize: InitializeFn,
    close: CloseFn,
    get_number_devices: GetNumberDevicesFn,
    get_serial_number: GetSerialNumberFn,
    get_return_description: GetReturnDescriptionFn,
    set_grating: SetGratingFn,
    get_grating: GetGratingFn,
    set_wavelength: SetWavelengthFn,
    get_wavelength: GetWavelengthFn,
    get_number_pixels: GetNumberPixelsFn,
    get_calibration: GetCalibrationFn,
    get_wavelength_limits: GetWavelengthLimitsFn,
    acquire: Option<AcquireFn>,
    // keeps every function pointer above valid
    _library: Library,
}

/// Where to look for the library: an explicit path alone, otherwise the
/// executable's directory first and the loader search path second.
pub fn library_candidates(configured: Option<&Path>) -> Vec<OsString> {
    if let Some(path) = configured {
        return vec![path.as_os_str().to_owned()];
    }
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let beside: PathBuf = dir.join(LIBRARY_NAME);
        if beside.exists() {
            candidates.push(beside.into_os_string());
        }
    }
    candidates.push(OsString::from(LIBRARY_NAME));
    candidates
}

impl ShamrockLibrary {
    pub fn load(configured: Option<&Path>) -> Result<Self> {
        let candidate = library_candidates(configured)
            .into_iter()
            .next()
            .unwrap_or_else(|| OsString::from(LIBRARY_NAME));
        let name = candidate.to_string_lossy().into_owned();

        let library = unsafe { Library::new(&candidate) }.map_err(|source| Error::Library {
            name: name.clone(),
            source,
        })?;
        let lib = unsafe { Self::bind(library) }.map_err(|source| Error::Library {
            name: name.clone(),
            source,
        })?;
        info!(
            "Loaded {name} (acquire {})",
            if lib.acquire.is_some() {
                "available"
            } else {
                "not exported"
            }
        );
        Ok(lib)
    }

    /// # Safety
    ///
    /// The library must export these symbols with the declared signatures.
    unsafe fn bind(library: Library) -> std::result::Result<Self, libloading::Error> {
        let initialize = *library.get::<InitializeFn>(b"ShamrockInitialize")?;
        let close = *library.get::<CloseFn>(b"ShamrockClose")?;
        let get_number_devices = *library.get::<GetNumberDevicesFn>(b"ShamrockGetNumberDevices")?;
        let get_serial_number = *library.get::<GetSerialNumberFn>(b"ShamrockGetSerialNumber")?;
        let get_return_description =
            *library.get::<GetReturnDescriptionFn>(b"ShamrockGetFunctionReturnDescription")?;
        let set_grating = *library.get::<SetGratingFn>(b"ShamrockSetGrating")?;
        let get_grating = *library.get::<GetGratingFn>(b"ShamrockGetGrating")?;
        let set_wavelength = *library.get::<SetWavelengthFn>(b"ShamrockSetWavelength")?;
        let get_wavelength = *library.get::<GetWavelengthFn>(b"ShamrockGetWavelength")?;
        let get_number_pixels = *library.get::<GetNumberPixelsFn>(b"ShamrockGetNumberPixels")?;
        let get_calibration = *library.get::<GetCalibrationFn>(b"ShamrockGetCalibration")?;
        let get_wavelength_limits =
            *library.get::<GetWavelengthLimitsFn>(b"ShamrockGetWavelengthLimits")?;
        // not every library version exports this one
        let acquire = match library.get::<AcquireFn>(b"ShamrockAcquire") {
            Ok(sym) => Some(*sym),
            Err(_) => None,
        };

        Ok(Self {
            initialize,
            close,
            get_number_devices,
            get_serial_number,
            get_return_description,
            set_grating,
            get_grating,
            set_wavelength,
            get_wavelength,
            get_number_pixels,
            get_calibration,
            get_wavelength_limits,
            acquire,
            _library: library,
        })
    }
}

impl ShamrockSdk for ShamrockLibrary {
    fn initialize(&self, ini_dir: &CStr) -> i32 {
        unsafe { (self.initialize)(ini_dir.as_ptr()) }
    }

    fn close(&self) -> i32 {
        unsafe { (self.close)() }
    }

    fn number_devices(&self, count: &mut i32) -> i32 {
        unsafe { (self.get_number_devices)(count) }
    }

    fn serial_number(&self, device: i32, buf: &mut [u8]) -> i32 {
        unsafe { (self.get_serial_number)(device, buf.as_mut_ptr() as *mut c_char) }
    }

    fn return_description(&self, code: i32, buf: &mut [u8]) -> i32 {
        let len = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        unsafe { (self.get_return_description)(code, buf.as_mut_ptr() as *mut c_char, len) }
    }

    fn set_grating(&self, device: i32, grating: i32) -> i32 {
        unsafe { (self.set_grating)(device, grating) }
    }

    fn grating(&self, device: i32, grating: &mut i32) -> i32 {
        unsafe { (self.get_grating)(device, grating) }
    }

    fn set_wavelength(&self, device: i32, nm: f64) -> i32 {
        unsafe { (self.set_wavelength)(device, nm) }
    }

    fn wavelength(&self, device: i32, nm: &mut f64) -> i32 {
        unsafe { (self.get_wavelength)(device, nm) }
    }

    fn number_pixels(&self, device: i32, pixels: &mut i32) -> i32 {
        unsafe { (self.get_number_pixels)(device, pixels) }
    }

    fn calibration(&self, device: i32, values: &mut [f64]) -> i32 {
        let len = c_int::try_from(values.len()).unwrap_or(c_int::MAX);
        unsafe { (self.get_calibration)(device, values.as_mut_ptr(), len) }
    }

    fn wavelength_limits(&self, device: i32, min: &mut f64, max: &mut f64) -> i32 {
        unsafe { (self.get_wavelength_limits)(device, min, max) }
    }

    fn acquire(&self, device: i32, values: &mut [f64]) -> Option<i32> {
        let acquire = self.acquire?;
        let len = c_int::try_from(values.len()).unwrap_or(c_int::MAX);
        Some(unsafe { acquire(device, values.as_mut_ptr(), len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Describes;

    impl ShamrockSdk for Describes {
        fn initialize(&self, _: &CStr) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn close(&self) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn number_devices(&self, _: &mut i32) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn serial_number(&self, _: i32, _: &mut [u8]) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn return_description(&self, code: i32, buf: &mut [u8]) -> i32 {
            if code == 20275 {
                let text = b"SHAMROCK_NOT_INITIALIZED\0";
                buf[..text.len()].copy_from_slice(text);
                SHAMROCK_SUCCESS
            } else {
                20266
            }
        }
        fn set_grating(&self, _: i32, _: i32) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn grating(&self, _: i32, _: &mut i32) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn set_wavelength(&self, _: i32, _: f64) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn wavelength(&self, _: i32, _: &mut f64) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn number_pixels(&self, _: i32, _: &mut i32) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn calibration(&self, _: i32, _: &mut [f64]) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn wavelength_limits(&self, _: i32, _: &mut f64, _: &mut f64) -> i32 {
            SHAMROCK_SUCCESS
        }
        fn acquire(&self, _: i32, _: &mut [f64]) -> Option<i32> {
            None
        }
    }

    #[test]
    fn return_codes() {
        assert_eq!(ShamrockReturn::from(20202), ShamrockReturn::Success);
        assert_eq!(ShamrockReturn::from(20275), ShamrockReturn::NotInitialized);
        assert_eq!(ShamrockReturn::from(20268), ShamrockReturn::P3Invalid);
        assert_eq!(ShamrockReturn::from(0), ShamrockReturn::Other);
    }

    #[test]
    fn check_success() {
        assert!(check(&Describes, SHAMROCK_SUCCESS, "ShamrockClose").is_ok());
    }

    #[test]
    fn check_failure_carries_description() {
        let err = check(&Describes, 20275, "ShamrockSetGrating").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ShamrockSetGrating failed (code=20275) SHAMROCK_NOT_INITIALIZED"
        );
    }

    #[test]
    fn check_failure_without_description() {
        let err = check(&Describes, 20201, "ShamrockInitialize").unwrap_err();
        match err {
            Error::Sdk {
                function,
                code,
                description,
            } => {
                assert_eq!(function, "ShamrockInitialize");
                assert_eq!(code, 20201);
                assert!(description.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn c_buffers() {
        assert_eq!(c_buf_to_string(b"SR-500i\0garbage"), "SR-500i");
        assert_eq!(c_buf_to_string(b"no-nul"), "no-nul");
        assert_eq!(c_buf_to_string(&[0u8; 8]), "");
    }

    #[test]
    fn explicit_library_path_is_the_only_candidate() {
        let candidates = library_candidates(Some(Path::new("/opt/andor/libshamrockcif.so")));
        assert_eq!(candidates, vec![OsString::from("/opt/andor/libshamrockcif.so")]);
    }

    #[test]
    fn bare_name_is_the_last_resort() {
        let candidates = library_candidates(None);
        assert_eq!(candidates.last(), Some(&OsString::from(LIBRARY_NAME)));
    }

    #[test]
    fn missing_library_reports_its_name() {
        let err = match ShamrockLibrary::load(Some(Path::new("/nonexistent/libshamrockcif.so"))) {
            Err(err) => err,
            Ok(_) => panic!("library should not load"),
        };
        assert!(err.to_string().contains("/nonexistent/libshamrockcif.so"));
    }
}
