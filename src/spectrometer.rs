use crate::shamrock_lib::{c_buf_to_string, check, ShamrockSdk};
use crate::{Error, Result};
use log::{info, warn};

const SERIAL_LEN: usize = 64;

/// One spectrograph session: initialized on open, closed on `close` or drop.
pub struct Spectrometer<S: ShamrockSdk> {
    sdk: S,
    device: i32,
    closed: bool,
}

impl<S: ShamrockSdk> Spectrometer<S> {
    pub fn open(sdk: S, device: i32) -> Result<Self> {
        check(&sdk, sdk.initialize(c""), "ShamrockInitialize")?;
        info!("Spectrograph library initialized (device {device})");
        Ok(Self {
            sdk,
            device,
            closed: false,
        })
    }

    pub fn device(&self) -> i32 {
        self.device
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        check(&self.sdk, self.sdk.close(), "ShamrockClose")?;
        info!("Spectrograph closed");
        Ok(())
    }

    pub fn device_count(&self) -> Result<i32> {
        let mut n = 0;
        check(&self.sdk, self.sdk.number_devices(&mut n), "ShamrockGetNumberDevices")?;
        Ok(n)
    }

    /// Serial of `device`, or of the session's own device when `None`.
    pub fn serial(&self, device: Option<i32>) -> Result<String> {
        let device = device.unwrap_or(self.device);
        let mut buf = vec![0u8; SERIAL_LEN];
        check(
            &self.sdk,
            self.sdk.serial_number(device, &mut buf),
            "ShamrockGetSerialNumber",
        )?;
        Ok(c_buf_to_string(&buf).trim().to_string())
    }

    pub fn set_grating(&self, grating: i32) -> Result<()> {
        check(
            &self.sdk,
            self.sdk.set_grating(self.device, grating),
            "ShamrockSetGrating",
        )
    }

    pub fn grating(&self) -> Result<i32> {
        let mut g = 0;
        check(&self.sdk, self.sdk.grating(self.device, &mut g), "ShamrockGetGrating")?;
        Ok(g)
    }

    /// Central wavelength in nm.
    pub fn set_wavelength(&self, nm: f64) -> Result<()> {
        check(
            &self.sdk,
            self.sdk.set_wavelength(self.device, nm),
            "ShamrockSetWavelength",
        )
    }

    pub fn wavelength(&self) -> Result<f64> {
        let mut nm = 0.0;
        check(
            &self.sdk,
            self.sdk.wavelength(self.device, &mut nm),
            "ShamrockGetWavelength",
        )?;
        Ok(nm)
    }

    pub fn pixel_count(&self) -> Result<usize> {
        let mut n = 0;
        check(
            &self.sdk,
            self.sdk.number_pixels(self.device, &mut n),
            "ShamrockGetNumberPixels",
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// `(min, max)` in nm.
    pub fn wavelength_limits(&self) -> Result<(f64, f64)> {
        let (mut lo, mut hi) = (0.0, 0.0);
        check(
            &self.sdk,
            self.sdk.wavelength_limits(self.device, &mut lo, &mut hi),
            "ShamrockGetWavelengthLimits",
        )?;
        Ok((lo, hi))
    }

    /// Wavelength of every pixel, in nm.
    pub fn calibration(&self) -> Result<Vec<f64>> {
        let mut values = vec![0.0; self.pixel_count()?];
        check(
            &self.sdk,
            self.sdk.calibration(self.device, &mut values),
            "ShamrockGetCalibration",
        )?;
        Ok(values)
    }

    /// Intensity per pixel. Only some library builds can do this.
    pub fn acquire(&self) -> Result<Vec<f64>> {
        let mut values = vec![0.0; self.pixel_count()?];
        let code = self
            .sdk
            .acquire(self.device, &mut values)
            .ok_or(Error::AcquireUnsupported)?;
        check(&self.sdk, code, "ShamrockAcquire")?;
        Ok(values)
    }
}

impl<S: ShamrockSdk> Drop for Spectrometer<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = check(&self.sdk, self.sdk.close(), "ShamrockClose") {
            warn!("Closing spectrograph on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shamrock_lib::SHAMROCK_SUCCESS;
    use std::cell::{Cell, RefCell};
    use std::ffi::CStr;
    use std::rc::Rc;

    /// Stand-in for the vendor library: a 5-pixel detector on a 500 nm
    /// center with 1 nm spacing.
    #[derive(Clone)]
    struct FakeSdk {
        calls: Rc<RefCell<Vec<String>>>,
        grating: Rc<Cell<i32>>,
        center: Rc<Cell<f64>>,
        has_acquire: bool,
        fail_close: bool,
        initialized: Rc<Cell<bool>>,
    }

    impl Default for FakeSdk {
        fn default() -> Self {
            Self {
                calls: Rc::default(),
                grating: Rc::new(Cell::new(1)),
                center: Rc::new(Cell::new(500.0)),
                has_acquire: true,
                fail_close: false,
                initialized: Rc::default(),
            }
        }
    }

    const NOT_INITIALIZED: i32 = 20275;
    const P1_INVALID: i32 = 20266;
    const PIXELS: i32 = 5;

    impl FakeSdk {
        fn log(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_string());
        }

        fn ready(&self, device: i32) -> i32 {
            if !self.initialized.get() {
                NOT_INITIALIZED
            } else if device != 0 {
                P1_INVALID
            } else {
                SHAMROCK_SUCCESS
            }
        }
    }

    impl ShamrockSdk for FakeSdk {
        fn initialize(&self, _: &CStr) -> i32 {
            self.log("initialize");
            self.initialized.set(true);
            SHAMROCK_SUCCESS
        }

        fn close(&self) -> i32 {
            self.log("close");
            self.initialized.set(false);
            if self.fail_close {
                NOT_INITIALIZED
            } else {
                SHAMROCK_SUCCESS
            }
        }

        fn number_devices(&self, count: &mut i32) -> i32 {
            *count = 1;
            SHAMROCK_SUCCESS
        }

        fn serial_number(&self, device: i32, buf: &mut [u8]) -> i32 {
            let code = self.ready(device);
            if code == SHAMROCK_SUCCESS {
                let serial = b"SR-1234 \0";
                buf[..serial.len()].copy_from_slice(serial);
            }
            code
        }

        fn return_description(&self, code: i32, buf: &mut [u8]) -> i32 {
            let text: &[u8] = match code {
                NOT_INITIALIZED => b"SHAMROCK_NOT_INITIALIZED\0",
                P1_INVALID => b"SHAMROCK_P1INVALID\0",
                _ => return P1_INVALID,
            };
            buf[..text.len()].copy_from_slice(text);
            SHAMROCK_SUCCESS
        }

        fn set_grating(&self, device: i32, grating: i32) -> i32 {
            self.log("set_grating");
            let code = self.ready(device);
            if code != SHAMROCK_SUCCESS {
                return code;
            }
            if !(1..=3).contains(&grating) {
                return 20267;
            }
            self.grating.set(grating);
            SHAMROCK_SUCCESS
        }

        fn grating(&self, device: i32, grating: &mut i32) -> i32 {
            *grating = self.grating.get();
            self.ready(device)
        }

        fn set_wavelength(&self, device: i32, nm: f64) -> i32 {
            self.center.set(nm);
            self.ready(device)
        }

        fn wavelength(&self, device: i32, nm: &mut f64) -> i32 {
            *nm = self.center.get();
            self.ready(device)
        }

        fn number_pixels(&self, device: i32, pixels: &mut i32) -> i32 {
            *pixels = PIXELS;
            self.ready(device)
        }

        fn calibration(&self, device: i32, values: &mut [f64]) -> i32 {
            let start = self.center.get() - 2.0;
            for (i, v) in values.iter_mut().enumerate() {
                *v = start + i as f64;
            }
            self.ready(device)
        }

        fn wavelength_limits(&self, device: i32, min: &mut f64, max: &mut f64) -> i32 {
            *min = 0.0;
            *max = 1500.0;
            self.ready(device)
        }

        fn acquire(&self, device: i32, values: &mut [f64]) -> Option<i32> {
            if !self.has_acquire {
                return None;
            }
            for (i, v) in values.iter_mut().enumerate() {
                *v = 10.0 * (i + 1) as f64;
            }
            Some(self.ready(device))
        }
    }

    #[test]
    fn open_initializes_and_close_closes() {
        let sdk = FakeSdk::default();
        let spec = Spectrometer::open(sdk.clone(), 0).unwrap();
        assert!(sdk.initialized.get());
        spec.close().unwrap();
        assert_eq!(*sdk.calls.borrow(), vec!["initialize", "close"]);
    }

    #[test]
    fn drop_closes_once() {
        let sdk = FakeSdk::default();
        {
            let _spec = Spectrometer::open(sdk.clone(), 0).unwrap();
        }
        assert_eq!(*sdk.calls.borrow(), vec!["initialize", "close"]);

        let sdk = FakeSdk::default();
        Spectrometer::open(sdk.clone(), 0).unwrap().close().unwrap();
        assert_eq!(sdk.calls.borrow().len(), 2);
    }

    #[test]
    fn failed_close_is_reported() {
        let sdk = FakeSdk {
            fail_close: true,
            ..Default::default()
        };
        let err = Spectrometer::open(sdk, 0).unwrap().close().unwrap_err();
        assert!(err.to_string().starts_with("ShamrockClose failed (code=20275)"));
    }

    #[test]
    fn device_info() {
        let spec = Spectrometer::open(FakeSdk::default(), 0).unwrap();
        assert_eq!(spec.device(), 0);
        assert_eq!(spec.device_count().unwrap(), 1);
        assert_eq!(spec.serial(None).unwrap(), "SR-1234");
        assert_eq!(spec.pixel_count().unwrap(), 5);
        assert_eq!(spec.wavelength_limits().unwrap(), (0.0, 1500.0));
    }

    #[test]
    fn serial_of_other_device_fails_with_description() {
        let spec = Spectrometer::open(FakeSdk::default(), 0).unwrap();
        let err = spec.serial(Some(3)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ShamrockGetSerialNumber failed (code=20266) SHAMROCK_P1INVALID"
        );
    }

    #[test]
    fn grating_and_wavelength() {
        let spec = Spectrometer::open(FakeSdk::default(), 0).unwrap();
        spec.set_grating(2).unwrap();
        assert_eq!(spec.grating().unwrap(), 2);
        assert!(matches!(
            spec.set_grating(9),
            Err(Error::Sdk { code: 20267, .. })
        ));
        assert_eq!(spec.grating().unwrap(), 2);

        spec.set_wavelength(632.8).unwrap();
        assert_eq!(spec.wavelength().unwrap(), 632.8);
    }

    #[test]
    fn calibration_follows_center() {
        let spec = Spectrometer::open(FakeSdk::default(), 0).unwrap();
        spec.set_wavelength(600.0).unwrap();
        assert_eq!(
            spec.calibration().unwrap(),
            vec![598.0, 599.0, 600.0, 601.0, 602.0]
        );
    }

    #[test]
    fn acquire_fills_every_pixel() {
        let spec = Spectrometer::open(FakeSdk::default(), 0).unwrap();
        assert_eq!(spec.acquire().unwrap(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn acquire_unsupported() {
        let sdk = FakeSdk {
            has_acquire: false,
            ..Default::default()
        };
        let spec = Spectrometer::open(sdk, 0).unwrap();
        assert!(matches!(spec.acquire(), Err(Error::AcquireUnsupported)));
    }

    #[test]
    fn wrong_device_index_propagates() {
        let spec = Spectrometer::open(FakeSdk::default(), 1).unwrap();
        assert!(matches!(
            spec.grating(),
            Err(Error::Sdk { code: 20266, .. })
        ));
    }
}
