use crate::Result;
use log::{info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Intensities paired with their calibrated wavelengths (nm).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    pub wavelengths: Vec<f64>,
    pub intensities: Vec<f64>,
}

#[derive(Serialize)]
struct Row {
    #[serde(rename = "Wavelength(nm)")]
    wavelength: f64,
    #[serde(rename = "Intensity")]
    intensity: f64,
}

impl Spectrum {
    /// Pair both series, cutting the longer one down to the shorter.
    pub fn from_parts(mut wavelengths: Vec<f64>, mut intensities: Vec<f64>) -> Self {
        if wavelengths.len() != intensities.len() {
            let n = wavelengths.len().min(intensities.len());
            warn!(
                "Calibration has {} points but spectrum has {}, trimming to {n}",
                wavelengths.len(),
                intensities.len()
            );
            wavelengths.truncate(n);
            intensities.truncate(n);
        }
        Self {
            wavelengths,
            intensities,
        }
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// Keep samples with `start <= w <= end`; a missing bound is open.
    pub fn window(self, start: Option<f64>, end: Option<f64>) -> Self {
        if start.is_none() && end.is_none() {
            return self;
        }
        let lo = start.unwrap_or(f64::NEG_INFINITY);
        let hi = end.unwrap_or(f64::INFINITY);
        let (wavelengths, intensities) = self
            .wavelengths
            .into_iter()
            .zip(self.intensities)
            .filter(|(w, _)| lo <= *w && *w <= hi)
            .unzip();
        Self {
            wavelengths,
            intensities,
        }
    }

    /// Linear resampling onto `points` evenly spaced wavelengths between the
    /// first and last sample. Descending data is flipped first.
    pub fn resample(mut self, points: usize) -> Self {
        if points == 0 || self.len() < 2 {
            return self;
        }
        let (mut first, mut last) = (self.wavelengths[0], self.wavelengths[self.len() - 1]);
        if first > last {
            std::mem::swap(&mut first, &mut last);
            self.wavelengths.reverse();
            self.intensities.reverse();
        }
        let grid = linspace(first, last, points);
        let intensities = grid
            .iter()
            .map(|&x| interp(x, &self.wavelengths, &self.intensities))
            .collect();
        Self {
            wavelengths: grid,
            intensities,
        }
    }

    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        // header goes out even for an empty spectrum
        if self.is_empty() {
            csv.write_record(["Wavelength(nm)", "Intensity"])?;
        }
        for (&wavelength, &intensity) in self.wavelengths.iter().zip(&self.intensities) {
            csv.serialize(Row {
                wavelength,
                intensity,
            })?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv_to(file)?;
        info!("Wrote {} samples to {}", self.len(), path.display());
        Ok(())
    }
}

/// `num` evenly spaced values over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut out: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            out[num - 1] = stop;
            out
        }
    }
}

/// Piecewise-linear interpolation over increasing `xp`; values outside the
/// range clamp to the end points.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    let j = xp[..n].partition_point(|&v| v <= x);
    if j == 0 {
        return fp[0];
    }
    if j == n {
        return fp[n - 1];
    }
    let i = j - 1;
    let t = (x - xp[i]) / (xp[j] - xp[i]);
    fp[i] + t * (fp[j] - fp[i])
}
