//! Engineering-units conversion between volts and raw DAC counts.
//!
//! The streaming core only ever sees raw counts; this module is the
//! volts-to-raw collaborator that callers use while building blocks. It
//! replaces the driver-side `cbFromEngUnits` round trip with an explicit
//! linear scale so conversions are testable without a board.

/// Linear unipolar scale mapping `[0, full_scale_volts]` onto the full
/// `u16` code range.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct UnitScale {
    full_scale_volts: f64,
}

impl UnitScale {
    pub fn new(full_scale_volts: f64) -> Self {
        assert!(
            full_scale_volts > 0.,
            "Full-scale voltage must be positive, got {}",
            full_scale_volts
        );
        Self { full_scale_volts }
    }

    /// The 0-10V unipolar output range of the USB-3114.
    pub fn uni_10_volts() -> Self {
        Self::new(10.)
    }

    /// Converts volts to the nearest raw code, clamping to the range ends.
    pub fn to_raw(&self, volts: f64) -> u16 {
        let clamped = volts.clamp(0., self.full_scale_volts);
        (clamped / self.full_scale_volts * u16::MAX as f64).round() as u16
    }

    pub fn to_volts(&self, raw: u16) -> f64 {
        raw as f64 / u16::MAX as f64 * self.full_scale_volts
    }
}
