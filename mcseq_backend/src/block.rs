//! Per-step output payloads: analog sample blocks and bit-packed digital words.
//!
//! Both types are immutable once constructed. Validation against a specific
//! board is deferred to [`StepTable::build`]: a block or word only carries its
//! own shape, the builder decides whether that shape fits the board.
//!
//! [`StepTable::build`]: crate::table::StepTable::build

use ndarray::Array1;
use std::fmt;

use crate::units::UnitScale;

/// Output capability of one board: how many analog channels and digital lines
/// a step must populate.
///
/// The streaming backend receives these numbers through its board
/// configuration; the table builder uses them to reject sequences authored
/// for a different board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoardCapability {
    pub n_analog_chans: usize,
    pub n_digital_lines: usize,
}

impl BoardCapability {
    pub fn new(n_analog_chans: usize, n_digital_lines: usize) -> Self {
        assert!(
            n_analog_chans > 0 && n_digital_lines > 0 && n_digital_lines <= 16,
            "Unsupported board capability: {} analog channels, {} digital lines",
            n_analog_chans,
            n_digital_lines
        );
        Self {
            n_analog_chans,
            n_digital_lines,
        }
    }

    /// The MC USB-3114: 16 analog output channels, 8 auxiliary digital lines.
    pub fn usb_3114() -> Self {
        Self::new(16, 8)
    }
}

/// One per-channel vector of raw DAC counts, committed to all analog outputs
/// simultaneously when the step is armed.
#[derive(Clone, PartialEq, Debug)]
pub struct AnalogBlock {
    samples: Array1<u16>,
}

impl AnalogBlock {
    /// Wraps already-scaled raw counts. One sample per analog channel.
    pub fn new(samples: Array1<u16>) -> Self {
        assert!(
            !samples.is_empty(),
            "Analog block must contain at least one channel sample"
        );
        Self { samples }
    }

    /// Convenience constructor for engineering-unit callers: scales each
    /// voltage through `scale` before freezing the block.
    pub fn from_volts(volts: &[f64], scale: &UnitScale) -> Self {
        Self::new(volts.iter().map(|&v| scale.to_raw(v)).collect())
    }

    /// Every channel held at the same raw value.
    pub fn uniform(value: u16, n_chans: usize) -> Self {
        Self::new(Array1::from_elem(n_chans, value))
    }

    pub fn n_chans(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &Array1<u16> {
        &self.samples
    }
}

/// Bit-packed levels for every digital output line of a step.
///
/// Line `i` maps to bit `i`. The line count is carried alongside the bits so
/// the table builder can check it against [`BoardCapability::n_digital_lines`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DigitalWord {
    bits: u16,
    n_lines: usize,
}

impl DigitalWord {
    pub fn new(bits: u16, n_lines: usize) -> Self {
        assert!(
            n_lines > 0 && n_lines <= 16,
            "Digital word must cover between 1 and 16 lines, got {}",
            n_lines
        );
        assert!(
            n_lines == 16 || (bits as u32) < (1u32 << n_lines),
            "Digital word {:#b} does not fit in {} lines",
            bits,
            n_lines
        );
        Self { bits, n_lines }
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn n_lines(&self) -> usize {
        self.n_lines
    }

    pub fn line(&self, idx: usize) -> bool {
        assert!(idx < self.n_lines, "Line {} out of range", idx);
        self.bits & (1 << idx) != 0
    }
}

impl fmt::Display for DigitalWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.n_lines)
    }
}
