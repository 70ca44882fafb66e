//! The hardware abstraction port: the narrow seam between the scheduler and
//! a physical output board.
//!
//! [`BoardPort`] wraps the five primitive device operations the streaming
//! core needs. The production implementation ([`UlBoard`]) drives a
//! Measurement Computing board through the Universal Library; tests drive a
//! scripted fake. A port represents exclusive access to one physical board:
//! only one scheduler instance may hold it at a time, which is enforced by
//! ownership (the board worker owns its port for its whole lifetime).
//!
//! [`UlBoard`]: crate::mcculw::UlBoard

use thiserror::Error;

use mcseq_backend::{AnalogBlock, BoardCapability, DigitalWord};

/// A device-level read or write failure reported by the board driver.
///
/// Faults abort the run in progress and are never retried by the core; a
/// board in a faulted state must not be blindly re-driven, so retry policy
/// stays with the caller.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("Board driver error {code} during {context}: {msg}")]
pub struct PortError {
    pub code: i32,
    pub context: &'static str,
    pub msg: String,
}

impl PortError {
    pub fn new(code: i32, context: &'static str, msg: impl Into<String>) -> Self {
        Self {
            code,
            context,
            msg: msg.into(),
        }
    }
}

/// Identifies one digital port on a board (e.g. the USB-3114 auxiliary port).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PortId(pub u32);

/// Identifies one hardware counter on a board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CounterId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PortDirection {
    Input,
    Output,
}

/// Per-board constants that the original worker kept as module globals,
/// made explicit so several boards can coexist in one process.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoardConfig {
    /// First analog channel covered by block arming.
    pub low_chan: u32,
    /// Last analog channel covered by block arming (inclusive).
    pub high_chan: u32,
    /// Digital port carrying the per-step words.
    pub digital_port: PortId,
    /// Free-running counter the scheduler polls for step boundaries.
    pub step_counter: CounterId,
    pub capability: BoardCapability,
}

impl BoardConfig {
    /// The USB-3114 wiring used in the lab: analog channels 0-15, step words
    /// on the auxiliary digital port, step clock on counter 1.
    pub fn usb_3114() -> Self {
        Self {
            low_chan: 0,
            high_chan: 15,
            digital_port: PortId(1),
            step_counter: CounterId(1),
            capability: BoardCapability::usb_3114(),
        }
    }
}

/// The five primitive operations the streaming core performs on a board.
///
/// Methods take `&mut self` to encode the single-writer-per-board
/// discipline; no locking is needed beyond it.
pub trait BoardPort: Send {
    /// One-time setup: sets a digital port's direction.
    fn configure_port_direction(
        &mut self,
        port: PortId,
        direction: PortDirection,
    ) -> Result<(), PortError>;

    /// Pre-loads an analog block covering channels `low_chan..=high_chan` so
    /// it takes effect at the next step boundary.
    fn arm_analog_block(
        &mut self,
        low_chan: u32,
        high_chan: u32,
        block: &AnalogBlock,
    ) -> Result<(), PortError>;

    /// Reads the free-running hardware counter.
    fn read_counter(&mut self, counter: CounterId) -> Result<u32, PortError>;

    /// Commits a digital word to live outputs.
    fn write_digital(&mut self, port: PortId, word: DigitalWord) -> Result<(), PortError>;

    /// Writes a single analog channel immediately (manual mode and static
    /// programming only; scheduled runs go through block arming).
    fn write_analog_channel(&mut self, chan: u32, raw: u16) -> Result<(), PortError>;
}
