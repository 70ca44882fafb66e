//! Hardware-independent sequence data model for step-synchronized
//! Measurement Computing output boards.
//!
//! An experiment run is a list of steps, each pairing an [`AnalogBlock`]
//! (raw DAC counts for every analog channel) with a [`DigitalWord`]
//! (bit-packed levels for every digital line), keyed to a free-running
//! hardware counter by its 0-based ordinal. This crate validates and freezes
//! caller-supplied step data into a [`StepTable`]; the companion
//! `mcexpctrl_backend` crate streams a table to real (or faked) hardware.
//!
//! Nothing here touches a board: construction and validation are fully
//! testable on any host.

pub mod block;
pub mod table;
pub mod units;

pub use block::*;
pub use table::*;
pub use units::*;
