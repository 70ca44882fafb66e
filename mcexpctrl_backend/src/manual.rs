//! Static channel programming: driving every output to a known value
//! outside of a scheduled run.
//!
//! Used at worker startup, after manual-mode edits, and as the rollback path
//! when a run is aborted. There is no step-level undo; restoring the
//! pre-run [`Snapshot`] through [`StaticProgrammer::apply_static`] is the
//! only rollback mechanism.

use crate::port::{BoardConfig, BoardPort, PortError};
use mcseq_backend::{AnalogBlock, DigitalWord};

/// Relative ordering of the digital-word write and the per-channel analog
/// writes inside one static programming pass.
///
/// The order is fixed per programmer and applied consistently. The default
/// is digital-first: on boards where digital port reconfiguration gates the
/// clocking used by analog commits, the digital write must have fully
/// settled before analog channels change.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StaticOrder {
    DigitalFirst,
    AnalogFirst,
}

/// Full channel state captured before a run, restored on abort.
#[derive(Clone, PartialEq, Debug)]
pub struct Snapshot {
    pub analog: AnalogBlock,
    pub digital: DigitalWord,
}

/// One-shot setter of all channels on a board.
pub struct StaticProgrammer {
    board: BoardConfig,
    order: StaticOrder,
}

impl StaticProgrammer {
    pub fn new(board: BoardConfig) -> Self {
        Self {
            board,
            order: StaticOrder::DigitalFirst,
        }
    }

    pub fn with_order(mut self, order: StaticOrder) -> Self {
        self.order = order;
        self
    }

    /// Writes the full digital word and every analog channel
    /// unconditionally, in the configured order.
    ///
    /// Returns only once all writes have round-tripped through the port, so
    /// no partial-write state is observable to the caller. Idempotent:
    /// applying the same values twice leaves the same final channel state.
    pub fn apply_static(
        &self,
        port: &mut dyn BoardPort,
        analog: &AnalogBlock,
        digital: DigitalWord,
    ) -> Result<(), PortError> {
        match self.order {
            StaticOrder::DigitalFirst => {
                self.write_digital(port, digital)?;
                self.write_analog(port, analog)?;
            }
            StaticOrder::AnalogFirst => {
                self.write_analog(port, analog)?;
                self.write_digital(port, digital)?;
            }
        }
        log::debug!("Static channel state applied: digital {}", digital);
        Ok(())
    }

    /// Rollback after an aborted or faulted run.
    pub fn restore(&self, port: &mut dyn BoardPort, snapshot: &Snapshot) -> Result<(), PortError> {
        log::info!("Restoring pre-run channel snapshot");
        self.apply_static(port, &snapshot.analog, snapshot.digital)
    }

    fn write_digital(&self, port: &mut dyn BoardPort, digital: DigitalWord) -> Result<(), PortError> {
        port.write_digital(self.board.digital_port, digital)
    }

    fn write_analog(&self, port: &mut dyn BoardPort, analog: &AnalogBlock) -> Result<(), PortError> {
        for (chan, &raw) in analog.samples().iter().enumerate() {
            port.write_analog_channel(self.board.low_chan + chan as u32, raw)?;
        }
        Ok(())
    }
}
