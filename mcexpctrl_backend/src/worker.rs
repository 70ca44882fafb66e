//! The board worker: owns one port and alternates between manual mode and
//! scheduled runs.
//!
//! One worker exists per physical board and holds the port for its whole
//! lifetime, so exclusive board access holds by construction. The worker is
//! driven over a [`CmdChan`](crate::worker_cmd_chan::CmdChan) from its own
//! thread (spawned by [`Experiment`](crate::experiment::Experiment)), which
//! keeps the busy-poll loop off the caller's control plane.
//!
//! Lifecycle, mirroring manual/buffered device operation:
//! - `init`: configure the digital port direction and drive all channels to
//!   their defaults;
//! - `program_manual`: apply operator-edited channel values between runs;
//! - `run`: snapshot current values, hand the table to the scheduler, and on
//!   anything but clean completion roll the snapshot back.

use crossbeam::channel::Sender;

use crate::manual::{Snapshot, StaticProgrammer};
use crate::port::{BoardConfig, BoardPort, PortDirection, PortError};
use crate::scheduler::{CancelToken, RunOutcome, StepScheduler, StreamConfig, StreamEvent};
use crate::utils::TickTimer;
use crate::worker_cmd_chan::{CmdRecvr, WorkerCmd};
use mcseq_backend::{AnalogBlock, DigitalWord, StepTable};

pub struct BoardWorker<P: BoardPort> {
    name: String,
    port: P,
    board: BoardConfig,
    scheduler: StepScheduler,
    programmer: StaticProgrammer,
    cancel: CancelToken,
    defaults: Snapshot,
    // Last values applied in manual mode; captured as the rollback snapshot
    // when a run starts.
    manual: Snapshot,
}

impl<P: BoardPort> BoardWorker<P> {
    pub fn new(
        name: &str,
        port: P,
        board: BoardConfig,
        cfg: StreamConfig,
        defaults: Snapshot,
        cancel: CancelToken,
        events: Sender<StreamEvent>,
    ) -> Self {
        Self {
            name: name.to_string(),
            port,
            board,
            scheduler: StepScheduler::new(board, cfg).with_events(events),
            programmer: StaticProgrammer::new(board),
            cancel,
            manual: defaults.clone(),
            defaults,
        }
    }

    /// One-time board setup: digital port to output direction, all channels
    /// to default values.
    pub fn init(&mut self) -> Result<(), PortError> {
        self.port
            .configure_port_direction(self.board.digital_port, PortDirection::Output)?;
        self.programmer
            .apply_static(&mut self.port, &self.defaults.analog, self.defaults.digital)?;
        log::info!("Board worker {} initialized", self.name);
        Ok(())
    }

    /// Applies operator-edited channel values while no run is in progress.
    pub fn program_manual(
        &mut self,
        analog: AnalogBlock,
        digital: DigitalWord,
    ) -> Result<(), PortError> {
        self.programmer
            .apply_static(&mut self.port, &analog, digital)?;
        self.manual = Snapshot { analog, digital };
        Ok(())
    }

    /// Runs one step table to completion, cancellation, or fault.
    ///
    /// The pre-run channel state is captured first; on a cancelled or
    /// faulted run the board is driven back to it. A clean completion
    /// returns the board to its static defaults instead, ready for the next
    /// manual edit.
    pub fn run(&mut self, table: &StepTable) -> RunOutcome {
        let snapshot = self.manual.clone();
        let mut timer = TickTimer::new();
        let outcome = self.scheduler.run(table, &mut self.port, &self.cancel);
        timer.tick_log(&format!("{} sequence run", self.name));
        if let RunOutcome::HardwareFault { step, source } = &outcome {
            log::error!("{}: hardware fault at step {}: {}", self.name, step, source);
        }

        let restore = match &outcome {
            RunOutcome::Completed => self
                .programmer
                .apply_static(&mut self.port, &self.defaults.analog, self.defaults.digital),
            RunOutcome::Cancelled | RunOutcome::HardwareFault { .. } => {
                self.programmer.restore(&mut self.port, &snapshot)
            }
        };
        if let Err(err) = restore {
            // The run outcome is the primary result; a failed rollback on an
            // already-faulted board only gets reported.
            log::error!("{}: post-run channel restore failed: {}", self.name, err);
        }
        outcome
    }

    /// Worker thread body: services commands until told to close.
    pub fn main_loop(&mut self, mut cmd: CmdRecvr, outcome_tx: Sender<RunOutcome>) {
        loop {
            match cmd.recv() {
                Ok(WorkerCmd::Run(table)) => {
                    let outcome = self.run(&table);
                    let _ = outcome_tx.send(outcome);
                }
                Ok(WorkerCmd::Close) => break,
                Err(msg) => {
                    log::error!("{}: command channel failed: {}", self.name, msg);
                    break;
                }
            }
        }
        log::info!("Board worker {} closed", self.name);
    }
}
