//! Step-synchronized streaming backend for Measurement Computing output
//! boards.
//!
//! This crate takes a validated [`StepTable`](mcseq_backend::StepTable) from
//! `mcseq_backend` and emits it on real or faked hardware, synchronized to
//! the board's free-running step counter.
//!
//! ## Key Components:
//!
//! - **[`port`]:** the [`BoardPort`] hardware-abstraction trait, its fault
//!   type, and the per-board configuration struct.
//!
//! - **[`scheduler`]:** the polling state machine that arms analog blocks
//!   one step ahead, commits digital words at counter boundaries, and
//!   reports skips, faults and cancellation.
//!
//! - **[`manual`]:** static channel programming and abort rollback.
//!
//! - **[`worker`] and [`worker_cmd_chan`]:** the per-board worker thread
//!   and the command channel that drives it.
//!
//! - **[`experiment`]:** the top-level handle mapping board names to
//!   workers.
//!
//! - **`mcculw` (cargo feature `mcculw`):** the Universal Library FFI
//!   wrapper implementing [`BoardPort`] against the vendor driver.

pub mod experiment;
pub mod manual;
#[cfg(feature = "mcculw")]
pub mod mcculw;
pub mod port;
pub mod scheduler;
pub mod utils;
pub mod worker;
pub mod worker_cmd_chan;

pub use crate::experiment::Experiment;
pub use crate::manual::{Snapshot, StaticOrder, StaticProgrammer};
#[cfg(feature = "mcculw")]
pub use crate::mcculw::UlBoard;
pub use crate::port::{
    BoardConfig, BoardPort, CounterId, PortDirection, PortError, PortId,
};
pub use crate::scheduler::{
    CancelToken, RunOutcome, StepScheduler, StreamConfig, StreamEvent,
};
pub use crate::worker::BoardWorker;
pub use crate::worker_cmd_chan::{CmdChan, CmdRecvr, WorkerCmd};
