//! Top-level experiment handle: one worker thread per registered board.
//!
//! The `Experiment` owns an insertion-ordered map of named boards. Each
//! board gets a dedicated worker thread driving its port, so a caller's
//! control plane never blocks on the busy-poll loop. Commands travel over a
//! [`CmdChan`], the terminal [`RunOutcome`] comes back over a crossbeam
//! channel, and commit/skip observability is exposed as a per-board
//! [`StreamEvent`] receiver.
//!
//! One sequence at a time per board: [`Experiment::start_sequence`] resets
//! the board's cancellation token, so overlapping runs on the same board are
//! not supported.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver};
use indexmap::IndexMap;

use crate::manual::Snapshot;
use crate::port::{BoardConfig, BoardPort, PortError};
use crate::scheduler::{CancelToken, RunOutcome, StreamConfig, StreamEvent};
use crate::worker::BoardWorker;
use crate::worker_cmd_chan::{CmdChan, WorkerCmd};
use mcseq_backend::StepTable;

struct BoardHandle {
    cmd: CmdChan,
    cancel: CancelToken,
    outcome_rx: Receiver<RunOutcome>,
    events_rx: Receiver<StreamEvent>,
    thread: Option<JoinHandle<()>>,
}

pub struct Experiment {
    boards: IndexMap<String, BoardHandle>,
}

impl Experiment {
    pub fn new() -> Self {
        Self {
            boards: IndexMap::new(),
        }
    }

    /// Registers a board and spawns its worker thread.
    ///
    /// Board setup (`init`: port directions, default channel values) runs on
    /// the calling thread so configuration faults surface here instead of
    /// inside the worker.
    pub fn add_board<P: BoardPort + 'static>(
        &mut self,
        name: &str,
        port: P,
        board: BoardConfig,
        cfg: StreamConfig,
        defaults: Snapshot,
    ) -> Result<(), PortError> {
        assert!(
            !self.boards.contains_key(name),
            "There is already a board with name {}",
            name
        );
        let cmd = CmdChan::new();
        let cancel = CancelToken::new();
        let (outcome_tx, outcome_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();

        let mut worker = BoardWorker::new(
            name,
            port,
            board,
            cfg,
            defaults,
            cancel.clone(),
            events_tx,
        );
        worker.init()?;

        let recvr = cmd.new_recvr();
        let thread = std::thread::Builder::new()
            .name(format!("board-worker-{}", name))
            .spawn(move || worker.main_loop(recvr, outcome_tx))
            .expect("Failed to spawn board worker thread");

        self.boards.insert(
            name.to_string(),
            BoardHandle {
                cmd,
                cancel,
                outcome_rx,
                events_rx,
                thread: Some(thread),
            },
        );
        Ok(())
    }

    /// Hands a table to the named board's worker without blocking.
    pub fn start_sequence(&self, name: &str, table: StepTable) {
        let handle = self.handle(name);
        handle.cancel.reset();
        handle.cmd.send(WorkerCmd::Run(Arc::new(table)));
    }

    /// Blocks until the named board's current run terminates.
    pub fn wait_sequence(&self, name: &str) -> RunOutcome {
        self.handle(name)
            .outcome_rx
            .recv()
            .expect("Board worker thread dropped its outcome channel")
    }

    /// Runs a table to its terminal outcome. Convenience over
    /// `start_sequence` + `wait_sequence` for callers that do not need to
    /// abort from the same thread.
    pub fn run_sequence(&self, name: &str, table: StepTable) -> RunOutcome {
        self.start_sequence(name, table);
        self.wait_sequence(name)
    }

    /// Trips the named board's cancellation token. Takes effect at the next
    /// poll boundary of the running scheduler; a completed commit is never
    /// interrupted.
    pub fn abort(&self, name: &str) {
        self.handle(name).cancel.cancel();
    }

    /// Per-board commit/skip event stream for the current (and any past) run.
    pub fn events(&self, name: &str) -> &Receiver<StreamEvent> {
        &self.handle(name).events_rx
    }

    /// Closes all worker threads and joins them.
    pub fn close(&mut self) {
        for (name, handle) in self.boards.iter_mut() {
            if let Some(thread) = handle.thread.take() {
                handle.cmd.send(WorkerCmd::Close);
                if thread.join().is_err() {
                    log::error!("Board worker {} panicked", name);
                }
            }
        }
    }

    fn handle(&self, name: &str) -> &BoardHandle {
        match self.boards.get(name) {
            Some(handle) => handle,
            None => panic!("There is no board with name {}", name),
        }
    }
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Experiment {
    fn drop(&mut self) {
        self.close();
    }
}
