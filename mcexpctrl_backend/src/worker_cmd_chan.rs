use std::sync::Arc;
use parking_lot::{Condvar, Mutex};

use mcseq_backend::StepTable;

/// Commands accepted by a board worker thread.
///
/// Cancellation of an in-flight run is deliberately not a command: the
/// worker blocks inside the scheduler loop while running and only returns to
/// the command channel between runs, so early termination goes through the
/// run's `CancelToken` instead.
#[derive(Clone)]
pub enum WorkerCmd {
    /// Snapshot current channel state, run the table, restore on abort.
    Run(Arc<StepTable>),
    Close,
}

// A single-slot channel: each send overwrites the slot and bumps a message
// number, each receiver tracks the last number it saw. Sending a second
// command before the worker consumed the first makes the numbers diverge and
// fails the receiver, which keeps callers honest about one-command-at-a-time
// worker driving.
pub struct CmdChan {
    cmd: Arc<Mutex<(usize, WorkerCmd)>>,  // (msg_num, latest command)
    condvar: Arc<Condvar>,
}
impl CmdChan {
    pub fn new() -> Self {
        Self {
            cmd: Arc::new(Mutex::new((0, WorkerCmd::Close))),
            condvar: Arc::new(Condvar::new()),
        }
    }
    pub fn new_recvr(&self) -> CmdRecvr {
        // A receiver only reacts to commands posted after its creation, so it
        // starts its view at whatever message number the channel is at now.
        let (msg_num, _cmd_val) = &*self.cmd.lock();
        let last_posted_msg_num = *msg_num;

        CmdRecvr {
            cmd: self.cmd.clone(),
            condvar: self.condvar.clone(),
            viewed_msg_num: last_posted_msg_num,
        }
    }
    pub fn send(&self, cmd: WorkerCmd) {
        let mut mutex_guard = self.cmd.lock();
        let (msg_num, cmd_val) = &mut *mutex_guard;
        *cmd_val = cmd;
        *msg_num += 1;
        self.condvar.notify_all();
    }
}

impl Default for CmdChan {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CmdRecvr {
    cmd: Arc<Mutex<(usize, WorkerCmd)>>,
    condvar: Arc<Condvar>,
    viewed_msg_num: usize,
}
impl CmdRecvr {
    pub fn recv(&mut self) -> Result<WorkerCmd, String> {
        let mut mutex_guard = self.cmd.lock();

        let (msg_num, _cmd_val) = &*mutex_guard;
        if *msg_num == self.viewed_msg_num {
            // Nothing new yet, block until the next send.
            self.condvar.wait(&mut mutex_guard);
        } else if *msg_num == self.viewed_msg_num + 1 {
            // Exactly one command pending, take it without waiting.
        } else {
            // A command was overwritten before this receiver saw it.
            return Err(format!("Viewed msg count {} diverged from the published command number {}", self.viewed_msg_num, *msg_num))
        };

        let (_msg_num, cmd_val) = &*mutex_guard;
        self.viewed_msg_num += 1;
        Ok(cmd_val.clone())
    }
}
