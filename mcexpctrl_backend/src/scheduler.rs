//! The step-synchronized output scheduler.
//!
//! A sequenced run is timed by a free-running hardware counter that advances
//! once per external clock tick. The scheduler busy-polls that counter and
//! keeps two writes in flight per step: the step's analog block is armed
//! ahead of time, and its digital word is committed the moment the counter
//! reaches the step's ordinal. The loop is strictly single-threaded; the
//! only suspension point is a bounded sleep on the idle branch, so nothing
//! can yield control around the counter-equality boundary and add jitter.
//!
//! Ordering guarantee (the core correctness property, preserved even across
//! counter overrun): the digital commit for step N happens strictly after
//! the analog arm for step N and strictly before the analog arm for step
//! N+1.
//!
//! Missed deadlines are reported, not repaired: once the counter has moved
//! past a step, its outputs are unrecoverable and the scheduler resumes at
//! the counter's new value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::port::{BoardConfig, BoardPort, PortError};
use mcseq_backend::StepTable;

/// Cooperative early-termination signal, checked once per poll iteration.
///
/// Cancellation takes effect only between iterations, never by interrupting
/// an in-flight hardware write, so no channel is ever left half-written.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arms the token for the next run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables of the polling loop.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StreamConfig {
    /// Sleep inserted on the idle branch (counter behind the next step).
    pub poll_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Observable stream emitted while a run is in progress, one event per
/// commit or skip as it happens (never batched).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StreamEvent {
    StepCommitted { step: usize },
    /// Steps `from..=to` passed without service because the counter advanced
    /// faster than the loop. Non-fatal; the run continues.
    StepsSkipped { from: usize, to: usize },
}

/// Terminal result of one scheduled run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RunOutcome {
    /// Every step ordinal was consumed (committed or reported skipped).
    Completed,
    /// The cancellation token fired; no hardware writes happened after the
    /// last completed commit.
    Cancelled,
    /// The port faulted while servicing `step`; remaining steps were not
    /// attempted and nothing is retried.
    HardwareFault { step: usize, source: PortError },
}

// Owned exclusively by one running scheduler; reset at the start of each run.
struct SchedulerState {
    current_step: usize,
    last_armed_step: usize,
    counter_snapshot: u32,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            current_step: 0,
            last_armed_step: 0,
            counter_snapshot: 0,
        }
    }
}

/// The polling state machine driving one board through a [`StepTable`].
pub struct StepScheduler {
    board: BoardConfig,
    cfg: StreamConfig,
    events: Option<Sender<StreamEvent>>,
}

impl StepScheduler {
    pub fn new(board: BoardConfig, cfg: StreamConfig) -> Self {
        Self {
            board,
            cfg,
            events: None,
        }
    }

    /// Attaches the side-channel event stream. Send failures (receiver gone)
    /// are ignored; the run itself never depends on an observer.
    pub fn with_events(mut self, events: Sender<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Drives `port` through every step of `table`.
    ///
    /// Preconditions: `table` has at least one step (guaranteed by its
    /// builder) and the port's digital directions and step counter were
    /// already configured by the caller.
    ///
    /// The loop has no timeout of its own; it terminates on table
    /// exhaustion, port fault, or `cancel`.
    pub fn run(
        &self,
        table: &StepTable,
        port: &mut dyn BoardPort,
        cancel: &CancelToken,
    ) -> RunOutcome {
        let mut state = SchedulerState::new();

        // Pre-arm step 0 before the counter can reach it.
        if let Err(source) = self.arm(port, table, 0) {
            return RunOutcome::HardwareFault { step: 0, source };
        }
        state.last_armed_step = 0;
        log::debug!("Run started: {} steps, analog block 0 armed", table.len());

        loop {
            if cancel.is_cancelled() {
                log::info!("Run cancelled before step {}", state.current_step);
                return RunOutcome::Cancelled;
            }

            let count = match port.read_counter(self.board.step_counter) {
                Ok(c) => c,
                Err(source) => {
                    return RunOutcome::HardwareFault {
                        step: state.current_step,
                        source,
                    }
                }
            };
            state.counter_snapshot = count;
            let count = count as usize;

            if count < state.current_step {
                // No step due yet.
                std::thread::sleep(self.cfg.poll_interval);
                continue;
            }

            if count > state.current_step {
                // The hardware outran the loop. Report the missed span once
                // and catch up to the counter; retroactive commits are
                // pointless, those boundaries are gone.
                let last_missed = count.min(table.len()) - 1;
                log::warn!(
                    "Steps {} through {} were skipped, output rate too high",
                    state.current_step,
                    last_missed
                );
                self.emit(StreamEvent::StepsSkipped {
                    from: state.current_step,
                    to: last_missed,
                });
                state.current_step = count;
                if state.current_step >= table.len() {
                    // Counter ran past the end of the table; nothing left to
                    // service.
                    log::debug!(
                        "Run over at counter {}: last armed step {}",
                        state.counter_snapshot,
                        state.last_armed_step
                    );
                    return RunOutcome::Completed;
                }
                // Keep arm-before-commit intact for the step we resume at.
                if let Err(source) = self.arm(port, table, state.current_step) {
                    return RunOutcome::HardwareFault {
                        step: state.current_step,
                        source,
                    };
                }
                state.last_armed_step = state.current_step;
                continue;
            }

            // count == current_step: the step is due.
            let step = table.step(state.current_step);
            if let Err(source) = port.write_digital(self.board.digital_port, step.digital()) {
                return RunOutcome::HardwareFault {
                    step: state.current_step,
                    source,
                };
            }
            log::info!(
                "Committed digital word {} for step {}",
                step.digital(),
                state.current_step
            );
            self.emit(StreamEvent::StepCommitted {
                step: state.current_step,
            });
            state.current_step += 1;
            if state.current_step == table.len() {
                log::debug!(
                    "Run complete at counter {}: last armed step {}",
                    state.counter_snapshot,
                    state.last_armed_step
                );
                return RunOutcome::Completed;
            }
            // Pre-arm the next step while the current one is already live,
            // then re-poll without delay.
            if let Err(source) = self.arm(port, table, state.current_step) {
                return RunOutcome::HardwareFault {
                    step: state.current_step,
                    source,
                };
            }
            state.last_armed_step = state.current_step;
        }
    }

    fn arm(
        &self,
        port: &mut dyn BoardPort,
        table: &StepTable,
        ordinal: usize,
    ) -> Result<(), PortError> {
        port.arm_analog_block(
            self.board.low_chan,
            self.board.high_chan,
            table.step(ordinal).analog(),
        )?;
        log::debug!("Pre-armed analog block for step {}", ordinal);
        Ok(())
    }
}
