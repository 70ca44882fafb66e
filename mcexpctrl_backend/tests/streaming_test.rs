use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::unbounded;
use parking_lot::Mutex;

use mcexpctrl_backend::*;
use mcseq_backend::*;

/// Every hardware operation a run performs, in the order the port saw it.
#[derive(Clone, PartialEq, Eq, Debug)]
enum Op {
    ConfigPort(u32),
    Arm(Vec<u16>),
    Commit(u16),
    WriteChan(u32, u16),
}

type OpsLog = Arc<Mutex<Vec<Op>>>;

/// Scripted board: counter reads come from a canned sequence (repeating the
/// last value once exhausted), writes are recorded, and faults/cancellation
/// can be injected at a chosen digital write.
struct FakeBoard {
    counts: VecDeque<u32>,
    last_count: u32,
    ops: OpsLog,
    digital_writes: usize,
    fail_digital_at: Option<usize>,
    cancel_after_commits: Option<(usize, CancelToken)>,
    // Final channel state, for idempotence checks.
    last_digital: Option<u16>,
    analog_state: BTreeMap<u32, u16>,
}

impl FakeBoard {
    fn new(counts: Vec<u32>) -> (Self, OpsLog) {
        let ops: OpsLog = Arc::new(Mutex::new(Vec::new()));
        let board = Self {
            counts: counts.into(),
            last_count: 0,
            ops: ops.clone(),
            digital_writes: 0,
            fail_digital_at: None,
            cancel_after_commits: None,
            last_digital: None,
            analog_state: BTreeMap::new(),
        };
        (board, ops)
    }
}

impl BoardPort for FakeBoard {
    fn configure_port_direction(
        &mut self,
        port: PortId,
        _direction: PortDirection,
    ) -> Result<(), PortError> {
        self.ops.lock().push(Op::ConfigPort(port.0));
        Ok(())
    }

    fn arm_analog_block(
        &mut self,
        _low_chan: u32,
        _high_chan: u32,
        block: &AnalogBlock,
    ) -> Result<(), PortError> {
        self.ops.lock().push(Op::Arm(block.samples().to_vec()));
        Ok(())
    }

    fn read_counter(&mut self, _counter: CounterId) -> Result<u32, PortError> {
        if let Some(count) = self.counts.pop_front() {
            self.last_count = count;
        }
        Ok(self.last_count)
    }

    fn write_digital(&mut self, _port: PortId, word: DigitalWord) -> Result<(), PortError> {
        let write_idx = self.digital_writes;
        self.digital_writes += 1;
        if self.fail_digital_at == Some(write_idx) {
            return Err(PortError::new(-38, "digital write", "simulated fault"));
        }
        self.ops.lock().push(Op::Commit(word.bits()));
        self.last_digital = Some(word.bits());
        if let Some((after, token)) = &self.cancel_after_commits {
            if self.digital_writes == *after {
                token.cancel();
            }
        }
        Ok(())
    }

    fn write_analog_channel(&mut self, chan: u32, raw: u16) -> Result<(), PortError> {
        self.ops.lock().push(Op::WriteChan(chan, raw));
        self.analog_state.insert(chan, raw);
        Ok(())
    }
}

fn capability() -> BoardCapability {
    BoardCapability::usb_3114()
}

/// Table whose step k has analog samples all equal to k and digital bits k.
fn table(n_steps: usize) -> StepTable {
    let cap = capability();
    let analog = (0..n_steps)
        .map(|k| AnalogBlock::uniform(k as u16, cap.n_analog_chans))
        .collect();
    let digital = (0..n_steps)
        .map(|k| DigitalWord::new(k as u16, cap.n_digital_lines))
        .collect();
    StepTable::build(analog, digital, &cap).unwrap()
}

fn scheduler() -> StepScheduler {
    let cfg = StreamConfig {
        poll_interval: Duration::from_micros(100),
    };
    StepScheduler::new(BoardConfig::usb_3114(), cfg)
}

fn commits(ops: &[Op]) -> Vec<u16> {
    ops.iter()
        .filter_map(|op| match op {
            Op::Commit(bits) => Some(*bits),
            _ => None,
        })
        .collect()
}

fn arms(ops: &[Op]) -> Vec<u16> {
    ops.iter()
        .filter_map(|op| match op {
            Op::Arm(samples) => Some(samples[0]),
            _ => None,
        })
        .collect()
}

#[test]
fn lockstep_counter_commits_every_step_in_order() {
    let (mut board, ops) = FakeBoard::new((0..4).collect());
    let (tx, rx) = unbounded();
    let outcome = scheduler()
        .with_events(tx)
        .run(&table(4), &mut board, &CancelToken::new());

    assert_eq!(outcome, RunOutcome::Completed);
    let ops = ops.lock();
    // Arm for step k strictly precedes commit for step k, which strictly
    // precedes arm for step k+1.
    let expected: Vec<Op> = (0..4)
        .flat_map(|k| {
            vec![
                Op::Arm(vec![k as u16; 16]),
                Op::Commit(k as u16),
            ]
        })
        .collect();
    // Interleaving is Arm(0) Commit(0) Arm(1) Commit(1) ... Commit(3).
    assert_eq!(*ops, expected);

    let events: Vec<StreamEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        (0..4)
            .map(|step| StreamEvent::StepCommitted { step })
            .collect::<Vec<_>>()
    );
}

#[test]
fn delayed_counter_scenario_completes_with_two_extra_arms() {
    // Each counter value is read twice before the delayed increment:
    // the odd reads hit the idle branch, the even reads commit.
    let cap = capability();
    let analog = vec![
        AnalogBlock::uniform(0, cap.n_analog_chans),
        AnalogBlock::uniform(60000, cap.n_analog_chans),
        AnalogBlock::uniform(0, cap.n_analog_chans),
    ];
    let digital = vec![
        DigitalWord::new(0b01010101, cap.n_digital_lines),
        DigitalWord::new(0b10101010, cap.n_digital_lines),
        DigitalWord::new(0b01010101, cap.n_digital_lines),
    ];
    let table = StepTable::build(analog, digital, &cap).unwrap();

    let (mut board, ops) = FakeBoard::new(vec![0, 0, 1, 1, 2, 2]);
    let outcome = scheduler().run(&table, &mut board, &CancelToken::new());

    assert_eq!(outcome, RunOutcome::Completed);
    let ops = ops.lock();
    assert_eq!(commits(&ops), vec![0b01010101, 0b10101010, 0b01010101]);
    // Initial pre-arm plus one arm after each non-final commit.
    assert_eq!(arms(&ops), vec![0, 60000, 0]);
}

#[test]
fn counter_jump_reports_skip_once_and_resumes_at_counter() {
    let (mut board, ops) = FakeBoard::new(vec![0, 1, 2, 5, 5]);
    let (tx, rx) = unbounded();
    let outcome = scheduler()
        .with_events(tx)
        .run(&table(6), &mut board, &CancelToken::new());

    assert_eq!(outcome, RunOutcome::Completed);
    let ops = ops.lock();
    // Steps 3 and 4 are gone; the run resumes committing at step 5, with
    // step 5's analog block armed before its digital word.
    assert_eq!(commits(&ops), vec![0, 1, 2, 5]);
    assert_eq!(arms(&ops), vec![0, 1, 2, 3, 5]);

    let events: Vec<StreamEvent> = rx.try_iter().collect();
    let skips: Vec<&StreamEvent> = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::StepsSkipped { .. }))
        .collect();
    assert_eq!(skips, vec![&StreamEvent::StepsSkipped { from: 3, to: 4 }]);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::StepCommitted { step: 5 })
    );
}

#[test]
fn counter_jump_past_table_end_terminates_run() {
    let (mut board, ops) = FakeBoard::new(vec![0, 7]);
    let (tx, rx) = unbounded();
    let outcome = scheduler()
        .with_events(tx)
        .run(&table(3), &mut board, &CancelToken::new());

    assert_eq!(outcome, RunOutcome::Completed);
    let ops = ops.lock();
    assert_eq!(commits(&ops), vec![0]);
    // Step 1 was armed after step 0's commit, but its boundary never got
    // serviced; no writes happen after the overrun is detected.
    assert_eq!(arms(&ops), vec![0, 1]);

    let events: Vec<StreamEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            StreamEvent::StepCommitted { step: 0 },
            StreamEvent::StepsSkipped { from: 1, to: 2 },
        ]
    );
}

#[test]
fn cancellation_takes_effect_at_next_poll_boundary() {
    let cancel = CancelToken::new();
    let (mut board, ops) = FakeBoard::new((0..3).collect());
    board.cancel_after_commits = Some((1, cancel.clone()));

    let outcome = scheduler().run(&table(3), &mut board, &cancel);

    assert_eq!(outcome, RunOutcome::Cancelled);
    let ops = ops.lock();
    // Step 0 committed, step 1 already armed when the token fired; nothing
    // else reaches the hardware.
    assert_eq!(commits(&ops), vec![0]);
    assert_eq!(arms(&ops), vec![0, 1]);
}

#[test]
fn digital_fault_aborts_with_step_ordinal_and_no_later_writes() {
    let (mut board, ops) = FakeBoard::new((0..4).collect());
    board.fail_digital_at = Some(2);

    let outcome = scheduler().run(&table(4), &mut board, &CancelToken::new());

    match outcome {
        RunOutcome::HardwareFault { step, source } => {
            assert_eq!(step, 2);
            assert_eq!(source.code, -38);
        }
        other => panic!("Expected a hardware fault, got {:?}", other),
    }
    let ops = ops.lock();
    assert_eq!(commits(&ops), vec![0, 1]);
    assert_eq!(arms(&ops), vec![0, 1, 2]);
}

#[test]
fn apply_static_is_idempotent_and_writes_digital_first() {
    let cap = capability();
    let programmer = StaticProgrammer::new(BoardConfig::usb_3114());
    let analog = AnalogBlock::uniform(1234, cap.n_analog_chans);
    let digital = DigitalWord::new(0b10101010, cap.n_digital_lines);

    let (mut board, ops) = FakeBoard::new(vec![]);
    programmer.apply_static(&mut board, &analog, digital).unwrap();
    let state_once = (board.last_digital, board.analog_state.clone());
    let writes_once = ops.lock().len();

    programmer.apply_static(&mut board, &analog, digital).unwrap();
    assert_eq!((board.last_digital, board.analog_state.clone()), state_once);

    let ops = ops.lock();
    assert_eq!(ops.len(), writes_once * 2);
    assert_eq!(ops[0], Op::Commit(0b10101010));
    assert!(matches!(ops[1], Op::WriteChan(0, 1234)));
}

fn defaults() -> Snapshot {
    let cap = capability();
    Snapshot {
        analog: AnalogBlock::uniform(0, cap.n_analog_chans),
        digital: DigitalWord::new(0b10101010, cap.n_digital_lines),
    }
}

#[test]
fn worker_restores_snapshot_after_cancelled_run() {
    let cancel = CancelToken::new();
    let (mut board, ops) = FakeBoard::new((0..3).collect());
    // init performs one digital write before the run, so the third write
    // overall is the commit for step 1.
    board.cancel_after_commits = Some((3, cancel.clone()));
    let (events_tx, _events_rx) = unbounded();

    let cfg = StreamConfig {
        poll_interval: Duration::from_micros(100),
    };
    let mut worker = BoardWorker::new(
        "USB-3114",
        board,
        BoardConfig::usb_3114(),
        cfg,
        defaults(),
        cancel.clone(),
        events_tx,
    );
    worker.init().unwrap();

    let outcome = worker.run(&table(3));
    assert_eq!(outcome, RunOutcome::Cancelled);

    let ops = ops.lock();
    // init writes the defaults, the run commits steps 0 and 1, then the
    // rollback drives the board back to the pre-run snapshot.
    assert_eq!(commits(&ops), vec![0b10101010, 0, 1, 0b10101010]);
    assert_eq!(*ops.last().unwrap(), Op::WriteChan(15, 0));
}

#[test]
fn program_manual_edits_become_the_rollback_snapshot() {
    let cap = capability();
    let cancel = CancelToken::new();
    let (board, ops) = FakeBoard::new(vec![]);
    let (events_tx, _events_rx) = unbounded();

    let cfg = StreamConfig {
        poll_interval: Duration::from_micros(100),
    };
    let mut worker = BoardWorker::new(
        "USB-3114",
        board,
        BoardConfig::usb_3114(),
        cfg,
        defaults(),
        cancel.clone(),
        events_tx,
    );
    worker.init().unwrap();

    // Front-panel style edit between runs: these values, not the defaults,
    // are what an aborted run must come back to.
    let manual_analog = AnalogBlock::uniform(777, cap.n_analog_chans);
    let manual_digital = DigitalWord::new(0b00001111, cap.n_digital_lines);
    worker
        .program_manual(manual_analog, manual_digital)
        .unwrap();

    cancel.cancel();
    let outcome = worker.run(&table(3));
    assert_eq!(outcome, RunOutcome::Cancelled);

    let ops = ops.lock();
    // init defaults, the manual edit, then the rollback re-applying the
    // manual values; no step word ever reaches the board.
    assert_eq!(commits(&ops), vec![0b10101010, 0b00001111, 0b00001111]);
    assert_ne!(*commits(&ops).last().unwrap(), defaults().digital.bits());
    assert_eq!(*ops.last().unwrap(), Op::WriteChan(15, 777));
}

#[test]
fn experiment_abort_rolls_back_running_sequence() {
    // The counter sticks at 0, so after step 0 commits the scheduler idles
    // until the abort lands.
    let (board, ops) = FakeBoard::new(vec![0]);
    let cfg = StreamConfig {
        poll_interval: Duration::from_micros(100),
    };

    let mut exp = Experiment::new();
    exp.add_board("USB-3114", board, BoardConfig::usb_3114(), cfg, defaults())
        .unwrap();

    exp.start_sequence("USB-3114", table(2));
    let first = exp
        .events("USB-3114")
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(first, StreamEvent::StepCommitted { step: 0 });

    exp.abort("USB-3114");
    let outcome = exp.wait_sequence("USB-3114");
    assert_eq!(outcome, RunOutcome::Cancelled);
    exp.close();

    let ops = ops.lock();
    // init defaults, the only serviced step, then the pre-run snapshot.
    assert_eq!(commits(&ops), vec![0b10101010, 0, 0b10101010]);
}

#[test]
fn experiment_runs_sequence_and_reapplies_defaults() {
    let (board, ops) = FakeBoard::new((0..3).collect());
    let cfg = StreamConfig {
        poll_interval: Duration::from_micros(100),
    };

    let mut exp = Experiment::new();
    exp.add_board("USB-3114", board, BoardConfig::usb_3114(), cfg, defaults())
        .unwrap();

    let outcome = exp.run_sequence("USB-3114", table(3));
    assert_eq!(outcome, RunOutcome::Completed);

    let events: Vec<StreamEvent> = exp.events("USB-3114").try_iter().collect();
    assert_eq!(
        events,
        (0..3)
            .map(|step| StreamEvent::StepCommitted { step })
            .collect::<Vec<_>>()
    );
    exp.close();

    let ops = ops.lock();
    // init defaults, three step commits, then defaults again after the
    // clean completion.
    assert_eq!(commits(&ops), vec![0b10101010, 0, 1, 2, 0b10101010]);
    assert_eq!(ops[0], Op::ConfigPort(1));
}
