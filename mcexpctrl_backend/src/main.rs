use ndarray::Array1;

use mcexpctrl_backend::*;
use mcseq_backend::*;

use mcexpctrl_backend::port::{CounterId, PortId};

/// Software stand-in for a board: the counter advances once per two reads,
/// all writes just succeed. Lets the demo run end to end without a driver.
struct SimBoard {
    reads: u32,
}

impl BoardPort for SimBoard {
    fn configure_port_direction(
        &mut self,
        _port: PortId,
        _direction: PortDirection,
    ) -> Result<(), PortError> {
        Ok(())
    }

    fn arm_analog_block(
        &mut self,
        low_chan: u32,
        high_chan: u32,
        _block: &AnalogBlock,
    ) -> Result<(), PortError> {
        log::debug!("sim: armed analog channels {}..={}", low_chan, high_chan);
        Ok(())
    }

    fn read_counter(&mut self, _counter: CounterId) -> Result<u32, PortError> {
        let count = self.reads / 2;
        self.reads += 1;
        Ok(count)
    }

    fn write_digital(&mut self, _port: PortId, word: DigitalWord) -> Result<(), PortError> {
        log::debug!("sim: digital word {}", word);
        Ok(())
    }

    fn write_analog_channel(&mut self, _chan: u32, _raw: u16) -> Result<(), PortError> {
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let board = BoardConfig::usb_3114();
    let capability = board.capability;

    // The classic 9-step checkout pattern: all channels swinging between
    // zero and near full scale, digital lines alternating 01010101/10101010.
    let lo = AnalogBlock::new(Array1::from_elem(capability.n_analog_chans, 0));
    let hi = AnalogBlock::new(Array1::from_elem(capability.n_analog_chans, 60000));
    let analog_blocks: Vec<AnalogBlock> = (0..9)
        .map(|i| if i % 2 == 0 { lo.clone() } else { hi.clone() })
        .collect();
    let digital_words: Vec<DigitalWord> = (0..9)
        .map(|i| {
            let bits = if i % 2 == 0 { 0b01010101 } else { 0b10101010 };
            DigitalWord::new(bits, capability.n_digital_lines)
        })
        .collect();
    let table = StepTable::build(analog_blocks, digital_words, &capability)
        .expect("Demo table should validate");

    let defaults = Snapshot {
        analog: AnalogBlock::uniform(0, capability.n_analog_chans),
        digital: DigitalWord::new(0b10101010, capability.n_digital_lines),
    };

    let mut exp = Experiment::new();
    let cfg = StreamConfig {
        poll_interval: std::time::Duration::from_millis(1),
    };
    exp.add_board("USB-3114", SimBoard { reads: 0 }, board, cfg, defaults)
        .expect("Simulated board setup cannot fault");

    let outcome = exp.run_sequence("USB-3114", table);
    println!("Run outcome: {:?}", outcome);
    while let Ok(event) = exp.events("USB-3114").try_recv() {
        println!("  {:?}", event);
    }
    exp.close();
}
