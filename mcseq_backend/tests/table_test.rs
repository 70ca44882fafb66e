use mcseq_backend::*;

fn blocks(n: usize, cap: &BoardCapability) -> Vec<AnalogBlock> {
    (0..n)
        .map(|i| AnalogBlock::uniform(i as u16, cap.n_analog_chans))
        .collect()
}

fn words(n: usize, cap: &BoardCapability) -> Vec<DigitalWord> {
    (0..n)
        .map(|i| DigitalWord::new(i as u16, cap.n_digital_lines))
        .collect()
}

#[test]
fn build_assigns_ordinals_by_position() {
    let cap = BoardCapability::usb_3114();
    let table = StepTable::build(blocks(4, &cap), words(4, &cap), &cap).unwrap();

    assert_eq!(table.len(), 4);
    for (pos, step) in table.steps().enumerate() {
        assert_eq!(step.index(), pos);
        assert_eq!(step.analog().samples()[0], pos as u16);
        assert_eq!(step.digital().bits(), pos as u16);
    }
}

#[test]
fn build_rejects_length_mismatch() {
    let cap = BoardCapability::usb_3114();
    let err = StepTable::build(blocks(3, &cap), words(2, &cap), &cap).unwrap_err();
    assert_eq!(
        err,
        ValidationError::LengthMismatch {
            analog: 3,
            digital: 2
        }
    );
}

#[test]
fn build_rejects_empty_sequences() {
    let cap = BoardCapability::usb_3114();
    let err = StepTable::build(vec![], vec![], &cap).unwrap_err();
    assert_eq!(err, ValidationError::Empty);
}

#[test]
fn build_rejects_wrong_analog_channel_count() {
    let cap = BoardCapability::usb_3114();
    let mut analog = blocks(3, &cap);
    analog[1] = AnalogBlock::uniform(0, 8); // block authored for a smaller board
    let err = StepTable::build(analog, words(3, &cap), &cap).unwrap_err();
    assert_eq!(
        err,
        ValidationError::ChannelCountMismatch {
            step: 1,
            kind: ChannelKind::AnalogChans,
            expected: 16,
            got: 8
        }
    );
}

#[test]
fn build_rejects_wrong_digital_line_count() {
    let cap = BoardCapability::usb_3114();
    let mut digital = words(2, &cap);
    digital[0] = DigitalWord::new(0b1010, 4);
    let err = StepTable::build(blocks(2, &cap), digital, &cap).unwrap_err();
    assert_eq!(
        err,
        ValidationError::ChannelCountMismatch {
            step: 0,
            kind: ChannelKind::DigitalLines,
            expected: 8,
            got: 4
        }
    );
}

#[test]
fn digital_word_exposes_individual_lines() {
    let word = DigitalWord::new(0b01010101, 8);
    for line in 0..8 {
        assert_eq!(word.line(line), line % 2 == 0);
    }
    assert_eq!(format!("{}", word), "01010101");
}

#[test]
#[should_panic(expected = "does not fit in")]
fn digital_word_rejects_bits_beyond_line_count() {
    DigitalWord::new(0b10000, 4);
}

#[test]
fn unit_scale_maps_range_ends_onto_code_range() {
    let scale = UnitScale::uni_10_volts();
    assert_eq!(scale.to_raw(0.), 0);
    assert_eq!(scale.to_raw(10.), u16::MAX);
    // Out-of-range voltages clamp instead of wrapping.
    assert_eq!(scale.to_raw(-1.), 0);
    assert_eq!(scale.to_raw(12.), u16::MAX);
    assert!((scale.to_volts(scale.to_raw(5.)) - 5.).abs() < 1e-3);
}

#[test]
fn analog_block_from_volts_scales_every_channel() {
    let scale = UnitScale::uni_10_volts();
    let block = AnalogBlock::from_volts(&[0., 5., 10.], &scale);
    assert_eq!(block.n_chans(), 3);
    assert_eq!(block.samples()[0], 0);
    assert_eq!(block.samples()[2], u16::MAX);
}
