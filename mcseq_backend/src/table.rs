//! The step table: an ordered, immutable-once-built pairing of analog blocks
//! with digital words.
//!
//! [`StepTable::build`] is the single entry point. It validates
//! caller-supplied per-step data against a [`BoardCapability`] and freezes it
//! into a table the scheduler can walk without further checks. Validation
//! failures are reported through [`ValidationError`] and always leave the
//! caller free to fix the input and rebuild; nothing partially built ever
//! escapes.

use thiserror::Error;

use crate::block::{AnalogBlock, BoardCapability, DigitalWord};

/// Rejections raised while freezing caller data into a [`StepTable`].
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ValidationError {
    #[error("Sequence lengths differ: {analog} analog blocks vs {digital} digital words")]
    LengthMismatch { analog: usize, digital: usize },
    #[error("Sequence is empty, a step table needs at least one step")]
    Empty,
    #[error("Step {step}: expected {expected} {kind}, got {got}")]
    ChannelCountMismatch {
        step: usize,
        kind: ChannelKind,
        expected: usize,
        got: usize,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChannelKind {
    AnalogChans,
    DigitalLines,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChannelKind::AnalogChans => write!(f, "analog channels"),
            ChannelKind::DigitalLines => write!(f, "digital lines"),
        }
    }
}

/// One scheduled unit of output: the analog block armed ahead of time and
/// the digital word committed when the hardware counter reaches `index`.
#[derive(Clone, PartialEq, Debug)]
pub struct Step {
    index: usize,
    analog: AnalogBlock,
    digital: DigitalWord,
}

impl Step {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn analog(&self) -> &AnalogBlock {
        &self.analog
    }

    pub fn digital(&self) -> DigitalWord {
        self.digital
    }
}

/// Ordered sequence of [`Step`]s, never mutated during a run.
///
/// Ordinals are assigned as the 0-based position in the input sequences and
/// are assumed by the scheduler to correspond 1:1 to hardware counter values
/// starting at 0.
#[derive(Clone, PartialEq, Debug)]
pub struct StepTable {
    steps: Vec<Step>,
}

impl StepTable {
    /// Validates and freezes per-step data.
    ///
    /// Checks, in order: matching sequence lengths, non-emptiness, and the
    /// shape of every block and word against `capability`.
    pub fn build(
        analog_blocks: Vec<AnalogBlock>,
        digital_words: Vec<DigitalWord>,
        capability: &BoardCapability,
    ) -> Result<Self, ValidationError> {
        if analog_blocks.len() != digital_words.len() {
            return Err(ValidationError::LengthMismatch {
                analog: analog_blocks.len(),
                digital: digital_words.len(),
            });
        }
        if analog_blocks.is_empty() {
            return Err(ValidationError::Empty);
        }
        for (step, (block, word)) in analog_blocks.iter().zip(digital_words.iter()).enumerate() {
            if block.n_chans() != capability.n_analog_chans {
                return Err(ValidationError::ChannelCountMismatch {
                    step,
                    kind: ChannelKind::AnalogChans,
                    expected: capability.n_analog_chans,
                    got: block.n_chans(),
                });
            }
            if word.n_lines() != capability.n_digital_lines {
                return Err(ValidationError::ChannelCountMismatch {
                    step,
                    kind: ChannelKind::DigitalLines,
                    expected: capability.n_digital_lines,
                    got: word.n_lines(),
                });
            }
        }
        let steps = analog_blocks
            .into_iter()
            .zip(digital_words)
            .enumerate()
            .map(|(index, (analog, digital))| Step {
                index,
                analog,
                digital,
            })
            .collect();
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, ordinal: usize) -> &Step {
        &self.steps[ordinal]
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }
}
