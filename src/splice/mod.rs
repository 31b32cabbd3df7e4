//! Joining several transport streams into one.
//!
//! [`SourceSequencer`] plays sources back to back and [`ContinuityFixer`]
//! makes the joins invisible to decoders by rebasing continuity counters,
//! PTS and PCR per PID.

pub mod fixer;
pub mod sequencer;

pub use fixer::ContinuityFixer;
pub use sequencer::{LoopMode, SequencerBuilder, SequencerHandle, SourceSequencer};
