//! A-MPDU detection and the retroactive correction of the first subframe.
//!
//! A capture only reveals that a frame opened an aggregate once the next
//! frame arrives, so the first subframe is always counted as a standalone
//! PPDU at first. When the second subframe shows up, the first one's
//! contribution is taken back out of the accumulator and recomputed with
//! aggregate padding and its delimiter.
//!
//! Capture hardware marks subframes of one PPDU in different ways:
//! - every subframe carries the TSF of the PPDU start (Broadcom);
//! - the first subframe carries the TSF and the rest report 0 (Intel);
//! - every subframe but the last reports all ones (QCA).

use log::debug;

use crate::accumulator::Accumulator;
use crate::duration::duration_us;
use crate::phy::PhyDescriptor;

/// Length of the subframe that opened an aggregate once it is known to be
/// one: rounded to the next 4-byte boundary, then its 4-byte delimiter.
pub fn first_subframe_length(length: u32) -> u32 {
    (length | 3).saturating_add(1).saturating_add(4)
}

/// Length of a later subframe: its 4-byte delimiter, then padding.
pub fn subframe_length(length: u32) -> u32 {
    (length.saturating_add(4) | 3).saturating_add(1)
}

/// What the detector remembers about the last frame it saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameRecord {
    pub phy: PhyDescriptor,
    /// Length the duration was computed for, padding included.
    pub length: u32,
    pub duration_us: u32,
    pub in_aggregate: bool,
}

impl FrameRecord {
    pub fn tsf(&self) -> Option<u64> {
        self.phy.tsf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// First frame of the capture; nothing to compare against.
    FirstOfSession,
    Standalone,
    /// Second subframe of a new aggregate; triggers a correction.
    SecondSubframe,
    LaterSubframe,
}

impl Membership {
    pub fn in_aggregate(&self) -> bool {
        matches!(self, Membership::SecondSubframe | Membership::LaterSubframe)
    }
}

/// The recomputation applied to the subframe that opened an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub previous_length: u32,
    pub corrected_length: u32,
    pub previous_us: u32,
    pub corrected_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub membership: Membership,
    /// Length the duration was computed for.
    pub length: u32,
    pub duration_us: u32,
    pub correction: Option<Correction>,
}

#[derive(Debug, Clone)]
pub struct AggregateDetector {
    previous: FrameRecord,
    currently_in_aggregate: bool,
    is_first_captured_frame: bool,
    just_saw_second_subframe: bool,
}

impl Default for AggregateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateDetector {
    pub fn new() -> Self {
        AggregateDetector {
            previous: FrameRecord::default(),
            currently_in_aggregate: false,
            is_first_captured_frame: true,
            just_saw_second_subframe: false,
        }
    }

    #[cfg(test)]
    fn reset(&mut self) {
        *self = Self::new();
    }

    #[cfg(test)]
    fn previous(&self) -> Option<&FrameRecord> {
        (!self.is_first_captured_frame).then_some(&self.previous)
    }

    #[cfg(test)]
    fn currently_in_aggregate(&self) -> bool {
        self.currently_in_aggregate
    }

    #[cfg(test)]
    fn just_saw_second_subframe(&self) -> bool {
        self.just_saw_second_subframe
    }

    /// Accounts one classified frame of `frame_length` bytes (FCS included)
    /// into `accumulator`, correcting the previous frame when this one turns
    /// out to be the second subframe of an aggregate.
    pub fn process(
        &mut self,
        phy: &PhyDescriptor,
        frame_length: u32,
        accumulator: &mut Accumulator,
    ) -> Outcome {
        let membership = if self.is_first_captured_frame {
            self.is_first_captured_frame = false;
            Membership::FirstOfSession
        } else if self.continues_aggregate(phy) {
            if self.currently_in_aggregate {
                Membership::LaterSubframe
            } else {
                Membership::SecondSubframe
            }
        } else {
            Membership::Standalone
        };

        self.just_saw_second_subframe = membership == Membership::SecondSubframe;
        self.currently_in_aggregate = membership.in_aggregate();

        let correction = if self.just_saw_second_subframe {
            Some(self.correct_previous(accumulator))
        } else {
            None
        };

        let (length, duration) = if membership.in_aggregate() {
            let length = subframe_length(frame_length);
            (length, duration_us(phy, length, true, false))
        } else {
            (frame_length, duration_us(phy, frame_length, false, true))
        };
        accumulator.add(duration);

        debug!(
            "{:?}: {} bytes counted as {}, {}us (total {}us)",
            membership,
            frame_length,
            length,
            duration,
            accumulator.total_us()
        );

        self.previous = FrameRecord {
            phy: *phy,
            length,
            duration_us: duration,
            in_aggregate: membership.in_aggregate(),
        };

        Outcome {
            membership,
            length,
            duration_us: duration,
            correction,
        }
    }

    fn continues_aggregate(&self, phy: &PhyDescriptor) -> bool {
        let previous = &self.previous;
        if !phy.phy.is_ht_or_vht() || phy.mode() != previous.phy.mode() {
            return false;
        }
        let (Some(tsf), Some(previous_tsf)) = (phy.tsf, previous.tsf()) else {
            return false;
        };

        tsf == previous_tsf
            || (!self.currently_in_aggregate && previous_tsf != 0 && tsf == 0)
            || previous_tsf == u64::MAX
    }

    fn correct_previous(&mut self, accumulator: &mut Accumulator) -> Correction {
        let previous = &mut self.previous;
        let corrected_length = first_subframe_length(previous.length);
        let corrected_us = duration_us(&previous.phy, corrected_length, true, true);
        accumulator.correct(previous.duration_us, corrected_us);

        let correction = Correction {
            previous_length: previous.length,
            corrected_length,
            previous_us: previous.duration_us,
            corrected_us,
        };
        debug!(
            "first subframe corrected: {} -> {} bytes, {}us -> {}us",
            correction.previous_length,
            correction.corrected_length,
            correction.previous_us,
            correction.corrected_us
        );

        previous.length = corrected_length;
        previous.duration_us = corrected_us;
        previous.in_aggregate = true;
        correction
    }
}
