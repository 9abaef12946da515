//! Per-capture wiring of the reader, classifier, calculator and detector.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use strum::IntoEnumIterator;

use crate::accumulator::Accumulator;
use crate::aggregate::{AggregateDetector, Correction, Membership};
use crate::error::{Error, Result};
use crate::phy::{self, PhyMode};
use crate::radiotap::RadiotapReader;
use crate::util::format_micros;

/// FCS bytes that occupy the air even when the capture dropped them.
const FCS_LEN: u32 = 4;

/// One captured link-layer frame: radiotap header, then the 802.11 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture time, relative to the Unix epoch.
    pub timestamp: Duration,
    pub data: Vec<u8>,
    /// Length on the wire, which may exceed `data.len()` when the capture was truncated.
    pub original_len: u32,
}

impl Frame {
    pub fn new(timestamp: Duration, data: Vec<u8>) -> Self {
        let original_len = data.len() as u32;
        Frame {
            timestamp,
            data,
            original_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub timestamp: Duration,
    pub mode: PhyMode,
    /// 802.11 frame length including the FCS, before aggregate padding.
    pub frame_length: u32,
    pub duration_us: u32,
    pub membership: Membership,
    pub correction: Option<Correction>,
    pub total_us: u64,
}

/// Holds everything one capture session accumulates.
#[derive(Debug, Clone, Default)]
pub struct AirtimeSession {
    detector: AggregateDetector,
    accumulator: Accumulator,
    processed: u64,
    skipped: u64,
    aggregates: u64,
    per_mode: BTreeMap<PhyMode, u64>,
    first_timestamp: Option<Duration>,
    last_timestamp: Option<Duration>,
}

impl AirtimeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one frame through the pipeline. On error the frame is skipped
    /// and neither the total nor the aggregate state change.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameReport> {
        match self.account(frame) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.skipped += 1;
                warn!("Skipping frame at {:?}: {}", frame.timestamp, e);
                Err(e)
            }
        }
    }

    fn account(&mut self, frame: &Frame) -> Result<FrameReport> {
        let reader = RadiotapReader::parse(&frame.data)?;
        let descriptor = phy::classify(&reader)?;

        let header_len = reader.length() as u32;
        let mut frame_length =
            frame
                .original_len
                .checked_sub(header_len)
                .ok_or(Error::InvalidLength {
                    needed: reader.length(),
                    available: frame.original_len as usize,
                })?;
        if !descriptor.fcs_at_end {
            frame_length += FCS_LEN;
        }

        let outcome = self
            .detector
            .process(&descriptor, frame_length, &mut self.accumulator);

        self.processed += 1;
        *self.per_mode.entry(descriptor.mode()).or_insert(0) += 1;
        if outcome.membership == Membership::SecondSubframe {
            self.aggregates += 1;
        }
        self.first_timestamp.get_or_insert(frame.timestamp);
        self.last_timestamp = Some(frame.timestamp);

        debug!(
            "frame {}: {} {} bytes, {}us, total {}us",
            self.processed,
            descriptor.mode(),
            frame_length,
            outcome.duration_us,
            self.accumulator.total_us()
        );

        Ok(FrameReport {
            timestamp: frame.timestamp,
            mode: descriptor.mode(),
            frame_length,
            duration_us: outcome.duration_us,
            membership: outcome.membership,
            correction: outcome.correction,
            total_us: self.accumulator.total_us(),
        })
    }

    pub fn total_us(&self) -> u64 {
        self.accumulator.total_us()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn summary(&self) -> Summary {
        let elapsed = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        };
        Summary {
            total_us: self.accumulator.total_us(),
            processed: self.processed,
            skipped: self.skipped,
            aggregates: self.aggregates,
            corrections: self.accumulator.corrections(),
            per_mode: self.per_mode.clone(),
            elapsed,
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_us: u64,
    pub processed: u64,
    pub skipped: u64,
    pub aggregates: u64,
    pub corrections: u64,
    pub per_mode: BTreeMap<PhyMode, u64>,
    /// Time between the first and last processed frame.
    pub elapsed: Duration,
}

impl Summary {
    /// Fraction of the capture window the medium was busy, if the window is non-empty.
    pub fn airtime_share(&self) -> Option<f64> {
        let elapsed_us = self.elapsed.as_micros();
        if elapsed_us == 0 {
            return None;
        }
        Some(self.total_us as f64 / elapsed_us as f64)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total airtime: {} us ({})",
            self.total_us,
            format_micros(self.total_us)
        )?;
        writeln!(
            f,
            "Frames: {} processed, {} skipped",
            self.processed, self.skipped
        )?;
        for mode in PhyMode::iter() {
            if let Some(count) = self.per_mode.get(&mode) {
                writeln!(f, "  {:<12} {}", mode.to_string(), count)?;
            }
        }
        writeln!(
            f,
            "A-MPDUs: {} ({} corrections)",
            self.aggregates, self.corrections
        )?;
        match self.airtime_share() {
            Some(share) => write!(
                f,
                "Airtime share: {:.2}% of {}",
                share * 100.0,
                format_micros(self.elapsed.as_micros() as u64)
            ),
            None => write!(f, "Airtime share: n/a"),
        }
    }
}
