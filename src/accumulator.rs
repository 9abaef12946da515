/// Running airtime total for one capture session, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    total_us: u64,
    corrections: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, duration_us: u32) {
        self.total_us += duration_us as u64;
    }

    /// Swaps a contribution already added for its recomputed value.
    pub fn correct(&mut self, previous_us: u32, corrected_us: u32) {
        self.total_us = self.total_us.saturating_sub(previous_us as u64) + corrected_us as u64;
        self.corrections += 1;
    }

    pub fn total_us(&self) -> u64 {
        self.total_us
    }

    /// Number of retroactive corrections applied so far.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}
