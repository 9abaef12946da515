//! Fixed 802.11n/ac rate tables.

use crate::error::{Error, Result};

pub const MAX_HT_MCS_INDEX: usize = 76;
pub const MAX_VHT_MCS_INDEX: usize = 9;

/// Spatial streams per HT MCS index.
pub static HT_STREAMS: [u8; MAX_HT_MCS_INDEX + 1] = [
    1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4,
    1, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
];

/// Number of BCC encoders per HT MCS index.
pub static HT_NES: [u8; MAX_HT_MCS_INDEX + 1] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2, 2, //
    1, //
    1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2,
];

/// Data bits per OFDM symbol at 20 MHz per HT MCS index.
pub static HT_DBPS: [u16; MAX_HT_MCS_INDEX + 1] = [
    // MCS 0 - 1 stream
    26, 52, 78, 104, 156, 208, 234, 260,
    // MCS 8 - 2 streams
    52, 104, 156, 208, 312, 416, 468, 520,
    // MCS 16 - 3 streams
    78, 156, 234, 312, 468, 624, 702, 780,
    // MCS 24 - 4 streams
    104, 208, 312, 416, 624, 832, 936, 1040,
    // MCS 32 - 40 MHz duplicate only
    12,
    // MCS 33 - 2 streams, unequal modulation
    156, 208, 260, 234, 312, 390,
    // MCS 39 - 3 streams, unequal modulation
    208, 260, 260, 312, 364, 364, 416, 312, 390, 390, 468, 546, 546, 624,
    // MCS 53 - 4 streams, unequal modulation
    260, 312, 364, 312, 364, 416, 468, 416, 468, 520, 520, 572,
    390, 468, 546, 468, 546, 624, 702, 624, 702, 780, 780, 858,
];

/// HT data training symbols (HT-DLTF), indexed by Nsts - 1.
pub static HT_DLTF: [u8; 4] = [1, 2, 4, 4];

/// HT extension training symbols (HT-ELTF), indexed by Ness.
pub static HT_ELTF: [u8; 4] = [0, 1, 2, 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VhtMcsInfo {
    pub modulation: &'static str,
    pub coding_rate: &'static str,
    /// Assumes 20 MHz / 52 data subcarriers.
    pub data_bits_per_symbol: f32,
}

pub static VHT_MCS_INFO: [VhtMcsInfo; MAX_VHT_MCS_INDEX + 1] = [
    VhtMcsInfo { modulation: "BPSK", coding_rate: "1/2", data_bits_per_symbol: 26.0 },
    VhtMcsInfo { modulation: "QPSK", coding_rate: "1/2", data_bits_per_symbol: 52.0 },
    VhtMcsInfo { modulation: "QPSK", coding_rate: "3/4", data_bits_per_symbol: 78.0 },
    VhtMcsInfo { modulation: "16-QAM", coding_rate: "1/2", data_bits_per_symbol: 104.0 },
    VhtMcsInfo { modulation: "16-QAM", coding_rate: "3/4", data_bits_per_symbol: 156.0 },
    VhtMcsInfo { modulation: "64-QAM", coding_rate: "2/3", data_bits_per_symbol: 208.0 },
    VhtMcsInfo { modulation: "64-QAM", coding_rate: "3/4", data_bits_per_symbol: 234.0 },
    VhtMcsInfo { modulation: "64-QAM", coding_rate: "5/6", data_bits_per_symbol: 260.0 },
    VhtMcsInfo { modulation: "256-QAM", coding_rate: "3/4", data_bits_per_symbol: 312.0 },
    VhtMcsInfo { modulation: "256-QAM", coding_rate: "5/6", data_bits_per_symbol: 1040.0 / 3.0 },
];

/// Data subcarriers for 20, 40, 80 and 160 MHz.
pub static VHT_SUBCARRIERS: [u16; 4] = [52, 108, 234, 468];

fn lookup<T: Copy>(table: &'static [T], name: &'static str, index: usize) -> Result<T> {
    table.get(index).copied().ok_or(Error::IndexOutOfRange {
        table: name,
        index,
        max: table.len() - 1,
    })
}

pub fn ht_streams(mcs_index: usize) -> Result<u8> {
    lookup(&HT_STREAMS, "HT streams", mcs_index)
}

pub fn ht_nes(mcs_index: usize) -> Result<u8> {
    lookup(&HT_NES, "HT Nes", mcs_index)
}

pub fn ht_dbps(mcs_index: usize) -> Result<u16> {
    lookup(&HT_DBPS, "HT Dbps", mcs_index)
}

/// Data training symbols for `nsts` space-time streams (1-4).
pub fn ht_dltf(nsts: usize) -> Result<u8> {
    if !(1..=HT_DLTF.len()).contains(&nsts) {
        return Err(Error::IndexOutOfRange {
            table: "HT Nsts",
            index: nsts,
            max: HT_DLTF.len(),
        });
    }
    Ok(HT_DLTF[nsts - 1])
}

pub fn ht_eltf(ness: usize) -> Result<u8> {
    lookup(&HT_ELTF, "HT-ELTF", ness)
}

pub fn vht_mcs_info(mcs_index: usize) -> Result<VhtMcsInfo> {
    lookup(&VHT_MCS_INFO, "VHT MCS", mcs_index)
}

/// Nominal HT data rate in Mb/s.
pub fn ht_rate_mbps(mcs_index: usize, bandwidth_40: bool, short_gi: bool) -> Result<f32> {
    let dbps = ht_dbps(mcs_index)? as f32;
    let subcarriers = if bandwidth_40 { 108.0 } else { 52.0 };
    let symbol_us = if short_gi { 3.6 } else { 4.0 };
    Ok(dbps * subcarriers / 52.0 / symbol_us)
}

/// Nominal VHT data rate in Mb/s for one spatial stream.
pub fn vht_rate_mbps(mcs_index: usize, bandwidth_index: usize, short_gi: bool) -> Result<f32> {
    let info = vht_mcs_info(mcs_index)?;
    let subcarriers = lookup(&VHT_SUBCARRIERS, "VHT subcarriers", bandwidth_index)? as f32;
    let symbol_us = if short_gi { 3.6 } else { 4.0 };
    Ok(info.data_bits_per_symbol * subcarriers / symbol_us / 52.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ht_tables_cover_every_index() {
        assert_eq!(HT_STREAMS.len(), 77);
        assert_eq!(HT_NES.len(), 77);
        assert_eq!(HT_DBPS.len(), 77);
        assert_eq!(ht_streams(76).unwrap(), 4);
        assert_eq!(ht_nes(76).unwrap(), 2);
        assert_eq!(ht_dbps(76).unwrap(), 858);
        assert_eq!(ht_dbps(32).unwrap(), 12);
    }

    #[test]
    fn out_of_range_indices() {
        assert_eq!(
            ht_dbps(77).unwrap_err(),
            Error::IndexOutOfRange {
                table: "HT Dbps",
                index: 77,
                max: 76
            }
        );
        assert!(ht_streams(200).is_err());
        assert!(vht_mcs_info(10).is_err());
        assert!(vht_mcs_info(9).is_ok());
        assert!(ht_dltf(0).is_err());
        assert!(ht_dltf(5).is_err());
        assert!(ht_eltf(4).is_err());
    }

    #[test]
    fn training_symbols() {
        assert_eq!(ht_dltf(1).unwrap(), 1);
        assert_eq!(ht_dltf(3).unwrap(), 4);
        assert_eq!(ht_dltf(4).unwrap(), 4);
        assert_eq!(ht_eltf(0).unwrap(), 0);
        assert_eq!(ht_eltf(3).unwrap(), 4);
    }

    #[test]
    fn nominal_rates() {
        assert!((ht_rate_mbps(7, false, false).unwrap() - 65.0).abs() < 0.01);
        assert!((ht_rate_mbps(7, false, true).unwrap() - 72.22).abs() < 0.01);
        assert!((ht_rate_mbps(15, true, true).unwrap() - 300.0).abs() < 0.01);
        assert!((vht_rate_mbps(9, 2, true).unwrap() - 433.33).abs() < 0.01);
        assert!(vht_rate_mbps(0, 4, false).is_err());
    }
}
